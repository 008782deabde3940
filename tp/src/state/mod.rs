//! State management with actor pattern
//!
//! StateManager owns the SessionStore and processes messages via channels,
//! providing thread-safe access to persisted planning sessions.

mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
