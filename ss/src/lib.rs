//! SessionStore - file-backed persistence for planning sessions
//!
//! Each session is stored as a single JSON envelope keyed by session id.
//! Envelopes carry a monotonically increasing version (optimistic locking)
//! and an expiry timestamp after which the session is treated as absent.
//! An exclusive lease file marks the one writer allowed to drive a session.
//!
//! # Layout
//!
//! ```text
//! <store>/
//! ├── .store.lock          # guards read-modify-write of envelopes
//! ├── sessions/
//! │   └── {session_id}.json
//! └── leases/
//!     └── {session_id}.lease
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sessionstore::{SessionStore, StoreOptions};
//!
//! let store = SessionStore::open(".sessions", StoreOptions::default())?;
//! let lease = store.acquire_lease("abc", "worker-1")?;
//! let version = store.save("abc", &state, 0)?;
//! store.release_lease(&lease)?;
//! ```

mod error;
mod lease;
mod store;

pub use error::StoreError;
pub use lease::Lease;
pub use store::{Envelope, SessionStore, SessionSummary, StoreOptions};

/// Default session time-to-live (30 days)
pub const DEFAULT_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Default lease time-to-live (15 minutes)
pub const DEFAULT_LEASE_TTL_MS: i64 = 15 * 60 * 1000;

/// Current time in Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
