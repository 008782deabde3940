//! Planning supervisor
//!
//! Bounded parse, generate and critique loop over a `PlanState`.

mod engine;
pub mod transition;

pub use engine::{PlanError, Supervisor};
pub use transition::{CritiqueOutcome, ParseOutcome, after_critique, after_parse, best_attempt};
