//! Domain types for trip planning
//!
//! - `TripRequest`: structured form of the user's ask
//! - `Itinerary`: one generated day-by-day plan
//! - `CritiqueResult`: scores and feedback for one itinerary
//! - `PlanState`: the session aggregate persisted between invocations

mod critique;
mod itinerary;
mod plan;
mod trip;

pub use critique::{CritiqueResult, Dimension, Issue};
pub use itinerary::{Activity, DataKind, DayPlan, FlightOption, Forecast, Itinerary, Provenance, Source, TimeWindow};
pub use plan::{PlanState, PlanStatus, TraceEntry};
pub use trip::{DEFAULT_CURRENCY, MAX_DURATION_DAYS, TripRequest};
