//! Itinerary generation
//!
//! The `Generator` trait is the narrow seam the supervisor drives: a trip
//! request plus the previous critique in, a complete itinerary out. Provider
//! failures are absorbed below this seam; only fatal errors cross it.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CritiqueResult, Itinerary, TripRequest};

mod adjustments;
mod itinerary;

pub use adjustments::Adjustments;
pub use itinerary::ItineraryGenerator;

/// Fatal generation failures
///
/// Provider outages never show up here; they are replaced by fallback data.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid trip request: {0}")]
    InvalidRequest(String),

    #[error("No activities could be scheduled for {0}")]
    NoActivities(String),
}

/// Produces one itinerary per attempt
#[async_trait]
pub trait Generator: Send + Sync {
    /// Build the itinerary for `attempt` (1-based), revising against `feedback` when present
    async fn generate(
        &self,
        trip: &TripRequest,
        feedback: Option<&CritiqueResult>,
        attempt: u32,
    ) -> Result<Itinerary, GenerationError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::{Activity, DayPlan, Source, TimeWindow};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator returning a minimal one-activity-per-day itinerary
    ///
    /// Records the attempt number of every critique it was handed.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        fail_on: Option<u32>,
        calls: AtomicUsize,
        feedback_seen: Mutex<Vec<Option<u32>>>,
    }

    impl ScriptedGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail fatally on the given attempt
        pub fn failing_on(attempt: u32) -> Self {
            Self {
                fail_on: Some(attempt),
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn feedback_seen(&self) -> Vec<Option<u32>> {
            self.feedback_seen.lock().map(|f| f.clone()).unwrap_or_default()
        }
    }

    /// Simple itinerary for `trip`, one free activity per day
    pub fn simple_itinerary(trip: &TripRequest, attempt: u32) -> Itinerary {
        let days = trip
            .dates()
            .into_iter()
            .map(|date| DayPlan {
                date,
                activities: vec![Activity {
                    name: format!("Walk around {}", trip.destination),
                    category: "sightseeing".to_string(),
                    window: TimeWindow::hm((9, 0), (11, 0)),
                    location: trip.destination.clone(),
                    estimated_cost: Some(0.0),
                    source: Source::Fallback,
                }],
            })
            .collect();
        Itinerary::new(attempt, days, None, BTreeMap::new())
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            trip: &TripRequest,
            feedback: Option<&CritiqueResult>,
            attempt: u32,
        ) -> Result<Itinerary, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.feedback_seen.lock() {
                seen.push(feedback.map(|f| f.attempt));
            }
            if self.fail_on == Some(attempt) {
                return Err(GenerationError::NoActivities(trip.destination.clone()));
            }
            Ok(simple_itinerary(trip, attempt))
        }
    }
}
