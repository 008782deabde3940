//! Translating critique feedback into generation settings

use tracing::debug;

use crate::domain::{CritiqueResult, Dimension, TripRequest};

/// Activity slots used when nothing asks for fewer
pub const FULL_DAY_SLOTS: usize = 3;

/// Slots used for conservative or budget-constrained plans
pub const LIGHT_DAY_SLOTS: usize = 2;

/// Knobs one generation attempt runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustments {
    /// Activities scheduled per day
    pub slots_per_day: usize,
    /// Prefer the cheapest places in each category
    pub cheapest_places: bool,
    /// Take the cheapest flight offer instead of the first one
    pub cheapest_flight: bool,
    /// Schedule only preference categories, no general sightseeing
    pub preferences_only: bool,
    /// Notes describing what was changed, for the trace
    pub notes: Vec<String>,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            slots_per_day: FULL_DAY_SLOTS,
            cheapest_places: false,
            cheapest_flight: false,
            preferences_only: false,
            notes: Vec::new(),
        }
    }
}

impl Adjustments {
    /// Settings for a trip, revised by the previous critique when given
    pub fn derive(trip: &TripRequest, feedback: Option<&CritiqueResult>) -> Self {
        debug!(low_confidence = trip.low_confidence, has_feedback = feedback.is_some(), "Adjustments::derive: called");
        let mut adjustments = Self::default();

        if trip.low_confidence {
            adjustments.slots_per_day = LIGHT_DAY_SLOTS;
            adjustments.cheapest_places = true;
            adjustments.notes.push("low-confidence request: lighter days, cheaper picks".to_string());
        }

        let Some(critique) = feedback else {
            return adjustments;
        };

        for issue in &critique.feedback {
            match issue.dimension {
                Dimension::BudgetAdherence => {
                    adjustments.cheapest_places = true;
                    adjustments.cheapest_flight = true;
                    adjustments.slots_per_day = adjustments.slots_per_day.min(LIGHT_DAY_SLOTS);
                    adjustments.notes.push("over budget: cheapest places, evening slot dropped".to_string());
                }
                Dimension::TimelineFeasibility => {
                    adjustments.slots_per_day = adjustments.slots_per_day.min(LIGHT_DAY_SLOTS);
                    adjustments.notes.push("timeline issues: fewer activities per day".to_string());
                }
                Dimension::PreferenceMatch => {
                    if !trip.preferences.is_empty() {
                        adjustments.preferences_only = true;
                        adjustments.notes.push("preferences missed: scheduling preference categories only".to_string());
                    }
                }
                Dimension::Completeness => {
                    adjustments.notes.push("incomplete data: filling gaps from fallback data".to_string());
                }
            }
        }
        adjustments
    }
}
