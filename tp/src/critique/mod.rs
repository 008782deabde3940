//! Itinerary critique
//!
//! `RuleCritic` scores an itinerary on four dimensions with fixed numeric
//! rules, so the same itinerary and request always produce the same result.

use tracing::{debug, info};

use crate::config::CritiqueConfig;
use crate::domain::{CritiqueResult, Itinerary, TripRequest};

mod feedback;
pub mod scoring;

pub use feedback::{MAX_QUESTIONS, clarification_questions, issues};

/// Evaluates one itinerary against its request
pub trait Critic: Send + Sync {
    fn critique(&self, itinerary: &Itinerary, trip: &TripRequest) -> CritiqueResult;
}

/// Deterministic rule-based critic
#[derive(Debug, Clone, Default)]
pub struct RuleCritic {
    config: CritiqueConfig,
}

impl RuleCritic {
    pub fn new(config: CritiqueConfig) -> Self {
        Self { config }
    }
}

impl Critic for RuleCritic {
    fn critique(&self, itinerary: &Itinerary, trip: &TripRequest) -> CritiqueResult {
        debug!(attempt = itinerary.generation_attempt(), "critique: called");
        let scores = scoring::score_all(itinerary, trip);
        let overall_score = scoring::overall(&scores, &self.config.weights);
        let floors_met = scores.iter().all(|(d, s)| *s >= self.config.floors.get(*d));
        let passed = overall_score >= self.config.acceptance_threshold && floors_met;
        let mut result = CritiqueResult {
            attempt: itinerary.generation_attempt(),
            scores,
            overall_score,
            passed,
            feedback: Vec::new(),
        };
        result.feedback = issues(&result, itinerary, trip, &self.config);

        info!(
            attempt = result.attempt,
            overall_score,
            passed,
            issues = result.feedback.len(),
            "critique: scored itinerary"
        );
        result
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::{Dimension, Issue};
    use std::sync::Mutex;

    /// Critic returning scripted overall scores in order
    ///
    /// Every dimension gets the overall score; a failing result carries one
    /// budget issue. The last score repeats once the script runs out.
    pub struct ScriptedCritic {
        scores: Vec<f64>,
        threshold: f64,
        next: Mutex<usize>,
    }

    impl ScriptedCritic {
        pub fn new(scores: Vec<f64>) -> Self {
            Self {
                scores,
                threshold: 0.7,
                next: Mutex::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.next.lock().map(|n| *n).unwrap_or(0)
        }
    }

    impl Critic for ScriptedCritic {
        fn critique(&self, itinerary: &Itinerary, _trip: &TripRequest) -> CritiqueResult {
            let index = self
                .next
                .lock()
                .map(|mut n| {
                    let current = *n;
                    *n += 1;
                    current
                })
                .unwrap_or(0);
            let overall_score = self
                .scores
                .get(index)
                .or_else(|| self.scores.last())
                .copied()
                .unwrap_or(0.0);
            let passed = overall_score >= self.threshold;
            let feedback = if passed {
                Vec::new()
            } else {
                vec![Issue {
                    dimension: Dimension::BudgetAdherence,
                    description: format!("scripted score {:.2}", overall_score),
                    suggested_fix: "reduce activity cost".to_string(),
                }]
            };
            CritiqueResult {
                attempt: itinerary.generation_attempt(),
                scores: Dimension::ALL.iter().map(|d| (*d, overall_score)).collect(),
                overall_score,
                passed,
                feedback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Activity, DayPlan, Dimension, Forecast, Source, TimeWindow};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    /// One activity per day at the given cost, with weather for every day
    fn itinerary(trip: &TripRequest, cost_per_day: f64, category: &str) -> Itinerary {
        let days: Vec<DayPlan> = trip
            .dates()
            .into_iter()
            .map(|date| DayPlan {
                date,
                activities: vec![Activity {
                    name: "Stop".to_string(),
                    category: category.to_string(),
                    window: TimeWindow::hm((10, 0), (12, 0)),
                    location: "Center".to_string(),
                    estimated_cost: Some(cost_per_day),
                    source: Source::Fallback,
                }],
            })
            .collect();
        let weather: BTreeMap<NaiveDate, Forecast> = trip
            .dates()
            .into_iter()
            .map(|date| {
                (
                    date,
                    Forecast {
                        summary: "fair".to_string(),
                        high_c: 22.0,
                        low_c: 14.0,
                        precipitation_chance: 0.1,
                        source: Source::Fallback,
                    },
                )
            })
            .collect();
        Itinerary::new(1, days, None, weather)
    }

    #[test]
    fn test_fallback_itinerary_passes() {
        let trip = TripRequest::new("Oslo", start(), 3)
            .with_budget(300.0)
            .with_preferences(["nature"]);
        let result = RuleCritic::default().critique(&itinerary(&trip, 50.0, "nature"), &trip);

        assert!(result.passed);
        assert_eq!(result.overall_score, 1.0);
        assert!(result.feedback.is_empty());
        assert_eq!(result.score(Dimension::Completeness), 1.0);
    }

    #[test]
    fn test_single_floor_breach_blocks_acceptance() {
        // 1.5x budget scores 0.5; with a 0.6 floor that alone must fail
        let trip = TripRequest::new("Oslo", start(), 2).with_budget(100.0);
        let critic = RuleCritic::new(CritiqueConfig {
            floors: crate::config::DimensionFloors::uniform(0.6),
            ..CritiqueConfig::default()
        });
        let result = critic.critique(&itinerary(&trip, 75.0, "nature"), &trip);

        assert_eq!(result.score(Dimension::BudgetAdherence), 0.5);
        assert!(result.overall_score >= 0.7);
        assert!(!result.passed);
        assert_eq!(result.feedback.len(), 1);
        assert_eq!(result.feedback[0].dimension, Dimension::BudgetAdherence);
    }

    #[test]
    fn test_critique_is_deterministic() {
        let trip = TripRequest::new("Oslo", start(), 4)
            .with_budget(120.0)
            .with_preferences(["food", "nature"]);
        let itinerary = itinerary(&trip, 45.0, "food");
        let critic = RuleCritic::default();
        assert_eq!(critic.critique(&itinerary, &trip), critic.critique(&itinerary, &trip));
    }
}
