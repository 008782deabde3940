//! Per-dimension scoring rules
//!
//! Every function is pure and returns a value in [0, 1].

use crate::config::DimensionWeights;
use crate::domain::{Dimension, Itinerary, TripRequest};
use std::collections::BTreeMap;

/// 1.0 within budget, then a linear penalty on the overage fraction
pub fn budget_adherence(cost: f64, budget: f64) -> f64 {
    if !cost.is_finite() || !budget.is_finite() {
        return 0.0;
    }
    if budget <= 0.0 {
        return if cost <= 0.0 { 1.0 } else { 0.0 };
    }
    if cost <= budget {
        return 1.0;
    }
    let overage_fraction = (cost - budget) / budget;
    (1.0 - overage_fraction).max(0.0)
}

/// Timeline shape for scoring and feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimelineStats {
    pub planned_days: usize,
    pub requested_days: usize,
    pub empty_days: usize,
    pub overlaps: usize,
    /// Consecutive activity pairs that could overlap
    pub pairs: usize,
}

impl TimelineStats {
    pub fn of(itinerary: &Itinerary, trip: &TripRequest) -> Self {
        let days = itinerary.days();
        Self {
            planned_days: days.len(),
            requested_days: trip.duration_days as usize,
            empty_days: days.iter().filter(|d| d.activities.is_empty()).count(),
            overlaps: days.iter().map(|d| d.overlap_count()).sum(),
            pairs: days.iter().map(|d| d.activities.len().saturating_sub(1)).sum(),
        }
    }
}

/// Day-count agreement times the share of days and pairs without violations
pub fn timeline_feasibility(itinerary: &Itinerary, trip: &TripRequest) -> f64 {
    let stats = TimelineStats::of(itinerary, trip);
    if stats.planned_days == 0 || stats.requested_days == 0 {
        return 0.0;
    }
    let day_factor =
        stats.planned_days.min(stats.requested_days) as f64 / stats.planned_days.max(stats.requested_days) as f64;
    let violations = (stats.empty_days + stats.overlaps) as f64;
    let checks = (stats.planned_days + stats.pairs) as f64;
    (day_factor * (1.0 - violations / checks)).clamp(0.0, 1.0)
}

/// Preferences with no activity of that category
pub fn missing_preferences<'a>(itinerary: &Itinerary, trip: &'a TripRequest) -> Vec<&'a str> {
    trip.preferences
        .iter()
        .filter(|p| !itinerary.activities().any(|a| a.category.eq_ignore_ascii_case(p)))
        .map(String::as_str)
        .collect()
}

/// Fraction of preferences matched by at least one activity
pub fn preference_match(itinerary: &Itinerary, trip: &TripRequest) -> f64 {
    if trip.preferences.is_empty() {
        return 1.0;
    }
    let missing = missing_preferences(itinerary, trip).len();
    (trip.preferences.len() - missing) as f64 / trip.preferences.len() as f64
}

/// Structural gaps for scoring and feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletenessStats {
    pub checks: usize,
    pub satisfied: usize,
    pub days_without_weather: usize,
    pub activities_missing_fields: usize,
    pub flight_missing: bool,
}

impl CompletenessStats {
    /// Count required fields; data source never matters here
    pub fn of(itinerary: &Itinerary, trip: &TripRequest) -> Self {
        let mut stats = Self::default();

        for day in itinerary.days() {
            stats.checks += 1;
            if itinerary.weather().contains_key(&day.date) {
                stats.satisfied += 1;
            } else {
                stats.days_without_weather += 1;
            }
        }

        for activity in itinerary.activities() {
            let present = [
                !activity.name.trim().is_empty(),
                !activity.location.trim().is_empty(),
                activity.estimated_cost.is_some(),
            ];
            stats.checks += present.len();
            let ok = present.iter().filter(|p| **p).count();
            stats.satisfied += ok;
            if ok < present.len() {
                stats.activities_missing_fields += 1;
            }
        }

        if trip.is_inter_city() {
            stats.checks += 1;
            if itinerary.flights().is_some() {
                stats.satisfied += 1;
            } else {
                stats.flight_missing = true;
            }
        }
        stats
    }
}

pub fn completeness(itinerary: &Itinerary, trip: &TripRequest) -> f64 {
    let stats = CompletenessStats::of(itinerary, trip);
    if stats.checks == 0 {
        return 0.0;
    }
    stats.satisfied as f64 / stats.checks as f64
}

/// Score every dimension
pub fn score_all(itinerary: &Itinerary, trip: &TripRequest) -> BTreeMap<Dimension, f64> {
    Dimension::ALL
        .iter()
        .map(|d| {
            let score = match d {
                Dimension::BudgetAdherence => budget_adherence(itinerary.total_estimated_cost(), trip.budget_total),
                Dimension::TimelineFeasibility => timeline_feasibility(itinerary, trip),
                Dimension::PreferenceMatch => preference_match(itinerary, trip),
                Dimension::Completeness => completeness(itinerary, trip),
            };
            (*d, score)
        })
        .collect()
}

/// Weighted average of the scores
pub fn overall(scores: &BTreeMap<Dimension, f64>, weights: &DimensionWeights) -> f64 {
    let total_weight = weights.sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = scores.iter().map(|(d, s)| weights.get(*d) * s).sum();
    (weighted / total_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Activity, DayPlan, FlightOption, Forecast, Source, TimeWindow};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn activity(category: &str, window: TimeWindow, cost: Option<f64>) -> Activity {
        Activity {
            name: format!("{} spot", category),
            category: category.to_string(),
            window,
            location: "Center".to_string(),
            estimated_cost: cost,
            source: Source::Fallback,
        }
    }

    fn forecast() -> Forecast {
        Forecast {
            summary: "mild".to_string(),
            high_c: 18.0,
            low_c: 9.0,
            precipitation_chance: 0.2,
            source: Source::Fallback,
        }
    }

    fn two_day_itinerary(second_day: Vec<Activity>) -> Itinerary {
        let days = vec![
            DayPlan {
                date: date(1),
                activities: vec![
                    activity("food", TimeWindow::hm((9, 0), (11, 0)), Some(20.0)),
                    activity("culture", TimeWindow::hm((13, 0), (15, 0)), Some(30.0)),
                ],
            },
            DayPlan {
                date: date(2),
                activities: second_day,
            },
        ];
        let weather = [(date(1), forecast()), (date(2), forecast())].into_iter().collect();
        Itinerary::new(1, days, None, weather)
    }

    fn trip(days: u32) -> TripRequest {
        TripRequest::new("Lisbon", date(1), days)
            .with_budget(100.0)
            .with_preferences(["food", "culture", "nature"])
    }

    #[test]
    fn test_budget_overage_penalty() {
        assert_eq!(budget_adherence(1500.0, 1000.0), 0.5);
        assert_eq!(budget_adherence(1000.0, 1000.0), 1.0);
        assert_eq!(budget_adherence(3000.0, 1000.0), 0.0);
        assert_eq!(budget_adherence(0.0, 0.0), 1.0);
        assert_eq!(budget_adherence(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_timeline_perfect() {
        let itinerary = two_day_itinerary(vec![activity("food", TimeWindow::hm((9, 0), (10, 0)), Some(5.0))]);
        assert_eq!(timeline_feasibility(&itinerary, &trip(2)), 1.0);
    }

    #[test]
    fn test_timeline_penalizes_empty_day_and_overlap() {
        let empty = two_day_itinerary(vec![]);
        // one empty day out of 2 days + 1 pair
        assert!((timeline_feasibility(&empty, &trip(2)) - (1.0 - 1.0 / 3.0)).abs() < 1e-9);

        let overlapping = two_day_itinerary(vec![
            activity("food", TimeWindow::hm((9, 0), (11, 0)), Some(5.0)),
            activity("food", TimeWindow::hm((10, 0), (12, 0)), Some(5.0)),
        ]);
        // one overlap out of 2 days + 2 pairs
        assert!((timeline_feasibility(&overlapping, &trip(2)) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_timeline_penalizes_day_count_mismatch() {
        let itinerary = two_day_itinerary(vec![activity("food", TimeWindow::hm((9, 0), (10, 0)), Some(5.0))]);
        assert!((timeline_feasibility(&itinerary, &trip(4)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_preference_match_fraction() {
        let itinerary = two_day_itinerary(vec![]);
        let trip = trip(2);
        assert!((preference_match(&itinerary, &trip) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(missing_preferences(&itinerary, &trip), vec!["nature"]);

        let no_prefs = TripRequest::new("Lisbon", date(1), 2);
        assert_eq!(preference_match(&itinerary, &no_prefs), 1.0);
    }

    #[test]
    fn test_completeness_ignores_source_but_counts_gaps() {
        let itinerary = two_day_itinerary(vec![activity("food", TimeWindow::hm((9, 0), (10, 0)), None)]);
        let stats = CompletenessStats::of(&itinerary, &trip(2));
        // 2 weather + 3 activities * 3 fields
        assert_eq!(stats.checks, 11);
        assert_eq!(stats.satisfied, 10);
        assert_eq!(stats.activities_missing_fields, 1);

        let inter_city = trip(2).with_origin("Porto");
        let stats = CompletenessStats::of(&itinerary, &inter_city);
        assert!(stats.flight_missing);
        assert_eq!(stats.checks, 12);
    }

    #[test]
    fn test_completeness_with_flight() {
        let days = vec![DayPlan {
            date: date(1),
            activities: vec![activity("food", TimeWindow::hm((9, 0), (10, 0)), Some(1.0))],
        }];
        let flight = FlightOption {
            origin: "Porto".to_string(),
            destination: "Lisbon".to_string(),
            price: 80.0,
            carrier: "Estimated fare".to_string(),
            source: Source::Fallback,
        };
        let weather = [(date(1), forecast())].into_iter().collect();
        let itinerary = Itinerary::new(1, days, Some(flight), weather);
        assert_eq!(completeness(&itinerary, &trip(1).with_origin("Porto")), 1.0);
    }

    #[test]
    fn test_overall_is_weighted_average() {
        let scores: BTreeMap<Dimension, f64> = [
            (Dimension::BudgetAdherence, 1.0),
            (Dimension::TimelineFeasibility, 0.0),
            (Dimension::PreferenceMatch, 1.0),
            (Dimension::Completeness, 0.0),
        ]
        .into_iter()
        .collect();
        assert!((overall(&scores, &DimensionWeights::default()) - 0.55).abs() < 1e-9);
    }
}
