//! Feedback issues and clarification questions

use tracing::debug;

use super::scoring::{CompletenessStats, TimelineStats, missing_preferences};
use crate::config::CritiqueConfig;
use crate::domain::{CritiqueResult, Dimension, Issue, Itinerary, TripRequest};

/// Most questions attached to a session
pub const MAX_QUESTIONS: usize = 3;

fn describe(dimension: Dimension, itinerary: &Itinerary, trip: &TripRequest) -> (String, String) {
    match dimension {
        Dimension::BudgetAdherence => {
            let cost = itinerary.total_estimated_cost();
            let description = if trip.budget_total > 0.0 {
                let pct = (cost - trip.budget_total) / trip.budget_total * 100.0;
                format!(
                    "cost {:.0} {} exceeds budget {:.0} {} by {:.0}%",
                    cost, trip.currency, trip.budget_total, trip.currency, pct
                )
            } else {
                format!("no budget available but the plan costs {:.0} {}", cost, trip.currency)
            };
            (
                description,
                "reduce activity cost, drop optional evening activities and pick the cheapest flight".to_string(),
            )
        }
        Dimension::TimelineFeasibility => {
            let stats = TimelineStats::of(itinerary, trip);
            (
                format!(
                    "{} of {} days planned with {} empty days and {} overlapping activities",
                    stats.planned_days, stats.requested_days, stats.empty_days, stats.overlaps
                ),
                "plan every requested day with fewer, non-overlapping activities".to_string(),
            )
        }
        Dimension::PreferenceMatch => {
            let missing = missing_preferences(itinerary, trip).join(", ");
            (
                format!("no activities for preferences: {}", missing),
                format!("schedule at least one activity for: {}", missing),
            )
        }
        Dimension::Completeness => {
            let stats = CompletenessStats::of(itinerary, trip);
            let mut gaps = Vec::new();
            if stats.days_without_weather > 0 {
                gaps.push(format!("weather for {} days", stats.days_without_weather));
            }
            if stats.activities_missing_fields > 0 {
                gaps.push(format!("details for {} activities", stats.activities_missing_fields));
            }
            if stats.flight_missing {
                gaps.push("a flight option".to_string());
            }
            if gaps.is_empty() {
                gaps.push("required fields".to_string());
            }
            (
                format!("missing {}", gaps.join(" and ")),
                "fill the missing fields from fallback data".to_string(),
            )
        }
    }
}

/// Issues for a failed critique, most severe first
///
/// Every dimension below its floor gets an issue. When the overall average
/// is what failed, dimensions below the acceptance threshold are added so
/// the next attempt has something to act on. Passing results get none.
pub fn issues(result: &CritiqueResult, itinerary: &Itinerary, trip: &TripRequest, config: &CritiqueConfig) -> Vec<Issue> {
    debug!(passed = result.passed, "issues: called");
    if result.passed {
        return Vec::new();
    }

    let mut flagged: Vec<(f64, Dimension)> = result
        .scores
        .iter()
        .filter(|(d, s)| **s < config.floors.get(**d) || **s < config.acceptance_threshold)
        .map(|(d, s)| {
            let floor = config.floors.get(*d);
            let relative = if floor > 0.0 { s / floor } else { *s };
            (relative, *d)
        })
        .collect();

    if flagged.is_empty()
        && let Some((dimension, score)) = result.weakest()
    {
        flagged.push((score, dimension));
    }

    flagged.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    flagged
        .into_iter()
        .map(|(_, dimension)| {
            let (description, suggested_fix) = describe(dimension, itinerary, trip);
            Issue {
                dimension,
                description,
                suggested_fix,
            }
        })
        .collect()
}

fn question_for(dimension: Dimension, trip: &TripRequest) -> String {
    match dimension {
        Dimension::BudgetAdherence => format!(
            "Is the total budget of {:.0} {} firm, or could it stretch?",
            trip.budget_total, trip.currency
        ),
        Dimension::TimelineFeasibility => {
            "Would you prefer a slower pace with fewer activities per day?".to_string()
        }
        Dimension::PreferenceMatch => {
            let prefs: Vec<&str> = trip.preferences.iter().map(String::as_str).collect();
            format!("Which of your interests matters most: {}?", prefs.join(", "))
        }
        Dimension::Completeness => "Which city are you departing from, and are your dates fixed?".to_string(),
    }
}

/// Up to three questions that would most improve the next plan
///
/// Weakest critique dimensions come first, then unresolved parser ambiguities.
pub fn clarification_questions(critique: Option<&CritiqueResult>, trip: &TripRequest) -> Vec<String> {
    debug!(has_critique = critique.is_some(), ambiguities = trip.ambiguities.len(), "clarification_questions: called");
    let mut questions: Vec<String> = Vec::new();

    if let Some(critique) = critique {
        for issue in &critique.feedback {
            let question = question_for(issue.dimension, trip);
            if !questions.contains(&question) {
                questions.push(question);
            }
        }
    }

    for ambiguity in &trip.ambiguities {
        let question = format!("Could you clarify: {}?", ambiguity.trim_end_matches('.'));
        if !questions.contains(&question) {
            questions.push(question);
        }
    }

    questions.truncate(MAX_QUESTIONS);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Activity, DayPlan, Source, TimeWindow};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn trip() -> TripRequest {
        TripRequest::new("Rome", NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), 1)
            .with_budget(100.0)
            .with_preferences(["food", "art"])
    }

    fn itinerary(cost: f64) -> Itinerary {
        let day = DayPlan {
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            activities: vec![Activity {
                name: "Trattoria".to_string(),
                category: "food".to_string(),
                window: TimeWindow::hm((12, 0), (13, 0)),
                location: "Trastevere".to_string(),
                estimated_cost: Some(cost),
                source: Source::Fallback,
            }],
        };
        Itinerary::new(1, vec![day], None, Default::default())
    }

    fn scores(values: [f64; 4]) -> BTreeMap<Dimension, f64> {
        Dimension::ALL.iter().copied().zip(values).collect()
    }

    fn scored(values: [f64; 4], passed: bool) -> CritiqueResult {
        CritiqueResult {
            attempt: 1,
            scores: scores(values),
            overall_score: values.iter().sum::<f64>() / 4.0,
            passed,
            feedback: vec![],
        }
    }

    #[test]
    fn test_passed_has_no_issues() {
        let result = issues(
            &scored([1.0; 4], true),
            &itinerary(50.0),
            &trip(),
            &CritiqueConfig::default(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_issues_ordered_by_severity() {
        let result = issues(
            &scored([0.3, 1.0, 0.1, 0.9], false),
            &itinerary(170.0),
            &trip(),
            &CritiqueConfig::default(),
        );
        let dims: Vec<Dimension> = result.iter().map(|i| i.dimension).collect();
        assert_eq!(dims, vec![Dimension::PreferenceMatch, Dimension::BudgetAdherence]);
        assert_eq!(result[1].description, "cost 170 USD exceeds budget 100 USD by 70%");
        assert!(result[0].description.contains("art"));
    }

    #[test]
    fn test_failed_average_without_floor_breach_still_has_feedback() {
        let result = issues(
            &scored([0.65, 0.65, 0.65, 0.65], false),
            &itinerary(50.0),
            &trip(),
            &CritiqueConfig::default(),
        );
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_failed_result_above_every_bar_names_weakest_dimension() {
        let result = issues(
            &scored([0.9, 0.95, 0.85, 0.85], false),
            &itinerary(50.0),
            &trip(),
            &CritiqueConfig::default(),
        );
        let dims: Vec<Dimension> = result.iter().map(|i| i.dimension).collect();
        assert_eq!(dims, vec![Dimension::PreferenceMatch]);
    }

    #[test]
    fn test_clarification_questions_capped() {
        let mut trip = trip();
        trip.ambiguities = vec![
            "start date not stated".to_string(),
            "budget not stated".to_string(),
        ];
        let mut critique = scored([0.2, 1.0, 0.5, 1.0], false);
        critique.attempt = 3;
        critique.feedback = issues(&critique, &itinerary(200.0), &trip, &CritiqueConfig::default());

        let questions = clarification_questions(Some(&critique), &trip);
        assert_eq!(questions.len(), MAX_QUESTIONS);
        assert!(questions[0].contains("budget of 100 USD"));
        assert_eq!(questions[2], "Could you clarify: start date not stated?");
    }

    #[test]
    fn test_questions_from_ambiguities_only() {
        let mut trip = trip();
        trip.ambiguities = vec!["traveler count not stated".to_string()];
        assert_eq!(
            clarification_questions(None, &trip),
            vec!["Could you clarify: traveler count not stated?".to_string()]
        );
    }
}
