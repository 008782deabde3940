//! Transition guards
//!
//! Every branch of the planning state machine is decided here, as a pure
//! function of the latest result and the attempt count.

use crate::domain::{CritiqueResult, PlanStatus, TripRequest};

/// Decision after a successful parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Confidence is at or above the minimum
    Proceed,
    /// Proceed anyway, carrying a low-confidence flag
    ProceedFlagged,
}

/// Decision after a critique
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CritiqueOutcome {
    Accept,
    Retry,
    Exhausted,
}

impl CritiqueOutcome {
    pub fn next_status(self) -> PlanStatus {
        match self {
            Self::Accept => PlanStatus::Succeeded,
            Self::Retry => PlanStatus::Generating,
            Self::Exhausted => PlanStatus::FailedBudgetExhausted,
        }
    }
}

pub fn after_parse(trip: &TripRequest, min_confidence: f64) -> ParseOutcome {
    if trip.confidence >= min_confidence {
        ParseOutcome::Proceed
    } else {
        ParseOutcome::ProceedFlagged
    }
}

/// Accept a pass, otherwise retry while attempts remain
pub fn after_critique(critique: &CritiqueResult, attempt_count: u32, max_attempts: u32) -> CritiqueOutcome {
    if critique.passed {
        CritiqueOutcome::Accept
    } else if attempt_count < max_attempts {
        CritiqueOutcome::Retry
    } else {
        CritiqueOutcome::Exhausted
    }
}

/// True when another generation may start
pub fn can_generate(attempt_count: u32, max_attempts: u32) -> bool {
    attempt_count < max_attempts
}

/// Highest overall score; ties go to the earliest attempt
pub fn best_attempt(history: &[CritiqueResult]) -> Option<&CritiqueResult> {
    history.iter().fold(None, |best: Option<&CritiqueResult>, candidate| match best {
        Some(current)
            if current.overall_score > candidate.overall_score
                || (current.overall_score == candidate.overall_score && current.attempt <= candidate.attempt) =>
        {
            Some(current)
        }
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn critique(attempt: u32, overall_score: f64, passed: bool) -> CritiqueResult {
        CritiqueResult {
            attempt,
            scores: Default::default(),
            overall_score,
            passed,
            feedback: Vec::new(),
        }
    }

    #[test]
    fn test_after_parse_flags_low_confidence() {
        let trip = TripRequest::new("Oslo", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 2);
        assert_eq!(after_parse(&trip.clone().with_confidence(0.5), 0.5), ParseOutcome::Proceed);
        assert_eq!(after_parse(&trip.with_confidence(0.49), 0.5), ParseOutcome::ProceedFlagged);
    }

    #[test]
    fn test_after_critique() {
        assert_eq!(after_critique(&critique(1, 0.8, true), 1, 3), CritiqueOutcome::Accept);
        assert_eq!(after_critique(&critique(3, 0.8, true), 3, 3), CritiqueOutcome::Accept);
        assert_eq!(after_critique(&critique(2, 0.6, false), 2, 3), CritiqueOutcome::Retry);
        assert_eq!(after_critique(&critique(3, 0.6, false), 3, 3), CritiqueOutcome::Exhausted);
        assert_eq!(CritiqueOutcome::Retry.next_status(), PlanStatus::Generating);
    }

    #[test]
    fn test_best_attempt_prefers_earliest_tie() {
        let history = vec![critique(1, 0.5, false), critique(2, 0.6, false), critique(3, 0.6, false)];
        assert_eq!(best_attempt(&history).map(|c| c.attempt), Some(2));
        assert!(best_attempt(&[]).is_none());

        let rising = vec![critique(1, 0.5, false), critique(2, 0.55, false), critique(3, 0.6, false)];
        assert_eq!(best_attempt(&rising).map(|c| c.attempt), Some(3));
    }

    #[test]
    fn test_can_generate() {
        assert!(can_generate(0, 3));
        assert!(can_generate(2, 3));
        assert!(!can_generate(3, 3));
    }
}
