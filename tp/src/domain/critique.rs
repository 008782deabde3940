//! CritiqueResult domain type

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Quality dimension scored by the critic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    BudgetAdherence,
    TimelineFeasibility,
    PreferenceMatch,
    Completeness,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::BudgetAdherence,
        Dimension::TimelineFeasibility,
        Dimension::PreferenceMatch,
        Dimension::Completeness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetAdherence => "budget_adherence",
            Self::TimelineFeasibility => "timeline_feasibility",
            Self::PreferenceMatch => "preference_match",
            Self::Completeness => "completeness",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One actionable shortfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub dimension: Dimension,
    pub description: String,
    /// Directive the generator can act on
    pub suggested_fix: String,
}

/// Outcome of one evaluation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueResult {
    /// Generation attempt that was evaluated
    pub attempt: u32,
    pub scores: BTreeMap<Dimension, f64>,
    pub overall_score: f64,
    pub passed: bool,
    /// Most severe first; empty iff passed
    pub feedback: Vec<Issue>,
}

impl CritiqueResult {
    /// Score for a dimension, 0.0 when missing
    pub fn score(&self, dimension: Dimension) -> f64 {
        self.scores.get(&dimension).copied().unwrap_or(0.0)
    }

    /// Lowest-scoring dimension (first in dimension order on ties)
    pub fn weakest(&self) -> Option<(Dimension, f64)> {
        self.scores
            .iter()
            .map(|(d, s)| (*d, *s))
            .fold(None, |best, (d, s)| match best {
                Some((_, bs)) if bs <= s => best,
                _ => Some((d, s)),
            })
    }
}
