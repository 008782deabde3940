//! TripRequest domain type
//!
//! The structured form of a natural-language travel ask. A request is never
//! edited field by field once parsed; a flagged copy replaces it wholesale.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Default currency when none is stated
pub const DEFAULT_CURRENCY: &str = "USD";

/// Longest trip any component will plan; configured limits must stay at or below it
pub const MAX_DURATION_DAYS: u32 = 365;

/// Parsed travel request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    /// City or region being visited
    pub destination: String,

    /// Departure city, when stated
    #[serde(default)]
    pub origin: Option<String>,

    /// First day of the trip
    pub start_date: NaiveDate,

    /// Number of days (at least 1)
    pub duration_days: u32,

    /// Total budget for the whole party
    pub budget_total: f64,

    /// ISO currency code for `budget_total`
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Number of travelers (at least 1)
    pub traveler_count: u32,

    /// Free-form preference tags, lowercase
    #[serde(default)]
    pub preferences: BTreeSet<String>,

    /// How certain the parser is about this extraction, in [0, 1]
    pub confidence: f64,

    /// Unresolved details, in the order they were noticed
    #[serde(default)]
    pub ambiguities: Vec<String>,

    /// Set when confidence fell below the acceptance minimum
    #[serde(default)]
    pub low_confidence: bool,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl TripRequest {
    /// Create a request with neutral defaults (one traveler, no budget, full confidence)
    pub fn new(destination: impl Into<String>, start_date: NaiveDate, duration_days: u32) -> Self {
        let destination = destination.into();
        debug!(%destination, %start_date, duration_days, "TripRequest::new: called");
        Self {
            destination,
            origin: None,
            start_date,
            duration_days,
            budget_total: 0.0,
            currency: default_currency(),
            traveler_count: 1,
            preferences: BTreeSet::new(),
            confidence: 1.0,
            ambiguities: Vec::new(),
            low_confidence: false,
        }
    }

    pub fn with_budget(mut self, budget_total: f64) -> Self {
        self.budget_total = budget_total;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_travelers(mut self, traveler_count: u32) -> Self {
        self.traveler_count = traveler_count;
        self
    }

    pub fn with_preferences<I, S>(mut self, preferences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.preferences = preferences.into_iter().map(|p| p.as_ref().to_lowercase()).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Copy of this request marked as low-confidence
    pub fn flagged_low_confidence(&self) -> Self {
        debug!(confidence = self.confidence, "flagged_low_confidence: called");
        Self {
            low_confidence: true,
            ..self.clone()
        }
    }

    /// Last day of the trip (inclusive)
    ///
    /// Saturates at `NaiveDate::MAX` rather than overflowing.
    pub fn end_date(&self) -> NaiveDate {
        self.start_date
            .checked_add_days(Days::new(u64::from(self.duration_days.max(1)) - 1))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Every date of the trip in order
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..u64::from(self.duration_days))
            .map_while(|offset| self.start_date.checked_add_days(Days::new(offset)))
            .collect()
    }

    /// True when travel between two different places is implied
    pub fn is_inter_city(&self) -> bool {
        match &self.origin {
            Some(origin) => {
                let origin = origin.trim();
                !origin.is_empty() && !origin.eq_ignore_ascii_case(self.destination.trim())
            }
            None => false,
        }
    }
}
