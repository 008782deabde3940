//! Itinerary domain types
//!
//! An itinerary is replaced, never merged, on each generation attempt. Its
//! total cost is derived from the activities and flight it contains and is
//! recomputed on construction and on deserialization.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Where a piece of data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Returned by an external provider
    Live,
    /// Computed locally because the provider was unavailable
    Fallback,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Half-open time window within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build from hour/minute pairs; invalid values clamp to midnight
    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Self {
        let t = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self::new(t(start), t(end))
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One scheduled activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    /// Preference tag this activity satisfies (e.g. "food")
    pub category: String,
    pub window: TimeWindow,
    pub location: String,
    /// Cost for the whole party; `None` when unknown
    pub estimated_cost: Option<f64>,
    pub source: Source,
}

/// Activities for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub activities: Vec<Activity>,
}

impl DayPlan {
    /// Count consecutive activity pairs whose windows overlap
    ///
    /// Activities are compared in start-time order.
    pub fn overlap_count(&self) -> usize {
        let mut windows: Vec<&TimeWindow> = self.activities.iter().map(|a| &a.window).collect();
        windows.sort_by_key(|w| w.start);
        windows.windows(2).filter(|pair| pair[0].overlaps(pair[1])).count()
    }

    pub fn cost(&self) -> f64 {
        self.activities.iter().filter_map(|a| a.estimated_cost).sum()
    }
}

/// A round-trip flight option for the whole party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub carrier: String,
    pub source: Source,
}

/// Forecast summary for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub summary: String,
    pub high_c: f64,
    pub low_c: f64,
    /// Chance of precipitation in [0, 1]
    pub precipitation_chance: f64,
    pub source: Source,
}

/// Data category fetched during generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Weather,
    Poi,
    Flights,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weather => write!(f, "weather"),
            Self::Poi => write!(f, "points of interest"),
            Self::Flights => write!(f, "flights"),
        }
    }
}

/// Which source was used for a data category, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub kind: DataKind,
    pub source: Source,
    /// Provider failure or partial-coverage note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Day-by-day plan produced by one generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ItineraryRecord")]
pub struct Itinerary {
    title: String,
    days: Vec<DayPlan>,
    flights: Option<FlightOption>,
    weather: BTreeMap<NaiveDate, Forecast>,
    total_estimated_cost: f64,
    generation_attempt: u32,
    provenance: Vec<Provenance>,
}

/// Serialized shape; the stored total is ignored and recomputed
#[derive(Deserialize)]
struct ItineraryRecord {
    #[serde(default)]
    title: String,
    days: Vec<DayPlan>,
    #[serde(default)]
    flights: Option<FlightOption>,
    #[serde(default)]
    weather: BTreeMap<NaiveDate, Forecast>,
    generation_attempt: u32,
    #[serde(default)]
    provenance: Vec<Provenance>,
}

impl From<ItineraryRecord> for Itinerary {
    fn from(record: ItineraryRecord) -> Self {
        Itinerary::new(record.generation_attempt, record.days, record.flights, record.weather)
            .with_title(record.title)
            .with_provenance(record.provenance)
    }
}

impl Itinerary {
    /// Build an itinerary; the total cost is derived here
    pub fn new(
        generation_attempt: u32,
        days: Vec<DayPlan>,
        flights: Option<FlightOption>,
        weather: BTreeMap<NaiveDate, Forecast>,
    ) -> Self {
        debug!(generation_attempt, day_count = days.len(), "Itinerary::new: called");
        let total_estimated_cost = compute_total(&days, flights.as_ref());
        Self {
            title: String::new(),
            days,
            flights,
            weather,
            total_estimated_cost,
            generation_attempt,
            provenance: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_provenance(mut self, provenance: Vec<Provenance>) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn days(&self) -> &[DayPlan] {
        &self.days
    }

    pub fn flights(&self) -> Option<&FlightOption> {
        self.flights.as_ref()
    }

    pub fn weather(&self) -> &BTreeMap<NaiveDate, Forecast> {
        &self.weather
    }

    pub fn total_estimated_cost(&self) -> f64 {
        self.total_estimated_cost
    }

    /// 1-based attempt that produced this itinerary
    pub fn generation_attempt(&self) -> u32 {
        self.generation_attempt
    }

    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.days.iter().flat_map(|d| d.activities.iter())
    }

    /// True when any part of the itinerary used locally computed data
    pub fn uses_fallback(&self) -> bool {
        self.provenance.iter().any(|p| p.source == Source::Fallback)
            || self.activities().any(|a| a.source == Source::Fallback)
            || self.weather.values().any(|w| w.source == Source::Fallback)
            || self.flights.as_ref().is_some_and(|f| f.source == Source::Fallback)
    }
}

fn compute_total(days: &[DayPlan], flights: Option<&FlightOption>) -> f64 {
    let activities: f64 = days.iter().map(DayPlan::cost).sum();
    let flight = flights.map(|f| f.price).unwrap_or(0.0);
    (activities + flight).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn activity(name: &str, window: TimeWindow, cost: Option<f64>) -> Activity {
        Activity {
            name: name.to_string(),
            category: "culture".to_string(),
            window,
            location: "Old Town".to_string(),
            estimated_cost: cost,
            source: Source::Live,
        }
    }

    fn flight(price: f64) -> FlightOption {
        FlightOption {
            origin: "Boston".to_string(),
            destination: "Rome".to_string(),
            price,
            carrier: "AZ".to_string(),
            source: Source::Live,
        }
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        let days = vec![
            DayPlan {
                date: date(1),
                activities: vec![
                    activity("Museum", TimeWindow::hm((9, 0), (11, 0)), Some(25.0)),
                    activity("Dinner", TimeWindow::hm((19, 0), (21, 0)), Some(60.5)),
                ],
            },
            DayPlan {
                date: date(2),
                activities: vec![activity("Walk", TimeWindow::hm((10, 0), (12, 0)), None)],
            },
        ];
        let itinerary = Itinerary::new(1, days, Some(flight(400.0)), BTreeMap::new());
        assert!((itinerary.total_estimated_cost() - 485.5).abs() < 1e-9);
    }

    #[test]
    fn test_deserialize_recomputes_total() {
        let itinerary = Itinerary::new(
            2,
            vec![DayPlan {
                date: date(3),
                activities: vec![activity("Tour", TimeWindow::hm((9, 0), (10, 0)), Some(40.0))],
            }],
            None,
            BTreeMap::new(),
        );
        let mut value = serde_json::to_value(&itinerary).unwrap();
        value["total_estimated_cost"] = serde_json::json!(9999.0);

        let restored: Itinerary = serde_json::from_value(value).unwrap();
        assert_eq!(restored.total_estimated_cost(), 40.0);
        assert_eq!(restored, itinerary);
    }

    #[test]
    fn test_overlap_count_uses_start_order() {
        let day = DayPlan {
            date: date(1),
            activities: vec![
                activity("B", TimeWindow::hm((10, 0), (12, 0)), None),
                activity("A", TimeWindow::hm((9, 0), (10, 30)), None),
                activity("C", TimeWindow::hm((13, 0), (14, 0)), None),
            ],
        };
        assert_eq!(day.overlap_count(), 1);
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        let a = TimeWindow::hm((9, 0), (10, 0));
        let b = TimeWindow::hm((10, 0), (11, 0));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&TimeWindow::hm((9, 30), (9, 45))));
    }

    #[test]
    fn test_uses_fallback() {
        let mut day = DayPlan {
            date: date(1),
            activities: vec![activity("A", TimeWindow::hm((9, 0), (10, 0)), Some(1.0))],
        };
        let live = Itinerary::new(1, vec![day.clone()], None, BTreeMap::new());
        assert!(!live.uses_fallback());

        day.activities[0].source = Source::Fallback;
        let degraded = Itinerary::new(1, vec![day], None, BTreeMap::new());
        assert!(degraded.uses_fallback());
    }
}
