//! ItineraryGenerator - provider-backed generation with per-provider fallback

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::adjustments::Adjustments;
use super::{GenerationError, Generator};
use crate::domain::{
    Activity, CritiqueResult, DataKind, DayPlan, FlightOption, Forecast, Itinerary, MAX_DURATION_DAYS, Provenance,
    Source, TimeWindow, TripRequest,
};
use crate::providers::fallback::{self, GENERAL_CATEGORY};
use crate::providers::{Poi, ProviderError, ProviderSet};

/// Morning, afternoon and evening windows
const DAY_SLOTS: [((u32, u32), (u32, u32)); 3] = [((9, 0), (11, 30)), ((13, 0), (16, 0)), ((18, 30), (20, 30))];

/// Per-person cost estimate for each price level
const PRICE_LEVEL_COST: [f64; 5] = [0.0, 15.0, 35.0, 70.0, 120.0];

/// Estimated cost of a place for the whole party
pub fn cost_for_level(price_level: u8, travelers: u32) -> f64 {
    PRICE_LEVEL_COST[usize::from(price_level.min(4))] * f64::from(travelers.max(1))
}

/// Run a provider call under its own deadline
async fn bounded<T>(limit: Duration, call: impl Future<Output = Result<T, ProviderError>>) -> Result<T, ProviderError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

/// Generator that schedules provider data into day plans
pub struct ItineraryGenerator {
    providers: ProviderSet,
}

impl ItineraryGenerator {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }

    fn validate(trip: &TripRequest) -> Result<(), GenerationError> {
        if trip.destination.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("destination is empty".to_string()));
        }
        if trip.duration_days == 0 {
            return Err(GenerationError::InvalidRequest(
                "duration must be at least one day".to_string(),
            ));
        }
        if trip.duration_days > MAX_DURATION_DAYS {
            return Err(GenerationError::InvalidRequest(format!(
                "duration of {} days exceeds the {}-day limit",
                trip.duration_days, MAX_DURATION_DAYS
            )));
        }
        if trip.traveler_count == 0 {
            return Err(GenerationError::InvalidRequest(
                "traveler count must be at least one".to_string(),
            ));
        }
        Ok(())
    }

    /// Live forecasts with seasonal averages filling every uncovered date
    fn resolve_weather(
        trip: &TripRequest,
        result: Result<BTreeMap<chrono::NaiveDate, Forecast>, ProviderError>,
    ) -> (BTreeMap<chrono::NaiveDate, Forecast>, Provenance) {
        let dates = trip.dates();
        match result {
            Ok(mut forecasts) => {
                forecasts.retain(|date, _| dates.contains(date));
                let missing: Vec<_> = dates.iter().filter(|d| !forecasts.contains_key(*d)).copied().collect();
                for date in &missing {
                    forecasts.insert(*date, fallback::weather(&trip.destination, *date));
                }
                let provenance = if missing.is_empty() {
                    Provenance {
                        kind: DataKind::Weather,
                        source: Source::Live,
                        detail: None,
                    }
                } else if missing.len() == dates.len() {
                    Provenance {
                        kind: DataKind::Weather,
                        source: Source::Fallback,
                        detail: Some("forecast did not cover the trip dates".to_string()),
                    }
                } else {
                    Provenance {
                        kind: DataKind::Weather,
                        source: Source::Live,
                        detail: Some(format!("seasonal averages for {} of {} days", missing.len(), dates.len())),
                    }
                };
                (forecasts, provenance)
            }
            Err(e) => {
                warn!(error = %e, destination = %trip.destination, "resolve_weather: using seasonal averages");
                let forecasts = dates
                    .iter()
                    .map(|date| (*date, fallback::weather(&trip.destination, *date)))
                    .collect();
                let provenance = Provenance {
                    kind: DataKind::Weather,
                    source: Source::Fallback,
                    detail: Some(e.to_string()),
                };
                (forecasts, provenance)
            }
        }
    }

    /// Live places, topped up from the catalogue for uncovered categories
    fn resolve_pois(trip: &TripRequest, result: Result<Vec<Poi>, ProviderError>) -> (Vec<Poi>, Provenance) {
        let result = result.and_then(|pois| {
            if pois.is_empty() {
                Err(ProviderError::NoResults(trip.destination.clone()))
            } else {
                Ok(pois)
            }
        });

        match result {
            Ok(mut pois) => {
                let wanted: BTreeSet<&str> = trip
                    .preferences
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(GENERAL_CATEGORY))
                    .collect();
                let uncovered: Vec<&str> = wanted
                    .into_iter()
                    .filter(|category| !pois.iter().any(|p| p.category.eq_ignore_ascii_case(category)))
                    .collect();
                for category in &uncovered {
                    pois.extend(fallback::pois_for_category(&trip.destination, category));
                }
                let detail = (!uncovered.is_empty()).then(|| format!("catalogue places for: {}", uncovered.join(", ")));
                let provenance = Provenance {
                    kind: DataKind::Poi,
                    source: Source::Live,
                    detail,
                };
                (pois, provenance)
            }
            Err(e) => {
                warn!(error = %e, destination = %trip.destination, "resolve_pois: using curated catalogue");
                let provenance = Provenance {
                    kind: DataKind::Poi,
                    source: Source::Fallback,
                    detail: Some(e.to_string()),
                };
                (fallback::pois(&trip.destination, &trip.preferences), provenance)
            }
        }
    }

    /// Chosen flight, or `None` when the trip needs no flight
    fn resolve_flight(
        trip: &TripRequest,
        result: Option<Result<Vec<FlightOption>, ProviderError>>,
        adjustments: &Adjustments,
    ) -> (Option<FlightOption>, Option<Provenance>) {
        let (Some(result), Some(origin)) = (result, trip.origin.as_deref()) else {
            return (None, None);
        };

        let (offers, provenance) = match result {
            Ok(offers) if !offers.is_empty() => (
                offers,
                Provenance {
                    kind: DataKind::Flights,
                    source: Source::Live,
                    detail: None,
                },
            ),
            other => {
                let detail = match other {
                    Err(e) => e.to_string(),
                    Ok(_) => ProviderError::NoResults(format!("{} to {}", origin, trip.destination)).to_string(),
                };
                warn!(%detail, "resolve_flight: using estimated fare");
                (
                    vec![fallback::flight(origin, &trip.destination, trip.traveler_count)],
                    Provenance {
                        kind: DataKind::Flights,
                        source: Source::Fallback,
                        detail: Some(detail),
                    },
                )
            }
        };

        let chosen = if adjustments.cheapest_flight {
            offers.into_iter().min_by(|a, b| a.price.total_cmp(&b.price))
        } else {
            offers.into_iter().next()
        };
        (chosen, Some(provenance))
    }

    /// Lay places out over the trip dates
    fn schedule(trip: &TripRequest, pois: &[Poi], adjustments: &Adjustments) -> Result<Vec<DayPlan>, GenerationError> {
        debug!(poi_count = pois.len(), slots = adjustments.slots_per_day, "schedule: called");
        let mut by_category: BTreeMap<String, Vec<&Poi>> = BTreeMap::new();
        for poi in pois {
            by_category.entry(poi.category.to_lowercase()).or_default().push(poi);
        }
        if adjustments.cheapest_places {
            for places in by_category.values_mut() {
                places.sort_by_key(|p| p.price_level);
                let keep = places.len().div_ceil(2).max(1);
                places.truncate(keep);
            }
        }

        let mut rotation: Vec<String> = trip
            .preferences
            .iter()
            .filter(|p| by_category.contains_key(*p))
            .cloned()
            .collect();
        if (!adjustments.preferences_only || rotation.is_empty()) && by_category.contains_key(GENERAL_CATEGORY) {
            rotation.push(GENERAL_CATEGORY.to_string());
        }
        if rotation.is_empty() {
            rotation = by_category.keys().cloned().collect();
        }
        if rotation.is_empty() {
            return Err(GenerationError::NoActivities(trip.destination.clone()));
        }

        let slots = &DAY_SLOTS[..adjustments.slots_per_day.clamp(1, DAY_SLOTS.len())];
        let mut cursors: BTreeMap<&str, usize> = BTreeMap::new();
        let mut turn = 0usize;
        let mut days = Vec::with_capacity(trip.duration_days as usize);

        for date in trip.dates() {
            let mut activities = Vec::with_capacity(slots.len());
            for (start, end) in slots {
                let category = rotation[turn % rotation.len()].as_str();
                turn += 1;
                let Some(places) = by_category.get(category) else {
                    continue;
                };
                let cursor = cursors.entry(category).or_insert(0);
                let poi = places[*cursor % places.len()];
                *cursor += 1;
                activities.push(Activity {
                    name: poi.name.clone(),
                    category: category.to_string(),
                    window: TimeWindow::hm(*start, *end),
                    location: poi.location.clone(),
                    estimated_cost: Some(cost_for_level(poi.price_level, trip.traveler_count)),
                    source: poi.source,
                });
            }
            days.push(DayPlan { date, activities });
        }
        Ok(days)
    }
}

#[async_trait]
impl Generator for ItineraryGenerator {
    async fn generate(
        &self,
        trip: &TripRequest,
        feedback: Option<&CritiqueResult>,
        attempt: u32,
    ) -> Result<Itinerary, GenerationError> {
        debug!(destination = %trip.destination, attempt, "generate: called");
        Self::validate(trip)?;

        let adjustments = Adjustments::derive(trip, feedback);
        for note in &adjustments.notes {
            debug!(attempt, %note, "generate: adjustment");
        }

        let set = &self.providers;
        let dates = trip.dates();
        let flight_origin = trip.origin.as_deref().filter(|_| trip.is_inter_city());

        let weather_call = bounded(set.weather_timeout, set.weather.fetch_weather(&trip.destination, &dates));
        let poi_call = bounded(set.poi_timeout, set.poi.fetch_poi(&trip.destination, &trip.preferences));
        let flights_call = async {
            match flight_origin {
                Some(origin) => Some(
                    bounded(
                        set.flights_timeout,
                        set.flights.fetch_flights(
                            origin,
                            &trip.destination,
                            trip.start_date,
                            trip.end_date(),
                            trip.traveler_count,
                        ),
                    )
                    .await,
                ),
                None => None,
            }
        };
        let (weather_result, poi_result, flights_result) = tokio::join!(weather_call, poi_call, flights_call);

        let (weather, weather_provenance) = Self::resolve_weather(trip, weather_result);
        let (pois, poi_provenance) = Self::resolve_pois(trip, poi_result);
        let (flight, flight_provenance) = Self::resolve_flight(trip, flights_result, &adjustments);

        let days = Self::schedule(trip, &pois, &adjustments)?;

        let mut provenance = vec![weather_provenance, poi_provenance];
        provenance.extend(flight_provenance);

        let itinerary = Itinerary::new(attempt, days, flight, weather)
            .with_title(format!("{} days in {}", trip.duration_days, trip.destination))
            .with_provenance(provenance);

        info!(
            attempt,
            total = itinerary.total_estimated_cost(),
            fallback = itinerary.uses_fallback(),
            "generate: itinerary ready"
        );
        Ok(itinerary)
    }
}
