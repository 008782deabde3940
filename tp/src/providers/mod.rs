//! External data providers
//!
//! Capability traits for weather, points of interest and flights, the live
//! HTTP implementations, and the deterministic fallback data used whenever a
//! live call cannot be made or fails.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ProvidersConfig;
use crate::domain::{FlightOption, Forecast, Source};

pub mod fallback;
mod live;

pub use live::{AmadeusFlights, FoursquarePoi, OpenWeather};

/// Errors from a single provider call
///
/// Always recovered inside generation by substituting fallback data.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Missing credentials: set {0}")]
    MissingCredentials(String),

    #[error("Provider disabled (offline mode)")]
    Offline,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No results for {0}")]
    NoResults(String),

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// A place that can become an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub name: String,
    /// Preference tag this place satisfies
    pub category: String,
    pub location: String,
    /// 0 (free) to 4 (very expensive)
    pub price_level: u8,
    pub source: Source,
}

/// Forecast lookup
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Forecasts for as many of `dates` as the provider covers
    async fn fetch_weather(
        &self,
        location: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, ProviderError>;
}

/// Points-of-interest search
#[async_trait]
pub trait PoiProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_poi(&self, location: &str, preferences: &BTreeSet<String>) -> Result<Vec<Poi>, ProviderError>;
}

/// Round-trip flight search
#[async_trait]
pub trait FlightProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Offers for the whole party, cheapest first
    async fn fetch_flights(
        &self,
        origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: NaiveDate,
        travelers: u32,
    ) -> Result<Vec<FlightOption>, ProviderError>;
}

/// Provider that refuses every call, forcing fallback data
pub struct OfflineProvider;

#[async_trait]
impl WeatherProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch_weather(
        &self,
        _location: &str,
        _dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, ProviderError> {
        Err(ProviderError::Offline)
    }
}

#[async_trait]
impl PoiProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch_poi(&self, _location: &str, _preferences: &BTreeSet<String>) -> Result<Vec<Poi>, ProviderError> {
        Err(ProviderError::Offline)
    }
}

#[async_trait]
impl FlightProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch_flights(
        &self,
        _origin: &str,
        _destination: &str,
        _depart: NaiveDate,
        _return_date: NaiveDate,
        _travelers: u32,
    ) -> Result<Vec<FlightOption>, ProviderError> {
        Err(ProviderError::Offline)
    }
}

/// The three providers generation calls, with their per-call timeouts
#[derive(Clone)]
pub struct ProviderSet {
    pub weather: Arc<dyn WeatherProvider>,
    pub poi: Arc<dyn PoiProvider>,
    pub flights: Arc<dyn FlightProvider>,
    pub weather_timeout: Duration,
    pub poi_timeout: Duration,
    pub flights_timeout: Duration,
}

impl ProviderSet {
    /// Live providers per config, or offline providers when `offline` is set
    pub fn from_config(config: &ProvidersConfig) -> Self {
        debug!(offline = config.offline, "ProviderSet::from_config: called");
        let mut set = if config.offline {
            Self::offline()
        } else {
            Self {
                weather: Arc::new(OpenWeather::new(&config.weather)),
                poi: Arc::new(FoursquarePoi::new(&config.poi)),
                flights: Arc::new(AmadeusFlights::new(&config.flights)),
                ..Self::offline()
            }
        };
        set.weather_timeout = Duration::from_millis(config.weather.timeout_ms);
        set.poi_timeout = Duration::from_millis(config.poi.timeout_ms);
        set.flights_timeout = Duration::from_millis(config.flights.timeout_ms);
        set
    }

    /// Every provider refuses; all data comes from fallback
    pub fn offline() -> Self {
        Self {
            weather: Arc::new(OfflineProvider),
            poi: Arc::new(OfflineProvider),
            flights: Arc::new(OfflineProvider),
            weather_timeout: Duration::from_secs(5),
            poi_timeout: Duration::from_secs(5),
            flights_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider returning canned data, counting calls
    #[derive(Default)]
    pub struct StaticProvider {
        forecasts: BTreeMap<NaiveDate, Forecast>,
        pois: Vec<Poi>,
        flights: Vec<FlightOption>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_forecasts(mut self, forecasts: impl IntoIterator<Item = (NaiveDate, Forecast)>) -> Self {
            self.forecasts = forecasts.into_iter().collect();
            self
        }

        pub fn with_pois(mut self, pois: Vec<Poi>) -> Self {
            self.pois = pois;
            self
        }

        pub fn with_flights(mut self, flights: Vec<FlightOption>) -> Self {
            self.flights = flights;
            self
        }

        /// Sleep before answering every call
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_weather(
            &self,
            _location: &str,
            dates: &[NaiveDate],
        ) -> Result<BTreeMap<NaiveDate, Forecast>, ProviderError> {
            self.tick().await;
            Ok(self
                .forecasts
                .iter()
                .filter(|(d, _)| dates.contains(d))
                .map(|(d, f)| (*d, f.clone()))
                .collect())
        }
    }

    #[async_trait]
    impl PoiProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_poi(&self, _location: &str, _preferences: &BTreeSet<String>) -> Result<Vec<Poi>, ProviderError> {
            self.tick().await;
            Ok(self.pois.clone())
        }
    }

    #[async_trait]
    impl FlightProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_flights(
            &self,
            _origin: &str,
            _destination: &str,
            _depart: NaiveDate,
            _return_date: NaiveDate,
            _travelers: u32,
        ) -> Result<Vec<FlightOption>, ProviderError> {
            self.tick().await;
            Ok(self.flights.clone())
        }
    }

    /// Provider whose every call fails with an HTTP 503
    pub struct FailingProvider;

    fn unavailable() -> ProviderError {
        ProviderError::Http {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }

    #[async_trait]
    impl WeatherProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_weather(
            &self,
            _location: &str,
            _dates: &[NaiveDate],
        ) -> Result<BTreeMap<NaiveDate, Forecast>, ProviderError> {
            Err(unavailable())
        }
    }

    #[async_trait]
    impl PoiProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_poi(&self, _location: &str, _preferences: &BTreeSet<String>) -> Result<Vec<Poi>, ProviderError> {
            Err(unavailable())
        }
    }

    #[async_trait]
    impl FlightProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_flights(
            &self,
            _origin: &str,
            _destination: &str,
            _depart: NaiveDate,
            _return_date: NaiveDate,
            _travelers: u32,
        ) -> Result<Vec<FlightOption>, ProviderError> {
            Err(unavailable())
        }
    }
}
