//! Live HTTP providers
//!
//! OpenWeather (5-day forecast), Foursquare (place search) and Amadeus
//! (flight offers). Credentials are read from the environment at call time;
//! when missing, the call fails with `MissingCredentials` before any request
//! is sent.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::{FlightProvider, Poi, PoiProvider, ProviderError, WeatherProvider};
use crate::config::ProviderEndpoint;
use crate::domain::{FlightOption, Forecast, Source};

/// Read a credential from the environment
fn credential(env_var: &str) -> Result<String, ProviderError> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ProviderError::MissingCredentials(env_var.to_string()))
}

/// Map non-success statuses to `ProviderError::Http`
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "check_status: provider returned error");
    Err(ProviderError::Http {
        status: status.as_u16(),
        message,
    })
}

fn trimmed_base(endpoint: &ProviderEndpoint) -> String {
    endpoint.base_url.trim_end_matches('/').to_string()
}

// === Weather ===

/// OpenWeather 5-day / 3-hour forecast
pub struct OpenWeather {
    http: Client,
    base_url: String,
    api_key_env: String,
}

impl OpenWeather {
    pub fn new(endpoint: &ProviderEndpoint) -> Self {
        Self {
            http: Client::new(),
            base_url: trimmed_base(endpoint),
            api_key_env: endpoint.api_key_env.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecast {
    list: Vec<OwEntry>,
}

#[derive(Debug, Deserialize)]
struct OwEntry {
    dt_txt: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwCondition>,
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct OwCondition {
    description: String,
}

/// Fold 3-hour entries into one forecast per requested date
fn aggregate_forecast(raw: OwForecast, dates: &[NaiveDate]) -> BTreeMap<NaiveDate, Forecast> {
    let mut per_day: BTreeMap<NaiveDate, (f64, f64, f64, BTreeMap<String, usize>)> = BTreeMap::new();

    for entry in raw.list {
        let Some(date) = entry
            .dt_txt
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if !dates.contains(&date) {
            continue;
        }
        let day = per_day
            .entry(date)
            .or_insert((f64::MIN, f64::MAX, 0.0, BTreeMap::new()));
        day.0 = day.0.max(entry.main.temp_max);
        day.1 = day.1.min(entry.main.temp_min);
        day.2 = day.2.max(entry.pop.clamp(0.0, 1.0));
        if let Some(condition) = entry.weather.first() {
            *day.3.entry(condition.description.clone()).or_insert(0) += 1;
        }
    }

    per_day
        .into_iter()
        .map(|(date, (high, low, pop, conditions))| {
            let summary = conditions
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(d, _)| d.clone())
                .unwrap_or_else(|| "unknown".to_string());
            (
                date,
                Forecast {
                    summary,
                    high_c: high,
                    low_c: low,
                    precipitation_chance: pop,
                    source: Source::Live,
                },
            )
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for OpenWeather {
    fn name(&self) -> &str {
        "openweather"
    }

    async fn fetch_weather(
        &self,
        location: &str,
        dates: &[NaiveDate],
    ) -> Result<BTreeMap<NaiveDate, Forecast>, ProviderError> {
        debug!(%location, date_count = dates.len(), "OpenWeather::fetch_weather: called");
        let api_key = credential(&self.api_key_env)?;

        let response = self
            .http
            .get(format!("{}/data/2.5/forecast", self.base_url))
            .query(&[("q", location), ("units", "metric"), ("appid", api_key.as_str())])
            .send()
            .await?;
        let raw: OwForecast = check_status(response).await?.json().await?;

        let forecasts = aggregate_forecast(raw, dates);
        if forecasts.is_empty() {
            return Err(ProviderError::NoResults(format!("weather in {}", location)));
        }
        info!(%location, days = forecasts.len(), "Fetched live weather");
        Ok(forecasts)
    }
}

// === Points of interest ===

/// Foursquare Places search, one query per preference
pub struct FoursquarePoi {
    http: Client,
    base_url: String,
    api_key_env: String,
}

impl FoursquarePoi {
    pub fn new(endpoint: &ProviderEndpoint) -> Self {
        Self {
            http: Client::new(),
            base_url: trimmed_base(endpoint),
            api_key_env: endpoint.api_key_env.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FsqSearch {
    #[serde(default)]
    results: Vec<FsqPlace>,
}

#[derive(Debug, Deserialize)]
struct FsqPlace {
    name: String,
    #[serde(default)]
    location: FsqLocation,
    #[serde(default)]
    price: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct FsqLocation {
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    locality: Option<String>,
}

fn place_to_poi(place: FsqPlace, category: &str, fallback_location: &str) -> Poi {
    let location = place
        .location
        .formatted_address
        .or(place.location.locality)
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| fallback_location.to_string());
    Poi {
        name: place.name,
        category: category.to_string(),
        location,
        price_level: place.price.unwrap_or(2).min(4),
        source: Source::Live,
    }
}

#[async_trait]
impl PoiProvider for FoursquarePoi {
    fn name(&self) -> &str {
        "foursquare"
    }

    async fn fetch_poi(&self, location: &str, preferences: &BTreeSet<String>) -> Result<Vec<Poi>, ProviderError> {
        debug!(%location, ?preferences, "FoursquarePoi::fetch_poi: called");
        let api_key = credential(&self.api_key_env)?;

        let mut queries: Vec<&str> = preferences.iter().map(String::as_str).collect();
        queries.push("sightseeing");

        let mut pois = Vec::new();
        for query in queries {
            let response = self
                .http
                .get(format!("{}/v3/places/search", self.base_url))
                .header("Authorization", &api_key)
                .header("accept", "application/json")
                .query(&[("near", location), ("query", query), ("limit", "5")])
                .send()
                .await?;
            let search: FsqSearch = check_status(response).await?.json().await?;
            debug!(%query, count = search.results.len(), "FoursquarePoi::fetch_poi: query complete");
            pois.extend(search.results.into_iter().map(|p| place_to_poi(p, query, location)));
        }

        if pois.is_empty() {
            return Err(ProviderError::NoResults(format!("places in {}", location)));
        }
        info!(%location, count = pois.len(), "Fetched live points of interest");
        Ok(pois)
    }
}

// === Flights ===

/// Amadeus Self-Service flight offers (client-credential token per call)
pub struct AmadeusFlights {
    http: Client,
    base_url: String,
    client_id_env: String,
    client_secret_env: String,
}

impl AmadeusFlights {
    pub fn new(endpoint: &ProviderEndpoint) -> Self {
        Self {
            http: Client::new(),
            base_url: trimmed_base(endpoint),
            client_id_env: endpoint.api_key_env.clone(),
            client_secret_env: endpoint
                .api_secret_env
                .clone()
                .unwrap_or_else(|| "AMADEUS_CLIENT_SECRET".to_string()),
        }
    }

    async fn token(&self, client_id: &str, client_secret: &str) -> Result<String, ProviderError> {
        debug!("AmadeusFlights::token: called");
        let response = self
            .http
            .post(format!("{}/v1/security/oauth2/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;
        let token: AmadeusToken = check_status(response).await?.json().await?;
        Ok(token.access_token)
    }
}

/// Amadeus searches by IATA location code
fn is_iata_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase())
}

#[derive(Debug, Deserialize)]
struct AmadeusToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AmadeusOffers {
    #[serde(default)]
    data: Vec<AmadeusOffer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmadeusOffer {
    price: AmadeusPrice,
    #[serde(default)]
    validating_airline_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmadeusPrice {
    grand_total: String,
}

fn offers_to_options(offers: AmadeusOffers, origin: &str, destination: &str) -> Vec<FlightOption> {
    let mut options: Vec<FlightOption> = offers
        .data
        .into_iter()
        .filter_map(|offer| {
            let price = offer.price.grand_total.parse::<f64>().ok()?;
            Some(FlightOption {
                origin: origin.to_string(),
                destination: destination.to_string(),
                price,
                carrier: offer
                    .validating_airline_codes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                source: Source::Live,
            })
        })
        .collect();
    options.sort_by(|a, b| a.price.total_cmp(&b.price));
    options
}

#[async_trait]
impl FlightProvider for AmadeusFlights {
    fn name(&self) -> &str {
        "amadeus"
    }

    async fn fetch_flights(
        &self,
        origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: NaiveDate,
        travelers: u32,
    ) -> Result<Vec<FlightOption>, ProviderError> {
        debug!(%origin, %destination, %depart, %return_date, travelers, "AmadeusFlights::fetch_flights: called");
        let client_id = credential(&self.client_id_env)?;
        let client_secret = credential(&self.client_secret_env)?;
        if !is_iata_code(origin) || !is_iata_code(destination) {
            return Err(ProviderError::Unsupported(format!(
                "flight search needs IATA codes, got '{}' -> '{}'",
                origin, destination
            )));
        }

        let token = self.token(&client_id, &client_secret).await?;
        let depart = depart.format("%Y-%m-%d").to_string();
        let return_date = return_date.format("%Y-%m-%d").to_string();
        let adults = travelers.max(1).to_string();

        let response = self
            .http
            .get(format!("{}/v2/shopping/flight-offers", self.base_url))
            .bearer_auth(token)
            .query(&[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", depart.as_str()),
                ("returnDate", return_date.as_str()),
                ("adults", adults.as_str()),
                ("currencyCode", "USD"),
                ("max", "5"),
            ])
            .send()
            .await?;
        let offers: AmadeusOffers = check_status(response).await?.json().await?;

        let options = offers_to_options(offers, origin, destination);
        if options.is_empty() {
            return Err(ProviderError::NoResults(format!("flights {} -> {}", origin, destination)));
        }
        info!(%origin, %destination, count = options.len(), "Fetched live flight offers");
        Ok(options)
    }
}
