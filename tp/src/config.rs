//! TripPlanner configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{Dimension, MAX_DURATION_DAYS};

/// Main TripPlanner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Control loop policy
    pub supervisor: SupervisorConfig,

    /// Scoring policy
    pub critique: CritiqueConfig,

    /// External data providers
    pub providers: ProvidersConfig,

    /// Session storage
    pub storage: StorageConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate policy values before use
    pub fn validate(&self) -> Result<()> {
        debug!("validate: called");
        if self.supervisor.max_attempts == 0 {
            return Err(eyre::eyre!("supervisor.max-attempts must be at least 1"));
        }
        if !(1..=MAX_DURATION_DAYS).contains(&self.supervisor.max_trip_days) {
            return Err(eyre::eyre!(
                "supervisor.max-trip-days must be between 1 and {}",
                MAX_DURATION_DAYS
            ));
        }
        check_unit("supervisor.min-parse-confidence", self.supervisor.min_parse_confidence)?;
        check_unit("critique.acceptance-threshold", self.critique.acceptance_threshold)?;
        for dimension in Dimension::ALL {
            check_unit(
                &format!("critique.floors.{}", dimension),
                self.critique.floors.get(dimension),
            )?;
            let weight = self.critique.weights.get(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(eyre::eyre!("critique.weights.{} must be non-negative", dimension));
            }
        }
        if self.critique.weights.sum() <= 0.0 {
            return Err(eyre::eyre!("critique.weights must not all be zero"));
        }
        match self.llm.provider.as_str() {
            "anthropic" | "openai" | "none" => {}
            other => {
                return Err(eyre::eyre!(
                    "Unknown llm.provider '{}'. Supported: anthropic, openai, none",
                    other
                ));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.tripplanner.yml`, then the user config
    /// directory, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::search_paths(),
        };
        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".tripplanner.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tripplanner").join("tripplanner.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(eyre::eyre!("{} must be within [0, 1], got {}", name, value))
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "anthropic", "openai" or "none" (rule-based parsing only)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(api_key_env = %self.api_key_env, "get_api_key: called");
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| eyre::eyre!("LLM API key not found. Set the {} environment variable.", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 1024,
            timeout_ms: 30_000,
        }
    }
}

/// Control loop policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum generate/critique cycles per session
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Parses below this confidence proceed flagged as low-confidence
    #[serde(rename = "min-parse-confidence")]
    pub min_parse_confidence: f64,

    /// Longest trip a request may ask for
    #[serde(rename = "max-trip-days")]
    pub max_trip_days: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_parse_confidence: 0.5,
            max_trip_days: 60,
        }
    }
}

/// Weights of the overall average, per dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionWeights {
    #[serde(rename = "budget-adherence")]
    pub budget_adherence: f64,

    #[serde(rename = "timeline-feasibility")]
    pub timeline_feasibility: f64,

    #[serde(rename = "preference-match")]
    pub preference_match: f64,

    pub completeness: f64,
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::BudgetAdherence => self.budget_adherence,
            Dimension::TimelineFeasibility => self.timeline_feasibility,
            Dimension::PreferenceMatch => self.preference_match,
            Dimension::Completeness => self.completeness,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            budget_adherence: 0.3,
            timeline_feasibility: 0.25,
            preference_match: 0.25,
            completeness: 0.2,
        }
    }
}

/// Minimum acceptable score, per dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionFloors {
    #[serde(rename = "budget-adherence")]
    pub budget_adherence: f64,

    #[serde(rename = "timeline-feasibility")]
    pub timeline_feasibility: f64,

    #[serde(rename = "preference-match")]
    pub preference_match: f64,

    pub completeness: f64,
}

impl DimensionFloors {
    pub fn uniform(value: f64) -> Self {
        Self {
            budget_adherence: value,
            timeline_feasibility: value,
            preference_match: value,
            completeness: value,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::BudgetAdherence => self.budget_adherence,
            Dimension::TimelineFeasibility => self.timeline_feasibility,
            Dimension::PreferenceMatch => self.preference_match,
            Dimension::Completeness => self.completeness,
        }
    }
}

impl Default for DimensionFloors {
    fn default() -> Self {
        Self::uniform(0.4)
    }
}

/// Scoring policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CritiqueConfig {
    /// Overall score needed to pass
    #[serde(rename = "acceptance-threshold")]
    pub acceptance_threshold: f64,

    /// Minimum score per dimension
    pub floors: DimensionFloors,

    /// Weights of the overall average
    pub weights: DimensionWeights,
}

impl Default for CritiqueConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.7,
            floors: DimensionFloors::default(),
            weights: DimensionWeights::default(),
        }
    }
}

/// One HTTP data provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Environment variable holding the API key (or client id)
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Environment variable holding the client secret, when the API needs one
    #[serde(rename = "api-secret-env", default, skip_serializing_if = "Option::is_none")]
    pub api_secret_env: Option<String>,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

/// External data providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Skip every live provider and use fallback data
    pub offline: bool,

    pub weather: ProviderEndpoint,

    pub poi: ProviderEndpoint,

    pub flights: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            offline: false,
            weather: ProviderEndpoint {
                api_key_env: "OPENWEATHER_API_KEY".to_string(),
                api_secret_env: None,
                base_url: "https://api.openweathermap.org".to_string(),
                timeout_ms: 5_000,
            },
            poi: ProviderEndpoint {
                api_key_env: "FOURSQUARE_API_KEY".to_string(),
                api_secret_env: None,
                base_url: "https://api.foursquare.com".to_string(),
                timeout_ms: 5_000,
            },
            flights: ProviderEndpoint {
                api_key_env: "AMADEUS_CLIENT_ID".to_string(),
                api_secret_env: Some("AMADEUS_CLIENT_SECRET".to_string()),
                base_url: "https://test.api.amadeus.com".to_string(),
                timeout_ms: 8_000,
            },
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted sessions
    #[serde(rename = "session-dir")]
    pub session_dir: String,

    /// Session time-to-live in milliseconds
    #[serde(rename = "session-ttl-ms")]
    pub session_ttl_ms: i64,

    /// Lease time-to-live in milliseconds
    #[serde(rename = "lease-ttl-ms")]
    pub lease_ttl_ms: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/tripplanner on Linux)
        let session_dir = dirs::data_dir()
            .map(|d| d.join("tripplanner").join("sessions"))
            .unwrap_or_else(|| PathBuf::from(".tripplanner-sessions"))
            .to_string_lossy()
            .into_owned();

        Self {
            session_dir,
            session_ttl_ms: sessionstore::DEFAULT_TTL_MS,
            lease_ttl_ms: sessionstore::DEFAULT_LEASE_TTL_MS,
        }
    }
}

impl StorageConfig {
    /// Session directory with a leading `~/` expanded
    pub fn expanded_session_dir(&self) -> PathBuf {
        match self.session_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.session_dir)),
            None => PathBuf::from(&self.session_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.supervisor.max_attempts, 3);
        assert_eq!(config.supervisor.min_parse_confidence, 0.5);
        assert_eq!(config.critique.acceptance_threshold, 0.7);
        assert_eq!(config.critique.floors, DimensionFloors::uniform(0.4));
        assert!((config.critique.weights.sum() - 1.0).abs() < 1e-9);
        assert!(!config.providers.offline);
        assert_eq!(config.storage.session_ttl_ms, 30 * 24 * 60 * 60 * 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: openai
  model: gpt-4o-mini
  api-key-env: MY_KEY
  base-url: https://api.example.com
  max-tokens: 512
  timeout-ms: 10000

supervisor:
  max-attempts: 5
  min-parse-confidence: 0.6
  max-trip-days: 21

critique:
  acceptance-threshold: 0.8
  floors:
    budget-adherence: 0.5
  weights:
    budget-adherence: 0.4
    timeline-feasibility: 0.2
    preference-match: 0.2
    completeness: 0.2

providers:
  offline: true

storage:
  session-dir: /tmp/tp-sessions
  session-ttl-ms: 60000

log-level: DEBUG
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.max_tokens, 512);
        assert_eq!(config.supervisor.max_attempts, 5);
        assert_eq!(config.supervisor.max_trip_days, 21);
        assert_eq!(config.critique.acceptance_threshold, 0.8);
        assert_eq!(config.critique.floors.budget_adherence, 0.5);
        assert_eq!(config.critique.floors.completeness, 0.4);
        assert_eq!(config.critique.weights.budget_adherence, 0.4);
        assert!(config.providers.offline);
        assert_eq!(config.providers.weather.api_key_env, "OPENWEATHER_API_KEY");
        assert_eq!(config.storage.session_dir, "/tmp/tp-sessions");
        assert_eq!(config.storage.lease_ttl_ms, sessionstore::DEFAULT_LEASE_TTL_MS);
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
supervisor:
  max-attempts: 2
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.supervisor.max_attempts, 2);
        assert_eq!(config.supervisor.min_parse_confidence, 0.5);
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.critique.acceptance_threshold, 0.7);
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let mut config = Config::default();
        config.supervisor.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.critique.acceptance_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.critique.weights = DimensionWeights {
            budget_adherence: 0.0,
            timeline_feasibility: 0.0,
            preference_match: 0.0,
            completeness: 0.0,
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.critique.weights.completeness = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.provider = "bard".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.supervisor.max_trip_days = MAX_DURATION_DAYS + 1;
        assert!(config.validate().is_err());
        config.supervisor.max_trip_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tp.yml");
        fs::write(&path, "log-level: WARN\nproviders:\n  offline: true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.providers.offline);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_expanded_session_dir() {
        let storage = StorageConfig {
            session_dir: "/var/tmp/tp".to_string(),
            ..StorageConfig::default()
        };
        assert_eq!(storage.expanded_session_dir(), PathBuf::from("/var/tmp/tp"));
    }

    #[test]
    #[serial_test::serial]
    fn test_get_api_key_from_env() {
        let llm = LlmConfig {
            api_key_env: "TRIPPLANNER_TEST_API_KEY".to_string(),
            ..LlmConfig::default()
        };

        // SAFETY: serialized with every other env-mutating test
        unsafe { std::env::set_var("TRIPPLANNER_TEST_API_KEY", "sk-test") };
        assert_eq!(llm.get_api_key().unwrap(), "sk-test");

        unsafe { std::env::set_var("TRIPPLANNER_TEST_API_KEY", "  ") };
        assert!(llm.get_api_key().is_err());

        unsafe { std::env::remove_var("TRIPPLANNER_TEST_API_KEY") };
        let err = llm.get_api_key().unwrap_err().to_string();
        assert!(err.contains("TRIPPLANNER_TEST_API_KEY"));
    }
}
