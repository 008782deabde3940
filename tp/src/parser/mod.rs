//! Natural-language request parsing
//!
//! `RuleParser` extracts a `TripRequest` with regexes and keyword tables.
//! `LlmParser` asks a language model first and falls back to the rules on
//! any failure, so parsing never depends on the network.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TripRequest;

mod llm;
mod rules;

pub use llm::LlmParser;
pub use rules::{DEFAULT_DAILY_BUDGET, DEFAULT_DURATION_DAYS, Extraction, RuleParser};

/// Reasons a request cannot be turned into a `TripRequest`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("request text is empty")]
    EmptyInput,

    #[error("no destination found in request")]
    NoDestination,

    #[error("contradictory dates: {0}")]
    ContradictoryDates(String),

    #[error("a {days}-day trip exceeds the {max}-day limit")]
    TripTooLong { days: i64, max: u32 },
}

/// Turns raw request text into a structured trip request
#[async_trait]
pub trait QueryParser: Send + Sync {
    async fn parse(&self, raw_text: &str) -> Result<TripRequest, ParseError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Parser returning a fixed result for every call
    pub struct ScriptedParser {
        result: Result<TripRequest, ParseError>,
        calls: AtomicUsize,
    }

    impl ScriptedParser {
        pub fn returning(trip: TripRequest) -> Self {
            Self {
                result: Ok(trip),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(error: ParseError) -> Self {
            Self {
                result: Err(error),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryParser for ScriptedParser {
        async fn parse(&self, _raw_text: &str) -> Result<TripRequest, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }
}
