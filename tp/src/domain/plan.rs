//! PlanState domain type
//!
//! The session-scoped aggregate threaded through parsing, generation and
//! critique. Exclusively owned by one supervisor invocation at a time.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use sessionstore::now_ms;

use super::{CritiqueResult, Itinerary, TripRequest};

/// Planning session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, nothing run yet
    #[default]
    Pending,
    /// Extracting the trip request
    Parsing,
    /// About to produce the next itinerary
    Generating,
    /// Evaluating the current itinerary
    Critiquing,
    /// An itinerary passed critique
    Succeeded,
    /// Attempt budget spent without a passing itinerary (best effort attached)
    FailedBudgetExhausted,
    /// The request text could not be understood
    FailedParse,
    /// No itinerary could be produced
    FailedFatal,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedBudgetExhausted | Self::FailedParse | Self::FailedFatal
        )
    }

    /// Terminal without a usable itinerary
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, Self::FailedParse | Self::FailedFatal)
    }

    /// Best-effort success: an itinerary is attached but did not pass
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FailedBudgetExhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::Generating => "generating",
            Self::Critiquing => "critiquing",
            Self::Succeeded => "succeeded",
            Self::FailedBudgetExhausted => "failed_budget_exhausted",
            Self::FailedParse => "failed_parse",
            Self::FailedFatal => "failed_fatal",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix milliseconds
    pub at: i64,
    /// Status the session moved into
    pub step: PlanStatus,
    pub message: String,
}

/// Working state of one planning session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    pub session_id: String,
    pub raw_text: String,
    pub trip_request: Option<TripRequest>,
    pub current_itinerary: Option<Itinerary>,
    /// Every itinerary generated, in attempt order
    #[serde(default)]
    pub itinerary_history: Vec<Itinerary>,
    /// Append-only, one per completed critique
    #[serde(default)]
    pub evaluation_history: Vec<CritiqueResult>,
    pub attempt_count: u32,
    pub status: PlanStatus,
    /// Populated only in failed states
    #[serde(default)]
    pub terminal_reason: Option<String>,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PlanState {
    pub fn new(session_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let session_id = session_id.into();
        debug!(%session_id, "PlanState::new: called");
        let now = now_ms();
        Self {
            session_id,
            raw_text: raw_text.into(),
            trip_request: None,
            current_itinerary: None,
            itinerary_history: Vec::new(),
            evaluation_history: Vec::new(),
            attempt_count: 0,
            status: PlanStatus::Pending,
            terminal_reason: None,
            clarification_questions: Vec::new(),
            trace: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status` and append a trace entry
    pub fn transition(&mut self, status: PlanStatus, message: impl Into<String>) {
        let message = message.into();
        debug!(session_id = %self.session_id, from = %self.status, to = %status, %message, "transition: called");
        let now = now_ms();
        self.status = status;
        self.updated_at = now;
        self.trace.push(TraceEntry {
            at: now,
            step: status,
            message,
        });
    }

    /// Move to a failed status with a reason
    pub fn fail(&mut self, status: PlanStatus, reason: impl Into<String>) {
        let reason = reason.into();
        self.terminal_reason = Some(reason.clone());
        self.transition(status, reason);
    }

    pub fn latest_critique(&self) -> Option<&CritiqueResult> {
        self.evaluation_history.last()
    }

    /// Itinerary generated by the given attempt
    pub fn itinerary_for_attempt(&self, attempt: u32) -> Option<&Itinerary> {
        self.itinerary_history
            .iter()
            .find(|i| i.generation_attempt() == attempt)
    }

    /// Critique of the itinerary currently attached
    pub fn current_critique(&self) -> Option<&CritiqueResult> {
        let attempt = self.current_itinerary.as_ref()?.generation_attempt();
        self.evaluation_history.iter().find(|c| c.attempt == attempt)
    }
}
