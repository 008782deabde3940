//! State manager messages
//!
//! Commands and responses for the actor pattern.

use sessionstore::{Envelope, Lease, SessionSummary, StoreError};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::PlanState;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Version conflict for session {session_id}: expected {expected}, found {found}")]
    Conflict {
        session_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Session {session_id} is already being planned by {owner}")]
    LeaseHeld { session_id: String, owner: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

impl StateError {
    /// True when another writer owns or has advanced the session
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict { .. } | StateError::LeaseHeld { .. })
    }
}

impl From<StoreError> for StateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                session_id,
                expected,
                found,
            } => StateError::Conflict {
                session_id,
                expected,
                found,
            },
            StoreError::LeaseHeld { session_id, owner } => StateError::LeaseHeld { session_id, owner },
            other => StateError::StoreError(other.to_string()),
        }
    }
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    Load {
        session_id: String,
        reply: oneshot::Sender<StateResponse<Option<Envelope<PlanState>>>>,
    },
    Save {
        state: Box<PlanState>,
        expected_version: u64,
        reply: oneshot::Sender<StateResponse<u64>>,
    },

    AcquireLease {
        session_id: String,
        owner: String,
        reply: oneshot::Sender<StateResponse<Lease>>,
    },
    ReleaseLease {
        lease: Lease,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    List {
        reply: oneshot::Sender<StateResponse<Vec<SessionSummary>>>,
    },
    Delete {
        session_id: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    PurgeExpired {
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    Shutdown,
}
