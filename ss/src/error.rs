//! Store error types

use thiserror::Error;

/// Errors from session store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid session id: '{0}'")]
    InvalidId(String),

    #[error("Version conflict for session {session_id}: expected {expected}, found {found}")]
    Conflict {
        session_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Session {session_id} is leased by {owner}")]
    LeaseHeld { session_id: String, owner: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// True when another writer owns or has advanced the session
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::LeaseHeld { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_conflict() {
        assert!(
            StoreError::Conflict {
                session_id: "s".to_string(),
                expected: 1,
                found: 2
            }
            .is_conflict()
        );
        assert!(
            StoreError::LeaseHeld {
                session_id: "s".to_string(),
                owner: "w".to_string()
            }
            .is_conflict()
        );
        assert!(!StoreError::InvalidId("../x".to_string()).is_conflict());
    }

    #[test]
    fn test_conflict_message() {
        let err = StoreError::Conflict {
            session_id: "abc".to_string(),
            expected: 3,
            found: 4,
        };
        assert_eq!(err.to_string(), "Version conflict for session abc: expected 3, found 4");
    }
}
