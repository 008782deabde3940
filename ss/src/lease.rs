//! Session leases
//!
//! A lease is a small JSON file created with `create_new`, so at most one
//! process can hold it. Leases expire so a crashed writer cannot block a
//! session forever.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::now_ms;

/// Exclusive right to drive one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Session the lease covers
    pub session_id: String,
    /// Opaque owner identity (one per supervisor invocation)
    pub owner: String,
    /// Acquisition timestamp (Unix milliseconds)
    pub acquired_at: i64,
    /// Lease is stale at or after this timestamp
    pub expires_at: i64,
}

impl Lease {
    pub(crate) fn new(session_id: &str, owner: &str, ttl_ms: i64) -> Self {
        let now = now_ms();
        Self {
            session_id: session_id.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    /// Check whether the lease has lapsed
    pub fn is_stale(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Try to create the lease file exclusively
///
/// Returns `Ok(true)` when created, `Ok(false)` when a file already exists.
pub(crate) fn try_create(path: &Path, lease: &Lease) -> Result<bool, StoreError> {
    debug!(path = %path.display(), owner = %lease.owner, "try_create: called");
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let body = serde_json::to_vec(lease)?;
            file.write_all(&body)?;
            file.sync_all()?;
            debug!("try_create: lease written");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!("try_create: lease file already exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read an existing lease file
///
/// A missing file yields `None`. An unreadable lease body is treated as stale.
pub(crate) fn read(path: &Path) -> Result<Option<Lease>, StoreError> {
    debug!(path = %path.display(), "read: called");
    let content = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice::<Lease>(&content) {
        Ok(lease) => Ok(Some(lease)),
        Err(e) => {
            debug!(error = %e, "read: corrupt lease, treating as stale");
            Ok(Some(Lease {
                session_id: String::new(),
                owner: String::new(),
                acquired_at: 0,
                expires_at: 0,
            }))
        }
    }
}
