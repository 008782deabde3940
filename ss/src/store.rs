//! Core SessionStore implementation

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::lease::{self, Lease};
use crate::{DEFAULT_LEASE_TTL_MS, DEFAULT_TTL_MS, now_ms};

/// Persisted wrapper around a session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Session identifier
    pub session_id: String,
    /// Incremented on every successful save (first save is version 1)
    pub version: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
    /// Session is treated as absent at or after this timestamp
    pub expires_at: i64,
    /// The stored record
    pub data: T,
}

impl<T> Envelope<T> {
    /// Check whether the envelope has outlived its TTL
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub version: u64,
    pub updated_at: i64,
    pub expires_at: i64,
    /// A live lease is currently held on the session
    pub leased: bool,
}

/// Store tuning
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Session time-to-live, refreshed on every save
    pub ttl_ms: i64,
    /// Lease time-to-live
    pub lease_ttl_ms: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            lease_ttl_ms: DEFAULT_LEASE_TTL_MS,
        }
    }
}

/// Envelope header used when only metadata is needed
#[derive(Deserialize)]
struct Header {
    session_id: String,
    version: u64,
    created_at: i64,
    updated_at: i64,
    expires_at: i64,
}

/// File-backed session store
pub struct SessionStore {
    base_path: PathBuf,
    options: StoreOptions,
}

impl SessionStore {
    /// Open or create a session store at the given path
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let base_path = path.as_ref().to_path_buf();
        debug!(?base_path, ?options, "open: called");
        fs::create_dir_all(base_path.join("sessions"))?;
        fs::create_dir_all(base_path.join("leases"))?;
        info!(path = %base_path.display(), "Opened session store");
        Ok(Self { base_path, options })
    }

    /// Root directory of the store
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join("sessions").join(format!("{}.json", session_id))
    }

    fn lease_path(&self, session_id: &str) -> PathBuf {
        self.base_path.join("leases").join(format!("{}.lease", session_id))
    }

    fn validate_id(session_id: &str) -> Result<(), StoreError> {
        let valid = !session_id.is_empty()
            && session_id.len() <= 128
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !session_id.starts_with('.');
        if valid {
            Ok(())
        } else {
            debug!(%session_id, "validate_id: rejected");
            Err(StoreError::InvalidId(session_id.to_string()))
        }
    }

    fn read_header(path: &Path) -> Result<Option<Header>, StoreError> {
        match fs::read(path) {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a session, discarding it if expired
    pub fn load<T: DeserializeOwned>(&self, session_id: &str) -> Result<Option<Envelope<T>>, StoreError> {
        debug!(%session_id, "load: called");
        Self::validate_id(session_id)?;
        let path = self.record_path(session_id);

        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%session_id, "load: no record");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope<T> = serde_json::from_slice(&content)?;
        if envelope.is_expired(now_ms()) {
            info!(%session_id, "Session expired, discarding");
            if let Err(e) = fs::remove_file(&path) {
                warn!(%session_id, error = %e, "Failed to remove expired session");
            }
            return Ok(None);
        }

        debug!(%session_id, version = envelope.version, "load: found record");
        Ok(Some(envelope))
    }

    /// Save a session if the stored version matches `expected_version`
    ///
    /// Use `0` as the expected version for a session that does not exist yet
    /// (or has expired). Returns the new version.
    pub fn save<T: Serialize>(&self, session_id: &str, data: &T, expected_version: u64) -> Result<u64, StoreError> {
        debug!(%session_id, expected_version, "save: called");
        Self::validate_id(session_id)?;
        self.with_store_lock(|| self.save_locked(session_id, data, expected_version))
    }

    /// Run `f` while holding the exclusive store-wide file lock
    fn with_store_lock<R>(&self, f: impl FnOnce() -> Result<R, StoreError>) -> Result<R, StoreError> {
        let guard = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(".store.lock"))?;
        guard.lock_exclusive()?;
        let result = f();
        if let Err(e) = FileExt::unlock(&guard) {
            warn!(error = %e, "Failed to release store lock");
        }
        result
    }

    fn save_locked<T: Serialize>(&self, session_id: &str, data: &T, expected_version: u64) -> Result<u64, StoreError> {
        let path = self.record_path(session_id);
        let now = now_ms();

        let (found, created_at) = match Self::read_header(&path)? {
            Some(header) if header.expires_at > now => (header.version, header.created_at),
            Some(_) => {
                debug!(%session_id, "save_locked: existing record expired, starting over");
                (0, now)
            }
            None => (0, now),
        };

        if found != expected_version {
            debug!(%session_id, expected_version, found, "save_locked: version conflict");
            return Err(StoreError::Conflict {
                session_id: session_id.to_string(),
                expected: expected_version,
                found,
            });
        }

        let envelope = Envelope {
            session_id: session_id.to_string(),
            version: found + 1,
            created_at,
            updated_at: now,
            expires_at: now.saturating_add(self.options.ttl_ms),
            data,
        };

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&envelope)?)?;
        fs::rename(&tmp, &path)?;

        debug!(%session_id, version = envelope.version, "save_locked: written");
        Ok(envelope.version)
    }

    /// Acquire the exclusive lease on a session
    ///
    /// Re-acquiring with the same owner refreshes the lease. A stale lease is
    /// broken and replaced.
    pub fn acquire_lease(&self, session_id: &str, owner: &str) -> Result<Lease, StoreError> {
        debug!(%session_id, %owner, "acquire_lease: called");
        Self::validate_id(session_id)?;
        let path = self.lease_path(session_id);
        let lease = Lease::new(session_id, owner, self.options.lease_ttl_ms);

        for _ in 0..2 {
            if lease::try_create(&path, &lease)? {
                info!(%session_id, %owner, "Lease acquired");
                return Ok(lease);
            }

            match lease::read(&path)? {
                Some(existing) if existing.owner == owner => {
                    debug!(%session_id, "acquire_lease: refreshing own lease");
                    fs::write(&path, serde_json::to_vec(&lease)?)?;
                    return Ok(lease);
                }
                Some(existing) if !existing.is_stale(now_ms()) => {
                    debug!(%session_id, holder = %existing.owner, "acquire_lease: held by another owner");
                    return Err(StoreError::LeaseHeld {
                        session_id: session_id.to_string(),
                        owner: existing.owner,
                    });
                }
                Some(existing) => {
                    if self.break_stale_lease(&path, &existing)? {
                        warn!(%session_id, holder = %existing.owner, "Broke stale lease");
                    }
                }
                None => {
                    debug!(%session_id, "acquire_lease: lease vanished, retrying");
                }
            }
        }

        // Lost the race twice; someone else now holds it
        let holder = lease::read(&path)?.map(|l| l.owner).unwrap_or_default();
        Err(StoreError::LeaseHeld {
            session_id: session_id.to_string(),
            owner: holder,
        })
    }

    /// Remove the lease at `path` if it is still the stale lease `seen`
    ///
    /// Runs under the store lock so a lease written by a competing acquirer
    /// after `seen` was read is never removed.
    fn break_stale_lease(&self, path: &Path, seen: &Lease) -> Result<bool, StoreError> {
        debug!(path = %path.display(), holder = %seen.owner, "break_stale_lease: called");
        self.with_store_lock(|| match lease::read(path)? {
            Some(current) if current == *seen && current.is_stale(now_ms()) => {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(true)
            }
            Some(_) => {
                debug!("break_stale_lease: lease replaced since read, leaving it");
                Ok(false)
            }
            None => Ok(false),
        })
    }

    /// Release a lease previously returned by `acquire_lease`
    pub fn release_lease(&self, lease: &Lease) -> Result<(), StoreError> {
        debug!(session_id = %lease.session_id, owner = %lease.owner, "release_lease: called");
        Self::validate_id(&lease.session_id)?;
        let path = self.lease_path(&lease.session_id);

        match lease::read(&path)? {
            None => {
                debug!("release_lease: no lease file");
                Ok(())
            }
            Some(existing) if existing.owner == lease.owner => {
                fs::remove_file(&path)?;
                info!(session_id = %lease.session_id, "Lease released");
                Ok(())
            }
            Some(existing) => Err(StoreError::LeaseHeld {
                session_id: lease.session_id.clone(),
                owner: existing.owner,
            }),
        }
    }

    /// List all live sessions, most recently updated first
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        debug!("list: called");
        let now = now_ms();
        let mut summaries = Vec::new();

        for entry in fs::read_dir(self.base_path.join("sessions"))? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let header = match Self::read_header(&path) {
                Ok(Some(h)) => h,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable session");
                    continue;
                }
            };
            if now >= header.expires_at {
                continue;
            }
            let leased = lease::read(&self.lease_path(&header.session_id))?
                .map(|l| !l.is_stale(now))
                .unwrap_or(false);
            summaries.push(SessionSummary {
                session_id: header.session_id,
                version: header.version,
                updated_at: header.updated_at,
                expires_at: header.expires_at,
                leased,
            });
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.session_id.cmp(&b.session_id)));
        debug!(count = summaries.len(), "list: complete");
        Ok(summaries)
    }

    /// Delete a session; returns whether a record existed
    pub fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        debug!(%session_id, "delete: called");
        Self::validate_id(session_id)?;
        match fs::remove_file(self.record_path(session_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove expired sessions and stale leases; returns sessions removed
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        debug!("purge_expired: called");
        let now = now_ms();
        let mut removed = 0;

        for entry in fs::read_dir(self.base_path.join("sessions"))? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if let Ok(Some(header)) = Self::read_header(&path)
                && now >= header.expires_at
            {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        for entry in fs::read_dir(self.base_path.join("leases"))? {
            let path = entry?.path();
            if let Some(lease) = lease::read(&path)?
                && lease.is_stale(now)
            {
                fs::remove_file(&path)?;
            }
        }

        info!(removed, "Purged expired sessions");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_with(ttl_ms: i64, lease_ttl_ms: i64) -> (tempfile::TempDir, SessionStore) {
        let temp = tempdir().unwrap();
        let store = SessionStore::open(temp.path(), StoreOptions { ttl_ms, lease_ttl_ms }).unwrap();
        (temp, store)
    }

    #[test]
    fn test_save_and_load() {
        let (_temp, store) = store_with(60_000, 60_000);
        let v1 = store.save("s1", &json!({"status": "pending"}), 0).unwrap();
        assert_eq!(v1, 1);

        let env: Envelope<serde_json::Value> = store.load("s1").unwrap().unwrap();
        assert_eq!(env.version, 1);
        assert_eq!(env.data["status"], "pending");

        let v2 = store.save("s1", &json!({"status": "generating"}), 1).unwrap();
        assert_eq!(v2, 2);
        let env: Envelope<serde_json::Value> = store.load("s1").unwrap().unwrap();
        assert_eq!(env.data["status"], "generating");
        assert_eq!(env.created_at, env.created_at.min(env.updated_at));
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (_temp, store) = store_with(60_000, 60_000);
        let env: Option<Envelope<serde_json::Value>> = store.load("nope").unwrap();
        assert!(env.is_none());
    }

    #[test]
    fn test_stale_version_conflicts() {
        let (_temp, store) = store_with(60_000, 60_000);
        store.save("s1", &json!(1), 0).unwrap();
        store.save("s1", &json!(2), 1).unwrap();

        let err = store.save("s1", &json!(3), 1).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, found: 2, .. }));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_expired_session_is_absent() {
        let (_temp, store) = store_with(0, 60_000);
        store.save("s1", &json!({"a": 1}), 0).unwrap();

        let env: Option<Envelope<serde_json::Value>> = store.load("s1").unwrap();
        assert!(env.is_none());
        // Expired sessions restart at version 0
        assert_eq!(store.save("s1", &json!({"a": 2}), 0).unwrap(), 1);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let (_temp, store) = store_with(60_000, 60_000);
        for id in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(store.save(id, &json!(1), 0), Err(StoreError::InvalidId(_))));
        }
    }

    #[test]
    fn test_lease_is_exclusive() {
        let (_temp, store) = store_with(60_000, 60_000);
        let lease = store.acquire_lease("s1", "worker-a").unwrap();

        let err = store.acquire_lease("s1", "worker-b").unwrap_err();
        assert!(matches!(err, StoreError::LeaseHeld { ref owner, .. } if owner == "worker-a"));

        store.release_lease(&lease).unwrap();
        assert!(store.acquire_lease("s1", "worker-b").is_ok());
    }

    #[test]
    fn test_same_owner_reacquires() {
        let (_temp, store) = store_with(60_000, 60_000);
        store.acquire_lease("s1", "worker-a").unwrap();
        assert!(store.acquire_lease("s1", "worker-a").is_ok());
    }

    #[test]
    fn test_stale_lease_is_broken() {
        let (_temp, store) = store_with(60_000, 0);
        store.acquire_lease("s1", "crashed").unwrap();
        let lease = store.acquire_lease("s1", "worker-b").unwrap();
        assert_eq!(lease.owner, "worker-b");
    }

    #[test]
    fn test_stale_break_leaves_replacement_lease() {
        let (_temp, store) = store_with(60_000, 60_000);
        let path = store.lease_path("s1");
        let stale = Lease::new("s1", "crashed", 0);
        assert!(lease::try_create(&path, &stale).unwrap());

        // A competing acquirer broke the stale lease and took it between our read and our break
        let fresh = Lease::new("s1", "worker-b", 60_000);
        fs::write(&path, serde_json::to_vec(&fresh).unwrap()).unwrap();

        assert!(!store.break_stale_lease(&path, &stale).unwrap());
        assert_eq!(lease::read(&path).unwrap(), Some(fresh));
        let err = store.acquire_lease("s1", "worker-c").unwrap_err();
        assert!(matches!(err, StoreError::LeaseHeld { ref owner, .. } if owner == "worker-b"));
    }

    #[test]
    fn test_stale_break_removes_unchanged_lease() {
        let (_temp, store) = store_with(60_000, 60_000);
        let path = store.lease_path("s1");
        let stale = Lease::new("s1", "crashed", 0);
        assert!(lease::try_create(&path, &stale).unwrap());

        assert!(store.break_stale_lease(&path, &stale).unwrap());
        assert!(lease::read(&path).unwrap().is_none());
    }

    #[test]
    fn test_release_foreign_lease_fails() {
        let (_temp, store) = store_with(60_000, 60_000);
        store.acquire_lease("s1", "worker-a").unwrap();
        let foreign = Lease::new("s1", "worker-b", 60_000);
        assert!(store.release_lease(&foreign).is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let (_temp, store) = store_with(60_000, 60_000);
        store.save("a", &json!(1), 0).unwrap();
        store.save("b", &json!(2), 0).unwrap();
        store.acquire_lease("b", "w").unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        let b = list.iter().find(|s| s.session_id == "b").unwrap();
        assert!(b.leased);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (_temp, store) = store_with(0, 0);
        store.save("a", &json!(1), 0).unwrap();
        store.save("b", &json!(2), 0).unwrap();
        store.acquire_lease("a", "w").unwrap();

        assert_eq!(store.purge_expired().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
        assert!(!store.path().join("leases").join("a.lease").exists());
    }
}
