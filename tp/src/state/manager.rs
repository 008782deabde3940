//! StateManager - actor that owns SessionStore
//!
//! Processes commands via channels so every store write in this process goes
//! through one queue. Cross-process exclusivity comes from store leases.

use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use sessionstore::{Envelope, Lease, SessionStore, SessionSummary, StoreOptions};

use super::messages::{StateCommand, StateError, StateResponse};
use crate::domain::PlanState;

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor
    pub fn spawn(store_path: impl AsRef<Path>, options: StoreOptions) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = SessionStore::open(store_path.as_ref(), options)?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(actor_loop(store, rx));

        info!(path = %store_path.as_ref().display(), "StateManager spawned");
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Load a live session; expired sessions come back as `None`
    pub async fn load(&self, session_id: &str) -> StateResponse<Option<Envelope<PlanState>>> {
        debug!(%session_id, "load: called");
        self.request(|reply| StateCommand::Load {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    /// Checkpoint a session; returns the new version
    pub async fn save(&self, state: &PlanState, expected_version: u64) -> StateResponse<u64> {
        debug!(session_id = %state.session_id, status = %state.status, expected_version, "save: called");
        self.request(|reply| StateCommand::Save {
            state: Box::new(state.clone()),
            expected_version,
            reply,
        })
        .await
    }

    pub async fn acquire_lease(&self, session_id: &str, owner: &str) -> StateResponse<Lease> {
        debug!(%session_id, %owner, "acquire_lease: called");
        self.request(|reply| StateCommand::AcquireLease {
            session_id: session_id.to_string(),
            owner: owner.to_string(),
            reply,
        })
        .await
    }

    pub async fn release_lease(&self, lease: Lease) -> StateResponse<()> {
        debug!(session_id = %lease.session_id, "release_lease: called");
        self.request(|reply| StateCommand::ReleaseLease { lease, reply }).await
    }

    /// Live sessions, most recently updated first
    pub async fn list(&self) -> StateResponse<Vec<SessionSummary>> {
        debug!("list: called");
        self.request(|reply| StateCommand::List { reply }).await
    }

    pub async fn delete(&self, session_id: &str) -> StateResponse<bool> {
        debug!(%session_id, "delete: called");
        self.request(|reply| StateCommand::Delete {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    /// Remove expired sessions and stale leases
    pub async fn purge_expired(&self) -> StateResponse<usize> {
        debug!("purge_expired: called");
        self.request(|reply| StateCommand::PurgeExpired { reply }).await
    }

    /// Stop the actor; later requests fail with `ChannelError`
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// The actor loop that processes commands
async fn actor_loop(store: SessionStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::Load { session_id, reply } => {
                debug!(%session_id, "actor_loop: Load command");
                let _ = reply.send(store.load(&session_id).map_err(StateError::from));
            }

            StateCommand::Save {
                state,
                expected_version,
                reply,
            } => {
                debug!(session_id = %state.session_id, expected_version, "actor_loop: Save command");
                let result = store
                    .save(&state.session_id, state.as_ref(), expected_version)
                    .map_err(StateError::from);
                let _ = reply.send(result);
            }

            StateCommand::AcquireLease {
                session_id,
                owner,
                reply,
            } => {
                debug!(%session_id, %owner, "actor_loop: AcquireLease command");
                let _ = reply.send(store.acquire_lease(&session_id, &owner).map_err(StateError::from));
            }

            StateCommand::ReleaseLease { lease, reply } => {
                debug!(session_id = %lease.session_id, "actor_loop: ReleaseLease command");
                let _ = reply.send(store.release_lease(&lease).map_err(StateError::from));
            }

            StateCommand::List { reply } => {
                debug!("actor_loop: List command");
                let _ = reply.send(store.list().map_err(StateError::from));
            }

            StateCommand::Delete { session_id, reply } => {
                debug!(%session_id, "actor_loop: Delete command");
                let _ = reply.send(store.delete(&session_id).map_err(StateError::from));
            }

            StateCommand::PurgeExpired { reply } => {
                debug!("actor_loop: PurgeExpired command");
                let result = store.purge_expired().map_err(StateError::from);
                if let Ok(removed) = &result {
                    info!(removed, "Purged expired sessions");
                }
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("actor_loop: exited");
}
