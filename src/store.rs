//! Session state persistence
//!
//! One JSON document per session, written whole on every save. Writers
//! hold a per-session lease for the load-run-save cycle; the stored
//! version guards against writers that bypass it.

mod locks;
mod sqlite;

pub use locks::{SessionLease, SessionLocks};
pub use sqlite::SqliteStateStore;

use crate::conversation::{ConversationState, PairingError};
use crate::db::DbError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Db(#[from] DbError),
    #[error("session document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("session {session_id} changed underneath this run (expected version {expected}, found {found})")]
    WriteConflict {
        session_id: String,
        expected: u64,
        found: u64,
    },
    #[error("lease for session {lease} cannot save session {session}")]
    LeaseMismatch { lease: String, session: String },
    #[error("refusing to save unpaired conversation: {0}")]
    InvalidState(#[from] PairingError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Loads and saves conversation state keyed by session
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Wait for exclusive access to `session_id`
    async fn acquire(&self, session_id: &str) -> SessionLease;

    /// The stored state, or an empty one if the session is new
    async fn load(&self, session_id: &str) -> StoreResult<ConversationState>;

    /// Overwrite the stored document; returns the version now stored
    async fn save(&self, lease: &SessionLease, state: &ConversationState) -> StoreResult<u64>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn acquire(&self, session_id: &str) -> SessionLease {
        (**self).acquire(session_id).await
    }

    async fn load(&self, session_id: &str) -> StoreResult<ConversationState> {
        (**self).load(session_id).await
    }

    async fn save(&self, lease: &SessionLease, state: &ConversationState) -> StoreResult<u64> {
        (**self).save(lease, state).await
    }
}

/// Check a state is fit to persist and render its document
pub(crate) fn encode(lease: &SessionLease, state: &ConversationState) -> StoreResult<String> {
    if lease.session_id() != state.session_id {
        return Err(StoreError::LeaseMismatch {
            lease: lease.session_id().to_string(),
            session: state.session_id.clone(),
        });
    }
    state.check_pairing()?;
    Ok(serde_json::to_string(state)?)
}

/// Rebuild a state from its stored document
pub(crate) fn decode(document: &str, version: u64) -> StoreResult<ConversationState> {
    let mut state: ConversationState = serde_json::from_str(document)?;
    state.version = version;
    Ok(state)
}
