//! `SQLite`-backed state store

use super::{decode, encode, SessionLease, SessionLocks, StateStore, StoreError, StoreResult};
use crate::conversation::ConversationState;
use crate::db::{Database, DocumentWrite};
use async_trait::async_trait;

/// Adapter to use `Database` as a `StateStore`
pub struct SqliteStateStore {
    db: Database,
    locks: SessionLocks,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: SessionLocks::new(),
        }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn acquire(&self, session_id: &str) -> SessionLease {
        self.locks.acquire(session_id).await
    }

    async fn load(&self, session_id: &str) -> StoreResult<ConversationState> {
        match self.db.get_session(session_id)? {
            Some(row) => decode(&row.document, row.version),
            None => Ok(ConversationState::new(session_id)),
        }
    }

    async fn save(&self, lease: &SessionLease, state: &ConversationState) -> StoreResult<u64> {
        let document = encode(lease, state)?;
        let write = self.db.put_session(
            &state.session_id,
            state.household_id.as_deref(),
            state.user_id.as_deref(),
            state.version,
            &document,
        )?;

        match write {
            DocumentWrite::Unchanged { version } => {
                tracing::debug!(session_id = %state.session_id, version, "Session unchanged, skipped write");
                Ok(version)
            }
            DocumentWrite::Written { version } => {
                tracing::debug!(
                    session_id = %state.session_id,
                    version,
                    turns = state.turns.len(),
                    "Session saved"
                );
                Ok(version)
            }
            DocumentWrite::Conflict { found } => Err(StoreError::WriteConflict {
                session_id: state.session_id.clone(),
                expected: state.version,
                found,
            }),
        }
    }
}
