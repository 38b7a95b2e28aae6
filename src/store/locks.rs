//! Per-session leases

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Exclusive right to write one session, released on drop
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// One async mutex per session that currently has a holder or waiter
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> SessionLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map references are idle
            locks.retain(|id, lock| id == session_id || Arc::strong_count(lock) > 1);
            locks.entry(session_id.to_string()).or_default().clone()
        };
        SessionLease {
            session_id: session_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
