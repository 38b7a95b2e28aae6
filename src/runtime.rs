//! Runtime for executing agent runs
//!
//! The graph interprets state machine effects, the driver wraps a run in
//! load and save, and the manager tracks in-flight runs so they can be
//! cancelled.

mod driver;
mod graph;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use driver::{FailureKind, RunDriver, RunError, RunReply, SessionBinding};
pub use graph::{AgentGraph, GraphOutcome};
pub use traits::*;

use crate::store::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Driver over trait objects, so production and test wiring share one type
pub type SharedDriver = RunDriver<Arc<dyn StateStore>, Arc<dyn LlmClient>, Arc<dyn ToolExecutor>>;

type ActiveRuns = HashMap<String, HashMap<Uuid, CancellationToken>>;

/// Manager for in-flight runs
pub struct RunManager {
    driver: SharedDriver,
    active: Mutex<ActiveRuns>,
}

/// Registration of one in-flight run, removed on drop
struct ActiveRun<'a> {
    manager: &'a RunManager,
    session_id: String,
    run_id: Uuid,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        let mut active = self.manager.active();
        if let Some(runs) = active.get_mut(&self.session_id) {
            runs.remove(&self.run_id);
            if runs.is_empty() {
                active.remove(&self.session_id);
            }
        }
    }
}

impl RunManager {
    pub fn new(driver: SharedDriver) -> Self {
        Self {
            driver,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    fn active(&self) -> MutexGuard<'_, ActiveRuns> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a message, cancellable through `cancel` until it finishes
    pub async fn run(
        &self,
        session_id: &str,
        user_message: &str,
        binding: SessionBinding,
    ) -> Result<RunReply, RunError> {
        let token = CancellationToken::new();
        let registration = ActiveRun {
            manager: self,
            session_id: session_id.to_string(),
            run_id: Uuid::new_v4(),
        };
        self.active()
            .entry(session_id.to_string())
            .or_default()
            .insert(registration.run_id, token.clone());

        let result = self
            .driver
            .run_with(session_id, user_message, binding, &token)
            .await;
        drop(registration);
        result
    }

    /// Cancel every in-flight or queued run on a session; returns how many
    pub fn cancel(&self, session_id: &str) -> usize {
        let active = self.active();
        let Some(runs) = active.get(session_id) else {
            return 0;
        };
        for token in runs.values() {
            token.cancel();
        }
        tracing::info!(session_id, runs = runs.len(), "Cancelled session runs");
        runs.len()
    }

    /// Number of sessions with a run in flight
    pub fn active_sessions(&self) -> usize {
        self.active().len()
    }
}
