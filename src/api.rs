//! HTTP API for the household agent

mod handlers;
mod types;

pub use handlers::create_router;

use crate::runtime::RunManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RunManager>,
}

impl AppState {
    pub fn new(runtime: RunManager) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }
}
