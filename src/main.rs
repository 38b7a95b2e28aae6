//! House Agent - household assistant agent service
//!
//! A Rust backend running a bounded think/act agent loop over a household's
//! pantry, grocery list, cart and budget.

mod api;
mod config;
mod conversation;
mod db;
mod llm;
mod runtime;
mod state_machine;
mod store;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::AgentConfig;
use db::Database;
use llm::{LlmService, LoggingService, OpenAIService};
use runtime::{
    AgentGraph, LlmClient, RunDriver, RunManager, ServiceLlmClient, ToolExecutor,
    ToolRegistryExecutor,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::{SqliteStateStore, StateStore};
use system_prompt::build_system_prompt;
use tools::ToolRegistry;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "house_agent=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AgentConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let api_key = config.llm.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("No LLM API key configured. Set OPENAI_API_KEY; model requests will fail.");
        String::new()
    });
    let provider: Arc<dyn LlmService> = Arc::new(OpenAIService::new(&config.llm, api_key)?);
    let provider: Arc<dyn LlmService> = Arc::new(LoggingService::new(provider));

    let registry = Arc::new(ToolRegistry::household()?);
    let system_prompt = build_system_prompt(&registry.definitions());

    let llm: Arc<dyn LlmClient> = Arc::new(ServiceLlmClient::new(provider, system_prompt));
    let tools: Arc<dyn ToolExecutor> = Arc::new(ToolRegistryExecutor::new(registry));
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(db.clone()));

    tracing::info!(
        model = %config.llm.model,
        max_steps = config.max_steps,
        context_tokens = config.context_tokens,
        retry_attempts = config.retry.max_attempts,
        "Agent configured"
    );

    let graph = AgentGraph::new(llm, tools, &config);
    let driver = RunDriver::new(store, graph).with_household_db(db);
    let state = AppState::new(RunManager::new(driver));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("House agent server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
