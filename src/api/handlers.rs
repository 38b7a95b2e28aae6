//! HTTP request handlers

use super::types::{
    CancelResponse, ErrorResponse, HealthResponse, MessageRequest, MessageResponse,
    SessionResponse,
};
use super::AppState;
use crate::runtime::{FailureKind, RunError, SessionBinding};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/cancel", post(cancel_session))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.runtime.driver().model_id().to_string(),
        active_sessions: state.runtime.active_sessions(),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .runtime
        .driver()
        .session(&id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if session.version == 0 {
        return Err(AppError::NotFound(format!("Session not found: {id}")));
    }

    Ok(Json(SessionResponse {
        session_id: session.session_id,
        household_id: session.household_id,
        user_id: session.user_id,
        version: session.version,
        last_step_count: session.last_step_count,
        updated_at: session.updated_at,
        turns: session.turns,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let binding = SessionBinding {
        household_id: req.household_id,
        user_id: req.user_id,
    };

    // Detached so a dropped connection cannot abandon a run before it saves
    let runtime = state.runtime.clone();
    let session_id = id.clone();
    let reply = tokio::spawn(async move {
        runtime.run(&session_id, &req.message, binding).await
    })
    .await
    .map_err(|e| AppError::Internal(format!("run task failed: {e}")))?
    .map_err(AppError::Run)?;

    let start = reply.turns.len().saturating_sub(reply.appended);
    let turns = reply.turns.get(start..).unwrap_or_default().to_vec();
    Ok(Json(MessageResponse {
        response: reply.answer_text,
        session_id: id,
        turns_appended: reply.appended,
        step_count: reply.step_count,
        turns,
    }))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.runtime.cancel(&id),
    })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    NotFound(String),
    Internal(String),
    Run(RunError),
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::InvalidInput => StatusCode::BAD_REQUEST,
        FailureKind::StepLimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::Cancelled | FailureKind::WriteConflict => StatusCode::CONFLICT,
        FailureKind::ProviderRateLimited => StatusCode::TOO_MANY_REQUESTS,
        FailureKind::ProviderUnavailable
        | FailureKind::MalformedResponse
        | FailureKind::InvalidRequest => StatusCode::BAD_GATEWAY,
        FailureKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg))
            }
            AppError::Run(e) => (
                failure_status(e.kind),
                ErrorResponse {
                    retryable: e.is_retryable(),
                    error: e.message,
                    kind: Some(e.kind),
                    last_committed_turn: e.last_committed_turn,
                    partial_turns: e.partial_turns,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}
