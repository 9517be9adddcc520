// HTTP API routes (bracket setup, match commands, log archive, exports).

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::config::MatchDuration;
use crate::engine::server::ScoreboardServer;
use crate::engine::session::{BracketRequest, Command};
use crate::error::CoreError;
use crate::export;
use crate::metrics;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<ScoreboardServer>,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn core_error(e: &CoreError) -> Response {
    let status = match e {
        CoreError::InvalidCommand(_) => StatusCode::CONFLICT,
        CoreError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    json_error(status, &e.to_string()).into_response()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(server: Arc<ScoreboardServer>) -> Router {
    let state = AppState { server };

    Router::new()
        .route("/health", get(health_check))
        // Live match
        .route("/api/state", get(get_state))
        .route("/api/durations", get(list_durations))
        .route("/api/bracket", post(build_bracket))
        .route("/api/commands", post(run_command))
        // Log archive
        .route("/api/logs", get(list_logs).delete(clear_logs))
        .route("/api/logs/{id}", get(get_log))
        .route("/api/logs/{id}/pdf", get(get_log_pdf))
        // Observability
        .route("/metrics", get(get_metrics))
        // WebSocket
        .route("/ws/scoreboard", get(ws::ws_scoreboard))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kumite-backend",
        "storage": state.server.has_storage(),
        "displays": state.server.subscriber_count(),
    }))
}

// ── Match handlers ────────────────────────────────────────────────────

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.server.snapshot()))
}

async fn list_durations() -> impl IntoResponse {
    let durations: Vec<Value> = MatchDuration::all()
        .into_iter()
        .map(|d| json!({ "secs": d.secs(), "label": d.label() }))
        .collect();
    Json(json!({
        "default": MatchDuration::default().label(),
        "durations": durations,
    }))
}

async fn build_bracket(
    State(state): State<AppState>,
    Json(req): Json<BracketRequest>,
) -> impl IntoResponse {
    match state.server.build_bracket(req) {
        Ok(events) => (
            StatusCode::CREATED,
            Json(json!({ "events": events, "state": state.server.snapshot() })),
        )
            .into_response(),
        Err(e) => core_error(&e),
    }
}

async fn run_command(State(state): State<AppState>, Json(cmd): Json<Command>) -> impl IntoResponse {
    match state.server.execute(cmd) {
        Ok(events) => (StatusCode::OK, Json(json!({ "events": events }))).into_response(),
        Err(e) => core_error(&e),
    }
}

// ── Log archive handlers ──────────────────────────────────────────────

async fn list_logs(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.server.logs()))
}

async fn get_log(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.server.log(&id) {
        Some(entry) => (StatusCode::OK, Json(json!(entry))).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "Log not found").into_response(),
    }
}

async fn get_log_pdf(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(entry) = state.server.log(&id) else {
        return json_error(StatusCode::NOT_FOUND, "Log not found").into_response();
    };
    match export::render_pdf(&export::log_body(&entry)) {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", entry.filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to render log document: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render document")
                .into_response()
        }
    }
}

async fn clear_logs(State(state): State<AppState>) -> impl IntoResponse {
    match state.server.clear_logs().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!("Failed to clear stored logs: {e}");
            metrics::STORAGE_FAILURES_TOTAL.inc();
            core_error(&CoreError::from(e))
        }
    }
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
