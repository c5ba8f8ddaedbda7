//! Route handlers.
//!
//! - `GET /health`
//! - `POST /render`
//! - `POST /sessions`, `GET /sessions`
//! - `POST /sessions/{id}/{init,plan,apply,destroy}` (server-sent events)
//! - `GET /sessions/{id}/status`
//! - `DELETE /sessions/{id}`

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::info;

use crate::config::DescriptorParser;
use crate::error::{ConfigError, Result};
use crate::lifecycle::InitRequest;
use crate::session::{Operation, SessionSnapshot, SessionSummary};
use crate::stream::EventFeed;

use super::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Body of a successful render.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenderResponse {
    /// Rendered configuration text.
    pub config: String,
    /// SHA-256 of `config`.
    pub fingerprint: String,
    /// Services included, in render order.
    pub services: Vec<String>,
    /// Non-fatal validation findings.
    pub warnings: Vec<String>,
}

/// Query of `DELETE /sessions/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct RemoveParams {
    /// Also delete the working directory.
    #[serde(default)]
    pub purge: bool,
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.controller.store().len(),
    }))
}

/// `POST /render`: descriptor JSON in, configuration text out.
pub async fn render(State(state): State<AppState>, body: String) -> Result<Json<RenderResponse>> {
    let descriptor = DescriptorParser::new().parse_json(&body, None)?;
    let renderer = state.controller.renderer();
    let warnings = renderer.validator().validate(&descriptor)?.warnings;
    let rendered = renderer.render(&descriptor)?;

    Ok(Json(RenderResponse {
        config: rendered.text,
        fingerprint: rendered.fingerprint,
        services: rendered.services.iter().map(|s| s.key().to_string()).collect(),
        warnings,
    }))
}

/// `POST /sessions`: allocates a session with a generated identifier.
pub async fn create_session(State(state): State<AppState>) -> Result<Response> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let session = state.controller.store().get_or_create(&session_id).await?;
    info!("Allocated session {session_id}");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session.id,
            "status": session.status,
            "working_dir": session.working_dir,
        })),
    )
        .into_response())
}

/// `GET /sessions`.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.controller.store().list())
}

/// `POST /sessions/{id}/init`.
pub async fn init(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: String,
) -> Result<Response> {
    let request: InitRequest = serde_json::from_str(&body).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
        location: Some(format!("line {}, column {}", e.line(), e.column())),
    })?;
    let feed = state.controller.init(&session_id, request).await?;
    Ok(feed_response(feed))
}

/// `POST /sessions/{id}/plan`.
pub async fn plan(State(state): State<AppState>, Path(session_id): Path<String>) -> Result<Response> {
    run(&state, Operation::Plan, &session_id).await
}

/// `POST /sessions/{id}/apply`.
pub async fn apply(State(state): State<AppState>, Path(session_id): Path<String>) -> Result<Response> {
    run(&state, Operation::Apply, &session_id).await
}

/// `POST /sessions/{id}/destroy`.
pub async fn destroy(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    run(&state, Operation::Destroy, &session_id).await
}

/// `GET /sessions/{id}/status`.
pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.controller.status(&session_id)?))
}

/// `DELETE /sessions/{id}?purge=true`.
pub async fn remove_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<RemoveParams>,
) -> Result<Json<serde_json::Value>> {
    let session = state
        .controller
        .store()
        .remove(&session_id, params.purge)
        .await?;
    Ok(Json(json!({
        "session_id": session.id,
        "status": session.status,
        "purged": params.purge,
    })))
}

async fn run(state: &AppState, operation: Operation, session_id: &str) -> Result<Response> {
    let feed = state.controller.run(operation, session_id).await?;
    Ok(feed_response(feed))
}

fn feed_response(feed: EventFeed) -> Response {
    let events = feed.map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));
    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
        .into_response()
}
