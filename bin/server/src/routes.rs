//! HTTP routes.
//!
//! The webhook accepts events already normalized by the platform adapter
//! and answers with the session projection after the step.

use crate::error::ApiError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use botdock_conversation::{ConversationEngine, Delivery, Event, Response};
use botdock_core::UserId;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(engine: ConversationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Webhook reply: the session projection plus what happened to delivery.
#[derive(Debug, Serialize)]
pub struct WebhookReply {
    pub step_id: String,
    #[serde(flatten)]
    pub response: Response,
    pub delivery: Delivery,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/sessions/{user_id}", get(get_session).delete(delete_session))
        .route("/health", get(health))
        .with_state(state)
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse().map_err(|e: botdock_core::ParseIdError| ApiError::InvalidUserId {
        reason: e.to_string(),
    })
}

/// Processes one inbound event.
pub async fn webhook(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> Result<Json<WebhookReply>, ApiError> {
    parse_user_id(event.user_id.as_str())?;
    let outcome = state.engine.handle(event).await?;
    Ok(Json(WebhookReply {
        step_id: outcome.step_id.to_string(),
        response: outcome.response,
        delivery: outcome.delivery,
    }))
}

/// Returns the current projection of a user's session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Response>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state
        .engine
        .snapshot(&user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::SessionNotFound)
}

/// Clears a user's session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state.engine.reset(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness probe.
pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}
