//! HTTP error mapping.
//!
//! Engine errors carry user ids and collaborator details; none of that
//! reaches the response body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use botdock_conversation::EngineError;
use rootcause::prelude::Report;
use serde_json::json;
use std::fmt;

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The path or body named no usable user.
    InvalidUserId { reason: String },
    /// No session is stored for the user.
    SessionNotFound,
    /// The engine failed the request.
    Engine(Report<EngineError>),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUserId { reason } => write!(f, "invalid user id: {reason}"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::Engine(report) => write!(f, "engine error: {report}"),
        }
    }
}

impl From<Report<EngineError>> for ApiError {
    fn from(report: Report<EngineError>) -> Self {
        Self::Engine(report)
    }
}

impl ApiError {
    /// Status code and user-safe message.
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidUserId { .. } => (StatusCode::BAD_REQUEST, "Invalid user id"),
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "Session not found"),
            Self::Engine(report) => match report.current_context() {
                EngineError::SessionStore { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable")
                }
                EngineError::Timeout { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "Request timed out")
                }
                EngineError::NoActiveSkill { .. } => (StatusCode::CONFLICT, "No active skill"),
                EngineError::InvalidCollection { .. } => {
                    (StatusCode::BAD_REQUEST, "Unknown parameter for the active skill")
                }
                EngineError::DefaultSkillMissing { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
