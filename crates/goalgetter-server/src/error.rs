//! Error types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use goalgetter_core::errors::{AgentError, StoreError, TurnError};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid turn: {0}")]
    Turn(#[from] TurnError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Agent setup failed: {0}")]
    Agent(#[from] AgentError),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::MissingField(_)
            | ServerError::Turn(_)
            | ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::Store(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Telegram(_) | ServerError::Http(_) => StatusCode::BAD_GATEWAY,
            ServerError::Store(_)
            | ServerError::Agent(_)
            | ServerError::Io(_)
            | ServerError::Config(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::MissingField(_) => "missing_field",
            ServerError::Turn(_) => "invalid_turn",
            ServerError::Store(_) => "storage_error",
            ServerError::Agent(_) => "agent_error",
            ServerError::Telegram(_) => "telegram_error",
            ServerError::Http(_) => "http_error",
            ServerError::Json(_) => "json_error",
            ServerError::Io(_) => "io_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected: {}", self);
        }
        let body = Json(json!({
            "error": self.error_type(),
            "details": self.to_string(),
            "timestamp": chrono::Utc::now(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::missing_field("user").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(TurnError::EmptyMessage).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(StoreError::Unavailable("down".to_string())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::from(StoreError::Backend("constraint".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(ServerError::missing_field("user").error_type(), "missing_field");
        assert_eq!(
            ServerError::from(TurnError::MissingIdentity).error_type(),
            "invalid_turn"
        );
    }
}
