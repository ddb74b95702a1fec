//! Error types for the assistant core
//!
//! Failures are grouped by where they originate so callers can pick a recovery
//! path: reasoning and tool failures degrade into conversational error text,
//! storage failures trigger the volatile fallback, and request failures are
//! rejected before any state is touched.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("LLM interaction failed: {0}")]
    LLMError(String),
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolError { tool_name: String, message: String },
    #[error("MCP client error: {0}")]
    MCPError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Reasoning step timed out after {0:?}")]
    Timeout(Duration),
    #[error("Maximum tool rounds reached")]
    MaxStepsReached,
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::LLMError(err.to_string())
    }
}

/// Failures reported by a checkpoint backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backend cannot be reached. Callers switch to the volatile store.
    #[error("Checkpoint storage unavailable: {0}")]
    Unavailable(String),
    #[error("Checkpoint storage error: {0}")]
    Backend(String),
    #[error("Checkpoint serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Request-level failures. These reject a single turn and never touch stored state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("Malformed thread key: {0}")]
    MalformedThreadKey(String),
    #[error("Missing user identity")]
    MissingIdentity,
    #[error("Message text is empty")]
    EmptyMessage,
}
