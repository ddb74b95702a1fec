//! Core type definitions shared by the checkpoint store, the digest builder and
//! the language-model client.
//!
//! `Message` is the single shape a conversation entry takes inside this crate.
//! Payloads coming from external libraries are converted at the boundary so the
//! stored history never mixes representations.

use crate::errors::TurnError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.unwrap_or_default(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

const MAX_THREAD_KEY_LEN: usize = 256;

/// Opaque identifier of a conversation thread.
///
/// Keys are derived from a stable end-user identity so repeated sessions from
/// the same user resume the same history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, TurnError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TurnError::MalformedThreadKey("thread key is empty".to_string()));
        }
        if raw.len() > MAX_THREAD_KEY_LEN {
            return Err(TurnError::MalformedThreadKey(format!(
                "thread key exceeds {} bytes",
                MAX_THREAD_KEY_LEN
            )));
        }
        if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(TurnError::MalformedThreadKey(format!(
                "thread key '{}' contains whitespace or control characters",
                raw.escape_debug()
            )));
        }
        Ok(Self(raw))
    }

    /// Thread key for an end user, `user_<identity>`.
    pub fn for_user(user_identity: &str) -> Result<Self, TurnError> {
        let identity = user_identity.trim();
        if identity.is_empty() {
            return Err(TurnError::MissingIdentity);
        }
        Self::parse(format!("user_{}", identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ThreadKey {
    type Error = TurnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ThreadKey::parse(value)
    }
}

impl From<ThreadKey> for String {
    fn from(key: ThreadKey) -> Self {
        key.0
    }
}
