//! Tool bridge for the reasoning step.
//!
//! Goal, habit, milestone and progress-log operations live in an external MCP
//! server. The agent only sees the [`ToolProvider`] trait; the conversation
//! memory never calls tools or parses their results.

use crate::config::{McpConfig, McpMode};
use crate::errors::AgentError;
use crate::llm::ToolMetadata;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod mcp;

pub use mcp::McpToolClient;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, AgentError>;
    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError>;
}

/// Connects the tool provider described by `config`, if any.
pub async fn connect_tools(config: &McpConfig) -> Result<Option<Arc<dyn ToolProvider>>, AgentError> {
    match config.mode {
        McpMode::Disabled => {
            log::info!("MCP tools disabled");
            Ok(None)
        }
        McpMode::Local => {
            let client = McpToolClient::connect(config).await?;
            Ok(Some(Arc::new(client)))
        }
    }
}

/// True when a tool's input schema declares a `user_id` property.
pub fn accepts_user_id(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| props.contains_key("user_id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_user_id() {
        assert!(accepts_user_id(&json!({
            "type": "object",
            "properties": {"user_id": {"type": "string"}, "status": {"type": "string"}}
        })));
        assert!(!accepts_user_id(&json!({"type": "object", "properties": {}})));
        assert!(!accepts_user_id(&json!({"type": "object"})));
    }

    #[tokio::test]
    async fn test_disabled_mode_connects_nothing() {
        let tools = connect_tools(&McpConfig::default()).await.unwrap();
        assert!(tools.is_none());
    }
}
