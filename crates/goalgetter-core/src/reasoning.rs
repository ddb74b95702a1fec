//! The reasoning step contract.
//!
//! The orchestrator hands each turn to a [`ReasoningStep`] as a
//! [`ReasoningRequest`]: the acting user's identity, the digest and the new
//! message. What happens inside (model calls, tool calls) is opaque to the
//! memory layer.

use crate::core_types::Message;
use crate::errors::AgentError;
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    /// Identity of the acting user, passed to tools out of band.
    pub user_id: String,
    pub summary: String,
    pub excerpt: String,
    pub message: String,
    /// Trimmed history preceding `message`, oldest first.
    pub history: Vec<Message>,
}

impl ReasoningRequest {
    /// Renders the prompt: identity tag, summary block, excerpt block and the
    /// request, separated by blank lines. Empty blocks are left out.
    pub fn prompt_text(&self) -> String {
        let mut parts = vec![format!("TOOL CONTEXT: user_id={}", self.user_id)];
        if !self.summary.trim().is_empty() {
            parts.push(format!("CONVERSATION SUMMARY: {}", self.summary));
        }
        if !self.excerpt.trim().is_empty() {
            parts.push(self.excerpt.clone());
        }
        parts.push(format!("User Request: {}", self.message));
        parts.join("\n\n")
    }
}

#[async_trait]
pub trait ReasoningStep: Send + Sync {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_text_full() {
        let request = ReasoningRequest {
            user_id: "42".to_string(),
            summary: "Runner.".to_string(),
            excerpt: "CONVERSATION HISTORY:\n1. user: hi".to_string(),
            message: "log 5km".to_string(),
            history: Vec::new(),
        };
        assert_eq!(
            request.prompt_text(),
            "TOOL CONTEXT: user_id=42\n\nCONVERSATION SUMMARY: Runner.\n\nCONVERSATION HISTORY:\n1. user: hi\n\nUser Request: log 5km"
        );
    }

    #[test]
    fn test_prompt_text_skips_empty_blocks() {
        let request = ReasoningRequest {
            user_id: "7".to_string(),
            message: "hello".to_string(),
            ..Default::default()
        };
        assert_eq!(request.prompt_text(), "TOOL CONTEXT: user_id=7\n\nUser Request: hello");
    }
}
