//! Language model abstraction.
//!
//! The assistant talks to chat-completion models through the [`LLM`] trait so
//! the reasoning step and the summariser can be exercised with scripted models
//! in tests.

pub use crate::core_types::{LLMResponse, Message};
use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub mod openai;

pub use openai::OpenAIClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError>;
}

/// Create an LLM client from configuration
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    let mut client = match &config.provider {
        LlmProvider::OpenAI => {
            let api_key = api_key.ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "No API key found for OpenAI. Set llm.api_key or {}",
                    config.api_key_env.as_deref().unwrap_or("llm.api_key_env")
                ))
            })?;
            let client = OpenAIClient::new(api_key, config.model.clone());
            match &config.api_base {
                Some(base) => client.with_api_base(base.clone()),
                None => client,
            }
        }
        // Self-hosted OpenAI-compatible endpoints often run without a key.
        LlmProvider::Custom { base_url } => {
            OpenAIClient::new(api_key.unwrap_or_default(), config.model.clone())
                .with_api_base(base_url.clone())
        }
    };

    if config.temperature > 0.0 {
        client = client.with_temperature(config.temperature);
    }
    if config.max_tokens > 0 {
        client = client.with_max_tokens(config.max_tokens);
    }

    log::info!("Using chat model '{}' at {}", config.model, client.api_base());
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(create_llm(&config), Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_custom_provider_without_key() {
        let config = LlmConfig {
            provider: LlmProvider::Custom {
                base_url: "http://localhost:11434/v1".to_string(),
            },
            api_key: None,
            ..Default::default()
        };
        assert!(create_llm(&config).is_ok());
    }
}
