//! MCP tool client over a child-process transport.
//!
//! Launches the productivity MCP server (by default `uv run main.py` in the
//! configured directory), lists its tools once at startup and forwards calls.
//! Tool output is cut to a token limit before it reaches the model.

use crate::config::McpConfig;
use crate::errors::AgentError;
use crate::llm::ToolMetadata;
use crate::tools::ToolProvider;
use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, Content, RawContent, ResourceContents, Tool},
    service::{DynService, RunningService, ServiceExt},
    transport::TokioChildProcess,
    RoleClient,
};
use serde_json::Value;
use std::time::Duration;
use tiktoken_rs::{p50k_base, CoreBPE};
use tokio::process::Command;

const TRUNCATION_MESSAGE: &str = " [...TRUNCATED...]";

pub struct McpToolClient {
    service: Option<RunningService<RoleClient, Box<dyn DynService<RoleClient>>>>,
    tools: Vec<ToolMetadata>,
    call_timeout: Duration,
    token_limit: u32,
    bpe: Option<CoreBPE>,
}

impl McpToolClient {
    pub async fn connect(config: &McpConfig) -> Result<Self, AgentError> {
        let program = config
            .command
            .as_deref()
            .ok_or_else(|| AgentError::ConfigError("mcp.command is not set".to_string()))?;

        log::info!("Starting MCP server: {} {:?}", program, config.args);

        let mut cmd = Command::new(program);
        cmd.args(&config.args);
        if let Some(working_dir) = &config.working_dir {
            log::info!("MCP server working directory: {}", working_dir.display());
            cmd.current_dir(working_dir);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| AgentError::MCPError(format!("Failed to create transport: {}", e)))?;

        let service_handler: Box<dyn DynService<RoleClient>> = Box::new(());
        let service = service_handler.serve(transport).await.map_err(|e| {
            log::error!("MCP initialize handshake failed: {}", e);
            AgentError::MCPError(format!("Failed to create service: {}", e))
        })?;
        log::info!("Connected to MCP server: {:?}", service.peer_info());

        let call_timeout = Duration::from_secs(config.timeout);
        let listed = tokio::time::timeout(call_timeout, service.list_tools(Default::default()))
            .await
            .map_err(|_| {
                AgentError::MCPError(format!(
                    "Timeout waiting for list_tools response after {:?}",
                    call_timeout
                ))
            })?
            .map_err(|e| AgentError::MCPError(format!("Failed to list tools: {}", e)))?;

        let tools: Vec<ToolMetadata> = listed.tools.iter().map(convert_tool).collect();
        log::info!(
            "MCP server offers {} tools: {:?}",
            tools.len(),
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            service: Some(service),
            tools,
            call_timeout,
            token_limit: config.token_limit,
            bpe: load_tokenizer(),
        })
    }

    fn truncate_response(&self, tool_name: &str, content: &[Content]) -> String {
        if content.is_empty() {
            return "Tool executed successfully (no content returned)".to_string();
        }

        let mut full_text = String::new();
        for c in content {
            full_text.push_str(&content_text(c));
            full_text.push('\n');
        }

        let limit = self.token_limit as usize;
        let Some(bpe) = &self.bpe else {
            // Without a tokenizer fall back to the four-characters-per-token estimate.
            let max_chars = limit * 4;
            if full_text.chars().count() <= max_chars {
                return full_text;
            }
            log::warn!(
                "Truncating MCP response for tool '{}' to ~{} tokens",
                tool_name,
                limit
            );
            let mut truncated: String = full_text.chars().take(max_chars).collect();
            truncated.push_str(TRUNCATION_MESSAGE);
            return truncated;
        };

        let mut tokens = bpe.encode_with_special_tokens(&full_text);
        if tokens.len() <= limit {
            return full_text;
        }

        log::warn!(
            "Truncating MCP response for tool '{}' due to token limit ({}).",
            tool_name,
            limit
        );
        tokens.truncate(limit);
        let mut truncated_text = bpe.decode(tokens).unwrap_or_default();
        truncated_text.push_str(TRUNCATION_MESSAGE);
        while bpe.encode_with_special_tokens(&truncated_text).len() > limit {
            truncated_text.pop();
        }
        truncated_text
    }
}

fn load_tokenizer() -> Option<CoreBPE> {
    match p50k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            log::warn!("Tokenizer unavailable, using character estimate for tool output: {}", e);
            None
        }
    }
}

fn content_text(content: &Content) -> String {
    match &content.raw {
        RawContent::Text(text_content) => text_content.text.clone(),
        RawContent::Image(image) => format!("Image ({}, {} bytes)", image.mime_type, image.data.len()),
        RawContent::Resource(resource) => match &resource.resource {
            ResourceContents::TextResourceContents { uri, .. }
            | ResourceContents::BlobResourceContents { uri, .. } => format!("Resource: {}", uri),
        },
        RawContent::Audio(audio) => format!("Audio ({}, {} bytes)", audio.mime_type, audio.data.len()),
    }
}

fn convert_tool(tool: &Tool) -> ToolMetadata {
    ToolMetadata {
        name: tool.name.to_string(),
        description: tool
            .description
            .as_ref()
            .map(|d| d.as_ref())
            .unwrap_or("")
            .to_string(),
        input_schema: Value::Object(tool.input_schema.as_ref().clone()),
    }
}

#[async_trait]
impl ToolProvider for McpToolClient {
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, AgentError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| AgentError::MCPError("Service not available".to_string()))?;

        let arguments = if arguments.is_null() {
            None
        } else {
            arguments.as_object().cloned()
        };

        let request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments,
        };

        let result = tokio::time::timeout(self.call_timeout, service.call_tool(request))
            .await
            .map_err(|_| AgentError::ToolError {
                tool_name: tool_name.to_string(),
                message: format!("timed out after {:?}", self.call_timeout),
            })?
            .map_err(|e| AgentError::MCPError(format!("Failed to call tool '{}': {}", tool_name, e)))?;

        let text = self.truncate_response(tool_name, &result.content);
        if result.is_error.unwrap_or(false) {
            return Err(AgentError::ToolError {
                tool_name: tool_name.to_string(),
                message: text.trim().to_string(),
            });
        }

        log::debug!("Tool '{}' executed successfully", tool_name);
        Ok(text)
    }
}

impl Drop for McpToolClient {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = service.cancel().await {
                        log::warn!("Failed to stop MCP service: {}", e);
                    }
                });
            }
        }
    }
}
