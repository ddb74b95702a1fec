use crate::core_types::{LLMResponse, Message, Role, ToolCall, Usage};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            model,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request_body(&self, messages: &[Message], tools: Option<&[ToolMetadata]>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                log::debug!("Sending {} tool definitions", tools.len());
                let formatted_tools: Vec<Value> = tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.input_schema
                            }
                        })
                    })
                    .collect();
                body["tools"] = formatted_tools.into();
                body["tool_choice"] = "auto".into();
            }
        }

        body
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| {
                let mut message = json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                });

                if let Role::Tool = msg.role {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        message["tool_call_id"] = json!(tool_call_id);
                    }
                }

                if let Role::Assistant = msg.role {
                    if let Some(tool_calls) = msg.tool_calls.as_ref().filter(|c| !c.is_empty()) {
                        let formatted: Vec<Value> = tool_calls
                            .iter()
                            .enumerate()
                            .map(|(call_idx, tc)| {
                                json!({
                                    "id": tc.id.clone().unwrap_or_else(|| format!("call_{}_{}", idx, call_idx)),
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string()
                                    }
                                })
                            })
                            .collect();
                        message["tool_calls"] = json!(formatted);
                        if msg.content.is_empty() {
                            message["content"] = Value::Null;
                        }
                    }
                }

                message
            })
            .collect()
    }

    fn parse_response(&self, response: Value) -> Result<LLMResponse, AgentError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .ok_or_else(|| AgentError::ParsingError("No choices in response".to_string()))?;
        let message = &choice["message"];

        let content = message["content"].as_str().map(|s| s.to_string());

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let (Some(id), Some(function)) = (call["id"].as_str(), call["function"].as_object())
                else {
                    continue;
                };
                let Some(name) = function.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let arguments = match function.get("arguments").and_then(Value::as_str) {
                    Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map_err(|e| {
                        AgentError::ParsingError(format!(
                            "Invalid tool call arguments JSON for '{}': {}",
                            name, e
                        ))
                    })?,
                    _ => json!({}),
                };
                tool_calls.push(ToolCall {
                    id: Some(id.to_string()),
                    name: name.to_string(),
                    arguments,
                });
            }
        }
        let tool_calls = if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        };

        if content.is_none() && tool_calls.is_none() {
            return Err(AgentError::ParsingError(
                "Response has neither content nor tool calls".to_string(),
            ));
        }

        let usage = response.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: u["prompt_tokens"].as_u64()? as u32,
                completion_tokens: u["completion_tokens"].as_u64()? as u32,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
            usage,
        })
    }
}

#[async_trait]
impl LLM for OpenAIClient {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(&messages, tools.as_deref());

        log::debug!("Chat completion request to {} with {} messages", url, messages.len());

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::LLMError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| AgentError::LLMError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(AgentError::LLMError(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| AgentError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        let parsed = self.parse_response(response_json)?;
        if let Some(usage) = &parsed.usage {
            log::debug!(
                "Chat completion used {} prompt + {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAIClient::new("test-key".to_string(), "gpt-4o-mini".to_string())
            .with_api_base("http://localhost:8080/v1/".to_string())
            .with_temperature(0.3)
            .with_max_tokens(1000);

        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.api_base(), "http://localhost:8080/v1");
        assert_eq!(client.temperature, Some(0.3));
        assert_eq!(client.max_tokens, Some(1000));
    }

    #[test]
    fn test_message_formatting_with_tool_calls() {
        let client = OpenAIClient::new("k".to_string(), "m".to_string());
        let messages = vec![
            Message::system("You are helpful."),
            Message::assistant_tool_calls(
                None,
                vec![ToolCall {
                    id: None,
                    name: "get_goals_tool".to_string(),
                    arguments: json!({"user_id": "1"}),
                }],
            ),
            Message::tool("call_1_0", "[]"),
        ];

        let formatted = client.format_messages(&messages);
        assert_eq!(formatted[0]["role"], "system");
        assert_eq!(formatted[1]["content"], Value::Null);
        assert_eq!(formatted[1]["tool_calls"][0]["id"], "call_1_0");
        assert_eq!(
            formatted[1]["tool_calls"][0]["function"]["arguments"],
            "{\"user_id\":\"1\"}"
        );
        assert_eq!(formatted[2]["tool_call_id"], "call_1_0");
    }

    #[test]
    fn test_request_body_includes_tools() {
        let client = OpenAIClient::new("k".to_string(), "m".to_string()).with_max_tokens(64);
        let tools = vec![ToolMetadata {
            name: "create_goal_tool".to_string(),
            description: "Create a goal".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let body = client.build_request_body(&[Message::user("hi")], Some(&tools));
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["tools"][0]["function"]["name"], "create_goal_tool");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_parse_response_with_tool_calls_and_usage() {
        let client = OpenAIClient::new("k".to_string(), "m".to_string());
        let response = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_goals_tool", "arguments": "{\"status\":\"active\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let parsed = client.parse_response(response).unwrap();
        assert!(parsed.content.is_none());
        let calls = parsed.tool_calls.unwrap();
        assert_eq!(calls[0].name, "get_goals_tool");
        assert_eq!(calls[0].arguments["status"], "active");
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_response_rejects_empty_message() {
        let client = OpenAIClient::new("k".to_string(), "m".to_string());
        assert!(client.parse_response(json!({"choices": []})).is_err());
        assert!(client
            .parse_response(json!({"choices": [{"message": {"content": null}}]}))
            .is_err());
    }
}
