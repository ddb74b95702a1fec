//! Productivity agent: the default reasoning step.
//!
//! Sends the system prompt and the rendered turn prompt to the chat model and
//! runs tool calls against the MCP bridge until the model answers in text or
//! the round limit is hit. The acting user's id is written into every tool
//! call whose schema takes one, so the model cannot act on another user.

use crate::config::AgentSettings;
use crate::core_types::{Message, Role, ToolCall};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use crate::prompts::SYSTEM_PROMPT;
use crate::reasoning::{ReasoningRequest, ReasoningStep};
use crate::tools::{accepts_user_id, ToolProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct ProductivityAgent {
    llm: Arc<dyn LLM>,
    tools: Option<Arc<dyn ToolProvider>>,
    system_prompt: String,
    max_tool_rounds: usize,
    forward_history: bool,
}

impl ProductivityAgent {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            llm,
            tools: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tool_rounds: 8,
            forward_history: false,
        }
    }

    pub fn from_settings(
        llm: Arc<dyn LLM>,
        tools: Option<Arc<dyn ToolProvider>>,
        settings: &AgentSettings,
    ) -> Self {
        let mut agent = Self::new(llm)
            .with_max_tool_rounds(settings.max_tool_rounds)
            .with_forward_history(settings.forward_history);
        if let Some(tools) = tools {
            agent = agent.with_tools(tools);
        }
        if let Some(prompt) = &settings.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        agent
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolProvider>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_forward_history(mut self, forward: bool) -> Self {
        self.forward_history = forward;
        self
    }

    fn initial_messages(&self, request: &ReasoningRequest) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt.clone())];
        if self.forward_history {
            messages.extend(
                request
                    .history
                    .iter()
                    .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                    .filter(|m| m.tool_calls.is_none() && !m.content.trim().is_empty())
                    .cloned(),
            );
        }
        messages.push(Message::user(request.prompt_text()));
        messages
    }

    async fn available_tools(&self) -> Vec<ToolMetadata> {
        let Some(provider) = &self.tools else {
            return Vec::new();
        };
        match provider.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                log::warn!("Could not list tools, continuing without them: {}", e);
                Vec::new()
            }
        }
    }

    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        tools: &[ToolMetadata],
        user_id: &str,
    ) -> String {
        let Some(provider) = &self.tools else {
            return format!("Unknown tool: {}", call.name);
        };
        let Some(metadata) = tools.iter().find(|t| t.name == call.name) else {
            return format!("Unknown tool: {}", call.name);
        };

        let mut arguments = match &call.arguments {
            Value::Object(map) => Value::Object(map.clone()),
            _ => Value::Object(Default::default()),
        };
        if accepts_user_id(&metadata.input_schema) {
            arguments["user_id"] = Value::String(user_id.to_string());
        }

        log::info!("Calling tool '{}'", call.name);
        match provider.call_tool(&call.name, arguments).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Tool '{}' failed: {}", call.name, e);
                format!("Tool '{}' execution failed: {}", call.name, e)
            }
        }
    }
}

#[async_trait]
impl ReasoningStep for ProductivityAgent {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, AgentError> {
        let tools = self.available_tools().await;
        let tool_param = if tools.is_empty() {
            None
        } else {
            Some(tools.clone())
        };

        let mut messages = self.initial_messages(request);

        for round in 0..self.max_tool_rounds {
            let response = self.llm.generate(messages.clone(), tool_param.clone()).await?;

            let calls = response.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                return response
                    .content
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AgentError::ParsingError("Model returned an empty reply".to_string())
                    });
            }

            // Every call needs an id so its result can be paired with it.
            let calls: Vec<ToolCall> = calls
                .into_iter()
                .enumerate()
                .map(|(i, mut call)| {
                    if call.id.is_none() {
                        call.id = Some(format!("call_{}_{}", round, i));
                    }
                    call
                })
                .collect();

            messages.push(Message::assistant_tool_calls(response.content, calls.clone()));
            for call in &calls {
                let output = self.execute_tool_call(call, &tools, &request.user_id).await;
                messages.push(Message::tool(call.id.clone().unwrap_or_default(), output));
            }
        }

        log::warn!(
            "Stopped after {} tool rounds without a final answer",
            self.max_tool_rounds
        );
        Err(AgentError::MaxStepsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::LLMResponse;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned responses and records the conversations it was sent.
    struct ScriptedLLM {
        responses: Mutex<Vec<LLMResponse>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedLLM {
        fn new(mut responses: Vec<LLMResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLM for ScriptedLLM {
        async fn generate(
            &self,
            messages: Vec<Message>,
            _tools: Option<Vec<ToolMetadata>>,
        ) -> Result<LLMResponse, AgentError> {
            self.seen.lock().unwrap().push(messages);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::LLMError("script exhausted".to_string()))
        }
    }

    struct GoalTools {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolProvider for GoalTools {
        async fn list_tools(&self) -> Result<Vec<ToolMetadata>, AgentError> {
            Ok(vec![ToolMetadata {
                name: "get_goals_tool".to_string(),
                description: "List goals".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"user_id": {"type": "string"}, "status": {"type": "string"}}
                }),
            }])
        }

        async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments));
            Ok("[{\"id\": 3, \"title\": \"Read 12 books\"}]".to_string())
        }
    }

    fn text(content: &str) -> LLMResponse {
        LLMResponse {
            content: Some(content.to_string()),
            tool_calls: None,
            finish_reason: None,
            usage: None,
        }
    }

    fn tool_call(name: &str, arguments: Value) -> LLMResponse {
        LLMResponse {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: None,
                name: name.to_string(),
                arguments,
            }]),
            finish_reason: None,
            usage: None,
        }
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest {
            user_id: "42".to_string(),
            message: "what are my goals?".to_string(),
            history: vec![Message::user("earlier"), Message::assistant("reply")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let llm = Arc::new(ScriptedLLM::new(vec![text("  You have no goals yet. ")]));
        let agent = ProductivityAgent::new(llm.clone());

        let reply = agent.invoke(&request()).await.unwrap();
        assert_eq!(reply, "You have no goals yet.");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, Role::System);
        assert!(seen[0][1].content.starts_with("TOOL CONTEXT: user_id=42"));
    }

    #[tokio::test]
    async fn test_tool_round_injects_user_id() {
        let llm = Arc::new(ScriptedLLM::new(vec![
            tool_call("get_goals_tool", json!({"user_id": "123", "status": "active"})),
            text("You are working on 'Read 12 books'."),
        ]));
        let tools = Arc::new(GoalTools {
            calls: Mutex::new(Vec::new()),
        });
        let agent = ProductivityAgent::new(llm.clone()).with_tools(tools.clone());

        let reply = agent.invoke(&request()).await.unwrap();
        assert_eq!(reply, "You are working on 'Read 12 books'.");

        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["user_id"], "42");
        assert_eq!(calls[0].1["status"], "active");

        let seen = llm.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[3].role, Role::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_0_0"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let llm = Arc::new(ScriptedLLM::new(vec![
            tool_call("delete_everything", json!({})),
            text("Sorry, I can't do that."),
        ]));
        let agent = ProductivityAgent::new(llm.clone());

        agent.invoke(&request()).await.unwrap();
        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[1][3].content, "Unknown tool: delete_everything");
    }

    #[tokio::test]
    async fn test_round_limit() {
        let llm = Arc::new(ScriptedLLM::new(vec![
            tool_call("get_goals_tool", json!({})),
            tool_call("get_goals_tool", json!({})),
        ]));
        let tools = Arc::new(GoalTools {
            calls: Mutex::new(Vec::new()),
        });
        let agent = ProductivityAgent::new(llm)
            .with_tools(tools)
            .with_max_tool_rounds(2);

        let err = agent.invoke(&request()).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxStepsReached));
    }

    #[tokio::test]
    async fn test_forward_history() {
        let llm = Arc::new(ScriptedLLM::new(vec![text("ok")]));
        let agent = ProductivityAgent::new(llm.clone()).with_forward_history(true);

        agent.invoke(&request()).await.unwrap();
        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 4);
        assert_eq!(seen[0][1].content, "earlier");
        assert_eq!(seen[0][2].content, "reply");
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let llm = Arc::new(ScriptedLLM::new(Vec::new()));
        let agent = ProductivityAgent::new(llm);
        assert!(matches!(
            agent.invoke(&request()).await,
            Err(AgentError::LLMError(_))
        ));
    }
}
