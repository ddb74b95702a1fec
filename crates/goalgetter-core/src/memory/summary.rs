//! Progressive summarisation of a thread with the language model.
//!
//! Messages not yet covered by the stored summary are folded into it once
//! enough of them have accumulated. The result is carried in the next
//! checkpoint's [`ThreadState`] so the model is only consulted occasionally.

use crate::config::{SummaryConfig, SummaryStrategy};
use crate::core_types::Message;
use crate::errors::AgentError;
use crate::llm::LLM;
use crate::memory::checkpoint::ThreadState;
use crate::memory::digest::truncate_chars;
use std::sync::Arc;

const SUMMARIZATION_PROMPT: &str = "You maintain a short profile of a user of a personal productivity assistant. \
Progressively summarize the new lines of conversation, adding onto the current summary and returning a new summary. \
Keep goal, habit and milestone names, numbers and dates. Note the user's tendencies and preferences. \
Answer with the summary only, in at most {max_chars} characters.\n\n\
Current summary:\n{summary}\n\n\
New lines of conversation:\n{new_lines}\n\n\
New summary:";

pub struct RollingSummarizer {
    llm: Arc<dyn LLM>,
    config: SummaryConfig,
}

impl RollingSummarizer {
    pub fn new(llm: Arc<dyn LLM>, config: SummaryConfig) -> Self {
        Self { llm, config }
    }

    pub fn needs_refresh(&self, state: &ThreadState) -> bool {
        self.config.strategy == SummaryStrategy::Llm
            && state.messages.len().saturating_sub(state.summarized_through)
                >= self.config.refresh_every
    }

    /// Folds uncovered messages into `state.summary`. Returns whether the
    /// summary changed; on error `state` is left untouched.
    pub async fn refresh(&self, state: &mut ThreadState) -> Result<bool, AgentError> {
        if !self.needs_refresh(state) {
            return Ok(false);
        }

        let covered = state.summarized_through.min(state.messages.len());
        let new_lines = state.messages[covered..]
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<String>>()
            .join("\n");

        let prompt = SUMMARIZATION_PROMPT
            .replace("{max_chars}", &self.config.max_chars.to_string())
            .replace("{summary}", state.summary.as_deref().unwrap_or(""))
            .replace("{new_lines}", &new_lines);

        let response = self.llm.generate(vec![Message::system(prompt)], None).await?;
        let summary = response
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AgentError::LLMError("Summarization returned no content".to_string()))?;

        log::info!(
            "Refreshed conversation summary over {} new messages ({} chars)",
            state.messages.len() - covered,
            summary.chars().count()
        );
        state.summary = Some(truncate_chars(&summary, self.config.max_chars));
        state.summarized_through = state.messages.len();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::LLMResponse;
    use crate::llm::ToolMetadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingLLM {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLM for RecordingLLM {
        async fn generate(
            &self,
            messages: Vec<Message>,
            _tools: Option<Vec<ToolMetadata>>,
        ) -> Result<LLMResponse, AgentError> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            match &self.reply {
                Some(text) => Ok(LLMResponse {
                    content: Some(text.clone()),
                    tool_calls: None,
                    finish_reason: None,
                    usage: None,
                }),
                None => Err(AgentError::LLMError("offline".to_string())),
            }
        }
    }

    fn config(refresh_every: usize) -> SummaryConfig {
        SummaryConfig {
            strategy: SummaryStrategy::Llm,
            refresh_every,
            ..Default::default()
        }
    }

    fn state(count: usize) -> ThreadState {
        ThreadState {
            messages: (0..count)
                .map(|i| Message::user(format!("message {}", i)))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_folds_uncovered_messages() {
        let llm = Arc::new(RecordingLLM {
            reply: Some("Wants to read more.".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = RollingSummarizer::new(llm.clone(), config(4));

        let mut s = state(3);
        assert!(!summarizer.refresh(&mut s).await.unwrap());

        let mut s = ThreadState {
            summary: Some("Old summary.".to_string()),
            summarized_through: 2,
            ..state(6)
        };
        assert!(summarizer.refresh(&mut s).await.unwrap());
        assert_eq!(s.summary.as_deref(), Some("Wants to read more."));
        assert_eq!(s.summarized_through, 6);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Old summary."));
        assert!(prompts[0].contains("user: message 2"));
        assert!(!prompts[0].contains("user: message 1\n"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_summary() {
        let llm = Arc::new(RecordingLLM {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = RollingSummarizer::new(llm, config(1));
        let mut s = ThreadState {
            summary: Some("Keep me.".to_string()),
            ..state(2)
        };
        assert!(summarizer.refresh(&mut s).await.is_err());
        assert_eq!(s.summary.as_deref(), Some("Keep me."));
        assert_eq!(s.summarized_through, 0);
    }

    #[test]
    fn test_other_strategies_never_refresh() {
        let llm = Arc::new(RecordingLLM {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = RollingSummarizer::new(
            llm,
            SummaryConfig {
                strategy: SummaryStrategy::Rolling,
                refresh_every: 1,
                ..Default::default()
            },
        );
        assert!(!summarizer.needs_refresh(&state(50)));
    }
}
