//! Conversation digest: a bounded summary plus a recent-turn excerpt.
//!
//! Both parts are plain text handed to the reasoning step and are rebuilt on
//! every turn from live history. Neither is persisted except for the stored
//! rolling summary kept in [`ThreadState`].

use crate::config::{DigestConfig, SummaryConfig, SummaryStrategy};
use crate::core_types::{Message, Role};
use crate::memory::checkpoint::ThreadState;

pub const EXCERPT_HEADER: &str = "CONVERSATION HISTORY:";
pub const TRUNCATION_MARKER: &str = "...";
const RECENT_REQUESTS_IN_SUMMARY: usize = 3;
const REQUEST_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    pub summary: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Default)]
pub struct DigestBuilder {
    digest: DigestConfig,
    summary: SummaryConfig,
}

impl DigestBuilder {
    pub fn new(digest: DigestConfig, summary: SummaryConfig) -> Self {
        Self { digest, summary }
    }

    pub fn summary_config(&self) -> &SummaryConfig {
        &self.summary
    }

    /// `state` is the thread as loaded; `window` is the (possibly trimmed)
    /// history ending with the incoming message.
    pub fn build(&self, state: &ThreadState, window: &[Message]) -> Digest {
        Digest {
            summary: self.build_summary(state),
            excerpt: self.build_recent_excerpt(window),
        }
    }

    pub fn build_summary(&self, state: &ThreadState) -> String {
        let text = match self.summary.strategy {
            SummaryStrategy::Static => self.summary.profile.clone(),
            SummaryStrategy::Rolling => self.rolling_summary(&state.messages),
            SummaryStrategy::Llm => match state.summary.as_deref().map(str::trim) {
                Some(stored) if !stored.is_empty() => stored.to_string(),
                _ => self.rolling_summary(&state.messages),
            },
        };
        truncate_chars(&text, self.summary.max_chars)
    }

    /// Deterministic digest: profile, exchange count and the latest requests.
    fn rolling_summary(&self, messages: &[Message]) -> String {
        let requests: Vec<&Message> = messages.iter().filter(|m| m.role == Role::User).collect();
        if requests.is_empty() {
            return self.summary.profile.clone();
        }

        let recent: Vec<String> = requests
            .iter()
            .rev()
            .take(RECENT_REQUESTS_IN_SUMMARY)
            .rev()
            .map(|m| {
                let preview = truncate_chars(&single_line(&m.content), REQUEST_PREVIEW_CHARS);
                format!("\"{}\"", preview)
            })
            .collect();

        format!(
            "{} {} earlier request{} in this conversation. Most recent: {}.",
            self.summary.profile,
            requests.len(),
            if requests.len() == 1 { "" } else { "s" },
            recent.join("; ")
        )
    }

    /// Numbered, role-labelled transcript of the messages preceding the last
    /// one. Empty when there is nothing before the incoming message.
    pub fn build_recent_excerpt(&self, messages: &[Message]) -> String {
        if messages.len() <= 1 {
            return String::new();
        }

        let prior = &messages[..messages.len() - 1];
        let window = self.digest.excerpt_window.max(1);
        let recent = &prior[prior.len().saturating_sub(window)..];

        let mut lines = Vec::with_capacity(recent.len() + 1);
        lines.push(EXCERPT_HEADER.to_string());
        for (i, message) in recent.iter().enumerate() {
            lines.push(format!(
                "{}. {}: {}",
                i + 1,
                message.role,
                truncate_chars(&excerpt_content(message), self.digest.max_message_chars)
            ));
        }
        lines.join("\n")
    }
}

fn excerpt_content(message: &Message) -> String {
    match &message.tool_calls {
        Some(calls) if message.content.trim().is_empty() && !calls.is_empty() => {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            format!("[called {}]", names.join(", "))
        }
        _ => message.content.clone(),
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `text`, followed by the truncation marker
/// when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ToolCall;
    use serde_json::json;

    fn builder() -> DigestBuilder {
        DigestBuilder::default()
    }

    #[test]
    fn test_excerpt_empty_for_single_message() {
        assert_eq!(builder().build_recent_excerpt(&[]), "");
        assert_eq!(builder().build_recent_excerpt(&[Message::user("hi")]), "");
    }

    #[test]
    fn test_excerpt_excludes_current_message_and_keeps_last_five() {
        let mut messages = Vec::new();
        for i in 0..8 {
            messages.push(Message::user(format!("question {}", i)));
            messages.push(Message::assistant(format!("answer {}", i)));
        }
        messages.push(Message::user("current"));

        let excerpt = builder().build_recent_excerpt(&messages);
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], EXCERPT_HEADER);
        assert_eq!(lines[1], "1. assistant: answer 5");
        assert_eq!(lines[2], "2. user: question 6");
        assert_eq!(lines[5], "5. assistant: answer 7");
        assert!(!excerpt.contains("current"));
    }

    #[test]
    fn test_excerpt_with_short_history() {
        let messages = vec![
            Message::user("create a reading goal"),
            Message::assistant("Created 'Read 12 books'"),
            Message::user("update the latest one"),
        ];
        let excerpt = builder().build_recent_excerpt(&messages);
        assert_eq!(
            excerpt,
            "CONVERSATION HISTORY:\n1. user: create a reading goal\n2. assistant: Created 'Read 12 books'"
        );
    }

    #[test]
    fn test_excerpt_truncates_long_messages() {
        let long = "a".repeat(500);
        let messages = vec![Message::assistant(long.clone()), Message::user("next")];
        let excerpt = builder().build_recent_excerpt(&messages);

        let expected = format!("1. assistant: {}...", "a".repeat(200));
        assert!(excerpt.contains(&expected));
        assert!(!excerpt.contains(&long));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("short", 200), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[test]
    fn test_tool_call_messages_are_labelled() {
        let messages = vec![
            Message::assistant_tool_calls(
                None,
                vec![ToolCall {
                    id: Some("c1".to_string()),
                    name: "get_goals_tool".to_string(),
                    arguments: json!({}),
                }],
            ),
            Message::tool("c1", "[]"),
            Message::user("thanks"),
        ];
        let excerpt = builder().build_recent_excerpt(&messages);
        assert!(excerpt.contains("1. assistant: [called get_goals_tool]"));
        assert!(excerpt.contains("2. tool: []"));
    }

    #[test]
    fn test_summary_strategies() {
        let state = ThreadState {
            messages: vec![
                Message::user("create a goal to run a marathon"),
                Message::assistant("done"),
                Message::user("add a weekly long-run habit"),
            ],
            summary: Some("Training for a marathon.".to_string()),
            summarized_through: 2,
        };

        let static_builder = DigestBuilder::new(
            DigestConfig::default(),
            SummaryConfig {
                strategy: SummaryStrategy::Static,
                profile: "Fixed profile.".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(static_builder.build_summary(&state), "Fixed profile.");

        let rolling = builder().build_summary(&state);
        assert!(rolling.contains("2 earlier requests"));
        assert!(rolling.contains("\"add a weekly long-run habit\""));

        let llm_builder = DigestBuilder::new(
            DigestConfig::default(),
            SummaryConfig {
                strategy: SummaryStrategy::Llm,
                ..Default::default()
            },
        );
        assert_eq!(llm_builder.build_summary(&state), "Training for a marathon.");

        let without_stored = ThreadState {
            summary: None,
            ..state.clone()
        };
        assert_eq!(
            llm_builder.build_summary(&without_stored),
            builder().build_summary(&without_stored)
        );
    }

    #[test]
    fn test_summary_is_bounded() {
        let state = ThreadState {
            messages: vec![Message::user("x".repeat(1000))],
            ..Default::default()
        };
        let bounded = DigestBuilder::new(
            DigestConfig::default(),
            SummaryConfig {
                max_chars: 50,
                ..Default::default()
            },
        );
        assert!(bounded.build_summary(&state).chars().count() <= 50 + TRUNCATION_MARKER.len());
    }
}
