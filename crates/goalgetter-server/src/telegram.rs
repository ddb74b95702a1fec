//! Minimal Telegram Bot API client and reply cleanup.

use crate::error::{Result, ServerError};
use goalgetter_core::config::TelegramConfig;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

pub struct TelegramClient {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }

    /// `None` when no bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        let token = config.bot_token.as_deref().map(str::trim)?;
        if token.is_empty() {
            return None;
        }
        Some(Self::new(config.api_base.clone(), token))
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Option<Value>> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&text).map_err(|e| {
            ServerError::Telegram(format!(
                "{} returned status {} with an unreadable body: {}",
                method, status, e
            ))
        })?;

        if !parsed.ok {
            return Err(ServerError::Telegram(format!(
                "{} failed: {}",
                method,
                parsed.description.unwrap_or_else(|| status.to_string())
            )));
        }
        Ok(parsed.result)
    }

    /// Sends `text` as Markdown, retrying as plain text when Telegram cannot
    /// parse the markup.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let markdown = json!({"chat_id": chat_id, "text": text, "parse_mode": "Markdown"});
        match self.call("sendMessage", &markdown).await {
            Ok(_) => {}
            Err(ServerError::Telegram(description)) if description.contains("parse") => {
                log::warn!("Telegram rejected Markdown reply, resending as plain text");
                self.call("sendMessage", &json!({"chat_id": chat_id, "text": text}))
                    .await?;
            }
            Err(e) => return Err(e),
        }
        log::info!(
            "Sent Telegram message to chat {} ({} chars)",
            chat_id,
            text.chars().count()
        );
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        self.call("setWebhook", &json!({"url": url})).await?;
        log::info!("Telegram webhook set to {}", url);
        Ok(())
    }

    pub async fn webhook_info(&self) -> Result<Value> {
        Ok(self
            .call("getWebhookInfo", &json!({}))
            .await?
            .unwrap_or(Value::Null))
    }
}

static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:action|action type|data|next steps|summary)\s*:[^\n]*\n?")
        .expect("invalid label regex")
});

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("invalid blank line regex"));

/// Strips structured-output labels and escape artifacts from a model reply
/// before it goes to a chat client.
pub fn clean_reply(text: &str) -> String {
    let unescaped = text
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\\\", "\\");
    let without_labels = LABEL_LINE.replace_all(&unescaped, "");
    BLANK_LINES
        .replace_all(&without_labels, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reply_unescapes() {
        assert_eq!(
            clean_reply("Great job!\\nYou\\'re on a 5 day streak."),
            "Great job!\nYou're on a 5 day streak."
        );
    }

    #[test]
    fn test_clean_reply_strips_labels_and_blank_runs() {
        let raw = "Action: goals\nI created the goal \"Read 12 books\".\n\n\n\nNext Steps: add a milestone\n";
        assert_eq!(clean_reply(raw), "I created the goal \"Read 12 books\".");
    }

    #[test]
    fn test_clean_reply_keeps_words_inside_sentences() {
        let raw = "Your goals look good. The summary: you are on track.";
        assert_eq!(clean_reply(raw), raw);
    }

    #[test]
    fn test_from_config_requires_token() {
        let mut config = TelegramConfig::default();
        config.bot_token = None;
        assert!(TelegramClient::from_config(&config).is_none());
        config.bot_token = Some("  ".to_string());
        assert!(TelegramClient::from_config(&config).is_none());
        config.bot_token = Some("123:abc".to_string());
        let client = TelegramClient::from_config(&config).unwrap();
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
