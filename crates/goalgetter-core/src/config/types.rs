//! Configuration type definitions for the assistant
//!
//! Every section carries serde defaults so an empty YAML document yields a
//! working local setup: volatile storage, the default trim tiers and no tools.
//! Secrets are never required inline; each one can be named through an
//! environment variable instead.

use crate::errors::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoalgetterConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_service_version")]
    pub version: String,
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    /// Upper bound for a whole HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `postgres://...` or `sqlite://...`. When unset the volatile store is used.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_database_url_env")]
    pub database_url_env: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_url_env: default_database_url_env(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub trimming: TrimmingConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

/// Tiered trimming policy keyed by raw message count.
///
/// Histories at or below `low_watermark` are forwarded untouched. Above it the
/// budget is chosen by tier: light up to `mid_watermark`, moderate up to
/// `high_watermark`, heavy beyond.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrimmingConfig {
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,
    #[serde(default = "default_mid_watermark")]
    pub mid_watermark: usize,
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,
    #[serde(default = "default_light_budget")]
    pub light_budget: usize,
    #[serde(default = "default_moderate_budget")]
    pub moderate_budget: usize,
    #[serde(default = "default_heavy_budget")]
    pub heavy_budget: usize,
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self {
            low_watermark: default_low_watermark(),
            mid_watermark: default_mid_watermark(),
            high_watermark: default_high_watermark(),
            light_budget: default_light_budget(),
            moderate_budget: default_moderate_budget(),
            heavy_budget: default_heavy_budget(),
        }
    }
}

impl TrimmingConfig {
    /// True when a later tier allows more tokens than an earlier one.
    pub fn has_inverted_budgets(&self) -> bool {
        self.moderate_budget > self.light_budget || self.heavy_budget > self.moderate_budget
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestConfig {
    /// Number of prior messages rendered in the recent-excerpt block.
    #[serde(default = "default_excerpt_window")]
    pub excerpt_window: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            excerpt_window: default_excerpt_window(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStrategy {
    Static,
    #[default]
    Rolling,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryConfig {
    #[serde(default)]
    pub strategy: SummaryStrategy,
    /// Text used by the `static` strategy.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_summary_max_chars")]
    pub max_chars: usize,
    /// Uncovered messages required before the `llm` strategy refreshes.
    #[serde(default = "default_refresh_every")]
    pub refresh_every: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            strategy: SummaryStrategy::default(),
            profile: default_profile(),
            max_chars: default_summary_max_chars(),
            refresh_every: default_refresh_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Custom { base_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            api_base: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Overall bound on one reasoning step, in seconds.
    #[serde(default = "default_reasoning_timeout")]
    pub reasoning_timeout: u64,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Send the trimmed history as chat messages ahead of the prompt text.
    #[serde(default)]
    pub forward_history: bool,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            reasoning_timeout: default_reasoning_timeout(),
            max_tool_rounds: default_max_tool_rounds(),
            forward_history: false,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpMode {
    #[default]
    Disabled,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub mode: McpMode,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout: u64,
    #[serde(default = "default_mcp_token_limit")]
    pub token_limit: u32,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            mode: McpMode::Disabled,
            command: None,
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: default_mcp_timeout(),
            token_limit: default_mcp_token_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_url_env")]
    pub webhook_url_env: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_token_env: default_bot_token_env(),
            api_base: default_telegram_api_base(),
            webhook_url: None,
            webhook_url_env: default_webhook_url_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GoalgetterConfig {
    /// Upper bound in seconds on the timed work of one turn: the reasoning
    /// step, plus the summary refresh when it calls the model.
    pub fn turn_time_budget(&self) -> u64 {
        match self.memory.summary.strategy {
            SummaryStrategy::Llm => self.agent.reasoning_timeout.saturating_mul(2),
            _ => self.agent.reasoning_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        let t = &self.memory.trimming;
        if !(t.low_watermark < t.mid_watermark && t.mid_watermark < t.high_watermark) {
            return Err(AgentError::ConfigError(format!(
                "Trimming watermarks must be strictly increasing (got {} / {} / {})",
                t.low_watermark, t.mid_watermark, t.high_watermark
            )));
        }
        if t.light_budget == 0 || t.moderate_budget == 0 || t.heavy_budget == 0 {
            return Err(AgentError::ConfigError(
                "Trimming budgets must be greater than zero".to_string(),
            ));
        }
        if t.has_inverted_budgets() {
            log::warn!(
                "Trimming budgets grow with message count (light={}, moderate={}, heavy={}); \
                 longer threads will forward more context than shorter ones",
                t.light_budget,
                t.moderate_budget,
                t.heavy_budget
            );
        }

        if self.memory.digest.excerpt_window == 0 {
            return Err(AgentError::ConfigError(
                "memory.digest.excerpt_window must be greater than zero".to_string(),
            ));
        }
        if self.memory.digest.max_message_chars == 0 || self.memory.summary.max_chars == 0 {
            return Err(AgentError::ConfigError(
                "Character ceilings must be greater than zero".to_string(),
            ));
        }
        if self.memory.summary.refresh_every == 0 {
            return Err(AgentError::ConfigError(
                "memory.summary.refresh_every must be greater than zero".to_string(),
            ));
        }

        if self.agent.reasoning_timeout == 0 {
            return Err(AgentError::ConfigError(
                "agent.reasoning_timeout must be greater than zero".to_string(),
            ));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(AgentError::ConfigError(
                "agent.max_tool_rounds must be greater than zero".to_string(),
            ));
        }
        if self.storage.connect_timeout == 0 || self.storage.max_connections == 0 {
            return Err(AgentError::ConfigError(
                "storage.connect_timeout and storage.max_connections must be greater than zero"
                    .to_string(),
            ));
        }
        if self.server.request_timeout <= self.turn_time_budget() {
            return Err(AgentError::ConfigError(format!(
                "server.request_timeout ({}s) must exceed the time a turn may spend reasoning \
                 and summarising ({}s)",
                self.server.request_timeout,
                self.turn_time_budget()
            )));
        }

        if self.mcp.mode == McpMode::Local {
            if self.mcp.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(AgentError::ConfigError(
                    "mcp.mode is 'local' but no mcp.command is configured".to_string(),
                ));
            }
            if self.mcp.timeout == 0 {
                return Err(AgentError::ConfigError(
                    "mcp.timeout must be greater than zero".to_string(),
                ));
            }
        }

        if let LlmProvider::Custom { base_url } = &self.llm.provider {
            if base_url.trim().is_empty() {
                return Err(AgentError::ConfigError(
                    "Custom LLM provider requires a base_url".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn default_service_name() -> String { "goalgetter".to_string() }
fn default_service_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_true() -> bool { true }
fn default_request_timeout() -> u64 { 120 }
fn default_max_body_bytes() -> usize { 1024 * 1024 }
fn default_database_url_env() -> Option<String> { Some("DATABASE_URL".to_string()) }
fn default_max_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_low_watermark() -> usize { 30 }
fn default_mid_watermark() -> usize { 50 }
fn default_high_watermark() -> usize { 100 }
fn default_light_budget() -> usize { 4000 }
fn default_moderate_budget() -> usize { 3000 }
fn default_heavy_budget() -> usize { 2000 }
fn default_excerpt_window() -> usize { 5 }
fn default_max_message_chars() -> usize { 200 }
fn default_profile() -> String {
    "User is working on personal productivity: goals, habits, milestones and progress logs.".to_string()
}
fn default_summary_max_chars() -> usize { 600 }
fn default_refresh_every() -> usize { 10 }
fn default_provider() -> LlmProvider { LlmProvider::OpenAI }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_api_key_env() -> Option<String> { Some("OPENAI_API_KEY".to_string()) }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 2048 }
fn default_reasoning_timeout() -> u64 { 30 }
fn default_max_tool_rounds() -> usize { 8 }
fn default_mcp_timeout() -> u64 { 30 }
pub fn default_mcp_token_limit() -> u32 { 2000 }
fn default_bot_token_env() -> Option<String> { Some("TELEGRAM_BOT_TOKEN".to_string()) }
fn default_telegram_api_base() -> String { "https://api.telegram.org".to_string() }
fn default_webhook_url_env() -> Option<String> { Some("WEBHOOK_URL".to_string()) }
fn default_log_level() -> String { "info".to_string() }
