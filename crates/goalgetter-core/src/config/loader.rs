//! Configuration loader for YAML files and environment resolution
//!
//! Values from the YAML document are applied first, then environment variables
//! override them, then the result is validated. Deployments configured purely
//! through the environment keep working with an empty or missing file.

use crate::config::types::*;
use crate::errors::AgentError;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

pub const DEFAULT_CONFIG_FILE: &str = "goalgetter.yaml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<GoalgetterConfig, AgentError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        log::info!("Loaded configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<GoalgetterConfig, AgentError> {
        let mut config: GoalgetterConfig = if content.trim().is_empty() {
            GoalgetterConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                AgentError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::resolve_environment(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<GoalgetterConfig, AgentError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::info!(
                "No configuration file at {}, using defaults and environment",
                path.display()
            );
            Self::from_str("")
        }
    }

    fn resolve_environment(config: &mut GoalgetterConfig) -> Result<(), AgentError> {
        if let Some(name) = env_string("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Some(version) = env_string("SERVICE_VERSION") {
            config.service.version = version;
        }
        if let Some(debug) = env_string("DEBUG") {
            config.service.debug = parse_bool("DEBUG", &debug)?;
        }
        if let Some(level) = env_string("LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        if config.storage.database_url.is_none() {
            if let Some(var) = &config.storage.database_url_env {
                config.storage.database_url = env_string(var);
            }
        }

        if config.llm.api_key.is_none() {
            if let Some(var) = &config.llm.api_key_env {
                config.llm.api_key = env_string(var);
            }
        }

        if config.telegram.bot_token.is_none() {
            if let Some(var) = &config.telegram.bot_token_env {
                config.telegram.bot_token = env_string(var);
            }
        }
        if config.telegram.webhook_url.is_none() {
            if let Some(var) = &config.telegram.webhook_url_env {
                config.telegram.webhook_url = env_string(var);
            }
        }

        Self::resolve_mcp(&mut config.mcp)?;
        Self::resolve_trimming(&mut config.memory.trimming)?;

        Ok(())
    }

    fn resolve_mcp(mcp: &mut McpConfig) -> Result<(), AgentError> {
        if let Some(mode) = env_string("MCP_SERVER_MODE") {
            mcp.mode = match mode.to_lowercase().as_str() {
                "local" => McpMode::Local,
                "disabled" | "none" | "off" => McpMode::Disabled,
                "remote" => {
                    log::warn!("MCP_SERVER_MODE=remote is not supported; tools are disabled");
                    McpMode::Disabled
                }
                other => {
                    return Err(AgentError::ConfigError(format!(
                        "Invalid MCP_SERVER_MODE '{}': expected 'local' or 'disabled'",
                        other
                    )))
                }
            };
        }

        if let Some(path) = env_string("MCP_SERVER_PATH") {
            mcp.working_dir = Some(PathBuf::from(path));
            if mcp.command.is_none() {
                mcp.command = Some("uv".to_string());
                mcp.args = vec!["run".to_string(), "main.py".to_string()];
            }
        }

        if let Some(timeout) = env_parse::<u64>("MCP_SERVER_TIMEOUT")? {
            mcp.timeout = timeout;
        }

        Ok(())
    }

    fn resolve_trimming(trimming: &mut TrimmingConfig) -> Result<(), AgentError> {
        if let Some(v) = env_parse::<usize>("MAX_MESSAGES_BEFORE_TRIMMING")? {
            trimming.low_watermark = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_TOKENS_LIGHT_TRIMMING")? {
            trimming.light_budget = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_TOKENS_MODERATE_TRIMMING")? {
            trimming.moderate_budget = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_TOKENS_HEAVY_TRIMMING")? {
            trimming.heavy_budget = v;
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, AgentError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            AgentError::ConfigError(format!("Invalid value '{}' for {}: {}", raw, key, e))
        }),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, AgentError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AgentError::ConfigError(format!(
            "Invalid boolean '{}' for {}",
            other, key
        ))),
    }
}
