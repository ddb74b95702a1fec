//! Configuration module for the assistant
//!
//! A single YAML document describes the service, storage, memory policy,
//! language model, tool bridge and Telegram settings. Environment variables
//! override file values so container deployments need no file at all.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::AgentError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<GoalgetterConfig, AgentError> {
    ConfigLoader::from_file(path).await
}
