//! Core of the Goalgetter productivity assistant.
//!
//! The crate owns everything between an incoming chat message and the reply:
//! per-user conversation threads persisted as append-only checkpoints, a
//! token-budgeted context trimmer, the summary and excerpt digest that keeps
//! the model oriented, and the turn orchestrator that ties them together.
//!
//! # Architecture Overview
//!
//! - **Memory**: checkpoint stores (SQL with an in-memory fallback), token
//!   estimation, tiered trimming and digests
//! - **Orchestration**: the per-turn state machine with per-thread locking
//! - **Reasoning**: a pluggable step; the default is an OpenAI-compatible
//!   model driving MCP tools
//! - **Configuration**: YAML files with environment overrides

pub mod agent;
pub mod config;
pub mod core_types;
pub mod diagnostics;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod reasoning;
pub mod tools;

pub use agent::ProductivityAgent;
pub use config::*;
pub use core_types::{Message, Role, ThreadKey};
pub use diagnostics::MemoryStatus;
pub use errors::{AgentError, StoreError, TurnError};
pub use llm::LLM;
pub use orchestrator::{TurnDiagnostics, TurnOrchestrator, TurnOutcome, TurnPhase, TurnRequest};
pub use reasoning::{ReasoningRequest, ReasoningStep};
