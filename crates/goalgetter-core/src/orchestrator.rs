//! Turn orchestration.
//!
//! One turn walks `Idle → Loading → Sizing → Trimming → Digesting → Reasoning →
//! Persisting → Done`. A failing reasoning step moves the turn to `Failed`, but
//! the synthesized error reply is still persisted so the thread records what
//! the user saw. Every request gets a reply; storage problems only cost
//! durability.
//!
//! Turns on the same thread are serialised by [`ThreadLocks`] from loading to
//! persisting. Turns on different threads run concurrently.

use crate::config::GoalgetterConfig;
use crate::core_types::{Message, ThreadKey};
use crate::diagnostics::{memory_status, MemoryStatus};
use crate::errors::{AgentError, StoreError, TurnError};
use crate::llm::LLM;
use crate::memory::tokens::estimate_messages;
use crate::memory::{
    CheckpointLookup, CheckpointStore, ContextTrimmer, DigestBuilder, RollingSummarizer,
    StoreBackend, ThreadState, TrimTier,
};
use crate::reasoning::{ReasoningRequest, ReasoningStep};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

pub const ERROR_REPLY_PREFIX: &str = "Error processing request: ";
const DEFAULT_REASONING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    Idle,
    Loading,
    Sizing,
    Trimming,
    Digesting,
    Reasoning,
    Persisting,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_key: ThreadKey,
    pub user_identity: String,
    pub message: String,
}

impl TurnRequest {
    pub fn new(
        thread_key: ThreadKey,
        user_identity: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, TurnError> {
        let user_identity = user_identity.into().trim().to_string();
        if user_identity.is_empty() {
            return Err(TurnError::MissingIdentity);
        }
        let message = message.into();
        if message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        Ok(Self {
            thread_key,
            user_identity,
            message,
        })
    }

    /// Request on the user's own thread, `user_<identity>`.
    pub fn for_user(user_identity: &str, message: impl Into<String>) -> Result<Self, TurnError> {
        let thread_key = ThreadKey::for_user(user_identity)?;
        Self::new(thread_key, user_identity, message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDiagnostics {
    pub thread_key: String,
    /// Messages in the thread before this turn.
    pub history_length: usize,
    /// History plus the incoming message; selects the trim tier.
    pub message_count: usize,
    pub forwarded_count: usize,
    pub estimated_tokens: usize,
    pub trim_tier: TrimTier,
    pub over_budget: bool,
    pub checkpoint_version: Option<u64>,
    pub persisted: bool,
    pub storage: StoreBackend,
    pub phase: TurnPhase,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub success: bool,
    pub diagnostics: TurnDiagnostics,
}

/// One async mutex per thread key. Entries nobody holds or waits on are
/// dropped on the next acquisition.
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<ThreadKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_key: &ThreadKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|key, lock| key == thread_key || Arc::strong_count(lock) > 1);
            locks.entry(thread_key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct TurnOrchestrator {
    store: Arc<dyn CheckpointStore>,
    reasoning: Arc<dyn ReasoningStep>,
    trimmer: ContextTrimmer,
    digest: DigestBuilder,
    summarizer: Option<RollingSummarizer>,
    reasoning_timeout: Duration,
    locks: ThreadLocks,
}

impl TurnOrchestrator {
    pub fn new(store: Arc<dyn CheckpointStore>, reasoning: Arc<dyn ReasoningStep>) -> Self {
        Self {
            store,
            reasoning,
            trimmer: ContextTrimmer::default(),
            digest: DigestBuilder::default(),
            summarizer: None,
            reasoning_timeout: DEFAULT_REASONING_TIMEOUT,
            locks: ThreadLocks::new(),
        }
    }

    /// Wires memory policy and timeouts from `config`. `summary_llm` is only
    /// used by the `llm` summary strategy.
    pub fn from_config(
        config: &GoalgetterConfig,
        store: Arc<dyn CheckpointStore>,
        reasoning: Arc<dyn ReasoningStep>,
        summary_llm: Option<Arc<dyn LLM>>,
    ) -> Self {
        let memory = &config.memory;
        let mut orchestrator = Self::new(store, reasoning)
            .with_trimmer(ContextTrimmer::new(memory.trimming.clone()))
            .with_digest_builder(DigestBuilder::new(memory.digest.clone(), memory.summary.clone()))
            .with_reasoning_timeout(Duration::from_secs(config.agent.reasoning_timeout));
        if let Some(llm) = summary_llm {
            orchestrator =
                orchestrator.with_summarizer(RollingSummarizer::new(llm, memory.summary.clone()));
        }
        orchestrator
    }

    pub fn with_trimmer(mut self, trimmer: ContextTrimmer) -> Self {
        self.trimmer = trimmer;
        self
    }

    pub fn with_digest_builder(mut self, digest: DigestBuilder) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_summarizer(mut self, summarizer: RollingSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_reasoning_timeout(mut self, timeout: Duration) -> Self {
        self.reasoning_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn storage_backend(&self) -> StoreBackend {
        self.store.backend()
    }

    pub async fn memory_status(&self, thread_key: &ThreadKey) -> Result<MemoryStatus, StoreError> {
        memory_status(self.store.as_ref(), thread_key).await
    }

    /// Runs one turn on the user's own thread.
    pub async fn chat(
        &self,
        user_identity: &str,
        message: impl Into<String>,
    ) -> Result<TurnOutcome, TurnError> {
        let request = TurnRequest::for_user(user_identity, message)?;
        Ok(self.run_turn(request).await)
    }

    pub async fn run_turn(&self, request: TurnRequest) -> TurnOutcome {
        let key = request.thread_key.clone();
        let _guard = self.locks.acquire(&key).await;
        let mut phase = TurnPhase::Idle;

        advance(&key, &mut phase, TurnPhase::Loading);
        let (state, can_persist) = match self.store.get_latest(&key).await {
            Ok(CheckpointLookup::Found(checkpoint)) => {
                log::debug!(
                    "Loaded checkpoint v{} for thread {} ({} messages)",
                    checkpoint.version,
                    key,
                    checkpoint.state.message_count()
                );
                (checkpoint.state, true)
            }
            Ok(CheckpointLookup::NotFound) => {
                log::info!("Starting new thread {}", key);
                (ThreadState::default(), true)
            }
            Err(e) => {
                log::error!(
                    "Failed to load thread {}: {}. Answering without history; this turn will not be persisted",
                    key,
                    e
                );
                (ThreadState::default(), false)
            }
        };
        let history_length = state.message_count();

        advance(&key, &mut phase, TurnPhase::Sizing);
        let user_message = Message::user(request.message.clone());
        let mut window = state.messages.clone();
        window.push(user_message.clone());
        let message_count = window.len();
        let estimated_tokens = estimate_messages(&window);
        log::debug!(
            "Thread {} holds {} messages (~{} tokens)",
            key,
            message_count,
            estimated_tokens
        );

        advance(&key, &mut phase, TurnPhase::Trimming);
        let trimmed = self.trimmer.trim_with_outcome(&window, message_count);
        let forwarded = if trimmed.messages.is_empty() {
            vec![user_message.clone()]
        } else {
            trimmed.messages
        };

        advance(&key, &mut phase, TurnPhase::Digesting);
        let digest = self.digest.build(&state, &forwarded);

        advance(&key, &mut phase, TurnPhase::Reasoning);
        let reasoning_request = ReasoningRequest {
            user_id: request.user_identity.clone(),
            summary: digest.summary,
            excerpt: digest.excerpt,
            message: request.message.clone(),
            history: forwarded[..forwarded.len() - 1].to_vec(),
        };
        let result = tokio::time::timeout(
            self.reasoning_timeout,
            self.reasoning.invoke(&reasoning_request),
        )
        .await
        .unwrap_or(Err(AgentError::Timeout(self.reasoning_timeout)));

        let (reply, error) = match result {
            Ok(reply) => (reply, None),
            Err(e) => {
                log::error!("Reasoning failed for thread {}: {}", key, e);
                advance(&key, &mut phase, TurnPhase::Failed);
                (format!("{}{}", ERROR_REPLY_PREFIX, e), Some(e.to_string()))
            }
        };

        advance(&key, &mut phase, TurnPhase::Persisting);
        let checkpoint_version = if can_persist {
            let mut next = state;
            next.messages.push(user_message);
            next.messages.push(Message::assistant(reply.clone()));
            self.refresh_summary(&key, &mut next).await;

            match self.store.append(&key, next).await {
                Ok(checkpoint) => {
                    log::debug!("Persisted checkpoint v{} for thread {}", checkpoint.version, key);
                    Some(checkpoint.version)
                }
                Err(e) => {
                    log::error!(
                        "Failed to persist turn for thread {} (data loss risk): {}",
                        key,
                        e
                    );
                    None
                }
            }
        } else {
            log::error!(
                "Skipped persisting turn for thread {} after a failed load (data loss risk)",
                key
            );
            None
        };

        let final_phase = if error.is_some() {
            TurnPhase::Failed
        } else {
            TurnPhase::Done
        };
        advance(&key, &mut phase, final_phase);

        TurnOutcome {
            success: error.is_none(),
            reply,
            diagnostics: TurnDiagnostics {
                thread_key: key.to_string(),
                history_length,
                message_count,
                forwarded_count: forwarded.len(),
                estimated_tokens,
                trim_tier: trimmed.tier,
                over_budget: trimmed.over_budget,
                checkpoint_version,
                persisted: checkpoint_version.is_some(),
                storage: self.store.backend(),
                phase,
                error,
            },
        }
    }

    async fn refresh_summary(&self, key: &ThreadKey, state: &mut ThreadState) {
        let Some(summarizer) = &self.summarizer else {
            return;
        };
        if !summarizer.needs_refresh(state) {
            return;
        }
        match tokio::time::timeout(self.reasoning_timeout, summarizer.refresh(state)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::warn!("Keeping previous summary for thread {}: {}", key, e),
            Err(_) => log::warn!("Summary refresh for thread {} timed out", key),
        }
    }
}

fn advance(key: &ThreadKey, phase: &mut TurnPhase, next: TurnPhase) {
    if *phase != next {
        log::debug!("Thread {}: {:?} -> {:?}", key, phase, next);
        *phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCheckpointStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ReasoningStep for Echo {
        async fn invoke(&self, request: &ReasoningRequest) -> Result<String, AgentError> {
            Ok(format!("echo: {}", request.message))
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningStep for Slow {
        async fn invoke(&self, _request: &ReasoningRequest) -> Result<String, AgentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[test]
    fn test_turn_request_validation() {
        assert_eq!(
            TurnRequest::for_user("", "hi").unwrap_err(),
            TurnError::MissingIdentity
        );
        assert_eq!(
            TurnRequest::for_user("5", "   ").unwrap_err(),
            TurnError::EmptyMessage
        );
        let request = TurnRequest::for_user("5", "hi").unwrap();
        assert_eq!(request.thread_key.as_str(), "user_5");
        assert_eq!(request.user_identity, "5");
    }

    #[tokio::test]
    async fn test_thread_locks_prune_idle_entries() {
        let locks = ThreadLocks::new();
        let a = ThreadKey::for_user("a").unwrap();
        let b = ThreadKey::for_user("b").unwrap();

        let guard = locks.acquire(&a).await;
        drop(guard);
        let _b = locks.acquire(&b).await;
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn test_thread_locks_serialise_same_key() {
        let locks = Arc::new(ThreadLocks::new());
        let key = ThreadKey::for_user("a").unwrap();

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_turn_diagnostics() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orchestrator = TurnOrchestrator::new(store, Arc::new(Echo));

        let outcome = orchestrator.chat("9", "hello").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.reply, "echo: hello");
        let d = outcome.diagnostics;
        assert_eq!(d.thread_key, "user_9");
        assert_eq!(d.history_length, 0);
        assert_eq!(d.message_count, 1);
        assert_eq!(d.forwarded_count, 1);
        assert_eq!(d.trim_tier, TrimTier::None);
        assert_eq!(d.checkpoint_version, Some(1));
        assert!(d.persisted);
        assert_eq!(d.phase, TurnPhase::Done);
        assert!(d.error.is_none());
    }

    #[tokio::test]
    async fn test_reasoning_timeout_becomes_error_reply() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orchestrator = TurnOrchestrator::new(store.clone(), Arc::new(Slow))
            .with_reasoning_timeout(Duration::from_millis(20));

        let outcome = orchestrator.chat("9", "hello").await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.reply.starts_with(ERROR_REPLY_PREFIX));
        assert_eq!(outcome.diagnostics.phase, TurnPhase::Failed);
        assert_eq!(outcome.diagnostics.checkpoint_version, Some(1));

        let key = ThreadKey::for_user("9").unwrap();
        let latest = store.get_latest(&key).await.unwrap().into_option().unwrap();
        assert_eq!(latest.state.messages.len(), 2);
        assert_eq!(latest.state.messages[1].content, outcome.reply);
    }
}
