//! Conversation memory and context budgeting.
//!
//! Threads are persisted as an append-only log of checkpoints. Each turn the
//! latest checkpoint is loaded, sized with the token estimator, trimmed to a
//! tiered budget and condensed into a digest for the reasoning step.

pub mod checkpoint;
pub mod digest;
pub mod fallback;
pub mod sql;
pub mod summary;
pub mod tokens;
pub mod trimmer;
pub mod volatile;

pub use checkpoint::{
    Checkpoint, CheckpointLookup, CheckpointMeta, CheckpointStore, StoreBackend, ThreadState,
};
pub use digest::{Digest, DigestBuilder};
pub use fallback::{open_checkpoint_store, FallbackCheckpointStore};
pub use sql::SqlCheckpointStore;
pub use summary::RollingSummarizer;
pub use trimmer::{select_suffix, ContextTrimmer, Selection, TrimOutcome, TrimTier};
pub use volatile::InMemoryCheckpointStore;
