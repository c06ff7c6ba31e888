//! Single-slot persistence for the active generation job.
//!
//! One job record occupies one logical slot; saving overwrites, loading
//! returns the slot's contents, clearing empties it. The orchestrator
//! persists every non-terminal transition before the next network call,
//! so a crash mid-flight is recoverable on restart: a loaded non-terminal
//! job resumes polling instead of requiring a fresh submission.

pub mod file;
pub mod memory;
pub mod record;

use async_trait::async_trait;

pub use file::FileJobStore;
pub use memory::MemoryJobStore;
pub use record::PersistedJob;

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Single-slot job persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist the record, replacing any previous occupant of the slot.
    async fn save(&self, record: &PersistedJob) -> Result<(), StoreError>;

    /// Load the slot's contents, `None` when empty.
    async fn load(&self) -> Result<Option<PersistedJob>, StoreError>;

    /// Empty the slot. Clearing an already-empty slot is not an error.
    async fn clear(&self) -> Result<(), StoreError>;
}
