//! In-memory single-slot store for tests and embedders that manage
//! their own persistence.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::record::PersistedJob;
use crate::{JobStore, StoreError};

/// Single-slot store held in memory.
#[derive(Default)]
pub struct MemoryJobStore {
    slot: Mutex<Option<PersistedJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, record: &PersistedJob) -> Result<(), StoreError> {
        *self.slot.lock().await = Some(record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedJob>, StoreError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}
