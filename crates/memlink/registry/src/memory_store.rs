use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use memlink_types::MemoryId;

use crate::error::MemoryStoreError;

/// External store that owns memory records.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Whether the memory currently exists.
    async fn exists(&self, memory_id: &MemoryId) -> Result<bool, MemoryStoreError>;
}

/// In-memory memory store for tests and local runs.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    memories: RwLock<HashSet<MemoryId>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memories<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = MemoryId>,
    {
        Self {
            memories: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub fn insert(&self, memory_id: MemoryId) -> Result<(), MemoryStoreError> {
        self.memories
            .write()
            .map_err(|_| MemoryStoreError::Unavailable("memory lock poisoned".to_string()))?
            .insert(memory_id);
        Ok(())
    }

    pub fn remove(&self, memory_id: &MemoryId) -> Result<bool, MemoryStoreError> {
        Ok(self
            .memories
            .write()
            .map_err(|_| MemoryStoreError::Unavailable("memory lock poisoned".to_string()))?
            .remove(memory_id))
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn exists(&self, memory_id: &MemoryId) -> Result<bool, MemoryStoreError> {
        let guard = self
            .memories
            .read()
            .map_err(|_| MemoryStoreError::Unavailable("memory lock poisoned".to_string()))?;
        Ok(guard.contains(memory_id))
    }
}
