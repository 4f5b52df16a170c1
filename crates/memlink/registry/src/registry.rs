use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use memlink_types::{MemoryId, MessageId};
use tracing::debug;

use crate::error::RegistryError;
use crate::memory_store::MemoryStore;

#[derive(Default)]
struct LinkTable {
    by_message: HashMap<MessageId, MemoryId>,
    by_memory: HashMap<MemoryId, MessageId>,
}

impl LinkTable {
    fn check_free(&self, message_id: &MessageId, memory_id: &MemoryId) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_message.get(message_id) {
            return Err(RegistryError::AlreadyLinked {
                message_id: message_id.clone(),
                memory_id: existing.clone(),
            });
        }
        if let Some(holder) = self.by_memory.get(memory_id) {
            return Err(RegistryError::MemoryInUse {
                memory_id: memory_id.clone(),
                message_id: holder.clone(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, message_id: MessageId, memory_id: MemoryId) {
        self.by_memory.insert(memory_id.clone(), message_id.clone());
        self.by_message.insert(message_id, memory_id);
    }
}

/// Registry of active message → memory links.
///
/// `link` and `unlink` on the same message are linearizable: the
/// availability check and the insertion happen under one write lock. The
/// memory store lookup runs outside the lock, so the check is repeated
/// before inserting.
pub struct MemoryLinkRegistry {
    memory_store: Arc<dyn MemoryStore>,
    links: RwLock<LinkTable>,
}

impl MemoryLinkRegistry {
    pub fn new(memory_store: Arc<dyn MemoryStore>) -> Self {
        Self {
            memory_store,
            links: RwLock::new(LinkTable::default()),
        }
    }

    /// Link a message to a memory.
    ///
    /// Fails with `AlreadyLinked` if the message holds any link (even to the
    /// same memory), `MemoryInUse` if another message holds the memory and
    /// `MemoryNotFound` if the memory store does not know the memory.
    pub async fn link(
        &self,
        message_id: &MessageId,
        memory_id: &MemoryId,
    ) -> Result<(), RegistryError> {
        self.read()?.check_free(message_id, memory_id)?;

        if !self.memory_store.exists(memory_id).await? {
            debug!(message_id = %message_id, memory_id = %memory_id, "Memory not found");
            return Err(RegistryError::MemoryNotFound(memory_id.clone()));
        }

        let mut table = self.write()?;
        table.check_free(message_id, memory_id)?;
        table.insert(message_id.clone(), memory_id.clone());

        debug!(message_id = %message_id, memory_id = %memory_id, "Linked message to memory");
        Ok(())
    }

    /// Record an association that already exists in stored data (bulk
    /// import). Skips the memory store lookup; the data predates this
    /// process and the memory may since have been deleted.
    pub fn restore(&self, message_id: &MessageId, memory_id: &MemoryId) -> Result<(), RegistryError> {
        let mut table = self.write()?;
        table.check_free(message_id, memory_id)?;
        table.insert(message_id.clone(), memory_id.clone());
        Ok(())
    }

    /// Remove the link of a message, returning the released memory id.
    pub fn unlink(&self, message_id: &MessageId) -> Result<MemoryId, RegistryError> {
        let mut table = self.write()?;
        let memory_id = table
            .by_message
            .remove(message_id)
            .ok_or_else(|| RegistryError::NotLinked(message_id.clone()))?;
        table.by_memory.remove(&memory_id);

        debug!(message_id = %message_id, memory_id = %memory_id, "Unlinked message");
        Ok(memory_id)
    }

    pub fn memory_for(&self, message_id: &MessageId) -> Result<Option<MemoryId>, RegistryError> {
        Ok(self.read()?.by_message.get(message_id).cloned())
    }

    pub fn message_for(&self, memory_id: &MemoryId) -> Result<Option<MessageId>, RegistryError> {
        Ok(self.read()?.by_memory.get(memory_id).cloned())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.read()?.by_message.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LinkTable>, RegistryError> {
        self.links.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LinkTable>, RegistryError> {
        self.links.write().map_err(|_| RegistryError::LockPoisoned)
    }
}
