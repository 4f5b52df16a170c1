use memlink_types::{MemoryId, MessageId};
use thiserror::Error;

/// Failure reported by the memory store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("memory store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from link registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("message {message_id} is already linked to memory {memory_id}")]
    AlreadyLinked {
        message_id: MessageId,
        memory_id: MemoryId,
    },

    #[error("message {0} is not linked")]
    NotLinked(MessageId),

    #[error("memory {0} does not exist in the memory store")]
    MemoryNotFound(MemoryId),

    #[error("memory {memory_id} is already linked to message {message_id}")]
    MemoryInUse {
        memory_id: MemoryId,
        message_id: MessageId,
    },

    #[error(transparent)]
    MemoryStore(#[from] MemoryStoreError),

    #[error("link table lock poisoned")]
    LockPoisoned,
}
