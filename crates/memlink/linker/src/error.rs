use memlink_identity::IdentityError;
use memlink_registry::RegistryError;
use memlink_store::StoreError;
use memlink_types::{MemoryId, MessageId};
use thiserror::Error;

/// Result type for linker operations.
pub type LinkerResult<T> = Result<T, LinkerError>;

/// Errors surfaced by the linker service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkerError {
    /// Id assignment failed. Exhaustion is the only fatal condition.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The link stayed pending past its deadline and has been reverted.
    #[error("link of message {message_id} to memory {memory_id} timed out")]
    LinkTimeout {
        message_id: MessageId,
        memory_id: MemoryId,
    },

    #[error("linker channel closed")]
    ChannelClosed,
}
