use memlink_provenance::TransitionError;
use memlink_types::MessageId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message not found: {0}")]
    NotFound(MessageId),

    #[error("message {0} already exists")]
    DuplicateId(MessageId),

    #[error("invalid state for message {message_id}: {source}")]
    InvalidState {
        message_id: MessageId,
        #[source]
        source: TransitionError,
    },

    #[error("backend error: {0}")]
    Backend(String),
}
