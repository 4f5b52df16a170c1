use async_trait::async_trait;
use memlink_types::{
    ChatMessage, ConversationId, LedgerUrl, MemoryId, MessageId, PersistedMessage,
};

use crate::model::ImportReport;
use crate::StoreResult;

/// Window for paged reads. `limit == 0` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(offset: usize, limit: usize) -> Self {
        Self { limit, offset }
    }
}

/// Storage interface for chat message records.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a freshly created message. It must be `Unlinked`: live code
    /// paths never write provenance fields directly.
    async fn append(
        &self,
        conversation: &ConversationId,
        message: ChatMessage,
    ) -> StoreResult<MessageId>;

    /// Get one message by id.
    async fn get(&self, id: &MessageId) -> StoreResult<ChatMessage>;

    /// `Unlinked → Pending`.
    async fn mark_pending(&self, id: &MessageId, memory_id: MemoryId) -> StoreResult<ChatMessage>;

    /// `Pending → Confirmed` provenance backfill.
    async fn update_provenance(
        &self,
        id: &MessageId,
        entity_url: LedgerUrl,
        transaction_url: LedgerUrl,
    ) -> StoreResult<ChatMessage>;

    /// `Pending → Unlinked`, returning the released memory id.
    async fn revert_link(&self, id: &MessageId) -> StoreResult<MemoryId>;

    /// Messages of one conversation in non-decreasing timestamp order.
    async fn list_conversation(
        &self,
        conversation: &ConversationId,
        window: QueryWindow,
    ) -> StoreResult<Vec<ChatMessage>>;

    /// Bulk-import historical records into a conversation.
    async fn import(
        &self,
        conversation: &ConversationId,
        records: Vec<PersistedMessage>,
    ) -> StoreResult<ImportReport>;

    /// Export a conversation in the persisted wire shape, timestamp-ordered.
    async fn export(&self, conversation: &ConversationId) -> StoreResult<Vec<PersistedMessage>>;
}
