//! In-memory reference implementation of [`MessageStore`].
//!
//! Deterministic and test-friendly. All mutations of one call happen under a
//! single write lock, so a bulk import is atomic with respect to readers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memlink_provenance::{abandon, admit, confirm, request_link, TransitionError};
use memlink_types::{
    ChatMessage, ConversationId, LedgerUrl, MemoryId, MessageId, PersistedMessage,
    ProvenanceKind, ProvenanceState,
};
use tracing::{debug, info, warn};

use crate::model::{ImportRejection, ImportReport, RejectReason};
use crate::traits::{MessageStore, QueryWindow};
use crate::{StoreError, StoreResult};

/// Conversation index key. The sequence number keeps append order among
/// equal timestamps.
type OrderKey = (DateTime<Utc>, u64);

#[derive(Default)]
struct StoreState {
    records: HashMap<MessageId, ChatMessage>,
    conversations: HashMap<ConversationId, BTreeMap<OrderKey, MessageId>>,
    sequence: u64,
}

impl StoreState {
    fn insert(&mut self, conversation: &ConversationId, message: ChatMessage) -> StoreResult<MessageId> {
        let id = message.id().clone();
        if self.records.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        self.sequence += 1;
        self.conversations
            .entry(conversation.clone())
            .or_default()
            .insert((message.timestamp(), self.sequence), id.clone());
        self.records.insert(id.clone(), message);
        Ok(id)
    }

    /// Apply a provenance transition to one record.
    fn transition<F>(&mut self, id: &MessageId, step: F) -> StoreResult<ChatMessage>
    where
        F: FnOnce(&ProvenanceState) -> Result<ProvenanceState, TransitionError>,
    {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let prev = record
            .transition(step)
            .map_err(|source| StoreError::InvalidState {
                message_id: id.clone(),
                source,
            })?;

        debug!(
            message_id = %id,
            from = %prev.kind(),
            to = %record.state(),
            "Provenance transition"
        );
        Ok(record.clone())
    }

    fn ordered(&self, conversation: &ConversationId) -> impl Iterator<Item = &ChatMessage> {
        self.conversations
            .get(conversation)
            .into_iter()
            .flat_map(|index| index.values())
            .filter_map(|id| self.records.get(id))
    }
}

/// In-memory message store.
#[derive(Default)]
pub struct InMemoryMessageStore {
    state: RwLock<StoreState>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all conversations.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("message store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("message store lock poisoned".to_string()))
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(
        &self,
        conversation: &ConversationId,
        message: ChatMessage,
    ) -> StoreResult<MessageId> {
        admit(message.provenance()).map_err(|source| StoreError::InvalidState {
            message_id: message.id().clone(),
            source,
        })?;

        let id = self.write()?.insert(conversation, message)?;
        debug!(message_id = %id, conversation = %conversation, "Appended message");
        Ok(id)
    }

    async fn get(&self, id: &MessageId) -> StoreResult<ChatMessage> {
        self.read()?
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn mark_pending(&self, id: &MessageId, memory_id: MemoryId) -> StoreResult<ChatMessage> {
        self.write()?
            .transition(id, |state| request_link(state, memory_id))
    }

    async fn update_provenance(
        &self,
        id: &MessageId,
        entity_url: LedgerUrl,
        transaction_url: LedgerUrl,
    ) -> StoreResult<ChatMessage> {
        self.write()?
            .transition(id, |state| confirm(state, entity_url, transaction_url))
    }

    async fn revert_link(&self, id: &MessageId) -> StoreResult<MemoryId> {
        let mut released = None;
        self.write()?.transition(id, |state| {
            abandon(state).map(|(next, memory_id)| {
                released = Some(memory_id);
                next
            })
        })?;
        released.ok_or_else(|| {
            StoreError::Backend(format!("abandon of {id} released no memory id"))
        })
    }

    async fn list_conversation(
        &self,
        conversation: &ConversationId,
        window: QueryWindow,
    ) -> StoreResult<Vec<ChatMessage>> {
        let guard = self.read()?;
        let iter = guard.ordered(conversation).skip(window.offset).cloned();
        Ok(if window.limit == 0 {
            iter.collect()
        } else {
            iter.take(window.limit).collect()
        })
    }

    async fn import(
        &self,
        conversation: &ConversationId,
        records: Vec<PersistedMessage>,
    ) -> StoreResult<ImportReport> {
        let mut guard = self.write()?;
        let mut report = ImportReport::default();

        for record in records {
            let raw_id = record.id.clone();
            let shadowed = record.has_shadowed_legacy();

            let message = match ChatMessage::try_from(record) {
                Ok(message) => message,
                Err(error) => {
                    warn!(id = %raw_id, error = %error, "Rejected invalid record");
                    report.rejected.push(ImportRejection {
                        id: raw_id,
                        reason: error.into(),
                    });
                    continue;
                }
            };

            if message.state() == ProvenanceKind::Pending {
                warn!(id = %raw_id, "Rejected record with in-flight link");
                report.rejected.push(ImportRejection {
                    id: raw_id,
                    reason: RejectReason::InFlightLink,
                });
                continue;
            }

            match guard.insert(conversation, message) {
                Ok(id) => {
                    if shadowed {
                        warn!(message_id = %id, "Dropped legacy explorer URL shadowed by entityUrl");
                        report.shadowed_legacy.push(id.clone());
                    }
                    report.imported.push(id);
                }
                Err(StoreError::DuplicateId(_)) => {
                    report.rejected.push(ImportRejection {
                        id: raw_id,
                        reason: RejectReason::Duplicate,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            conversation = %conversation,
            imported = report.imported.len(),
            rejected = report.rejected.len(),
            "Bulk import finished"
        );
        Ok(report)
    }

    async fn export(&self, conversation: &ConversationId) -> StoreResult<Vec<PersistedMessage>> {
        Ok(self
            .read()?
            .ordered(conversation)
            .map(PersistedMessage::from)
            .collect())
    }
}
