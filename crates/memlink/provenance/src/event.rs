use memlink_types::{LedgerUrl, MemoryId};
use serde::{Deserialize, Serialize};

/// Asynchronous confirmation emitted by the ledger client.
///
/// Either URL may be missing when the client reports the entity and the
/// transaction separately; partial events are accumulated per memory until
/// both halves are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfirmation {
    pub memory_id: MemoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_url: Option<LedgerUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_url: Option<LedgerUrl>,
}

impl LedgerConfirmation {
    pub fn complete(memory_id: MemoryId, entity_url: LedgerUrl, transaction_url: LedgerUrl) -> Self {
        Self {
            memory_id,
            entity_url: Some(entity_url),
            transaction_url: Some(transaction_url),
        }
    }

    pub fn entity_only(memory_id: MemoryId, entity_url: LedgerUrl) -> Self {
        Self {
            memory_id,
            entity_url: Some(entity_url),
            transaction_url: None,
        }
    }

    pub fn transaction_only(memory_id: MemoryId, transaction_url: LedgerUrl) -> Self {
        Self {
            memory_id,
            entity_url: None,
            transaction_url: Some(transaction_url),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.entity_url.is_some() && self.transaction_url.is_some()
    }
}
