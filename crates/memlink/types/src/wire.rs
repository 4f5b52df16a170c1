use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{MemoryId, MessageId};
use crate::message::{ChatMessage, Role};
use crate::provenance::{LedgerUrl, ProvenanceState};

/// Storage/wire shape of a chat message.
///
/// Field names are camelCase. `legacyExplorerUrl` is read-only compatibility
/// data and is also accepted under its older `golemExplorerUrl` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "golemExplorerUrl"
    )]
    pub legacy_explorer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_url: Option<String>,
}

impl PersistedMessage {
    /// True when a legacy URL is present but ignored because `entityUrl` wins.
    pub fn has_shadowed_legacy(&self) -> bool {
        self.legacy_explorer_url.is_some() && self.entity_url.is_some()
    }
}

impl TryFrom<PersistedMessage> for ChatMessage {
    type Error = ValidationError;

    fn try_from(record: PersistedMessage) -> Result<Self, Self::Error> {
        let id = MessageId::parse(record.id)?;

        let memory_id = match record.memory_id {
            Some(ref m) if m.is_empty() => return Err(ValidationError::EmptyField("memoryId")),
            Some(m) => Some(MemoryId(m)),
            None => None,
        };

        let entity_url = record.entity_url.map(LedgerUrl::parse).transpose()?;
        let transaction_url = record.transaction_url.map(LedgerUrl::parse).transpose()?;
        let legacy_url = record
            .legacy_explorer_url
            .map(LedgerUrl::parse)
            .transpose()?;

        let provenance = match (memory_id, entity_url, transaction_url, legacy_url) {
            (None, None, None, None) => ProvenanceState::Unlinked,
            (None, _, _, _) => {
                return Err(ValidationError::ProvenanceWithoutMemory {
                    message_id: id.to_string(),
                })
            }
            (Some(memory_id), Some(entity_url), Some(transaction_url), _) => {
                ProvenanceState::Confirmed {
                    memory_id,
                    entity_url,
                    transaction_url,
                }
            }
            (Some(_), Some(_), None, _) | (Some(_), None, Some(_), _) => {
                return Err(ValidationError::PartialProvenance {
                    message_id: id.to_string(),
                })
            }
            (Some(memory_id), None, None, Some(legacy_explorer_url)) => {
                ProvenanceState::LegacyConfirmed {
                    memory_id,
                    legacy_explorer_url,
                }
            }
            (Some(memory_id), None, None, None) => ProvenanceState::Pending { memory_id },
        };

        Ok(ChatMessage::from_parts(
            id,
            record.content,
            record.role,
            record.timestamp,
            provenance,
        ))
    }
}

impl From<&ChatMessage> for PersistedMessage {
    fn from(message: &ChatMessage) -> Self {
        let mut record = PersistedMessage {
            id: message.id().to_string(),
            content: message.content().to_string(),
            role: message.role(),
            timestamp: message.timestamp(),
            memory_id: message.memory_id().map(|m| m.to_string()),
            legacy_explorer_url: None,
            entity_url: None,
            transaction_url: None,
        };
        match message.provenance() {
            ProvenanceState::Unlinked | ProvenanceState::Pending { .. } => {}
            ProvenanceState::Confirmed {
                entity_url,
                transaction_url,
                ..
            } => {
                record.entity_url = Some(entity_url.to_string());
                record.transaction_url = Some(transaction_url.to_string());
            }
            ProvenanceState::LegacyConfirmed {
                legacy_explorer_url,
                ..
            } => {
                record.legacy_explorer_url = Some(legacy_explorer_url.to_string());
            }
        }
        record
    }
}
