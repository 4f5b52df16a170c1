use memlink_types::{ChatMessage, PersistedMessage, ProvenanceState};
use serde::{Deserialize, Serialize};

/// Read access to the provenance URLs of a record, whatever its shape.
pub trait ProvenanceFields {
    fn entity_url(&self) -> Option<&str>;
    fn transaction_url(&self) -> Option<&str>;
    fn legacy_explorer_url(&self) -> Option<&str>;
}

impl ProvenanceFields for ChatMessage {
    fn entity_url(&self) -> Option<&str> {
        match self.provenance() {
            ProvenanceState::Confirmed { entity_url, .. } => Some(entity_url.as_str()),
            _ => None,
        }
    }

    fn transaction_url(&self) -> Option<&str> {
        match self.provenance() {
            ProvenanceState::Confirmed {
                transaction_url, ..
            } => Some(transaction_url.as_str()),
            _ => None,
        }
    }

    fn legacy_explorer_url(&self) -> Option<&str> {
        match self.provenance() {
            ProvenanceState::LegacyConfirmed {
                legacy_explorer_url,
                ..
            } => Some(legacy_explorer_url.as_str()),
            _ => None,
        }
    }
}

/// Raw records surface provenance only in the combinations the typed model
/// accepts: a memory id must be present and the entity/transaction pair must
/// be complete or absent. Anything else shows nothing.
impl ProvenanceFields for PersistedMessage {
    fn entity_url(&self) -> Option<&str> {
        wire_fields_valid(self)
            .then(|| self.entity_url.as_deref())
            .flatten()
    }

    fn transaction_url(&self) -> Option<&str> {
        wire_fields_valid(self)
            .then(|| self.transaction_url.as_deref())
            .flatten()
    }

    fn legacy_explorer_url(&self) -> Option<&str> {
        wire_fields_valid(self)
            .then(|| self.legacy_explorer_url.as_deref())
            .flatten()
    }
}

fn wire_fields_valid(record: &PersistedMessage) -> bool {
    record.memory_id.as_deref().is_some_and(|m| !m.is_empty())
        && record.entity_url.is_some() == record.transaction_url.is_some()
}

/// The provenance reference to show for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DisplayProvenance {
    /// Current ledger references.
    Ledger {
        entity_url: String,
        transaction_url: String,
    },
    /// Deprecated explorer link from the previous schema.
    Legacy { explorer_url: String },
    None,
}

impl DisplayProvenance {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Pick the authoritative provenance reference for display.
///
/// `entityUrl` (with `transactionUrl`) wins; the legacy URL is shown only
/// when no entity URL exists.
pub fn resolve<T: ProvenanceFields + ?Sized>(record: &T) -> DisplayProvenance {
    if let (Some(entity_url), Some(transaction_url)) =
        (record.entity_url(), record.transaction_url())
    {
        return DisplayProvenance::Ledger {
            entity_url: entity_url.to_string(),
            transaction_url: transaction_url.to_string(),
        };
    }
    match record.legacy_explorer_url() {
        Some(url) => DisplayProvenance::Legacy {
            explorer_url: url.to_string(),
        },
        None => DisplayProvenance::None,
    }
}
