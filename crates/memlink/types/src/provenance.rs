use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::MemoryId;

/// A ledger reference URL (entity, transaction or legacy explorer link).
///
/// Non-empty and free of whitespace; otherwise opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerUrl(String);

impl LedgerUrl {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyField("ledger url"));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::IllegalCharacter {
                field: "ledger url",
                value,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LedgerUrl {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<LedgerUrl> for String {
    fn from(value: LedgerUrl) -> Self {
        value.0
    }
}

impl std::fmt::Display for LedgerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provenance of a message's memory link.
///
/// Replaces the four independently optional fields of the persisted shape,
/// so combinations such as "entity URL without memory id" cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProvenanceState {
    /// No memory linked.
    Unlinked,
    /// Memory linked, ledger write in flight.
    Pending { memory_id: MemoryId },
    /// Ledger write confirmed. Terminal.
    Confirmed {
        memory_id: MemoryId,
        entity_url: LedgerUrl,
        transaction_url: LedgerUrl,
    },
    /// Imported from the explorer-URL schema. Terminal, read-only.
    LegacyConfirmed {
        memory_id: MemoryId,
        legacy_explorer_url: LedgerUrl,
    },
}

impl ProvenanceState {
    pub fn kind(&self) -> ProvenanceKind {
        match self {
            Self::Unlinked => ProvenanceKind::Unlinked,
            Self::Pending { .. } => ProvenanceKind::Pending,
            Self::Confirmed { .. } => ProvenanceKind::Confirmed,
            Self::LegacyConfirmed { .. } => ProvenanceKind::LegacyConfirmed,
        }
    }

    pub fn memory_id(&self) -> Option<&MemoryId> {
        match self {
            Self::Unlinked => None,
            Self::Pending { memory_id }
            | Self::Confirmed { memory_id, .. }
            | Self::LegacyConfirmed { memory_id, .. } => Some(memory_id),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::LegacyConfirmed { .. })
    }
}

impl Default for ProvenanceState {
    fn default() -> Self {
        Self::Unlinked
    }
}

/// Fieldless discriminant of [`ProvenanceState`], for errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    Unlinked,
    Pending,
    Confirmed,
    LegacyConfirmed,
}

impl std::fmt::Display for ProvenanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlinked => write!(f, "Unlinked"),
            Self::Pending => write!(f, "Pending"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::LegacyConfirmed => write!(f, "LegacyConfirmed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_url_rejects_empty_and_whitespace() {
        assert_eq!(
            LedgerUrl::parse(""),
            Err(ValidationError::EmptyField("ledger url"))
        );
        assert!(matches!(
            LedgerUrl::parse("e://1 2"),
            Err(ValidationError::IllegalCharacter { .. })
        ));
        assert_eq!(LedgerUrl::parse("e://1").unwrap().as_str(), "e://1");
    }

    #[test]
    fn ledger_url_deserialization_validates() {
        let ok: LedgerUrl = serde_json::from_str("\"t://1\"").unwrap();
        assert_eq!(ok.as_str(), "t://1");
        assert!(serde_json::from_str::<LedgerUrl>("\"\"").is_err());
    }

    #[test]
    fn memory_id_exposed_for_linked_states() {
        assert!(ProvenanceState::Unlinked.memory_id().is_none());

        let pending = ProvenanceState::Pending {
            memory_id: MemoryId::from("mem1"),
        };
        assert_eq!(pending.memory_id(), Some(&MemoryId::from("mem1")));
        assert!(!pending.is_terminal());

        let legacy = ProvenanceState::LegacyConfirmed {
            memory_id: MemoryId::from("mem2"),
            legacy_explorer_url: LedgerUrl::parse("https://explorer/x").unwrap(),
        };
        assert_eq!(legacy.kind(), ProvenanceKind::LegacyConfirmed);
        assert!(legacy.is_terminal());
    }
}
