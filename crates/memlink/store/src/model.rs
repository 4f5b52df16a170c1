use memlink_types::{MessageId, ValidationError};
use serde::Serialize;

/// Why a record was skipped during bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// The record failed shape validation.
    Invalid { error: String },
    /// A record with this id is already stored.
    Duplicate,
    /// The record names a memory without any ledger URL, i.e. a link that
    /// was still in flight when exported. Cannot be resumed.
    InFlightLink,
}

impl From<ValidationError> for RejectReason {
    fn from(error: ValidationError) -> Self {
        Self::Invalid {
            error: error.to_string(),
        }
    }
}

/// One skipped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRejection {
    /// Raw id as found in the input.
    pub id: String,
    pub reason: RejectReason,
}

/// Outcome of a bulk import. Every input record appears exactly once,
/// either in `imported` or in `rejected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: Vec<MessageId>,
    pub rejected: Vec<ImportRejection>,
    /// Imported records whose legacy URL was dropped because `entityUrl` won.
    pub shadowed_legacy: Vec<MessageId>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.imported.len() + self.rejected.len()
    }
}
