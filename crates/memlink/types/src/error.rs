use thiserror::Error;

/// Errors raised while validating identifiers, URLs or persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("field `{field}` contains whitespace or control characters: {value:?}")]
    IllegalCharacter { field: &'static str, value: String },

    #[error("message {message_id} carries provenance fields without a memory id")]
    ProvenanceWithoutMemory { message_id: String },

    #[error("message {message_id} carries only one of entityUrl/transactionUrl")]
    PartialProvenance { message_id: String },

    #[error("unknown role: {0}")]
    UnknownRole(String),
}
