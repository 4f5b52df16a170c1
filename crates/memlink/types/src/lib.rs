//! Core types for the message–memory provenance linker.
//!
//! A chat message may be linked to at most one memory record held by an
//! external memory store, and that link may carry ledger provenance once the
//! ledger write is confirmed. This crate defines:
//!
//! - identifiers ([`MessageId`], [`MemoryId`], [`ConversationId`])
//! - [`ChatMessage`], whose optional provenance fields are collapsed into the
//!   closed [`ProvenanceState`] sum type
//! - [`PersistedMessage`], the wire/storage shape with independently optional
//!   fields, and its validating conversion into [`ChatMessage`]

#![deny(unsafe_code)]

mod error;
mod ids;
mod message;
mod provenance;
mod wire;

pub use error::ValidationError;
pub use ids::{ConversationId, MemoryId, MessageId};
pub use message::{ChatMessage, MessageDraft, Role};
pub use provenance::{LedgerUrl, ProvenanceKind, ProvenanceState};
pub use wire::PersistedMessage;
