use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{MemoryId, MessageId};
use crate::provenance::{ProvenanceKind, ProvenanceState};

/// Author of a message. Always supplied at creation, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// What a conversation handler supplies when a role turn completes.
/// The identifier is assigned afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageDraft {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Override the creation instant.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Bind the draft to its assigned identifier. The result is `Unlinked`.
    pub fn into_message(self, id: MessageId) -> ChatMessage {
        ChatMessage {
            id,
            content: self.content,
            role: self.role,
            timestamp: self.timestamp,
            provenance: ProvenanceState::Unlinked,
        }
    }
}

/// A chat message record.
///
/// Identity, content, role and timestamp are fixed at construction. Only the
/// provenance state moves, and only along the transitions enforced by the
/// provenance resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: MessageId,
    content: String,
    role: Role,
    timestamp: DateTime<Utc>,
    provenance: ProvenanceState,
}

impl ChatMessage {
    pub(crate) fn from_parts(
        id: MessageId,
        content: String,
        role: Role,
        timestamp: DateTime<Utc>,
        provenance: ProvenanceState,
    ) -> Self {
        Self {
            id,
            content,
            role,
            timestamp,
            provenance,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn provenance(&self) -> &ProvenanceState {
        &self.provenance
    }

    pub fn state(&self) -> ProvenanceKind {
        self.provenance.kind()
    }

    pub fn memory_id(&self) -> Option<&MemoryId> {
        self.provenance.memory_id()
    }

    /// Move the provenance state through `step`, which maps the current
    /// state to the next one or rejects it. On success the previous state is
    /// returned; on rejection the record is left untouched.
    pub fn transition<E, F>(&mut self, step: F) -> Result<ProvenanceState, E>
    where
        F: FnOnce(&ProvenanceState) -> Result<ProvenanceState, E>,
    {
        let next = step(&self.provenance)?;
        Ok(std::mem::replace(&mut self.provenance, next))
    }
}
