use memlink_types::{LedgerUrl, MemoryId, MessageId};
use serde::Serialize;

/// Link lifecycle notifications broadcast by the linker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// `Unlinked → Pending`.
    Requested {
        message_id: MessageId,
        memory_id: MemoryId,
        attempt: u64,
    },
    /// `Pending → Confirmed`.
    Confirmed {
        message_id: MessageId,
        memory_id: MemoryId,
        entity_url: LedgerUrl,
        transaction_url: LedgerUrl,
    },
    /// Deadline passed; `Pending → Unlinked`.
    TimedOut {
        message_id: MessageId,
        memory_id: MemoryId,
    },
    /// Explicitly abandoned; `Pending → Unlinked`.
    Unlinked {
        message_id: MessageId,
        memory_id: MemoryId,
    },
    /// A confirmation that matched no in-flight link. No state changed.
    StaleConfirmation { memory_id: MemoryId },
}

impl LinkEvent {
    /// The message the event concerns, if any.
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Requested { message_id, .. }
            | Self::Confirmed { message_id, .. }
            | Self::TimedOut { message_id, .. }
            | Self::Unlinked { message_id, .. } => Some(message_id),
            Self::StaleConfirmation { .. } => None,
        }
    }

    pub fn memory_id(&self) -> &MemoryId {
        match self {
            Self::Requested { memory_id, .. }
            | Self::Confirmed { memory_id, .. }
            | Self::TimedOut { memory_id, .. }
            | Self::Unlinked { memory_id, .. }
            | Self::StaleConfirmation { memory_id } => memory_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = LinkEvent::TimedOut {
            message_id: MessageId::from("m1"),
            memory_id: MemoryId::from("mem1"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "timed_out");
        assert_eq!(json["message_id"], "m1");
    }

    #[test]
    fn stale_confirmation_has_no_message() {
        let event = LinkEvent::StaleConfirmation {
            memory_id: MemoryId::from("mem9"),
        };
        assert!(event.message_id().is_none());
        assert_eq!(event.memory_id().as_str(), "mem9");
    }
}
