use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use memlink_types::{LedgerUrl, MemoryId, MessageId};
use tracing::debug;

use crate::event::LedgerConfirmation;

/// One in-flight link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttempt {
    /// Monotonic per-tracker attempt number.
    pub attempt: u64,
    pub message_id: MessageId,
    pub memory_id: MemoryId,
    pub requested_at: Instant,
    /// `None` when the configured timeout does not fit in an `Instant`.
    pub deadline: Option<Instant>,
}

/// Result of feeding a confirmation into the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absorbed {
    /// Both URLs are now known; the attempt has left the tracker.
    Complete {
        attempt: LinkAttempt,
        entity_url: LedgerUrl,
        transaction_url: LedgerUrl,
    },
    /// Only one half is known so far. Not surfaced as a state change.
    Partial { attempt: LinkAttempt },
    /// No in-flight link for this memory (abandoned, timed out or unknown).
    Stale { memory_id: MemoryId },
}

#[derive(Debug)]
struct InFlight {
    attempt: LinkAttempt,
    entity_url: Option<LedgerUrl>,
    transaction_url: Option<LedgerUrl>,
}

/// Index of pending links keyed by memory id, with deadline ordering.
///
/// Not synchronized; the owner wraps it in a lock.
#[derive(Debug, Default)]
pub struct PendingTracker {
    by_memory: HashMap<MemoryId, InFlight>,
    by_message: HashMap<MessageId, MemoryId>,
    deadlines: BTreeMap<(Instant, u64), MemoryId>,
    next_attempt: u64,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a link. Any leftover entry for the same message or
    /// memory is dropped first.
    pub fn track(
        &mut self,
        message_id: MessageId,
        memory_id: MemoryId,
        now: Instant,
        timeout: Duration,
    ) -> LinkAttempt {
        self.cancel(&message_id);
        self.remove(&memory_id);

        self.next_attempt += 1;
        let attempt = LinkAttempt {
            attempt: self.next_attempt,
            message_id: message_id.clone(),
            memory_id: memory_id.clone(),
            requested_at: now,
            deadline: now.checked_add(timeout),
        };

        if let Some(deadline) = attempt.deadline {
            self.deadlines
                .insert((deadline, attempt.attempt), memory_id.clone());
        }
        self.by_message.insert(message_id, memory_id.clone());
        self.by_memory.insert(
            memory_id,
            InFlight {
                attempt: attempt.clone(),
                entity_url: None,
                transaction_url: None,
            },
        );

        debug!(
            message_id = %attempt.message_id,
            memory_id = %attempt.memory_id,
            attempt = attempt.attempt,
            "Tracking pending link"
        );
        attempt
    }

    /// Merge a confirmation into the matching in-flight link.
    pub fn absorb(&mut self, event: LedgerConfirmation) -> Absorbed {
        let Some(entry) = self.by_memory.get_mut(&event.memory_id) else {
            return Absorbed::Stale {
                memory_id: event.memory_id,
            };
        };

        if let Some(entity_url) = event.entity_url {
            entry.entity_url = Some(entity_url);
        }
        if let Some(transaction_url) = event.transaction_url {
            entry.transaction_url = Some(transaction_url);
        }

        if entry.entity_url.is_none() || entry.transaction_url.is_none() {
            return Absorbed::Partial {
                attempt: entry.attempt.clone(),
            };
        }

        match self.remove(&event.memory_id) {
            Some(InFlight {
                attempt,
                entity_url: Some(entity_url),
                transaction_url: Some(transaction_url),
            }) => Absorbed::Complete {
                attempt,
                entity_url,
                transaction_url,
            },
            // Both halves were checked above under the same &mut borrow.
            _ => Absorbed::Stale {
                memory_id: event.memory_id,
            },
        }
    }

    /// Put a completed attempt back after its confirmation could not be
    /// applied. The original deadline and attempt number are kept and both
    /// halves must arrive again. Returns `false` if the message or memory is
    /// already tracked by another attempt.
    pub fn reinstate(&mut self, attempt: LinkAttempt) -> bool {
        if self.by_message.contains_key(&attempt.message_id)
            || self.by_memory.contains_key(&attempt.memory_id)
        {
            return false;
        }

        if let Some(deadline) = attempt.deadline {
            self.deadlines
                .insert((deadline, attempt.attempt), attempt.memory_id.clone());
        }
        self.by_message
            .insert(attempt.message_id.clone(), attempt.memory_id.clone());
        debug!(
            message_id = %attempt.message_id,
            memory_id = %attempt.memory_id,
            attempt = attempt.attempt,
            "Reinstated pending link"
        );
        self.by_memory.insert(
            attempt.memory_id.clone(),
            InFlight {
                attempt,
                entity_url: None,
                transaction_url: None,
            },
        );
        true
    }

    /// Stop tracking the link of a message, e.g. on explicit unlink.
    pub fn cancel(&mut self, message_id: &MessageId) -> Option<LinkAttempt> {
        let memory_id = self.by_message.get(message_id)?.clone();
        self.remove(&memory_id).map(|entry| entry.attempt)
    }

    /// Remove and return every link whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<LinkAttempt> {
        let due: Vec<MemoryId> = self
            .deadlines
            .range(..=(now, u64::MAX))
            .map(|(_, memory_id)| memory_id.clone())
            .collect();

        due.iter()
            .filter_map(|memory_id| self.remove(memory_id))
            .map(|entry| entry.attempt)
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn message_for(&self, memory_id: &MemoryId) -> Option<&MessageId> {
        self.by_memory
            .get(memory_id)
            .map(|entry| &entry.attempt.message_id)
    }

    pub fn attempt_for(&self, message_id: &MessageId) -> Option<&LinkAttempt> {
        let memory_id = self.by_message.get(message_id)?;
        self.by_memory.get(memory_id).map(|entry| &entry.attempt)
    }

    pub fn len(&self) -> usize {
        self.by_memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_memory.is_empty()
    }

    fn remove(&mut self, memory_id: &MemoryId) -> Option<InFlight> {
        let entry = self.by_memory.remove(memory_id)?;
        self.by_message.remove(&entry.attempt.message_id);
        if let Some(deadline) = entry.attempt.deadline {
            self.deadlines.remove(&(deadline, entry.attempt.attempt));
        }
        Some(entry)
    }
}
