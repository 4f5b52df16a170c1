//! Transition functions. Each takes the current state by reference and
//! returns the next state, leaving the caller to store it.

use memlink_types::{LedgerUrl, MemoryId, ProvenanceState};

use crate::error::{Transition, TransitionError};

/// A record created through a live code path must start `Unlinked`.
pub fn admit(current: &ProvenanceState) -> Result<(), TransitionError> {
    match current {
        ProvenanceState::Unlinked => Ok(()),
        other => Err(TransitionError {
            from: other.kind(),
            attempted: Transition::Create,
        }),
    }
}

/// `Unlinked → Pending`.
pub fn request_link(
    current: &ProvenanceState,
    memory_id: MemoryId,
) -> Result<ProvenanceState, TransitionError> {
    match current {
        ProvenanceState::Unlinked => Ok(ProvenanceState::Pending { memory_id }),
        other => Err(TransitionError {
            from: other.kind(),
            attempted: Transition::RequestLink,
        }),
    }
}

/// `Pending → Confirmed`. Requires both ledger URLs.
pub fn confirm(
    current: &ProvenanceState,
    entity_url: LedgerUrl,
    transaction_url: LedgerUrl,
) -> Result<ProvenanceState, TransitionError> {
    match current {
        ProvenanceState::Pending { memory_id } => Ok(ProvenanceState::Confirmed {
            memory_id: memory_id.clone(),
            entity_url,
            transaction_url,
        }),
        other => Err(TransitionError {
            from: other.kind(),
            attempted: Transition::Confirm,
        }),
    }
}

/// `Pending → Unlinked`, returning the memory id that was released.
pub fn abandon(current: &ProvenanceState) -> Result<(ProvenanceState, MemoryId), TransitionError> {
    match current {
        ProvenanceState::Pending { memory_id } => {
            Ok((ProvenanceState::Unlinked, memory_id.clone()))
        }
        other => Err(TransitionError {
            from: other.kind(),
            attempted: Transition::Abandon,
        }),
    }
}
