use memlink_types::ProvenanceKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A requested provenance transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Entering the store through a live code path.
    Create,
    RequestLink,
    Confirm,
    Abandon,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::RequestLink => write!(f, "request_link"),
            Self::Confirm => write!(f, "confirm"),
            Self::Abandon => write!(f, "abandon"),
        }
    }
}

/// Rejected state machine transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {attempted} from state {from}")]
pub struct TransitionError {
    pub from: ProvenanceKind,
    pub attempted: Transition,
}
