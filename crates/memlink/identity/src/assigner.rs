use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memlink_types::MessageId;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::IdentityError;

/// Produces fresh message identifiers.
pub trait IdentityAssigner: Send + Sync {
    /// Assign a new identifier. Never returns a value twice.
    fn assign(&self) -> Result<MessageId, IdentityError>;

    /// Record an identifier that entered the store from outside (bulk
    /// import), so it is never assigned again.
    fn observe(&self, _id: &MessageId) {}
}

/// UUIDv4-backed assigner.
#[derive(Debug, Clone, Default)]
pub struct RandomAssigner {
    prefix: String,
}

impl RandomAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl IdentityAssigner for RandomAssigner {
    fn assign(&self) -> Result<MessageId, IdentityError> {
        Ok(MessageId(format!("{}{}", self.prefix, uuid::Uuid::new_v4())))
    }
}

/// Monotonic counter-backed assigner.
#[derive(Debug)]
pub struct SequentialAssigner {
    prefix: String,
    next: AtomicU64,
}

impl SequentialAssigner {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 1)
    }

    /// Sequence whose first id ends in `start`.
    fn starting_at(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(start),
        }
    }
}

impl IdentityAssigner for SequentialAssigner {
    fn assign(&self) -> Result<MessageId, IdentityError> {
        let value = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map_err(|_| {
                error!(prefix = %self.prefix, "Sequential identifier space exhausted");
                IdentityError::Exhausted {
                    prefix: self.prefix.clone(),
                }
            })?;
        Ok(MessageId(format!("{}{}", self.prefix, value)))
    }

    fn observe(&self, id: &MessageId) {
        let Some(value) = id
            .as_str()
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.parse::<u64>().ok())
        else {
            return;
        };
        // At `u64::MAX` the next assign reports exhaustion.
        let next = value.saturating_add(1);
        if self.next.fetch_max(next, Ordering::AcqRel) < next {
            debug!(prefix = %self.prefix, next, "Advanced sequence past imported id");
        }
    }
}

/// Which assigner a linker should be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityScheme {
    #[default]
    Random,
    Sequential,
}

/// Build the assigner for a configured scheme.
pub fn assigner_for(scheme: IdentityScheme, prefix: &str) -> Arc<dyn IdentityAssigner> {
    match scheme {
        IdentityScheme::Random => Arc::new(RandomAssigner::with_prefix(prefix)),
        IdentityScheme::Sequential => Arc::new(SequentialAssigner::new(prefix)),
    }
}
