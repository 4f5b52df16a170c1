//! Message Record Store.
//!
//! Append-favoring store of chat message records. Records are immutable
//! except for their provenance state, which only moves along the transitions
//! of `memlink-provenance`. Reads scoped to a conversation come back in
//! non-decreasing timestamp order; ties keep append order.

#![deny(unsafe_code)]

mod error;
pub mod memory;
mod model;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryMessageStore;
pub use model::{ImportRejection, ImportReport, RejectReason};
pub use traits::{MessageStore, QueryWindow};
