//! Memory Link Registry.
//!
//! Maps message ids to memory ids. A message has at most one active memory
//! and linking an already-linked message fails closed; the caller must
//! unlink first. Memory existence is checked against the external memory
//! store through the [`MemoryStore`] trait.

#![deny(unsafe_code)]

mod error;
mod memory_store;
mod registry;

pub use error::{MemoryStoreError, RegistryError};
pub use memory_store::{InMemoryMemoryStore, MemoryStore};
pub use registry::MemoryLinkRegistry;
