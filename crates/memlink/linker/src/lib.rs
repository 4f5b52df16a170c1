//! # memlink-linker
//!
//! The message–memory link service. Wires the identity assigner, the
//! memory link registry, the message store and the provenance tracker
//! together:
//!
//! ```text
//! create_message ─▶ IdentityAssigner ─▶ MessageStore (Unlinked)
//! request_link   ─▶ MemoryLinkRegistry ─▶ MessageStore (Pending) ─▶ PendingTracker
//! ledger client  ─▶ mpsc inbox ─▶ PendingTracker ─▶ MessageStore (Confirmed)
//! sweep interval ─▶ PendingTracker::expire ─▶ MessageStore (Unlinked)
//! ```
//!
//! Every outcome is broadcast as a [`LinkEvent`].

#![deny(unsafe_code)]

pub mod config;
mod error;
mod events;
mod handle;
mod linker;
mod locks;

pub use config::LinkerConfig;
pub use error::{LinkerError, LinkerResult};
pub use events::LinkEvent;
pub use handle::LinkerHandle;
pub use linker::Linker;
