//! # memlink-provenance
//!
//! Provenance Resolver for message–memory links.
//!
//! Every message moves through a small state machine:
//!
//! ```text
//!             request_link               confirm(entity, tx)
//!  Unlinked ───────────────▶ Pending ─────────────────────────▶ Confirmed
//!     ▲                        │
//!     └──── abandon (failure / timeout) ┘
//!
//!  LegacyConfirmed  (bulk import only, read-only)
//! ```
//!
//! Display resolution is a pure function over the record's fields: the
//! entity/transaction pair wins over the legacy explorer URL.
//!
//! Ledger confirmations arrive as explicit [`LedgerConfirmation`] events and
//! are matched against in-flight links by the [`PendingTracker`], which also
//! owns link deadlines.

#![deny(unsafe_code)]

pub mod display;
pub mod error;
pub mod event;
pub mod state;
pub mod tracker;

pub use display::{resolve, DisplayProvenance, ProvenanceFields};
pub use error::{Transition, TransitionError};
pub use event::LedgerConfirmation;
pub use state::{abandon, admit, confirm, request_link};
pub use tracker::{Absorbed, LinkAttempt, PendingTracker};
