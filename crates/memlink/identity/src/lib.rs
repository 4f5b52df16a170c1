//! Identity assignment for chat messages.
//!
//! Identifiers are unique for the lifetime of a store and never reused.
//! Two schemes are provided:
//!
//! - [`RandomAssigner`]: UUIDv4, unique with overwhelming probability and
//!   stateless, so trivially safe under concurrent callers.
//! - [`SequentialAssigner`]: a lock-free counter. It refuses to wrap and
//!   reports [`IdentityError::Exhausted`] instead, the only fatal outcome of
//!   the linker.

#![deny(unsafe_code)]

mod assigner;
mod error;

pub use assigner::{
    assigner_for, IdentityAssigner, IdentityScheme, RandomAssigner, SequentialAssigner,
};
pub use error::IdentityError;
