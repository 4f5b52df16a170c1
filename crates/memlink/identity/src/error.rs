use thiserror::Error;

/// Errors from identity assignment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identifier space exhausted for prefix {prefix:?}")]
    Exhausted { prefix: String },
}
