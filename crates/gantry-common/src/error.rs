//! Error types raised by the shared domain primitives.
//!
//! Each higher-level crate defines its own domain-specific error enum; this
//! one covers only failures that originate in `gantry-common` itself.

use thiserror::Error;

/// Errors produced while constructing shared domain types.
#[derive(Debug, Error)]
pub enum CommonError {
    /// An image reference string could not be parsed.
    #[error("invalid image reference `{input}`: {reason}")]
    InvalidReference {
        /// The reference string as given by the caller.
        input: String,
        /// What made the reference unparsable.
        reason: &'static str,
    },
}

/// Convenience alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, CommonError>;
