use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification shared by every EVP error type.
///
/// Callers that only need to know *what kind* of failure happened (for
/// reporting or exit codes) match on this instead of the crate-specific
/// error enums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// A strict query matched zero or more than one product.
    ProductNotFound,
    /// A `put` violated a precondition (duplicate, null, bad id).
    InsertFailure,
    /// Internal invariant violation, cycle, or ambiguous one-to-one mapping.
    LogicError,
    /// Input files disagree on per-process branch lists.
    MismatchedInputFiles,
    /// A backend handed back data that does not match its description.
    DataCorruption,
    /// Job configuration is unusable.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProductNotFound => "ProductNotFound",
            Self::InsertFailure => "InsertFailure",
            Self::LogicError => "LogicError",
            Self::MismatchedInputFiles => "MismatchedInputFiles",
            Self::DataCorruption => "DataCorruption",
            Self::Configuration => "Configuration",
        };
        f.write_str(name)
    }
}

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid input tag '{0}': expected label[:instance[:process]]")]
    InvalidInputTag(String),

    #[error("friendly name '{name}' is already bound to {existing}")]
    DuplicateTypeName { name: String, existing: String },

    #[error("type {type_name} is already registered as '{existing}'")]
    DuplicateType { type_name: String, existing: String },
}

impl TypeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidHex(_) | Self::InvalidLength { .. } => ErrorCategory::DataCorruption,
            Self::InvalidInputTag(_)
            | Self::DuplicateTypeName { .. }
            | Self::DuplicateType { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
