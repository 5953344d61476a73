use evp_registry::RegistryError;
use evp_types::{BranchKey, ErrorCategory, ProductStatus, TypeError};

/// Failures reported by a [`DelayedReader`](crate::DelayedReader).
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The source has no product for this branch in the current unit.
    #[error("product {0} not found in source")]
    NotFound(BranchKey),

    /// The source holds data for the branch but it cannot be decoded.
    #[error("corrupt product {key}: {reason}")]
    Corrupt { key: BranchKey, reason: String },

    #[error("source error: {0}")]
    Backend(String),
}

/// Errors from principal and group operations.
#[derive(Debug, thiserror::Error)]
pub enum PrincipalError {
    #[error("ProductNotFound: {0}")]
    ProductNotFound(String),

    #[error("InsertFailure ({reason}): {message}")]
    InsertFailure {
        reason: &'static str,
        message: String,
    },

    #[error("LogicError: {0}")]
    Logic(String),

    /// Two run or subrun fragments disagree on whether a product exists.
    #[error(
        "cannot merge run/subrun products {context} with different creation statuses \
         ({ours} vs {theirs}); the producer of these products is likely at fault"
    )]
    MergeStatusMismatch {
        context: String,
        ours: ProductStatus,
        theirs: ProductStatus,
    },

    #[error("DataCorruption: {0}")]
    DataCorruption(String),

    #[error("Configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl PrincipalError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProductNotFound(_) => ErrorCategory::ProductNotFound,
            Self::InsertFailure { .. } => ErrorCategory::InsertFailure,
            Self::Logic(_) | Self::MergeStatusMismatch { .. } => ErrorCategory::LogicError,
            Self::DataCorruption(_) => ErrorCategory::DataCorruption,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Registry(e) => e.category(),
            Self::Type(e) => e.category(),
        }
    }
}

impl From<ReaderError> for PrincipalError {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::NotFound(key) => Self::ProductNotFound(format!("{key} not found in source")),
            other => Self::DataCorruption(other.to_string()),
        }
    }
}

/// Result alias for principal operations.
pub type PrincipalResult<T> = Result<T, PrincipalError>;
