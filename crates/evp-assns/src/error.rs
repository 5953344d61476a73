use evp_principal::PrincipalError;
use evp_types::ErrorCategory;

/// Errors from references, associations and their lookups.
#[derive(Debug, thiserror::Error)]
pub enum AssnsError {
    /// A lookup object was built without its association and then used.
    #[error("ProductNotFound: {0}")]
    ProductNotFound(String),

    #[error("LogicError: {0}")]
    Logic(String),

    #[error("index {index} out of range for {len} entries")]
    OutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Principal(#[from] PrincipalError),
}

impl AssnsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProductNotFound(_) => ErrorCategory::ProductNotFound,
            Self::Logic(_) | Self::OutOfRange { .. } => ErrorCategory::LogicError,
            Self::Principal(e) => e.category(),
        }
    }
}

/// Result alias for association operations.
pub type AssnsResult<T> = Result<T, AssnsError>;
