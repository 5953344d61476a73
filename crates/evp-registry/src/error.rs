use evp_types::{BranchId, BranchKey, ErrorCategory, ProductId, TypeError};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Branches can only be added before the catalog is frozen.
    #[error("product catalog is frozen")]
    CatalogFrozen,

    /// Lookups that depend on branch ids require a frozen catalog.
    #[error("product catalog has not been frozen")]
    CatalogNotFrozen,

    #[error("branch {0} is already registered")]
    DuplicateBranch(BranchKey),

    /// Input files disagree on a shared process's branch-id list.
    #[error("{report}")]
    MismatchedInputFiles { file_name: String, report: String },

    #[error("branch id {0} is not known to the branch-id list registry")]
    UnknownBranchId(BranchId),

    #[error("invalid product id {0}")]
    InvalidProductId(ProductId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl RegistryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CatalogFrozen | Self::CatalogNotFrozen | Self::DuplicateBranch(_) => {
                ErrorCategory::LogicError
            }
            Self::MismatchedInputFiles { .. } => ErrorCategory::MismatchedInputFiles,
            Self::UnknownBranchId(_) | Self::InvalidProductId(_) => ErrorCategory::ProductNotFound,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Type(e) => e.category(),
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
