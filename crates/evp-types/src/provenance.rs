use std::fmt;

use serde::{Deserialize, Serialize};

use crate::branch::BranchId;

/// Creation status of a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    Present,
    NeverCreated,
    Dropped,
    Unknown,
}

impl ProductStatus {
    pub fn is_present(self) -> bool {
        self == Self::Present
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::NeverCreated => "never created",
            Self::Dropped => "dropped",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Per-product provenance: what happened to one branch in one unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProvenance {
    branch_id: BranchId,
    status: ProductStatus,
    parents: Vec<BranchId>,
}

impl ProductProvenance {
    pub fn new(branch_id: BranchId, status: ProductStatus) -> Self {
        Self {
            branch_id,
            status,
            parents: Vec::new(),
        }
    }

    /// Record the branches this product was derived from.
    pub fn with_parents(mut self, parents: Vec<BranchId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn parents(&self) -> &[BranchId] {
        &self.parents
    }
}

impl fmt::Display for ProductProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {} [{}]", self.branch_id, self.status)?;
        if !self.parents.is_empty() {
            let parents: Vec<String> = self.parents.iter().map(|p| p.to_string()).collect();
            write!(f, " parents: {}", parents.join(","))?;
        }
        Ok(())
    }
}
