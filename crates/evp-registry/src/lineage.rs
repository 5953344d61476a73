use std::collections::HashMap;

use evp_types::{BranchId, BranchListIndex, ProductId};

use crate::branch_lists::BranchIdListRegistry;
use crate::error::{RegistryError, RegistryResult};

/// A unit's ordered view of the job-wide branch-id lists.
///
/// Position `n` in the lineage is process index `n + 1` of every
/// [`ProductId`] stored with the unit. Combined with the registry's
/// `BranchId → (list, position)` map this gives a reversible translation
/// between file-portable product ids and process-local branch ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lineage {
    indexes: Vec<BranchListIndex>,
    positions: HashMap<BranchListIndex, u16>,
}

impl Lineage {
    pub fn new(indexes: Vec<BranchListIndex>) -> Self {
        let mut lineage = Self::default();
        for index in indexes {
            lineage.push(index);
        }
        lineage
    }

    pub fn push(&mut self, index: BranchListIndex) {
        let position = self.indexes.len() as u16;
        self.indexes.push(index);
        self.positions.entry(index).or_insert(position);
    }

    pub fn indexes(&self) -> &[BranchListIndex] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Translate a stored product id to this job's branch id.
    ///
    /// An id that is structurally valid but points outside the lineage or
    /// past the end of a list translates to the invalid branch id.
    pub fn product_id_to_branch_id(
        &self,
        pid: ProductId,
        lists: &BranchIdListRegistry,
    ) -> RegistryResult<BranchId> {
        if !pid.is_valid() {
            return Err(RegistryError::InvalidProductId(pid));
        }
        let Some(&list) = self.indexes.get(pid.process_index() as usize - 1) else {
            return Ok(BranchId::invalid());
        };
        if pid.product_index() == 0 {
            return Ok(BranchId::invalid());
        }
        Ok(lists
            .branch_id_at(list, pid.product_index() as usize - 1)
            .unwrap_or_else(BranchId::invalid))
    }

    /// Translate a branch id into a product id relative to this lineage.
    pub fn branch_id_to_product_id(
        &self,
        id: BranchId,
        lists: &BranchIdListRegistry,
    ) -> RegistryResult<ProductId> {
        if !id.is_valid() {
            return Err(RegistryError::UnknownBranchId(id));
        }
        let (list, position) = lists
            .index_of(id)
            .ok_or(RegistryError::UnknownBranchId(id))?;
        let process = self
            .positions
            .get(&list)
            .ok_or(RegistryError::UnknownBranchId(id))?;
        let product = u16::try_from(position + 1).map_err(|_| RegistryError::UnknownBranchId(id))?;
        Ok(ProductId::new(process + 1, product))
    }
}
