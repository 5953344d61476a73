//! The cache and provenance holder for exactly one product.
//!
//! A [`Group`] starts out empty (or, after `put`, already filled). The first
//! successful resolution stores the product in a write-once cell; every
//! later resolution returns the cached product without touching the reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use evp_types::{
    BranchDescription, BranchId, EdProduct, ProductBox, ProductId, ProductProvenance,
    ProductStatus, ProductTypes, TypeTag,
};
use tracing::{debug, warn};

use crate::error::{PrincipalError, PrincipalResult, ReaderError};
use crate::mapper::BranchMapper;
use crate::reader::DelayedReader;
use crate::unscheduled::OnDemandFiller;

/// Lifecycle position of a group's product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// Not read yet; the reader will be asked on first access.
    NotResolved,
    /// Waiting for its unscheduled producer to run.
    OnDemandPending,
    Resolved,
    Unavailable(ProductStatus),
    /// The unscheduled producer ran but did not put the product.
    FailedOnDemand,
}

/// What [`Group::merge_group`] did with the second fragment's product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Neither side had a product to combine.
    NothingToMerge,
    /// The type's merge handler combined both products.
    Merged,
    /// Products compared equal; the first was kept.
    KeptFirstEqual,
    /// Products compared unequal; the first was kept and a warning logged.
    KeptFirstUnequal,
    /// The type has no merge or equality handler; the first was kept.
    KeptFirstNoHandler,
    /// Only the incoming fragment had this branch; its group was taken over.
    Adopted,
}

pub struct Group {
    description: Arc<BranchDescription>,
    product_id: ProductId,
    produced_type: TypeTag,
    product: OnceLock<ProductBox>,
    provenance: OnceLock<Arc<ProductProvenance>>,
    on_demand: bool,
    on_demand_failed: AtomicBool,
    mapper: Arc<dyn BranchMapper>,
    reader: Arc<dyn DelayedReader>,
}

impl Group {
    pub fn new(
        description: Arc<BranchDescription>,
        product_id: ProductId,
        produced_type: TypeTag,
        mapper: Arc<dyn BranchMapper>,
        reader: Arc<dyn DelayedReader>,
    ) -> Self {
        Self {
            description,
            product_id,
            produced_type,
            product: OnceLock::new(),
            provenance: OnceLock::new(),
            on_demand: false,
            on_demand_failed: AtomicBool::new(false),
            mapper,
            reader,
        }
    }

    /// Start out already holding `product`.
    pub fn with_product(self, product: ProductBox) -> Self {
        let _ = self.product.set(product);
        self
    }

    /// Defer materialization to the branch's unscheduled producer.
    pub fn on_demand(mut self) -> Self {
        self.on_demand = true;
        self
    }

    pub fn description(&self) -> &Arc<BranchDescription> {
        &self.description
    }

    pub fn branch_id(&self) -> BranchId {
        self.description.branch_id()
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn produced_type(&self) -> TypeTag {
        self.produced_type
    }

    /// The cached product, if resolved.
    pub fn product(&self) -> Option<&dyn EdProduct> {
        self.product.get().map(|p| p.as_ref())
    }

    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    pub fn is_on_demand_pending(&self) -> bool {
        self.on_demand
            && self.product.get().is_none()
            && !self.on_demand_failed.load(Ordering::Acquire)
    }

    /// Store the product. Fails if one is already cached.
    pub fn set_product(&self, product: ProductBox) -> PrincipalResult<()> {
        self.product.set(product).map_err(|_| {
            PrincipalError::Logic(format!(
                "product for {} is already set",
                self.description.context()
            ))
        })
    }

    /// Provenance from the branch mapper, cached after the first hit.
    pub fn provenance(&self) -> Option<Arc<ProductProvenance>> {
        if let Some(p) = self.provenance.get() {
            return Some(p.clone());
        }
        let found = self.mapper.branch_to_product_provenance(self.branch_id())?;
        Some(self.provenance.get_or_init(|| found).clone())
    }

    pub fn dropped(&self) -> bool {
        !self.description.is_present()
    }

    pub fn status(&self) -> ProductStatus {
        if self.dropped() {
            return ProductStatus::Dropped;
        }
        if let Some(p) = self.product.get() {
            return if p.is_present() {
                ProductStatus::Present
            } else {
                ProductStatus::NeverCreated
            };
        }
        match self.provenance() {
            Some(p) => p.status(),
            None => ProductStatus::Unknown,
        }
    }

    /// Whether resolution is known to be pointless.
    ///
    /// Dropped branches are unavailable even when an unscheduled producer is
    /// registered for them.
    pub fn product_unavailable(&self) -> bool {
        if self.dropped() {
            return true;
        }
        if self.on_demand && self.product.get().is_none() {
            return self.on_demand_failed.load(Ordering::Acquire);
        }
        match self.status() {
            ProductStatus::Unknown => false,
            status => !status.is_present(),
        }
    }

    pub fn state(&self) -> GroupState {
        if self.product.get().is_some() {
            return GroupState::Resolved;
        }
        if self.dropped() {
            return GroupState::Unavailable(ProductStatus::Dropped);
        }
        if self.on_demand {
            return if self.on_demand_failed.load(Ordering::Acquire) {
                GroupState::FailedOnDemand
            } else {
                GroupState::OnDemandPending
            };
        }
        match self.status() {
            ProductStatus::Unknown | ProductStatus::Present => GroupState::NotResolved,
            status => GroupState::Unavailable(status),
        }
    }

    /// Strict resolution: an unavailable product is an error.
    pub fn resolve_product(
        &self,
        wanted: TypeTag,
        filler: Option<&dyn OnDemandFiller>,
    ) -> PrincipalResult<bool> {
        if self.product_unavailable() {
            let provenance = self
                .provenance()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "no provenance".to_string());
            return Err(PrincipalError::ProductNotFound(format!(
                "InaccessibleProduct\nresolve_product: product is not accessible\n{} {}\n{}",
                self.description.key(),
                self.description.context(),
                provenance
            )));
        }
        self.resolve_product_if_available(wanted, filler)
    }

    /// Materialize the product if possible. Returns whether a product is now
    /// cached; an absent or dropped product is `Ok(false)`, not an error.
    pub fn resolve_product_if_available(
        &self,
        wanted: TypeTag,
        filler: Option<&dyn OnDemandFiller>,
    ) -> PrincipalResult<bool> {
        if self.product.get().is_some() {
            return Ok(true);
        }
        if self.product_unavailable() {
            return Ok(false);
        }

        if self.on_demand {
            let Some(filler) = filler else {
                return Ok(false);
            };
            let label = self.description.module_label();
            let ran = filler.fill_on_demand(label)?;
            if self.product.get().is_some() {
                return Ok(true);
            }
            self.on_demand_failed.store(true, Ordering::Release);
            warn!(
                branch = %self.description.key(),
                module = label,
                ran,
                "unscheduled module did not put its product"
            );
            return Ok(false);
        }

        let key = self.description.key();
        match self.reader.get_product(key, wanted) {
            Ok(product) => {
                if product.type_tag() != wanted {
                    return Err(PrincipalError::DataCorruption(format!(
                        "reader returned {} for branch {key}, expected {wanted}",
                        product.type_tag()
                    )));
                }
                debug!(branch = %key, pid = %self.product_id, "resolved product from reader");
                let _ = self.product.set(product);
                Ok(true)
            }
            Err(ReaderError::NotFound(_)) => {
                debug!(branch = %key, "reader has no product");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail unless this group and `other` agree on creation status. Both
    /// products are resolved first.
    pub fn check_merge_status(&self, other: &Group) -> PrincipalResult<()> {
        self.resolve_product_if_available(self.produced_type, None)?;
        other.resolve_product_if_available(other.produced_type, None)?;

        let ours = self.status();
        let theirs = other.status();
        if ours != theirs {
            return Err(PrincipalError::MergeStatusMismatch {
                context: format!(
                    "className = {}, moduleLabel = {}, instance = {}, process = {}, \
                     branchType = {}",
                    self.description.produced_class_name(),
                    self.description.module_label(),
                    self.description.product_instance_name(),
                    self.description.process_name(),
                    self.description.branch_type()
                ),
                ours,
                theirs,
            });
        }
        Ok(())
    }

    /// Fold another run or subrun fragment's group into this one.
    ///
    /// Differing creation statuses are always an error. When both sides hold
    /// a product, the type's merge handler combines them; failing that, an
    /// equality handler checks them; failing that, the first is kept.
    pub fn merge_group(&mut self, other: &Group, types: &ProductTypes) -> PrincipalResult<MergeOutcome> {
        self.check_merge_status(other)?;
        if self.product_unavailable() || other.product_unavailable() {
            return Ok(MergeOutcome::NothingToMerge);
        }
        let (Some(mine), Some(incoming)) = (self.product.get_mut(), other.product.get()) else {
            return Ok(MergeOutcome::NothingToMerge);
        };

        if types.try_merge(&mut **mine, &**incoming) {
            debug!(branch = %self.description.key(), "merged fragment product");
            return Ok(MergeOutcome::Merged);
        }
        let outcome = match types.try_equal(&**mine, &**incoming) {
            Some(true) => MergeOutcome::KeptFirstEqual,
            Some(false) => {
                warn!(
                    class_name = self.description.produced_class_name(),
                    module_label = self.description.module_label(),
                    instance = self.description.product_instance_name(),
                    process = self.description.process_name(),
                    "run/subrun products that should be equal are not; using the first"
                );
                MergeOutcome::KeptFirstUnequal
            }
            None => {
                warn!(
                    class_name = self.description.produced_class_name(),
                    module_label = self.description.module_label(),
                    instance = self.description.product_instance_name(),
                    process = self.description.process_name(),
                    "run/subrun product has neither a merge nor an equality handler; using the first"
                );
                MergeOutcome::KeptFirstNoHandler
            }
        };
        Ok(outcome)
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("branch", self.description.key())
            .field("product_id", &self.product_id)
            .field("state", &self.state())
            .finish()
    }
}
