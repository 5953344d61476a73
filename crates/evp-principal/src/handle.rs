use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use evp_types::{BranchDescription, ProductId, ProductProvenance, ProductStatus};

use crate::error::{PrincipalError, PrincipalResult};
use crate::group::Group;

/// Typed, read-only access to a resolved product.
///
/// A handle keeps its group alive, so the product it points to outlives the
/// principal lookup that produced it.
pub struct Handle<T> {
    group: Arc<Group>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Handle<T> {
    /// Wrap a resolved group. Fails unless the group holds a present `T`.
    pub fn new(group: Arc<Group>) -> PrincipalResult<Self> {
        let holds_t = group.product().and_then(|p| p.get::<T>()).is_some();
        if !holds_t {
            return Err(PrincipalError::DataCorruption(format!(
                "group for {} does not hold a present {}",
                group.description().key(),
                std::any::type_name::<T>()
            )));
        }
        Ok(Self {
            group,
            _marker: PhantomData,
        })
    }

    pub fn get(&self) -> &T {
        match self.group.product().and_then(|p| p.get::<T>()) {
            Some(value) => value,
            None => unreachable!("handle constructed over a group without a present product"),
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.group.product_id()
    }

    pub fn description(&self) -> &Arc<BranchDescription> {
        self.group.description()
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::of(&self.group)
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }
}

impl<T: 'static> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            group: self.group.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("branch", self.group.description().key())
            .field("product_id", &self.group.product_id())
            .finish()
    }
}

/// Description, product id and provenance of one product, available without
/// reading the product.
#[derive(Clone, Debug)]
pub struct Provenance {
    description: Arc<BranchDescription>,
    product_id: ProductId,
    product_provenance: Option<Arc<ProductProvenance>>,
}

impl Provenance {
    pub(crate) fn of(group: &Group) -> Self {
        Self {
            description: group.description().clone(),
            product_id: group.product_id(),
            product_provenance: group.provenance(),
        }
    }

    pub fn description(&self) -> &Arc<BranchDescription> {
        &self.description
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_provenance(&self) -> Option<&Arc<ProductProvenance>> {
        self.product_provenance.as_ref()
    }

    pub fn status(&self) -> ProductStatus {
        self.product_provenance
            .as_ref()
            .map(|p| p.status())
            .unwrap_or(ProductStatus::Unknown)
    }

    pub fn parents(&self) -> &[evp_types::BranchId] {
        self.product_provenance
            .as_ref()
            .map(|p| p.parents())
            .unwrap_or(&[])
    }
}

/// What an output module receives for one branch: the group (when the
/// product was requested and resolved) plus its provenance.
#[derive(Clone, Debug)]
pub struct OutputHandle {
    group: Option<Arc<Group>>,
    provenance: Option<Arc<ProductProvenance>>,
}

impl OutputHandle {
    pub(crate) fn new(group: Option<Arc<Group>>, provenance: Option<Arc<ProductProvenance>>) -> Self {
        Self { group, provenance }
    }

    /// An output handle for a branch the principal knows nothing about.
    pub fn invalid() -> Self {
        Self {
            group: None,
            provenance: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.group.is_some() || self.provenance.is_some()
    }

    pub fn product(&self) -> Option<&dyn evp_types::EdProduct> {
        self.group.as_ref().and_then(|g| g.product())
    }

    pub fn description(&self) -> Option<&Arc<BranchDescription>> {
        self.group.as_ref().map(|g| g.description())
    }

    pub fn provenance(&self) -> Option<&Arc<ProductProvenance>> {
        self.provenance.as_ref()
    }
}
