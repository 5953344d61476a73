use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use evp_principal::{Handle, Principal};
use evp_types::ProductId;

use crate::error::{AssnsError, AssnsResult};

/// Persistent reference to element `key` of the `Vec<T>` product stored
/// under `product_id`.
pub struct Ptr<T> {
    product_id: ProductId,
    key: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ptr<T> {
    pub fn new(product_id: ProductId, key: usize) -> Self {
        Self {
            product_id,
            key,
            _marker: PhantomData,
        }
    }

    /// A reference to nothing.
    pub fn null() -> Self {
        Self::new(ProductId::invalid(), 0)
    }

    pub fn is_null(&self) -> bool {
        !self.product_id.is_valid()
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn key(&self) -> usize {
        self.key
    }
}

impl<T: 'static> Ptr<T> {
    /// Look up the collection this reference points into.
    pub fn collection(&self, principal: &Principal) -> AssnsResult<Handle<Vec<T>>> {
        if self.is_null() {
            return Err(AssnsError::ProductNotFound("dereferenced a null Ptr".into()));
        }
        Ok(principal.get_by_product_id::<Vec<T>>(self.product_id)?)
    }

    /// The referenced element within an already resolved collection.
    pub fn item<'h>(&self, collection: &'h Handle<Vec<T>>) -> AssnsResult<&'h T> {
        if collection.product_id() != self.product_id {
            return Err(AssnsError::Logic(format!(
                "Ptr to product {} used with collection {}",
                self.product_id,
                collection.product_id()
            )));
        }
        collection.get().get(self.key).ok_or(AssnsError::OutOfRange {
            index: self.key,
            len: collection.len(),
        })
    }
}

/// One reference per element of a collection product, in order.
pub fn ptr_vector<T: 'static>(collection: &Handle<Vec<T>>) -> Vec<Ptr<T>> {
    (0..collection.len())
        .map(|key| Ptr::new(collection.product_id(), key))
        .collect()
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ptr<T> {}

impl<T> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.product_id == other.product_id && self.key == other.key
    }
}

impl<T> Eq for Ptr<T> {}

impl<T> Hash for Ptr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product_id.hash(state);
        self.key.hash(state);
    }
}

impl<T> PartialOrd for Ptr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ptr<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.product_id, self.key).cmp(&(other.product_id, other.key))
    }
}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr({}, {})", self.product_id, self.key)
    }
}

impl<T> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}
