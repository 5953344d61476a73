use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use evp_types::{BranchKey, ProductBox, ProductId, TypeTag};

use crate::error::{PrincipalResult, ReaderError};
use crate::group::Group;
use crate::principal::Principal;

/// Lets a reader resolve product references found inside the products it
/// is decoding.
pub trait GroupFinder: Send + Sync {
    fn find_group_for_product(&self, pid: ProductId) -> PrincipalResult<Option<Arc<Group>>>;
}

/// Result of probing the next secondary source for the current unit.
pub enum SecondaryOpen {
    /// No secondary sources remain.
    Exhausted,
    /// The source at this index does not contain the unit.
    UnitAbsent,
    /// The source at `index` contains the unit.
    Opened { index: usize, principal: Principal },
}

impl SecondaryOpen {
    /// Numeric form: `-2` exhausted, `-1` unit absent, otherwise the index.
    pub fn code(&self) -> i64 {
        match self {
            Self::Exhausted => -2,
            Self::UnitAbsent => -1,
            Self::Opened { index, .. } => *index as i64,
        }
    }
}

impl std::fmt::Debug for SecondaryOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => f.write_str("Exhausted"),
            Self::UnitAbsent => f.write_str("UnitAbsent"),
            Self::Opened { index, .. } => write!(f, "Opened({index})"),
        }
    }
}

/// The only interface through which the core touches a storage backend.
///
/// Reads are synchronous: a lazy resolution blocks its caller until the
/// reader returns.
pub trait DelayedReader: Send + Sync {
    /// Read one product for the current unit. `wanted` is the type the
    /// caller will downcast to.
    fn get_product(&self, key: &BranchKey, wanted: TypeTag) -> Result<ProductBox, ReaderError>;

    /// Probe the secondary source at `index` for the current unit.
    fn open_next_secondary_file(&self, _index: usize) -> PrincipalResult<SecondaryOpen> {
        Ok(SecondaryOpen::Exhausted)
    }

    fn set_group_finder(&self, _finder: Weak<dyn GroupFinder>) {}
}

/// Reader for principals whose products are all `put` directly.
#[derive(Debug, Default)]
pub struct NoDelayedReader;

impl DelayedReader for NoDelayedReader {
    fn get_product(&self, key: &BranchKey, _wanted: TypeTag) -> Result<ProductBox, ReaderError> {
        Err(ReaderError::NotFound(key.clone()))
    }
}

/// In-memory [`DelayedReader`] for tests and embedding.
///
/// Each stored product is handed out once; the owning group caches it.
/// Secondary sources are a fixed list where `None` marks a source that does
/// not contain the unit.
pub struct InMemoryReader {
    products: Mutex<HashMap<BranchKey, ProductBox>>,
    secondaries: Mutex<Vec<Option<Principal>>>,
    finder: RwLock<Option<Weak<dyn GroupFinder>>>,
    reads: AtomicUsize,
}

impl InMemoryReader {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
            secondaries: Mutex::new(Vec::new()),
            finder: RwLock::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, key: BranchKey, product: ProductBox) {
        self.products
            .lock()
            .expect("lock poisoned")
            .insert(key, product);
    }

    /// Append a secondary source. `None` is a source without this unit.
    pub fn add_secondary(&self, principal: Option<Principal>) {
        self.secondaries
            .lock()
            .expect("lock poisoned")
            .push(principal);
    }

    /// Number of `get_product` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn group_finder(&self) -> Option<Arc<dyn GroupFinder>> {
        self.finder
            .read()
            .expect("lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl Default for InMemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayedReader for InMemoryReader {
    fn get_product(&self, key: &BranchKey, _wanted: TypeTag) -> Result<ProductBox, ReaderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.products
            .lock()
            .expect("lock poisoned")
            .remove(key)
            .ok_or_else(|| ReaderError::NotFound(key.clone()))
    }

    fn open_next_secondary_file(&self, index: usize) -> PrincipalResult<SecondaryOpen> {
        let mut secondaries = self.secondaries.lock().expect("lock poisoned");
        let Some(slot) = secondaries.get_mut(index) else {
            return Ok(SecondaryOpen::Exhausted);
        };
        Ok(match slot.take() {
            Some(principal) => SecondaryOpen::Opened { index, principal },
            None => SecondaryOpen::UnitAbsent,
        })
    }

    fn set_group_finder(&self, finder: Weak<dyn GroupFinder>) {
        *self.finder.write().expect("lock poisoned") = Some(finder);
    }
}

impl std::fmt::Debug for InMemoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReader")
            .field("reads", &self.read_count())
            .finish()
    }
}
