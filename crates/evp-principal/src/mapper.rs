use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use evp_types::{BranchId, ProductProvenance};
use tracing::debug;

/// Per-principal lookup from branch id to product provenance.
///
/// Provenance is kept apart from products so that a principal can answer
/// "was this made, and from what" without reading the product itself.
pub trait BranchMapper: Send + Sync {
    fn branch_to_product_provenance(&self, id: BranchId) -> Option<Arc<ProductProvenance>>;

    /// Record provenance for a branch. Returns `false` if the branch already
    /// had an entry, which is left untouched.
    fn insert(&self, provenance: ProductProvenance) -> bool;

    /// Force any deferred provenance to be read now.
    fn load_all(&self) {}
}

/// Deferred source of provenance records, read at most once.
pub trait ProvenanceSource: Send + Sync {
    fn read_provenance(&self) -> Vec<ProductProvenance>;
}

/// In-memory [`BranchMapper`], optionally backed by a [`ProvenanceSource`]
/// that is consulted on first lookup.
pub struct InMemoryBranchMapper {
    entries: RwLock<HashMap<BranchId, Arc<ProductProvenance>>>,
    source: Option<Box<dyn ProvenanceSource>>,
    loaded: OnceLock<()>,
}

impl InMemoryBranchMapper {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            source: None,
            loaded: OnceLock::new(),
        }
    }

    pub fn with_source(source: Box<dyn ProvenanceSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.ensure_loaded();
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_loaded(&self) {
        let Some(source) = &self.source else {
            return;
        };
        self.loaded.get_or_init(|| {
            let records = source.read_provenance();
            let count = records.len();
            let mut entries = self.entries.write().expect("lock poisoned");
            for record in records {
                entries
                    .entry(record.branch_id())
                    .or_insert_with(|| Arc::new(record));
            }
            debug!(records = count, "read deferred provenance");
        });
    }
}

impl Default for InMemoryBranchMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchMapper for InMemoryBranchMapper {
    fn branch_to_product_provenance(&self, id: BranchId) -> Option<Arc<ProductProvenance>> {
        self.ensure_loaded();
        self.entries.read().expect("lock poisoned").get(&id).cloned()
    }

    fn insert(&self, provenance: ProductProvenance) -> bool {
        let mut entries = self.entries.write().expect("lock poisoned");
        if entries.contains_key(&provenance.branch_id()) {
            return false;
        }
        entries.insert(provenance.branch_id(), Arc::new(provenance));
        true
    }

    fn load_all(&self) {
        self.ensure_loaded();
    }
}

impl std::fmt::Debug for InMemoryBranchMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBranchMapper")
            .field("entries", &self.entries.read().expect("lock poisoned").len())
            .field("deferred", &self.source.is_some())
            .finish()
    }
}
