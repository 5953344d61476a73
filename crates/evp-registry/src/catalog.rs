use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use evp_types::{BranchDescription, BranchId, BranchKey, BranchType};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

/// Branch ids for one product type, keyed by process name.
pub type ProcessLookup = BTreeMap<String, Vec<BranchId>>;

type TypeLookup = HashMap<String, ProcessLookup>;

struct Frozen {
    descriptions: Vec<Arc<BranchDescription>>,
    by_key: BTreeMap<BranchKey, BranchId>,
    products: [TypeLookup; 4],
    elements: [TypeLookup; 4],
    produced: [bool; 4],
}

/// Every branch known to the job.
///
/// Descriptions are collected with [`add`](Self::add) while the job is being
/// configured. [`freeze`](Self::freeze) then assigns dense [`BranchId`]s in
/// [`BranchKey`] order and builds the type → process → branch-id indexes used
/// by principal queries. After freezing the catalog is read-only.
pub struct ProductCatalog {
    pending: Mutex<BTreeMap<BranchKey, BranchDescription>>,
    frozen: OnceLock<Frozen>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            frozen: OnceLock::new(),
        }
    }

    /// Register a branch. Fails once frozen or if the key is already taken.
    pub fn add(&self, description: BranchDescription) -> RegistryResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if self.frozen.get().is_some() {
            return Err(RegistryError::CatalogFrozen);
        }
        let key = description.key().clone();
        if pending.contains_key(&key) {
            return Err(RegistryError::DuplicateBranch(key));
        }
        debug!(branch = %key, produced = description.is_produced(), "registered branch");
        pending.insert(key, description);
        Ok(())
    }

    /// Assign branch ids and build the lookup indexes. Can only happen once.
    pub fn freeze(&self) -> RegistryResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if self.frozen.get().is_some() {
            return Err(RegistryError::CatalogFrozen);
        }

        let mut frozen = Frozen {
            descriptions: Vec::with_capacity(pending.len()),
            by_key: BTreeMap::new(),
            products: Default::default(),
            elements: Default::default(),
            produced: [false; 4],
        };

        for (i, (key, description)) in std::mem::take(&mut *pending).into_iter().enumerate() {
            let id = BranchId::new(i as u32 + 1);
            let description = Arc::new(description.with_branch_id(id));
            let slot = key.branch_type.index();

            frozen.products[slot]
                .entry(key.friendly_class_name.clone())
                .or_default()
                .entry(key.process_name.clone())
                .or_default()
                .push(id);
            if let Some(element) = description.element_type() {
                frozen.elements[slot]
                    .entry(element.to_string())
                    .or_default()
                    .entry(key.process_name.clone())
                    .or_default()
                    .push(id);
            }
            if description.is_produced() {
                frozen.produced[slot] = true;
            }
            frozen.by_key.insert(key, id);
            frozen.descriptions.push(description);
        }

        let count = frozen.descriptions.len();
        self.frozen
            .set(frozen)
            .map_err(|_| RegistryError::CatalogFrozen)?;
        info!(branches = count, "product catalog frozen");
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    fn frozen(&self) -> RegistryResult<&Frozen> {
        self.frozen.get().ok_or(RegistryError::CatalogNotFrozen)
    }

    /// Number of registered branches.
    pub fn len(&self) -> usize {
        match self.frozen.get() {
            Some(f) => f.descriptions.len(),
            None => self.pending.lock().expect("lock poisoned").len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn description(&self, id: BranchId) -> Option<Arc<BranchDescription>> {
        if !id.is_valid() {
            return None;
        }
        let frozen = self.frozen.get()?;
        frozen.descriptions.get(id.value() as usize - 1).cloned()
    }

    pub fn description_for(&self, key: &BranchKey) -> Option<Arc<BranchDescription>> {
        self.branch_id(key).and_then(|id| self.description(id))
    }

    pub fn branch_id(&self, key: &BranchKey) -> Option<BranchId> {
        self.frozen.get()?.by_key.get(key).copied()
    }

    /// All descriptions for one unit kind, in branch-id order.
    pub fn descriptions(&self, branch_type: BranchType) -> RegistryResult<Vec<Arc<BranchDescription>>> {
        Ok(self
            .frozen()?
            .descriptions
            .iter()
            .filter(|d| d.branch_type() == branch_type)
            .cloned()
            .collect())
    }

    /// Branches of the given friendly type name, grouped by process.
    pub fn product_lookup(&self, branch_type: BranchType, friendly_name: &str) -> Option<&ProcessLookup> {
        self.frozen.get()?.products[branch_type.index()].get(friendly_name)
    }

    /// Sequence branches whose element type has the given friendly name,
    /// grouped by process.
    pub fn element_lookup(&self, branch_type: BranchType, element_name: &str) -> Option<&ProcessLookup> {
        self.frozen.get()?.elements[branch_type.index()].get(element_name)
    }

    /// Whether the current process produces anything for this unit kind.
    pub fn product_produced(&self, branch_type: BranchType) -> bool {
        self.frozen
            .get()
            .is_some_and(|f| f.produced[branch_type.index()])
    }

    /// Ids of the branches the current process produces for this unit kind.
    pub fn produced_branch_ids(&self, branch_type: BranchType) -> RegistryResult<Vec<BranchId>> {
        Ok(self
            .frozen()?
            .descriptions
            .iter()
            .filter(|d| d.is_produced() && d.branch_type() == branch_type)
            .map(|d| d.branch_id())
            .collect())
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProductCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCatalog")
            .field("branch_count", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
