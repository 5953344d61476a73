//! Per-unit product container.
//!
//! A [`Principal`] owns the groups of one run, subrun, event or results
//! unit. Groups are created by `put` (products made in this process), by
//! [`Principal::add_group`] (products available from the input and read
//! lazily), or by [`Principal::add_on_demand_group`] (products of unscheduled
//! modules, produced on first access).
//!
//! Lookups by branch id fall through to secondary principals, which are
//! opened one at a time through the reader until the branch is found or the
//! secondary sources are exhausted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use evp_registry::{JobContext, Lineage};
use evp_types::{
    BranchDescription, BranchId, BranchType, EventId, ProcessHistory, ProcessHistoryId,
    ProductBox, ProductId, ProductProvenance, ProductStatus, RunId, SubRunId, TypeTag, Wrapper,
};
use tracing::{debug, info};

use crate::error::{PrincipalError, PrincipalResult};
use crate::group::{Group, MergeOutcome};
use crate::handle::OutputHandle;
use crate::mapper::{BranchMapper, InMemoryBranchMapper};
use crate::reader::{DelayedReader, GroupFinder, NoDelayedReader, SecondaryOpen};
use crate::unscheduled::{OnDemandFiller, RunningModules, UnscheduledHandler};

/// Identity of the unit a principal holds products for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitAux {
    Run(RunId),
    SubRun(SubRunId),
    Event(EventId),
    Results,
}

impl UnitAux {
    pub fn branch_type(&self) -> BranchType {
        match self {
            Self::Run(_) => BranchType::Run,
            Self::SubRun(_) => BranchType::SubRun,
            Self::Event(_) => BranchType::Event,
            Self::Results => BranchType::Results,
        }
    }
}

impl fmt::Display for UnitAux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(id) => write!(f, "{id}"),
            Self::SubRun(id) => write!(f, "{id}"),
            Self::Event(id) => write!(f, "{id}"),
            Self::Results => f.write_str("results"),
        }
    }
}

pub struct Principal {
    context: Arc<JobContext>,
    aux: UnitAux,
    history: RwLock<ProcessHistory>,
    lineage: RwLock<Lineage>,
    groups: RwLock<BTreeMap<BranchId, Arc<Group>>>,
    mapper: Arc<dyn BranchMapper>,
    reader: Arc<dyn DelayedReader>,
    handler: Option<Arc<dyn UnscheduledHandler>>,
    parent: Option<Arc<Principal>>,
    secondaries: RwLock<Vec<Arc<Principal>>>,
    next_secondary: Mutex<usize>,
    secondaries_exhausted: AtomicBool,
    running: RunningModules,
}

/// Configures a [`Principal`] before creation.
pub struct PrincipalBuilder {
    context: Arc<JobContext>,
    aux: UnitAux,
    history: ProcessHistory,
    lineage: Lineage,
    mapper: Option<Arc<dyn BranchMapper>>,
    reader: Option<Arc<dyn DelayedReader>>,
    handler: Option<Arc<dyn UnscheduledHandler>>,
    parent: Option<Arc<Principal>>,
}

impl PrincipalBuilder {
    /// Process history read from the input along with the unit.
    pub fn history(mut self, history: ProcessHistory) -> Self {
        self.history = history;
        self
    }

    /// Branch-list lineage read from the input along with the unit.
    pub fn lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn BranchMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn reader(mut self, reader: Arc<dyn DelayedReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn unscheduled_handler(mut self, handler: Arc<dyn UnscheduledHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The enclosing unit: a subrun for an event, a run for a subrun.
    pub fn parent(mut self, parent: Arc<Principal>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Create the principal. The job context must already be finalized.
    ///
    /// If the current process produces products for this unit kind, it is
    /// appended to the process history, and event principals also append the
    /// current process's branch-id list to their lineage.
    pub fn build(self) -> PrincipalResult<Principal> {
        if !self.context.catalog().is_frozen() {
            return Err(PrincipalError::Configuration(
                "job context must be finalized before principals are created".into(),
            ));
        }
        let branch_type = self.aux.branch_type();
        let principal = Principal {
            aux: self.aux,
            history: RwLock::new(self.history),
            lineage: RwLock::new(self.lineage),
            groups: RwLock::new(BTreeMap::new()),
            mapper: self
                .mapper
                .unwrap_or_else(|| Arc::new(InMemoryBranchMapper::new())),
            reader: self.reader.unwrap_or_else(|| Arc::new(NoDelayedReader)),
            handler: self.handler,
            parent: self.parent,
            secondaries: RwLock::new(Vec::new()),
            next_secondary: Mutex::new(0),
            secondaries_exhausted: AtomicBool::new(false),
            running: RunningModules::default(),
            context: self.context,
        };

        if principal.context.catalog().product_produced(branch_type) {
            principal.add_to_process_history()?;
            if branch_type == BranchType::Event {
                if let Some(index) = principal.context.current_list_index() {
                    principal.lineage.write().expect("lock poisoned").push(index);
                }
            }
        }
        debug!(unit = %principal.aux, "created principal");
        Ok(principal)
    }
}

impl Principal {
    pub fn builder(context: Arc<JobContext>, aux: UnitAux) -> PrincipalBuilder {
        PrincipalBuilder {
            context,
            aux,
            history: ProcessHistory::new(),
            lineage: Lineage::default(),
            mapper: None,
            reader: None,
            handler: None,
            parent: None,
        }
    }

    /// Move into an `Arc` and register with the reader as its group finder.
    pub fn shared(self) -> Arc<Self> {
        let this = Arc::new(self);
        let finder: Weak<dyn GroupFinder> = Arc::downgrade(&this) as Weak<dyn GroupFinder>;
        this.reader.set_group_finder(finder);
        this
    }

    pub fn aux(&self) -> UnitAux {
        self.aux
    }

    pub fn branch_type(&self) -> BranchType {
        self.aux.branch_type()
    }

    pub fn context(&self) -> &Arc<JobContext> {
        &self.context
    }

    pub fn parent(&self) -> Option<&Arc<Principal>> {
        self.parent.as_ref()
    }

    pub fn process_history(&self) -> ProcessHistory {
        self.history.read().expect("lock poisoned").clone()
    }

    pub fn process_history_id(&self) -> ProcessHistoryId {
        self.history.read().expect("lock poisoned").id()
    }

    pub fn lineage(&self) -> Lineage {
        self.lineage.read().expect("lock poisoned").clone()
    }

    pub fn mapper(&self) -> &Arc<dyn BranchMapper> {
        &self.mapper
    }

    pub fn reader(&self) -> &Arc<dyn DelayedReader> {
        &self.reader
    }

    /// Number of groups owned by this principal, secondaries excluded.
    pub fn size(&self) -> usize {
        self.groups.read().expect("lock poisoned").len()
    }

    pub fn branch_ids(&self) -> Vec<BranchId> {
        self.groups
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub fn secondary_count(&self) -> usize {
        self.secondaries.read().expect("lock poisoned").len()
    }

    /// Append the current process to this unit's history and register the
    /// result with the job.
    pub fn add_to_process_history(&self) -> PrincipalResult<ProcessHistoryId> {
        let process = self.context.process_configuration();
        let mut history = self.history.write().expect("lock poisoned");
        if history.contains_process(&process.process_name) {
            return Err(PrincipalError::Configuration(format!(
                "The process name {} was previously used on these products.\n\
                 Please modify the configuration to use a distinct process name.",
                process.process_name
            )));
        }
        history.push(process.clone());
        let id = self.context.histories().insert(&history);
        debug!(
            unit = %self.aux,
            process = %process.process_name,
            history = %id.short_hex(),
            "added process to history"
        );
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Identity translation
    // -----------------------------------------------------------------------

    pub fn product_id_to_branch_id(&self, pid: ProductId) -> PrincipalResult<BranchId> {
        if !pid.is_valid() {
            return Err(PrincipalError::ProductNotFound(format!(
                "InvalidID\nproduct_id_to_branch_id: invalid ProductID {pid} supplied"
            )));
        }
        let lineage = self.lineage.read().expect("lock poisoned");
        Ok(lineage.product_id_to_branch_id(pid, self.context.branch_lists())?)
    }

    pub fn branch_id_to_product_id(&self, id: BranchId) -> PrincipalResult<ProductId> {
        let lineage = self.lineage.read().expect("lock poisoned");
        Ok(lineage.branch_id_to_product_id(id, self.context.branch_lists())?)
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Insert a product made by the current process.
    ///
    /// An empty on-demand group for the same branch is filled in place;
    /// any other existing group is an `AlreadyPresent` failure.
    pub fn put(
        &self,
        product: Option<ProductBox>,
        description: &Arc<BranchDescription>,
        provenance: ProductProvenance,
    ) -> PrincipalResult<ProductId> {
        let Some(product) = product else {
            return Err(PrincipalError::InsertFailure {
                reason: "Null Pointer",
                message: format!(
                    "put: cannot put because the product is null for {}",
                    description.context()
                ),
            });
        };
        if description.branch_type() != self.branch_type() {
            return Err(PrincipalError::Logic(format!(
                "put: branch {} does not belong in a {} principal",
                description.context(),
                self.branch_type()
            )));
        }
        let bid = description.branch_id();
        if !bid.is_valid() {
            return Err(PrincipalError::Logic(format!(
                "put: branch {} was never registered with the product catalog",
                description.context()
            )));
        }
        if provenance.branch_id() != bid {
            return Err(PrincipalError::Logic(format!(
                "put: provenance for branch {} attached to {}",
                provenance.branch_id(),
                description.context()
            )));
        }

        let pid = if self.branch_type() == BranchType::Event {
            self.branch_id_to_product_id(bid)
                .map_err(|e| PrincipalError::InsertFailure {
                    reason: "Null Product ID",
                    message: format!(
                        "put: cannot create a ProductID for {}: {e}",
                        description.context()
                    ),
                })?
        } else {
            ProductId::invalid()
        };

        let tag = self.registered_type(description)?;
        if product.type_tag() != tag {
            return Err(PrincipalError::Logic(format!(
                "put: product of type {} does not match branch {} of type {tag}",
                product.type_tag(),
                description.context()
            )));
        }

        let mut groups = self.groups.write().expect("lock poisoned");
        if let Some(existing) = groups.get(&bid) {
            if existing.is_on_demand() && existing.product().is_none() {
                self.mapper.insert(provenance);
                existing.set_product(product)?;
                debug!(branch = %description.key(), pid = %pid, "filled on-demand group");
                return Ok(pid);
            }
            return Err(PrincipalError::InsertFailure {
                reason: "AlreadyPresent",
                message: format!(
                    "put: cannot put product with id {pid} because a product for \
                     {} is already present",
                    description.context()
                ),
            });
        }

        self.mapper.insert(provenance);
        let group = Group::new(
            description.clone(),
            pid,
            tag,
            self.mapper.clone(),
            self.reader.clone(),
        )
        .with_product(product);
        groups.insert(bid, Arc::new(group));
        debug!(branch = %description.key(), pid = %pid, "put product");
        Ok(pid)
    }

    /// Typed form of [`put`](Self::put) recording a present product with the
    /// given parents.
    pub fn put_value<T: Send + Sync + 'static>(
        &self,
        value: T,
        description: &Arc<BranchDescription>,
        parents: Vec<BranchId>,
    ) -> PrincipalResult<ProductId> {
        let provenance = ProductProvenance::new(description.branch_id(), ProductStatus::Present)
            .with_parents(parents);
        self.put(Some(Wrapper::boxed(value)), description, provenance)
    }

    /// Register a placeholder for a product an unscheduled module makes.
    pub fn add_on_demand_group(&self, description: Arc<BranchDescription>) -> PrincipalResult<()> {
        if self.branch_type() != BranchType::Event {
            return Err(PrincipalError::Logic(format!(
                "on-demand production is only supported for event products, not {}",
                description.context()
            )));
        }
        let bid = description.branch_id();
        let tag = self.registered_type(&description)?;
        let pid = self.branch_id_to_product_id(bid)?;

        let mut groups = self.groups.write().expect("lock poisoned");
        if let Some(existing) = groups.get(&bid) {
            if !existing.is_on_demand() {
                return Err(PrincipalError::InsertFailure {
                    reason: "AlreadyPresent",
                    message: format!(
                        "add_on_demand_group: a product for {} is already present",
                        description.context()
                    ),
                });
            }
        }
        let group = Group::new(
            description.clone(),
            pid,
            tag,
            self.mapper.clone(),
            self.reader.clone(),
        )
        .on_demand();
        groups.insert(bid, Arc::new(group));
        debug!(branch = %description.key(), "added on-demand group");
        Ok(())
    }

    /// Register a lazily-read group for a branch present in the input.
    pub fn add_group(&self, description: Arc<BranchDescription>) -> PrincipalResult<()> {
        let bid = description.branch_id();
        let tag = self.registered_type(&description)?;
        let pid = match self.branch_type() {
            BranchType::Event => self
                .branch_id_to_product_id(bid)
                .unwrap_or_else(|_| ProductId::invalid()),
            _ => ProductId::invalid(),
        };

        let mut groups = self.groups.write().expect("lock poisoned");
        if groups.contains_key(&bid) {
            return Err(PrincipalError::InsertFailure {
                reason: "AlreadyPresent",
                message: format!(
                    "add_group: a group for {} is already present",
                    description.context()
                ),
            });
        }
        let group = Group::new(description, pid, tag, self.mapper.clone(), self.reader.clone());
        groups.insert(bid, Arc::new(group));
        Ok(())
    }

    /// Add a lazily-read group for every catalog branch of this unit kind that
    /// the current process does not produce. Returns how many were added.
    pub fn add_groups_from_catalog(&self) -> PrincipalResult<usize> {
        let descriptions = self.context.catalog().descriptions(self.branch_type())?;
        let mut added = 0;
        for description in descriptions {
            if description.is_produced() || self.get_existing_group(description.branch_id()).is_some() {
                continue;
            }
            self.add_group(description)?;
            added += 1;
        }
        debug!(unit = %self.aux, added, "added input groups from catalog");
        Ok(added)
    }

    fn registered_type(&self, description: &BranchDescription) -> PrincipalResult<TypeTag> {
        self.context
            .types()
            .tag_for(description.friendly_class_name())
            .ok_or_else(|| {
                PrincipalError::Configuration(format!(
                    "no dictionary for type {} needed by {}",
                    description.friendly_class_name(),
                    description.context()
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Group lookup
    // -----------------------------------------------------------------------

    /// A group owned by this principal, without consulting secondaries.
    pub fn get_existing_group(&self, id: BranchId) -> Option<Arc<Group>> {
        self.groups.read().expect("lock poisoned").get(&id).cloned()
    }

    /// Find the group for `id` here, then in open secondaries, then by opening
    /// further secondary sources one at a time.
    pub fn get_group(&self, id: BranchId) -> PrincipalResult<Option<Arc<Group>>> {
        if let Some(group) = self.get_existing_group(id) {
            return Ok(Some(group));
        }
        if !self.context.config().secondary_lookup {
            return Ok(None);
        }
        for secondary in self.secondaries.read().expect("lock poisoned").iter() {
            if let Some(group) = secondary.get_existing_group(id) {
                return Ok(Some(group));
            }
        }

        let mut next = self.next_secondary.lock().expect("lock poisoned");
        while !self.secondaries_exhausted.load(Ordering::Acquire) {
            match self.reader.open_next_secondary_file(*next)? {
                SecondaryOpen::Exhausted => {
                    self.secondaries_exhausted.store(true, Ordering::Release);
                }
                SecondaryOpen::UnitAbsent => *next += 1,
                SecondaryOpen::Opened { index, principal } => {
                    *next = index + 1;
                    let secondary = principal.shared();
                    info!(unit = %self.aux, index, "opened secondary source");
                    self.secondaries
                        .write()
                        .expect("lock poisoned")
                        .push(secondary.clone());
                    if let Some(group) = secondary.get_existing_group(id) {
                        return Ok(Some(group));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Resolve a product reference. Returns `None` when the id translates
    /// to no branch or no principal has a group for it.
    pub fn get_group_for_ptr(&self, pid: ProductId) -> PrincipalResult<Option<Arc<Group>>> {
        let bid = self.product_id_to_branch_id(pid)?;
        if !bid.is_valid() {
            return Ok(None);
        }
        let Some(group) = self.get_group(bid)? else {
            return Ok(None);
        };
        group.resolve_product_if_available(group.produced_type(), self.filler())?;
        Ok(Some(group))
    }

    pub fn get_provenance(&self, id: BranchId) -> Option<Arc<ProductProvenance>> {
        self.get_existing_group(id)
            .and_then(|g| g.provenance())
            .or_else(|| self.mapper.branch_to_product_provenance(id))
    }

    /// The group and provenance an output module writes for `id`.
    ///
    /// For events, a product whose provenance says present but which cannot
    /// be read is a logic error. Runs and subruns may legitimately lack it.
    pub fn get_for_output(&self, id: BranchId, get_prod: bool) -> PrincipalResult<OutputHandle> {
        let Some(group) = self.get_group(id)? else {
            return Ok(OutputHandle::invalid());
        };
        if get_prod {
            group.resolve_product_if_available(group.produced_type(), self.filler())?;
            let declared_present = group
                .provenance()
                .is_some_and(|p| p.status().is_present());
            let in_event = self.branch_type() == BranchType::Event;
            if in_event && group.product().is_none() && declared_present && !group.dropped() {
                return Err(PrincipalError::Logic(format!(
                    "get_for_output: cannot find a product for {} whose provenance \
                     declares it present",
                    group.description().context()
                )));
            }
        }
        let provenance = group.provenance();
        Ok(OutputHandle::new(Some(group), provenance))
    }

    /// Read every product that is not known to be unavailable. Returns how
    /// many groups now hold a product.
    pub fn read_immediate(&self) -> PrincipalResult<usize> {
        let groups: Vec<Arc<Group>> = self
            .groups
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        let mut resolved = 0;
        for group in groups {
            if group.product_unavailable() {
                continue;
            }
            if group.resolve_product_if_available(group.produced_type(), self.filler())? {
                resolved += 1;
            }
        }
        debug!(unit = %self.aux, resolved, "read all products");
        Ok(resolved)
    }

    /// Load every provenance record and cache it on its group.
    pub fn read_provenance_immediate(&self) -> usize {
        self.mapper.load_all();
        self.groups
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|g| g.provenance().is_some())
            .count()
    }

    // -----------------------------------------------------------------------
    // Fragment merging
    // -----------------------------------------------------------------------

    /// Merge another fragment of the same run or subrun into this one.
    ///
    /// Groups present in both are combined with [`Group::merge_group`];
    /// groups only in `other` are taken over. A group that still has an
    /// outstanding handle cannot be merged.
    pub fn merge_fragment(&self, other: Principal) -> PrincipalResult<Vec<(BranchId, MergeOutcome)>> {
        if !matches!(self.aux, UnitAux::Run(_) | UnitAux::SubRun(_)) {
            return Err(PrincipalError::Logic(format!(
                "fragment merging applies to runs and subruns, not {}",
                self.aux
            )));
        }
        if other.branch_type() != self.branch_type() {
            return Err(PrincipalError::Logic(format!(
                "cannot merge a {} fragment into {}",
                other.branch_type(),
                self.aux
            )));
        }
        let theirs = other.groups.into_inner().expect("lock poisoned");

        // Merging may read products, and readers may look groups up through
        // this principal, so the map is taken out of the lock meanwhile.
        let mut mine = std::mem::take(&mut *self.groups.write().expect("lock poisoned"));
        let result = self.merge_groups(&mut mine, theirs);
        let mut guard = self.groups.write().expect("lock poisoned");
        for (id, group) in std::mem::take(&mut *guard) {
            mine.entry(id).or_insert(group);
        }
        *guard = mine;
        drop(guard);

        let outcomes = result?;
        info!(unit = %self.aux, groups = outcomes.len(), "merged fragment");
        Ok(outcomes)
    }

    /// Every shared branch is checked before any group is touched, so a
    /// failed merge leaves `mine` as it was.
    fn merge_groups(
        &self,
        mine: &mut BTreeMap<BranchId, Arc<Group>>,
        theirs: BTreeMap<BranchId, Arc<Group>>,
    ) -> PrincipalResult<Vec<(BranchId, MergeOutcome)>> {
        for (id, incoming) in &theirs {
            let Some(slot) = mine.get_mut(id) else {
                continue;
            };
            slot.check_merge_status(incoming)?;
            if Arc::get_mut(slot).is_none() {
                return Err(PrincipalError::Logic(format!(
                    "cannot merge {}: an outstanding handle still refers to it",
                    slot.description().context()
                )));
            }
        }

        let types = self.context.types();
        let mut outcomes = Vec::with_capacity(theirs.len());
        for (id, incoming) in theirs {
            let Some(slot) = mine.get_mut(&id) else {
                mine.insert(id, incoming);
                outcomes.push((id, MergeOutcome::Adopted));
                continue;
            };
            let Some(group) = Arc::get_mut(slot) else {
                return Err(PrincipalError::Logic(format!(
                    "cannot merge {}: an outstanding handle still refers to it",
                    slot.description().context()
                )));
            };
            outcomes.push((id, group.merge_group(&incoming, types)?));
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // On-demand production
    // -----------------------------------------------------------------------

    /// Callback handed to groups, present only when on-demand production is
    /// enabled for the job.
    pub(crate) fn filler(&self) -> Option<&dyn OnDemandFiller> {
        if self.context.config().fill_on_demand {
            Some(self)
        } else {
            None
        }
    }
}

impl OnDemandFiller for Principal {
    fn fill_on_demand(&self, module_label: &str) -> PrincipalResult<bool> {
        let Some(handler) = &self.handler else {
            return Ok(false);
        };
        let _guard = self.running.enter(module_label)?;
        debug!(unit = %self.aux, module = module_label, "running unscheduled module");
        handler.try_to_fill(module_label, self)
    }
}

impl GroupFinder for Principal {
    fn find_group_for_product(&self, pid: ProductId) -> PrincipalResult<Option<Arc<Group>>> {
        self.get_group_for_ptr(pid)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("unit", &self.aux)
            .field("group_count", &self.size())
            .field("secondary_count", &self.secondary_count())
            .field("history_len", &self.history.read().expect("lock poisoned").len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Hits, Tracks};
    use crate::reader::InMemoryReader;
    use evp_types::{ErrorCategory, InputTag};

    fn event(ctx: &Arc<JobContext>) -> Principal {
        Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 1)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(ctx))
            .build()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // put
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get_by_label() {
        let ctx = testing::context();
        let p = event(&ctx);
        let desc = testing::description(&ctx, "Hits", "prodA", "p2");
        let pid = p.put_value(Hits(vec![1, 2]), &desc, vec![]).unwrap();
        assert!(pid.is_valid());

        let h = p.get_by_label::<Hits>("prodA", "", "").unwrap();
        assert_eq!(h.0, vec![1, 2]);
        assert_eq!(h.product_id(), pid);

        let err = p.get_by_label::<Hits>("prodB", "", "").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProductNotFound);

        let err = p.put_value(Hits(vec![3]), &desc, vec![]).unwrap_err();
        assert!(matches!(
            err,
            PrincipalError::InsertFailure {
                reason: "AlreadyPresent",
                ..
            }
        ));
    }

    #[test]
    fn put_null_product_fails() {
        let ctx = testing::context();
        let p = event(&ctx);
        let desc = testing::description(&ctx, "Hits", "prodA", "p2");
        let prov = ProductProvenance::new(desc.branch_id(), ProductStatus::Present);
        let err = p.put(None, &desc, prov).unwrap_err();
        assert!(matches!(err, PrincipalError::InsertFailure { reason: "Null Pointer", .. }));
        assert!(err.to_string().contains("(Hits,prodA,,p2,Event)"));
    }

    #[test]
    fn put_without_lineage_entry_fails_with_null_product_id() {
        let ctx = testing::context();
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 2)))
            .build()
            .unwrap();
        // Input branches are not in the lineage of a principal built without one.
        let desc = testing::description(&ctx, "Hits", "reco", "p1");
        let err = p.put_value(Hits(vec![]), &desc, vec![]).unwrap_err();
        assert!(matches!(err, PrincipalError::InsertFailure { reason: "Null Product ID", .. }));
    }

    #[test]
    fn put_with_wrong_type_is_logic_error() {
        let ctx = testing::context();
        let p = event(&ctx);
        let desc = testing::description(&ctx, "Hits", "prodA", "p2");
        let prov = ProductProvenance::new(desc.branch_id(), ProductStatus::Present);
        let err = p.put(Some(Wrapper::boxed(Tracks(1))), &desc, prov).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
    }

    #[test]
    fn invalid_product_id_is_not_found() {
        let ctx = testing::context();
        let p = event(&ctx);
        let err = p.product_id_to_branch_id(ProductId::invalid()).unwrap_err();
        assert!(err.to_string().contains("InvalidID"));
        assert!(p.get_group_for_ptr(ProductId::new(9, 1)).unwrap().is_none());
    }

    #[test]
    fn product_ids_round_trip_through_lineage() {
        let ctx = testing::context();
        let p = event(&ctx);
        let desc = testing::description(&ctx, "Hits", "prodA", "p2");
        let pid = p.put_value(Hits(vec![]), &desc, vec![]).unwrap();
        assert_eq!(p.product_id_to_branch_id(pid).unwrap(), desc.branch_id());
        let group = p.get_group_for_ptr(pid).unwrap().unwrap();
        assert_eq!(group.branch_id(), desc.branch_id());
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    #[test]
    fn producing_principal_extends_history() {
        let ctx = testing::context();
        let p = event(&ctx);
        let history = p.process_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.get(1).unwrap().process_name, "p2");
        assert!(ctx.histories().contains(&p.process_history_id()));
        assert_eq!(p.lineage().len(), 2);
    }

    #[test]
    fn reused_process_name_is_rejected() {
        let ctx = testing::context();
        let p = event(&ctx);
        let err = p.add_to_process_history().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn build_requires_finalized_context() {
        let ctx = JobContext::new(testing::config()).unwrap().shared();
        let err = Principal::builder(ctx, UnitAux::Results).build().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    // -----------------------------------------------------------------------
    // Lazy input groups
    // -----------------------------------------------------------------------

    #[test]
    fn input_groups_are_read_once() {
        let ctx = testing::context();
        let reader = Arc::new(InMemoryReader::new());
        let reco = testing::description(&ctx, "Hits", "reco", "p1");
        reader.insert(reco.key().clone(), Wrapper::boxed(Hits(vec![7])));
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 3)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .reader(reader.clone())
            .build()
            .unwrap()
            .shared();
        assert_eq!(p.add_groups_from_catalog().unwrap(), 2);

        let h = p.get_by_input_tag::<Hits>(&"reco".parse::<InputTag>().unwrap()).unwrap();
        assert_eq!(h.0, vec![7]);
        let again = p.get_by_label::<Hits>("reco", "", "p1").unwrap();
        assert_eq!(again.0, vec![7]);
        assert_eq!(reader.read_count(), 1);
        assert!(reader.group_finder().is_some());
    }

    #[test]
    fn read_immediate_resolves_available_groups() {
        let ctx = testing::context();
        let reader = Arc::new(InMemoryReader::new());
        let reco = testing::description(&ctx, "Hits", "reco", "p1");
        reader.insert(reco.key().clone(), Wrapper::boxed(Hits(vec![1])));
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 4)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .reader(reader)
            .build()
            .unwrap();
        p.add_groups_from_catalog().unwrap();
        assert_eq!(p.read_immediate().unwrap(), 1);
    }

    #[test]
    fn get_for_output_flags_missing_present_products() {
        let ctx = testing::context();
        let mapper = Arc::new(InMemoryBranchMapper::new());
        let reco = testing::description(&ctx, "Hits", "reco", "p1");
        mapper.insert(ProductProvenance::new(reco.branch_id(), ProductStatus::Present));
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 5)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .mapper(mapper)
            .build()
            .unwrap();
        p.add_groups_from_catalog().unwrap();

        let out = p.get_for_output(reco.branch_id(), false).unwrap();
        assert!(out.is_valid());
        assert_eq!(out.provenance().unwrap().status(), ProductStatus::Present);
        let err = p.get_for_output(reco.branch_id(), true).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
        assert!(!p.get_for_output(BranchId::new(999), false).unwrap().is_valid());
        assert_eq!(p.read_provenance_immediate(), 1);
    }

    #[test]
    fn get_for_output_tolerates_missing_run_products() {
        let ctx = testing::context();
        let mapper = Arc::new(InMemoryBranchMapper::new());
        let summary = testing::description(&ctx, "Hits", "summary", "p2");
        mapper.insert(ProductProvenance::new(summary.branch_id(), ProductStatus::Present));
        let run = Principal::builder(ctx.clone(), UnitAux::Run(RunId(2)))
            .mapper(mapper)
            .build()
            .unwrap();
        run.add_group(summary.clone()).unwrap();

        let out = run.get_for_output(summary.branch_id(), true).unwrap();
        assert!(out.is_valid());
        assert!(out.product().is_none());
        assert_eq!(out.provenance().unwrap().status(), ProductStatus::Present);
    }

    // -----------------------------------------------------------------------
    // Secondaries
    // -----------------------------------------------------------------------

    #[test]
    fn secondary_sources_are_probed_in_order() {
        let ctx = testing::context();
        let secondary = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 6)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .build()
            .unwrap();
        secondary
            .put_value(Hits(vec![42]), &testing::description(&ctx, "Hits", "prodA", "p2"), vec![])
            .unwrap();

        let reader = Arc::new(InMemoryReader::new());
        reader.add_secondary(None);
        reader.add_secondary(Some(secondary));
        let primary = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 6)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .reader(reader)
            .build()
            .unwrap();

        let prod_a = testing::description(&ctx, "Hits", "prodA", "p2");
        let group = primary.get_group(prod_a.branch_id()).unwrap().unwrap();
        assert_eq!(group.product().unwrap().get::<Hits>(), Some(&Hits(vec![42])));
        assert_eq!(primary.secondary_count(), 1);

        assert!(primary.get_group(BranchId::new(999)).unwrap().is_none());
        assert!(primary.get_group(BranchId::new(998)).unwrap().is_none());
        assert_eq!(primary.secondary_count(), 1);
    }

    #[test]
    fn secondary_lookup_can_be_disabled() {
        let ctx = testing::context_with(testing::config().with_secondary_lookup(false));
        let secondary = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 7)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .build()
            .unwrap();
        let prod_a = testing::description(&ctx, "Hits", "prodA", "p2");
        secondary.put_value(Hits(vec![1]), &prod_a, vec![]).unwrap();
        let reader = Arc::new(InMemoryReader::new());
        reader.add_secondary(Some(secondary));
        let primary = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 7)))
            .reader(reader)
            .build()
            .unwrap();
        assert!(primary.get_group(prod_a.branch_id()).unwrap().is_none());
        assert_eq!(primary.secondary_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Fragment merging
    // -----------------------------------------------------------------------

    fn run_fragment(ctx: &Arc<JobContext>, hits: Option<Vec<u32>>) -> Principal {
        run_fragment_with(ctx, &[("summary", hits)])
    }

    /// A run fragment holding `Hits` under each label; `None` records the
    /// product as never created.
    fn run_fragment_with(
        ctx: &Arc<JobContext>,
        products: &[(&str, Option<Vec<u32>>)],
    ) -> Principal {
        let run = Principal::builder(ctx.clone(), UnitAux::Run(RunId(1)))
            .build()
            .unwrap();
        for (label, hits) in products {
            let desc = testing::description(ctx, "Hits", label, "p2");
            match hits {
                Some(h) => {
                    run.put_value(Hits(h.clone()), &desc, vec![]).unwrap();
                }
                None => {
                    let prov = ProductProvenance::new(desc.branch_id(), ProductStatus::NeverCreated);
                    run.put(Some(Box::new(Wrapper::<Hits>::absent())), &desc, prov)
                        .unwrap();
                }
            }
        }
        run
    }

    #[test]
    fn run_fragments_merge_through_handler() {
        let ctx = testing::context();
        let first = run_fragment(&ctx, Some(vec![1]));
        let second = run_fragment(&ctx, Some(vec![2, 3]));
        let outcomes = first.merge_fragment(second).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, MergeOutcome::Merged);
        let h = first.get_by_label::<Hits>("summary", "", "").unwrap();
        assert_eq!(h.0, vec![1, 2, 3]);
    }

    #[test]
    fn run_fragments_with_different_status_fail() {
        let ctx = testing::context();
        let first = run_fragment(&ctx, Some(vec![1]));
        let second = run_fragment(&ctx, None);
        let err = first.merge_fragment(second).unwrap_err();
        assert!(matches!(err, PrincipalError::MergeStatusMismatch { .. }));
        assert_eq!(first.size(), 1);
    }

    #[test]
    fn failed_merge_leaves_every_group_untouched() {
        let ctx = testing::context();
        let first = run_fragment_with(
            &ctx,
            &[("summary", Some(vec![1])), ("totals", Some(vec![5]))],
        );
        let second = run_fragment_with(&ctx, &[("summary", Some(vec![2])), ("totals", None)]);
        let err = first.merge_fragment(second).unwrap_err();
        assert!(matches!(err, PrincipalError::MergeStatusMismatch { .. }));
        assert!(err.to_string().contains("moduleLabel = totals"));

        let summary = first.get_by_label::<Hits>("summary", "", "").unwrap();
        assert_eq!(summary.0, vec![1]);
        let totals = first.get_by_label::<Hits>("totals", "", "").unwrap();
        assert_eq!(totals.0, vec![5]);
        assert_eq!(first.size(), 2);
    }

    #[test]
    fn failed_merge_adopts_nothing() {
        let ctx = testing::context();
        let first = run_fragment_with(&ctx, &[("summary", Some(vec![1]))]);
        let second = run_fragment_with(&ctx, &[("summary", None), ("totals", Some(vec![7]))]);
        assert!(first.merge_fragment(second).is_err());
        assert_eq!(first.size(), 1);
        assert!(first.get_by_label::<Hits>("totals", "", "").is_err());
    }

    #[test]
    fn merge_with_outstanding_handle_fails() {
        let ctx = testing::context();
        let first = run_fragment(&ctx, Some(vec![1]));
        let _held = first.get_by_label::<Hits>("summary", "", "").unwrap();
        let second = run_fragment(&ctx, Some(vec![2]));
        let err = first.merge_fragment(second).unwrap_err();
        assert!(err.to_string().contains("outstanding handle"));
    }

    #[test]
    fn event_fragments_cannot_merge() {
        let ctx = testing::context();
        let a = event(&ctx);
        let b = event(&ctx);
        assert!(a.merge_fragment(b).is_err());
    }

    #[test]
    fn parent_links_reach_the_run() {
        let ctx = testing::context();
        let run = Arc::new(Principal::builder(ctx.clone(), UnitAux::Run(RunId(3))).build().unwrap());
        let subrun = Arc::new(
            Principal::builder(ctx.clone(), UnitAux::SubRun(SubRunId::new(3, 1)))
                .parent(run.clone())
                .build()
                .unwrap(),
        );
        let ev = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(3, 1, 1)))
            .parent(subrun)
            .build()
            .unwrap();
        let top = ev.parent().and_then(|s| s.parent()).unwrap();
        assert_eq!(top.aux(), UnitAux::Run(RunId(3)));
        assert_eq!(ev.aux().to_string(), "run: 3 subRun: 1 event: 1");
    }
}
