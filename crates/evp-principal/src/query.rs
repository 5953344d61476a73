//! Product queries against a principal.
//!
//! Every query walks the frozen catalog's type index: the current process
//! first, then the unit's process history from newest to oldest. Single
//! result queries stop at the first process with a match and fail unless
//! exactly one product matched there.

use std::sync::Arc;

use evp_registry::ProcessLookup;
use evp_types::{BranchId, InputTag, ProductId, TypeTag};

use crate::error::{PrincipalError, PrincipalResult};
use crate::group::Group;
use crate::handle::Handle;
use crate::principal::Principal;
use crate::selector::{input_tag_selector, label_selector, MatchAllSelector, Selector};

impl Principal {
    /// Groups holding a present product of type `wanted` that `selector`
    /// accepts.
    pub fn find_groups_for_product(
        &self,
        wanted: TypeTag,
        selector: &dyn Selector,
        stop_if_process_has_match: bool,
    ) -> PrincipalResult<Vec<Arc<Group>>> {
        let Some(name) = self.context().types().friendly_name(wanted) else {
            return Ok(Vec::new());
        };
        match self.context().catalog().product_lookup(self.branch_type(), &name) {
            Some(lookup) => self.find_groups(lookup, selector, stop_if_process_has_match),
            None => Ok(Vec::new()),
        }
    }

    /// Sequence products whose element type has the friendly name
    /// `element_name`.
    pub fn get_matching_sequence(
        &self,
        element_name: &str,
        selector: &dyn Selector,
        stop_if_process_has_match: bool,
    ) -> PrincipalResult<Vec<Arc<Group>>> {
        match self
            .context()
            .catalog()
            .element_lookup(self.branch_type(), element_name)
        {
            Some(lookup) => self.find_groups(lookup, selector, stop_if_process_has_match),
            None => Ok(Vec::new()),
        }
    }

    fn find_groups(
        &self,
        lookup: &ProcessLookup,
        selector: &dyn Selector,
        stop_if_process_has_match: bool,
    ) -> PrincipalResult<Vec<Arc<Group>>> {
        let mut found = Vec::new();
        let current = self.context().process_name().to_string();
        if let Some(ids) = lookup.get(&current) {
            self.find_groups_for_process(ids, selector, &mut found)?;
            if stop_if_process_has_match && !found.is_empty() {
                return Ok(found);
            }
        }

        let history = self.process_history();
        for process in history.iter_newest_first() {
            if process.process_name == current {
                continue;
            }
            let Some(ids) = lookup.get(&process.process_name) else {
                continue;
            };
            self.find_groups_for_process(ids, selector, &mut found)?;
            if stop_if_process_has_match && !found.is_empty() {
                break;
            }
        }
        Ok(found)
    }

    fn find_groups_for_process(
        &self,
        ids: &[BranchId],
        selector: &dyn Selector,
        found: &mut Vec<Arc<Group>>,
    ) -> PrincipalResult<()> {
        for &id in ids {
            let Some(group) = self.get_group(id)? else {
                continue;
            };
            if !selector.matches(group.description()) || group.product_unavailable() {
                continue;
            }
            if !group.resolve_product(group.produced_type(), self.filler())? {
                continue;
            }
            if group.product().is_some_and(|p| p.is_present()) {
                found.push(group);
            }
        }
        Ok(())
    }

    /// Exactly one `T` accepted by `selector`.
    pub fn get_by_selector<T: 'static>(&self, selector: &dyn Selector) -> PrincipalResult<Handle<T>> {
        let wanted = TypeTag::of::<T>();
        let mut groups = self.find_groups_for_product(wanted, selector, true)?;
        match groups.len() {
            0 => Err(PrincipalError::ProductNotFound(format!(
                "Found zero products matching all criteria\n\
                 Looking for type: {}\n{}",
                self.type_name(wanted),
                looking_for(selector)
            ))),
            1 => Handle::new(groups.remove(0)),
            n => Err(PrincipalError::ProductNotFound(format!(
                "Found {n} products rather than one which match all criteria\n\
                 Looking for type: {}\n{}",
                self.type_name(wanted),
                looking_for(selector)
            ))),
        }
    }

    /// Exactly one `T` with this label and instance. An empty `process`
    /// matches any process, newest first.
    pub fn get_by_label<T: 'static>(
        &self,
        label: &str,
        instance: &str,
        process: &str,
    ) -> PrincipalResult<Handle<T>> {
        self.get_by_selector(&label_selector(label, instance, process))
    }

    pub fn get_by_input_tag<T: 'static>(&self, tag: &InputTag) -> PrincipalResult<Handle<T>> {
        self.get_by_selector(&input_tag_selector(tag))
    }

    /// Every `T` accepted by `selector`, across all processes.
    pub fn get_many<T: 'static>(&self, selector: &dyn Selector) -> PrincipalResult<Vec<Handle<T>>> {
        self.find_groups_for_product(TypeTag::of::<T>(), selector, false)?
            .into_iter()
            .map(Handle::new)
            .collect()
    }

    pub fn get_many_by_type<T: 'static>(&self) -> PrincipalResult<Vec<Handle<T>>> {
        self.get_many(&MatchAllSelector)
    }

    /// The `T` a stored product reference points to.
    pub fn get_by_product_id<T: 'static>(&self, pid: ProductId) -> PrincipalResult<Handle<T>> {
        let group = self.get_group_for_ptr(pid)?.ok_or_else(|| {
            PrincipalError::ProductNotFound(format!("no product with id {pid} in {}", self.aux()))
        })?;
        if !group.product().is_some_and(|p| p.is_present()) {
            return Err(PrincipalError::ProductNotFound(format!(
                "product {} with id {pid} is not available",
                group.description().context()
            )));
        }
        Handle::new(group)
    }

    fn type_name(&self, tag: TypeTag) -> String {
        self.context()
            .types()
            .friendly_name(tag)
            .unwrap_or_else(|| tag.name().to_string())
    }
}

fn looking_for(selector: &dyn Selector) -> String {
    selector
        .describe()
        .lines()
        .map(|line| format!("Looking for {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::UnitAux;
    use crate::selector::{ModuleLabelSelector, ProcessNameSelector};
    use crate::testing::{self, Hit, HitCollection, Hits, Tracks};
    use crate::unscheduled::UnscheduledHandler;
    use evp_registry::JobContext;
    use evp_types::{ErrorCategory, EventId};
    use std::sync::Mutex;

    fn event(ctx: &Arc<JobContext>) -> Principal {
        Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 1)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(ctx))
            .build()
            .unwrap()
    }

    #[test]
    fn ambiguous_match_reports_count() {
        let ctx = testing::context();
        let p = event(&ctx);
        p.put_value(Hits(vec![1]), &testing::description(&ctx, "Hits", "prodA", "p2"), vec![])
            .unwrap();
        p.put_value(Hits(vec![2]), &testing::description(&ctx, "Hits", "other", "p2"), vec![])
            .unwrap();

        let err = p
            .get_by_selector::<Hits>(&ProcessNameSelector::new("p2"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProductNotFound);
        assert!(err.to_string().contains("Found 2 products rather than one"));

        let many = p.get_many::<Hits>(&ProcessNameSelector::new("p2")).unwrap();
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn zero_match_message_lists_criteria() {
        let ctx = testing::context();
        let p = event(&ctx);
        let err = p.get_by_label::<Hits>("nothing", "inst", "p9").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Found zero products matching all criteria"));
        assert!(text.contains("Looking for type: Hits"));
        assert!(text.contains("Looking for module label: 'nothing'"));
        assert!(text.contains("Looking for product instance name: 'inst'"));
        assert!(text.contains("Looking for process name: 'p9'"));
    }

    #[test]
    fn unregistered_type_matches_nothing() {
        struct Unknown;
        let ctx = testing::context();
        let p = event(&ctx);
        assert!(p.get_many_by_type::<Unknown>().unwrap().is_empty());
        assert!(p.get_by_label::<Unknown>("prodA", "", "").is_err());
    }

    #[test]
    fn current_process_is_searched_before_history() {
        let ctx = testing::context();
        let reader = Arc::new(crate::reader::InMemoryReader::new());
        let tracks_in = testing::description(&ctx, "Tracks", "reco", "p1");
        reader.insert(tracks_in.key().clone(), evp_types::Wrapper::boxed(Tracks(1)));
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 1)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(&ctx))
            .reader(reader)
            .build()
            .unwrap();
        p.add_groups_from_catalog().unwrap();
        p.put_value(Tracks(2), &testing::description(&ctx, "Tracks", "prodA", "p2"), vec![])
            .unwrap();

        let newest = p.get_by_selector::<Tracks>(&crate::selector::MatchAllSelector).unwrap();
        assert_eq!(*newest, Tracks(2));
        let all = p.get_many_by_type::<Tracks>().unwrap();
        let values: Vec<u32> = all.iter().map(|h| h.0).collect();
        assert_eq!(values, vec![2, 1]);

        let old = p.get_by_label::<Tracks>("reco", "", "p1").unwrap();
        assert_eq!(*old, Tracks(1));
    }

    #[test]
    fn sequences_are_found_by_element_type() {
        let ctx = testing::context();
        let p = event(&ctx);
        let coll = testing::description(&ctx, "HitCollection", "coll", "p2");
        p.put_value(HitCollection(vec![Hit(1), Hit(2)]), &coll, vec![])
            .unwrap();
        let groups = p
            .get_matching_sequence("Hit", &ModuleLabelSelector::new("coll"), true)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].branch_id(), coll.branch_id());
        assert!(p
            .get_matching_sequence("Track", &MatchAllSelector, true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn get_by_product_id_follows_the_reference() {
        let ctx = testing::context();
        let p = event(&ctx);
        let desc = testing::description(&ctx, "Hits", "prodA", "p2");
        let pid = p.put_value(Hits(vec![8]), &desc, vec![]).unwrap();
        assert_eq!(p.get_by_product_id::<Hits>(pid).unwrap().0, vec![8]);
        let err = p.get_by_product_id::<Hits>(ProductId::new(7, 7)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProductNotFound);
    }

    // -----------------------------------------------------------------------
    // On-demand production
    // -----------------------------------------------------------------------

    struct Maker {
        calls: Mutex<Vec<String>>,
        nested: Option<&'static str>,
    }

    impl UnscheduledHandler for Maker {
        fn try_to_fill(&self, module_label: &str, principal: &Principal) -> PrincipalResult<bool> {
            self.calls
                .lock()
                .unwrap()
                .push(module_label.to_string());
            if let Some(dependency) = self.nested {
                principal.get_by_label::<Hits>(dependency, "", "")?;
            }
            let desc = testing::description(principal.context(), "Hits", module_label, "p2");
            principal.put_value(Hits(vec![99]), &desc, vec![])?;
            Ok(true)
        }
    }

    fn on_demand_event(ctx: &Arc<JobContext>, handler: Arc<Maker>) -> Principal {
        let p = Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 1)))
            .history(testing::input_history())
            .lineage(testing::input_lineage(ctx))
            .unscheduled_handler(handler)
            .build()
            .unwrap();
        p.add_on_demand_group(testing::description(ctx, "Hits", "maker", "p2"))
            .unwrap();
        p
    }

    #[test]
    fn on_demand_product_is_made_on_first_access() {
        let ctx = testing::context();
        let handler = Arc::new(Maker {
            calls: Mutex::new(Vec::new()),
            nested: None,
        });
        let p = on_demand_event(&ctx, handler.clone());
        let h = p.get_by_label::<Hits>("maker", "", "").unwrap();
        assert_eq!(h.0, vec![99]);
        p.get_by_label::<Hits>("maker", "", "").unwrap();
        assert_eq!(*handler.calls.lock().unwrap(), vec!["maker".to_string()]);
    }

    #[test]
    fn on_demand_cycle_is_a_logic_error() {
        let ctx = testing::context();
        let handler = Arc::new(Maker {
            calls: Mutex::new(Vec::new()),
            nested: Some("maker"),
        });
        let p = on_demand_event(&ctx, handler);
        let err = p.get_by_label::<Hits>("maker", "", "").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn disabled_on_demand_leaves_group_pending() {
        let ctx = testing::context_with(testing::config().with_fill_on_demand(false));
        let handler = Arc::new(Maker {
            calls: Mutex::new(Vec::new()),
            nested: None,
        });
        let p = on_demand_event(&ctx, handler.clone());
        assert!(p.get_by_label::<Hits>("maker", "", "").is_err());
        assert!(handler.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn on_demand_groups_are_event_only() {
        let ctx = testing::context();
        let run = Principal::builder(ctx.clone(), UnitAux::Run(evp_types::RunId(1)))
            .build()
            .unwrap();
        let err = run
            .add_on_demand_group(testing::description(&ctx, "Hits", "summary", "p2"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
    }
}
