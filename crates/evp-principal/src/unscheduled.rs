use std::sync::Mutex;

use crate::error::{PrincipalError, PrincipalResult};
use crate::principal::Principal;

/// Runs the producing step for an on-demand module.
///
/// Implementations are expected to compute the module's products and `put`
/// them into the principal they are given. Returning `Ok(false)` means the
/// module could not run.
pub trait UnscheduledHandler: Send + Sync {
    fn try_to_fill(&self, module_label: &str, principal: &Principal) -> PrincipalResult<bool>;
}

/// Callback a group uses to ask its owning principal for on-demand
/// production.
pub trait OnDemandFiller {
    fn fill_on_demand(&self, module_label: &str) -> PrincipalResult<bool>;
}

/// Stack of module labels whose on-demand production is in flight.
#[derive(Debug, Default)]
pub(crate) struct RunningModules {
    labels: Mutex<Vec<String>>,
}

impl RunningModules {
    /// Push `label`, failing if it is already running further up the chain.
    pub(crate) fn enter(&self, label: &str) -> PrincipalResult<RunningGuard<'_>> {
        let mut labels = self.labels.lock().expect("lock poisoned");
        if labels.iter().any(|l| l == label) {
            let mut chain = labels.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(label);
            return Err(PrincipalError::Logic(format!(
                "Hit circular dependency while trying to run an unscheduled module.\n\
                 Current chain: {chain}"
            )));
        }
        labels.push(label.to_string());
        Ok(RunningGuard { modules: self })
    }

    pub(crate) fn depth(&self) -> usize {
        self.labels.lock().expect("lock poisoned").len()
    }
}

/// Pops its label when dropped, including on error paths.
pub(crate) struct RunningGuard<'a> {
    modules: &'a RunningModules,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut labels) = self.modules.labels.lock() {
            labels.pop();
        }
    }
}
