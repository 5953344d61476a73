use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::RwLock;

use evp_types::{BranchId, BranchListIndex, BranchType};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, info};

use crate::catalog::ProductCatalog;
use crate::error::{RegistryError, RegistryResult};

/// Branch ids of the event products one process produced, in product-index
/// order.
pub type BranchIdList = Vec<BranchId>;

#[derive(Default)]
struct State {
    lists: Vec<BranchIdList>,
    index: HashMap<BranchId, (BranchListIndex, usize)>,
}

impl State {
    fn rebuild_index(&mut self) {
        self.index.clear();
        for (n, list) in self.lists.iter().enumerate() {
            for (m, id) in list.iter().enumerate() {
                self.index.entry(*id).or_insert((n as BranchListIndex, m));
            }
        }
    }
}

/// Job-wide, append-only sequence of per-process branch-id lists.
///
/// Input files contribute the lists of the processes that wrote them; the
/// current process appends its own list once the catalog is frozen. Every
/// file opened afterwards must agree with the accumulated lists on every
/// process they share.
pub struct BranchIdListRegistry {
    state: RwLock<State>,
}

impl BranchIdListRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Reconcile the lists carried by a newly opened primary file.
    ///
    /// Lists for processes already known must be identical; otherwise the
    /// file is rejected with a report comparing both sides. Lists beyond the
    /// known processes are appended. The incoming ids must already be
    /// expressed as this job's branch ids.
    pub fn update_from_input(&self, incoming: &[BranchIdList], file_name: &str) -> RegistryResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let shared = state.lists.len().min(incoming.len());

        let mut mismatches = String::new();
        for (i, (known, new)) in state.lists.iter().zip(incoming).enumerate() {
            if known != new {
                let _ = write!(mismatches, "Process {}:\n\n", i + 1);
                mismatches.push_str(&mismatch_table(known, new));
                mismatches.push('\n');
                mismatches.push_str(&list_diff(known, new));
                mismatches.push('\n');
            }
        }
        if !mismatches.is_empty() {
            return Err(RegistryError::MismatchedInputFiles {
                file_name: file_name.to_string(),
                report: format!(
                    "Cannot merge file '{file_name}' due to inconsistent process histories:\n\n\
                     {mismatches}\
                     The branch ids above correspond to event products created by the\n\
                     processes that wrote the input files. The lists must be identical\n\
                     per process.\n"
                ),
            });
        }

        let added = incoming.len() - shared;
        state.lists.extend(incoming[shared..].iter().cloned());
        state.rebuild_index();
        info!(
            file = file_name,
            added,
            total = state.lists.len(),
            "merged branch-id lists from input"
        );
        Ok(())
    }

    /// Append the current process's event-product list.
    ///
    /// The list is appended even when empty, so that a later input file
    /// carrying an additional process cannot be concatenated silently.
    pub fn update_from_catalog(&self, catalog: &ProductCatalog) -> RegistryResult<BranchListIndex> {
        let list = catalog.produced_branch_ids(BranchType::Event)?;
        let mut state = self.state.write().expect("lock poisoned");
        let count = list.len();
        state.lists.push(list);
        state.rebuild_index();
        let index = (state.lists.len() - 1) as BranchListIndex;
        debug!(index, products = count, "appended current process branch-id list");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lists(&self) -> Vec<BranchIdList> {
        self.state.read().expect("lock poisoned").lists.clone()
    }

    pub fn list(&self, index: BranchListIndex) -> Option<BranchIdList> {
        self.state
            .read()
            .expect("lock poisoned")
            .lists
            .get(index as usize)
            .cloned()
    }

    /// `(list index, position within list)` for a branch id.
    pub fn index_of(&self, id: BranchId) -> Option<(BranchListIndex, usize)> {
        self.state.read().expect("lock poisoned").index.get(&id).copied()
    }

    pub fn branch_id_at(&self, index: BranchListIndex, position: usize) -> Option<BranchId> {
        self.state
            .read()
            .expect("lock poisoned")
            .lists
            .get(index as usize)
            .and_then(|l| l.get(position))
            .copied()
    }
}

impl Default for BranchIdListRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BranchIdListRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchIdListRegistry")
            .field("list_count", &self.len())
            .finish()
    }
}

/// Two-column side-by-side rendering of a conflicting pair of lists.
fn mismatch_table(known: &[BranchId], new: &[BranchId]) -> String {
    const LEFT: &str = "Previous File";
    const RIGHT: &str = "File to merge";
    let width = |l: &[BranchId], title: &str| {
        l.iter()
            .map(|id| id.to_string().len())
            .max()
            .unwrap_or(0)
            .max(title.len())
    };
    let lw = width(known, LEFT);
    let rw = width(new, RIGHT);

    let mut out = String::new();
    let _ = writeln!(out, "  {LEFT:<lw$}    {RIGHT:<rw$}");
    let _ = writeln!(out, "  {}", "=".repeat(lw + rw + 4));
    for m in 0..known.len().max(new.len()) {
        let l = known.get(m).map(|id| id.to_string()).unwrap_or_default();
        let r = new.get(m).map(|id| id.to_string()).unwrap_or_default();
        let _ = writeln!(out, "  {l:<lw$}    {r:<rw$}");
    }
    out
}

/// Line diff of two lists, one id per line.
fn list_diff(known: &[BranchId], new: &[BranchId]) -> String {
    let render = |l: &[BranchId]| {
        l.iter().map(|id| format!("{id}\n")).collect::<String>()
    };
    let old = render(known);
    let new = render(new);
    let diff = TextDiff::from_lines(&old, &new);

    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        let _ = write!(out, "  {sign}{change}");
    }
    out
}
