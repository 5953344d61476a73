use std::collections::HashMap;
use std::sync::RwLock;

use evp_types::{ProcessHistory, ProcessHistoryId};
use tracing::debug;

/// Content-addressed store of every process history seen by the job.
///
/// Insertion is idempotent: the id is a content hash, so inserting the same
/// history twice leaves a single entry. Entries are never replaced.
pub struct ProcessHistoryRegistry {
    histories: RwLock<HashMap<ProcessHistoryId, ProcessHistory>>,
}

impl ProcessHistoryRegistry {
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a history and return its id.
    pub fn insert(&self, history: &ProcessHistory) -> ProcessHistoryId {
        let id = history.id();
        let mut map = self.histories.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| {
            debug!(history = %id.short_hex(), processes = history.len(), "registered process history");
            history.clone()
        });
        id
    }

    pub fn get(&self, id: &ProcessHistoryId) -> Option<ProcessHistory> {
        self.histories.read().expect("lock poisoned").get(id).cloned()
    }

    pub fn contains(&self, id: &ProcessHistoryId) -> bool {
        self.histories.read().expect("lock poisoned").contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.histories.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessHistoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessHistoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHistoryRegistry")
            .field("history_count", &self.len())
            .finish()
    }
}
