use std::sync::{Arc, OnceLock};

use evp_types::{BranchDescription, BranchListIndex, ProcessConfiguration, ProductTypes};
use tracing::info;

use crate::branch_lists::{BranchIdList, BranchIdListRegistry};
use crate::catalog::ProductCatalog;
use crate::config::JobConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::history::ProcessHistoryRegistry;

/// Process-scoped state shared by every principal of one job.
///
/// Lifecycle:
/// 1. [`JobContext::new`] at job start, then register product types and
///    branches.
/// 2. [`freeze_catalog`](Self::freeze_catalog) to assign branch ids, then
///    [`merge_input_lists`](Self::merge_input_lists) for the first primary
///    file, if any.
/// 3. [`finalize`](Self::finalize) once: freezes the catalog if that has not
///    happened yet and appends the current process's branch-id list.
/// 4. Share with [`JobContext::shared`] and hand the `Arc` to principals.
///
/// The context is torn down when the last principal holding it is dropped.
#[derive(Debug)]
pub struct JobContext {
    config: JobConfig,
    process: ProcessConfiguration,
    catalog: ProductCatalog,
    branch_lists: BranchIdListRegistry,
    histories: ProcessHistoryRegistry,
    types: ProductTypes,
    current_list: OnceLock<BranchListIndex>,
}

impl JobContext {
    pub fn new(config: JobConfig) -> RegistryResult<Self> {
        config.validate()?;
        let process = config.process_configuration();
        Ok(Self {
            config,
            process,
            catalog: ProductCatalog::new(),
            branch_lists: BranchIdListRegistry::new(),
            histories: ProcessHistoryRegistry::new(),
            types: ProductTypes::new(),
            current_list: OnceLock::new(),
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Register a branch with the catalog.
    pub fn add_branch(&self, description: BranchDescription) -> RegistryResult<()> {
        self.catalog.add(description)
    }

    /// Assign branch ids without appending the current process's list.
    pub fn freeze_catalog(&self) -> RegistryResult<()> {
        self.catalog.freeze()
    }

    pub fn merge_input_lists(&self, lists: &[BranchIdList], file_name: &str) -> RegistryResult<()> {
        self.branch_lists.update_from_input(lists, file_name)
    }

    /// Freeze the catalog and record the current process's list. Returns the
    /// list index event principals push onto their lineage.
    pub fn finalize(&self) -> RegistryResult<BranchListIndex> {
        if self.current_list.get().is_some() {
            return Err(RegistryError::CatalogFrozen);
        }
        if !self.catalog.is_frozen() {
            self.catalog.freeze()?;
        }
        let index = self.branch_lists.update_from_catalog(&self.catalog)?;
        let _ = self.current_list.set(index);
        info!(
            process = %self.process.process_name,
            branches = self.catalog.len(),
            list_index = index,
            "job context finalized"
        );
        Ok(index)
    }

    /// Index of the current process's branch-id list, once finalized.
    pub fn current_list_index(&self) -> Option<BranchListIndex> {
        self.current_list.get().copied()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn process_configuration(&self) -> &ProcessConfiguration {
        &self.process
    }

    pub fn process_name(&self) -> &str {
        &self.process.process_name
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn branch_lists(&self) -> &BranchIdListRegistry {
        &self.branch_lists
    }

    pub fn histories(&self) -> &ProcessHistoryRegistry {
        &self.histories
    }

    pub fn types(&self) -> &ProductTypes {
        &self.types
    }
}
