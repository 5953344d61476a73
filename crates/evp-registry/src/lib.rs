//! Job-scoped registries for the event-product core.
//!
//! State that would otherwise sit in process-wide singletons
//! lives here, bundled into a [`JobContext`] that is created at job start and
//! handed to every principal by `Arc`.
//!
//! - [`ProductCatalog`] — every branch known to the job, frozen once
//! - [`BranchIdListRegistry`] — per-process branch-id lists used for `ProductId` translation
//! - [`Lineage`] — a unit's view of those lists, translating `ProductId` ⇄ `BranchId`
//! - [`ProcessHistoryRegistry`] — content-addressed process histories
//! - [`JobConfig`] — TOML-loadable job settings

pub mod branch_lists;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod lineage;

pub use branch_lists::{BranchIdList, BranchIdListRegistry};
pub use catalog::{ProcessLookup, ProductCatalog};
pub use config::JobConfig;
pub use context::JobContext;
pub use error::{RegistryError, RegistryResult};
pub use history::ProcessHistoryRegistry;
pub use lineage::Lineage;
