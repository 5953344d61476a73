//! Per-unit product containers for the event-product core.
//!
//! A [`Principal`] holds the products of one run, subrun, event or results
//! unit in [`Group`]s. Products are read lazily through a [`DelayedReader`],
//! made on demand by an [`UnscheduledHandler`], or put directly by the
//! current process. Queries select groups with composable [`Selector`]s and
//! hand out typed [`Handle`]s.
//!
//! # Key Types
//!
//! - [`Principal`] — Groups of one unit plus process history and lineage
//! - [`Group`] — Write-once cache and provenance for one product
//! - [`Handle`] — Typed, read-only view of a resolved product
//! - [`BranchMapper`] — Branch id to provenance lookup
//! - [`DelayedReader`] — Storage backend interface

pub mod error;
pub mod group;
pub mod handle;
pub mod mapper;
pub mod principal;
mod query;
pub mod reader;
pub mod selector;
pub mod unscheduled;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PrincipalError, PrincipalResult, ReaderError};
pub use group::{Group, GroupState, MergeOutcome};
pub use handle::{Handle, OutputHandle, Provenance};
pub use mapper::{BranchMapper, InMemoryBranchMapper, ProvenanceSource};
pub use principal::{Principal, PrincipalBuilder, UnitAux};
pub use reader::{DelayedReader, GroupFinder, InMemoryReader, NoDelayedReader, SecondaryOpen};
pub use selector::{
    label_selector, MatchAllSelector, ModuleLabelSelector, ProcessNameSelector,
    ProductInstanceNameSelector, Selector,
};
pub use unscheduled::{OnDemandFiller, UnscheduledHandler};
