//! Foundation types for the event-product core (EVP).
//!
//! This crate provides the identity, provenance, and type-erasure primitives
//! shared by every other EVP crate. Nothing here performs I/O or holds
//! process-wide state.
//!
//! # Key Types
//!
//! - [`BranchKey`] — Natural identity of a product (type, label, instance, process, unit kind)
//! - [`BranchId`] — Dense, process-local surrogate for a `BranchKey`
//! - [`ProductId`] — File-portable `(processIndex, productIndex)` reference
//! - [`BranchDescription`] — Immutable schema metadata for one branch
//! - [`ProcessHistory`] — Ordered record of the processes that touched a unit
//! - [`ProductProvenance`] — Creation status and parentage of one product
//! - [`EdProduct`] — Capability interface over a type-erased product
//! - [`ProductTypes`] — Type-tag to merge/equality handler registry

pub mod branch;
pub mod description;
pub mod error;
pub mod process;
pub mod product;
pub mod provenance;
pub mod tag;
pub mod unit;

pub use branch::{BranchId, BranchKey, BranchListIndex, BranchType, ProductId};
pub use description::BranchDescription;
pub use error::{ErrorCategory, TypeError, TypeResult};
pub use process::{ProcessConfiguration, ProcessHistory, ProcessHistoryId};
pub use product::{EdProduct, ProductBox, ProductTypes, TypeTag, Wrapper};
pub use provenance::{ProductProvenance, ProductStatus};
pub use tag::InputTag;
pub use unit::{EventId, RunId, SubRunId};
