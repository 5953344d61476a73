//! References between products and associations over them.
//!
//! A [`Ptr`] names one element of a collection product by product id and
//! key. [`Assns`] relates elements of two collections, optionally with data
//! per pair. [`FindOne`] and [`FindMany`] join a reference collection
//! against an association. [`PtrRemapper`] and the flattening helpers carry
//! references across when products from a secondary source are mixed into
//! the output event.

pub mod assns;
pub mod error;
pub mod find;
pub mod flatten;
pub mod ptr;
pub mod remap;

#[cfg(test)]
pub(crate) mod testing;

pub use assns::Assns;
pub use error::{AssnsError, AssnsResult};
pub use find::{FindMany, FindOne};
pub use flatten::{flatten_collections, flatten_ptr_collections};
pub use ptr::{ptr_vector, Ptr};
pub use remap::{ProdTransMap, PtrRemapper};
