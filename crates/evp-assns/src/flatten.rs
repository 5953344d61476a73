//! Concatenation of collections gathered from several sources.

use evp_types::ProductId;

use crate::error::{AssnsError, AssnsResult};
use crate::ptr::Ptr;

/// Concatenate `inputs`. The second vector holds the offset at which each
/// input starts in the output, for remapping references into it.
pub fn flatten_collections<T: Clone>(inputs: &[&[T]]) -> (Vec<T>, Vec<usize>) {
    let total = inputs.iter().map(|c| c.len()).sum();
    let mut out = Vec::with_capacity(total);
    let mut offsets = Vec::with_capacity(inputs.len());
    for input in inputs {
        offsets.push(out.len());
        out.extend_from_slice(input);
    }
    (out, offsets)
}

/// Concatenate collections of references. Every non-null reference across
/// all inputs must point into the same product.
pub fn flatten_ptr_collections<T>(inputs: &[&[Ptr<T>]]) -> AssnsResult<(Vec<Ptr<T>>, Vec<usize>)> {
    verify_ptr_collections(inputs)?;
    Ok(flatten_collections(inputs))
}

fn verify_ptr_collections<T>(inputs: &[&[Ptr<T>]]) -> AssnsResult<()> {
    let mut seen: Option<ProductId> = None;
    for ptr in inputs.iter().flat_map(|c| c.iter()).filter(|p| !p.is_null()) {
        match seen {
            None => seen = Some(ptr.product_id()),
            Some(id) if id == ptr.product_id() => {}
            Some(_) => {
                return Err(AssnsError::Logic(
                    "Cannot concatenate this set of containers of Ptr because they do not \
                     refer to the same collection"
                        .into(),
                ))
            }
        }
    }
    Ok(())
}
