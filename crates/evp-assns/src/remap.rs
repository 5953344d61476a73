use std::collections::BTreeMap;

use evp_principal::Principal;
use evp_types::{BranchId, ProductId};
use tracing::debug;

use crate::assns::Assns;
use crate::error::{AssnsError, AssnsResult};
use crate::ptr::Ptr;

/// Product id translation from a secondary source into the output event.
pub type ProdTransMap = BTreeMap<ProductId, ProductId>;

/// Rewrites references read from a secondary event so that they point into
/// the collections made from it in the output event.
///
/// Each rewritten reference keeps its key plus the offset at which its
/// source collection was placed in the flattened output.
#[derive(Clone, Debug, Default)]
pub struct PtrRemapper {
    map: ProdTransMap,
}

impl PtrRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: ProdTransMap) -> Self {
        Self { map }
    }

    /// Build from `(incoming, outgoing)` branch id pairs: `incoming` is
    /// translated through the secondary principal, `outgoing` through the
    /// output principal.
    pub fn build(
        branch_pairs: &[(BranchId, BranchId)],
        secondary: &Principal,
        output: &Principal,
    ) -> AssnsResult<Self> {
        let mut map = ProdTransMap::new();
        for &(incoming, outgoing) in branch_pairs {
            let from = secondary.branch_id_to_product_id(incoming)?;
            let to = output.branch_id_to_product_id(outgoing)?;
            map.insert(from, to);
        }
        debug!(entries = map.len(), "built product id translation");
        Ok(Self { map })
    }

    pub fn insert(&mut self, from: ProductId, to: ProductId) {
        self.map.insert(from, to);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn translate(&self, pid: ProductId) -> AssnsResult<ProductId> {
        self.map.get(&pid).copied().ok_or_else(|| {
            AssnsError::Logic(format!(
                "PtrRemapper: no translation for product id {pid}; the product it \
                 refers to was not mixed into the output"
            ))
        })
    }

    /// Null references stay null.
    pub fn remap<T>(&self, ptr: Ptr<T>, offset: usize) -> AssnsResult<Ptr<T>> {
        if ptr.is_null() {
            return Ok(ptr);
        }
        Ok(Ptr::new(self.translate(ptr.product_id())?, ptr.key() + offset))
    }

    pub fn remap_collection<T>(&self, ptrs: &[Ptr<T>], offset: usize) -> AssnsResult<Vec<Ptr<T>>> {
        ptrs.iter().map(|p| self.remap(*p, offset)).collect()
    }

    /// Rewrite both sides of every pair; data is carried over unchanged.
    pub fn remap_assns<L, R, D: Clone>(
        &self,
        assns: &Assns<L, R, D>,
        left_offset: usize,
        right_offset: usize,
    ) -> AssnsResult<Assns<L, R, D>> {
        let pairs = assns
            .pairs()
            .iter()
            .map(|(l, r)| -> AssnsResult<_> {
                Ok((self.remap(*l, left_offset)?, self.remap(*r, right_offset)?))
            })
            .collect::<AssnsResult<Vec<_>>>()?;
        Ok(Assns::from_parts(pairs, assns.data_values().map(<[D]>::to_vec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Hit, Track};
    use evp_types::ErrorCategory;

    struct Mixed {
        remapper: PtrRemapper,
        secondary_hits: ProductId,
        secondary_tracks: ProductId,
        output_hits: ProductId,
        output_tracks: ProductId,
    }

    fn mixed() -> Mixed {
        let ctx = testing::context();
        let secondary = testing::event(&ctx);
        let output = testing::event(&ctx);

        let in_hits = testing::description_in(&ctx, "Hits", "hits", "p1");
        let in_tracks = testing::description_in(&ctx, "Tracks", "tracks", "p1");
        let out_hits = testing::description(&ctx, "Hits", "mixed");
        let out_tracks = testing::description(&ctx, "Tracks", "mixed");

        let secondary_hits = secondary
            .put_value(vec![Hit(1), Hit(2)], &in_hits, vec![])
            .unwrap();
        let secondary_tracks = secondary
            .put_value(vec![Track(1)], &in_tracks, vec![])
            .unwrap();

        let remapper = PtrRemapper::build(
            &[
                (in_hits.branch_id(), out_hits.branch_id()),
                (in_tracks.branch_id(), out_tracks.branch_id()),
            ],
            &secondary,
            &output,
        )
        .unwrap();
        Mixed {
            remapper,
            secondary_hits,
            secondary_tracks,
            output_hits: output.branch_id_to_product_id(out_hits.branch_id()).unwrap(),
            output_tracks: output.branch_id_to_product_id(out_tracks.branch_id()).unwrap(),
        }
    }

    #[test]
    fn remap_translates_and_offsets() {
        let m = mixed();
        assert_eq!(m.remapper.len(), 2);
        let old = Ptr::<Hit>::new(m.secondary_hits, 1);
        let new = m.remapper.remap(old, 10).unwrap();
        assert_eq!(new.product_id(), m.output_hits);
        assert_eq!(new.key(), 11);
        assert!(m.remapper.remap(Ptr::<Hit>::null(), 3).unwrap().is_null());
    }

    #[test]
    fn unknown_product_is_a_logic_error() {
        let m = mixed();
        let err = m
            .remapper
            .remap(Ptr::<Hit>::new(ProductId::new(9, 9), 0), 0)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
    }

    #[test]
    fn remap_assns_offsets_each_side() {
        let m = mixed();
        let mut assns = Assns::<Track, Hit, u8>::new();
        assns
            .add_with_data(Ptr::new(m.secondary_tracks, 0), Ptr::new(m.secondary_hits, 1), 4)
            .unwrap();
        let out = m.remapper.remap_assns(&assns, 5, 20).unwrap();
        let (t, h) = *out.at(0).unwrap();
        assert_eq!(t, Ptr::new(m.output_tracks, 5));
        assert_eq!(h, Ptr::new(m.output_hits, 21));
        assert_eq!(*out.data(0).unwrap(), 4);
    }

    #[test]
    fn remap_collection_keeps_order() {
        let m = mixed();
        let ptrs: Vec<Ptr<Hit>> = (0..3).map(|k| Ptr::new(m.secondary_hits, k)).collect();
        let out = m.remapper.remap_collection(&ptrs, 2).unwrap();
        let keys: Vec<usize> = out.iter().map(Ptr::key).collect();
        assert_eq!(keys, vec![2, 3, 4]);
    }
}
