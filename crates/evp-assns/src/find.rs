//! Join lookups over an association.
//!
//! Given a reference collection of `A` and an `Assns<A, B, D>`, [`FindOne`]
//! and [`FindMany`] answer "which `B` (and data) go with the i-th `A`".
//! Both are built in one pass over the association.
//!
//! Construction against an association that cannot be found succeeds and
//! yields an invalid object; only accessing it fails.

use std::collections::HashMap;

use evp_principal::{Handle, Principal, PrincipalError};
use evp_types::InputTag;
use tracing::debug;

use crate::assns::Assns;
use crate::error::{AssnsError, AssnsResult};
use crate::ptr::Ptr;

/// Fetch the association named by `tag`; a missing product is `None`.
fn lookup_assns<A, B, D>(
    principal: &Principal,
    tag: &InputTag,
) -> AssnsResult<Option<Handle<Assns<A, B, D>>>>
where
    A: 'static,
    B: 'static,
    D: Send + Sync + 'static,
{
    match principal.get_by_input_tag::<Assns<A, B, D>>(tag) {
        Ok(handle) => Ok(Some(handle)),
        Err(PrincipalError::ProductNotFound(reason)) => {
            debug!(tag = %tag, reason = %reason, "association not found; lookup is invalid");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn invalid(tag: Option<&InputTag>) -> AssnsError {
    AssnsError::ProductNotFound(match tag {
        Some(tag) => format!("invalid Find object: association '{tag}' was not found"),
        None => "invalid Find object: no association".to_string(),
    })
}

/// Index every pair by its left reference.
fn index_by_left<A, B, D>(assns: &Assns<A, B, D>) -> HashMap<Ptr<A>, Vec<usize>> {
    let mut index: HashMap<Ptr<A>, Vec<usize>> = HashMap::new();
    for (i, (left, _)) in assns.pairs().iter().enumerate() {
        index.entry(*left).or_default().push(i);
    }
    index
}

// ---------------------------------------------------------------------------
// FindMany
// ---------------------------------------------------------------------------

/// All `B`s (and data) associated with each element of a reference
/// collection.
pub struct FindMany<B, D = ()> {
    found: Option<Found<Vec<Ptr<B>>, Vec<D>>>,
    tag: Option<InputTag>,
}

struct Found<P, Q> {
    refs: Vec<P>,
    data: Option<Vec<Q>>,
}

impl<B, D: Clone> FindMany<B, D> {
    pub fn from_assns<A>(refs: impl IntoIterator<Item = Ptr<A>>, assns: &Assns<A, B, D>) -> Self {
        let index = index_by_left(assns);
        let data = assns.data_values();
        let mut found = Found {
            refs: Vec::new(),
            data: data.map(|_| Vec::new()),
        };
        for a in refs {
            let hits = index.get(&a).map(Vec::as_slice).unwrap_or(&[]);
            found
                .refs
                .push(hits.iter().map(|&i| assns.pairs()[i].1).collect());
            if let (Some(out), Some(values)) = (found.data.as_mut(), data) {
                out.push(hits.iter().map(|&i| values[i].clone()).collect());
            }
        }
        Self {
            found: Some(found),
            tag: None,
        }
    }
}

impl<B: 'static, D: Clone + Send + Sync + 'static> FindMany<B, D> {
    /// Look up `Assns<A, B, D>` by tag in `principal` and join it against
    /// `refs`. A missing association gives an invalid object.
    pub fn new<A: 'static>(
        refs: impl IntoIterator<Item = Ptr<A>>,
        principal: &Principal,
        tag: &InputTag,
    ) -> AssnsResult<Self> {
        let Some(assns) = lookup_assns::<A, B, D>(principal, tag)? else {
            return Ok(Self {
                found: None,
                tag: Some(tag.clone()),
            });
        };
        let mut find = Self::from_assns(refs, assns.get());
        find.tag = Some(tag.clone());
        Ok(find)
    }
}

impl<B, D> FindMany<B, D> {
    pub fn is_valid(&self) -> bool {
        self.found.is_some()
    }

    fn found(&self) -> AssnsResult<&Found<Vec<Ptr<B>>, Vec<D>>> {
        self.found.as_ref().ok_or_else(|| invalid(self.tag.as_ref()))
    }

    /// Length of the reference collection.
    pub fn size(&self) -> AssnsResult<usize> {
        Ok(self.found()?.refs.len())
    }

    pub fn at(&self, index: usize) -> AssnsResult<&[Ptr<B>]> {
        let found = self.found()?;
        found
            .refs
            .get(index)
            .map(Vec::as_slice)
            .ok_or(AssnsError::OutOfRange {
                index,
                len: found.refs.len(),
            })
    }

    pub fn data(&self, index: usize) -> AssnsResult<&[D]> {
        let found = self.found()?;
        let data = found
            .data
            .as_ref()
            .ok_or_else(|| AssnsError::Logic("association carries no data".into()))?;
        data.get(index)
            .map(Vec::as_slice)
            .ok_or(AssnsError::OutOfRange {
                index,
                len: data.len(),
            })
    }
}

impl<B, D> std::fmt::Debug for FindMany<B, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindMany")
            .field("valid", &self.is_valid())
            .field("size", &self.found.as_ref().map(|fd| fd.refs.len()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FindOne
// ---------------------------------------------------------------------------

/// The single `B` (and data) associated with each element of a reference
/// collection, if any.
pub struct FindOne<B, D = ()> {
    found: Option<Found<Option<Ptr<B>>, Option<D>>>,
    tag: Option<InputTag>,
}

impl<B, D: Clone> FindOne<B, D> {
    /// Fails if any reference has more than one associated `B`.
    pub fn from_assns<A>(
        refs: impl IntoIterator<Item = Ptr<A>>,
        assns: &Assns<A, B, D>,
    ) -> AssnsResult<Self> {
        let index = index_by_left(assns);
        let data = assns.data_values();
        let mut found = Found {
            refs: Vec::new(),
            data: data.map(|_| Vec::new()),
        };
        for a in refs {
            let hits = index.get(&a).map(Vec::as_slice).unwrap_or(&[]);
            if hits.len() > 1 {
                return Err(AssnsError::Logic(format!(
                    "Attempted to create a FindOne object for a one-many or many-many \
                     association: {a:?} has {} associated objects",
                    hits.len()
                )));
            }
            let hit = hits.first().copied();
            found.refs.push(hit.map(|i| assns.pairs()[i].1));
            if let (Some(out), Some(values)) = (found.data.as_mut(), data) {
                out.push(hit.map(|i| values[i].clone()));
            }
        }
        Ok(Self {
            found: Some(found),
            tag: None,
        })
    }
}

impl<B: 'static, D: Clone + Send + Sync + 'static> FindOne<B, D> {
    /// Look up `Assns<A, B, D>` by tag in `principal` and join it against
    /// `refs`. A missing association gives an invalid object.
    pub fn new<A: 'static>(
        refs: impl IntoIterator<Item = Ptr<A>>,
        principal: &Principal,
        tag: &InputTag,
    ) -> AssnsResult<Self> {
        let Some(assns) = lookup_assns::<A, B, D>(principal, tag)? else {
            return Ok(Self {
                found: None,
                tag: Some(tag.clone()),
            });
        };
        let mut find = Self::from_assns(refs, assns.get())?;
        find.tag = Some(tag.clone());
        Ok(find)
    }
}

impl<B, D> FindOne<B, D> {
    pub fn is_valid(&self) -> bool {
        self.found.is_some()
    }

    fn found(&self) -> AssnsResult<&Found<Option<Ptr<B>>, Option<D>>> {
        self.found.as_ref().ok_or_else(|| invalid(self.tag.as_ref()))
    }

    pub fn size(&self) -> AssnsResult<usize> {
        Ok(self.found()?.refs.len())
    }

    /// The associated `B`, or `None` if the reference has no partner.
    pub fn at(&self, index: usize) -> AssnsResult<Option<Ptr<B>>> {
        let found = self.found()?;
        found.refs.get(index).copied().ok_or(AssnsError::OutOfRange {
            index,
            len: found.refs.len(),
        })
    }

    pub fn data(&self, index: usize) -> AssnsResult<Option<&D>> {
        let found = self.found()?;
        let data = found
            .data
            .as_ref()
            .ok_or_else(|| AssnsError::Logic("association carries no data".into()))?;
        data.get(index)
            .map(Option::as_ref)
            .ok_or(AssnsError::OutOfRange {
                index,
                len: data.len(),
            })
    }
}

impl<B, D> std::fmt::Debug for FindOne<B, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindOne")
            .field("valid", &self.is_valid())
            .field("size", &self.found.as_ref().map(|fd| fd.refs.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Hit, Track};
    use evp_types::{ErrorCategory, ProductId};

    fn track(key: usize) -> Ptr<Track> {
        Ptr::new(ProductId::new(1, 1), key)
    }

    fn hit(key: usize) -> Ptr<Hit> {
        Ptr::new(ProductId::new(1, 2), key)
    }

    /// Three pairs where track 1 has two hits.
    fn one_to_many() -> Assns<Track, Hit, f32> {
        let mut a = Assns::new();
        a.add_with_data(track(0), hit(0), 0.1).unwrap();
        a.add_with_data(track(1), hit(1), 0.2).unwrap();
        a.add_with_data(track(1), hit(2), 0.3).unwrap();
        a
    }

    #[test]
    fn find_many_groups_by_reference() {
        let fm = FindMany::from_assns((0..3).map(track), &one_to_many());
        assert_eq!(fm.size().unwrap(), 3);
        assert_eq!(fm.at(0).unwrap(), &[hit(0)]);
        assert_eq!(fm.at(1).unwrap().len(), 2);
        assert_eq!(fm.data(1).unwrap().len(), 2);
        assert_eq!(fm.data(1).unwrap(), &[0.2, 0.3]);
        assert!(fm.at(2).unwrap().is_empty());
        assert!(fm.at(3).is_err());
    }

    #[test]
    fn find_one_rejects_one_to_many() {
        let err = FindOne::from_assns((0..3).map(track), &one_to_many()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::LogicError);
        assert!(err.to_string().contains("one-many or many-many"));
    }

    #[test]
    fn find_one_is_dense_over_references() {
        let mut a = Assns::<Track, Hit, f32>::new();
        a.add_with_data(track(2), hit(5), 1.5).unwrap();
        a.add_with_data(track(0), hit(4), 0.5).unwrap();
        let fo = FindOne::from_assns((0..3).map(track), &a).unwrap();
        assert_eq!(fo.size().unwrap(), 3);
        assert_eq!(fo.at(0).unwrap(), Some(hit(4)));
        assert_eq!(fo.at(1).unwrap(), None);
        assert_eq!(fo.data(2).unwrap(), Some(&1.5));
        assert_eq!(fo.data(1).unwrap(), None);
    }

    #[test]
    fn find_over_partner_relation() {
        let partner = one_to_many().make_partner();
        let fo = FindOne::from_assns((0..3).map(hit), &partner).unwrap();
        assert_eq!(fo.at(2).unwrap(), Some(track(1)));
    }

    #[test]
    fn lookups_through_principal() {
        let ctx = testing::context();
        let event = testing::event(&ctx);
        let tracks = testing::put_tracks(&event, 3);
        let hits = testing::put_hits(&event, 3);

        let mut assns = Assns::<Track, Hit>::new();
        assns.add(tracks[0], hits[0]).unwrap();
        assns.add(tracks[1], hits[1]).unwrap();
        assns.add(tracks[1], hits[2]).unwrap();
        event
            .put_value(assns, &testing::description(&ctx, "TrackHitAssns", "assoc"), vec![])
            .unwrap();

        let tag: InputTag = "assoc".parse().unwrap();
        let fm = FindMany::<Hit>::new(tracks.iter().copied(), &event, &tag).unwrap();
        assert!(fm.is_valid());
        assert_eq!(fm.at(1).unwrap(), &[hits[1], hits[2]]);
        assert!(fm.data(0).is_err());

        let fo = FindOne::<Hit>::new(tracks.iter().copied(), &event, &tag);
        assert_eq!(fo.unwrap_err().category(), ErrorCategory::LogicError);
    }

    #[test]
    fn missing_association_gives_invalid_lookup() {
        let ctx = testing::context();
        let event = testing::event(&ctx);
        let tag: InputTag = "nothing".parse().unwrap();
        let fm = FindMany::<Hit>::new((0..2).map(track), &event, &tag).unwrap();
        assert!(!fm.is_valid());
        let err = fm.size().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ProductNotFound);
        assert!(fm.at(0).is_err());

        let fo = FindOne::<Hit>::new((0..2).map(track), &event, &tag).unwrap();
        assert!(!fo.is_valid());
        assert_eq!(fo.data(0).unwrap_err().category(), ErrorCategory::ProductNotFound);
    }
}
