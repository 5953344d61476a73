use std::fmt;

use crate::error::{AssnsError, AssnsResult};
use crate::ptr::Ptr;

/// Ordered many-to-many relation between elements of two collections, with
/// optional per-pair data.
///
/// Either every pair carries data or none does; the data array always has
/// the same length as the pair array when present.
pub struct Assns<L, R, D = ()> {
    pairs: Vec<(Ptr<L>, Ptr<R>)>,
    data: Option<Vec<D>>,
}

impl<L, R, D> Assns<L, R, D> {
    pub fn new() -> Self {
        Self {
            pairs: Vec::new(),
            data: None,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn add(&mut self, left: Ptr<L>, right: Ptr<R>) -> AssnsResult<()> {
        if self.data.is_some() {
            return Err(AssnsError::Logic(
                "cannot add a pair without data to an association that carries data".into(),
            ));
        }
        self.pairs.push((left, right));
        Ok(())
    }

    pub fn add_with_data(&mut self, left: Ptr<L>, right: Ptr<R>, data: D) -> AssnsResult<()> {
        if self.data.is_none() && !self.pairs.is_empty() {
            return Err(AssnsError::Logic(
                "cannot add a pair with data to an association without data".into(),
            ));
        }
        self.data.get_or_insert_with(Vec::new).push(data);
        self.pairs.push((left, right));
        Ok(())
    }

    pub fn at(&self, index: usize) -> AssnsResult<&(Ptr<L>, Ptr<R>)> {
        self.pairs.get(index).ok_or(AssnsError::OutOfRange {
            index,
            len: self.pairs.len(),
        })
    }

    pub fn data(&self, index: usize) -> AssnsResult<&D> {
        let values = self
            .data
            .as_ref()
            .ok_or_else(|| AssnsError::Logic("association carries no data".into()))?;
        values.get(index).ok_or(AssnsError::OutOfRange {
            index,
            len: values.len(),
        })
    }

    pub fn pairs(&self) -> &[(Ptr<L>, Ptr<R>)] {
        &self.pairs
    }

    pub fn data_values(&self) -> Option<&[D]> {
        self.data.as_deref()
    }

    /// Pairs with their data, if any.
    pub fn iter(&self) -> impl Iterator<Item = (Ptr<L>, Ptr<R>, Option<&D>)> + '_ {
        self.pairs.iter().enumerate().map(move |(i, (l, r))| {
            (*l, *r, self.data.as_ref().and_then(|d| d.get(i)))
        })
    }
}

impl<L, R, D: Clone> Assns<L, R, D> {
    /// The same relation seen from the right-hand side.
    pub fn make_partner(&self) -> Assns<R, L, D> {
        Assns {
            pairs: self.pairs.iter().map(|(l, r)| (*r, *l)).collect(),
            data: self.data.clone(),
        }
    }

    /// Append every pair of `other`. Both must agree on carrying data unless
    /// one side is empty.
    pub fn aggregate(&mut self, other: &Self) -> AssnsResult<()> {
        if other.pairs.is_empty() {
            return Ok(());
        }
        if self.pairs.is_empty() {
            self.data = other.data.clone();
        } else {
            match (&mut self.data, &other.data) {
                (Some(mine), Some(theirs)) => mine.extend(theirs.iter().cloned()),
                (None, None) => {}
                _ => {
                    return Err(AssnsError::Logic(
                        "cannot aggregate associations that disagree on carrying data".into(),
                    ))
                }
            }
        }
        self.pairs.extend(other.pairs.iter().copied());
        Ok(())
    }

    pub(crate) fn from_parts(pairs: Vec<(Ptr<L>, Ptr<R>)>, data: Option<Vec<D>>) -> Self {
        Self { pairs, data }
    }
}

impl<L, R, D> Default for Assns<L, R, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L, R, D: Clone> Clone for Assns<L, R, D> {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
            data: self.data.clone(),
        }
    }
}

impl<L, R, D: PartialEq> PartialEq for Assns<L, R, D> {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs && self.data == other.data
    }
}

impl<L, R, D> fmt::Debug for Assns<L, R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assns")
            .field("pair_count", &self.pairs.len())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
