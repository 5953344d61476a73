use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of unit a product is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BranchType {
    Event,
    SubRun,
    Run,
    Results,
}

impl BranchType {
    /// Every unit kind, in a fixed order usable for array indexing.
    pub const ALL: [BranchType; 4] = [Self::Event, Self::SubRun, Self::Run, Self::Results];

    /// Position of this unit kind within [`BranchType::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Self::Event => 0,
            Self::SubRun => 1,
            Self::Run => 2,
            Self::Results => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::SubRun => "SubRun",
            Self::Run => "Run",
            Self::Results => "Results",
        }
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural identity of a data product.
///
/// Field order matters: the derived `Ord` compares type, label, instance,
/// process, and unit kind lexicographically in that order, which is also the
/// order in which [`BranchId`]s are handed out when a catalog is frozen.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchKey {
    pub friendly_class_name: String,
    pub module_label: String,
    pub product_instance_name: String,
    pub process_name: String,
    pub branch_type: BranchType,
}

impl BranchKey {
    pub fn new(
        friendly_class_name: impl Into<String>,
        module_label: impl Into<String>,
        product_instance_name: impl Into<String>,
        process_name: impl Into<String>,
        branch_type: BranchType,
    ) -> Self {
        Self {
            friendly_class_name: friendly_class_name.into(),
            module_label: module_label.into(),
            product_instance_name: product_instance_name.into(),
            process_name: process_name.into(),
            branch_type,
        }
    }

    /// Storage-facing branch name: `Type_label_instance_process`.
    pub fn branch_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.friendly_class_name,
            self.module_label,
            self.product_instance_name,
            self.process_name
        )
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.branch_name(), self.branch_type)
    }
}

/// Dense, process-local surrogate for a [`BranchKey`].
///
/// Zero is reserved as the invalid id; valid ids start at 1 and are assigned
/// once, when the product catalog is frozen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(u32);

impl BranchId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn invalid() -> Self {
        Self(0)
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchId({})", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of one per-process branch-id list in the job-wide list registry.
pub type BranchListIndex = u32;

/// File-portable product reference.
///
/// `process_index` is 1-based and relative to the owning unit's lineage (its
/// ordered list of [`BranchListIndex`]es), not to the job-wide registry.
/// `product_index` is the 1-based position within that process's list.
/// `(0, 0)` is the invalid id.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ProductId {
    process_index: u16,
    product_index: u16,
}

impl ProductId {
    pub const fn new(process_index: u16, product_index: u16) -> Self {
        Self {
            process_index,
            product_index,
        }
    }

    pub const fn invalid() -> Self {
        Self::new(0, 0)
    }

    pub const fn is_valid(&self) -> bool {
        self.process_index != 0
    }

    pub const fn process_index(&self) -> u16 {
        self.process_index
    }

    pub const fn product_index(&self) -> u16 {
        self.product_index
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process_index, self.product_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ty: &str, label: &str, process: &str) -> BranchKey {
        BranchKey::new(ty, label, "", process, BranchType::Event)
    }

    #[test]
    fn branch_keys_order_by_type_first() {
        let a = key("Hits", "zzz", "p1");
        let b = key("Tracks", "aaa", "p1");
        assert!(a < b);
    }

    #[test]
    fn branch_keys_order_by_label_then_instance() {
        let a = BranchKey::new("Hits", "prodA", "x", "p1", BranchType::Event);
        let b = BranchKey::new("Hits", "prodA", "y", "p1", BranchType::Event);
        let c = BranchKey::new("Hits", "prodB", "", "p1", BranchType::Event);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn branch_name_uses_underscores() {
        let k = BranchKey::new("Hits", "prodA", "inst", "p1", BranchType::Run);
        assert_eq!(k.branch_name(), "Hits_prodA_inst_p1");
        assert_eq!(k.to_string(), "Hits_prodA_inst_p1 (Run)");
    }

    #[test]
    fn invalid_ids() {
        assert!(!BranchId::invalid().is_valid());
        assert!(BranchId::new(1).is_valid());
        assert!(!ProductId::invalid().is_valid());
        assert!(ProductId::new(1, 1).is_valid());
        assert_eq!(ProductId::default(), ProductId::invalid());
    }

    #[test]
    fn branch_type_index_matches_all() {
        for (i, bt) in BranchType::ALL.iter().enumerate() {
            assert_eq!(bt.index(), i);
        }
    }

    #[test]
    fn branch_key_serde_roundtrip() {
        let k = key("Hits", "prodA", "p1");
        let json = serde_json::to_string(&k).unwrap();
        let back: BranchKey = serde_json::from_str(&json).unwrap();
        assert_eq!(k, back);
    }
}
