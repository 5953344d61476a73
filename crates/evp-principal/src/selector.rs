//! Composable predicates over branch descriptions.
//!
//! Selectors combine with `&`, `|` and `!`:
//!
//! ```
//! use evp_principal::selector::{ModuleLabelSelector, ProcessNameSelector, Selector};
//!
//! let s = ModuleLabelSelector::new("prodA") & !ProcessNameSelector::new("HLT");
//! assert!(s.describe().contains("prodA"));
//! ```

use std::ops::{BitAnd, BitOr, Not};

use evp_types::{BranchDescription, InputTag};

pub trait Selector: Send + Sync {
    fn matches(&self, description: &BranchDescription) -> bool;

    /// Human-readable criteria, one per line, for error messages.
    fn describe(&self) -> String;
}

/// Matches a process name. `""` and `"*"` match every process.
#[derive(Clone, Debug)]
pub struct ProcessNameSelector {
    name: String,
}

impl ProcessNameSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Selector for ProcessNameSelector {
    fn matches(&self, description: &BranchDescription) -> bool {
        self.name.is_empty() || self.name == "*" || self.name == description.process_name()
    }

    fn describe(&self) -> String {
        format!("process name: '{}'", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct ProductInstanceNameSelector {
    name: String,
}

impl ProductInstanceNameSelector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Selector for ProductInstanceNameSelector {
    fn matches(&self, description: &BranchDescription) -> bool {
        self.name == description.product_instance_name()
    }

    fn describe(&self) -> String {
        format!("product instance name: '{}'", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct ModuleLabelSelector {
    label: String,
}

impl ModuleLabelSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Selector for ModuleLabelSelector {
    fn matches(&self, description: &BranchDescription) -> bool {
        self.label == description.module_label()
    }

    fn describe(&self) -> String {
        format!("module label: '{}'", self.label)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MatchAllSelector;

impl Selector for MatchAllSelector {
    fn matches(&self, _description: &BranchDescription) -> bool {
        true
    }

    fn describe(&self) -> String {
        "match all".to_string()
    }
}

#[derive(Clone, Debug)]
pub struct AndSelector<A, B>(pub A, pub B);

impl<A: Selector, B: Selector> Selector for AndSelector<A, B> {
    fn matches(&self, description: &BranchDescription) -> bool {
        self.0.matches(description) && self.1.matches(description)
    }

    fn describe(&self) -> String {
        format!("{}\n{}", self.0.describe(), self.1.describe())
    }
}

#[derive(Clone, Debug)]
pub struct OrSelector<A, B>(pub A, pub B);

impl<A: Selector, B: Selector> Selector for OrSelector<A, B> {
    fn matches(&self, description: &BranchDescription) -> bool {
        self.0.matches(description) || self.1.matches(description)
    }

    fn describe(&self) -> String {
        format!("either\n  {}\nor\n  {}", self.0.describe(), self.1.describe())
    }
}

#[derive(Clone, Debug)]
pub struct NotSelector<A>(pub A);

impl<A: Selector> Selector for NotSelector<A> {
    fn matches(&self, description: &BranchDescription) -> bool {
        !self.0.matches(description)
    }

    fn describe(&self) -> String {
        format!("not [{}]", self.0.describe())
    }
}

macro_rules! selector_ops {
    ($([$($gen:tt)*] $ty:ty),* $(,)?) => {$(
        impl<$($gen)* Rhs: Selector> BitAnd<Rhs> for $ty {
            type Output = AndSelector<Self, Rhs>;

            fn bitand(self, rhs: Rhs) -> Self::Output {
                AndSelector(self, rhs)
            }
        }

        impl<$($gen)* Rhs: Selector> BitOr<Rhs> for $ty {
            type Output = OrSelector<Self, Rhs>;

            fn bitor(self, rhs: Rhs) -> Self::Output {
                OrSelector(self, rhs)
            }
        }

        impl<$($gen)*> Not for $ty {
            type Output = NotSelector<Self>;

            fn not(self) -> Self::Output {
                NotSelector(self)
            }
        }
    )*};
}

selector_ops!(
    [] ProcessNameSelector,
    [] ProductInstanceNameSelector,
    [] ModuleLabelSelector,
    [] MatchAllSelector,
    [A: Selector, B: Selector,] AndSelector<A, B>,
    [A: Selector, B: Selector,] OrSelector<A, B>,
    [A: Selector,] NotSelector<A>,
);

/// Selector type produced by [`label_selector`].
pub type LabelSelector =
    AndSelector<AndSelector<ModuleLabelSelector, ProductInstanceNameSelector>, ProcessNameSelector>;

/// Exact label and instance, optional process.
pub fn label_selector(label: &str, instance: &str, process: &str) -> LabelSelector {
    ModuleLabelSelector::new(label)
        & ProductInstanceNameSelector::new(instance)
        & ProcessNameSelector::new(process)
}

pub fn input_tag_selector(tag: &InputTag) -> LabelSelector {
    label_selector(&tag.label, &tag.instance, &tag.process)
}
