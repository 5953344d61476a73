use serde::{Deserialize, Serialize};

use crate::branch::{BranchId, BranchKey, BranchType};

/// Immutable schema metadata for one branch.
///
/// Descriptions are built once, registered with the product catalog, and
/// then shared by `Arc` across every group that refers to the branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDescription {
    key: BranchKey,
    branch_id: BranchId,
    produced_class_name: String,
    element_type: Option<String>,
    produced: bool,
    present: bool,
}

impl BranchDescription {
    /// Describe a branch read from input. The branch id stays invalid until
    /// the catalog assigns one.
    pub fn new(key: BranchKey, produced_class_name: impl Into<String>) -> Self {
        Self {
            key,
            branch_id: BranchId::invalid(),
            produced_class_name: produced_class_name.into(),
            element_type: None,
            produced: false,
            present: true,
        }
    }

    /// Mark the branch as produced by the current process.
    pub fn produced(mut self) -> Self {
        self.produced = true;
        self
    }

    /// Mark the branch as dropped on input.
    pub fn dropped(mut self) -> Self {
        self.present = false;
        self
    }

    /// Record the friendly name of the element type for sequence products.
    pub fn with_element_type(mut self, element: impl Into<String>) -> Self {
        self.element_type = Some(element.into());
        self
    }

    pub fn with_branch_id(mut self, id: BranchId) -> Self {
        self.branch_id = id;
        self
    }

    pub fn key(&self) -> &BranchKey {
        &self.key
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn branch_type(&self) -> BranchType {
        self.key.branch_type
    }

    pub fn friendly_class_name(&self) -> &str {
        &self.key.friendly_class_name
    }

    pub fn module_label(&self) -> &str {
        &self.key.module_label
    }

    pub fn product_instance_name(&self) -> &str {
        &self.key.product_instance_name
    }

    pub fn process_name(&self) -> &str {
        &self.key.process_name
    }

    pub fn produced_class_name(&self) -> &str {
        &self.produced_class_name
    }

    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_deref()
    }

    pub fn is_produced(&self) -> bool {
        self.produced
    }

    /// `false` when the branch was dropped on input.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// One-line `(type, label, instance, process, unit kind)` rendering used
    /// in error messages.
    pub fn context(&self) -> String {
        format!(
            "({},{},{},{},{})",
            self.key.friendly_class_name,
            self.key.module_label,
            self.key.product_instance_name,
            self.key.process_name,
            self.key.branch_type
        )
    }
}
