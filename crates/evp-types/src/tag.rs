use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// `label[:instance[:process]]` product selector as written in configuration.
///
/// An empty process name matches any process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputTag {
    pub label: String,
    pub instance: String,
    pub process: String,
}

impl InputTag {
    pub fn new(
        label: impl Into<String>,
        instance: impl Into<String>,
        process: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            instance: instance.into(),
            process: process.into(),
        }
    }

    pub fn label_only(label: impl Into<String>) -> Self {
        Self::new(label, "", "")
    }
}

impl FromStr for InputTag {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [label] if !label.is_empty() => Ok(Self::new(*label, "", "")),
            [label, instance] if !label.is_empty() => Ok(Self::new(*label, *instance, "")),
            [label, instance, process] if !label.is_empty() => {
                Ok(Self::new(*label, *instance, *process))
            }
            _ => Err(TypeError::InvalidInputTag(s.to_string())),
        }
    }
}

impl fmt::Display for InputTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.label, self.instance, self.process)
    }
}
