use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One process step in a unit's history.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessConfiguration {
    pub process_name: String,
    pub release_version: String,
    pub parameter_set_id: String,
}

impl ProcessConfiguration {
    pub fn new(
        process_name: impl Into<String>,
        release_version: impl Into<String>,
        parameter_set_id: impl Into<String>,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            release_version: release_version.into(),
            parameter_set_id: parameter_set_id.into(),
        }
    }
}

/// Content hash of a [`ProcessHistory`].
///
/// The empty history hashes to the null id (all zeros).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessHistoryId([u8; 32]);

impl ProcessHistoryId {
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ProcessHistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessHistoryId({})", self.short_hex())
    }
}

impl fmt::Display for ProcessHistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Ordered, append-only record of the processes that produced a unit.
///
/// The oldest process comes first. Lookups that prefer recent products walk
/// the history with [`ProcessHistory::iter_newest_first`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHistory {
    configurations: Vec<ProcessConfiguration>,
}

impl ProcessHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configurations(configurations: Vec<ProcessConfiguration>) -> Self {
        Self { configurations }
    }

    pub fn push(&mut self, configuration: ProcessConfiguration) {
        self.configurations.push(configuration);
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProcessConfiguration> {
        self.configurations.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessConfiguration> {
        self.configurations.iter()
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &ProcessConfiguration> {
        self.configurations.iter().rev()
    }

    pub fn contains_process(&self, process_name: &str) -> bool {
        self.configurations
            .iter()
            .any(|c| c.process_name == process_name)
    }

    /// BLAKE3 of the configurations' canonical JSON encoding, in order.
    pub fn id(&self) -> ProcessHistoryId {
        if self.configurations.is_empty() {
            return ProcessHistoryId::null();
        }
        let serialized = serde_json::to_vec(&self.configurations).unwrap_or_default();
        ProcessHistoryId(*blake3::hash(&serialized).as_bytes())
    }
}
