use serde::{Deserialize, Serialize};

use evp_types::ProcessConfiguration;

use crate::error::{RegistryError, RegistryResult};

/// Job-level settings for the product core.
///
/// Loaded from a flat TOML document. Every field is optional and falls back
/// to [`JobConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Name of the current process. Must be unique within every input
    /// file's process history.
    pub process_name: String,
    pub release_version: String,
    pub parameter_set_id: String,
    /// Run unscheduled producers on first access to their products.
    pub fill_on_demand: bool,
    /// Consult secondary sources when a branch is missing locally.
    pub secondary_lookup: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            process_name: "EVP".to_string(),
            release_version: env!("CARGO_PKG_VERSION").to_string(),
            parameter_set_id: String::new(),
            fill_on_demand: true,
            secondary_lookup: true,
        }
    }
}

impl JobConfig {
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    pub fn with_fill_on_demand(mut self, enabled: bool) -> Self {
        self.fill_on_demand = enabled;
        self
    }

    pub fn with_secondary_lookup(mut self, enabled: bool) -> Self {
        self.secondary_lookup = enabled;
        self
    }

    pub fn from_toml_str(s: &str) -> RegistryResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Process names become part of branch names, so they may not be empty
    /// or contain the `_` separator.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.process_name.is_empty() {
            return Err(RegistryError::Config("process name must not be empty".into()));
        }
        if self.process_name.contains('_') {
            return Err(RegistryError::Config(format!(
                "process name '{}' must not contain '_'",
                self.process_name
            )));
        }
        Ok(())
    }

    pub fn process_configuration(&self) -> ProcessConfiguration {
        ProcessConfiguration::new(
            self.process_name.clone(),
            self.release_version.clone(),
            self.parameter_set_id.clone(),
        )
    }
}
