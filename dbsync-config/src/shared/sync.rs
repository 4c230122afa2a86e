use serde::Deserialize;

use crate::Config;
use crate::shared::{ApiConfig, DatabaseConfig, SyncSettings, ValidationError};

/// Complete configuration for a sync run.
///
/// Aggregates the source database connection, the destination API and the run settings.
/// Loaded once per run with [`crate::load_config_file`] and never mutated afterwards.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct SyncConfig {
    /// Source database connection.
    pub database: DatabaseConfig,
    /// Destination API.
    pub api: ApiConfig,
    /// Table, batching and scheduling settings.
    #[serde(default)]
    pub settings: SyncSettings,
}

impl SyncConfig {
    /// Validates the complete configuration.
    ///
    /// Sections are checked in file order so that the first reported problem matches what an
    /// operator reads first.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.api.validate()?;
        self.settings.validate()
    }
}

impl Config for SyncConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["settings.columns"];

    fn validate(&self) -> Result<(), ValidationError> {
        SyncConfig::validate(self)
    }
}
