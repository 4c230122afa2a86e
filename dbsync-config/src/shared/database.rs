use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::shared::ValidationError;
use crate::shared::base::require_non_empty;

/// Connection settings for the source database.
///
/// `dsn` is a driver URL such as `postgres://db.local:5432/acc` or `sqlite://acc.db`. The
/// credentials are kept apart from it so that the DSN can be logged safely.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Data source name identifying the database.
    pub dsn: String,
    /// User to authenticate as.
    pub username: SecretString,
    /// Password for `username`.
    pub password: SecretString,
}

impl DatabaseConfig {
    /// Validates that every connection value is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("database.dsn", &self.dsn)?;
        require_non_empty("database.username", self.username.expose_secret())?;
        require_non_empty("database.password", self.password.expose_secret())?;

        Ok(())
    }
}
