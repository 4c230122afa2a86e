use serde::{Deserialize, Serialize};

use crate::shared::{ValidationError, is_sql_identifier};

/// Settings controlling what is read and how it is batched.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncSettings {
    /// Source table, optionally schema-qualified (`schema.table`).
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Columns selected from the source table, in output order.
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
    /// Column used for `ORDER BY ... ASC`. `None` keeps the database's natural order.
    #[serde(default = "default_order_by")]
    pub order_by: Option<String>,
    /// Maximum number of records in a single upload request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of upload requests in flight at once.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Optional wall-clock budget for the whole run, in seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl SyncSettings {
    /// Default source table.
    pub const DEFAULT_TABLE_NAME: &'static str = "acc_users";

    /// Default selected columns.
    pub const DEFAULT_COLUMNS: &'static [&'static str] = &["id", "pass", "role", "accountcode"];

    /// Default ordering column.
    pub const DEFAULT_ORDER_BY: &'static str = "id";

    /// Default maximum batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    /// Default number of concurrent uploads.
    pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 1;

    /// Validates the sync settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let table_valid = match self.table_name.split_once('.') {
            Some((schema, table)) => is_sql_identifier(schema) && is_sql_identifier(table),
            None => is_sql_identifier(&self.table_name),
        };
        if !table_valid {
            return Err(ValidationError::InvalidIdentifier {
                field: "settings.table_name".to_string(),
                value: self.table_name.clone(),
            });
        }

        if self.columns.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "settings.columns".to_string(),
                constraint: "must list at least one column".to_string(),
            });
        }

        for column in &self.columns {
            if !is_sql_identifier(column) {
                return Err(ValidationError::InvalidIdentifier {
                    field: "settings.columns".to_string(),
                    value: column.clone(),
                });
            }
        }

        if let Some(order_by) = &self.order_by
            && !is_sql_identifier(order_by)
        {
            return Err(ValidationError::InvalidIdentifier {
                field: "settings.order_by".to_string(),
                value: order_by.clone(),
            });
        }

        if self.batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "settings.batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_concurrent_batches == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "settings.max_concurrent_batches".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.deadline_secs == Some(0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "settings.deadline_secs".to_string(),
                constraint: "must be greater than 0 when set".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            columns: default_columns(),
            order_by: default_order_by(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            deadline_secs: None,
        }
    }
}

fn default_table_name() -> String {
    SyncSettings::DEFAULT_TABLE_NAME.to_string()
}

fn default_columns() -> Vec<String> {
    SyncSettings::DEFAULT_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .collect()
}

fn default_order_by() -> Option<String> {
    Some(SyncSettings::DEFAULT_ORDER_BY.to_string())
}

fn default_batch_size() -> usize {
    SyncSettings::DEFAULT_BATCH_SIZE
}

fn default_max_concurrent_batches() -> usize {
    SyncSettings::DEFAULT_MAX_CONCURRENT_BATCHES
}
