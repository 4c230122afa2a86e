//! Mapping from source rows to upload records.
//!
//! [`transform`] is pure: it never logs and never touches I/O, and the same row always yields the
//! same record. Rows that cannot be mapped fail with [`ErrorKind::SchemaMismatch`] so the caller
//! can skip and count them.

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{SourceRow, SourceValue, UploadRecord};

pub const ID_COLUMN: &str = "id";
pub const PASS_COLUMN: &str = "pass";
pub const ROLE_COLUMN: &str = "role";
pub const ACCOUNTCODE_COLUMN: &str = "accountcode";

/// Maps a [`SourceRow`] to the record shape expected by the API.
///
/// `id` and `pass` are required and accept text or integers, rendered as trimmed strings. An
/// integer zero is treated like null.
/// `role` and `accountcode` accept text or null; a missing column or an empty string maps to null.
pub fn transform(row: &SourceRow) -> SyncResult<UploadRecord> {
    let id = required_text(row, ID_COLUMN)?;
    let pass = required_text(row, PASS_COLUMN)?;
    let role = optional_text(row, ROLE_COLUMN)?;
    let accountcode = optional_text(row, ACCOUNTCODE_COLUMN)?;

    Ok(UploadRecord::new(id, pass, role, accountcode))
}

fn required_text(row: &SourceRow, column: &'static str) -> SyncResult<String> {
    let text = match row.get(column) {
        None => bail!(
            ErrorKind::SchemaMismatch,
            "Required column is missing",
            format!("column `{column}` is not present in the row")
        ),
        Some(SourceValue::Text(value)) => value.trim().to_string(),
        // Zero counts as absent, like null.
        Some(SourceValue::Int(0) | SourceValue::Null) => String::new(),
        Some(SourceValue::Int(value)) => value.to_string(),
        Some(other) => bail!(
            ErrorKind::SchemaMismatch,
            "Required column has an incompatible type",
            format!(
                "column `{column}` holds a {} value, expected text or int",
                other.type_name()
            )
        ),
    };

    if text.is_empty() {
        bail!(
            ErrorKind::SchemaMismatch,
            "Required column is empty",
            format!("column `{column}` is null or empty")
        );
    }

    Ok(text)
}

fn optional_text(row: &SourceRow, column: &'static str) -> SyncResult<Option<String>> {
    match row.get(column) {
        None | Some(SourceValue::Null) => Ok(None),
        Some(SourceValue::Text(value)) => {
            let value = value.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Some(other) => bail!(
            ErrorKind::SchemaMismatch,
            "Optional column has an incompatible type",
            format!(
                "column `{column}` holds a {} value, expected text or null",
                other.type_name()
            )
        ),
    }
}
