use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required value is present but empty.
    #[error("`{field}` must not be empty")]
    EmptyField { field: String },
    /// The API timeout is zero or negative.
    #[error("`api.timeout` must be greater than 0, got {value}")]
    NonPositiveTimeout { value: i64 },
    /// A URL value could not be parsed or uses an unsupported scheme.
    #[error("`{field}` is not a valid http(s) URL: {reason}")]
    InvalidUrl { field: String, reason: String },
    /// A value that ends up in a SQL statement is not a plain identifier.
    #[error("`{field}` must be a plain SQL identifier, got `{value}`")]
    InvalidIdentifier { field: String, value: String },
    /// A value violates its allowed range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

impl ValidationError {
    /// Returns `true` when the error means a required value is missing rather than out of range.
    pub fn is_missing_value(&self) -> bool {
        matches!(self, ValidationError::EmptyField { .. })
    }
}

/// Returns `true` if `value` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Table names, column names and the ordering column are spliced into the read query, so
/// anything else is refused at load time.
pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Checks that a configuration string is not blank.
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }

    Ok(())
}
