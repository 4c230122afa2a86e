use std::fmt;

use chrono::NaiveDateTime;

/// A single typed value read from a source column.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl SourceValue {
    /// Returns the name of the value's type, used in mismatch reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceValue::Null => "null",
            SourceValue::Bool(_) => "bool",
            SourceValue::Int(_) => "int",
            SourceValue::Float(_) => "float",
            SourceValue::Text(_) => "text",
            SourceValue::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }
}

impl fmt::Display for SourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceValue::Null => f.write_str("NULL"),
            SourceValue::Bool(value) => write!(f, "{value}"),
            SourceValue::Int(value) => write!(f, "{value}"),
            SourceValue::Float(value) => write!(f, "{value}"),
            SourceValue::Text(value) => f.write_str(value),
            SourceValue::Timestamp(value) => write!(f, "{value}"),
        }
    }
}

/// One row read from the source table.
///
/// Columns keep the order in which they were selected. A [`SourceRow`] is produced by a
/// [`crate::source::SourceConnection`], consumed once by [`crate::transform::transform`] and then
/// dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRow {
    columns: Vec<(String, SourceValue)>,
}

impl SourceRow {
    /// Creates a row from `(column, value)` pairs in select order.
    pub fn new(columns: Vec<(String, SourceValue)>) -> Self {
        Self { columns }
    }

    /// Returns the value of `column`, or `None` when the row has no such column.
    ///
    /// Column names are matched case-insensitively, since drivers disagree on the case they
    /// report unquoted identifiers in.
    pub fn get(&self, column: &str) -> Option<&SourceValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Returns the columns in select order.
    pub fn columns(&self) -> &[(String, SourceValue)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, SourceValue)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (S, SourceValue)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}
