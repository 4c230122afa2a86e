use crate::types::{SourceRow, SourceValue, UploadRecord};

/// A user as stored in the test `acc_users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUser {
    pub id: i64,
    pub pass: String,
    pub role: Option<String>,
    pub accountcode: Option<String>,
}

impl TestUser {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            pass: format!("pass-{id}"),
            role: Some("user".to_string()),
            accountcode: Some(format!("ACC{id:04}")),
        }
    }

    /// Returns the source row the reader produces for this user.
    pub fn to_row(&self) -> SourceRow {
        let text = |value: &Option<String>| {
            value
                .clone()
                .map(SourceValue::Text)
                .unwrap_or(SourceValue::Null)
        };

        SourceRow::new(vec![
            ("id".to_string(), SourceValue::Int(self.id)),
            ("pass".to_string(), SourceValue::Text(self.pass.clone())),
            ("role".to_string(), text(&self.role)),
            ("accountcode".to_string(), text(&self.accountcode)),
        ])
    }

    /// Returns the record the transformer produces for this user.
    pub fn to_record(&self) -> UploadRecord {
        UploadRecord::new(
            self.id.to_string(),
            self.pass.clone(),
            self.role.clone(),
            self.accountcode.clone(),
        )
    }
}

/// Returns users with ids `1..=count`.
pub fn test_users(count: usize) -> Vec<TestUser> {
    (1..=count as i64).map(TestUser::new).collect()
}

/// Returns the source rows of users with ids `1..=count`.
pub fn user_rows(count: usize) -> Vec<SourceRow> {
    test_users(count).iter().map(TestUser::to_row).collect()
}
