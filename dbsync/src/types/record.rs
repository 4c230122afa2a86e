use serde::Serialize;

/// A row in the shape the destination API expects.
///
/// Serializes to a JSON object with `id`, `pass`, `role` and `accountcode` keys; the optional
/// fields serialize as `null` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UploadRecord {
    id: String,
    pass: String,
    role: Option<String>,
    accountcode: Option<String>,
}

impl UploadRecord {
    pub fn new(
        id: String,
        pass: String,
        role: Option<String>,
        accountcode: Option<String>,
    ) -> Self {
        Self {
            id,
            pass,
            role,
            accountcode,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pass(&self) -> &str {
        &self.pass
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn accountcode(&self) -> Option<&str> {
        self.accountcode.as_deref()
    }
}
