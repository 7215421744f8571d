use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account role. Admins are exempt from the session cap and cannot be
/// removed through any engine code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// One device-scoped login.
///
/// A session is valid only while it sits inside its owning user's
/// `sessions` list with an exact token match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub device_id: String,
    pub user_agent_summary: String,
    pub created_at: i64,
    pub last_used: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Immutable primary key, unique across the directory
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
    pub last_login: Option<i64>,
    pub is_active: bool,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl User {
    pub fn new(username: String, password_hash: String, role: Role, created_at: i64) -> Self {
        Self {
            username,
            password_hash,
            role,
            created_at,
            last_login: None,
            is_active: true,
            sessions: Vec::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// User record as a store document. Records are keyed by username,
    /// so `id` mirrors it.
    pub fn to_record(&self) -> Value {
        let mut doc = serde_json::to_value(self).expect("User serializes to an object");
        doc["id"] = Value::String(self.username.clone());
        doc
    }

    pub fn from_record(doc: &Value) -> Option<Self> {
        serde_json::from_value(doc.clone()).ok()
    }
}
