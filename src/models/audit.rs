use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Append-only audit record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
    pub timestamp: i64,
    pub user_id: String,
}

impl AuditLogEntry {
    pub fn new(
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: Value,
        timestamp: i64,
        user_id: &str,
    ) -> Self {
        Self {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
            timestamp,
            user_id: user_id.to_string(),
        }
    }

    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).expect("AuditLogEntry serializes to an object")
    }
}
