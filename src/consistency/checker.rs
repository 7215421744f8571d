use crate::auth::hash::HashManager;
use crate::core::config::AuthConfig;
use crate::core::error::EngineError;
use crate::models::audit::AuditLogEntry;
use crate::models::user::{Role, User};
use crate::stores::record_store::{tables, RecordStore};
use crate::utils::time::Clock;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Healthy,
    Reseeded,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub status: CheckStatus,
    pub details: Vec<String>,
}

/// Self-healing scan over baseline invariants. The administrative reset
/// tool may wipe every collection out from under the engine; this check
/// re-seeds the baseline accounts so authentication is never bricked.
pub struct ConsistencyChecker {
    store: Arc<RecordStore>,
    hash: Arc<HashManager>,
    clock: Arc<dyn Clock>,
    auth: AuthConfig,
}

impl ConsistencyChecker {
    pub fn new(
        store: Arc<RecordStore>,
        hash: Arc<HashManager>,
        clock: Arc<dyn Clock>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            store,
            hash,
            clock,
            auth,
        }
    }

    /// Idempotent: a populated directory is a no-op success.
    pub fn check(&self) -> Result<CheckReport, EngineError> {
        let users = self.store.get_all(tables::USERS)?;

        if !users.is_empty() {
            let admins = users
                .iter()
                .filter(|u| u.get("role").and_then(|r| r.as_str()) == Some("admin"))
                .count();
            debug!(users = users.len(), admins, "User directory healthy");

            return Ok(CheckReport {
                status: CheckStatus::Healthy,
                details: vec![format!("{} users, {} admins", users.len(), admins)],
            });
        }

        let now = self.clock.now_millis();
        let admin = User::new(
            self.auth.default_admin_username.clone(),
            self.hash.hash(&self.auth.default_admin_password),
            Role::Admin,
            now,
        );
        self.store.save(tables::USERS, admin.to_record())?;

        let entry = AuditLogEntry::new(
            "seed_default_accounts",
            "user",
            &admin.username,
            json!({ "reason": "empty user directory" }),
            now,
            "system",
        );
        self.store.save(tables::AUDIT_LOG, entry.to_record())?;

        info!(
            admin = %admin.username,
            "User directory was empty, re-seeded default administrator"
        );

        Ok(CheckReport {
            status: CheckStatus::Reseeded,
            details: vec![format!("seeded default admin '{}'", admin.username)],
        })
    }
}
