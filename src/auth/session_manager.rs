use crate::core::config::SessionConfig;
use crate::core::error::{AuthError, EngineError, PersistenceError};
use crate::models::user::{Session, User};
use crate::stores::record_store::{tables, RecordStore};
use crate::utils::time::{is_older_than, Clock};
use rand::RngCore;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Issues, validates, evicts and revokes per-user session tokens.
///
/// Every mutation is applied to an in-memory copy of the user record and
/// persisted once at the end, so a failure mid-operation never leaves a
/// half-updated record behind.
pub struct SessionManager {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn load_user(&self, username: &str) -> Result<Option<User>, PersistenceError> {
        let record = self.store.find_one(tables::USERS, |r| {
            r.get("username").and_then(Value::as_str) == Some(username)
        })?;

        Ok(record.as_ref().and_then(User::from_record))
    }

    fn persist_user(&self, user: &User) -> Result<(), PersistenceError> {
        self.store.save(tables::USERS, user.to_record()).map(|_| ())
    }

    fn generate_token(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Open a new session after a successful credential check.
    ///
    /// Purges sessions past the retention window, appends a fresh session
    /// (concurrent logins from the same device are allowed by design), then
    /// enforces the role cap by keeping the most recently used sessions.
    pub fn open_session(
        &self,
        username: &str,
        device_id: &str,
        user_agent_summary: &str,
    ) -> Result<Session, EngineError> {
        let mut user = self
            .load_user(username)?
            .ok_or(AuthError::UserNotFound)?;

        let now = self.clock.now_millis();
        let retention = self.config.retention_millis();

        let before = user.sessions.len();
        user.sessions
            .retain(|s| !is_older_than(s.created_at, retention, now));
        let purged = before - user.sessions.len();
        if purged > 0 {
            debug!(username, purged, "Purged sessions past retention window");
        }

        let session = Session {
            token: self.generate_token(),
            device_id: device_id.to_string(),
            user_agent_summary: user_agent_summary.to_string(),
            created_at: now,
            last_used: now,
        };
        user.sessions.push(session.clone());

        if !user.is_admin() && user.sessions.len() > self.config.user_session_cap {
            let evicted = evict_least_recently_used(
                &mut user.sessions,
                self.config.user_session_cap,
            );
            // Silent for the user; log line only
            warn!(
                username,
                evicted,
                cap = self.config.user_session_cap,
                "Session cap exceeded, evicted least recently used sessions"
            );
        }

        user.last_login = Some(now);
        self.persist_user(&user)?;

        Ok(session)
    }

    /// Fails closed: any missing piece (unknown user, inactive account,
    /// no matching token, failed persist) answers false. A successful
    /// validation stamps the session's `last_used` and persists it.
    pub fn validate(&self, username: &str, token: &str) -> bool {
        let mut user = match self.load_user(username) {
            Ok(Some(user)) => user,
            Ok(None) => return false,
            Err(e) => {
                warn!(username, error = %e, "Session validation failed to load user");
                return false;
            }
        };

        if !user.is_active {
            return false;
        }

        let now = self.clock.now_millis();
        let Some(session) = user.sessions.iter_mut().find(|s| s.token == token) else {
            return false;
        };
        session.last_used = now;

        if let Err(e) = self.persist_user(&user) {
            warn!(username, error = %e, "Failed to persist session touch");
            return false;
        }

        true
    }

    /// Remove the matching session. No-op when the token is already gone.
    pub fn revoke(&self, username: &str, token: &str) -> Result<(), EngineError> {
        let Some(mut user) = self.load_user(username)? else {
            return Ok(());
        };

        let before = user.sessions.len();
        user.sessions.retain(|s| s.token != token);

        if user.sessions.len() != before {
            self.persist_user(&user)?;
            debug!(username, "Session revoked");
        }

        Ok(())
    }

    pub fn list_sessions(&self, username: &str) -> Result<Vec<Session>, EngineError> {
        Ok(self
            .load_user(username)?
            .map(|u| u.sessions)
            .unwrap_or_default())
    }
}

/// Keep the `cap` most recently used sessions, preserving append order
/// among survivors. Returns the number of evicted sessions.
fn evict_least_recently_used(sessions: &mut Vec<Session>, cap: usize) -> usize {
    if sessions.len() <= cap {
        return 0;
    }

    // Ties on last_used break toward the later list position, so a session
    // appended in the same millisecond as its peers is never the one evicted.
    let mut by_recency: Vec<(i64, usize)> = sessions
        .iter()
        .enumerate()
        .map(|(index, s)| (s.last_used, index))
        .collect();
    by_recency.sort_by(|a, b| b.cmp(a));

    let keep: HashSet<usize> = by_recency
        .into_iter()
        .take(cap)
        .map(|(_, index)| index)
        .collect();

    let before = sessions.len();
    let mut index = 0;
    sessions.retain(|_| {
        let kept = keep.contains(&index);
        index += 1;
        kept
    });
    before - sessions.len()
}
