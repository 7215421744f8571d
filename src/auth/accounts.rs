use crate::auth::fingerprint::{fingerprint, FingerprintSource};
use crate::core::error::{AuthError, EngineError, SessionError, ValidationError};
use crate::core::state::{AuthState, CurrentSession, Engine};
use crate::models::audit::AuditLogEntry;
use crate::models::user::{Role, Session, User};
use crate::stores::record_store::tables;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Longest user agent string kept on a session record.
const USER_AGENT_SUMMARY_LEN: usize = 120;

/// Descriptor returned to the view layer on a successful login.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub username: String,
    pub role: Role,
    pub token: String,
    pub device_id: String,
}

/// Structured login result. Errors never cross the view boundary as
/// panics or raw Results; they arrive as the `Failure` variant.
#[derive(Debug)]
pub enum LoginOutcome {
    Success(SessionDescriptor),
    Failure { error: String },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }
}

#[derive(Debug, PartialEq)]
pub enum RegisterOutcome {
    Success,
    Failure { error: String },
}

impl RegisterOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RegisterOutcome::Success)
    }
}

impl Engine {
    fn find_user(&self, username: &str) -> Result<Option<User>, EngineError> {
        let record = self.store.find_one(tables::USERS, |r| {
            r.get("username").and_then(Value::as_str) == Some(username)
        })?;
        Ok(record.as_ref().and_then(User::from_record))
    }

    fn record_audit(&self, action: &str, entity_type: &str, entity_id: &str, details: Value) {
        let actor = self
            .current_session()
            .map(|s| s.username)
            .unwrap_or_else(|| "system".to_string());

        let entry = AuditLogEntry::new(
            action,
            entity_type,
            entity_id,
            details,
            self.clock.now_millis(),
            &actor,
        );

        // The audit trail is advisory; a failed append must not fail the
        // operation that produced it
        if let Err(e) = self.store.save(tables::AUDIT_LOG, entry.to_record()) {
            warn!(action, error = %e, "Failed to append audit entry");
        }
    }

    /// Authenticate and open a session.
    ///
    /// A stored digest that only matches the fallback scheme is re-saved
    /// with the primary digest on the spot; the caller never sees the
    /// upgrade happen.
    pub fn login(&self, username: &str, password: &str) -> LoginOutcome {
        match self.try_login(username, password) {
            Ok(descriptor) => LoginOutcome::Success(descriptor),
            Err(e) => {
                warn!(username, error = %e, "Login rejected");
                LoginOutcome::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    fn try_login(&self, username: &str, password: &str) -> Result<SessionDescriptor, EngineError> {
        let mut user = self
            .find_user(username)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        let matched = self
            .hash
            .verify(&user.password_hash, password)
            .ok_or(AuthError::InvalidCredentials)?;

        if matched.needs_upgrade {
            // Silent credential upgrade: fallback digest verified, replace
            // it with the primary digest before anything else happens
            user.password_hash = self.hash.hash(password);
            self.store.save(tables::USERS, user.to_record())?;
            debug!(username, "Upgraded stored credential to primary digest");
        }

        let device_id = fingerprint(self.fingerprint_source.as_ref());
        let agent = self.fingerprint_source.signals().agent;
        let summary: String = agent.chars().take(USER_AGENT_SUMMARY_LEN).collect();

        let session = self.sessions.open_session(username, &device_id, &summary)?;

        self.store.set_scope(Some(username.to_string()));
        self.timers.reset();
        self.set_current_session(Some(CurrentSession {
            username: username.to_string(),
            token: session.token.clone(),
        }));

        self.record_audit(
            "login",
            "user",
            username,
            json!({ "deviceId": device_id }),
        );
        self.notify_auth_state(&AuthState::logged_in(username, user.role));

        info!(username, device_id = %device_id, "Login succeeded");

        Ok(SessionDescriptor {
            username: username.to_string(),
            role: user.role,
            token: session.token,
            device_id,
        })
    }

    /// End the caller's own session. Always succeeds, even when the token
    /// is already gone.
    pub fn logout(&self) {
        let Some(current) = self.current_session() else {
            return;
        };

        if let Err(e) = self.sessions.revoke(&current.username, &current.token) {
            warn!(username = %current.username, error = %e, "Failed to revoke session on logout");
        }

        self.record_audit("logout", "user", &current.username, json!({}));

        self.set_current_session(None);
        self.store.set_scope(None);
        self.timers.reset();
        self.notify_auth_state(&AuthState::logged_out());

        info!(username = %current.username, "Logged out");
    }

    pub fn register(&self, username: &str, password: &str, role: Role) -> RegisterOutcome {
        match self.try_register(username, password, role) {
            Ok(()) => RegisterOutcome::Success,
            Err(e) => RegisterOutcome::Failure {
                error: e.to_string(),
            },
        }
    }

    fn try_register(&self, username: &str, password: &str, role: Role) -> Result<(), EngineError> {
        let min_username = self.config.auth.min_username_len;
        if username.chars().count() < min_username {
            return Err(ValidationError::UsernameTooShort { min: min_username }.into());
        }

        let min_password = self.config.auth.min_password_len;
        if password.chars().count() < min_password {
            return Err(ValidationError::PasswordTooShort { min: min_password }.into());
        }

        if self.find_user(username)?.is_some() {
            return Err(ValidationError::DuplicateUsername.into());
        }

        let user = User::new(
            username.to_string(),
            self.hash.hash(password),
            role,
            self.clock.now_millis(),
        );
        self.store.save(tables::USERS, user.to_record())?;

        self.record_audit("register", "user", username, json!({ "role": role }));
        info!(username, ?role, "Registered user");

        Ok(())
    }

    /// Re-attach to a previously issued session, e.g. after the embedding
    /// view reloads with a stored token. Fails closed like `validate`.
    pub fn resume_session(&self, username: &str, token: &str) -> Result<SessionDescriptor, EngineError> {
        if !self.sessions.validate(username, token) {
            return Err(SessionError::InvalidToken.into());
        }

        let user = self.find_user(username)?.ok_or(AuthError::UserNotFound)?;

        self.store.set_scope(Some(username.to_string()));
        self.timers.reset();
        self.set_current_session(Some(CurrentSession {
            username: username.to_string(),
            token: token.to_string(),
        }));
        self.notify_auth_state(&AuthState::logged_in(username, user.role));

        Ok(SessionDescriptor {
            username: username.to_string(),
            role: user.role,
            token: token.to_string(),
            device_id: fingerprint(self.fingerprint_source.as_ref()),
        })
    }

    pub fn current_username(&self) -> Option<String> {
        self.current_session().map(|s| s.username)
    }

    pub fn is_admin(&self) -> bool {
        let Some(current) = self.current_session() else {
            return false;
        };

        matches!(
            self.find_user(&current.username),
            Ok(Some(user)) if user.is_admin() && user.is_active
        )
    }

    /// True when `token` is a live session of `username`. Stamps the
    /// session's `lastUsed`; fails closed on any missing piece.
    pub fn validate_session(&self, username: &str, token: &str) -> bool {
        self.sessions.validate(username, token)
    }

    /// Admin-facing revocation of any session. Idempotent.
    pub fn revoke_session(&self, username: &str, token: &str) -> Result<(), EngineError> {
        self.sessions.revoke(username, token)?;
        self.record_audit("revoke_session", "session", username, json!({}));
        Ok(())
    }

    pub fn list_sessions(&self, username: &str) -> Result<Vec<Session>, EngineError> {
        self.sessions.list_sessions(username)
    }

    /// Disable an account. Administrator accounts cannot be disabled.
    pub fn deactivate_user(&self, username: &str) -> Result<(), EngineError> {
        let mut user = self.find_user(username)?.ok_or(AuthError::UserNotFound)?;

        if user.is_admin() {
            return Err(ValidationError::ProtectedAccount.into());
        }

        user.is_active = false;
        self.store.save(tables::USERS, user.to_record())?;
        self.record_audit("deactivate_user", "user", username, json!({}));

        Ok(())
    }

    /// Remove an account. Administrator accounts cannot be removed by any
    /// code path.
    pub fn delete_user(&self, username: &str) -> Result<(), EngineError> {
        let user = self.find_user(username)?.ok_or(AuthError::UserNotFound)?;

        if user.is_admin() {
            return Err(ValidationError::ProtectedAccount.into());
        }

        self.store.delete(tables::USERS, username)?;
        self.record_audit("delete_user", "user", username, json!({}));
        info!(username, "Deleted user");

        Ok(())
    }
}
