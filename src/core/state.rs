// Engine wiring (the application-state analog for embedders)

use crate::auth::fingerprint::{FingerprintSource, SystemFingerprintSource};
use crate::auth::hash::HashManager;
use crate::auth::session_manager::SessionManager;
use crate::consistency::checker::ConsistencyChecker;
use crate::core::config::Config;
use crate::models::user::Role;
use crate::progress::timer::TimerTracker;
use crate::stores::record_store::RecordStore;
use crate::sync::coordinator::SyncCoordinator;
use crate::sync::remote::{HttpRemoteStore, NullRemoteStore, RemoteStore};
use crate::utils::time::{Clock, SystemClock};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Snapshot handed to auth-state subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub logged_in: bool,
    pub username: Option<String>,
    pub role: Option<Role>,
}

impl AuthState {
    pub fn logged_out() -> Self {
        Self {
            logged_in: false,
            username: None,
            role: None,
        }
    }

    pub fn logged_in(username: &str, role: Role) -> Self {
        Self {
            logged_in: true,
            username: Some(username.to_string()),
            role: Some(role),
        }
    }
}

type AuthCallback = Box<dyn Fn(&AuthState) + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) struct CurrentSession {
    pub username: String,
    pub token: String,
}

/// The engine instance. Explicitly constructed with its dependencies
/// (record store, clock, fingerprint source, remote store) injected at
/// creation so tests can run fully deterministic.
pub struct Engine {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<RecordStore>,
    pub(crate) sessions: SessionManager,
    pub(crate) hash: Arc<HashManager>,
    pub(crate) fingerprint_source: Arc<dyn FingerprintSource>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timers: TimerTracker,
    sync: Arc<SyncCoordinator>,
    checker: ConsistencyChecker,
    current: RwLock<Option<CurrentSession>>,
    subscribers: Mutex<Vec<(u64, AuthCallback)>>,
    next_subscription: AtomicU64,
}

impl Engine {
    /// Build an engine with production parts: system clock, process
    /// fingerprint source, and an HTTP remote when sync is enabled.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let remote: Arc<dyn RemoteStore> = if config.sync.enabled {
            Arc::new(
                HttpRemoteStore::new(
                    config.sync.endpoint.clone(),
                    config.sync.api_key.clone(),
                    Duration::from_millis(config.sync.request_timeout_ms),
                )
                .context("Failed to create remote store client")?,
            )
        } else {
            Arc::new(NullRemoteStore)
        };

        Self::with_parts(
            config,
            Arc::new(SystemClock),
            Arc::new(SystemFingerprintSource),
            remote,
        )
    }

    /// Build an engine from injected parts. This is the seam tests use to
    /// pin a fake clock, a fixed fingerprint, and a recording remote.
    pub fn with_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        fingerprint_source: Arc<dyn FingerprintSource>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Arc<Self>> {
        let config = Arc::new(config);

        let store = Arc::new(RecordStore::new(
            config.storage.data_dir.clone(),
            Arc::clone(&clock),
        )?);

        let hash = Arc::new(HashManager::new(&config.auth.static_salt));

        let sessions = SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.sessions.clone(),
        );

        let sync = Arc::new(SyncCoordinator::new(remote, config.sync.max_queue_depth));
        sync.set_online(config.sync.enabled);

        let checker = ConsistencyChecker::new(
            Arc::clone(&store),
            Arc::clone(&hash),
            Arc::clone(&clock),
            config.auth.clone(),
        );

        let timers = TimerTracker::new(Arc::clone(&store), Arc::clone(&clock));

        let engine = Arc::new(Self {
            config,
            store,
            sessions,
            hash,
            fingerprint_source,
            clock,
            timers,
            sync,
            checker,
            current: RwLock::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        });

        // Local apply happens inside the store; the observer only queues
        // the already-applied mutation for deferred replication.
        let observer_sync = Arc::clone(&engine.sync);
        engine
            .store
            .set_observer(Arc::new(move |mutation| observer_sync.enqueue(mutation)));

        Ok(engine)
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    pub fn checker(&self) -> &ConsistencyChecker {
        &self.checker
    }

    /// Spawn the background replication drain task. Call inside a tokio
    /// runtime after `init`.
    pub fn start_replication(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.sync
            .spawn_drain(Duration::from_millis(self.config.sync.flush_interval_ms))
    }

    pub(crate) fn current_session(&self) -> Option<CurrentSession> {
        self.current.read().expect("current session lock poisoned").clone()
    }

    pub(crate) fn set_current_session(&self, session: Option<CurrentSession>) {
        *self.current.write().expect("current session lock poisoned") = session;
    }

    /// Register an auth-state subscriber. Returns a handle for `unsubscribe`.
    pub fn on_auth_state_change<F>(&self, callback: F) -> u64
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, subscription: u64) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .retain(|(id, _)| *id != subscription);
    }

    pub(crate) fn notify_auth_state(&self, state: &AuthState) {
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        for (_, callback) in subscribers.iter() {
            callback(state);
        }
    }
}
