use crate::stores::record_store::Mutation;
use crate::sync::remote::RemoteStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort replication of local mutations to the remote store.
///
/// Mutations are queued as the record store applies them and drained by a
/// background task (or `flush()` in tests). Replication failures are logged
/// and swallowed; they never roll back or block the local write, and no
/// ordering is guaranteed between deferred replications. Last local write
/// wins.
pub struct SyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    queue: Mutex<VecDeque<Mutation>>,
    online: AtomicBool,
    max_queue_depth: usize,
}

impl SyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, max_queue_depth: usize) -> Self {
        Self {
            remote,
            queue: Mutex::new(VecDeque::new()),
            online: AtomicBool::new(true),
            max_queue_depth,
        }
    }

    /// Record a local mutation for later replication. Called synchronously
    /// from the store's observer hook, strictly after the local apply.
    /// While offline the work is dropped outright.
    pub fn enqueue(&self, mutation: Mutation) {
        if !self.is_online() {
            debug!(mutation = ?mutation, "Offline, skipping replication");
            return;
        }

        let mut queue = self.queue.lock().expect("sync queue poisoned");

        if queue.len() >= self.max_queue_depth {
            // Oldest entry is the most likely to already be superseded
            queue.pop_front();
            warn!(
                max_depth = self.max_queue_depth,
                "Replication queue full, dropped oldest entry"
            );
        }

        queue.push_back(mutation);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().expect("sync queue poisoned").len()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Drain the queue once. Offline, queued work is discarded outright;
    /// online, each mutation is mirrored and failures are swallowed.
    pub async fn flush(&self) {
        let batch: Vec<Mutation> = {
            let mut queue = self.queue.lock().expect("sync queue poisoned");
            queue.drain(..).collect()
        };

        if batch.is_empty() {
            return;
        }

        if !self.is_online() {
            debug!(dropped = batch.len(), "Offline, discarding replication batch");
            return;
        }

        for mutation in batch {
            let result = match &mutation {
                Mutation::Save { table_key, id, doc } => {
                    self.remote.save(table_key, id, doc).await
                }
                Mutation::Delete { table_key, id } => {
                    self.remote.delete(table_key, Some(id)).await
                }
                Mutation::Clear { table_key } => self.remote.delete(table_key, None).await,
            };

            if let Err(e) = result {
                warn!(
                    mutation = ?mutation,
                    error = %e,
                    "Replication failed, dropping mutation"
                );
            }
        }
    }

    /// Spawn the background drain loop. The handle can be aborted at
    /// shutdown; pending work is simply lost (replication is advisory).
    pub fn spawn_drain(self: &Arc<Self>, flush_interval: Duration) -> tokio::task::JoinHandle<()> {
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                coordinator.flush().await;
            }
        })
    }
}
