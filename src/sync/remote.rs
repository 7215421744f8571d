use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// The remote document store contract. A best-effort replication target:
/// every method may be a complete no-op, and callers must never depend on
/// read-after-write consistency against it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn save(&self, collection: &str, id: &str, doc: &Value) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>>;

    /// `id = None` deletes the whole collection (the reset tool's bulk path).
    async fn delete(&self, collection: &str, id: Option<&str>) -> Result<()>;
}

/// HTTP remote store client.
///
/// Collections map to `{endpoint}/{collection}` and documents to
/// `{endpoint}/{collection}/{id}`. Every request carries the API key and a
/// bounded timeout; an over-deadline call fails and is abandoned upstream.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRemoteStore {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), collection)
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn save(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
        let response = self
            .client
            .put(self.doc_url(collection, id))
            .query(&[("api_key", &self.api_key)])
            .json(doc)
            .send()
            .await
            .context("Failed to send document to remote store")?;

        if !response.status().is_success() {
            bail!("Remote store returned error status: {}", response.status());
        }

        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.doc_url(collection, id))
            .query(&[("api_key", &self.api_key)])
            .send()
            .await
            .context("Failed to fetch document from remote store")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            bail!("Remote store returned error status: {}", response.status());
        }

        let doc = response
            .json::<Value>()
            .await
            .context("Failed to parse document from remote store")?;

        Ok(Some(doc))
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.collection_url(collection))
            .query(&[("api_key", &self.api_key)])
            .send()
            .await
            .context("Failed to fetch collection from remote store")?;

        if !response.status().is_success() {
            bail!("Remote store returned error status: {}", response.status());
        }

        let docs = response
            .json::<Vec<Value>>()
            .await
            .context("Failed to parse collection from remote store")?;

        Ok(docs)
    }

    async fn delete(&self, collection: &str, id: Option<&str>) -> Result<()> {
        let url = match id {
            Some(id) => self.doc_url(collection, id),
            None => self.collection_url(collection),
        };

        let response = self
            .client
            .delete(url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await
            .context("Failed to send delete to remote store")?;

        if !response.status().is_success() {
            bail!("Remote store returned error status: {}", response.status());
        }

        Ok(())
    }
}

/// Remote store for environments without a reachable backend. Accepts
/// everything and stores nothing.
pub struct NullRemoteStore;

#[async_trait]
impl RemoteStore for NullRemoteStore {
    async fn save(&self, _collection: &str, _id: &str, _doc: &Value) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _collection: &str, _id: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn get_all(&self, _collection: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _collection: &str, _id: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Recording in-memory remote for tests. Optionally fails every call to
/// exercise the swallow-and-log policy.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryRemoteStore {
        pub collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
        pub fail_all: AtomicBool,
    }

    impl MemoryRemoteStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail_all.store(failing, Ordering::SeqCst);
        }

        pub fn doc_count(&self, collection: &str) -> usize {
            self.collections
                .lock()
                .unwrap()
                .get(collection)
                .map(|c| c.len())
                .unwrap_or(0)
        }

        fn check(&self) -> Result<()> {
            if self.fail_all.load(Ordering::SeqCst) {
                bail!("remote unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryRemoteStore {
        async fn save(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
            self.check()?;
            self.collections
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), doc.clone());
            Ok(())
        }

        async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
            self.check()?;
            Ok(self
                .collections
                .lock()
                .unwrap()
                .get(collection)
                .and_then(|c| c.get(id))
                .cloned())
        }

        async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
            self.check()?;
            Ok(self
                .collections
                .lock()
                .unwrap()
                .get(collection)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default())
        }

        async fn delete(&self, collection: &str, id: Option<&str>) -> Result<()> {
            self.check()?;
            let mut collections = self.collections.lock().unwrap();
            match id {
                Some(id) => {
                    if let Some(c) = collections.get_mut(collection) {
                        c.remove(id);
                    }
                }
                None => {
                    collections.remove(collection);
                }
            }
            Ok(())
        }
    }
}
