use crate::core::error::PersistenceError;
use crate::utils::time::Clock;
use anyhow::Context;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Well-known table names.
pub mod tables {
    pub const USERS: &str = "users";
    pub const LESSON_PROGRESS: &str = "lesson_progress";
    pub const AUDIT_LOG: &str = "audit_log";
    pub const SETTINGS: &str = "settings";

    /// Tables holding cross-user data. Never namespaced by the current scope.
    pub const GLOBAL: &[&str] = &[USERS, AUDIT_LOG, SETTINGS];
}

/// A mutation that was applied to the local store. Carries the resolved
/// storage key so the replication layer can mirror it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Save { table_key: String, id: String, doc: Value },
    Delete { table_key: String, id: String },
    Clear { table_key: String },
}

pub type MutationObserver = Arc<dyn Fn(Mutation) + Send + Sync>;

/// Scoped JSON table store. The authoritative state of the system.
///
/// Each table is a flat ordered list of JSON objects with a unique `id`
/// field, cached in memory and flushed to one file per table key on every
/// mutation. Operations run to completion without suspending; nothing else
/// in the engine may be read ahead of this store.
pub struct RecordStore {
    data_dir: PathBuf,
    tables: DashMap<String, Vec<Value>>,
    scope: RwLock<Option<String>>,
    clock: Arc<dyn Clock>,
    observer: RwLock<Option<MutationObserver>>,
}

impl RecordStore {
    pub fn new(data_dir: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&data_dir).map_err(|e| PersistenceError::Write {
            table: data_dir.display().to_string(),
            source: anyhow::Error::new(e).context("Failed to create data directory"),
        })?;

        Ok(Self {
            data_dir,
            tables: DashMap::new(),
            scope: RwLock::new(None),
            clock,
            observer: RwLock::new(None),
        })
    }

    /// Install the replication observer. Called once during engine wiring;
    /// the observer runs strictly after each local apply.
    pub fn set_observer(&self, observer: MutationObserver) {
        *self.observer.write().expect("observer lock poisoned") = Some(observer);
    }

    /// Namespace per-user tables under `username` until the scope changes.
    pub fn set_scope(&self, username: Option<String>) {
        *self.scope.write().expect("scope lock poisoned") = username;
    }

    pub fn current_scope(&self) -> Option<String> {
        self.scope.read().expect("scope lock poisoned").clone()
    }

    /// Storage key for a table: global tables map to themselves, per-user
    /// tables get a `__username` suffix while a scope is set.
    pub fn table_key(&self, table: &str) -> String {
        if tables::GLOBAL.contains(&table) {
            return table.to_string();
        }

        match self.current_scope() {
            Some(user) => format!("{}__{}", table, user),
            None => table.to_string(),
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", key))
    }

    fn load(&self, key: &str) -> Result<(), PersistenceError> {
        if self.tables.contains_key(key) {
            return Ok(());
        }

        let path = self.file_path(key);
        let records = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).map_err(|e| PersistenceError::Read {
                    table: key.to_string(),
                    source: anyhow::Error::new(e).context("Failed to read table file"),
                })?;

            match serde_json::from_str::<Vec<Value>>(&contents) {
                Ok(records) => records,
                Err(e) => {
                    // A corrupt table file must not brick the engine; start
                    // the table empty and keep the authoritative in-memory copy.
                    warn!(
                        table = key,
                        error = %e,
                        "Table file is not a JSON record list, starting empty"
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        self.tables.insert(key.to_string(), records);
        Ok(())
    }

    fn persist(&self, key: &str, records: &[Value]) -> Result<(), PersistenceError> {
        let contents = serde_json::to_vec(records)
            .context("Failed to serialize table")
            .map_err(|source| PersistenceError::Write {
                table: key.to_string(),
                source,
            })?;

        std::fs::write(self.file_path(key), contents).map_err(|e| PersistenceError::Write {
            table: key.to_string(),
            source: anyhow::Error::new(e).context("Failed to write table file"),
        })
    }

    fn notify(&self, mutation: Mutation) {
        let observer = self.observer.read().expect("observer lock poisoned");
        if let Some(observer) = observer.as_ref() {
            observer(mutation);
        }
    }

    fn generate_id(&self) -> String {
        format!(
            "{:x}-{:06x}",
            self.clock.now_millis(),
            rand::random::<u32>() & 0xff_ffff
        )
    }

    /// Upsert a record by its `id`, generating one if absent. Stamps
    /// `timestamp` on first save and `updatedAt` on every save. Returns the
    /// stored record.
    pub fn save(&self, table: &str, record: Value) -> Result<Value, PersistenceError> {
        let mut doc = match record {
            Value::Object(_) => record,
            other => {
                return Err(PersistenceError::MalformedRecord {
                    table: table.to_string(),
                    reason: format!("expected a JSON object, got {}", other),
                })
            }
        };

        let key = self.table_key(table);
        self.load(&key)?;

        let id = match doc.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = self.generate_id();
                doc["id"] = json!(id);
                id
            }
        };

        let now = self.clock.now_millis();
        if doc.get("timestamp").map_or(true, Value::is_null) {
            doc["timestamp"] = json!(now);
        }
        doc["updatedAt"] = json!(now);

        {
            let mut records = self
                .tables
                .get_mut(&key)
                .expect("table loaded before mutation");

            // Remember what the slot held so a failed flush can be undone;
            // the in-memory copy is authoritative and must never disagree
            // with what the caller was told.
            let position = records
                .iter()
                .position(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()));
            let previous = position.map(|i| records[i].clone());

            match position {
                Some(i) => records[i] = doc.clone(),
                None => records.push(doc.clone()),
            }

            if let Err(e) = self.persist(&key, &records) {
                match previous {
                    Some(prev) => {
                        let i = position.expect("previous implies position");
                        records[i] = prev;
                    }
                    None => {
                        records.pop();
                    }
                }
                return Err(e);
            }
        }

        self.notify(Mutation::Save {
            table_key: key,
            id,
            doc: doc.clone(),
        });

        Ok(doc)
    }

    pub fn get_all(&self, table: &str) -> Result<Vec<Value>, PersistenceError> {
        let key = self.table_key(table);
        self.load(&key)?;

        Ok(self
            .tables
            .get(&key)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    pub fn find_one<F>(&self, table: &str, predicate: F) -> Result<Option<Value>, PersistenceError>
    where
        F: Fn(&Value) -> bool,
    {
        let key = self.table_key(table);
        self.load(&key)?;

        Ok(self
            .tables
            .get(&key)
            .and_then(|records| records.iter().find(|r| predicate(r)).cloned()))
    }

    pub fn find_many<F>(&self, table: &str, predicate: F) -> Result<Vec<Value>, PersistenceError>
    where
        F: Fn(&Value) -> bool,
    {
        let key = self.table_key(table);
        self.load(&key)?;

        Ok(self
            .tables
            .get(&key)
            .map(|records| records.iter().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default())
    }

    /// Remove a record by id. Returns whether a record was removed.
    pub fn delete(&self, table: &str, id: &str) -> Result<bool, PersistenceError> {
        let key = self.table_key(table);
        self.load(&key)?;

        let removed = {
            let mut records = self
                .tables
                .get_mut(&key)
                .expect("table loaded before mutation");

            let position = records
                .iter()
                .position(|r| r.get("id").and_then(Value::as_str) == Some(id));

            match position {
                Some(i) => {
                    let removed_doc = records.remove(i);
                    if let Err(e) = self.persist(&key, &records) {
                        records.insert(i, removed_doc);
                        return Err(e);
                    }
                    true
                }
                None => false,
            }
        };

        if removed {
            self.notify(Mutation::Delete {
                table_key: key,
                id: id.to_string(),
            });
        }

        Ok(removed)
    }

    pub fn clear(&self, table: &str) -> Result<(), PersistenceError> {
        let key = self.table_key(table);
        self.load(&key)?;

        let previous = self.tables.insert(key.clone(), Vec::new());
        if let Err(e) = self.persist(&key, &[]) {
            self.tables
                .insert(key.clone(), previous.unwrap_or_default());
            return Err(e);
        }

        self.notify(Mutation::Clear { table_key: key });

        Ok(())
    }
}
