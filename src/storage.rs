use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    Sync,
    Local,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Sync => "sync",
            StorageArea::Local => "local",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn area(&self) -> StorageArea;

    async fn get(&self, key: &str) -> AppResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> AppResult<()>;
}

pub struct SqliteKeyValueStore {
    db: Arc<Mutex<Connection>>,
    area: StorageArea,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<Mutex<Connection>>, area: StorageArea) -> Self {
        Self { db, area }
    }

    fn wrap(&self, err: impl fmt::Display) -> AppError {
        AppError::storage(self.area, err.to_string())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    fn area(&self) -> StorageArea {
        self.area
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let raw: Option<String> = {
            let conn = self.db.lock();
            conn.query_row(
                "SELECT value FROM storage_entries WHERE area = ?1 AND key = ?2",
                (self.area.as_str(), key),
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| self.wrap(err))?
        };
        debug!(target: "storage", area = %self.area, key, found = raw.is_some(), "storage get");
        raw.map(|text| serde_json::from_str(&text).map_err(|err| self.wrap(err)))
            .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<()> {
        let serialized = serde_json::to_string(&value)?;
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO storage_entries (area, key, value, updated_at)
            VALUES (?1, ?2, ?3, DATETIME('now'))
            ON CONFLICT(area, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (self.area.as_str(), key, serialized.as_str()),
        )
        .map_err(|err| self.wrap(err))?;
        debug!(target: "storage", area = %self.area, key, bytes = serialized.len(), "storage set");
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryKeyValueStore {
    area: StorageArea,
    entries: Arc<Mutex<HashMap<String, Value>>>,
    #[cfg(test)]
    fault_injector: Option<Arc<TestFaultInjector>>,
}

impl MemoryKeyValueStore {
    pub fn new(area: StorageArea) -> Self {
        Self {
            area,
            entries: Arc::new(Mutex::new(HashMap::new())),
            #[cfg(test)]
            fault_injector: None,
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    fn area(&self) -> StorageArea {
        self.area
    }

    async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        #[cfg(test)]
        if self
            .fault_injector
            .as_ref()
            .map(|hooks| hooks.take_get_failure())
            .unwrap_or(false)
        {
            return Err(AppError::storage(self.area, "simulated read failure"));
        }

        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> AppResult<()> {
        #[cfg(test)]
        if self
            .fault_injector
            .as_ref()
            .map(|hooks| hooks.take_set_failure())
            .unwrap_or(false)
        {
            return Err(AppError::storage(self.area, "simulated write failure"));
        }

        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct TestFaultInjector {
    get_failure: AtomicBool,
    set_failure: AtomicBool,
}

#[cfg(test)]
impl TestFaultInjector {
    pub fn fail_next_get(&self) {
        self.get_failure.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_set(&self) {
        self.set_failure.store(true, Ordering::SeqCst);
    }

    fn take_get_failure(&self) -> bool {
        self.get_failure.swap(false, Ordering::SeqCst)
    }

    fn take_set_failure(&self) -> bool {
        self.set_failure.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl MemoryKeyValueStore {
    pub fn enable_test_hooks(&mut self) -> Arc<TestFaultInjector> {
        let hooks = Arc::new(TestFaultInjector::default());
        self.fault_injector = Some(hooks.clone());
        hooks
    }
}
