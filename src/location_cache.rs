use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub location: Option<String>,
    pub timestamp: f64,
}

impl LocationEntry {
    pub fn new(location: Option<String>, timestamp: f64) -> Self {
        Self {
            location,
            timestamp,
        }
    }

    fn from_stored(value: &Value) -> Self {
        let location = value
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_f64)
            .filter(|ts| ts.is_finite())
            .unwrap_or(0.0);
        Self {
            location,
            timestamp,
        }
    }
}

pub type LocationCacheMap = BTreeMap<String, LocationEntry>;

#[derive(Clone)]
pub struct LocationCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn read(&self) -> AppResult<LocationCacheMap> {
        let cache = match self.store.get(&self.key).await? {
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(username, entry)| (username.clone(), LocationEntry::from_stored(entry)))
                .collect(),
            Some(Value::Null) | None => LocationCacheMap::new(),
            Some(other) => {
                warn!(
                    target: "location_cache",
                    key = %self.key,
                    kind = value_kind(&other),
                    "location cache is not an object; treating as empty"
                );
                LocationCacheMap::new()
            }
        };
        debug!(target: "location_cache", entries = cache.len(), "location cache read");
        Ok(cache)
    }

    pub async fn write(&self, cache: &LocationCacheMap) -> AppResult<()> {
        let mut entries = Map::with_capacity(cache.len());
        for (username, entry) in cache {
            entries.insert(username.clone(), serde_json::to_value(entry)?);
        }
        self.store.set(&self.key, Value::Object(entries)).await?;
        debug!(target: "location_cache", entries = cache.len(), "location cache written");
        Ok(())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
