use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppResult;
use crate::storage::KeyValueStore;

#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    debug_key: String,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>, debug_key: impl Into<String>) -> Self {
        Self {
            store,
            debug_key: debug_key.into(),
        }
    }

    pub async fn debug_flag(&self) -> AppResult<bool> {
        let value = self.store.get(&self.debug_key).await?;
        Ok(match value {
            None | Some(Value::Null) => false,
            Some(Value::Bool(enabled)) => enabled,
            Some(other) => {
                warn!(
                    target: "settings",
                    key = %self.debug_key,
                    value = %other,
                    "debug flag is not a boolean; treating as disabled"
                );
                false
            }
        })
    }

    pub async fn set_debug_flag(&self, enabled: bool) -> AppResult<()> {
        self.store
            .set(&self.debug_key, Value::Bool(enabled))
            .await?;
        info!(target: "settings", enabled, "debug flag saved");
        Ok(())
    }
}
