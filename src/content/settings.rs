use serde_json::{json, Value};

use crate::database::{collections, SharedStore, StoreError};

use super::ContentError;

const SITE_SETTINGS_ID: &str = "site";

/// Free-form site settings kept as one document
#[derive(Clone)]
pub struct SettingsService {
    store: SharedStore,
}

impl SettingsService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Empty object until something has been saved
    pub async fn get(&self) -> Result<Value, ContentError> {
        let doc = self.store.get(collections::SETTINGS, SITE_SETTINGS_ID).await?;
        Ok(doc.unwrap_or_else(|| json!({})))
    }

    /// Merges `patch` into the stored settings
    pub async fn update(&self, patch: Value) -> Result<Value, ContentError> {
        if !patch.is_object() {
            return Err(ContentError::Validation {
                field: "settings",
                message: "Settings must be a JSON object".to_string(),
            });
        }
        match self.store.update(collections::SETTINGS, SITE_SETTINGS_ID, patch.clone()).await {
            Ok(merged) => Ok(merged),
            Err(StoreError::NotFound { .. }) => {
                self.store.put(collections::SETTINGS, SITE_SETTINGS_ID, patch.clone()).await?;
                Ok(patch)
            }
            Err(e) => Err(e.into()),
        }
    }
}
