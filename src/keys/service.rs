use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::capability;
use crate::database::{collections, Query, SharedStore};

use super::{generate_key_string, AccessType, KeyError, KeyRecord};

const MAX_NAME_LEN: usize = 100;
const MAX_EXPIRY_DAYS: u32 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub access_type: String,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

/// Administrative key lifecycle: create, list, look up, revoke
#[derive(Clone)]
pub struct KeyService {
    store: SharedStore,
}

impl KeyService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn generate_key(&self, request: GenerateKeyRequest) -> Result<KeyRecord, KeyError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(KeyError::validation("name", "Name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(KeyError::validation(
                "name",
                format!("Name must be at most {} characters", MAX_NAME_LEN),
            ));
        }

        let access_type = AccessType::parse(&request.access_type)?;
        let capabilities = match (access_type.preset(), request.capabilities) {
            (None, Some(custom)) => capability::normalize_all(&custom)?,
            (None, None) => {
                return Err(KeyError::validation(
                    "capabilities",
                    "Custom access requires a capability list",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(KeyError::validation(
                    "capabilities",
                    "Capabilities may only be given with custom access",
                ))
            }
            (Some(preset), None) => capability::preset_capabilities(preset)?,
        };

        let now = Utc::now();
        let expires_at = match request.expires_in_days {
            None => None,
            Some(days) if (1..=MAX_EXPIRY_DAYS).contains(&days) => Some(now + Duration::days(i64::from(days))),
            Some(_) => {
                return Err(KeyError::validation(
                    "expires_in_days",
                    format!("Expiry must be between 1 and {} days", MAX_EXPIRY_DAYS),
                ))
            }
        };

        let record = KeyRecord {
            id: Uuid::new_v4().to_string(),
            key: generate_key_string(),
            name: name.to_string(),
            description: request.description.unwrap_or_default().trim().to_string(),
            access_type,
            capabilities,
            active: true,
            created_at: now,
            expires_at,
            last_used_at: None,
            usage_count: 0,
            revoked_at: None,
        };

        let doc = serde_json::to_value(&record)?;
        self.store.create(collections::API_KEYS, &record.id, doc).await?;

        info!(key_id = %record.id, access_type = ?record.access_type, "Created API key '{}'", record.name);
        Ok(record)
    }

    /// All keys, newest first
    pub async fn list_keys(&self) -> Result<Vec<KeyRecord>, KeyError> {
        let docs = self.store.query(collections::API_KEYS, &Query::new()).await?;
        let mut records = docs
            .into_iter()
            .map(serde_json::from_value::<KeyRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get_key(&self, id: &str) -> Result<Option<KeyRecord>, KeyError> {
        let doc = self.store.get(collections::API_KEYS, id).await?;
        Ok(doc.map(serde_json::from_value).transpose()?)
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<KeyRecord>, KeyError> {
        let docs = self
            .store
            .query(collections::API_KEYS, &Query::new().eq("key", key).limit(1))
            .await?;
        Ok(docs.into_iter().next().map(serde_json::from_value).transpose()?)
    }

    /// Soft revoke clears the active flag and keeps the record; hard revoke deletes it.
    /// Returns the record as it stands after a soft revoke, `None` after a hard one.
    pub async fn revoke_key(&self, id: &str, hard: bool) -> Result<Option<KeyRecord>, KeyError> {
        if hard {
            if !self.store.delete(collections::API_KEYS, id).await? {
                return Err(KeyError::NotFound(id.to_string()));
            }
            info!(key_id = %id, "Deleted API key");
            return Ok(None);
        }

        if self.get_key(id).await?.is_none() {
            return Err(KeyError::NotFound(id.to_string()));
        }
        let doc = self
            .store
            .update(
                collections::API_KEYS,
                id,
                json!({ "active": false, "revoked_at": Utc::now() }),
            )
            .await?;
        info!(key_id = %id, "Deactivated API key");
        Ok(Some(serde_json::from_value(doc)?))
    }
}
