use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capability;
use crate::database::{collections, SharedStore, StoreError};

use super::{AccessType, KeyError, KeyRecord, KeyService, UsageTracker};

/// Identity of a key that passed validation, attached to the request for telemetry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub id: String,
    pub name: String,
}

const BOOTSTRAP_KEY_ID: &str = "bootstrap";

/// Resolves presented API keys and checks them against a route's required capability
#[derive(Clone)]
pub struct KeyValidator {
    store: SharedStore,
    keys: KeyService,
    usage: UsageTracker,
    lookup_timeout: Duration,
    bootstrap_key: Option<Arc<str>>,
}

impl KeyValidator {
    pub fn new(
        store: SharedStore,
        usage: UsageTracker,
        lookup_timeout: Duration,
        bootstrap_key: Option<String>,
    ) -> Self {
        Self {
            keys: KeyService::new(store.clone()),
            store,
            usage,
            lookup_timeout,
            bootstrap_key: bootstrap_key.map(Arc::from),
        }
    }

    pub async fn authorize(&self, presented: Option<&str>, required: &str) -> Result<AuthorizedKey, KeyError> {
        let key = presented
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(KeyError::Missing)?;

        let record = match tokio::time::timeout(self.lookup_timeout, self.resolve(key)).await {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => return Err(KeyError::Invalid),
            Ok(Err(e)) => {
                warn!(error = %e, "API key lookup failed; denying request");
                return Err(KeyError::LookupTimeout);
            }
            Err(_) => {
                warn!("API key lookup exceeded {:?}; denying request", self.lookup_timeout);
                return Err(KeyError::LookupTimeout);
            }
        };

        let now = Utc::now();
        if !record.is_usable(now) {
            debug!(key_id = %record.id, "Rejected inactive or expired API key");
            return Err(KeyError::InactiveOrExpired);
        }
        if !record.grants(required) {
            debug!(key_id = %record.id, required, "API key lacks capability");
            return Err(KeyError::Forbidden {
                required: required.to_string(),
            });
        }

        self.usage.record(&record.id, now);

        Ok(AuthorizedKey {
            id: record.id,
            name: record.name,
        })
    }

    async fn resolve(&self, key: &str) -> Result<Option<KeyRecord>, KeyError> {
        if let Some(record) = self.keys.find_by_key(key).await? {
            return Ok(Some(record));
        }
        match self.bootstrap_key.as_deref() {
            Some(bootstrap) if bootstrap == key => self.provision_bootstrap(key).await.map(Some),
            _ => Ok(None),
        }
    }

    /// First use of the configured bootstrap key creates its read-only record
    async fn provision_bootstrap(&self, key: &str) -> Result<KeyRecord, KeyError> {
        let record = KeyRecord {
            id: BOOTSTRAP_KEY_ID.to_string(),
            key: key.to_string(),
            name: "bootstrap".to_string(),
            description: "Provisioned on first use".to_string(),
            access_type: AccessType::ReadOnly,
            capabilities: capability::preset_capabilities("read_only")?,
            active: true,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
            usage_count: 0,
            revoked_at: None,
        };

        let doc = serde_json::to_value(&record)?;
        match self.store.create(collections::API_KEYS, BOOTSTRAP_KEY_ID, doc).await {
            Ok(()) => {
                info!("Provisioned bootstrap API key on first use");
                Ok(record)
            }
            // A concurrent request won the race, or the id is held by a key with a different secret
            Err(StoreError::Conflict { .. }) => {
                let existing = self.keys.get_key(BOOTSTRAP_KEY_ID).await?;
                existing.filter(|r| r.key == key).ok_or(KeyError::Invalid)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DocumentStore, MemoryStore, Query};
    use crate::keys::GenerateKeyRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn validator_with(store: SharedStore, bootstrap: Option<&str>) -> (KeyValidator, UsageTracker) {
        let usage = UsageTracker::new(store.clone());
        let validator = KeyValidator::new(
            store,
            usage.clone(),
            Duration::from_millis(200),
            bootstrap.map(String::from),
        );
        (validator, usage)
    }

    async fn custom_key(store: &SharedStore, caps: &[&str]) -> KeyRecord {
        KeyService::new(store.clone())
            .generate_key(GenerateKeyRequest {
                name: "K".to_string(),
                description: None,
                access_type: "custom".to_string(),
                capabilities: Some(caps.iter().map(|c| c.to_string()).collect()),
                expires_in_days: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn grants_and_counts_then_forbids_missing_capability() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (validator, usage) = validator_with(store.clone(), None);
        let key = custom_key(&store, &[capability::READ_MEDIA]).await;

        let authorized = validator
            .authorize(Some(&key.key), capability::READ_MEDIA)
            .await
            .unwrap();
        assert_eq!(authorized.id, key.id);

        usage.flush().await;
        let stored = KeyService::new(store.clone()).get_key(&key.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert!(stored.last_used_at.is_some());

        let err = validator
            .authorize(Some(&key.key), capability::WRITE_MEDIA)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn missing_and_unknown_keys_are_unauthorized() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (validator, _) = validator_with(store, None);

        assert!(matches!(
            validator.authorize(None, capability::READ).await,
            Err(KeyError::Missing)
        ));
        assert!(matches!(
            validator.authorize(Some("   "), capability::READ).await,
            Err(KeyError::Missing)
        ));
        assert!(matches!(
            validator.authorize(Some("mv_nope"), capability::READ).await,
            Err(KeyError::Invalid)
        ));
    }

    #[tokio::test]
    async fn inactive_or_expired_keys_fail_even_with_capability() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (validator, _) = validator_with(store.clone(), None);

        let revoked = custom_key(&store, &[capability::READ]).await;
        KeyService::new(store.clone())
            .revoke_key(&revoked.id, false)
            .await
            .unwrap();
        assert!(matches!(
            validator.authorize(Some(&revoked.key), capability::READ).await,
            Err(KeyError::InactiveOrExpired)
        ));

        let expired = custom_key(&store, &[capability::READ]).await;
        store
            .update(
                collections::API_KEYS,
                &expired.id,
                json!({ "expires_at": Utc::now() - chrono::Duration::minutes(1) }),
            )
            .await
            .unwrap();
        assert!(matches!(
            validator.authorize(Some(&expired.key), capability::READ).await,
            Err(KeyError::InactiveOrExpired)
        ));
    }

    #[tokio::test]
    async fn bootstrap_key_is_provisioned_once() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (validator, _) = validator_with(store.clone(), Some("mv_bootstrap_secret"));

        let first = validator
            .authorize(Some("mv_bootstrap_secret"), capability::READ_MEDIA)
            .await
            .unwrap();
        let second = validator
            .authorize(Some("mv_bootstrap_secret"), capability::READ_MEDIA)
            .await
            .unwrap();
        assert_eq!(first.id, BOOTSTRAP_KEY_ID);
        assert_eq!(first, second);

        let keys = KeyService::new(store).list_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].access_type, AccessType::ReadOnly);

        // read_only does not grant writes
        assert!(matches!(
            validator.authorize(Some("mv_bootstrap_secret"), capability::WRITE_MEDIA).await,
            Err(KeyError::Forbidden { .. })
        ));
    }

    struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn create(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
            Ok(())
        }
        async fn put(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get(&self, _: &str, _: &str) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }
        async fn update(&self, c: &str, id: &str, _: Value) -> Result<Value, StoreError> {
            Err(StoreError::not_found(c, id))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn query(&self, _: &str, _: &Query) -> Result<Vec<Value>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
        async fn health_check(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_lookup_fails_closed() {
        let (validator, _) = validator_with(Arc::new(StalledStore), None);
        let err = validator
            .authorize(Some("mv_anything"), capability::READ)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::LookupTimeout));
    }
}
