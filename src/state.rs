use std::sync::Arc;

use crate::auth::{IdentityProvider, JwtIdentityProvider};
use crate::config::AppConfig;
use crate::content::{MediaService, SettingsService};
use crate::database::SharedStore;
use crate::keys::{KeyService, KeyValidator, UsageTracker};
use crate::telemetry::{Aggregator, TelemetryBuffer, TelemetryPersister};

/// Shared handles for handlers and middleware. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedStore,
    pub identity: Arc<dyn IdentityProvider>,
    pub keys: KeyService,
    pub validator: KeyValidator,
    pub usage: UsageTracker,
    pub telemetry: Arc<TelemetryBuffer>,
    pub persister: Arc<TelemetryPersister>,
    pub aggregator: Arc<Aggregator>,
    pub media: MediaService,
    pub settings: SettingsService,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: SharedStore) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(JwtIdentityProvider::from_config(&config.security));
        Self::with_identity(config, store, identity)
    }

    pub fn with_identity(config: Arc<AppConfig>, store: SharedStore, identity: Arc<dyn IdentityProvider>) -> Self {
        let usage = UsageTracker::new(store.clone());
        let keys = KeyService::new(store.clone());
        let validator = KeyValidator::new(
            store.clone(),
            usage.clone(),
            config.security.key_lookup_timeout(),
            config.security.bootstrap_api_key.clone(),
        );

        let telemetry = Arc::new(TelemetryBuffer::new(config.analytics.max_buffered));
        let persister = Arc::new(TelemetryPersister::new(
            telemetry.clone(),
            store.clone(),
            config.analytics.flush_timeout(),
        ));
        let aggregator = Arc::new(Aggregator::new(
            persister.clone(),
            telemetry.clone(),
            keys.clone(),
            usage.clone(),
            config.analytics.clone(),
        ));

        Self {
            media: MediaService::new(store.clone()),
            settings: SettingsService::new(store.clone()),
            config,
            store,
            identity,
            keys,
            validator,
            usage,
            telemetry,
            persister,
            aggregator,
        }
    }
}
