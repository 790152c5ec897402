pub mod memory;
pub mod postgres;
pub mod query;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{FieldFilter, FilterOp, Query, SortDirection};

use crate::config::{DatabaseConfig, StoreBackend};

/// Collection names used by the service
pub mod collections {
    pub const API_KEYS: &str = "api_keys";
    pub const REQUESTS: &str = "analytics_requests";
    pub const MEDIA: &str = "media";
    pub const SETTINGS: &str = "settings";
}

/// Errors from a DocumentStore
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Store operation timed out")]
    Timeout,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Document database consumed by the service. Every call succeeds or fails on its own;
/// there are no multi-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document, failing with `Conflict` when the id is taken
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Insert or replace a document
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Insert or replace many documents as one batch
    async fn put_many(&self, collection: &str, docs: Vec<(String, Value)>) -> Result<(), StoreError> {
        for (id, doc) in docs {
            self.put(collection, &id, doc).await?;
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Merge top-level fields of `patch` into an existing document and return the result
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError>;

    /// Returns false when nothing was deleted
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Build the configured store backend
pub async fn connect(config: &DatabaseConfig) -> Result<SharedStore, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or(StoreError::ConfigMissing("DATABASE_URL"))?;
            let store = PgStore::connect(url, config.max_connections, config.connection_timeout).await?;
            Ok(Arc::new(store))
        }
    }
}
