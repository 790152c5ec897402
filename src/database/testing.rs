//! In-memory store with switchable write faults for background-task tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{DocumentStore, MemoryStore, Query, StoreError};

/// `put_many` and `update` can be made to fail or to stall; every other call goes straight through
#[derive(Default)]
pub struct ControlledStore {
    pub inner: MemoryStore,
    failing: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl ControlledStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ControlledStore {
    async fn create(&self, c: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.inner.create(c, id, doc).await
    }
    async fn put(&self, c: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.inner.put(c, id, doc).await
    }
    async fn put_many(&self, c: &str, docs: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.before_write().await?;
        self.inner.put_many(c, docs).await
    }
    async fn get(&self, c: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(c, id).await
    }
    async fn update(&self, c: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        self.before_write().await?;
        self.inner.update(c, id, patch).await
    }
    async fn delete(&self, c: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(c, id).await
    }
    async fn query(&self, c: &str, q: &Query) -> Result<Vec<Value>, StoreError> {
        self.inner.query(c, q).await
    }
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
