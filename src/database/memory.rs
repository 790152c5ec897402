use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::query::{compare_values, Query, SortDirection};
use super::{DocumentStore, StoreError};

type Collection = BTreeMap<String, Value>;

/// Process-local document store
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn ensure_object(doc: &Value) -> Result<(), StoreError> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        ensure_object(&doc)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), doc);
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        ensure_object(&doc)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn put_many(&self, collection: &str, docs: Vec<(String, Value)>) -> Result<(), StoreError> {
        for (_, doc) in &docs {
            ensure_object(doc)?;
        }
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();
        target.extend(docs);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::NotAnObject);
        };
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let Value::Object(existing) = doc else {
            return Err(StoreError::NotAnObject);
        };
        existing.extend(fields);
        Ok(doc.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Value> = docs.values().filter(|doc| query.matches(doc)).cloned().collect();

        if let Some((field, direction)) = &query.order_by {
            matched.sort_by(|a, b| {
                let ord = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        store.create("media", "a", json!({ "title": "one" })).await.unwrap();
        let err = store.create("media", "a", json!({ "title": "two" })).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn update_merges_top_level_fields() {
        let store = MemoryStore::new();
        store
            .create("api_keys", "k1", json!({ "name": "n", "usage_count": 1 }))
            .await
            .unwrap();
        let merged = store
            .update("api_keys", "k1", json!({ "usage_count": 2 }))
            .await
            .unwrap();
        assert_eq!(merged, json!({ "name": "n", "usage_count": 2 }));

        let missing = store.update("api_keys", "nope", json!({})).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, ts) in [("a", 3), ("b", 1), ("c", 2), ("d", 5)] {
            store.put("reqs", id, json!({ "id": id, "ts": ts })).await.unwrap();
        }
        let q = Query::new()
            .gte("ts", 2)
            .order_by("ts", SortDirection::Desc)
            .limit(2);
        let rows = store.query("reqs", &q).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn put_many_is_idempotent_by_id() {
        let store = MemoryStore::new();
        let batch = vec![
            ("1".to_string(), json!({ "n": 1 })),
            ("2".to_string(), json!({ "n": 2 })),
        ];
        store.put_many("reqs", batch.clone()).await.unwrap();
        store.put_many("reqs", batch).await.unwrap();
        assert_eq!(store.len("reqs").await, 2);
    }
}
