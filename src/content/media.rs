use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::database::{collections, Query, SharedStore};

use super::ContentError;

const MAX_TITLE_LEN: usize = 200;
const MEDIA_TYPES: &[&str] = &["image", "video", "audio", "document"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub media_type: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/replace payload; absent fields keep their current value on update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub media_type: Option<String>,
    pub url: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct MediaService {
    store: SharedStore,
}

impl MediaService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Newest first
    pub async fn list(&self) -> Result<Vec<MediaRecord>, ContentError> {
        let docs = self.store.query(collections::MEDIA, &Query::new()).await?;
        let mut records = docs
            .into_iter()
            .map(serde_json::from_value::<MediaRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<MediaRecord, ContentError> {
        let doc = self
            .store
            .get(collections::MEDIA, id)
            .await?
            .ok_or_else(|| ContentError::NotFound(id.to_string()))?;
        Ok(serde_json::from_value(doc)?)
    }

    pub async fn create(&self, input: MediaInput) -> Result<MediaRecord, ContentError> {
        let now = Utc::now();
        let record = MediaRecord {
            id: Uuid::new_v4().to_string(),
            title: input.title.unwrap_or_default(),
            description: input.description.unwrap_or_default(),
            media_type: input.media_type.unwrap_or_default(),
            url: input.url.unwrap_or_default(),
            tags: input.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        validate(&record)?;

        self.store
            .create(collections::MEDIA, &record.id, serde_json::to_value(&record)?)
            .await?;
        info!(media_id = %record.id, "Created media '{}'", record.title);
        Ok(record)
    }

    pub async fn update(&self, id: &str, input: MediaInput) -> Result<MediaRecord, ContentError> {
        let mut record = self.get(id).await?;
        if let Some(title) = input.title {
            record.title = title;
        }
        if let Some(description) = input.description {
            record.description = description;
        }
        if let Some(media_type) = input.media_type {
            record.media_type = media_type;
        }
        if let Some(url) = input.url {
            record.url = url;
        }
        if let Some(tags) = input.tags {
            record.tags = tags;
        }
        record.updated_at = Utc::now();
        validate(&record)?;

        self.store
            .put(collections::MEDIA, id, serde_json::to_value(&record)?)
            .await?;
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ContentError> {
        if !self.store.delete(collections::MEDIA, id).await? {
            return Err(ContentError::NotFound(id.to_string()));
        }
        info!(media_id = %id, "Deleted media");
        Ok(())
    }
}

fn validate(record: &MediaRecord) -> Result<(), ContentError> {
    let title = record.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ContentError::Validation {
            field: "title",
            message: format!("Title must be 1 to {} characters", MAX_TITLE_LEN),
        });
    }
    if !MEDIA_TYPES.contains(&record.media_type.as_str()) {
        return Err(ContentError::Validation {
            field: "media_type",
            message: format!("Media type must be one of: {}", MEDIA_TYPES.join(", ")),
        });
    }
    if record.url.trim().is_empty() {
        return Err(ContentError::Validation {
            field: "url",
            message: "URL is required".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use std::sync::Arc;

    fn image(title: &str) -> MediaInput {
        MediaInput {
            title: Some(title.to_string()),
            media_type: Some("image".to_string()),
            url: Some(format!("https://cdn.example.com/{}.png", title)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_update_delete() {
        let media = MediaService::new(Arc::new(MemoryStore::new()));
        let created = media.create(image("sunset")).await.unwrap();
        assert_eq!(media.list().await.unwrap().len(), 1);

        let updated = media
            .update(
                &created.id,
                MediaInput {
                    tags: Some(vec!["sky".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "sunset");
        assert_eq!(updated.tags, vec!["sky"]);

        media.delete(&created.id).await.unwrap();
        assert!(matches!(media.get(&created.id).await, Err(ContentError::NotFound(_))));
        assert!(matches!(media.delete(&created.id).await, Err(ContentError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_unknown_media_type() {
        let media = MediaService::new(Arc::new(MemoryStore::new()));
        let mut input = image("clip");
        input.media_type = Some("hologram".into());
        assert!(matches!(
            media.create(input).await,
            Err(ContentError::Validation { field: "media_type", .. })
        ));
    }
}
