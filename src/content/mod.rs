//! Media library and site settings served behind the key guard.

pub mod media;
pub mod settings;

use thiserror::Error;

use crate::database::StoreError;

pub use media::{MediaInput, MediaRecord, MediaService};
pub use settings::SettingsService;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ContentError {
    fn from(err: serde_json::Error) -> Self {
        ContentError::Store(err.into())
    }
}
