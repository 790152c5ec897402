pub mod model;
pub mod service;
pub mod usage;
pub mod validator;

use thiserror::Error;

use crate::capability::CapabilityError;
use crate::database::StoreError;

pub use model::{generate_key_string, AccessType, KeyRecord};
pub use service::{GenerateKeyRequest, KeyService};
pub use usage::{PendingUsage, UsageTracker};
pub use validator::{AuthorizedKey, KeyValidator};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("API key required")]
    Missing,

    #[error("Invalid API key")]
    Invalid,

    #[error("API key inactive or expired")]
    InactiveOrExpired,

    #[error("API key could not be verified")]
    LookupTimeout,

    #[error("API key lacks required capability '{required}'")]
    Forbidden { required: String },

    #[error("API key not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for KeyError {
    fn from(err: serde_json::Error) -> Self {
        KeyError::Store(err.into())
    }
}

impl KeyError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        KeyError::Validation {
            field,
            message: message.into(),
        }
    }
}
