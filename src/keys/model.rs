use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::capability::CapabilityError;

/// How a key's capability set was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    ReadOnly,
    ReadWrite,
    FullAccess,
    Custom,
}

impl AccessType {
    pub fn parse(value: &str) -> Result<Self, CapabilityError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read_only" => Ok(AccessType::ReadOnly),
            "read_write" => Ok(AccessType::ReadWrite),
            "full_access" => Ok(AccessType::FullAccess),
            "custom" => Ok(AccessType::Custom),
            other => Err(CapabilityError::UnknownPreset(other.to_string())),
        }
    }

    /// Preset backing this access type, `None` for custom
    pub fn preset(&self) -> Option<&'static str> {
        match self {
            AccessType::ReadOnly => Some("read_only"),
            AccessType::ReadWrite => Some("read_write"),
            AccessType::FullAccess => Some("full_access"),
            AccessType::Custom => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub access_type: AccessType,
    pub capabilities: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Active flag set and expiry (if any) still in the future
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expires| expires > now)
    }

    pub fn grants(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Copy safe for listings: only the key prefix is kept
    pub fn masked(&self) -> Self {
        let prefix: String = self.key.chars().take(KEY_PREFIX_LEN).collect();
        Self {
            key: format!("{}...", prefix),
            ..self.clone()
        }
    }
}

const KEY_PREFIX_LEN: usize = 10;

/// `mv_` followed by 48 hex chars of SHA-256 over fresh random material
pub fn generate_key_string() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(24).map(|b| format!("{:02x}", b)).collect();
    format!("mv_{}", hex)
}
