//! Closed vocabulary of API key capabilities and the named presets built from it.

use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Baseline capability carried by every preset; required by guards without an explicit capability
pub const READ: &str = "read";
pub const READ_MEDIA: &str = "read:media";
pub const WRITE_MEDIA: &str = "write:media";
pub const DELETE_MEDIA: &str = "delete:media";
pub const UPLOAD_MEDIA: &str = "upload:media";
pub const READ_SETTINGS: &str = "read:settings";
pub const WRITE_SETTINGS: &str = "write:settings";

pub const ALL: &[&str] = &[
    READ,
    READ_MEDIA,
    WRITE_MEDIA,
    DELETE_MEDIA,
    UPLOAD_MEDIA,
    READ_SETTINGS,
    WRITE_SETTINGS,
];

pub const PRESETS: &[(&str, &[&str])] = &[
    ("read_only", &[READ, READ_MEDIA, READ_SETTINGS]),
    ("read_write", &[READ, READ_MEDIA, WRITE_MEDIA, UPLOAD_MEDIA, READ_SETTINGS]),
    ("full_access", ALL),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("{message}")]
    Invalid { message: String, offending: Vec<String> },
}

/// Result of checking a requested capability list against the vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub message: String,
    pub offending: Vec<String>,
    pub allowed: Vec<&'static str>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<(), CapabilityError> {
        if self.valid {
            Ok(())
        } else {
            Err(CapabilityError::Invalid {
                message: self.message,
                offending: self.offending,
            })
        }
    }
}

pub fn normalize(capability: &str) -> String {
    capability.trim().to_ascii_lowercase()
}

pub fn is_known(capability: &str) -> bool {
    ALL.contains(&capability)
}

/// Check a requested list: non-empty, every entry known, no duplicates after normalization
pub fn validate<S: AsRef<str>>(requested: &[S]) -> ValidationReport {
    if requested.is_empty() {
        return ValidationReport {
            valid: false,
            message: "At least one capability is required".to_string(),
            offending: Vec::new(),
            allowed: ALL.to_vec(),
        };
    }

    let mut seen = BTreeSet::new();
    let mut unknown = Vec::new();
    let mut duplicates = Vec::new();

    for raw in requested {
        let cap = normalize(raw.as_ref());
        if !is_known(&cap) {
            unknown.push(raw.as_ref().to_string());
        } else if !seen.insert(cap.clone()) {
            duplicates.push(cap);
        }
    }

    let mut problems = Vec::new();
    if !unknown.is_empty() {
        problems.push(format!("unknown capabilities: {}", unknown.join(", ")));
    }
    if !duplicates.is_empty() {
        problems.push(format!("duplicate capabilities: {}", duplicates.join(", ")));
    }

    if problems.is_empty() {
        ValidationReport {
            valid: true,
            message: "Capabilities are valid".to_string(),
            offending: Vec::new(),
            allowed: ALL.to_vec(),
        }
    } else {
        ValidationReport {
            valid: false,
            message: format!("Invalid capabilities ({})", problems.join("; ")),
            offending: unknown.into_iter().chain(duplicates).collect(),
            allowed: ALL.to_vec(),
        }
    }
}

/// Validate and return the normalized list, preserving request order
pub fn normalize_all<S: AsRef<str>>(requested: &[S]) -> Result<Vec<String>, CapabilityError> {
    validate(requested).into_result()?;
    Ok(requested.iter().map(|c| normalize(c.as_ref())).collect())
}

pub fn preset_capabilities(name: &str) -> Result<Vec<String>, CapabilityError> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, caps)| caps.iter().map(|c| c.to_string()).collect())
        .ok_or_else(|| CapabilityError::UnknownPreset(name.to_string()))
}
