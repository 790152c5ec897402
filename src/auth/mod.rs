use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::SecurityConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(subject: impl Into<String>, email: impl Into<String>, expiry_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.into(),
            email: email.into(),
            exp: (now + Duration::hours(expiry_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// Administrator identity decoded from a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid token: {0}")]
    Malformed(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// HS256 JWT verification with a subject revocation list
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
    revoked_subjects: HashSet<String>,
    configured: bool,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str, revoked_subjects: &[String]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            revoked_subjects: revoked_subjects.iter().cloned().collect(),
            configured: !secret.is_empty(),
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(&security.jwt_secret, &security.revoked_subjects)
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        if !self.configured {
            return Err(IdentityError::Unavailable("JWT secret not configured".to_string()));
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => IdentityError::Expired,
            _ => IdentityError::Malformed(e.to_string()),
        })?;
        let claims = data.claims;

        if self.revoked_subjects.contains(&claims.sub) {
            return Err(IdentityError::Revoked);
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| IdentityError::Malformed("exp out of range".to_string()))?;

        Ok(Identity {
            subject: claims.sub,
            email: claims.email,
            expires_at,
        })
    }
}

/// Sign admin claims with the shared secret
pub fn issue_token(secret: &str, claims: &Claims) -> Result<String, IdentityError> {
    if secret.is_empty() {
        return Err(IdentityError::Unavailable("JWT secret not configured".to_string()));
    }
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| IdentityError::Malformed(e.to_string()))
}
