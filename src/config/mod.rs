use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    /// Emails allowed to use admin routes. Empty means any verified identity.
    pub admin_emails: Vec<String>,
    pub revoked_subjects: Vec<String>,
    pub api_key_header: String,
    pub key_lookup_timeout_ms: u64,
    /// Key string that is provisioned as a read-only record the first time it is presented.
    pub bootstrap_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub flush_interval_secs: u64,
    pub flush_timeout_ms: u64,
    pub max_buffered: usize,
    pub recent_requests_limit: usize,
    pub rate_window_minutes: u32,
    pub top_endpoints_limit: usize,
    pub max_summary_days: u32,
}

impl SecurityConfig {
    pub fn key_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.key_lookup_timeout_ms)
    }
}

impl AnalyticsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("SERVER_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|v| v.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("SERVER_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.database.backend = StoreBackend::Memory,
                "postgres" | "postgresql" => self.database.backend = StoreBackend::Postgres,
                other => tracing::warn!("Ignoring unknown DATABASE_BACKEND '{}'", other),
            }
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("ADMIN_EMAILS") {
            self.security.admin_emails = split_list(&v);
        }
        if let Ok(v) = env::var("ADMIN_REVOKED_SUBJECTS") {
            self.security.revoked_subjects = split_list(&v);
        }
        if let Ok(v) = env::var("API_KEY_HEADER") {
            if !v.trim().is_empty() {
                self.security.api_key_header = v.trim().to_ascii_lowercase();
            }
        }
        if let Ok(v) = env::var("KEY_LOOKUP_TIMEOUT_MS") {
            self.security.key_lookup_timeout_ms = v.parse().unwrap_or(self.security.key_lookup_timeout_ms);
        }
        if let Ok(v) = env::var("BOOTSTRAP_API_KEY") {
            self.security.bootstrap_api_key = Some(v).filter(|k| !k.trim().is_empty());
        }

        // Analytics overrides
        if let Ok(v) = env::var("ANALYTICS_FLUSH_INTERVAL_SECS") {
            self.analytics.flush_interval_secs = v.parse().unwrap_or(self.analytics.flush_interval_secs);
        }
        if let Ok(v) = env::var("ANALYTICS_FLUSH_TIMEOUT_MS") {
            self.analytics.flush_timeout_ms = v.parse().unwrap_or(self.analytics.flush_timeout_ms);
        }
        if let Ok(v) = env::var("ANALYTICS_MAX_BUFFERED") {
            self.analytics.max_buffered = v.parse().unwrap_or(self.analytics.max_buffered);
        }
        if let Ok(v) = env::var("ANALYTICS_RECENT_LIMIT") {
            self.analytics.recent_requests_limit = v.parse().unwrap_or(self.analytics.recent_requests_limit);
        }
        if let Ok(v) = env::var("ANALYTICS_RATE_WINDOW_MINUTES") {
            self.analytics.rate_window_minutes = v.parse().unwrap_or(self.analytics.rate_window_minutes);
        }
        if let Ok(v) = env::var("ANALYTICS_TOP_ENDPOINTS") {
            self.analytics.top_endpoints_limit = v.parse().unwrap_or(self.analytics.top_endpoints_limit);
        }
        if let Ok(v) = env::var("ANALYTICS_MAX_SUMMARY_DAYS") {
            self.analytics.max_summary_days = v.parse().unwrap_or(self.analytics.max_summary_days);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                admin_emails: Vec::new(),
                revoked_subjects: Vec::new(),
                api_key_header: "x-api-key".to_string(),
                key_lookup_timeout_ms: 5_000,
                bootstrap_api_key: None,
            },
            analytics: AnalyticsConfig {
                flush_interval_secs: 30,
                flush_timeout_ms: 10_000,
                max_buffered: 100_000,
                recent_requests_limit: 20,
                rate_window_minutes: 5,
                top_endpoints_limit: 10,
                max_summary_days: 365,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                admin_emails: Vec::new(),
                revoked_subjects: Vec::new(),
                api_key_header: "x-api-key".to_string(),
                key_lookup_timeout_ms: 3_000,
                bootstrap_api_key: None,
            },
            analytics: AnalyticsConfig {
                flush_interval_secs: 60,
                flush_timeout_ms: 5_000,
                max_buffered: 100_000,
                recent_requests_limit: 20,
                rate_window_minutes: 5,
                top_endpoints_limit: 10,
                max_summary_days: 365,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                enable_request_logging: false,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                admin_emails: Vec::new(),
                revoked_subjects: Vec::new(),
                api_key_header: "x-api-key".to_string(),
                key_lookup_timeout_ms: 2_000,
                bootstrap_api_key: None,
            },
            analytics: AnalyticsConfig {
                flush_interval_secs: 60,
                flush_timeout_ms: 5_000,
                max_buffered: 250_000,
                recent_requests_limit: 50,
                rate_window_minutes: 5,
                top_endpoints_limit: 10,
                max_summary_days: 365,
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
