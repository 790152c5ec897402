#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

use mediavault_api::auth::{issue_token, Claims};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const ADMIN_EMAIL: &str = "admin@mediavault.test";
pub const BOOTSTRAP_KEY: &str = "mv_integration_bootstrap_key";

/// Server process on its own port with the in-memory store; killed on drop
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    child: Child,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_mediavault-api"))
            .arg("serve")
            .env("APP_ENV", "development")
            .env("SERVER_PORT", port.to_string())
            .env("DATABASE_BACKEND", "memory")
            .env("JWT_SECRET", JWT_SECRET)
            .env("ADMIN_EMAILS", ADMIN_EMAIL)
            .env("BOOTSTRAP_API_KEY", BOOTSTRAP_KEY)
            .env("ANALYTICS_FLUSH_INTERVAL_SECS", "1")
            .env("RUST_LOG", "mediavault_api=warn")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        let server = Self {
            port,
            base_url,
            client: reqwest::Client::new(),
            child,
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn admin_token(&self) -> String {
        token_for(ADMIN_EMAIL)
    }

    /// Authenticated admin GET returning status and JSON body
    pub async fn admin_get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).bearer_auth(self.admin_token()).send().await?;
        Ok((res.status(), res.json().await?))
    }

    pub async fn admin_post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(self.admin_token())
            .json(&body)
            .send()
            .await?;
        Ok((res.status(), res.json().await?))
    }

    pub async fn key_get(&self, path: &str, key: &str) -> Result<(StatusCode, Value)> {
        let res = self.client.get(self.url(path)).header("x-api-key", key).send().await?;
        Ok((res.status(), res.json().await?))
    }

    /// Create a key through the admin API and return its full key string and id
    pub async fn create_key(&self, body: Value) -> Result<(String, String)> {
        let (status, created) = self.admin_post("/admin/keys", body).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "key creation failed: {} {}", status, created);
        let key = created["data"]["key"].as_str().context("missing key")?.to_string();
        let id = created["data"]["id"].as_str().context("missing id")?.to_string();
        Ok((key, id))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn token_for(email: &str) -> String {
    issue_token(JWT_SECRET, &Claims::new("integration", email, 1)).expect("failed to sign test token")
}
