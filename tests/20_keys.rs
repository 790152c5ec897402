mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn admin_routes_reject_missing_and_non_admin_tokens() -> Result<()> {
    let server = common::TestServer::start().await?;

    let res = server.client.get(server.url("/admin/keys")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server
        .client
        .get(server.url("/admin/keys"))
        .bearer_auth(common::token_for("visitor@mediavault.test"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .get(server.url("/admin/keys"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn scoped_key_reads_media_but_cannot_write() -> Result<()> {
    let server = common::TestServer::start().await?;
    let (key, id) = server
        .create_key(json!({
            "name": "gallery widget",
            "access_type": "custom",
            "capabilities": ["read:media"]
        }))
        .await?;

    let (status, body) = server.key_get("/api/media", &key).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());

    let res = server
        .client
        .post(server.url("/api/media"))
        .header("x-api-key", &key)
        .json(&json!({"title": "x", "media_type": "image", "url": "https://e.test/x.png"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // usage is written by a background worker; poll until the count settles
    let mut count = None;
    for _ in 0..20 {
        let (status, stats) = server.admin_get(&format!("/admin/analytics/keys?key_id={}", id)).await?;
        assert_eq!(status, StatusCode::OK);
        count = stats["data"][0]["request_count"].as_u64();
        if count == Some(1) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(count, Some(1));
    Ok(())
}

#[tokio::test]
async fn revoked_and_expired_keys_are_unauthorized() -> Result<()> {
    let server = common::TestServer::start().await?;
    let (key, id) = server
        .create_key(json!({"name": "temporary", "access_type": "read_only", "expires_in_days": 30}))
        .await?;

    let (status, _) = server.key_get("/api/ping", &key).await?;
    assert_eq!(status, StatusCode::OK);

    let res = server
        .client
        .delete(server.url(&format!("/admin/keys/{}", id)))
        .bearer_auth(server.admin_token())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = server.key_get("/api/ping", &key).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    // soft revoke keeps the record
    let (_, listed) = server.admin_get("/admin/keys").await?;
    let record = listed["data"]
        .as_array()
        .and_then(|keys| keys.iter().find(|k| k["id"] == id.as_str()))
        .cloned()
        .expect("revoked key still listed");
    assert_eq!(record["active"], false);
    Ok(())
}

#[tokio::test]
async fn bootstrap_key_is_provisioned_on_first_use() -> Result<()> {
    let server = common::TestServer::start().await?;

    let (status, body) = server.key_get("/api/ping", common::BOOTSTRAP_KEY).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["key_id"], "bootstrap");

    let (status, _) = server.key_get("/api/settings", common::BOOTSTRAP_KEY).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn invalid_key_requests_are_rejected() -> Result<()> {
    let server = common::TestServer::start().await?;

    let (status, body) = server
        .admin_post("/admin/keys", json!({"name": "x", "access_type": "superuser"}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = server
        .admin_post(
            "/admin/keys",
            json!({"name": "x", "access_type": "read_only", "expires_in_days": 0}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
