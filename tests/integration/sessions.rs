use crate::*;

use reqwest::{Method, StatusCode};

#[tokio::test]
async fn test_create_init_status_delete() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let status: Value = daemon
        .authed(Method::GET, "/session/status", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["active"], true);
    assert_eq!(status["lamp_ids"], json!(["lamp-1"]));
    assert_eq!(status["zone_ids"], json!(["plane-1"]));
    assert_eq!(status["room"]["dimensions"], json!([4.0, 3.0, 2.7]));

    let dropped: Value = daemon
        .authed(Method::DELETE, "/session", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(dropped["dropped"], true);

    let resp = daemon
        .authed(Method::GET, "/session/status", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    daemon.stop().await
}

#[tokio::test]
async fn test_wrong_token_is_rejected() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    let (id, _token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::GET, "/session/status", &id, "not-the-token")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "unauthorized");

    daemon.stop().await
}

#[tokio::test]
async fn test_missing_session_header() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;

    let resp = daemon.client.get(daemon.url("/session/status")).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "missing_session_id");

    daemon.stop().await
}

#[tokio::test]
async fn test_init_creates_unknown_session() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;

    let resp: Value = daemon
        .client
        .post(daemon.url("/session/init"))
        .header("X-Session-ID", "client-chosen")
        .json(&small_model())
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(resp["session_id"], "client-chosen");
    let token = resp["token"].as_str().context("token issued")?.to_string();

    let status = daemon
        .authed(Method::GET, "/session/status", "client-chosen", &token)
        .send()
        .await?;
    assert_eq!(status.status(), StatusCode::OK);

    daemon.stop().await
}

#[tokio::test]
async fn test_uninitialized_session_cannot_estimate() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    let (id, token) = daemon.create_session().await?;

    let resp = daemon
        .authed(Method::GET, "/session/calculate/estimate", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "session_not_initialized");

    daemon.stop().await
}

#[tokio::test]
async fn test_session_capacity() -> Result<()> {
    let mut config = test_config();
    config.sessions.max_sessions = 2;
    let daemon = Daemon::start(config).await?;

    daemon.create_session().await?;
    daemon.create_session().await?;
    let resp = daemon.client.post(daemon.url("/session/create")).send().await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "capacity_exceeded");

    daemon.stop().await
}

#[tokio::test]
async fn test_lamp_and_zone_edits() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::PATCH, "/session/lamps/lamp-1", &id, &token)
        .json(&json!({ "enabled": false }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = daemon
        .authed(Method::PATCH, "/session/lamps/missing", &id, &token)
        .json(&json!({ "enabled": true }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = daemon
        .authed(Method::POST, "/session/zones", &id, &token)
        .json(&plane_zone("plane-2", 5, 5))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let zones: Value = daemon
        .authed(Method::GET, "/session/zones", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(zones["zones"].as_array().map(Vec::len), Some(2));

    let resp = daemon
        .authed(Method::DELETE, "/session/zones/plane-2", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let status: Value = daemon
        .authed(Method::GET, "/session/status", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["zone_ids"], json!(["plane-1"]));

    daemon.stop().await
}

#[tokio::test]
async fn test_init_cannot_take_over_a_live_session() -> Result<()> {
    let daemon = Daemon::start(test_config()).await?;

    let first: Value = daemon
        .client
        .post(daemon.url("/session/init"))
        .header("X-Session-ID", "shared-id")
        .json(&small_model())
        .send()
        .await?
        .json()
        .await?;
    let token = first["token"].as_str().context("token issued")?.to_string();

    // A second client reusing the id gets no token and no access.
    let mut other = small_model();
    other["zones"] = json!([]);
    let resp = daemon
        .client
        .post(daemon.url("/session/init"))
        .header("X-Session-ID", "shared-id")
        .json(&other)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let status: Value = daemon
        .authed(Method::GET, "/session/status", "shared-id", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["zone_ids"], json!(["plane-1"]));

    daemon.stop().await
}
