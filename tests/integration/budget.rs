use crate::*;

use reqwest::{Method, StatusCode};

/// 100 grid points and one lamp: 1_000 + 50_000 units.
fn tight_config() -> IllumConfig {
    let mut config = test_config();
    config.budget.max_budget_units = 60_000;
    config
}

#[tokio::test]
async fn test_estimate_reports_units_and_percent() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let est: Value = daemon
        .authed(Method::GET, "/session/calculate/estimate", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(est["grid_points"], 100);
    assert_eq!(est["lamp_count"], 1);
    assert_eq!(est["estimate"]["budget_units"], 51_000);
    assert_eq!(est["budget_percent"], 85.0);

    daemon.stop().await
}

#[tokio::test]
async fn test_oversized_zone_is_rejected_with_breakdown() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::POST, "/session/zones", &id, &token)
        .json(&plane_zone("huge", 100, 100))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "budget_exceeded");
    let detail = &body["detail"];
    assert_eq!(detail["reason"], "budget");
    assert_eq!(detail["budget"]["used"], 151_000);
    assert_eq!(detail["budget"]["max"], 60_000);
    let suggestions = detail["suggestions"].as_array().context("suggestions")?;
    assert!(!suggestions.is_empty());

    // Rejected edits leave the model untouched.
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
async fn test_shrinking_a_zone_is_always_allowed() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    let resp = daemon
        .authed(Method::PATCH, "/session/zones/plane-1", &id, &token)
        .json(&json!({ "num_x": 5, "num_y": 5 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body["num_points"], json!([5, 5]));

    daemon.stop().await
}

#[tokio::test]
async fn test_enabling_reflectance_over_budget() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    // 100 enabled points x 5 passes x 1 unit = 500 more, still within 60_000.
    let resp = daemon
        .authed(Method::PATCH, "/session/room", &id, &token)
        .json(&json!({ "enable_reflectance": true }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Ten thousand passes pushes past the ceiling.
    let resp = daemon
        .authed(Method::PATCH, "/session/room", &id, &token)
        .json(&json!({ "reflectance_max_num_passes": 10_000 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "budget_exceeded");

    daemon.stop().await
}

#[tokio::test]
async fn test_over_budget_calculation_is_refused() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let mut model = small_model();
    model["zones"] = json!([plane_zone("big", 100, 100)]);
    let (id, token) = daemon.init_session(&model).await?;

    let resp = daemon
        .authed(Method::POST, "/session/calculate", &id, &token)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "budget_exceeded");
    assert_eq!(daemon.state.gate.status().available, 2);

    daemon.stop().await
}

/// Base model plus entities that cost nothing until switched on: a lamp
/// without photometry, a disabled lamp and a disabled 100 x 100 zone.
fn model_with_idle_entities() -> Value {
    let mut model = small_model();
    let lamps = model["lamps"].as_array_mut().expect("lamps");
    lamps.push(json!({ "id": "dark", "position": [1.0, 1.0, 2.6] }));
    lamps.push(json!({
        "id": "off",
        "enabled": false,
        "position": [3.0, 1.0, 2.6],
        "photometry": { "peak_intensity": 100.0 }
    }));
    let mut spare = plane_zone("spare", 100, 100);
    spare["enabled"] = json!(false);
    model["zones"].as_array_mut().expect("zones").push(spare);
    model
}

/// Rejected edits must leave ids, zone grids and the cost where they were.
async fn assert_unchanged(daemon: &Daemon, id: &str, token: &str) -> Result<()> {
    let status: Value = daemon
        .authed(Method::GET, "/session/status", id, token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["lamp_ids"], json!(["dark", "lamp-1", "off"]));
    assert_eq!(status["zone_ids"], json!(["plane-1", "spare"]));

    let zones: Value = daemon
        .authed(Method::GET, "/session/zones", id, token)
        .send()
        .await?
        .json()
        .await?;
    let zones = zones["zones"].as_array().context("zones")?;
    assert_eq!(zones[0]["id"], "plane-1");
    assert_eq!(zones[0]["num_points"], json!([10, 10]));
    assert_eq!(zones[1]["id"], "spare");
    assert_eq!(zones[1]["enabled"], false);

    let est: Value = daemon
        .authed(Method::GET, "/session/calculate/estimate", id, token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(est["lamp_count"], 1);
    assert_eq!(est["estimate"]["budget_units"], 51_000);
    Ok(())
}

async fn expect_budget_rejection(resp: reqwest::Response) -> Result<()> {
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "budget_exceeded");
    assert_eq!(body["detail"]["budget"]["max"], 60_000);
    Ok(())
}

#[tokio::test]
async fn test_cost_increasing_lamp_edits_are_rejected() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&model_with_idle_entities()).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // A second chargeable lamp: 51_000 + 50_000.
    let resp = daemon
        .authed(Method::POST, "/session/lamps", &id, &token)
        .json(&json!({
            "id": "extra",
            "position": [2.0, 2.0, 2.6],
            "photometry": { "peak_intensity": 80.0 }
        }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // Re-enabling a lamp that already has photometry.
    let resp = daemon
        .authed(Method::PATCH, "/session/lamps/off", &id, &token)
        .json(&json!({ "enabled": true }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // Attaching photometry to an enabled lamp.
    let resp = daemon
        .authed(Method::PATCH, "/session/lamps/dark", &id, &token)
        .json(&json!({ "photometry": { "peak_intensity": 50.0 } }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // Edits that stay free still go through.
    let resp = daemon
        .authed(Method::PATCH, "/session/lamps/off", &id, &token)
        .json(&json!({ "name": "Spare fixture" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    daemon.stop().await
}

#[tokio::test]
async fn test_cost_increasing_zone_edits_are_rejected() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&model_with_idle_entities()).await?;

    // Re-enabling the disabled 10_000-point zone.
    let resp = daemon
        .authed(Method::PATCH, "/session/zones/spare", &id, &token)
        .json(&json!({ "enabled": true }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // Raising an enabled zone from 100 to 10_000 points.
    let resp = daemon
        .authed(Method::PATCH, "/session/zones/plane-1", &id, &token)
        .json(&json!({ "num_x": 100, "num_y": 100 }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;
    assert_unchanged(&daemon, &id, &token).await?;

    // Refining a disabled zone costs nothing until it is enabled.
    let resp = daemon
        .authed(Method::PATCH, "/session/zones/spare", &id, &token)
        .json(&json!({ "num_x": 50, "num_y": 50 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    daemon.stop().await
}

#[tokio::test]
async fn test_reflectance_enable_charges_requested_passes_and_surface_grids() -> Result<()> {
    let daemon = Daemon::start(tight_config()).await?;
    let (id, token) = daemon.init_session(&small_model()).await?;

    // Enabling at 100 passes: 100 zone points x 100 on top of 51_000.
    let resp = daemon
        .authed(Method::PATCH, "/session/room", &id, &token)
        .json(&json!({ "enable_reflectance": true, "reflectance_max_num_passes": 100 }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;

    let status: Value = daemon
        .authed(Method::GET, "/session/status", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["room"]["reflectance_enabled"], false);

    // At the default passes it fits: 600 surface points x 5 = 3_000.
    let resp = daemon
        .authed(Method::PATCH, "/session/room", &id, &token)
        .json(&json!({ "enable_reflectance": true }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // A 40 x 40 floor adds 1_500 surface points x 5 passes.
    let resp = daemon
        .authed(Method::PATCH, "/session/room", &id, &token)
        .json(&json!({ "reflectance_num_points": { "floor": { "num_x": 40, "num_y": 40 } } }))
        .send()
        .await?;
    expect_budget_rejection(resp).await?;

    let est: Value = daemon
        .authed(Method::GET, "/session/calculate/estimate", &id, &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(est["estimate"]["reflectance_grid_points"], 600);
    assert_eq!(est["estimate"]["budget_units"], 54_000);

    daemon.stop().await
}
