//! Session commands: create, status, estimate, calculate, drop.

use anyhow::Result;
use reqwest::Method;
use serde::Deserialize;

use super::http::{Credentials, base_url, post_json, request, send};

pub async fn cmd_session_create(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct CreateResponse {
        session_id: String,
        token: String,
    }

    let resp: CreateResponse = post_json(&format!("{}/session/create", base_url(port))).await?;
    println!("Session created.");
    println!("  ID    : {}", resp.session_id);
    println!("  Token : {}", resp.token);
    println!();
    println!("The token is shown only once.");
    Ok(())
}

pub async fn cmd_session_status(port: u16, creds: &Credentials<'_>) -> Result<()> {
    #[derive(Deserialize)]
    struct RoomSummary {
        dimensions: [f64; 3],
        units: String,
        reflectance_enabled: bool,
    }

    #[derive(Deserialize)]
    struct StatusResponse {
        active: bool,
        session_id: String,
        room: Option<RoomSummary>,
        lamp_ids: Vec<String>,
        zone_ids: Vec<String>,
    }

    let url = format!("{}/session/status", base_url(port));
    let resp: StatusResponse = send(request(Method::GET, &url, Some(creds)), &url).await?;

    println!("═══════════════════════════════════════");
    println!("  Session {}", resp.session_id);
    println!("═══════════════════════════════════════");
    match (resp.active, resp.room) {
        (true, Some(room)) => {
            let [x, y, z] = room.dimensions;
            println!("  Room        : {} x {} x {} {}", x, y, z, room.units);
            println!("  Reflectance : {}", if room.reflectance_enabled { "on" } else { "off" });
            println!("  Lamps       : {}", list(&resp.lamp_ids));
            println!("  Zones       : {}", list(&resp.zone_ids));
        }
        _ => println!("  Not initialized."),
    }
    Ok(())
}

pub async fn cmd_session_estimate(port: u16, creds: &Credentials<'_>) -> Result<()> {
    #[derive(Deserialize)]
    struct EstimateResponse {
        estimated_seconds: f64,
        grid_points: u64,
        lamp_count: u64,
        reflectance_enabled: bool,
        reflectance_passes: u32,
        budget_percent: f64,
    }

    let url = format!("{}/session/calculate/estimate", base_url(port));
    let resp: EstimateResponse = send(request(Method::GET, &url, Some(creds)), &url).await?;

    println!("  Grid points    : {}", resp.grid_points);
    println!("  Lamps          : {}", resp.lamp_count);
    if resp.reflectance_enabled {
        println!("  Reflectance    : {} passes", resp.reflectance_passes);
    } else {
        println!("  Reflectance    : off");
    }
    println!("  Estimated time : {:.1}s", resp.estimated_seconds);
    println!("  Budget used    : {:.1}%", resp.budget_percent);
    Ok(())
}

pub async fn cmd_session_calculate(port: u16, creds: &Credentials<'_>) -> Result<()> {
    #[derive(Deserialize)]
    struct Statistics {
        min: Option<f64>,
        max: Option<f64>,
        mean: Option<f64>,
    }

    #[derive(Deserialize)]
    struct ZoneResult {
        zone_id: String,
        zone_name: Option<String>,
        statistics: Statistics,
    }

    #[derive(Deserialize)]
    struct CalculateResponse {
        elapsed_ms: u64,
        mean_fluence: Option<f64>,
        zones: std::collections::BTreeMap<String, ZoneResult>,
    }

    let url = format!("{}/session/calculate", base_url(port));
    let resp: CalculateResponse = send(request(Method::POST, &url, Some(creds)), &url).await?;

    println!("Calculation finished in {} ms.", resp.elapsed_ms);
    if let Some(f) = resp.mean_fluence {
        println!("  Mean fluence : {:.3}", f);
    }
    for z in resp.zones.values() {
        let name = z.zone_name.as_deref().unwrap_or(&z.zone_id);
        println!(
            "  {:<20} min {:>10} mean {:>10} max {:>10}",
            name,
            fmt_opt(z.statistics.min),
            fmt_opt(z.statistics.mean),
            fmt_opt(z.statistics.max),
        );
    }
    Ok(())
}

pub async fn cmd_session_drop(port: u16, creds: &Credentials<'_>) -> Result<()> {
    #[derive(Deserialize)]
    struct DropResponse {
        session_id: String,
        dropped: bool,
    }

    let url = format!("{}/session", base_url(port));
    let resp: DropResponse = send(request(Method::DELETE, &url, Some(creds)), &url).await?;

    if resp.dropped {
        println!("✓ Session dropped: {}", resp.session_id);
    } else {
        println!("Session not found: {}", resp.session_id);
    }
    Ok(())
}

fn list(ids: &[String]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}
