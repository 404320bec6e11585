//! /session/calculate handlers: cost estimate and the calculation itself.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use illum_core::budget::CostEstimate;
use illum_core::engine::ZoneResult;

use super::{authorize, ApiError, ApiState};

// ── /session/calculate/estimate (GET) ─────────────────────────────────────────

#[derive(Serialize)]
pub struct EstimateResponse {
    pub estimated_seconds: f64,
    pub grid_points: u64,
    pub lamp_count: u64,
    pub reflectance_enabled: bool,
    pub reflectance_passes: u32,
    /// Share of the unit ceiling, one decimal.
    pub budget_percent: f64,
    pub estimate: CostEstimate,
}

pub async fn handle_estimate(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<EstimateResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let model = session.require_model()?;
    let admission = state.gate.admission();
    let estimate = admission.estimator().estimate(&model);

    let max = admission.max_budget_units();
    let budget_percent = if max == 0 {
        0.0
    } else {
        (estimate.budget_units as f64 / max as f64 * 1000.0).round() / 10.0
    };

    Ok(Json(EstimateResponse {
        estimated_seconds: estimate.calc_time_seconds,
        grid_points: estimate.total_grid_points,
        lamp_count: estimate.lamp_count,
        reflectance_enabled: estimate.reflectance_enabled,
        reflectance_passes: estimate.reflectance_passes,
        budget_percent,
        estimate,
    }))
}

// ── /session/calculate (POST) ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CalculateResponse {
    pub success: bool,
    /// Unix millis.
    pub calculated_at: u64,
    pub elapsed_ms: u64,
    pub mean_fluence: Option<f64>,
    pub zones: BTreeMap<String, ZoneResult>,
}

/// Runs on the snapshot current at admission; edits made while it runs
/// do not affect it.
pub async fn handle_calculate(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CalculateResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let model = session.require_model()?;

    let outcome = state.gate.run(session.id(), model).await?;

    let calculated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok(Json(CalculateResponse {
        success: true,
        calculated_at,
        elapsed_ms: outcome.elapsed.as_millis() as u64,
        mean_fluence: outcome.results.mean_fluence,
        zones: outcome.results.zones,
    }))
}
