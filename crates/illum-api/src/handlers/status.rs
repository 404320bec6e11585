//! /status handler.
//!
//! Unauthenticated, so it reports counts only and never a session id.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use illum_services::GateStatus;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub sessions: SessionsInfo,
    pub compute: GateStatus,
    pub budget: BudgetInfo,
}

#[derive(Serialize)]
pub struct SessionsInfo {
    pub live: usize,
    pub initialized: usize,
    pub max: usize,
    pub idle_timeout_secs: u64,
}

#[derive(Serialize)]
pub struct BudgetInfo {
    pub max_budget_units: u64,
    pub max_calc_time_secs: f64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let settings = state.sessions.settings();
    let list = state.sessions.list();
    let admission = state.gate.admission();

    Json(StatusResponse {
        sessions: SessionsInfo {
            live: list.len(),
            initialized: list.iter().filter(|s| s.initialized).count(),
            max: settings.max_sessions,
            idle_timeout_secs: settings.idle_timeout_secs,
        },
        compute: state.gate.status(),
        budget: BudgetInfo {
            max_budget_units: admission.max_budget_units(),
            max_calc_time_secs: admission.max_calc_time_secs(),
        },
    })
}
