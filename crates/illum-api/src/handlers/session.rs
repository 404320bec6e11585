//! /session handlers: create, init, status and delete.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use illum_core::model::{ModelState, Room, Units};
use illum_services::session::short_id;

use super::lamps::LampInput;
use super::zones::ZoneInput;
use super::{authorize, check_token, session_header, ApiError, ApiState};

// ── /session/create (POST) ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
    pub token: String,
}

pub async fn handle_session_create(
    State(state): State<ApiState>,
) -> Result<Json<SessionCreateResponse>, ApiError> {
    let created = state.sessions.create(None)?;
    Ok(Json(SessionCreateResponse {
        session_id: created.session.id().to_string(),
        token: created.token,
    }))
}

// ── /session/init (POST) ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SessionInitRequest {
    pub room: Room,
    #[serde(default)]
    pub lamps: Vec<LampInput>,
    #[serde(default)]
    pub zones: Vec<ZoneInput>,
}

impl SessionInitRequest {
    fn into_model(self) -> Result<ModelState, ApiError> {
        let mut model = ModelState::new(self.room);
        model.lamps = self.lamps.into_iter().map(|l| (l.id, l.lamp)).collect();
        model.zones = self.zones.into_iter().map(|z| (z.id, z.zone)).collect();
        model.validate()?;
        Ok(model)
    }
}

#[derive(Serialize)]
pub struct SessionInitResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub lamp_count: usize,
    pub zone_count: usize,
    /// Issued only when this call created the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Install a full model, replacing any previous one. An unknown session id
/// is created on the spot and its credential returned once.
pub async fn handle_session_init(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SessionInitRequest>,
) -> Result<Json<SessionInitResponse>, ApiError> {
    let id = session_header(&headers)?;
    let model = req.into_model()?;

    let (session, token) = state.sessions.get_or_create(&id)?;
    if token.is_none() {
        check_token(&state, &session, &headers)?;
    }

    let lamp_count = model.lamps.len();
    let zone_count = model.zones.len();
    tracing::info!(
        session = short_id(session.id()),
        room = %format!("{}x{}x{}", model.room.x, model.room.y, model.room.z),
        lamps = lamp_count,
        zones = zone_count,
        "session initialized"
    );
    session.install(model);

    Ok(Json(SessionInitResponse {
        success: true,
        message: "Session initialized".to_string(),
        session_id: session.id().to_string(),
        lamp_count,
        zone_count,
        token,
    }))
}

// ── /session/status (GET) ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RoomSummary {
    pub dimensions: [f64; 3],
    pub units: Units,
    pub reflectance_enabled: bool,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub active: bool,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomSummary>,
    pub lamp_count: usize,
    pub zone_count: usize,
    pub lamp_ids: Vec<String>,
    pub zone_ids: Vec<String>,
}

pub async fn handle_session_status(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let model = session.model();

    let response = match model {
        None => SessionStatusResponse {
            active: false,
            session_id: session.id().to_string(),
            room: None,
            lamp_count: 0,
            zone_count: 0,
            lamp_ids: Vec::new(),
            zone_ids: Vec::new(),
        },
        Some(m) => SessionStatusResponse {
            active: true,
            session_id: session.id().to_string(),
            room: Some(RoomSummary {
                dimensions: [m.room.x, m.room.y, m.room.z],
                units: m.room.units,
                reflectance_enabled: m.room.reflectance.enabled,
            }),
            lamp_count: m.lamps.len(),
            zone_count: m.zones.len(),
            lamp_ids: m.lamps.keys().cloned().collect(),
            zone_ids: m.zones.keys().cloned().collect(),
        },
    };
    Ok(Json(response))
}

// ── /session (DELETE) ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionDropResponse {
    pub session_id: String,
    pub dropped: bool,
}

pub async fn handle_session_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SessionDropResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let dropped = state.sessions.delete(session.id());
    Ok(Json(SessionDropResponse {
        session_id: session.id().to_string(),
        dropped,
    }))
}
