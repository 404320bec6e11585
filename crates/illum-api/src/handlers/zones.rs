//! /session/zones handlers.
//!
//! Adding a zone, re-enabling one, or raising its resolution is checked
//! against the budget before the change is applied. The response to a grid
//! update carries the resolved point counts and spacings, which are what a
//! calculation will actually use.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use illum_core::model::{GridSpec, Zone, ZoneBounds, ZoneKind};
use illum_core::ServiceError;

use super::{authorize, ApiError, ApiState, SuccessResponse};

#[derive(Deserialize)]
pub struct ZoneInput {
    pub id: String,
    #[serde(flatten)]
    pub zone: Zone,
}

// ── /session/zones (POST) ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AddZoneResponse {
    pub success: bool,
    pub zone_id: String,
    pub grid_points: u64,
}

pub async fn handle_zone_add(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(input): Json<ZoneInput>,
) -> Result<Json<AddZoneResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let admission = state.gate.admission();
    let estimator = admission.estimator();
    input.zone.validate()?;

    let zone_id = input.id.clone();
    let grid_points = input.zone.grid_points();
    session.update(|m| {
        let previous = m.zones.get(&input.id).map_or(0, |z| estimator.zone_cost(z));
        let added = estimator.zone_cost(&input.zone);
        if added > previous {
            admission.admit(m, added - previous)?;
        }
        m.zones.insert(input.id, input.zone);
        Ok(())
    })?;

    tracing::debug!(zone = %zone_id, grid_points, "zone added");
    Ok(Json(AddZoneResponse {
        success: true,
        zone_id,
        grid_points,
    }))
}

// ── /session/zones/{id} (PATCH) ───────────────────────────────────────────────

/// Point counts take precedence over spacings when both are given.
#[derive(Deserialize, Default)]
pub struct ZoneUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    /// Plane height. Ignored for volumes.
    pub height: Option<f64>,
    pub num_x: Option<u32>,
    pub num_y: Option<u32>,
    pub num_z: Option<u32>,
    pub x_spacing: Option<f64>,
    pub y_spacing: Option<f64>,
    pub z_spacing: Option<f64>,
}

impl ZoneUpdate {
    fn apply(self, zone: &mut Zone) {
        if let Some(name) = self.name {
            zone.name = Some(name);
        }
        if let Some(enabled) = self.enabled {
            zone.enabled = enabled;
        }
        if let (Some(h), ZoneBounds::Plane { height, .. }) = (self.height, &mut zone.bounds) {
            *height = h;
        }

        let volume = zone.kind() == ZoneKind::Volume;
        if self.num_x.is_some() || self.num_y.is_some() || self.num_z.is_some() {
            let current = zone.num_points();
            zone.grid = GridSpec::Points {
                num_x: self.num_x.unwrap_or(current[0]),
                num_y: self.num_y.unwrap_or(current[1]),
                num_z: volume.then(|| self.num_z.or(current.get(2).copied()).unwrap_or(1)),
            };
        } else if self.x_spacing.is_some() || self.y_spacing.is_some() || self.z_spacing.is_some() {
            let current = zone.spacings();
            zone.grid = GridSpec::Spacing {
                x_spacing: self.x_spacing.unwrap_or(current[0]),
                y_spacing: self.y_spacing.unwrap_or(current[1]),
                z_spacing: if volume {
                    self.z_spacing.or(current.get(2).copied())
                } else {
                    None
                },
            };
        }
    }
}

#[derive(Serialize)]
pub struct ZoneUpdateResponse {
    pub success: bool,
    pub message: String,
    pub num_points: Vec<u32>,
    pub spacings: Vec<f64>,
    pub grid_points: u64,
}

pub async fn handle_zone_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(zone_id): Path<String>,
    Json(updates): Json<ZoneUpdate>,
) -> Result<Json<ZoneUpdateResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let admission = state.gate.admission();
    let estimator = admission.estimator();

    let zone = session.update(|m| {
        let mut zone = m.zone_mut(&zone_id)?.clone();
        let before = estimator.zone_cost(&zone);
        updates.apply(&mut zone);
        zone.validate()?;

        let after = estimator.zone_cost(&zone);
        if after > before {
            admission.admit(m, after - before)?;
        }
        *m.zone_mut(&zone_id)? = zone.clone();
        Ok(zone)
    })?;

    tracing::debug!(zone = %zone_id, grid_points = zone.grid_points(), "zone updated");
    Ok(Json(ZoneUpdateResponse {
        success: true,
        message: "Zone updated".to_string(),
        num_points: zone.num_points(),
        spacings: zone.spacings(),
        grid_points: zone.grid_points(),
    }))
}

// ── /session/zones/{id} (DELETE) ──────────────────────────────────────────────

pub async fn handle_zone_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(zone_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    session.update(|m| {
        m.zones
            .remove(&zone_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::EntityNotFound {
                kind: "zone",
                id: zone_id.clone(),
            })
    })?;

    tracing::debug!(zone = %zone_id, "zone deleted");
    Ok(SuccessResponse::ok("Zone deleted"))
}

// ── /session/zones (GET) ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ZoneState {
    pub id: String,
    pub name: Option<String>,
    pub kind: ZoneKind,
    pub enabled: bool,
    pub bounds: ZoneBounds,
    pub grid: GridSpec,
    pub num_points: Vec<u32>,
    pub spacings: Vec<f64>,
    pub grid_points: u64,
}

#[derive(Serialize)]
pub struct ZoneListResponse {
    pub zones: Vec<ZoneState>,
}

pub async fn handle_zone_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ZoneListResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let model = session.require_model()?;

    let zones = model
        .zones
        .iter()
        .map(|(id, z)| ZoneState {
            id: id.clone(),
            name: z.name.clone(),
            kind: z.kind(),
            enabled: z.enabled,
            bounds: z.bounds.clone(),
            grid: z.grid.clone(),
            num_points: z.num_points(),
            spacings: z.spacings(),
            grid_points: z.grid_points(),
        })
        .collect();
    Ok(Json(ZoneListResponse { zones }))
}
