//! /session/room handler: partial room updates.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use illum_core::model::Units;
use illum_core::ServiceError;

use super::{authorize, ApiError, ApiState, SuccessResponse};

#[derive(Deserialize)]
pub struct SurfaceGrid {
    pub num_x: u32,
    pub num_y: u32,
}

/// Only the fields present are applied.
#[derive(Deserialize, Default)]
pub struct RoomUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub units: Option<Units>,
    pub enable_reflectance: Option<bool>,
    pub reflectance_max_num_passes: Option<u32>,
    /// Surface name → reflectance.
    pub reflectances: Option<BTreeMap<String, f64>>,
    pub reflectance_num_points: Option<BTreeMap<String, SurfaceGrid>>,
}

pub async fn handle_room_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(updates): Json<RoomUpdate>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let admission = state.gate.admission();
    let estimator = admission.estimator();

    session.update(|m| {
        if updates.reflectance_max_num_passes == Some(0) {
            return Err(ServiceError::InvalidModel(
                "reflectance passes must be at least 1".into(),
            ));
        }

        let mut room = m.room.clone();
        if let Some(units) = updates.units {
            room.units = units;
        }
        if let Some(x) = updates.x {
            room.x = x;
        }
        if let Some(y) = updates.y {
            room.y = y;
        }
        if let Some(z) = updates.z {
            room.z = z;
        }
        if let Some(enabled) = updates.enable_reflectance {
            room.reflectance.enabled = enabled;
        }
        if let Some(passes) = updates.reflectance_max_num_passes {
            room.reflectance.max_num_passes = Some(passes);
        }
        for (name, value) in updates.reflectances.into_iter().flatten() {
            surface(&mut room.reflectance.surfaces, &name)?.reflectance = value;
        }
        for (name, grid) in updates.reflectance_num_points.into_iter().flatten() {
            let s = surface(&mut room.reflectance.surfaces, &name)?;
            s.num_x = grid.num_x.max(1);
            s.num_y = grid.num_y.max(1);
        }
        room.validate()?;

        // Cost-increasing reflectance changes go through admission first.
        let delta = estimator.reflectance_delta(m, &room);
        if delta > 0 {
            admission.admit(m, delta)?;
        }
        m.room = room;
        Ok(())
    })?;

    Ok(SuccessResponse::ok("Room updated"))
}

fn surface<'a, T>(
    surfaces: &'a mut BTreeMap<String, T>,
    name: &str,
) -> Result<&'a mut T, ServiceError> {
    surfaces.get_mut(name).ok_or_else(|| ServiceError::EntityNotFound {
        kind: "surface",
        id: name.to_string(),
    })
}
