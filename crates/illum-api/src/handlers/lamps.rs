//! /session/lamps handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use illum_core::model::{Lamp, Photometry};
use illum_core::ServiceError;

use super::{authorize, ApiError, ApiState, SuccessResponse};

/// A lamp together with its client-assigned id.
#[derive(Deserialize)]
pub struct LampInput {
    pub id: String,
    #[serde(flatten)]
    pub lamp: Lamp,
}

#[derive(Serialize)]
pub struct AddLampResponse {
    pub success: bool,
    pub lamp_id: String,
}

pub async fn handle_lamp_add(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(input): Json<LampInput>,
) -> Result<Json<AddLampResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let admission = state.gate.admission();
    let lamp_id = input.id.clone();

    session.update(|m| {
        let was_chargeable = m.lamps.get(&input.id).is_some_and(Lamp::is_chargeable);
        if input.lamp.is_chargeable() && !was_chargeable {
            admission.admit(m, admission.estimator().lamp_cost())?;
        }
        m.lamps.insert(input.id, input.lamp);
        Ok(())
    })?;

    tracing::debug!(lamp = %lamp_id, "lamp added");
    Ok(Json(AddLampResponse {
        success: true,
        lamp_id,
    }))
}

#[derive(Deserialize, Default)]
pub struct LampUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub position: Option<[f64; 3]>,
    pub photometry: Option<Photometry>,
}

pub async fn handle_lamp_update(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(lamp_id): Path<String>,
    Json(updates): Json<LampUpdate>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    let admission = state.gate.admission();

    session.update(|m| {
        let mut lamp = m.lamp_mut(&lamp_id)?.clone();
        let was_chargeable = lamp.is_chargeable();

        if let Some(name) = updates.name {
            lamp.name = Some(name);
        }
        if let Some(enabled) = updates.enabled {
            lamp.enabled = enabled;
        }
        if let Some(position) = updates.position {
            if position.iter().any(|v| !v.is_finite()) {
                return Err(ServiceError::InvalidModel("lamp position must be finite".into()));
            }
            lamp.position = position;
        }
        if let Some(photometry) = updates.photometry {
            lamp.photometry = Some(photometry);
        }

        if lamp.is_chargeable() && !was_chargeable {
            admission.admit(m, admission.estimator().lamp_cost())?;
        }
        *m.lamp_mut(&lamp_id)? = lamp;
        Ok(())
    })?;

    tracing::debug!(lamp = %lamp_id, "lamp updated");
    Ok(SuccessResponse::ok("Lamp updated"))
}

pub async fn handle_lamp_delete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(lamp_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = authorize(&state, &headers)?;
    session.update(|m| {
        m.lamps
            .remove(&lamp_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::EntityNotFound {
                kind: "lamp",
                id: lamp_id.clone(),
            })
    })?;

    tracing::debug!(lamp = %lamp_id, "lamp deleted");
    Ok(SuccessResponse::ok("Lamp deleted"))
}
