//! HTTP API handlers: thin JSON layer over the session services.

pub mod calculate;
pub mod lamps;
pub mod room;
pub mod session;
pub mod status;
pub mod zones;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use illum_core::config::IllumConfig;
use illum_core::{ServiceError, SimulationEngine};
use illum_services::{AdmissionController, ConcurrencyGate, CostEstimator, Session, SessionStore};

/// Header carrying the client's session id.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionStore,
    pub gate: ConcurrencyGate,
    /// Broadcast that triggers graceful shutdown. Only the daemon sends on it.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ApiState {
    /// Wire the services together from configuration.
    pub fn from_config(
        config: &IllumConfig,
        engine: Arc<dyn SimulationEngine>,
    ) -> std::io::Result<Self> {
        let estimator = CostEstimator::new(engine.clone(), config.budget.clone());
        let admission = AdmissionController::new(estimator, config.compute.execution_timeout());
        let gate = ConcurrencyGate::new(engine, admission, &config.compute)?;
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        Ok(Self {
            sessions: SessionStore::new(config.sessions.clone()),
            gate,
            shutdown_tx,
        })
    }

    fn require_token(&self) -> bool {
        self.sessions.settings().require_token
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    MissingSessionHeader,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::MissingSessionHeader => {
                let body = ErrorBody {
                    error: "missing_session_id",
                    message: "Missing X-Session-ID header. Initialize a session first.".into(),
                    detail: None,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Service(err) => err,
        };

        let status = match &err {
            ServiceError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::SessionNotFound => StatusCode::NOT_FOUND,
            ServiceError::SessionExists => StatusCode::CONFLICT,
            ServiceError::SessionNotInitialized => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidModel(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::BudgetExceeded(_) => StatusCode::BAD_REQUEST,
            ServiceError::QueueTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::ExecutionTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ServiceError::EngineFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &err {
            ServiceError::BudgetExceeded(rejection) => serde_json::to_value(rejection).ok(),
            _ => None,
        };

        let body = ErrorBody {
            error: err.kind(),
            message: err.to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn session_header(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingSessionHeader)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn check_token(state: &ApiState, session: &Session, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.require_token() {
        return Ok(());
    }
    match bearer_token(headers) {
        Some(token) if session.verify_token(token) => Ok(()),
        _ => Err(ServiceError::Unauthorized.into()),
    }
}

/// Resolve the calling session from its headers and verify its credential.
fn authorize(state: &ApiState, headers: &HeaderMap) -> Result<Arc<Session>, ApiError> {
    let id = session_header(headers)?;
    let session = state.sessions.require(&id)?;
    check_token(state, &session, headers)?;
    Ok(session)
}

/// Plain acknowledgement for mutations with nothing else to report.
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

pub use calculate::{handle_calculate, handle_estimate};
pub use lamps::{handle_lamp_add, handle_lamp_delete, handle_lamp_update};
pub use room::handle_room_update;
pub use session::{handle_session_create, handle_session_delete, handle_session_init, handle_session_status};
pub use status::handle_status;
pub use zones::{handle_zone_add, handle_zone_delete, handle_zone_list, handle_zone_update};
