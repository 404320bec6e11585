//! Failure taxonomy shared by the services and the HTTP layer.
//!
//! Each variant is a distinct outcome with its own recovery story, so
//! callers match on the variant rather than on message text.

use crate::budget::BudgetRejection;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Live session ceiling reached. Retry later.
    #[error("server at capacity ({max} sessions), please try again later")]
    CapacityExceeded { max: usize },

    #[error("session not found, initialize a session first")]
    SessionNotFound,

    /// A caller-chosen id collided with a live session.
    #[error("session id already in use")]
    SessionExists,

    #[error("session has no model, call init first")]
    SessionNotInitialized,

    #[error("invalid or missing session token")]
    Unauthorized,

    #[error("{kind} {id} not found")]
    EntityNotFound { kind: &'static str, id: String },

    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Admission check failed. Carries the full breakdown.
    #[error("{}", .0.message)]
    BudgetExceeded(Box<BudgetRejection>),

    /// No calculation slot freed up within the queue wait.
    #[error("server busy ({slots} calculations running), please try again in a moment")]
    QueueTimeout { slots: usize },

    #[error(
        "calculation timed out after {secs}s, try reducing grid resolution, \
         lamp count or reflectance passes"
    )]
    ExecutionTimeout { secs: u64 },

    /// The engine raised. The cause is logged, never echoed to clients.
    #[error("calculation failed")]
    EngineFailure(String),
}

impl ServiceError {
    /// Short machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::CapacityExceeded { .. } => "capacity_exceeded",
            ServiceError::SessionNotFound => "session_not_found",
            ServiceError::SessionExists => "session_exists",
            ServiceError::SessionNotInitialized => "session_not_initialized",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::EntityNotFound { .. } => "not_found",
            ServiceError::InvalidModel(_) => "invalid_model",
            ServiceError::BudgetExceeded(_) => "budget_exceeded",
            ServiceError::QueueTimeout { .. } => "queue_timeout",
            ServiceError::ExecutionTimeout { .. } => "execution_timeout",
            ServiceError::EngineFailure(_) => "engine_failure",
        }
    }

    /// Transient conditions where the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::CapacityExceeded { .. } | ServiceError::QueueTimeout { .. }
        )
    }
}
