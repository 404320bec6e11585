//! illum-services: session store, cost estimator, admission controller,
//! concurrency gate and the reference engine.

pub mod admission;
pub mod cost;
pub mod engine;
pub mod gate;
pub mod session;

pub use admission::AdmissionController;
pub use cost::CostEstimator;
pub use engine::ReferenceEngine;
pub use gate::{CalcOutcome, ConcurrencyGate, ExecutionRecord, GateStatus};
pub use session::{NewSession, Session, SessionStore, SessionSummary};
