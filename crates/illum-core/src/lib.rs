//! illum-core: shared configuration, room model, engine contract and
//! error types. All other Illuminate crates depend on this one.

pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;

pub use budget::{AdmissionDecision, BudgetRejection, CostEstimate};
pub use engine::{CalcResults, CancelFlag, EngineError, SimulationEngine};
pub use error::ServiceError;
pub use model::{Lamp, ModelState, Room, Zone};
