//! Simulation engine contract.
//!
//! The engine owns the photometric math. This crate only needs two things
//! from it: a time prediction for a model, and a synchronous run. Both are
//! called with an immutable snapshot of the session's model.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{ModelState, ZoneKind};

pub trait SimulationEngine: Send + Sync + 'static {
    /// Predicted wall-clock seconds for running `model` as configured.
    fn estimate_time_seconds(&self, model: &ModelState) -> f64;

    /// Run the calculation. Blocking; always called off the request path.
    ///
    /// `cancel` is raised once the caller has given up on the result.
    /// Engines may poll it to stop early but are not required to.
    fn run(&self, model: &ModelState, cancel: &CancelFlag) -> Result<CalcResults, EngineError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("calculation cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Shared cancellation flag handed to a running calculation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl ZoneStatistics {
    /// Statistics over the finite values only.
    pub fn from_values(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self::default();
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            min: finite.iter().copied().reduce(f64::min),
            max: finite.iter().copied().reduce(f64::max),
            mean: Some(mean),
            std: Some(var.sqrt()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneResult {
    pub zone_id: String,
    pub zone_name: Option<String>,
    pub zone_kind: ZoneKind,
    pub statistics: ZoneStatistics,
    pub num_points: Vec<u32>,
    /// Flattened values, x-major.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcResults {
    pub zones: BTreeMap<String, ZoneResult>,
    pub mean_fluence: Option<f64>,
}
