//! Cost estimate and admission payload types.
//!
//! These are plain data: the estimator and admission controller in
//! `illum-services` fill them in, the API serializes them verbatim.

use serde::{Deserialize, Serialize};

use crate::model::ZoneKind;

/// Per-zone line of a cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCost {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub enabled: bool,
    pub grid_points: u64,
    /// Budget units charged. Zero for disabled zones.
    pub cost: u64,
    /// What the zone would cost if it were enabled.
    pub cost_if_enabled: u64,
}

/// Fully derived cost of a model. Recomputed on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Grid points across enabled zones only.
    pub total_grid_points: u64,
    /// Every zone, disabled ones included, highest cost first.
    pub zones: Vec<ZoneCost>,
    pub lamp_count: u64,
    pub reflectance_enabled: bool,
    pub reflectance_passes: u32,
    pub reflectance_grid_points: u64,
    pub reflectance_cost: u64,
    pub grid_cost: u64,
    pub lamp_cost: u64,
    pub stored_memory_bytes: u64,
    pub peak_memory_bytes: u64,
    /// Engine-predicted wall-clock seconds.
    pub calc_time_seconds: f64,
    pub budget_units: u64,
}

/// Which ceiling tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Budget,
    Time,
    BudgetAndTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub used: u64,
    pub max: u64,
    pub percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneShare {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub grid_points: u64,
    pub cost: u64,
    pub percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LampShare {
    pub count: u64,
    pub cost: u64,
    pub percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectanceShare {
    pub enabled: bool,
    pub passes: u32,
    pub grid_points: u64,
    pub cost: u64,
    pub percent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub zones: Vec<ZoneShare>,
    pub lamps: LampShare,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflectance: Option<ReflectanceShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeUsage {
    pub estimated_seconds: f64,
    pub max_seconds: f64,
    pub percent: u64,
}

/// Structured rejection returned when a model is over either ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRejection {
    pub reason: RejectionReason,
    pub message: String,
    pub budget: BudgetUsage,
    pub breakdown: CostBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<TimeUsage>,
    pub suggestions: Vec<String>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Admitted(CostEstimate),
    Rejected(Box<BudgetRejection>),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted(_))
    }
}

/// `part / whole` as a rounded percentage. A zero whole yields 0.
pub fn percent_of(part: f64, whole: f64) -> u64 {
    if whole <= 0.0 || !whole.is_finite() || !part.is_finite() {
        return 0;
    }
    (part / whole * 100.0).round().max(0.0) as u64
}
