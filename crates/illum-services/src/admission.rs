//! Admission control against the unit and wall-clock ceilings.
//!
//! A check either admits the model (returning the estimate it was judged
//! on) or builds a rejection with a per-category breakdown and remediation
//! suggestions. Nothing here ever trims a model on the caller's behalf.

use std::time::Duration;

use illum_core::budget::{
    percent_of, AdmissionDecision, BudgetRejection, BudgetUsage, CostBreakdown, CostEstimate,
    LampShare, ReflectanceShare, RejectionReason, TimeUsage, ZoneShare,
};
use illum_core::{ModelState, ServiceError};

use crate::cost::CostEstimator;

/// Zones above this share of the estimate are named individually.
const ZONE_SHARE_THRESHOLD: f64 = 0.2;
const GRID_SHARE_THRESHOLD: f64 = 0.5;
const REFLECTANCE_SHARE_THRESHOLD: f64 = 0.3;
/// Lamp count above which disabling lamps is suggested on a unit overage.
const MANY_LAMPS: u64 = 5;
const MAX_NAMED_ZONES: usize = 2;

#[derive(Clone)]
pub struct AdmissionController {
    estimator: CostEstimator,
    max_budget_units: u64,
    max_calc_time_secs: f64,
}

impl AdmissionController {
    /// The time ceiling is `time_ceiling_fraction` of the execution timeout,
    /// so oversized models are turned away before the gate would kill them.
    pub fn new(estimator: CostEstimator, execution_timeout: Duration) -> Self {
        let settings = estimator.settings();
        let max_budget_units = settings.max_budget_units;
        let max_calc_time_secs = execution_timeout.as_secs_f64() * settings.time_ceiling_fraction;
        Self {
            estimator,
            max_budget_units,
            max_calc_time_secs,
        }
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    pub fn max_budget_units(&self) -> u64 {
        self.max_budget_units
    }

    pub fn max_calc_time_secs(&self) -> f64 {
        self.max_calc_time_secs
    }

    /// Judge `model` as if `additional_cost` more units were already in it.
    pub fn check(&self, model: &ModelState, additional_cost: u64) -> AdmissionDecision {
        let estimate = self.estimator.estimate(model);
        let total = estimate.budget_units.saturating_add(additional_cost);

        let budget_exceeded = total > self.max_budget_units;
        let time_exceeded = estimate.calc_time_seconds > self.max_calc_time_secs;

        if !budget_exceeded && !time_exceeded {
            return AdmissionDecision::Admitted(estimate);
        }

        let reason = match (budget_exceeded, time_exceeded) {
            (true, true) => RejectionReason::BudgetAndTime,
            (true, false) => RejectionReason::Budget,
            _ => RejectionReason::Time,
        };
        AdmissionDecision::Rejected(Box::new(self.rejection(&estimate, total, reason)))
    }

    /// `check` mapped onto the error taxonomy.
    pub fn admit(&self, model: &ModelState, additional_cost: u64) -> Result<CostEstimate, ServiceError> {
        match self.check(model, additional_cost) {
            AdmissionDecision::Admitted(estimate) => Ok(estimate),
            AdmissionDecision::Rejected(rejection) => {
                tracing::info!(
                    reason = ?rejection.reason,
                    used = rejection.budget.used,
                    max = rejection.budget.max,
                    "admission rejected"
                );
                Err(ServiceError::BudgetExceeded(rejection))
            }
        }
    }

    fn rejection(&self, est: &CostEstimate, total: u64, reason: RejectionReason) -> BudgetRejection {
        let units = est.budget_units as f64;
        let time_exceeded = matches!(reason, RejectionReason::Time | RejectionReason::BudgetAndTime);

        let zones = est
            .zones
            .iter()
            .filter(|z| z.enabled)
            .map(|z| ZoneShare {
                id: z.id.clone(),
                name: z.name.clone(),
                kind: z.kind,
                grid_points: z.grid_points,
                cost: z.cost,
                percent: percent_of(z.cost as f64, units),
            })
            .collect();

        let reflectance = est.reflectance_enabled.then(|| ReflectanceShare {
            enabled: true,
            passes: est.reflectance_passes,
            grid_points: est.reflectance_grid_points,
            cost: est.reflectance_cost,
            percent: percent_of(est.reflectance_cost as f64, units),
        });

        let time_estimate = (time_exceeded || est.calc_time_seconds > self.max_calc_time_secs * 0.5)
            .then(|| TimeUsage {
                estimated_seconds: (est.calc_time_seconds * 10.0).round() / 10.0,
                max_seconds: self.max_calc_time_secs,
                percent: percent_of(est.calc_time_seconds, self.max_calc_time_secs),
            });

        let message = if matches!(reason, RejectionReason::Time) {
            "Estimated calculation time exceeds limit"
        } else {
            "Session exceeds compute budget"
        };

        BudgetRejection {
            reason,
            message: message.to_string(),
            budget: BudgetUsage {
                used: total,
                max: self.max_budget_units,
                percent: percent_of(total as f64, self.max_budget_units as f64),
            },
            breakdown: CostBreakdown {
                zones,
                lamps: LampShare {
                    count: est.lamp_count,
                    cost: est.lamp_cost,
                    percent: percent_of(est.lamp_cost as f64, units),
                },
                reflectance,
            },
            time_estimate,
            suggestions: suggestions(est, time_exceeded),
        }
    }
}

/// Remediation hints, most effective first.
pub fn suggestions(est: &CostEstimate, time_exceeded: bool) -> Vec<String> {
    let mut out = Vec::new();
    let units = est.budget_units as f64;

    // Time scales with lamps × points, so fewer lamps is the strongest lever.
    if time_exceeded && est.lamp_count > 1 {
        out.push(format!(
            "Reduce number of lamps (currently {}, calculation time scales linearly with lamp count)",
            est.lamp_count
        ));
    }

    if units > 0.0 {
        // `zones` is already sorted by cost, highest first.
        let heavy: Vec<_> = est
            .zones
            .iter()
            .filter(|z| z.enabled && z.cost as f64 > units * ZONE_SHARE_THRESHOLD)
            .collect();
        for zone in heavy.iter().take(MAX_NAMED_ZONES) {
            out.push(format!(
                "Reduce resolution of '{}' zone ({} grid points)",
                zone.name,
                group_thousands(zone.grid_points)
            ));
        }

        if heavy.is_empty() && est.grid_cost as f64 / units > GRID_SHARE_THRESHOLD {
            out.push(
                "Reduce grid resolution (increase spacing or decrease num_x/num_y/num_z)".to_string(),
            );
        }

        if est.reflectance_enabled && est.reflectance_cost as f64 / units > REFLECTANCE_SHARE_THRESHOLD {
            out.push(format!(
                "Reduce reflectance passes (currently {})",
                est.reflectance_passes
            ));
        }
    }

    if est.reflectance_enabled {
        out.push("Disable reflectance calculation".to_string());
    }

    if est.lamp_count > MANY_LAMPS && !time_exceeded {
        out.push(format!(
            "Disable some lamps (currently {} enabled)",
            est.lamp_count
        ));
    }

    if out.is_empty() {
        out.push("Remove or disable some calculation zones".to_string());
    }
    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
