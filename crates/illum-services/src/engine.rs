//! Reference simulation engine.
//!
//! Inverse-square direct irradiance from each chargeable lamp, scaled by a
//! geometric series in the mean surface reflectance when interreflection is
//! on. Good enough to exercise the service end to end; not a photometric
//! solver.

use std::collections::BTreeMap;

use illum_core::engine::{CalcResults, CancelFlag, EngineError, ZoneResult, ZoneStatistics};
use illum_core::model::{Zone, ZoneBounds};
use illum_core::{ModelState, SimulationEngine};

/// Zone whose mean is reported as the room's mean fluence.
pub const FLUENCE_ZONE: &str = "WholeRoomFluence";

/// Distances below this are clamped, in room units.
const MIN_DISTANCE: f64 = 0.01;
/// Points evaluated between cancellation checks.
const CANCEL_POLL_EVERY: usize = 4096;

#[derive(Debug, Clone)]
pub struct ReferenceEngine {
    /// Fixed per-run cost in seconds.
    pub overhead_secs: f64,
    /// Seconds per lamp per grid point.
    pub secs_per_lamp_point: f64,
    /// Seconds per reflective point per pass.
    pub secs_per_reflective_point: f64,
    /// Passes used when the model leaves them unset.
    pub default_passes: u32,
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self {
            overhead_secs: 0.5,
            secs_per_lamp_point: 2e-6,
            secs_per_reflective_point: 1e-5,
            default_passes: 5,
        }
    }
}

impl ReferenceEngine {
    pub fn new(default_passes: u32) -> Self {
        Self {
            default_passes,
            ..Self::default()
        }
    }

    fn passes(&self, model: &ModelState) -> u32 {
        let refl = &model.room.reflectance;
        if !refl.enabled {
            return 0;
        }
        refl.max_num_passes.filter(|p| *p > 0).unwrap_or(self.default_passes)
    }

    /// `1 + R + R² + … + Rᵖ`
    fn reflectance_gain(&self, model: &ModelState) -> f64 {
        let r = model.room.reflectance.mean_reflectance();
        (1..=self.passes(model)).fold(1.0, |acc, p| acc + r.powi(p as i32))
    }
}

impl SimulationEngine for ReferenceEngine {
    fn estimate_time_seconds(&self, model: &ModelState) -> f64 {
        let lamps = model.chargeable_lamps().count() as f64;
        let points: u64 = model
            .zones
            .values()
            .filter(|z| z.enabled)
            .fold(0u64, |acc, z| acc.saturating_add(z.grid_points()));
        let passes = self.passes(model);
        let reflective = if passes > 0 {
            model.room.reflectance.grid_points() as f64 * f64::from(passes)
        } else {
            0.0
        };
        self.overhead_secs
            + lamps * points as f64 * self.secs_per_lamp_point
            + reflective * self.secs_per_reflective_point
    }

    fn run(&self, model: &ModelState, cancel: &CancelFlag) -> Result<CalcResults, EngineError> {
        let sources: Vec<([f64; 3], f64)> = model
            .chargeable_lamps()
            .filter_map(|(_, l)| l.photometry.as_ref().map(|p| (l.position, p.peak_intensity)))
            .collect();
        let gain = self.reflectance_gain(model);

        let mut zones = BTreeMap::new();
        let mut mean_fluence = None;

        for (id, zone) in model.zones.iter().filter(|(_, z)| z.enabled) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let coords = grid_coordinates(zone);
            let mut values = Vec::with_capacity(coords.len());
            for (i, p) in coords.iter().enumerate() {
                if i % CANCEL_POLL_EVERY == 0 && cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let direct: f64 = sources
                    .iter()
                    .map(|(pos, intensity)| intensity / distance_sq(pos, p))
                    .sum();
                values.push(direct * gain);
            }

            let statistics = ZoneStatistics::from_values(&values);
            if zone.name.as_deref() == Some(FLUENCE_ZONE) || id == FLUENCE_ZONE {
                mean_fluence = statistics.mean;
            }
            zones.insert(
                id.clone(),
                ZoneResult {
                    zone_id: id.clone(),
                    zone_name: zone.name.clone(),
                    zone_kind: zone.kind(),
                    statistics,
                    num_points: zone.num_points(),
                    values: Some(values),
                },
            );
        }

        Ok(CalcResults { zones, mean_fluence })
    }
}

fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d2 = (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2);
    d2.max(MIN_DISTANCE * MIN_DISTANCE)
}

/// Evenly spaced samples over `[lo, hi]`. A single sample sits at the centre.
fn axis(lo: f64, hi: f64, n: u32) -> Vec<f64> {
    if n <= 1 {
        return vec![(lo + hi) / 2.0];
    }
    let step = (hi - lo) / f64::from(n - 1);
    (0..n).map(|i| lo + step * f64::from(i)).collect()
}

/// Grid sample positions, x-major.
fn grid_coordinates(zone: &Zone) -> Vec<[f64; 3]> {
    let n = zone.num_points();
    let (xs, ys, zs) = match zone.bounds {
        ZoneBounds::Plane { x1, x2, y1, y2, height } => {
            (axis(x1, x2, n[0]), axis(y1, y2, n[1]), vec![height])
        }
        ZoneBounds::Volume { x1, x2, y1, y2, z1, z2 } => (
            axis(x1, x2, n[0]),
            axis(y1, y2, n[1]),
            axis(z1, z2, n.get(2).copied().unwrap_or(1)),
        ),
    };
    let mut out = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for x in &xs {
        for y in &ys {
            for z in &zs {
                out.push([*x, *y, *z]);
            }
        }
    }
    out
}
