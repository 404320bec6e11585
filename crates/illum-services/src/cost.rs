//! Cost estimator: derives budget units, memory and time for a model.
//!
//! Pure over its inputs: the same model always yields the same grid, lamp
//! and reflectance figures. The time prediction is the engine's and may
//! move if the engine's own state changes. Nothing here is cached; every
//! model edit invalidates an estimate, so callers recompute on each check.

use std::sync::Arc;

use illum_core::budget::{CostEstimate, ZoneCost};
use illum_core::config::BudgetSettings;
use illum_core::model::{ReflectanceSettings, Room, Zone};
use illum_core::{ModelState, SimulationEngine};

/// Bytes held per stored grid value.
const BYTES_PER_POINT: u64 = 8;
/// Bytes held per lamp (photometric tables and bookkeeping).
const BYTES_PER_LAMP: u64 = 40_000;
/// Transient bytes per grid point while a calculation runs.
const PEAK_BYTES_PER_POINT: u64 = 80;

#[derive(Clone)]
pub struct CostEstimator {
    engine: Arc<dyn SimulationEngine>,
    settings: BudgetSettings,
}

impl CostEstimator {
    pub fn new(engine: Arc<dyn SimulationEngine>, settings: BudgetSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &BudgetSettings {
        &self.settings
    }

    pub fn estimate(&self, model: &ModelState) -> CostEstimate {
        let s = &self.settings;

        let mut total_grid_points = 0u64;
        let mut zones: Vec<ZoneCost> = model
            .zones
            .iter()
            .map(|(id, zone)| {
                let grid_points = zone.grid_points();
                let cost_if_enabled = grid_points.saturating_mul(s.cost_per_grid_point);
                if zone.enabled {
                    total_grid_points = total_grid_points.saturating_add(grid_points);
                }
                ZoneCost {
                    id: id.clone(),
                    name: zone.display_name(id).to_string(),
                    kind: zone.kind(),
                    enabled: zone.enabled,
                    grid_points,
                    cost: if zone.enabled { cost_if_enabled } else { 0 },
                    cost_if_enabled,
                }
            })
            .collect();
        // Stable: ties keep id order.
        zones.sort_by(|a, b| b.cost.cmp(&a.cost));

        let lamp_count = model.chargeable_lamps().count() as u64;

        let refl = &model.room.reflectance;
        let (reflectance_passes, reflectance_grid_points, reflectance_cost) = if refl.enabled {
            let passes = self.passes_for(model);
            let points = refl.grid_points();
            let cost = points
                .saturating_mul(u64::from(passes))
                .saturating_mul(s.cost_per_reflectance_point);
            (passes, points, cost)
        } else {
            (0, 0, 0)
        };

        let grid_cost = total_grid_points.saturating_mul(s.cost_per_grid_point);
        let lamp_cost = lamp_count.saturating_mul(s.cost_per_lamp);
        let budget_units = grid_cost
            .saturating_add(lamp_cost)
            .saturating_add(reflectance_cost);

        let mut stored_memory_bytes = total_grid_points
            .saturating_mul(BYTES_PER_POINT)
            .saturating_add(lamp_count.saturating_mul(BYTES_PER_LAMP));
        if refl.enabled {
            stored_memory_bytes = stored_memory_bytes
                .saturating_add(reflectance_grid_points.saturating_mul(BYTES_PER_POINT));
        }
        let peak_memory_bytes = stored_memory_bytes
            .saturating_add(total_grid_points.saturating_mul(PEAK_BYTES_PER_POINT));

        CostEstimate {
            total_grid_points,
            zones,
            lamp_count,
            reflectance_enabled: refl.enabled,
            reflectance_passes,
            reflectance_grid_points,
            reflectance_cost,
            grid_cost,
            lamp_cost,
            stored_memory_bytes,
            peak_memory_bytes,
            calc_time_seconds: self.engine.estimate_time_seconds(model),
            budget_units,
        }
    }

    /// Interreflection passes the model will run with.
    pub fn passes_for(&self, model: &ModelState) -> u32 {
        self.passes_of(&model.room.reflectance)
    }

    fn passes_of(&self, refl: &ReflectanceSettings) -> u32 {
        refl.max_num_passes
            .filter(|p| *p > 0)
            .unwrap_or(self.settings.default_reflectance_passes)
    }

    // ── Deltas for speculative admission ─────────────────────────────────────

    /// Units a zone adds once enabled.
    pub fn zone_cost(&self, zone: &Zone) -> u64 {
        if !zone.enabled {
            return 0;
        }
        zone.grid_points().saturating_mul(self.settings.cost_per_grid_point)
    }

    pub fn lamp_cost(&self) -> u64 {
        self.settings.cost_per_lamp
    }

    /// Units a room edit adds through reflectance, given the room as it
    /// would be after the edit.
    ///
    /// Switching reflectance on charges the enabled zone grid points times
    /// the larger of the requested and default pass counts. While it stays
    /// on, the charge is the change in surface points times passes.
    pub fn reflectance_delta(&self, model: &ModelState, updated: &Room) -> u64 {
        let before = &model.room.reflectance;
        let after = &updated.reflectance;
        match (before.enabled, after.enabled) {
            (_, false) => 0,
            (false, true) => {
                let passes = self.passes_of(after).max(self.settings.default_reflectance_passes);
                let points = model
                    .zones
                    .values()
                    .filter(|z| z.enabled)
                    .fold(0u64, |acc, z| acc.saturating_add(z.grid_points()));
                points
                    .saturating_mul(u64::from(passes))
                    .saturating_mul(self.settings.cost_per_reflectance_point)
            }
            (true, true) => self
                .reflectance_cost(after)
                .saturating_sub(self.reflectance_cost(before)),
        }
    }

    fn reflectance_cost(&self, refl: &ReflectanceSettings) -> u64 {
        refl.grid_points()
            .saturating_mul(u64::from(self.passes_of(refl)))
            .saturating_mul(self.settings.cost_per_reflectance_point)
    }
}
