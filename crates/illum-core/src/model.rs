//! Room model: the per-session state clients configure.
//!
//! Every entity is keyed by the identifier the client assigned to it. The
//! maps are ordered so iteration (and therefore every derived estimate) is
//! deterministic for a given model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Smallest grid spacing accepted, in room units. Guards against accidental
/// multi-million point grids from a typo in a spacing field.
pub const MIN_SPACING: f64 = 0.005;

/// Surfaces every room starts with.
pub const DEFAULT_SURFACES: [&str; 6] = ["floor", "ceiling", "north", "south", "east", "west"];

/// Reflectance assigned to default surfaces.
pub const DEFAULT_REFLECTANCE: f64 = 0.078;

/// The complete model owned by one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub room: Room,
    #[serde(default)]
    pub lamps: BTreeMap<String, Lamp>,
    #[serde(default)]
    pub zones: BTreeMap<String, Zone>,
}

impl ModelState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            lamps: BTreeMap::new(),
            zones: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.room.validate()?;
        for (id, zone) in &self.zones {
            zone.validate().map_err(|e| match e {
                ServiceError::InvalidModel(msg) => {
                    ServiceError::InvalidModel(format!("zone {id}: {msg}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn lamp_mut(&mut self, id: &str) -> Result<&mut Lamp, ServiceError> {
        self.lamps.get_mut(id).ok_or_else(|| ServiceError::EntityNotFound {
            kind: "lamp",
            id: id.to_string(),
        })
    }

    pub fn zone_mut(&mut self, id: &str) -> Result<&mut Zone, ServiceError> {
        self.zones.get_mut(id).ok_or_else(|| ServiceError::EntityNotFound {
            kind: "zone",
            id: id.to_string(),
        })
    }

    /// Lamps that cost anything: enabled and carrying usable photometry.
    pub fn chargeable_lamps(&self) -> impl Iterator<Item = (&String, &Lamp)> {
        self.lamps.iter().filter(|(_, l)| l.is_chargeable())
    }
}

// ── Room ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Meters,
    Feet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub reflectance: ReflectanceSettings,
}

impl Room {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            units: Units::Meters,
            reflectance: ReflectanceSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        for (axis, v) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ServiceError::InvalidModel(format!(
                    "room {axis} must be positive, got {v}"
                )));
            }
        }
        for (name, surface) in &self.reflectance.surfaces {
            if !(0.0..=1.0).contains(&surface.reflectance) {
                return Err(ServiceError::InvalidModel(format!(
                    "surface {name} reflectance must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectanceSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Interreflection passes. `None` means the configured default.
    #[serde(default)]
    pub max_num_passes: Option<u32>,
    #[serde(default = "default_surfaces")]
    pub surfaces: BTreeMap<String, ReflectiveSurface>,
}

impl Default for ReflectanceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_num_passes: None,
            surfaces: default_surfaces(),
        }
    }
}

impl ReflectanceSettings {
    /// Grid points summed over every reflective surface.
    pub fn grid_points(&self) -> u64 {
        self.surfaces
            .values()
            .fold(0u64, |acc, s| acc.saturating_add(s.grid_points()))
    }

    /// Mean reflectance across surfaces, 0 when there are none.
    pub fn mean_reflectance(&self) -> f64 {
        if self.surfaces.is_empty() {
            return 0.0;
        }
        self.surfaces.values().map(|s| s.reflectance).sum::<f64>() / self.surfaces.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectiveSurface {
    pub reflectance: f64,
    pub num_x: u32,
    pub num_y: u32,
}

impl ReflectiveSurface {
    pub fn grid_points(&self) -> u64 {
        u64::from(self.num_x).saturating_mul(u64::from(self.num_y))
    }
}

fn default_surfaces() -> BTreeMap<String, ReflectiveSurface> {
    DEFAULT_SURFACES
        .iter()
        .map(|name| {
            (
                name.to_string(),
                ReflectiveSurface {
                    reflectance: DEFAULT_REFLECTANCE,
                    num_x: 10,
                    num_y: 10,
                },
            )
        })
        .collect()
}

// ── Lamps ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lamp {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub position: [f64; 3],
    /// Parsed photometric summary. Absent until the client supplies data.
    #[serde(default)]
    pub photometry: Option<Photometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    /// Peak radiant intensity, in mW/sr.
    pub peak_intensity: f64,
}

impl Lamp {
    /// True when the lamp has photometric data a calculation can use.
    pub fn has_photometry(&self) -> bool {
        self.photometry
            .as_ref()
            .is_some_and(|p| p.peak_intensity.is_finite() && p.peak_intensity > 0.0)
    }

    pub fn is_chargeable(&self) -> bool {
        self.enabled && self.has_photometry()
    }
}

fn enabled_by_default() -> bool {
    true
}

// ── Zones ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Plane,
    Volume,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Plane => "plane",
            ZoneKind::Volume => "volume",
        }
    }
}

/// Spatial extent of a zone. Planes sit at a fixed height; volumes span z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ZoneBounds {
    Plane {
        x1: f64,
        x2: f64,
        y1: f64,
        y2: f64,
        height: f64,
    },
    Volume {
        x1: f64,
        x2: f64,
        y1: f64,
        y2: f64,
        z1: f64,
        z2: f64,
    },
}

/// How the client expressed grid resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridSpec {
    Points {
        num_x: u32,
        num_y: u32,
        #[serde(default)]
        num_z: Option<u32>,
    },
    Spacing {
        x_spacing: f64,
        y_spacing: f64,
        #[serde(default)]
        z_spacing: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub bounds: ZoneBounds,
    pub grid: GridSpec,
}

impl Zone {
    pub fn kind(&self) -> ZoneKind {
        match self.bounds {
            ZoneBounds::Plane { .. } => ZoneKind::Plane,
            ZoneBounds::Volume { .. } => ZoneKind::Volume,
        }
    }

    /// Axis extents: two for planes, three for volumes.
    fn extents(&self) -> Vec<f64> {
        match self.bounds {
            ZoneBounds::Plane { x1, x2, y1, y2, .. } => vec![(x2 - x1).abs(), (y2 - y1).abs()],
            ZoneBounds::Volume {
                x1,
                x2,
                y1,
                y2,
                z1,
                z2,
            } => vec![(x2 - x1).abs(), (y2 - y1).abs(), (z2 - z1).abs()],
        }
    }

    /// Point counts per axis after resolving spacing against the bounds.
    pub fn num_points(&self) -> Vec<u32> {
        let extents = self.extents();
        match &self.grid {
            GridSpec::Points { num_x, num_y, num_z } => {
                let mut counts = vec![(*num_x).max(1), (*num_y).max(1)];
                if extents.len() == 3 {
                    counts.push(num_z.unwrap_or(1).max(1));
                }
                counts
            }
            GridSpec::Spacing {
                x_spacing,
                y_spacing,
                z_spacing,
            } => {
                let mut spacings = vec![*x_spacing, *y_spacing];
                if extents.len() == 3 {
                    spacings.push(z_spacing.unwrap_or(*x_spacing));
                }
                extents
                    .iter()
                    .zip(spacings)
                    .map(|(extent, spacing)| points_for_spacing(*extent, spacing))
                    .collect()
            }
        }
    }

    /// Effective spacing per axis. A single-point axis reports its extent.
    pub fn spacings(&self) -> Vec<f64> {
        self.extents()
            .into_iter()
            .zip(self.num_points())
            .map(|(extent, n)| if n > 1 { extent / f64::from(n - 1) } else { extent })
            .collect()
    }

    pub fn grid_points(&self) -> u64 {
        self.num_points()
            .into_iter()
            .fold(1u64, |acc, n| acc.saturating_mul(u64::from(n)))
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        let finite = match self.bounds {
            ZoneBounds::Plane {
                x1,
                x2,
                y1,
                y2,
                height,
            } => [x1, x2, y1, y2, height].iter().all(|v| v.is_finite()),
            ZoneBounds::Volume {
                x1,
                x2,
                y1,
                y2,
                z1,
                z2,
            } => [x1, x2, y1, y2, z1, z2].iter().all(|v| v.is_finite()),
        };
        if !finite {
            return Err(ServiceError::InvalidModel("bounds must be finite".into()));
        }
        if let GridSpec::Spacing {
            x_spacing,
            y_spacing,
            z_spacing,
        } = &self.grid
        {
            let all = [Some(*x_spacing), Some(*y_spacing), *z_spacing];
            if all.iter().flatten().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err(ServiceError::InvalidModel("spacing must be positive".into()));
            }
        }
        Ok(())
    }
}

fn points_for_spacing(extent: f64, spacing: f64) -> u32 {
    let spacing = if spacing.is_finite() {
        spacing.max(MIN_SPACING)
    } else {
        MIN_SPACING
    };
    let intervals = (extent / spacing).round();
    if intervals >= f64::from(u32::MAX - 1) {
        return u32::MAX;
    }
    intervals as u32 + 1
}
