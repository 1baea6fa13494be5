//! Simulation configuration.
//!
//! Every field has a serde default, so a JSON file only needs the values it
//! overrides. [`SimConfig::default`] is the reference scene: a 100x78x64 tank
//! with three blocks of water.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    ADVECTION_SUBSTEPS, FLUID_DENSITY, GRAVITY, PIC_ALPHA, PRESSURE_MAX_ITERATIONS,
    PRESSURE_TOLERANCE,
};
use crate::spawning::SeedRegion;

/// Errors from building or loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An axis has room for neither the solid shell nor any fluid.
    #[error("grid needs at least 3 cells per axis, got {nx}x{ny}x{nz}")]
    GridTooSmall { nx: usize, ny: usize, nz: usize },

    /// A strictly positive quantity was zero, negative or NaN.
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f32 },

    #[error("gravity magnitude must be non-negative, got {0}")]
    NegativeGravity(f32),

    #[error("PIC/FLIP alpha must lie in [0, 1], got {0}")]
    AlphaOutOfRange(f32),

    #[error("particle capacity must be non-zero")]
    ZeroCapacity,

    #[error("pressure solver needs at least one iteration")]
    ZeroIterations,

    #[error("advection needs at least one substep")]
    ZeroSubsteps,

    #[error("pressure tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),

    /// A seed region with `min >= max` on some axis.
    #[error("seed region {index} is empty: min {min:?}, max {max:?}")]
    EmptyRegion {
        index: usize,
        min: [usize; 3],
        max: [usize; 3],
    },

    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Solver parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Cells along X (including the solid shell)
    #[serde(default = "default_nx")]
    pub nx: usize,
    #[serde(default = "default_ny")]
    pub ny: usize,
    #[serde(default = "default_nz")]
    pub nz: usize,
    /// Cell size in world units
    #[serde(default = "default_h")]
    pub h: f32,
    /// Simulated time advanced per frame
    #[serde(default = "default_timestep")]
    pub timestep: f32,
    /// Gravity magnitude, acting along -Y
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    #[serde(default = "default_rho")]
    pub rho: f32,
    /// Particle capacity
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,
    /// PIC weight in the PIC/FLIP blend (0 = pure FLIP, 1 = pure PIC)
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Advection micro-steps per solver step
    #[serde(default = "default_advection_substeps")]
    pub advection_substeps: usize,
    #[serde(default = "default_cg_max_iterations")]
    pub cg_max_iterations: usize,
    /// Infinity-norm residual tolerance for the pressure solve
    #[serde(default = "default_cg_tolerance")]
    pub cg_tolerance: f64,
    /// Use MIC(0)-preconditioned CG instead of plain CG
    #[serde(default)]
    pub preconditioned: bool,
    /// RNG seed for particle jitter; `None` seeds from entropy
    #[serde(default)]
    pub seed: Option<u64>,
    /// Regions filled on reset; `None` uses the default blocks scaled to the grid
    #[serde(default)]
    pub seed_regions: Option<Vec<SeedRegion>>,
}

fn default_nx() -> usize {
    100
}
fn default_ny() -> usize {
    78
}
fn default_nz() -> usize {
    64
}
fn default_h() -> f32 {
    0.1
}
fn default_timestep() -> f32 {
    1.0 / 30.0
}
fn default_gravity() -> f32 {
    GRAVITY
}
fn default_rho() -> f32 {
    FLUID_DENSITY
}
fn default_max_particles() -> usize {
    240_000
}
fn default_alpha() -> f32 {
    PIC_ALPHA
}
fn default_advection_substeps() -> usize {
    ADVECTION_SUBSTEPS
}
fn default_cg_max_iterations() -> usize {
    PRESSURE_MAX_ITERATIONS
}
fn default_cg_tolerance() -> f64 {
    PRESSURE_TOLERANCE
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nx: default_nx(),
            ny: default_ny(),
            nz: default_nz(),
            h: default_h(),
            timestep: default_timestep(),
            gravity: default_gravity(),
            rho: default_rho(),
            max_particles: default_max_particles(),
            alpha: default_alpha(),
            advection_substeps: default_advection_substeps(),
            cg_max_iterations: default_cg_max_iterations(),
            cg_tolerance: default_cg_tolerance(),
            preconditioned: false,
            seed: None,
            seed_regions: None,
        }
    }
}

impl SimConfig {
    /// Config for a grid of the given size, everything else default.
    pub fn with_dims(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            ..Self::default()
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    /// Regions to fill on reset.
    pub fn regions(&self) -> Vec<SeedRegion> {
        match &self.seed_regions {
            Some(regions) => regions.clone(),
            None => SeedRegion::defaults_for(self.dims()),
        }
    }

    /// Check every parameter the solver relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nx < 3 || self.ny < 3 || self.nz < 3 {
            return Err(ConfigError::GridTooSmall {
                nx: self.nx,
                ny: self.ny,
                nz: self.nz,
            });
        }
        for (name, value) in [("h", self.h), ("timestep", self.timestep), ("rho", self.rho)] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !(self.gravity >= 0.0) || !self.gravity.is_finite() {
            return Err(ConfigError::NegativeGravity(self.gravity));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::AlphaOutOfRange(self.alpha));
        }
        if self.max_particles == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.cg_max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.advection_substeps == 0 {
            return Err(ConfigError::ZeroSubsteps);
        }
        if !(self.cg_tolerance > 0.0) {
            return Err(ConfigError::NonPositiveTolerance(self.cg_tolerance));
        }
        if let Some(regions) = &self.seed_regions {
            for (index, r) in regions.iter().enumerate() {
                if (0..3).any(|a| r.min[a] >= r.max[a]) {
                    return Err(ConfigError::EmptyRegion {
                        index,
                        min: r.min,
                        max: r.max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Save config to JSON file
    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from JSON file. The result is validated.
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_reference_scene() {
        let c = SimConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.dims(), [100, 78, 64]);
        assert_eq!(c.max_particles, 240_000);
        assert!((c.timestep - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(c.regions().len(), 3);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let c = SimConfig::from_json_str("{}").unwrap();
        assert_eq!(c, SimConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let c = SimConfig::from_json_str(
            r#"{"nx": 12, "ny": 10, "nz": 8, "seed": 42, "preconditioned": true}"#,
        )
        .unwrap();
        assert_eq!(c.dims(), [12, 10, 8]);
        assert_eq!(c.seed, Some(42));
        assert!(c.preconditioned);
        assert_eq!(c.cg_max_iterations, PRESSURE_MAX_ITERATIONS);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            SimConfig::with_dims(2, 10, 10),
            SimConfig {
                h: 0.0,
                ..SimConfig::default()
            },
            SimConfig {
                timestep: f32::NAN,
                ..SimConfig::default()
            },
            SimConfig {
                gravity: -1.0,
                ..SimConfig::default()
            },
            SimConfig {
                alpha: 1.5,
                ..SimConfig::default()
            },
            SimConfig {
                max_particles: 0,
                ..SimConfig::default()
            },
            SimConfig {
                cg_max_iterations: 0,
                ..SimConfig::default()
            },
            SimConfig {
                cg_tolerance: 0.0,
                ..SimConfig::default()
            },
            SimConfig {
                seed_regions: Some(vec![SeedRegion::new([3, 1, 1], [3, 4, 4])]),
                ..SimConfig::default()
            },
        ];
        for c in bad {
            assert!(c.validate().is_err(), "accepted {:?}", c);
        }
    }

    #[test]
    fn test_error_messages() {
        let err = SimConfig::with_dims(2, 3, 4).validate().unwrap_err();
        assert_eq!(err.to_string(), "grid needs at least 3 cells per axis, got 2x3x4");
        let err = SimConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_json_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("flip3d-config-{}.json", std::process::id()));
        let mut c = SimConfig::with_dims(16, 12, 10);
        c.seed = Some(9);
        c.seed_regions = Some(vec![SeedRegion::new([1, 1, 1], [4, 4, 4])]);
        c.save_json(&path).unwrap();
        let loaded = SimConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, c);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SimConfig::load_json(Path::new("/nonexistent/flip3d.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
