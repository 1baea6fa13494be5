//! Physical and numerical constants for the solver.

/// Default gravity magnitude (m/s^2), acting along -Y.
pub const GRAVITY: f32 = 9.82;

/// Default fluid density. The solver works in normalized units (water = 1.0).
pub const FLUID_DENSITY: f32 = 1.0;

/// PIC weight in the PIC/FLIP blend. Small values favor the FLIP delta and
/// avoid PIC's numerical damping.
pub const PIC_ALPHA: f32 = 0.05;

/// Advection micro-steps per simulation step.
pub const ADVECTION_SUBSTEPS: usize = 5;

/// Iteration cap for the pressure solve.
pub const PRESSURE_MAX_ITERATIONS: usize = 100;

/// Residual tolerance (infinity norm) for the pressure solve.
pub const PRESSURE_TOLERANCE: f64 = 1e-6;

/// CG step denominators below this are treated as zero.
pub const CG_DENOMINATOR_EPSILON: f64 = 1e-30;

/// MIC(0) tuning constant (0 = plain incomplete Cholesky, 1 = fully modified).
pub const MIC_TUNING: f64 = 0.97;

/// MIC(0) safety factor: fall back to the matrix diagonal when the pivot
/// drops below this fraction of it.
pub const MIC_SAFETY: f64 = 0.25;

/// Particles seeded per cell side at reset (2 x 2 x 2 = 8 per cell).
pub const SEEDS_PER_AXIS: usize = 2;

/// Seed jitter as a fraction of the half-cell micro-grid spacing.
/// Offsets are uniform in `[-JITTER/2, JITTER/2]` micro-cells, i.e. +-0.475 * h/2.
pub const SEED_JITTER: f32 = 0.95;
