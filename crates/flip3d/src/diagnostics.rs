//! Per-frame statistics and the read-only view handed to renderers.

use glam::Vec3;
use serde::Serialize;

use crate::cg::SolveStats;
use crate::serde_utils::serialize_vec3_slice;

/// Outcome of a single solver step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepStats {
    /// Particles dropped at transfer
    pub removed_particles: usize,
    pub solve: SolveStats,
}

/// What happened during one `step_frame` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Frame number after this frame (1 for the first frame)
    pub frame: u64,
    /// Solver steps taken to cover the frame's timestep
    pub substeps: usize,
    /// CG iterations summed over all substeps
    pub cg_iterations: usize,
    /// Largest final CG residual among the substeps
    pub max_residual: f64,
    /// Substeps whose pressure solve hit the iteration cap
    pub unconverged_solves: usize,
    /// Particles dropped at transfer (in SOLID or outside the domain)
    pub removed_particles: usize,
    pub particle_count: usize,
    /// Simulated time covered by this frame
    pub simulated_time: f64,
    /// Largest `dt / cfl` ratio among the substeps; never above 1
    pub max_cfl_fraction: f64,
    /// Fastest particle at the end of the frame
    pub max_particle_speed: f32,
    /// Wall-clock time spent in the frame, in milliseconds
    pub wall_time_ms: f64,
}

impl FrameStats {
    /// Fold one solver step into the frame totals.
    ///
    /// `cfl` is the step size limit in force when the step was taken.
    pub fn record_step(&mut self, step: &StepStats, dt: f64, cfl: f64) {
        self.substeps += 1;
        self.removed_particles += step.removed_particles;
        self.simulated_time += dt;
        if cfl > 0.0 {
            self.max_cfl_fraction = self.max_cfl_fraction.max(dt / cfl);
        }
        self.record_solve(&step.solve);
    }

    /// Fold one pressure solve into the frame totals.
    pub fn record_solve(&mut self, stats: &SolveStats) {
        self.cg_iterations += stats.iterations;
        self.max_residual = self.max_residual.max(stats.residual);
        if !stats.converged {
            self.unconverged_solves += 1;
        }
    }
}

/// Borrowed particle state plus the voxel classification.
///
/// `voxel_flags` uses AIR=0, FLUID=1, SOLID=2 with the grid's linear index
/// `i + nx * (j + ny * k)`.
#[derive(Clone, Debug, Serialize)]
pub struct FrameSnapshot<'a> {
    pub frame: u64,
    pub time: f64,
    pub dims: [usize; 3],
    pub cell_size: f32,
    #[serde(serialize_with = "serialize_vec3_slice")]
    pub positions: &'a [Vec3],
    #[serde(serialize_with = "serialize_vec3_slice")]
    pub velocities: &'a [Vec3],
    pub voxel_flags: Vec<u8>,
}

impl FrameSnapshot<'_> {
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }
}
