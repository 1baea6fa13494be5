//! 3D PIC/FLIP free-surface liquid solver
//!
//! Particles carry the fluid; a uniform MAC grid is rebuilt from them every
//! step to apply gravity, enforce incompressibility with a conjugate-gradient
//! pressure solve, and hand the corrected velocities back to the particles.
//!
//! # Example
//!
//! ```
//! use flip3d::{FluidSolver, SimConfig};
//!
//! let mut config = SimConfig::with_dims(16, 16, 16);
//! config.seed = Some(1);
//! config.max_particles = 50_000;
//!
//! let mut solver = FluidSolver::new(config)?;
//! let before = solver.particle_count();
//!
//! let stats = solver.step_frame();
//! assert!(stats.substeps >= 1);
//! assert!(solver.particle_count() <= before);
//! # Ok::<(), flip3d::ConfigError>(())
//! ```

pub mod array3;
pub mod cg;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod grid;
pub mod particle;
pub mod serde_utils;
pub mod sparse;
pub mod spawning;
pub mod transfer;

pub use array3::{Array3, Array3f, MarkerField};
pub use cg::{ConjugateGradientSolver, SolveStats};
pub use config::{ConfigError, SimConfig};
pub use diagnostics::{FrameSnapshot, FrameStats, StepStats};
pub use glam::Vec3;
pub use grid::{CellType, Grid};
pub use particle::ParticleSet;
pub use sparse::{SparseMatrix, Stencil, VectorN};
pub use spawning::SeedRegion;

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Remaining frame time below this fraction of the timestep is dropped
/// instead of taking a vanishing substep.
const FRAME_TIME_EPSILON: f64 = 1e-9;

/// PIC/FLIP liquid simulation: grid, particles and the stepping pipeline.
pub struct FluidSolver {
    /// The MAC grid for pressure and velocity
    pub grid: Grid,
    /// All particles in the simulation
    pub particles: ParticleSet,

    config: SimConfig,
    rng: StdRng,

    /// Frames completed since the last reset
    frame: u64,
    /// Simulated time since the last reset
    time: f64,
}

impl FluidSolver {
    /// Build a solver and seed its initial particles.
    ///
    /// The jitter RNG uses `config.seed` when set, entropy otherwise.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let grid = Grid::new(
            config.nx,
            config.ny,
            config.nz,
            config.h,
            config.gravity,
            config.rho,
        );
        let particles = ParticleSet::new(config.max_particles, &grid);

        log::info!(
            "FluidSolver: {}x{}x{} cells, h={}, capacity {} particles, {}",
            config.nx,
            config.ny,
            config.nz,
            config.h,
            config.max_particles,
            if config.preconditioned { "MIC(0)-PCG" } else { "CG" }
        );

        let mut solver = Self {
            grid,
            particles,
            config,
            rng,
            frame: 0,
            time: 0.0,
        };
        solver.reset();
        Ok(solver)
    }

    /// Build a solver with a fixed RNG seed, overriding `config.seed`.
    pub fn with_seed(mut config: SimConfig, seed: u64) -> Result<Self, ConfigError> {
        config.seed = Some(seed);
        Self::new(config)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Clear all state and reseed the configured regions.
    ///
    /// With a fixed seed every reset reproduces the same particle layout.
    pub fn reset(&mut self) {
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        self.particles.clear();
        self.particles.clear_weights();
        self.grid.zero();
        self.grid.du.zero();
        self.grid.dv.zero();
        self.grid.dw.zero();
        self.grid.pressure.zero();
        self.grid.classify_voxel();
        self.frame = 0;
        self.time = 0.0;

        let regions = self.config.regions();
        let added =
            spawning::seed_regions(&mut self.particles, &self.grid, &regions, &mut self.rng);

        log::info!(
            "Reset: seeded {} particles in {} regions",
            added,
            regions.len()
        );
    }

    /// Add a single particle. Returns `false` when the set is full.
    pub fn add_particle(&mut self, pos: Vec3, vel: Vec3) -> bool {
        let added = self.particles.add(pos, vel);
        if !added {
            log::warn!(
                "Particle capacity {} reached, dropping particle at {:?}",
                self.particles.capacity(),
                pos
            );
        }
        added
    }

    /// Advance one frame of `config.timestep`, split into CFL-limited steps.
    pub fn step_frame(&mut self) -> FrameStats {
        let start = Instant::now();
        let target = self.config.timestep as f64;
        let mut elapsed = 0.0f64;
        let mut stats = FrameStats::default();

        while target - elapsed > target * FRAME_TIME_EPSILON {
            let remaining = target - elapsed;
            let cfl = self.grid.cfl() as f64;
            let dt = cfl.min(remaining);
            let step = self.step(dt as f32);
            stats.record_step(&step, dt, cfl);
            elapsed += dt;
        }

        self.frame += 1;
        stats.frame = self.frame;
        stats.particle_count = self.particles.len();
        stats.max_particle_speed = self.particles.max_speed();
        stats.wall_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        log::debug!(
            "Frame {}: {} substeps, {} CG iterations (max residual {:.2e}, {} unconverged), {} removed, {} particles (max speed {:.3}), {:.1} ms",
            stats.frame,
            stats.substeps,
            stats.cg_iterations,
            stats.max_residual,
            stats.unconverged_solves,
            stats.removed_particles,
            stats.particle_count,
            stats.max_particle_speed,
            stats.wall_time_ms
        );

        stats
    }

    /// Advance the simulation by `dt` (assumed CFL-stable).
    pub fn step(&mut self, dt: f32) -> StepStats {
        // 1. Advect particles through the previous velocity field
        let substeps = self.config.advection_substeps;
        let sub_dt = dt / substeps as f32;
        for _ in 0..substeps {
            transfer::move_particles_in_grid(&mut self.particles, &self.grid, sub_dt);
        }

        // 2-4. Rebuild the grid from particles
        self.grid.zero();
        self.grid.classify_voxel();
        let removed_particles = transfer::transfer_to_grid(&mut self.particles, &mut self.grid);

        // 5. Keep the pre-force velocities for the FLIP delta
        self.grid.save_velocities();

        // 6-7. External forces and walls
        self.grid.add_gravity(dt);
        self.grid.apply_boundary_conditions();

        // 8-9. Pressure solve
        self.grid.form_poisson(dt);
        self.grid.calc_divergence();
        let (max_iterations, tolerance) = (self.config.cg_max_iterations, self.config.cg_tolerance);
        let solve = if self.config.preconditioned {
            self.grid.form_precond();
            self.grid.solve_pressure_preconditioned(max_iterations, tolerance)
        } else {
            self.grid.solve_pressure(max_iterations, tolerance)
        };
        if !solve.converged {
            log::debug!(
                "Pressure solve hit {} iterations, residual {:.3e}",
                solve.iterations,
                solve.residual
            );
        }

        // 10-11. Make the field divergence-free, then re-apply walls
        self.grid.project(dt);
        self.grid.apply_boundary_conditions();

        // 12-13. Blend the grid result back into particles
        self.grid.get_velocity_update();
        transfer::update_from_grid(&mut self.particles, &self.grid, self.config.alpha);

        self.time += dt as f64;

        log::trace!(
            "Step dt={:.5}: {} CG iterations, {} fluid cells, {} removed",
            dt,
            solve.iterations,
            self.grid.fluid_cell_count(),
            removed_particles
        );

        StepStats {
            removed_particles,
            solve,
        }
    }

    // ========== Renderer accessors ==========

    pub fn positions(&self) -> &[Vec3] {
        &self.particles.pos
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.particles.vel
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Voxel classification as AIR=0, FLUID=1, SOLID=2.
    pub fn voxel_flags(&self) -> Vec<u8> {
        self.grid.voxel_flags()
    }

    /// Read-only view of the current state.
    pub fn snapshot(&self) -> FrameSnapshot<'_> {
        FrameSnapshot {
            frame: self.frame,
            time: self.time,
            dims: [self.grid.nx, self.grid.ny, self.grid.nz],
            cell_size: self.grid.h,
            positions: &self.particles.pos,
            velocities: &self.particles.vel,
            voxel_flags: self.grid.voxel_flags(),
        }
    }

    /// Frames completed since the last reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds since the last reset.
    pub fn time(&self) -> f64 {
        self.time
    }
}
