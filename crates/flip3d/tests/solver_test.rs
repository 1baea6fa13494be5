//! End-to-end solver tests
//!
//! Full frames through `FluidSolver`: free fall, particle bookkeeping and
//! seeded reproducibility.

use flip3d::{CellType, FluidSolver, SeedRegion, SimConfig, Vec3};

fn empty_tank(nx: usize, ny: usize, nz: usize, h: f32, timestep: f32) -> FluidSolver {
    let mut config = SimConfig::with_dims(nx, ny, nz);
    config.h = h;
    config.timestep = timestep;
    config.max_particles = 1_000;
    config.seed = Some(0);
    config.seed_regions = Some(Vec::new());
    FluidSolver::new(config).unwrap()
}

fn dam_break(seed: u64) -> FluidSolver {
    let mut config = SimConfig::with_dims(14, 14, 14);
    config.h = 0.1;
    config.max_particles = 20_000;
    config.seed_regions = Some(vec![SeedRegion::new([1, 1, 1], [6, 8, 6])]);
    FluidSolver::with_seed(config, seed).unwrap()
}

/// A lone particle falls like a ballistic body: drop ~= g t^2 / 2
#[test]
fn test_single_particle_free_fall() {
    let timestep = 1.0 / 120.0;
    let mut solver = empty_tank(8, 16, 8, 0.1, timestep);
    let start = Vec3::new(0.45, 1.25, 0.45);
    assert!(solver.add_particle(start, Vec3::ZERO));

    let frames = 36;
    for _ in 0..frames {
        let stats = solver.step_frame();
        assert_eq!(stats.removed_particles, 0);
    }

    let t = frames as f32 * timestep;
    let expected_drop = 0.5 * 9.82 * t * t;
    let p = solver.positions()[0];
    let drop = start.y - p.y;
    assert!(
        (drop - expected_drop).abs() < 0.2 * expected_drop,
        "dropped {} m, expected about {} m",
        drop,
        expected_drop
    );
    assert!((p.x - start.x).abs() < 1e-4 && (p.z - start.z).abs() < 1e-4);

    let v = solver.velocities()[0];
    assert!((v.y + 9.82 * t).abs() < 0.1 * 9.82 * t, "vy = {}", v.y);
}

/// Particles are only ever removed between resets
#[test]
fn test_particle_count_never_increases() {
    let mut solver = dam_break(3);
    let mut count = solver.particle_count();
    assert_eq!(count, 5 * 7 * 5 * 8);

    for _ in 0..8 {
        let stats = solver.step_frame();
        assert!(solver.particle_count() <= count);
        assert_eq!(count - solver.particle_count(), stats.removed_particles);
        count = solver.particle_count();
    }
}

/// After a step every particle sits in a FLUID cell inside the domain
#[test]
fn test_particles_stay_in_fluid_cells() {
    let mut solver = dam_break(5);
    let size = solver.grid.domain_size();

    for _ in 0..5 {
        solver.step_frame();
        for p in solver.positions() {
            assert!(p.is_finite());
            assert!(p.cmpge(Vec3::ZERO).all() && p.cmplt(size).all(), "{:?}", p);
            assert_eq!(solver.grid.marker_at(*p), CellType::Fluid);
        }
    }
}

/// The column collapses: the fluid's centre of mass moves down
#[test]
fn test_dam_break_settles_downward() {
    let mut solver = dam_break(9);
    let mean_y = |s: &FluidSolver| {
        s.positions().iter().map(|p| p.y).sum::<f32>() / s.particle_count() as f32
    };
    let before = mean_y(&solver);
    for _ in 0..6 {
        solver.step_frame();
    }
    assert!(mean_y(&solver) < before);
}

/// Same seed, same history
#[test]
fn test_seeded_runs_are_reproducible() {
    let mut a = dam_break(42);
    let mut b = dam_break(42);
    assert_eq!(a.positions(), b.positions());

    for _ in 0..3 {
        a.step_frame();
        b.step_frame();
    }
    assert_eq!(a.positions(), b.positions());
    assert_eq!(a.velocities(), b.velocities());
}

/// Different seeds jitter the initial particles differently
#[test]
fn test_different_seeds_differ() {
    let a = dam_break(1);
    let b = dam_break(2);
    assert_eq!(a.particle_count(), b.particle_count());
    assert_ne!(a.positions(), b.positions());
}

/// Reset returns to the seeded layout and clears the clock
#[test]
fn test_reset_replays_initial_layout() {
    let mut solver = dam_break(17);
    let initial = solver.positions().to_vec();
    for _ in 0..2 {
        solver.step_frame();
    }
    assert_eq!(solver.frame(), 2);

    solver.reset();
    assert_eq!(solver.frame(), 0);
    assert_eq!(solver.time(), 0.0);
    assert_eq!(solver.positions(), initial.as_slice());
}

/// Snapshot flags mark the particles' cells FLUID and the shell SOLID
#[test]
fn test_snapshot_voxel_flags() {
    let mut solver = dam_break(4);
    solver.step_frame();
    let snap = solver.snapshot();
    let [nx, ny, _] = snap.dims;

    assert_eq!(snap.frame, 1);
    assert_eq!(snap.particle_count(), solver.particle_count());
    let idx = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
    assert_eq!(snap.voxel_flags[idx(0, 5, 5)], 2);
    let fluid = snap.voxel_flags.iter().filter(|&&f| f == 1).count();
    assert_eq!(fluid, solver.grid.fluid_cell_count());
    assert!(fluid > 0);
}

/// Small cells force several CFL-limited substeps per frame, none of them
/// longer than the limit, and together they cover exactly one timestep
#[test]
fn test_step_frame_splits_into_cfl_substeps() {
    let timestep = 1.0 / 30.0;
    let mut config = SimConfig::with_dims(14, 14, 14);
    config.h = 0.02;
    config.timestep = timestep;
    config.max_particles = 20_000;
    config.seed_regions = Some(vec![SeedRegion::new([1, 1, 1], [6, 8, 6])]);
    let mut solver = FluidSolver::with_seed(config, 8).unwrap();

    // At rest only the gravity term limits the step.
    let rest_cfl = solver.grid.cfl();
    assert!(rest_cfl < timestep, "cfl {} >= timestep", rest_cfl);

    for frame in 1..=4 {
        let stats = solver.step_frame();
        assert!(stats.substeps > 1, "frame {}: {} substeps", frame, stats.substeps);
        assert!(stats.max_cfl_fraction > 0.0);
        assert!(
            stats.max_cfl_fraction <= 1.0,
            "frame {}: dt exceeded cfl by {}",
            frame,
            stats.max_cfl_fraction
        );
        assert!(
            (stats.simulated_time - timestep as f64).abs() <= timestep as f64 * 1e-9,
            "frame {}: simulated {}",
            frame,
            stats.simulated_time
        );
        assert!(stats.max_particle_speed > 0.0);
    }
    assert!((solver.time() - 4.0 * timestep as f64).abs() < 1e-6);
}
