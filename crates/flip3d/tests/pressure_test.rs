//! Pressure projection tests
//!
//! Poisson assembly, CG solve and gradient subtraction on small grids where
//! the answer is known.

use flip3d::{CellType, Grid, Stencil, VectorN};

fn mark_block(grid: &mut Grid, lo: (usize, usize, usize), hi: (usize, usize, usize)) {
    for k in lo.2..hi.2 {
        for j in lo.1..hi.1 {
            for i in lo.0..hi.0 {
                grid.marker[(i, j, k)] = CellType::Fluid;
            }
        }
    }
}

/// Fill u, v, w with a smooth, non-divergence-free pattern.
fn swirl(grid: &mut Grid) {
    let (ux, uy, uz) = grid.u.dims();
    for k in 0..uz {
        for j in 0..uy {
            for i in 0..ux {
                grid.u[(i, j, k)] = (0.7 * i as f32 + 0.3 * j as f32).sin() + 0.2 * k as f32;
            }
        }
    }
    let (vx, vy, vz) = grid.v.dims();
    for k in 0..vz {
        for j in 0..vy {
            for i in 0..vx {
                grid.v[(i, j, k)] = -1.0 + 0.1 * (i as f32 - k as f32) * j as f32;
            }
        }
    }
    let (wx, wy, wz) = grid.w.dims();
    for k in 0..wz {
        for j in 0..wy {
            for i in 0..wx {
                grid.w[(i, j, k)] = (0.5 * k as f32).cos() * 0.5;
            }
        }
    }
}

/// After projection the interior fluid is divergence-free
#[test]
fn test_projection_removes_divergence() {
    let dt = 0.05;
    let mut grid = Grid::new(10, 10, 10, 0.5, 9.82, 1.0);
    mark_block(&mut grid, (2, 1, 2), (8, 5, 8));
    swirl(&mut grid);
    grid.add_gravity(dt);
    grid.apply_boundary_conditions();

    grid.form_poisson(dt);
    grid.calc_divergence();
    let before = grid.max_divergence();
    assert!(before > 0.5, "test field should start divergent, got {}", before);

    let stats = grid.solve_pressure(500, 1e-9);
    assert!(stats.converged, "CG did not converge: {:?}", stats);

    grid.project(dt);
    let after = grid.max_divergence();
    assert!(after < 1e-4, "max divergence after projection: {}", after);
}

/// Same property with the MIC(0)-preconditioned solver
#[test]
fn test_preconditioned_projection_removes_divergence() {
    let dt = 0.05;
    let mut grid = Grid::new(10, 10, 10, 0.5, 9.82, 1.0);
    mark_block(&mut grid, (1, 1, 1), (9, 6, 9));
    swirl(&mut grid);
    grid.apply_boundary_conditions();

    grid.form_poisson(dt);
    grid.form_precond();
    grid.calc_divergence();
    let stats = grid.solve_pressure_preconditioned(500, 1e-9);
    assert!(stats.converged, "PCG did not converge: {:?}", stats);

    grid.project(dt);
    assert!(grid.max_divergence() < 1e-4);
}

/// One FLUID cell with one open (AIR) neighbor is a 1x1 system
#[test]
fn test_single_unknown_matches_dense_solve() {
    let (dt, h, rho) = (0.5f32, 0.5f32, 1.0f32);
    let mut grid = Grid::new(3, 3, 3, h, 9.82, rho);
    grid.marker[(1, 1, 1)] = CellType::Fluid;
    grid.marker[(1, 2, 1)] = CellType::Air;
    grid.v[(1, 2, 1)] = 0.3;

    grid.form_poisson(dt);
    grid.calc_divergence();

    let a = grid.poisson.get(1, 1, 1, Stencil::Diag);
    let expected_a = (dt / (rho * h * h)) as f64;
    assert!((a - expected_a).abs() < 1e-12);
    let b = grid.rhs[(1, 1, 1)];
    assert!((b - (-0.3 / 0.5)).abs() < 1e-6);

    let stats = grid.solve_pressure(100, 1e-12);
    assert_eq!(stats.iterations, 1);
    assert!(stats.converged);
    assert!((grid.pressure[(1, 1, 1)] - b / a).abs() < 1e-12);

    grid.project(dt);
    assert!(grid.v[(1, 2, 1)].abs() < 1e-6, "open face not corrected");
    assert!(grid.max_divergence() < 1e-6);
}

/// A FLUID cell walled in on all sides has nothing to solve
#[test]
fn test_enclosed_cell_needs_no_iterations() {
    let mut grid = Grid::new(3, 3, 3, 1.0, 9.82, 1.0);
    grid.marker[(1, 1, 1)] = CellType::Fluid;
    grid.u.fill(1.0);
    grid.v.fill(-2.0);
    grid.apply_boundary_conditions();

    grid.form_poisson(0.1);
    grid.calc_divergence();
    assert_eq!(grid.poisson.get(1, 1, 1, Stencil::Diag), 0.0);

    let stats = grid.solve_pressure(100, 1e-6);
    assert_eq!(stats.iterations, 0);
    assert!(stats.converged);
    assert_eq!(grid.pressure[(1, 1, 1)], 0.0);
}

/// (A e_i) . e_j == (A e_j) . e_i for every pair of adjacent FLUID cells
#[test]
fn test_poisson_matrix_is_symmetric() {
    let n = 7;
    let mut grid = Grid::new(n, n, n, 0.2, 9.82, 1.0);
    for k in 1..n - 1 {
        for j in 1..n - 1 {
            for i in 1..n - 1 {
                if (i * 7 + j * 3 + k * 5) % 4 != 0 {
                    grid.marker[(i, j, k)] = CellType::Fluid;
                }
            }
        }
    }
    grid.form_poisson(0.05);

    let mut e_a = VectorN::new(n, n, n);
    let mut e_b = VectorN::new(n, n, n);
    let mut a_ea = VectorN::new(n, n, n);
    let mut a_eb = VectorN::new(n, n, n);
    let mut pairs = 0;

    for k in 1..n - 1 {
        for j in 1..n - 1 {
            for i in 1..n - 1 {
                let a = (i, j, k);
                if grid.marker[a] != CellType::Fluid {
                    continue;
                }
                for b in [(i + 1, j, k), (i, j + 1, k), (i, j, k + 1)] {
                    if grid.marker[b] != CellType::Fluid {
                        continue;
                    }
                    e_a.zero();
                    e_b.zero();
                    e_a[a] = 1.0;
                    e_b[b] = 1.0;
                    grid.poisson.mul_vector(&e_a, &mut a_ea, &grid.marker);
                    grid.poisson.mul_vector(&e_b, &mut a_eb, &grid.marker);

                    assert_eq!(a_ea[b], a_eb[a], "asymmetric at {:?} / {:?}", a, b);
                    assert!(a_ea[b] < 0.0);
                    pairs += 1;
                }
            }
        }
    }
    assert!(pairs > 20, "pattern produced too few fluid pairs: {}", pairs);
}

/// Diagonal counts non-SOLID neighbors, AIR included
#[test]
fn test_diagonal_counts_open_neighbors() {
    let mut grid = Grid::new(5, 5, 5, 1.0, 9.82, 1.0);
    grid.marker[(2, 2, 2)] = CellType::Fluid;
    grid.marker[(1, 2, 2)] = CellType::Solid;
    grid.form_poisson(1.0);

    // 6 neighbors, one SOLID
    assert_eq!(grid.poisson.get(2, 2, 2, Stencil::Diag), 5.0);
    // AIR neighbors carry no coupling
    assert_eq!(grid.poisson.get(2, 2, 2, Stencil::PlusX), 0.0);
    assert_eq!(grid.poisson.get(2, 2, 2, Stencil::PlusY), 0.0);
}

/// Faces between two SOLID cells keep whatever they held
#[test]
fn test_projection_leaves_solid_solid_faces() {
    let mut grid = Grid::new(5, 5, 5, 1.0, 9.82, 1.0);
    mark_block(&mut grid, (1, 1, 1), (4, 3, 4));
    // Face between shell cells (0,2,2) and (0,3,2)
    grid.v[(0, 3, 2)] = 7.0;

    grid.form_poisson(0.1);
    grid.calc_divergence();
    grid.solve_pressure(100, 1e-8);
    grid.project(0.1);

    assert_eq!(grid.v[(0, 3, 2)], 7.0);
}
