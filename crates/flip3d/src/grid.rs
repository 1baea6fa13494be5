//! 3D MAC (Marker-and-Cell) staggered grid for incompressible free-surface flow.
//!
//! Velocity components are stored on cell faces:
//! - u (X-velocity) on YZ faces at x = i * h, size (nx+1) x ny x nz
//! - v (Y-velocity) on XZ faces at y = j * h, size nx x (ny+1) x nz
//! - w (Z-velocity) on XY faces at z = k * h, size nx x ny x (nz+1)
//!
//! Pressure, divergence and the voxel marker live at cell centers. The
//! one-cell shell around the domain is always [`CellType::Solid`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::array3::{Array3f, MarkerField};
use crate::cg::{build_mic0, ConjugateGradientSolver, SolveStats};
use crate::sparse::{SparseMatrix, Stencil, VectorN};

/// Cell classification for the pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CellType {
    /// Empty air (free surface, zero pressure)
    #[default]
    Air = 0,
    /// Contains at least one particle
    Fluid = 1,
    /// Wall (no flow)
    Solid = 2,
}

impl CellType {
    /// Small-integer encoding used by voxel debug views.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Staggered MAC grid with its pressure system.
#[derive(Clone, Debug)]
pub struct Grid {
    /// Number of cells in X direction
    pub nx: usize,
    /// Number of cells in Y direction
    pub ny: usize,
    /// Number of cells in Z direction
    pub nz: usize,
    /// Cell size in world units
    pub h: f32,
    /// Gravity magnitude, acting along -Y
    pub gravity: f32,
    /// Fluid density
    pub rho: f32,

    /// X velocity on YZ faces
    pub u: Array3f,
    /// Y velocity on XZ faces
    pub v: Array3f,
    /// Z velocity on XY faces
    pub w: Array3f,

    /// Pre-projection snapshot of u, turned into the FLIP delta after projection
    pub du: Array3f,
    /// Pre-projection snapshot of v
    pub dv: Array3f,
    /// Pre-projection snapshot of w
    pub dw: Array3f,

    /// Voxel classification
    pub marker: MarkerField,

    /// Poisson matrix for the pressure stage
    pub poisson: SparseMatrix,
    /// MIC(0) preconditioner (inverse pivots in the diagonal slot)
    pub precond: SparseMatrix,
    /// Right-hand side: negative velocity divergence
    pub rhs: VectorN,
    /// Pressure at cell centers
    pub pressure: VectorN,

    cg: ConjugateGradientSolver,
}

impl Grid {
    /// Create a grid of `nx * ny * nz` cells.
    ///
    /// Every axis needs at least 3 cells: the solid shell plus one interior cell.
    ///
    /// # Panics
    ///
    /// Panics if `h` or `rho` is not positive or any axis has fewer than 3
    /// cells. [`SimConfig::validate`](crate::SimConfig::validate) reports the
    /// same conditions as a [`ConfigError`](crate::ConfigError).
    pub fn new(nx: usize, ny: usize, nz: usize, h: f32, gravity: f32, rho: f32) -> Self {
        assert!(h > 0.0, "cell size must be positive, got {}", h);
        assert!(rho > 0.0, "density must be positive, got {}", rho);
        assert!(
            nx >= 3 && ny >= 3 && nz >= 3,
            "grid needs at least 3 cells per axis, got {}x{}x{}",
            nx,
            ny,
            nz
        );

        let mut grid = Self {
            nx,
            ny,
            nz,
            h,
            gravity,
            rho,
            u: Array3f::new(nx + 1, ny, nz),
            v: Array3f::new(nx, ny + 1, nz),
            w: Array3f::new(nx, ny, nz + 1),
            du: Array3f::new(nx + 1, ny, nz),
            dv: Array3f::new(nx, ny + 1, nz),
            dw: Array3f::new(nx, ny, nz + 1),
            marker: MarkerField::new(nx, ny, nz),
            poisson: SparseMatrix::new(nx, ny, nz),
            precond: SparseMatrix::new(nx, ny, nz),
            rhs: VectorN::new(nx, ny, nz),
            pressure: VectorN::new(nx, ny, nz),
            cg: ConjugateGradientSolver::new(nx, ny, nz),
        };
        grid.classify_voxel();
        grid
    }

    /// World-space extent of the domain.
    pub fn domain_size(&self) -> Vec3 {
        Vec3::new(
            self.nx as f32 * self.h,
            self.ny as f32 * self.h,
            self.nz as f32 * self.h,
        )
    }

    /// World position of the center of cell `(i, j, k)`.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(
            (i as f32 + 0.5) * self.h,
            (j as f32 + 0.5) * self.h,
            (k as f32 + 0.5) * self.h,
        )
    }

    #[inline]
    fn is_shell(&self, i: usize, j: usize, k: usize) -> bool {
        i == 0 || j == 0 || k == 0 || i == self.nx - 1 || j == self.ny - 1 || k == self.nz - 1
    }

    // ========== Stage operations ==========

    /// Zero the face velocities.
    pub fn zero(&mut self) {
        self.u.zero();
        self.v.zero();
        self.w.zero();
    }

    /// Reset markers: SOLID on the outer shell, AIR everywhere else.
    ///
    /// FLUID is assigned later, by the particle-to-grid transfer.
    pub fn classify_voxel(&mut self) {
        for k in 0..self.nz {
            for j in 0..self.ny {
                for i in 0..self.nx {
                    self.marker[(i, j, k)] = if self.is_shell(i, j, k) {
                        CellType::Solid
                    } else {
                        CellType::Air
                    };
                }
            }
        }
    }

    /// Snapshot u, v, w into du, dv, dw before forces and projection.
    pub fn save_velocities(&mut self) {
        self.du.copy_from(&self.u);
        self.dv.copy_from(&self.v);
        self.dw.copy_from(&self.w);
    }

    /// Turn the snapshot into the change produced by this step: `du = u - du`.
    pub fn get_velocity_update(&mut self) {
        delta_in_place(&mut self.du, &self.u);
        delta_in_place(&mut self.dv, &self.v);
        delta_in_place(&mut self.dw, &self.w);
    }

    /// Apply gravity to every vertical face velocity.
    pub fn add_gravity(&mut self, dt: f32) {
        let dv = self.gravity * dt;
        for v in self.v.as_mut_slice() {
            *v -= dv;
        }
    }

    /// Zero the normal velocity on every domain wall and every face that
    /// touches a SOLID cell.
    pub fn apply_boundary_conditions(&mut self) {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..=nx {
                    if i == 0
                        || i == nx
                        || self.marker[(i - 1, j, k)] == CellType::Solid
                        || self.marker[(i, j, k)] == CellType::Solid
                    {
                        self.u[(i, j, k)] = 0.0;
                    }
                }
            }
        }

        for k in 0..nz {
            for j in 0..=ny {
                for i in 0..nx {
                    if j == 0
                        || j == ny
                        || self.marker[(i, j - 1, k)] == CellType::Solid
                        || self.marker[(i, j, k)] == CellType::Solid
                    {
                        self.v[(i, j, k)] = 0.0;
                    }
                }
            }
        }

        for k in 0..=nz {
            for j in 0..ny {
                for i in 0..nx {
                    if k == 0
                        || k == nz
                        || self.marker[(i, j, k - 1)] == CellType::Solid
                        || self.marker[(i, j, k)] == CellType::Solid
                    {
                        self.w[(i, j, k)] = 0.0;
                    }
                }
            }
        }
    }

    /// Largest stable advection step for the current velocity field.
    ///
    /// `h / (|u|max + sqrt(5 h g))`: the gravity term keeps the step bounded
    /// while the fluid is at rest and accounts for the speed gravity adds
    /// during the step.
    ///
    /// The speed norm is taken in f64 so large finite velocities cannot
    /// overflow; only infinite samples are ignored.
    pub fn cfl(&self) -> f32 {
        let max_u = self.u.max_abs() as f64;
        let max_v = self.v.max_abs() as f64;
        let max_w = self.w.max_abs() as f64;
        let mut speed = (max_u * max_u + max_v * max_v + max_w * max_w).sqrt();
        if !speed.is_finite() {
            log::warn!("CFL: non-finite grid velocity, ignoring it for the step size");
            speed = 0.0;
        }
        let h = self.h as f64;
        let margin = (5.0 * h * self.gravity.abs() as f64).sqrt();
        let denom = speed + margin;
        if denom > 0.0 {
            (h / denom) as f32
        } else {
            f32::INFINITY
        }
    }

    // ========== Pressure ==========

    /// Assemble the Poisson matrix for the FLUID cells.
    ///
    /// Each non-SOLID neighbor adds `dt / (rho h^2)` to the diagonal. FLUID
    /// neighbors in the positive directions also get the off-diagonal
    /// coupling; AIR neighbors (zero pressure) only touch the diagonal.
    pub fn form_poisson(&mut self, dt: f32) {
        let scale = dt as f64 / (self.rho as f64 * self.h as f64 * self.h as f64);
        self.poisson.zero();

        for k in 1..self.nz - 1 {
            for j in 1..self.ny - 1 {
                for i in 1..self.nx - 1 {
                    if self.marker[(i, j, k)] != CellType::Fluid {
                        continue;
                    }

                    let neighbors = [
                        (i - 1, j, k),
                        (i + 1, j, k),
                        (i, j - 1, k),
                        (i, j + 1, k),
                        (i, j, k - 1),
                        (i, j, k + 1),
                    ];
                    for n in neighbors {
                        if self.marker[n] != CellType::Solid {
                            self.poisson.add(i, j, k, Stencil::Diag, scale);
                        }
                    }

                    if self.marker[(i + 1, j, k)] == CellType::Fluid {
                        self.poisson.set(i, j, k, Stencil::PlusX, -scale);
                    }
                    if self.marker[(i, j + 1, k)] == CellType::Fluid {
                        self.poisson.set(i, j, k, Stencil::PlusY, -scale);
                    }
                    if self.marker[(i, j, k + 1)] == CellType::Fluid {
                        self.poisson.set(i, j, k, Stencil::PlusZ, -scale);
                    }
                }
            }
        }
    }

    /// Build the MIC(0) preconditioner for the current Poisson matrix.
    pub fn form_precond(&mut self) {
        build_mic0(&self.poisson, &mut self.precond, &self.marker);
    }

    /// Discrete divergence of cell `(i, j, k)`.
    #[inline]
    fn divergence_at(&self, i: usize, j: usize, k: usize) -> f32 {
        let du = self.u[(i + 1, j, k)] - self.u[(i, j, k)];
        let dv = self.v[(i, j + 1, k)] - self.v[(i, j, k)];
        let dw = self.w[(i, j, k + 1)] - self.w[(i, j, k)];
        (du + dv + dw) / self.h
    }

    /// rhs = -div(u) on FLUID cells, zero elsewhere.
    pub fn calc_divergence(&mut self) {
        self.rhs.zero();
        for k in 1..self.nz - 1 {
            for j in 1..self.ny - 1 {
                for i in 1..self.nx - 1 {
                    if self.marker[(i, j, k)] == CellType::Fluid {
                        self.rhs[(i, j, k)] = -(self.divergence_at(i, j, k) as f64);
                    }
                }
            }
        }
    }

    /// Solve the pressure system with plain CG.
    pub fn solve_pressure(&mut self, max_iterations: usize, tolerance: f64) -> SolveStats {
        self.cg.solve(
            &self.poisson,
            &self.rhs,
            max_iterations,
            tolerance,
            &mut self.pressure,
            &self.marker,
        )
    }

    /// Solve the pressure system with MIC(0)-preconditioned CG.
    ///
    /// [`Grid::form_precond`] must have been called after [`Grid::form_poisson`].
    pub fn solve_pressure_preconditioned(
        &mut self,
        max_iterations: usize,
        tolerance: f64,
    ) -> SolveStats {
        self.cg.solve_preconditioned(
            &self.poisson,
            &self.rhs,
            &self.precond,
            max_iterations,
            tolerance,
            &mut self.pressure,
            &self.marker,
        )
    }

    /// Subtract the scaled pressure gradient from face velocities.
    ///
    /// Faces with a FLUID side are updated, faces touching exactly one SOLID
    /// cell are forced to zero, and SOLID|SOLID or AIR|AIR faces are left as is.
    pub fn project(&mut self, dt: f32) {
        let scale = dt as f64 / (self.rho as f64 * self.h as f64);
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);

        // U faces between (i-1, j, k) and (i, j, k)
        for k in 0..nz {
            for j in 0..ny {
                for i in 1..nx {
                    let a = (i - 1, j, k);
                    let b = (i, j, k);
                    if let Some(grad) = self.face_gradient(a, b, scale) {
                        self.u[(i, j, k)] -= grad;
                    } else if self.touches_one_solid(a, b) {
                        self.u[(i, j, k)] = 0.0;
                    }
                }
            }
        }

        // V faces between (i, j-1, k) and (i, j, k)
        for k in 0..nz {
            for j in 1..ny {
                for i in 0..nx {
                    let a = (i, j - 1, k);
                    let b = (i, j, k);
                    if let Some(grad) = self.face_gradient(a, b, scale) {
                        self.v[(i, j, k)] -= grad;
                    } else if self.touches_one_solid(a, b) {
                        self.v[(i, j, k)] = 0.0;
                    }
                }
            }
        }

        // W faces between (i, j, k-1) and (i, j, k)
        for k in 1..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let a = (i, j, k - 1);
                    let b = (i, j, k);
                    if let Some(grad) = self.face_gradient(a, b, scale) {
                        self.w[(i, j, k)] -= grad;
                    } else if self.touches_one_solid(a, b) {
                        self.w[(i, j, k)] = 0.0;
                    }
                }
            }
        }
    }

    /// Scaled pressure difference across the face between `a` and `b`, or
    /// `None` if the face has a SOLID side or no FLUID side.
    #[inline]
    fn face_gradient(
        &self,
        a: (usize, usize, usize),
        b: (usize, usize, usize),
        scale: f64,
    ) -> Option<f32> {
        let (ta, tb) = (self.marker[a], self.marker[b]);
        if ta == CellType::Solid || tb == CellType::Solid {
            return None;
        }
        if ta != CellType::Fluid && tb != CellType::Fluid {
            return None;
        }
        Some((scale * (self.pressure[b] - self.pressure[a])) as f32)
    }

    #[inline]
    fn touches_one_solid(&self, a: (usize, usize, usize), b: (usize, usize, usize)) -> bool {
        (self.marker[a] == CellType::Solid) != (self.marker[b] == CellType::Solid)
    }

    // ========== Sampling ==========

    /// Staggered-face coordinate along X: `(i, fx)` with `x = (i + fx) * h`.
    #[inline]
    pub fn bary_x(&self, x: f32) -> (usize, f32) {
        bary(x / self.h, self.nx + 1)
    }

    /// Cell-centre coordinate along X: `(i, fx)` with `x = (i + 0.5 + fx) * h`.
    #[inline]
    pub fn bary_x_centre(&self, x: f32) -> (usize, f32) {
        bary(x / self.h - 0.5, self.nx)
    }

    #[inline]
    pub fn bary_y(&self, y: f32) -> (usize, f32) {
        bary(y / self.h, self.ny + 1)
    }

    #[inline]
    pub fn bary_y_centre(&self, y: f32) -> (usize, f32) {
        bary(y / self.h - 0.5, self.ny)
    }

    #[inline]
    pub fn bary_z(&self, z: f32) -> (usize, f32) {
        bary(z / self.h, self.nz + 1)
    }

    #[inline]
    pub fn bary_z_centre(&self, z: f32) -> (usize, f32) {
        bary(z / self.h - 0.5, self.nz)
    }

    /// Cell containing `pos`, or `None` outside the domain.
    pub fn cell_of(&self, pos: Vec3) -> Option<(usize, usize, usize)> {
        if !pos.is_finite() {
            return None;
        }
        let c = (pos / self.h).floor();
        if c.x < 0.0 || c.y < 0.0 || c.z < 0.0 {
            return None;
        }
        let (i, j, k) = (c.x as usize, c.y as usize, c.z as usize);
        if i < self.nx && j < self.ny && k < self.nz {
            Some((i, j, k))
        } else {
            None
        }
    }

    /// Marker of the cell containing `pos`. Positions outside the domain
    /// report [`CellType::Solid`].
    pub fn marker_at(&self, pos: Vec3) -> CellType {
        match self.cell_of(pos) {
            Some(c) => self.marker[c],
            None => CellType::Solid,
        }
    }

    /// Trilinearly interpolated velocity at `pos`.
    pub fn velocity_at(&self, pos: Vec3) -> Vec3 {
        self.sample_staggered(&self.u, &self.v, &self.w, pos)
    }

    /// Trilinearly interpolated FLIP delta (du, dv, dw) at `pos`.
    pub fn velocity_delta_at(&self, pos: Vec3) -> Vec3 {
        self.sample_staggered(&self.du, &self.dv, &self.dw, pos)
    }

    fn sample_staggered(&self, u: &Array3f, v: &Array3f, w: &Array3f, pos: Vec3) -> Vec3 {
        let (ui, ufx) = self.bary_x(pos.x);
        let (i, fx) = self.bary_x_centre(pos.x);
        let (vj, vfy) = self.bary_y(pos.y);
        let (j, fy) = self.bary_y_centre(pos.y);
        let (wk, wfz) = self.bary_z(pos.z);
        let (k, fz) = self.bary_z_centre(pos.z);

        Vec3::new(
            u.trilerp(ui, j, k, ufx, fy, fz),
            v.trilerp(i, vj, k, fx, vfy, fz),
            w.trilerp(i, j, wk, fx, fy, wfz),
        )
    }

    // ========== Diagnostics ==========

    /// Largest |divergence| over FLUID cells.
    pub fn max_divergence(&self) -> f32 {
        let mut max = 0.0f32;
        for k in 1..self.nz - 1 {
            for j in 1..self.ny - 1 {
                for i in 1..self.nx - 1 {
                    if self.marker[(i, j, k)] == CellType::Fluid {
                        max = max.max(self.divergence_at(i, j, k).abs());
                    }
                }
            }
        }
        max
    }

    pub fn fluid_cell_count(&self) -> usize {
        self.marker.iter().filter(|&&c| c == CellType::Fluid).count()
    }

    /// Per-voxel classification as small integers (AIR=0, FLUID=1, SOLID=2).
    pub fn voxel_flags(&self) -> Vec<u8> {
        self.marker.iter().map(|c| c.as_u8()).collect()
    }
}

/// `(index, fraction)` for sampling an axis with `n` samples at coordinate `s`
/// (in sample units). The index is clamped so `index + 1 < n` and the
/// fraction lies in `[0, 1]`.
#[inline]
fn bary(s: f32, n: usize) -> (usize, f32) {
    let max_base = n.saturating_sub(2);
    if !(s > 0.0) {
        return (0, 0.0);
    }
    let base = s.floor();
    if base >= max_base as f32 + 1.0 || n < 2 {
        return (max_base, if n < 2 { 0.0 } else { 1.0 });
    }
    let i = base as usize;
    (i, s - base)
}

fn delta_in_place(saved: &mut Array3f, current: &Array3f) {
    for (d, c) in saved.as_mut_slice().iter_mut().zip(current.as_slice()) {
        *d = *c - *d;
    }
}
