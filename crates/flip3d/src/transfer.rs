//! Particle-grid transfers and particle advection.
//!
//! P2G: scatter particle velocities onto the MAC faces with 8-corner
//! trilinear weights, then normalize by the accumulated weight.
//! G2P: blend the interpolated grid velocity (PIC) with the particle's own
//! velocity plus the interpolated grid change (FLIP).

use glam::Vec3;

use crate::array3::Array3f;
use crate::grid::{CellType, Grid};
use crate::particle::ParticleSet;

/// Grid velocity at `pos`, trilinear on the staggered faces.
#[inline]
pub fn sample_velocity(grid: &Grid, pos: Vec3) -> Vec3 {
    grid.velocity_at(pos)
}

/// Velocity change from the last pressure step at `pos`.
#[inline]
pub fn sample_delta(grid: &Grid, pos: Vec3) -> Vec3 {
    grid.velocity_delta_at(pos)
}

/// Advect particles one forward-Euler step through the grid velocity field.
///
/// Particles sitting in a SOLID cell are not advected. A move that would
/// leave the domain is discarded. A move that ends inside a SOLID cell is
/// corrected by [`push_out_offset`]; when every axis is blocked the particle
/// keeps its previous position.
pub fn move_particles_in_grid(particles: &mut ParticleSet, grid: &Grid, dt: f32) {
    for p in 0..particles.len() {
        let pos = particles.pos[p];

        match grid.cell_of(pos) {
            Some(cell) if grid.marker[cell] != CellType::Solid => {}
            _ => continue,
        }

        let vel = sample_velocity(grid, pos);
        let mut new_pos = pos + vel * dt;

        let Some((i, j, k)) = grid.cell_of(new_pos) else {
            continue;
        };

        if grid.marker[(i, j, k)] == CellType::Solid {
            match push_out_offset(grid, i, j, k) {
                Some(offset) => new_pos += offset * grid.h,
                None => new_pos = pos,
            }
        }

        particles.pos[p] = new_pos;
    }
}

/// Escape direction (in cells) for a particle that landed in SOLID cell `(i, j, k)`.
///
/// Each axis is resolved independently: the positive neighbor is preferred,
/// then the negative one, and an axis with both neighbors SOLID contributes
/// nothing. The per-axis unit steps are summed. Returns `None` when all
/// three axes are blocked. Neighbors outside the domain count as SOLID.
pub fn push_out_offset(grid: &Grid, i: usize, j: usize, k: usize) -> Option<Vec3> {
    let (i, j, k) = (i as i32, j as i32, k as i32);
    let open = |a: i32, b: i32, c: i32| {
        matches!(grid.marker.get_signed(a, b, c), Some(t) if *t != CellType::Solid)
    };

    let axis = |plus: bool, minus: bool| -> Option<f32> {
        if plus {
            Some(1.0)
        } else if minus {
            Some(-1.0)
        } else {
            None
        }
    };

    let x = axis(open(i + 1, j, k), open(i - 1, j, k));
    let y = axis(open(i, j + 1, k), open(i, j - 1, k));
    let z = axis(open(i, j, k + 1), open(i, j, k - 1));

    if x.is_none() && y.is_none() && z.is_none() {
        return None;
    }
    Some(Vec3::new(
        x.unwrap_or(0.0),
        y.unwrap_or(0.0),
        z.unwrap_or(0.0),
    ))
}

/// Scatter `value` onto the 8 samples around `(i, j, k)` with trilinear
/// weights, accumulating the weights alongside.
#[allow(clippy::too_many_arguments)]
pub fn accumulate(
    field: &mut Array3f,
    weights: &mut Array3f,
    value: f32,
    i: usize,
    j: usize,
    k: usize,
    fx: f32,
    fy: f32,
    fz: f32,
) {
    for dk in 0..2 {
        let wz = if dk == 0 { 1.0 - fz } else { fz };
        for dj in 0..2 {
            let wy = if dj == 0 { 1.0 - fy } else { fy };
            for di in 0..2 {
                let wx = if di == 0 { 1.0 - fx } else { fx };
                let weight = wx * wy * wz;
                let node = (i + di, j + dj, k + dk);
                if let (Some(f), Some(s)) = (
                    field.get_mut(node.0, node.1, node.2),
                    weights.get_mut(node.0, node.1, node.2),
                ) {
                    *f += weight * value;
                    *s += weight;
                }
            }
        }
    }
}

/// Transfer particle velocities to the grid (P2G).
///
/// Expects zeroed grid velocities and freshly classified markers. Cells that
/// receive a particle become FLUID. Particles in a SOLID cell or outside the
/// domain are removed. Returns the number of removed particles.
pub fn transfer_to_grid(particles: &mut ParticleSet, grid: &mut Grid) -> usize {
    particles.clear_weights();

    let mut doomed = Vec::new();

    for p in 0..particles.len() {
        let pos = particles.pos[p];
        let vel = particles.vel[p];

        let cell = match grid.cell_of(pos) {
            Some(cell) if grid.marker[cell] != CellType::Solid => cell,
            _ => {
                doomed.push(p);
                continue;
            }
        };
        grid.marker[cell] = CellType::Fluid;

        let (ui, ufx) = grid.bary_x(pos.x);
        let (i, fx) = grid.bary_x_centre(pos.x);
        let (vj, vfy) = grid.bary_y(pos.y);
        let (j, fy) = grid.bary_y_centre(pos.y);
        let (wk, wfz) = grid.bary_z(pos.z);
        let (k, fz) = grid.bary_z_centre(pos.z);

        accumulate(&mut grid.u, &mut particles.weight_u, vel.x, ui, j, k, ufx, fy, fz);
        accumulate(&mut grid.v, &mut particles.weight_v, vel.y, i, vj, k, fx, vfy, fz);
        accumulate(&mut grid.w, &mut particles.weight_w, vel.z, i, j, wk, fx, fy, wfz);
    }

    let removed = doomed.len();
    particles.remove_many(&mut doomed);

    normalize(&mut grid.u, &particles.weight_u);
    normalize(&mut grid.v, &particles.weight_v);
    normalize(&mut grid.w, &particles.weight_w);

    removed
}

/// velocity = momentum / weight; samples with no weight are set to zero.
fn normalize(field: &mut Array3f, weights: &Array3f) {
    for (f, &w) in field.as_mut_slice().iter_mut().zip(weights.as_slice()) {
        *f = if w > 0.0 { *f / w } else { 0.0 };
    }
}

/// Transfer grid velocities back to particles (G2P) with PIC/FLIP blending.
///
/// `v' = alpha * v_grid + (1 - alpha) * (v + dv_grid)`, where `dv_grid` is
/// the velocity change recorded by [`Grid::get_velocity_update`].
pub fn update_from_grid(particles: &mut ParticleSet, grid: &Grid, alpha: f32) {
    for (pos, vel) in particles.pos.iter().zip(particles.vel.iter_mut()) {
        let pic = sample_velocity(grid, *pos);
        let flip = *vel + sample_delta(grid, *pos);
        *vel = alpha * pic + (1.0 - alpha) * flip;
    }
}
