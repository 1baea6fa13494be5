//! Particle storage for the PIC/FLIP solver.
//!
//! Positions and velocities are kept in two parallel vectors; the index of a
//! particle is its identity while it is alive. Removal swaps with the last
//! element, so order is not preserved.

use glam::Vec3;

use crate::array3::Array3f;
use crate::grid::Grid;

/// Particle positions/velocities plus the scatter weight accumulators.
#[derive(Clone, Debug)]
pub struct ParticleSet {
    /// World positions
    pub pos: Vec<Vec3>,
    /// Velocities
    pub vel: Vec<Vec3>,
    capacity: usize,

    /// Accumulated trilinear weights on u faces (transient, P2G only)
    pub weight_u: Array3f,
    /// Accumulated trilinear weights on v faces
    pub weight_v: Array3f,
    /// Accumulated trilinear weights on w faces
    pub weight_w: Array3f,
}

impl ParticleSet {
    /// Create an empty set that holds at most `capacity` particles, with
    /// weight accumulators sized for `grid`.
    pub fn new(capacity: usize, grid: &Grid) -> Self {
        let (ux, uy, uz) = grid.u.dims();
        let (vx, vy, vz) = grid.v.dims();
        let (wx, wy, wz) = grid.w.dims();
        Self {
            pos: Vec::with_capacity(capacity),
            vel: Vec::with_capacity(capacity),
            capacity,
            weight_u: Array3f::new(ux, uy, uz),
            weight_v: Array3f::new(vx, vy, vz),
            weight_w: Array3f::new(wx, wy, wz),
        }
    }

    /// Maximum number of live particles.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Add a particle. Returns `false` (and adds nothing) when full.
    pub fn add(&mut self, pos: Vec3, vel: Vec3) -> bool {
        if self.pos.len() >= self.capacity {
            return false;
        }
        self.pos.push(pos);
        self.vel.push(vel);
        true
    }

    /// Remove particle `i` by swapping the last particle into its slot.
    pub fn remove(&mut self, i: usize) {
        self.pos.swap_remove(i);
        self.vel.swap_remove(i);
    }

    /// Remove every particle in `indices`.
    ///
    /// Indices are processed from highest to lowest so that a swap never
    /// moves a particle that is still queued into an already-handled slot.
    pub fn remove_many(&mut self, indices: &mut Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        for &i in indices.iter().rev() {
            if i < self.len() {
                self.remove(i);
            }
        }
    }

    /// Remove all particles.
    pub fn clear(&mut self) {
        self.pos.clear();
        self.vel.clear();
    }

    /// Reset the scatter weight accumulators.
    pub fn clear_weights(&mut self) {
        self.weight_u.zero();
        self.weight_v.zero();
        self.weight_w.zero();
    }

    /// Largest particle speed.
    pub fn max_speed(&self) -> f32 {
        self.vel.iter().map(|v| v.length()).fold(0.0f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(4, 5, 6, 1.0, 9.8, 1.0)
    }

    #[test]
    fn test_weight_fields_match_staggered_sizes() {
        let g = grid();
        let p = ParticleSet::new(10, &g);
        assert_eq!(p.weight_u.dims(), g.u.dims());
        assert_eq!(p.weight_v.dims(), g.v.dims());
        assert_eq!(p.weight_w.dims(), g.w.dims());
    }

    #[test]
    fn test_add_respects_capacity() {
        let g = grid();
        let mut p = ParticleSet::new(2, &g);
        assert!(p.add(Vec3::ONE, Vec3::ZERO));
        assert!(p.add(Vec3::ONE, Vec3::ZERO));
        assert!(!p.add(Vec3::ONE, Vec3::ZERO));
        assert_eq!(p.len(), 2);
        assert_eq!(p.pos.len(), p.vel.len());
    }

    #[test]
    fn test_remove_swaps_with_last() {
        let g = grid();
        let mut p = ParticleSet::new(8, &g);
        for i in 0..4 {
            p.add(Vec3::splat(i as f32), Vec3::splat(-(i as f32)));
        }
        p.remove(1);
        assert_eq!(p.len(), 3);
        assert_eq!(p.pos[1], Vec3::splat(3.0));
        assert_eq!(p.vel[1], Vec3::splat(-3.0));
    }

    #[test]
    fn test_remove_many_keeps_survivors() {
        let g = grid();
        let mut p = ParticleSet::new(8, &g);
        for i in 0..6 {
            p.add(Vec3::splat(i as f32), Vec3::ZERO);
        }
        // Includes the last index and a duplicate.
        let mut doomed = vec![5, 0, 2, 2];
        p.remove_many(&mut doomed);

        assert_eq!(p.len(), 3);
        let mut left: Vec<f32> = p.pos.iter().map(|v| v.x).collect();
        left.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(left, vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clear() {
        let g = grid();
        let mut p = ParticleSet::new(4, &g);
        p.add(Vec3::ONE, Vec3::X);
        p.clear();
        assert!(p.is_empty());
        assert_eq!(p.vel.len(), 0);
    }
}
