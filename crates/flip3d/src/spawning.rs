//! Initial particle seeding.
//!
//! Each seeded cell receives a 2x2x2 micro-grid of particles, every one
//! jittered inside its sub-cell so the initial distribution is not aligned
//! with the grid.

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{SEEDS_PER_AXIS, SEED_JITTER};
use crate::grid::Grid;
use crate::particle::ParticleSet;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};

/// Grid dimensions the default regions were laid out for.
const REFERENCE_DIMS: [usize; 3] = [100, 78, 64];

/// Default seed boxes in cells of the reference grid: a corner block on the
/// floor, a block hanging mid-air, and a block against the far floor corner.
const DEFAULT_BOXES: [([usize; 3], [usize; 3]); 3] = [
    ([1, 1, 1], [10, 10, 10]),
    ([40, 20, 20], [50, 30, 30]),
    ([79, 1, 43], [89, 10, 53]),
];

/// Axis-aligned block of cells to fill with fluid, half-open `[min, max)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedRegion {
    pub min: [usize; 3],
    pub max: [usize; 3],
    /// Initial velocity of the seeded particles
    #[serde(
        default,
        serialize_with = "serialize_vec3",
        deserialize_with = "deserialize_vec3"
    )]
    pub velocity: Vec3,
}

impl SeedRegion {
    pub fn new(min: [usize; 3], max: [usize; 3]) -> Self {
        Self {
            min,
            max,
            velocity: Vec3::ZERO,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Number of cells covered (before clipping to a grid).
    pub fn cell_count(&self) -> usize {
        (0..3)
            .map(|a| self.max[a].saturating_sub(self.min[a]))
            .product()
    }

    /// The three default regions, scaled from the reference layout to a
    /// grid of `dims` cells. Each scaled region keeps at least one cell per axis.
    pub fn defaults_for(dims: [usize; 3]) -> Vec<SeedRegion> {
        DEFAULT_BOXES
            .iter()
            .map(|(min, max)| {
                let mut lo = [0; 3];
                let mut hi = [0; 3];
                for a in 0..3 {
                    lo[a] = scale_index(min[a], dims[a], REFERENCE_DIMS[a]).max(1);
                    hi[a] = scale_index(max[a], dims[a], REFERENCE_DIMS[a]).max(lo[a] + 1);
                }
                SeedRegion::new(lo, hi)
            })
            .collect()
    }

    /// Cell range on axis `a` clipped to the interior of `grid`.
    fn clipped(&self, a: usize, n: usize) -> std::ops::Range<usize> {
        self.min[a].max(1)..self.max[a].min(n - 1)
    }
}

#[inline]
fn scale_index(c: usize, n: usize, reference: usize) -> usize {
    (c * n + reference / 2) / reference
}

/// Fill `regions` with jittered particles. Cells outside the grid interior
/// are skipped, and seeding stops once the particle set is full.
///
/// Returns the number of particles added.
pub fn seed_regions<R: Rng + ?Sized>(
    particles: &mut ParticleSet,
    grid: &Grid,
    regions: &[SeedRegion],
    rng: &mut R,
) -> usize {
    let h = grid.h;
    let half = 0.5 * h;
    let mut added = 0;

    for region in regions {
        for k in region.clipped(2, grid.nz) {
            for j in region.clipped(1, grid.ny) {
                for i in region.clipped(0, grid.nx) {
                    let centre = grid.cell_center(i, j, k);
                    for sk in 0..SEEDS_PER_AXIS {
                        for sj in 0..SEEDS_PER_AXIS {
                            for si in 0..SEEDS_PER_AXIS {
                                let sub = Vec3::new(
                                    si as f32 - 0.5,
                                    sj as f32 - 0.5,
                                    sk as f32 - 0.5,
                                );
                                let jitter = Vec3::new(
                                    rng.gen_range(-0.5f32..=0.5),
                                    rng.gen_range(-0.5f32..=0.5),
                                    rng.gen_range(-0.5f32..=0.5),
                                ) * SEED_JITTER;
                                let pos = centre + (sub + jitter) * half;

                                if !particles.add(pos, region.velocity) {
                                    log::warn!(
                                        "Seeding stopped at particle capacity {} ({} added)",
                                        particles.capacity(),
                                        added
                                    );
                                    return added;
                                }
                                added += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    added
}
