//! Grid-shaped vectors and the compressed 7-point Poisson matrix.
//!
//! The matrix stores four coefficients per cell: the diagonal and the
//! couplings to the `+x`, `+y` and `+z` neighbors. The `-x` coupling of cell
//! `(i, j, k)` is the `+x` coupling of cell `(i - 1, j, k)`, so the symmetric
//! half is never stored twice.

use std::ops::{Index, IndexMut};

use crate::array3::MarkerField;
use crate::grid::CellType;

/// Dense f64 vector with one entry per grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorN {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Vec<f64>,
}

impl VectorN {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![0.0; nx * ny * nz],
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        i + self.nx * (j + self.ny * k)
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn copy_from(&mut self, other: &VectorN) {
        self.data.copy_from_slice(&other.data);
    }

    /// Max-norm `max |x_i|`. NaN entries propagate as an infinite norm.
    pub fn inf_norm(&self) -> f64 {
        let mut r = 0.0f64;
        for &x in &self.data {
            if !(x.abs() <= r) {
                r = if x.is_nan() { f64::INFINITY } else { x.abs() };
            }
        }
        r
    }

    pub fn dot(&self, other: &VectorN) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Squared Euclidean norm.
    pub fn norm2(&self) -> f64 {
        self.data.iter().map(|a| a * a).sum()
    }

    /// `self += scale * rhs`
    pub fn add_scaled(&mut self, rhs: &VectorN, scale: f64) {
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a += scale * b;
        }
    }

    /// `self -= scale * rhs`
    pub fn sub_scaled(&mut self, rhs: &VectorN, scale: f64) {
        for (a, b) in self.data.iter_mut().zip(&rhs.data) {
            *a -= scale * b;
        }
    }

    /// `self = r + beta * self` (CG search-direction update).
    pub fn scale_add(&mut self, r: &VectorN, beta: f64) {
        for (d, r) in self.data.iter_mut().zip(&r.data) {
            *d = r + beta * *d;
        }
    }
}

impl Index<(usize, usize, usize)> for VectorN {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &f64 {
        &self.data[self.idx(i, j, k)]
    }
}

impl IndexMut<(usize, usize, usize)> for VectorN {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut f64 {
        let idx = self.idx(i, j, k);
        &mut self.data[idx]
    }
}

/// Slot of the stored coefficient within a cell's row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Stencil {
    Diag = 0,
    PlusX = 1,
    PlusY = 2,
    PlusZ = 3,
}

/// Symmetric 7-point matrix with 4 stored coefficients per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    nx: usize,
    ny: usize,
    nz: usize,
    stride_y: usize,
    stride_z: usize,
    data: Vec<f64>,
}

impl SparseMatrix {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        let stride_y = 4 * nx;
        let stride_z = stride_y * ny;
        Self {
            nx,
            ny,
            nz,
            stride_y,
            stride_z,
            data: vec![0.0; 4 * nx * ny * nz],
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    #[inline]
    fn idx(&self, i: usize, j: usize, k: usize, slot: Stencil) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        i * 4 + j * self.stride_y + k * self.stride_z + slot as usize
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize, slot: Stencil) -> f64 {
        self.data[self.idx(i, j, k, slot)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, slot: Stencil, value: f64) {
        let idx = self.idx(i, j, k, slot);
        self.data[idx] = value;
    }

    #[inline]
    pub fn add(&mut self, i: usize, j: usize, k: usize, slot: Stencil, value: f64) {
        let idx = self.idx(i, j, k, slot);
        self.data[idx] += value;
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// `out = A * x`, evaluated on interior FLUID cells only.
    ///
    /// The outer shell is always SOLID, so its rows are zero and the
    /// `i - 1` / `i + 1` neighbor reads of interior cells stay in bounds.
    pub fn mul_vector(&self, x: &VectorN, out: &mut VectorN, marker: &MarkerField) {
        out.zero();
        if self.nx < 3 || self.ny < 3 || self.nz < 3 {
            return;
        }
        for k in 1..self.nz - 1 {
            for j in 1..self.ny - 1 {
                for i in 1..self.nx - 1 {
                    if marker[(i, j, k)] != CellType::Fluid {
                        continue;
                    }
                    let mut acc = self.get(i, j, k, Stencil::Diag) * x[(i, j, k)];

                    acc += self.get(i, j, k, Stencil::PlusX) * x[(i + 1, j, k)];
                    acc += self.get(i, j, k, Stencil::PlusY) * x[(i, j + 1, k)];
                    acc += self.get(i, j, k, Stencil::PlusZ) * x[(i, j, k + 1)];

                    acc += self.get(i - 1, j, k, Stencil::PlusX) * x[(i - 1, j, k)];
                    acc += self.get(i, j - 1, k, Stencil::PlusY) * x[(i, j - 1, k)];
                    acc += self.get(i, j, k - 1, Stencil::PlusZ) * x[(i, j, k - 1)];

                    out[(i, j, k)] = acc;
                }
            }
        }
    }
}
