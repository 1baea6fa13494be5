//! Dense 3D fields stored in a flat buffer.
//!
//! Linear layout is `i + nx * (j + ny * k)`, so consecutive `i` values are
//! adjacent in memory. All `(i, j, k)` accessors are bounds-checked.

use std::ops::{Index, IndexMut};

use crate::grid::CellType;

/// Owned 3D array addressed by `(i, j, k)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Array3<T> {
    nx: usize,
    ny: usize,
    nz: usize,
    data: Vec<T>,
}

/// Scalar field (velocity components, weights).
pub type Array3f = Array3<f32>;

/// Voxel classification field.
pub type MarkerField = Array3<CellType>;

impl<T: Clone + Default> Array3<T> {
    /// Create an array filled with `T::default()`.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self::filled(nx, ny, nz, T::default())
    }

    /// Create an array with every element set to `value`.
    pub fn filled(nx: usize, ny: usize, nz: usize, value: T) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![value; nx * ny * nz],
        }
    }

    /// Reset every element to `T::default()`.
    pub fn zero(&mut self) {
        self.data.fill(T::default());
    }
}

impl<T> Array3<T> {
    /// Dimensions as `(nx, ny, nz)`.
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.nx && j < self.ny && k < self.nz
    }

    /// Linear index of `(i, j, k)`. Does not check bounds.
    #[inline]
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nx * (j + self.ny * k)
    }

    /// Checked element access.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<&T> {
        if self.in_bounds(i, j, k) {
            Some(&self.data[self.linear_index(i, j, k)])
        } else {
            None
        }
    }

    /// Checked mutable element access.
    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> Option<&mut T> {
        if self.in_bounds(i, j, k) {
            let idx = self.linear_index(i, j, k);
            Some(&mut self.data[idx])
        } else {
            None
        }
    }

    /// Element access with signed indices; `None` outside the array.
    #[inline]
    pub fn get_signed(&self, i: i32, j: i32, k: i32) -> Option<&T> {
        if i < 0 || j < 0 || k < 0 {
            return None;
        }
        self.get(i as usize, j as usize, k as usize)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T: Clone> Array3<T> {
    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy the contents of `other` into `self`. Dimensions must match.
    pub fn copy_from(&mut self, other: &Array3<T>) {
        assert_eq!(self.dims(), other.dims(), "array dimension mismatch");
        self.data.clone_from_slice(&other.data);
    }
}

impl<T> Index<(usize, usize, usize)> for Array3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &T {
        assert!(
            self.in_bounds(i, j, k),
            "index ({}, {}, {}) out of bounds for {}x{}x{}",
            i,
            j,
            k,
            self.nx,
            self.ny,
            self.nz
        );
        &self.data[self.linear_index(i, j, k)]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Array3<T> {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut T {
        assert!(
            self.in_bounds(i, j, k),
            "index ({}, {}, {}) out of bounds for {}x{}x{}",
            i,
            j,
            k,
            self.nx,
            self.ny,
            self.nz
        );
        let idx = self.linear_index(i, j, k);
        &mut self.data[idx]
    }
}

/// Clamp a stencil base index so that `base` and `base + 1` are valid for an
/// axis of length `n`. Returns the pair of sample indices.
#[inline]
fn stencil_pair(base: usize, n: usize) -> (usize, usize) {
    if n < 2 {
        return (0, 0);
    }
    let i0 = base.min(n - 2);
    (i0, i0 + 1)
}

impl Array3f {
    /// Trilinear interpolation between the 8 samples at `(i..=i+1, j..=j+1, k..=k+1)`.
    ///
    /// Indices are clamped into the array and fractions into `[0, 1]`, so any
    /// input is safe to sample.
    pub fn trilerp(&self, i: usize, j: usize, k: usize, fx: f32, fy: f32, fz: f32) -> f32 {
        let (i0, i1) = stencil_pair(i, self.nx);
        let (j0, j1) = stencil_pair(j, self.ny);
        let (k0, k1) = stencil_pair(k, self.nz);
        let fx = fx.clamp(0.0, 1.0);
        let fy = fy.clamp(0.0, 1.0);
        let fz = fz.clamp(0.0, 1.0);

        let s = |a, b, c| self.data[self.linear_index(a, b, c)];

        let x00 = lerp(s(i0, j0, k0), s(i1, j0, k0), fx);
        let x10 = lerp(s(i0, j1, k0), s(i1, j1, k0), fx);
        let x01 = lerp(s(i0, j0, k1), s(i1, j0, k1), fx);
        let x11 = lerp(s(i0, j1, k1), s(i1, j1, k1), fx);

        lerp(lerp(x00, x10, fy), lerp(x01, x11, fy), fz)
    }

    /// Largest absolute value in the field.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }
}

#[inline]
fn lerp(a: f32, b: f32, f: f32) -> f32 {
    (1.0 - f) * a + f * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_layout() {
        let a: Array3f = Array3::new(4, 3, 2);
        assert_eq!(a.len(), 24);
        assert_eq!(a.linear_index(1, 0, 0), 1);
        assert_eq!(a.linear_index(0, 1, 0), 4);
        assert_eq!(a.linear_index(0, 0, 1), 12);
        assert_eq!(a.linear_index(3, 2, 1), 23);
    }

    #[test]
    fn test_checked_access() {
        let mut a: Array3f = Array3::new(2, 2, 2);
        a[(1, 1, 1)] = 5.0;
        assert_eq!(a.get(1, 1, 1), Some(&5.0));
        assert_eq!(a.get(2, 0, 0), None);
        assert_eq!(a.get_signed(-1, 0, 0), None);
        assert!(a.get_mut(0, 2, 0).is_none());
    }

    #[test]
    #[should_panic]
    fn test_index_out_of_bounds_panics() {
        let a: Array3f = Array3::new(2, 2, 2);
        let _ = a[(0, 0, 2)];
    }

    #[test]
    fn test_trilerp_at_node_is_exact() {
        let mut a: Array3f = Array3::new(3, 3, 3);
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    a[(i, j, k)] = (i * 9 + j * 3 + k) as f32 * 0.37 + 0.11;
                }
            }
        }
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    assert_eq!(a.trilerp(i, j, k, 0.0, 0.0, 0.0), a[(i, j, k)]);
                }
            }
        }
    }

    #[test]
    fn test_trilerp_midpoint_of_linear_field() {
        let mut a: Array3f = Array3::new(2, 2, 2);
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    a[(i, j, k)] = i as f32 + 2.0 * j as f32 + 4.0 * k as f32;
                }
            }
        }
        let v = a.trilerp(0, 0, 0, 0.5, 0.5, 0.5);
        assert!((v - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_trilerp_clamps_out_of_range_indices() {
        let a = Array3f::filled(3, 3, 3, 2.0);
        assert_eq!(a.trilerp(100, 100, 100, 7.0, -3.0, 0.5), 2.0);
    }

    #[test]
    fn test_max_abs() {
        let mut a = Array3f::filled(2, 2, 2, 0.75);
        a[(1, 0, 1)] = -3.0;
        assert_eq!(a.max_abs(), 3.0);
    }
}
