//! Conjugate gradient solver for the pressure Poisson system.
//!
//! Two paths share the same temporaries:
//! - [`ConjugateGradientSolver::solve`]: plain CG, used by the default pipeline.
//! - [`ConjugateGradientSolver::solve_preconditioned`]: CG with a MIC(0)
//!   preconditioner built by [`build_mic0`].
//!
//! Both start from a zero initial guess and stop on `||r||_inf < tol` or the
//! iteration cap. Hitting the cap is not an error; the best iterate is kept.

use crate::array3::MarkerField;
use crate::constants::{CG_DENOMINATOR_EPSILON, MIC_SAFETY, MIC_TUNING};
use crate::grid::CellType;
use crate::sparse::{SparseMatrix, Stencil, VectorN};

/// Outcome of one pressure solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
    /// Iterations performed (0 when the right-hand side was already below tolerance).
    pub iterations: usize,
    /// Infinity norm of the final residual.
    pub residual: f64,
    /// Whether the residual reached the tolerance.
    pub converged: bool,
}

/// CG solver owning its work vectors.
#[derive(Clone, Debug)]
pub struct ConjugateGradientSolver {
    /// Search direction
    d: VectorN,
    /// Preconditioned residual
    z: VectorN,
    /// Residual
    r: VectorN,
    /// A * d
    adj: VectorN,
    /// Forward-substitution scratch for the preconditioner
    q: VectorN,
}

impl ConjugateGradientSolver {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            d: VectorN::new(nx, ny, nz),
            z: VectorN::new(nx, ny, nz),
            r: VectorN::new(nx, ny, nz),
            adj: VectorN::new(nx, ny, nz),
            q: VectorN::new(nx, ny, nz),
        }
    }

    /// Solve `A x = b` with unpreconditioned CG.
    pub fn solve(
        &mut self,
        a: &SparseMatrix,
        b: &VectorN,
        max_iterations: usize,
        tol: f64,
        x: &mut VectorN,
        marker: &MarkerField,
    ) -> SolveStats {
        x.zero();
        self.r.copy_from(b);

        let mut residual = self.r.inf_norm();
        if residual < tol {
            return SolveStats {
                iterations: 0,
                residual,
                converged: true,
            };
        }

        self.d.copy_from(&self.r);
        let mut rr_old = self.r.norm2();

        for iteration in 1..=max_iterations {
            a.mul_vector(&self.d, &mut self.adj, marker);

            let denom = self.d.dot(&self.adj);
            if denom.abs() < CG_DENOMINATOR_EPSILON {
                log::trace!("CG: search direction degenerate at iteration {}", iteration);
                return SolveStats {
                    iterations: iteration - 1,
                    residual,
                    converged: false,
                };
            }

            let alpha = rr_old / denom;
            x.add_scaled(&self.d, alpha);
            self.r.sub_scaled(&self.adj, alpha);

            residual = self.r.inf_norm();
            if residual < tol {
                return SolveStats {
                    iterations: iteration,
                    residual,
                    converged: true,
                };
            }

            let rr_new = self.r.norm2();
            let beta = rr_new / rr_old;
            self.d.scale_add(&self.r, beta);
            rr_old = rr_new;
        }

        SolveStats {
            iterations: max_iterations,
            residual,
            converged: false,
        }
    }

    /// Solve `A x = b` with CG preconditioned by the MIC(0) factor in `precond`.
    ///
    /// `precond` must have been built from `a` by [`build_mic0`]; only its
    /// diagonal slot is read.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_preconditioned(
        &mut self,
        a: &SparseMatrix,
        b: &VectorN,
        precond: &SparseMatrix,
        max_iterations: usize,
        tol: f64,
        x: &mut VectorN,
        marker: &MarkerField,
    ) -> SolveStats {
        x.zero();
        self.r.copy_from(b);

        let mut residual = self.r.inf_norm();
        if residual < tol {
            return SolveStats {
                iterations: 0,
                residual,
                converged: true,
            };
        }

        apply_mic0(a, precond, &self.r, &mut self.q, &mut self.z, marker);
        self.d.copy_from(&self.z);
        let mut sigma = self.z.dot(&self.r);

        for iteration in 1..=max_iterations {
            a.mul_vector(&self.d, &mut self.adj, marker);

            let denom = self.d.dot(&self.adj);
            if denom.abs() < CG_DENOMINATOR_EPSILON {
                log::trace!("PCG: search direction degenerate at iteration {}", iteration);
                return SolveStats {
                    iterations: iteration - 1,
                    residual,
                    converged: false,
                };
            }

            let alpha = sigma / denom;
            x.add_scaled(&self.d, alpha);
            self.r.sub_scaled(&self.adj, alpha);

            residual = self.r.inf_norm();
            if residual < tol {
                return SolveStats {
                    iterations: iteration,
                    residual,
                    converged: true,
                };
            }

            apply_mic0(a, precond, &self.r, &mut self.q, &mut self.z, marker);
            let sigma_new = self.z.dot(&self.r);
            let beta = sigma_new / sigma;
            self.d.scale_add(&self.z, beta);
            sigma = sigma_new;
        }

        SolveStats {
            iterations: max_iterations,
            residual,
            converged: false,
        }
    }
}

/// Build the modified incomplete Cholesky factor of `a`.
///
/// The inverse diagonal of the factor is written into the `Diag` slot of
/// `precond`; the off-diagonals of the factor are read from `a` itself.
pub fn build_mic0(a: &SparseMatrix, precond: &mut SparseMatrix, marker: &MarkerField) {
    precond.zero();
    let (nx, ny, nz) = a.dims();
    if nx < 3 || ny < 3 || nz < 3 {
        return;
    }

    for k in 1..nz - 1 {
        for j in 1..ny - 1 {
            for i in 1..nx - 1 {
                if marker[(i, j, k)] != CellType::Fluid {
                    continue;
                }
                let diag = a.get(i, j, k, Stencil::Diag);
                if diag <= 0.0 {
                    continue;
                }

                let pi = precond.get(i - 1, j, k, Stencil::Diag);
                let pj = precond.get(i, j - 1, k, Stencil::Diag);
                let pk = precond.get(i, j, k - 1, Stencil::Diag);

                let ai = a.get(i - 1, j, k, Stencil::PlusX);
                let aj = a.get(i, j - 1, k, Stencil::PlusY);
                let ak = a.get(i, j, k - 1, Stencil::PlusZ);

                let mut e = diag - (ai * pi).powi(2) - (aj * pj).powi(2) - (ak * pk).powi(2);

                e -= MIC_TUNING
                    * (ai
                        * (a.get(i - 1, j, k, Stencil::PlusY) + a.get(i - 1, j, k, Stencil::PlusZ))
                        * pi
                        * pi
                        + aj * (a.get(i, j - 1, k, Stencil::PlusX)
                            + a.get(i, j - 1, k, Stencil::PlusZ))
                            * pj
                            * pj
                        + ak * (a.get(i, j, k - 1, Stencil::PlusX)
                            + a.get(i, j, k - 1, Stencil::PlusY))
                            * pk
                            * pk);

                if e < MIC_SAFETY * diag {
                    e = diag;
                }
                precond.set(i, j, k, Stencil::Diag, 1.0 / e.sqrt());
            }
        }
    }
}

/// `z = (L L^T)^-1 r` by forward then backward substitution.
fn apply_mic0(
    a: &SparseMatrix,
    precond: &SparseMatrix,
    r: &VectorN,
    q: &mut VectorN,
    z: &mut VectorN,
    marker: &MarkerField,
) {
    q.zero();
    z.zero();
    let (nx, ny, nz) = a.dims();
    if nx < 3 || ny < 3 || nz < 3 {
        return;
    }

    // L q = r
    for k in 1..nz - 1 {
        for j in 1..ny - 1 {
            for i in 1..nx - 1 {
                if marker[(i, j, k)] != CellType::Fluid {
                    continue;
                }
                let t = r[(i, j, k)]
                    - a.get(i - 1, j, k, Stencil::PlusX)
                        * precond.get(i - 1, j, k, Stencil::Diag)
                        * q[(i - 1, j, k)]
                    - a.get(i, j - 1, k, Stencil::PlusY)
                        * precond.get(i, j - 1, k, Stencil::Diag)
                        * q[(i, j - 1, k)]
                    - a.get(i, j, k - 1, Stencil::PlusZ)
                        * precond.get(i, j, k - 1, Stencil::Diag)
                        * q[(i, j, k - 1)];
                q[(i, j, k)] = t * precond.get(i, j, k, Stencil::Diag);
            }
        }
    }

    // L^T z = q
    for k in (1..nz - 1).rev() {
        for j in (1..ny - 1).rev() {
            for i in (1..nx - 1).rev() {
                if marker[(i, j, k)] != CellType::Fluid {
                    continue;
                }
                let p = precond.get(i, j, k, Stencil::Diag);
                let t = q[(i, j, k)]
                    - a.get(i, j, k, Stencil::PlusX) * p * z[(i + 1, j, k)]
                    - a.get(i, j, k, Stencil::PlusY) * p * z[(i, j + 1, k)]
                    - a.get(i, j, k, Stencil::PlusZ) * p * z[(i, j, k + 1)];
                z[(i, j, k)] = t * p;
            }
        }
    }
}
