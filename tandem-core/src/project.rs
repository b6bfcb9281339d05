//! Projection onto the graph `{(x, y) : y = A x}`.
//!
//! Each ADMM iteration projects a point `(c, d)` onto the graph of the
//! equilibrated matrix, which reduces to the normal equations
//! `(I + A'A) x = c + A'd`. Two paths are provided:
//!
//! * direct: one Cholesky factorization of the gram matrix, reused every
//!   iteration. The gram is `I + A'A` for tall problems and `I + AA'` for
//!   fat ones, so the factor is always `min(m, n)` square.
//! * indirect: preconditioned conjugate gradient with a Jacobi
//!   preconditioner, warm started from the previous projection.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::EngineError;

const CG_MAXITER: usize = 100;

/// Explicit Cholesky lower factor.
///
/// Kept as a plain matrix rather than nalgebra's opaque decomposition so the
/// factor can round-trip through an exported cache.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    l: DMatrix<f64>,
}

impl CholeskyFactor {
    /// Factorizes a symmetric positive definite matrix.
    pub fn factorize(gram: DMatrix<f64>) -> Result<Self, EngineError> {
        let chol = Cholesky::new(gram).ok_or_else(|| {
            EngineError::Factorization("projection gram matrix is not positive definite".into())
        })?;
        Ok(CholeskyFactor { l: chol.l() })
    }

    /// Wraps a previously exported lower factor.
    pub fn from_lower(l: DMatrix<f64>) -> Self {
        CholeskyFactor { l }
    }

    /// The lower factor `L` with `L L' = gram`.
    pub fn lower(&self) -> &DMatrix<f64> {
        &self.l
    }

    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Solves `gram * x = rhs` by forward and backward substitution.
    pub fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, EngineError> {
        let fwd = self
            .l
            .solve_lower_triangular(rhs)
            .ok_or_else(|| EngineError::Numerical("singular Cholesky factor".into()))?;
        self.l
            .tr_solve_lower_triangular(&fwd)
            .ok_or_else(|| EngineError::Numerical("singular Cholesky factor".into()))
    }
}

/// Direct or indirect graph projector.
#[derive(Debug, Clone)]
pub enum Projector {
    Direct(DirectProjector),
    Indirect(CgProjector),
}

impl Projector {
    /// Builds the direct projector by factorizing the gram matrix of `a`.
    pub fn direct(a: &DMatrix<f64>) -> Result<Projector, EngineError> {
        let (m, n) = (a.nrows(), a.ncols());
        let gram = if m >= n {
            DMatrix::identity(n, n) + a.transpose() * a
        } else {
            DMatrix::identity(m, m) + a * a.transpose()
        };
        Ok(Projector::Direct(DirectProjector {
            chol: CholeskyFactor::factorize(gram)?,
        }))
    }

    /// Rebuilds the direct projector from an exported lower factor.
    pub fn direct_from_factor(l: DMatrix<f64>) -> Projector {
        Projector::Direct(DirectProjector {
            chol: CholeskyFactor::from_lower(l),
        })
    }

    /// Builds the indirect projector (Jacobi-preconditioned CG).
    pub fn indirect(a: &DMatrix<f64>) -> Projector {
        let n = a.ncols();
        let mut precond = DVector::zeros(n);
        for j in 0..n {
            precond[j] = 1.0 / (1.0 + a.column(j).norm_squared());
        }
        Projector::Indirect(CgProjector {
            precond,
            x_prev: DVector::zeros(n),
            last_iters: 0,
        })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Projector::Direct(_))
    }

    /// The Cholesky lower factor, when one exists.
    pub fn factor(&self) -> Option<&DMatrix<f64>> {
        match self {
            Projector::Direct(p) => Some(p.chol.lower()),
            Projector::Indirect(_) => None,
        }
    }

    /// CG iteration count of the most recent projection, if indirect.
    pub fn cg_iterations(&self) -> Option<usize> {
        match self {
            Projector::Direct(_) => None,
            Projector::Indirect(p) => Some(p.last_iters),
        }
    }

    /// Projects `(cx, dy)` onto the graph of `a`; returns `(x, y)` with
    /// `y = a * x`.
    pub fn project(
        &mut self,
        a: &DMatrix<f64>,
        cx: &DVector<f64>,
        dy: &DVector<f64>,
        tol: f64,
    ) -> Result<(DVector<f64>, DVector<f64>), EngineError> {
        let x = match self {
            Projector::Direct(p) => p.solve(a, cx, dy)?,
            Projector::Indirect(p) => {
                let rhs = cx + a.transpose() * dy;
                p.solve(a, &rhs, tol)?
            }
        };
        let y = a * &x;
        Ok((x, y))
    }
}

/// Cholesky-based projection.
#[derive(Debug, Clone)]
pub struct DirectProjector {
    chol: CholeskyFactor,
}

impl DirectProjector {
    fn solve(
        &self,
        a: &DMatrix<f64>,
        cx: &DVector<f64>,
        dy: &DVector<f64>,
    ) -> Result<DVector<f64>, EngineError> {
        let (m, n) = (a.nrows(), a.ncols());
        if m >= n {
            // (I + A'A) x = c + A'd
            let rhs = cx + a.transpose() * dy;
            self.chol.solve(&rhs)
        } else {
            // x = c + A'(I + AA')^{-1} (d - Ac)
            let rhs = dy - a * cx;
            let w = self.chol.solve(&rhs)?;
            Ok(cx + a.transpose() * w)
        }
    }
}

/// Jacobi-preconditioned conjugate gradient on `(I + A'A) x = rhs`.
#[derive(Debug, Clone)]
pub struct CgProjector {
    precond: DVector<f64>,
    x_prev: DVector<f64>,
    last_iters: usize,
}

impl CgProjector {
    fn apply(a: &DMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
        x + a.transpose() * (a * x)
    }

    fn solve(
        &mut self,
        a: &DMatrix<f64>,
        rhs: &DVector<f64>,
        tol: f64,
    ) -> Result<DVector<f64>, EngineError> {
        let threshold = tol * rhs.norm() + tol;

        let mut x = self.x_prev.clone();
        let mut r = rhs - Self::apply(a, &x);
        let mut z = r.component_mul(&self.precond);
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        self.last_iters = 0;

        for _ in 0..CG_MAXITER {
            if r.norm() <= threshold {
                break;
            }
            let ap = Self::apply(a, &p);
            let denom = p.dot(&ap);
            if denom <= 0.0 || !denom.is_finite() {
                // roundoff breakdown; the operator itself is SPD
                break;
            }
            let alpha = rz / denom;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            z = r.component_mul(&self.precond);
            let rz_next = r.dot(&z);
            let beta = rz_next / rz;
            p = &z + p * beta;
            rz = rz_next;
            self.last_iters += 1;
        }

        if x.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Numerical(
                "conjugate gradient produced non-finite iterate".into(),
            ));
        }
        self.x_prev = x.clone();
        Ok(x)
    }
}
