//! Regularized Sinkhorn-Knopp equilibration.
//!
//! Produces diagonal scalings `d`, `e` and the equilibrated matrix
//! `A_equil = D A E` whose row and column norms are balanced, which keeps
//! the ADMM iteration well conditioned. Row/column sums of `|A|` are
//! alternately driven toward one with a small regularization so empty rows
//! and columns stay finite; a final pass balances the weight carried by `d`
//! against `e` and normalizes the Frobenius norm of the result.

use nalgebra::{DMatrix, DVector};

use crate::error::EngineError;

const SINKHORN_ITERS: usize = 10;

/// Result of equilibrating a problem matrix.
#[derive(Debug, Clone)]
pub struct Equilibration {
    /// `D A E`, Frobenius-normalized.
    pub a_equil: DMatrix<f64>,
    /// Row scaling, length `m`.
    pub d: DVector<f64>,
    /// Column scaling, length `n`.
    pub e: DVector<f64>,
}

/// Equilibrates `a` with regularized Sinkhorn-Knopp iterations.
///
/// Postcondition: `a_equil[i,j] == d[i] * a[i,j] * e[j]` exactly (the
/// scalings absorb the normalization factor).
pub fn regularized_sinkhorn_knopp(a: &DMatrix<f64>) -> Result<Equilibration, EngineError> {
    let (m, n) = (a.nrows(), a.ncols());
    if a.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::Numerical(
            "problem matrix contains non-finite entries".into(),
        ));
    }

    let abs = a.map(f64::abs);
    let abs_t = abs.transpose();
    let mut d = DVector::from_element(m, 1.0);
    let mut e = DVector::from_element(n, 1.0);
    let reg_scale = f64::EPSILON.sqrt();

    for _ in 0..SINKHORN_ITERS {
        // d = 1 ./ (|A| e + reg), reg proportional to the mean row sum
        let rows = &abs * &e;
        let reg = reg_scale * rows.sum() / m as f64;
        for i in 0..m {
            let denom = rows[i] + reg;
            d[i] = if denom > 0.0 { 1.0 / denom } else { 1.0 };
        }

        // e = 1 ./ (|A|' d + reg), reg proportional to the mean column sum
        let cols = &abs_t * &d;
        let reg = reg_scale * cols.sum() / n as f64;
        for j in 0..n {
            let denom = cols[j] + reg;
            e[j] = if denom > 0.0 { 1.0 / denom } else { 1.0 };
        }
    }

    // Split the scaling weight evenly between d and e; the product D A E is
    // unchanged by this.
    let balance = (e.norm() / d.norm()).sqrt() * (m as f64 / n as f64).powf(0.25);
    if balance.is_finite() && balance > 0.0 {
        d *= balance;
        e /= balance;
    }

    let mut a_equil = DMatrix::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            a_equil[(i, j)] = d[i] * a[(i, j)] * e[j];
        }
    }

    // Normalize ||A_equil||_F to sqrt(min(m, n)), folding the factor evenly
    // into d and e so the postcondition keeps holding.
    let norm = a_equil.norm() / (m.min(n) as f64).sqrt();
    if norm > 0.0 {
        a_equil /= norm;
        let root = norm.sqrt();
        d /= root;
        e /= root;
    }

    if crate::diagnostics_enabled() {
        eprintln!(
            "equil: m={} n={} norm_scale={:.3e} d=[{:.3e},{:.3e}] e=[{:.3e},{:.3e}]",
            m,
            n,
            norm,
            d.min(),
            d.max(),
            e.min(),
            e.max(),
        );
    }

    Ok(Equilibration { a_equil, d, e })
}
