//! Type-II Anderson acceleration for fixed-point iterations.
//!
//! The ADMM loop is a fixed-point map on the stacked iterate `[z; zt]`.
//! The accelerator keeps a sliding window of recent map outputs and
//! residuals and, once the window holds at least two columns, replaces the
//! plain map output with a least-squares mixture of the stored outputs.
//! The mixing weights solve the Tikhonov-regularized normal equations
//!
//! ```text
//! (G'G + mu I) w = 1,    alpha = w / sum(w),    next = F alpha
//! ```
//!
//! where the columns of `G` are residuals `f_i - x_i` and those of `F` are
//! the map outputs `f_i`.

use nalgebra::{Cholesky, DMatrix, DVector};

pub struct AndersonAccelerator {
    lookback: usize,
    regularization: f64,
    dim: usize,
    f_hist: Vec<DVector<f64>>,
    g_hist: Vec<DVector<f64>>,
    head: usize,
}

impl AndersonAccelerator {
    pub fn new(dim: usize, lookback: usize, regularization: f64) -> Self {
        let cap = lookback.max(1) + 1;
        AndersonAccelerator {
            lookback: lookback.max(1),
            regularization,
            dim,
            f_hist: Vec::with_capacity(cap),
            g_hist: Vec::with_capacity(cap),
            head: 0,
        }
    }

    /// Drops all stored history. The next `mix` call passes its map output
    /// through unchanged.
    pub fn reset(&mut self) {
        self.f_hist.clear();
        self.g_hist.clear();
        self.head = 0;
    }

    fn push(&mut self, f: DVector<f64>, g: DVector<f64>) {
        let cap = self.lookback + 1;
        if self.f_hist.len() < cap {
            self.f_hist.push(f);
            self.g_hist.push(g);
        } else {
            self.f_hist[self.head] = f;
            self.g_hist[self.head] = g;
        }
        self.head = (self.head + 1) % cap;
    }

    /// Records the pair `(x, fx)` and returns the accelerated candidate for
    /// the next iterate. Falls back to `fx` while the window is short or
    /// whenever the mixture goes non-finite (which also clears the window).
    pub fn mix(&mut self, x: &DVector<f64>, fx: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.dim);
        debug_assert_eq!(fx.len(), self.dim);

        let g = fx - x;
        if g.iter().any(|v| !v.is_finite()) {
            self.reset();
            return fx.clone();
        }
        self.push(fx.clone(), g);
        let cols = self.f_hist.len();
        if cols < 2 {
            return fx.clone();
        }

        let mut gram = DMatrix::zeros(cols, cols);
        for i in 0..cols {
            for j in i..cols {
                let v = self.g_hist[i].dot(&self.g_hist[j]);
                gram[(i, j)] = v;
                gram[(j, i)] = v;
            }
        }
        for i in 0..cols {
            gram[(i, i)] += self.regularization;
        }

        let chol = match Cholesky::new(gram) {
            Some(c) => c,
            None => return fx.clone(),
        };
        let w = chol.solve(&DVector::from_element(cols, 1.0));
        let sum: f64 = w.sum();
        if !sum.is_finite() || sum.abs() < f64::EPSILON {
            self.reset();
            return fx.clone();
        }

        let mut candidate = DVector::zeros(self.dim);
        for i in 0..cols {
            candidate.axpy(w[i] / sum, &self.f_hist[i], 1.0);
        }
        if candidate.iter().any(|v| !v.is_finite()) {
            self.reset();
            return fx.clone();
        }
        candidate
    }
}
