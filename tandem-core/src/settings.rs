//! Tuning knobs for the ADMM loop.

use nalgebra::DVector;

/// Solve-time parameters. Construct with struct update syntax over
/// [`AdmmSettings::default`] to override a subset.
#[derive(Debug, Clone)]
pub struct AdmmSettings {
    /// Overrelaxation parameter, in `(0, 2)`.
    pub alpha: f64,
    /// Initial penalty. Ignored when `resume` keeps the previous value.
    pub rho: f64,
    pub abstol: f64,
    pub reltol: f64,
    /// Relative tolerance of the indirect (CG) projection.
    pub tolproj: f64,
    /// Residual imbalance factor that triggers a penalty adjustment.
    pub toladapt: f64,
    pub anderson_regularization: f64,
    pub maxiter: u32,
    pub anderson_lookback: u32,
    /// 0 silent, 1 final summary, 2 progress every 10 iterations,
    /// 3 every iteration.
    pub verbose: u32,
    /// 0 populate all outputs, 1 primal variables only, 2+ none.
    pub suppress: u32,
    pub adaptiverho: bool,
    pub accelerate: bool,
    /// Also require the duality gap bound before declaring convergence.
    pub gapstop: bool,
    pub warmstart: bool,
    /// Keep the penalty adapted during the previous solve on this handle.
    pub resume: bool,
    /// Record per-iteration residuals, readable afterwards through
    /// [`crate::solver::DenseSolver::residual_trace`].
    pub diagnostic: bool,
    /// Primal warm-start point, length `n`. Used when `warmstart` is set.
    pub x0: Option<DVector<f64>>,
    /// Dual warm-start point, length `m`. Used when `warmstart` is set.
    pub nu0: Option<DVector<f64>>,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        AdmmSettings {
            alpha: 1.7,
            rho: 1.0,
            abstol: 1e-4,
            reltol: 1e-3,
            tolproj: 1e-8,
            toladapt: 1e-3,
            anderson_regularization: 1e-8,
            maxiter: 2000,
            anderson_lookback: 10,
            verbose: 0,
            suppress: 0,
            adaptiverho: true,
            accelerate: false,
            gapstop: false,
            warmstart: false,
            resume: false,
            diagnostic: false,
            x0: None,
            nu0: None,
        }
    }
}
