//! Read-only results of a solve call.

use tandem_core::{AdmmInfo, AdmmOutput};

/// Scalar diagnostics of the most recent solve. Refreshed in place by each
/// successful solve call; non-convergence shows up here, not as an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverDiagnostics {
    pub err: i32,
    pub converged: bool,
    pub iterations: u32,
    pub objective: f64,
    pub rho: f64,
    pub setup_time: f64,
    pub solve_time: f64,
}

impl From<&AdmmInfo> for SolverDiagnostics {
    fn from(info: &AdmmInfo) -> Self {
        SolverDiagnostics {
            err: info.err,
            converged: info.converged,
            iterations: info.iterations,
            objective: info.objective,
            rho: info.rho,
            setup_time: info.setup_time,
            solve_time: info.solve_time,
        }
    }
}

/// Solution vectors of the most recent solve, sized `(m, n)`:
/// primal `x` and dual `mu` of length `n`, their images `y` and `nu` of
/// length `m`. Fields stay empty when the solve ran with output
/// suppression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionOutput {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub mu: Vec<f64>,
    pub nu: Vec<f64>,
}

impl From<AdmmOutput> for SolutionOutput {
    fn from(out: AdmmOutput) -> Self {
        SolutionOutput {
            x: out.x,
            y: out.y,
            mu: out.mu,
            nu: out.nu,
        }
    }
}
