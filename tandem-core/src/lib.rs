//! Tandem: a graph-form ADMM engine for convex optimization
//!
//! This library solves problems of the form
//!
//! ```text
//! minimize    f(y) + g(x)
//! subject to  y = A x
//! ```
//!
//! where `f` and `g` are separable sums of scalar terms drawn from a fixed
//! catalogue (absolute value, square, indicators, entropy, logistic, ...).
//! This "graph form" covers least squares and its regularized variants,
//! linear programming over boxes, support vector machines, and logistic
//! regression, among others.
//!
//! # Algorithm
//!
//! The engine runs the **alternating direction method of multipliers** on
//! the graph of `A`:
//!
//! - **Sinkhorn-Knopp equilibration** of the matrix, so that tolerances
//!   behave uniformly across badly scaled inputs
//! - **Graph projection** via a single Cholesky factorization of size
//!   `min(m, n)` (direct) or Jacobi-preconditioned conjugate gradient
//!   (indirect)
//! - **Overrelaxation** and an **adaptive penalty** schedule
//! - Optional **Anderson acceleration** of the fixed-point iteration
//!
//! A handle keeps its iterate state between solves, so repeated solves of
//! the same problem with perturbed objectives warm start for free, and the
//! whole handle (equilibration, factorization, state) can be exported to
//! flat buffers and rebuilt later without repeating the setup work.
//!
//! # Example
//!
//! ```ignore
//! use nalgebra::DMatrix;
//! use tandem_core::{
//!     AdmmInfo, AdmmOutput, AdmmSettings, DenseSolver, FunctionKind,
//!     FunctionTerm, ProblemData, SolverFlags,
//! };
//!
//! // min 0.5*||y - b||^2  s.t.  y = A x
//! let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
//! let f = vec![
//!     FunctionTerm { b: 1.0, ..FunctionTerm::new(FunctionKind::Square) };
//!     2
//! ];
//! let g = vec![FunctionTerm::new(FunctionKind::Zero); 2];
//!
//! let mut solver = DenseSolver::init(ProblemData::new(a), SolverFlags::default())?;
//! let mut info = AdmmInfo::default();
//! let mut output = AdmmOutput::default();
//! solver.solve(&f, &g, &AdmmSettings::default(), &mut info, &mut output)?;
//!
//! println!("converged: {}", info.converged);
//! println!("x = {:?}", output.x);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod anderson;
pub mod equil;
pub mod error;
pub mod project;
pub mod prox;
pub mod settings;
pub mod solver;

pub use equil::{regularized_sinkhorn_knopp, Equilibration};
pub use error::EngineError;
pub use project::{CholeskyFactor, Projector};
pub use prox::{eval_terms, FunctionKind, FunctionTerm};
pub use settings::AdmmSettings;
pub use solver::{
    AdmmInfo, AdmmOutput, DenseSolver, ProblemData, ResidualSample, SolverFlags, STATE_BLOCKS,
};

/// Rare-event diagnostics toggle, read once per process.
/// `TANDEM_VERBOSE` at level 2 or above enables extra reports on stderr.
pub(crate) fn diagnostics_enabled() -> bool {
    static ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("TANDEM_VERBOSE")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map(|n| n >= 2)
            .unwrap_or(false)
    })
}
