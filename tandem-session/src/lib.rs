//! Tandem sessions: lifecycle, persistence, and objective plumbing for
//! the graph-form engine in `tandem-core`.
//!
//! The engine solves `minimize f(y) + g(x) subject to y = A x` and keeps
//! its equilibration, factorization, and iterate state inside a handle.
//! This crate wraps one handle in a [`SolverSession`] that
//!
//! - marshals separable objectives through [`ObjectiveVector`], with
//!   scalar broadcast, fancy index spans, and whole-call validation
//! - merges per-solve settings patches and applies the acceleration
//!   heuristic for tight tolerances
//! - snapshots the iterate ([`SolverState`]) and the precomputed problem
//!   data ([`SolverCache`]) out of the handle
//! - persists both as a JSON record and rebuilds an equivalent handle
//!   from one, skipping equilibration and factorization on reload
//! - counts live handles in a [`Runtime`] so resource leaks show up in
//!   tests
//!
//! Records pass through a [`DoubleLayeredCache`], whose read precedence
//! (archive over overlay) matches what loading expects.
//!
//! # Example
//!
//! ```ignore
//! use nalgebra::DMatrix;
//! use tandem_session::{
//!     DenseProblem, DenseSession, FieldUpdate, FunctionKind, IndexSpan,
//!     ObjectiveVector, Param, SessionOptions, SettingsUpdate,
//! };
//!
//! let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
//! let mut session = DenseSession::new(DenseProblem::new(a), SessionOptions::default())?;
//!
//! // min 0.5*||y - b||^2 + |x|
//! let mut f = ObjectiveVector::new(3);
//! f.set(
//!     &IndexSpan::All,
//!     &FieldUpdate {
//!         h: Some(Param::Scalar(FunctionKind::Square.into())),
//!         b: Some(Param::Array(vec![1.0, 2.0, 3.0])),
//!         ..Default::default()
//!     },
//! )?;
//! let g = ObjectiveVector::with_fields(
//!     2,
//!     &FieldUpdate {
//!         h: Some(Param::Scalar(FunctionKind::Abs.into())),
//!         ..Default::default()
//!     },
//! )?;
//!
//! session.solve(&f, &g, &SettingsUpdate::default())?;
//! let saved = session.save("/tmp", "lasso_run", true, true)?;
//! println!("x = {:?}, record at {}", session.output().x, saved.display());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod dense;
pub mod error;
pub mod layered;
pub mod objective;
pub mod output;
pub mod persist;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod state;

pub use cache::{ArrayShape, SolverCache};
pub use dense::{DenseProblem, ProblemVariant};
pub use error::{SessionError, SessionResult};
pub use layered::{CacheValue, DoubleLayeredCache, Record};
pub use objective::{FieldUpdate, FunctionToken, IndexSpan, ObjectiveVector, Param};
pub use output::{SolutionOutput, SolverDiagnostics};
pub use persist::RECORD_EXTENSION;
pub use runtime::Runtime;
pub use session::{DenseSession, SessionOptions, SessionStatus, SolverSession};
pub use settings::{SettingsUpdate, SolverSettings};
pub use state::SolverState;

pub use tandem_core::{FunctionKind, FunctionTerm, STATE_BLOCKS};
