//! Error types for the session layer.

use thiserror::Error;

use tandem_core::EngineError;

/// Errors raised by sessions and their components.
///
/// Numeric non-convergence is not an error: it is reported through
/// [`crate::SolverDiagnostics::converged`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed objective, out-of-domain setting, mismatched dimensions,
    /// or a save-path collision.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation requires a live solver handle that does not exist.
    #[error("invalid session state: {0}")]
    State(String),

    /// Filesystem problem while persisting or loading a record.
    #[error("io failed: {0}")]
    Io(String),

    /// The engine rejected a call. The session's handle is unchanged.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type SessionResult<T> = Result<T, SessionError>;
