//! Raw engine iterate snapshot used for warm starting.

use tandem_core::DenseSolver;

use crate::error::{SessionError, SessionResult};
use crate::layered::{CacheValue, DoubleLayeredCache};

/// Flat copy of the engine's iterate blocks plus the penalty scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    pub vec: Vec<f64>,
    pub rho: f64,
}

impl SolverState {
    /// Reads a fresh snapshot out of a live handle.
    pub fn export(solver: &DenseSolver) -> SessionResult<SolverState> {
        let mut vec = vec![0.0; solver.state_len()];
        let mut rho = 0.0;
        solver
            .save_state(&mut vec, &mut rho)
            .map_err(SessionError::Engine)?;
        Ok(SolverState { vec, rho })
    }

    /// Builds a state of length `len` from a record: zeros when the record
    /// carries no `state` array, the stored array otherwise. A stored
    /// array whose length differs from `len` is rejected. A missing `rho`
    /// defaults to exactly `1.0`.
    pub fn from_record(record: &DoubleLayeredCache, len: usize) -> SessionResult<SolverState> {
        let mut vec = vec![0.0; len];
        if let Some(CacheValue::Array(stored)) = record.get("state") {
            if stored.len() != len {
                return Err(SessionError::Validation(format!(
                    "stored state has {} entries, this solver needs {len}",
                    stored.len()
                )));
            }
            vec.copy_from_slice(stored);
        }
        let rho = record
            .get("rho")
            .and_then(CacheValue::as_scalar)
            .unwrap_or(1.0);
        Ok(SolverState { vec, rho })
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}
