//! Problem representations a session can be built over.
//!
//! The session is generic over a [`ProblemVariant`]: the variant supplies
//! engine-ready data and flags for construction, and declares how its
//! cache arrays are shaped and rebuilt from a persisted record. Only the
//! dense variant ships here; the trait is the seam where sparse or
//! operator representations would plug in.

use nalgebra::DMatrix;

use tandem_core::{ProblemData, SolverFlags};

use crate::cache::{ArrayShape, SolverCache};
use crate::error::{SessionError, SessionResult};
use crate::layered::{CacheValue, DoubleLayeredCache};
use crate::session::SessionOptions;

pub trait ProblemVariant {
    /// Problem shape `(m, n)`.
    fn dims(&self) -> (usize, usize);

    /// Engine-ready problem data.
    fn build_data(&self) -> ProblemData;

    /// Structural flags derived from the problem and construction options.
    fn build_flags(&self, options: &SessionOptions) -> SolverFlags;

    /// Named cache arrays and their shapes for a problem of shape
    /// `(m, n)`.
    fn cache_shapes(m: usize, n: usize) -> Vec<(&'static str, ArrayShape)>;

    /// Materializes a cache from a layered record. Declared arrays missing
    /// from the record are zero-filled; present arrays must match their
    /// declared shapes.
    fn cache_from_record(
        m: usize,
        n: usize,
        record: &DoubleLayeredCache,
        allow_cholesky: bool,
    ) -> SessionResult<SolverCache>;

    /// Zero-initialized cache matching the declared shapes.
    fn allocate_cache(m: usize, n: usize) -> SolverCache;
}

/// Dense problem: one owned real matrix.
#[derive(Debug, Clone)]
pub struct DenseProblem {
    a: DMatrix<f64>,
}

impl DenseProblem {
    pub fn new(a: DMatrix<f64>) -> Self {
        DenseProblem { a }
    }

    /// Builds from row-major entries.
    pub fn from_rows(m: usize, n: usize, entries: &[f64]) -> SessionResult<Self> {
        if entries.len() != m * n {
            return Err(SessionError::Validation(format!(
                "matrix data has {} entries, shape {m}x{n} needs {}",
                entries.len(),
                m * n
            )));
        }
        Ok(DenseProblem {
            a: DMatrix::from_row_slice(m, n, entries),
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }
}

fn array_for(
    record: &DoubleLayeredCache,
    name: &str,
    shape: ArrayShape,
) -> SessionResult<Vec<f64>> {
    match record.get(name) {
        Some(CacheValue::Array(vals)) => {
            if vals.len() != shape.len() {
                return Err(SessionError::Validation(format!(
                    "cache array {name:?} has {} entries, declared shape needs {}",
                    vals.len(),
                    shape.len()
                )));
            }
            Ok(vals.clone())
        }
        Some(_) => Err(SessionError::Validation(format!(
            "cache entry {name:?} is not an array"
        ))),
        None => Ok(vec![0.0; shape.len()]),
    }
}

impl ProblemVariant for DenseProblem {
    fn dims(&self) -> (usize, usize) {
        (self.a.nrows(), self.a.ncols())
    }

    fn build_data(&self) -> ProblemData {
        ProblemData::new(self.a.clone())
    }

    fn build_flags(&self, options: &SessionOptions) -> SolverFlags {
        SolverFlags {
            direct: options.direct,
            ..Default::default()
        }
    }

    fn cache_shapes(m: usize, n: usize) -> Vec<(&'static str, ArrayShape)> {
        let k = m.min(n);
        vec![
            ("A_equil", ArrayShape::Matrix(m, n)),
            ("d", ArrayShape::Vector(m)),
            ("e", ArrayShape::Vector(n)),
            ("ATA_cholesky", ArrayShape::Matrix(k, k)),
        ]
    }

    fn cache_from_record(
        m: usize,
        n: usize,
        record: &DoubleLayeredCache,
        allow_cholesky: bool,
    ) -> SessionResult<SolverCache> {
        let k = m.min(n);
        let a_equil = array_for(record, "A_equil", ArrayShape::Matrix(m, n))?;
        let d = array_for(record, "d", ArrayShape::Vector(m))?;
        let e = array_for(record, "e", ArrayShape::Vector(n))?;

        let factor_stored = allow_cholesky && record.contains("ATA_cholesky");
        let ata_cholesky = if factor_stored {
            array_for(record, "ATA_cholesky", ArrayShape::Matrix(k, k))?
        } else {
            vec![0.0; k * k]
        };

        let mut flags = match record.get("flags") {
            Some(CacheValue::Flags(map)) => SolverCache::flags_from_record(map),
            _ => SolverFlags::default(),
        };
        // a record without the factor cannot claim one
        flags.factorized = flags.factorized && factor_stored;

        Ok(SolverCache {
            a_equil,
            d,
            e,
            ata_cholesky,
            flags,
        })
    }

    fn allocate_cache(m: usize, n: usize) -> SolverCache {
        let k = m.min(n);
        SolverCache {
            a_equil: vec![0.0; m * n],
            d: vec![0.0; m],
            e: vec![0.0; n],
            ata_cholesky: vec![0.0; k * k],
            flags: SolverFlags::default(),
        }
    }
}
