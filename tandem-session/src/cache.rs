//! Precomputed problem data exported from, or loaded into, a solver handle.

use std::collections::BTreeMap;

use tandem_core::SolverFlags;

use crate::layered::CacheValue;

/// Declared shape of one named cache array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayShape {
    Vector(usize),
    Matrix(usize, usize),
}

impl ArrayShape {
    /// Flat entry count.
    pub fn len(&self) -> usize {
        match self {
            ArrayShape::Vector(n) => *n,
            ArrayShape::Matrix(r, c) => r * c,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Equilibration, factorization, and structural flags for one problem.
///
/// Array keys and shapes follow the dense variant's declarations; see
/// [`crate::dense::DenseProblem::cache_shapes`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverCache {
    /// Equilibrated matrix, row-major, `m * n`.
    pub a_equil: Vec<f64>,
    /// Row scaling, length `m`.
    pub d: Vec<f64>,
    /// Column scaling, length `n`.
    pub e: Vec<f64>,
    /// Cholesky lower factor, `min(m, n)` square; all zeros when absent.
    pub ata_cholesky: Vec<f64>,
    pub flags: SolverFlags,
}

impl SolverCache {
    pub fn dims(&self) -> (usize, usize) {
        (self.d.len(), self.e.len())
    }

    /// Record entries for persistence, the flags spelled out field by
    /// field.
    pub fn record_entries(&self) -> Vec<(String, CacheValue)> {
        let mut flags = BTreeMap::new();
        for (name, value) in [
            ("direct", self.flags.direct),
            ("equilibrated", self.flags.equilibrated),
            ("factorized", self.flags.factorized),
        ] {
            flags.insert(name.to_string(), value);
        }
        vec![
            ("A_equil".into(), CacheValue::Array(self.a_equil.clone())),
            ("d".into(), CacheValue::Array(self.d.clone())),
            ("e".into(), CacheValue::Array(self.e.clone())),
            (
                "ATA_cholesky".into(),
                CacheValue::Array(self.ata_cholesky.clone()),
            ),
            ("flags".into(), CacheValue::Flags(flags)),
        ]
    }

    /// Rebuilds flags from a record's `flags` sub-record. Missing names
    /// keep their defaults.
    pub fn flags_from_record(map: &BTreeMap<String, bool>) -> SolverFlags {
        let mut flags = SolverFlags::default();
        if let Some(&v) = map.get("direct") {
            flags.direct = v;
        }
        if let Some(&v) = map.get("equilibrated") {
            flags.equilibrated = v;
        }
        if let Some(&v) = map.get("factorized") {
            flags.factorized = v;
        }
        flags
    }
}
