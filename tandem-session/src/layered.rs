//! Two-tier key/value store backing the persisted solver record.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One entry of a persisted record: a scalar, a flat real array, or the
/// named boolean flags sub-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
    Scalar(f64),
    Array(Vec<f64>),
    Flags(BTreeMap<String, bool>),
}

impl CacheValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            CacheValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            CacheValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_flags(&self) -> Option<&BTreeMap<String, bool>> {
        match self {
            CacheValue::Flags(map) => Some(map),
            _ => None,
        }
    }
}

/// Record contents as stored on disk.
pub type Record = BTreeMap<String, CacheValue>;

/// Key/value store with an immutable archive layer under a mutable
/// override layer.
///
/// Lookup precedence is deliberate and load bearing: the archive layer
/// wins whenever a key is present in both, so a key baked into a loaded
/// record stays visible until a new archive is produced. Writes only ever
/// touch the override layer. Do not flip the precedence.
#[derive(Debug, Clone, Default)]
pub struct DoubleLayeredCache {
    archive: Arc<Record>,
    overlay: Record,
}

impl DoubleLayeredCache {
    /// An empty cache: both layers blank.
    pub fn new() -> Self {
        DoubleLayeredCache::default()
    }

    /// Wraps a deserialized record as the archive layer.
    pub fn from_archive(record: Record) -> Self {
        DoubleLayeredCache {
            archive: Arc::new(record),
            overlay: Record::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.archive.contains_key(key) || self.overlay.contains_key(key)
    }

    /// Archive layer first, override layer only for keys the archive does
    /// not hold.
    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.archive.get(key).or_else(|| self.overlay.get(key))
    }

    /// Writes to the override layer. An archived key keeps shadowing the
    /// written value on `get`.
    pub fn set(&mut self, key: impl Into<String>, value: CacheValue) {
        self.overlay.insert(key.into(), value);
    }

    /// Adopts `other`'s archive layer by reference and applies `other`'s
    /// override layer on top of this one's.
    pub fn merge(&mut self, other: &DoubleLayeredCache) {
        self.archive = Arc::clone(&other.archive);
        for (k, v) in &other.overlay {
            self.overlay.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty() && self.overlay.is_empty()
    }
}
