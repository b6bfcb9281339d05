//! Reading and writing persisted solver records.
//!
//! A record is one JSON object mapping names to scalars, flat real arrays,
//! and the boolean `flags` sub-record.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SessionError, SessionResult};
use crate::layered::Record;

pub const RECORD_EXTENSION: &str = "json";

/// Appends the record extension unless the path already carries it.
pub fn with_record_extension(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}

/// Reads and parses a record. Any failure, from a missing file to trailing
/// garbage, comes back as `None`; callers treat it as an empty record.
pub fn read_record(path: &Path) -> Option<Record> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Serializes first, writes once. The file either holds the complete
/// record or was never created.
pub fn write_record(path: &Path, record: &Record) -> SessionResult<()> {
    let contents = serde_json::to_string_pretty(record)
        .map_err(|e| SessionError::Io(format!("record serialization failed: {e}")))?;
    fs::write(path, contents)
        .map_err(|e| SessionError::Io(format!("writing {} failed: {e}", path.display())))
}
