//! The differential record — the basis of incrementality.
//!
//! `deltamake.json` maps build name → source relative path → the mtime (whole
//! seconds since the epoch) observed the last time that source was scheduled
//! for compilation under that build. The planner skips a source whose
//! recorded time is at least its current mtime.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading or writing a differential document.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed differential document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted map from (build, source) to the last observed modification time.
///
/// `BTreeMap`s keep the document stable across rewrites. The `version` field
/// is required on load but its value is not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub version: String,
    #[serde(default)]
    pub diff: BTreeMap<String, BTreeMap<String, i64>>,
}

impl Default for DiffRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffRecord {
    /// Fresh record stamped with the package version.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            diff: BTreeMap::new(),
        }
    }

    /// Load a record from disk. A missing file is not an error: the caller
    /// gets `Ok(None)` and keeps whatever record it already has.
    pub fn load(path: &Path) -> Result<Option<Self>, DiffError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(DiffError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        let record: Self = serde_json::from_str(&text).map_err(|err| DiffError::Malformed {
            path: path.to_path_buf(),
            source: err,
        })?;

        Ok(Some(record))
    }

    /// Write the record, pretty-printed.
    pub fn save(&self, path: &Path) -> Result<(), DiffError> {
        let text = serde_json::to_string_pretty(self).map_err(|err| DiffError::Malformed {
            path: path.to_path_buf(),
            source: err,
        })?;

        fs::write(path, text).map_err(|err| DiffError::Io {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Last recorded time for `source` under `build`, if any.
    pub fn timestamp(&self, build: &str, source: &str) -> Option<i64> {
        self.diff.get(build)?.get(source).copied()
    }

    /// Record `mtime` for `source` under `build`, overwriting any prior slot.
    pub fn record(&mut self, build: &str, source: &str, mtime: i64) {
        self.diff
            .entry(build.to_string())
            .or_default()
            .insert(source.to_string(), mtime);
    }
}
