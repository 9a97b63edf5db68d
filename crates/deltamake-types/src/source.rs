//! Source file entries as listed by a solution document.

use std::path::PathBuf;

/// One source file from a solution's `files` array.
///
/// The modification time is captured once, when the solution document is
/// loaded; entries are immutable afterwards. Times are whole seconds since
/// the epoch, matching the granularity of the differential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Last modification time observed at load, seconds since the epoch.
    pub mtime: i64,
}

impl SourceEntry {
    pub fn new(path: PathBuf, mtime: i64) -> Self {
        Self { path, mtime }
    }

    /// File name without the extension; used for object names and task titles.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_directory_and_extension() {
        let entry = SourceEntry::new(PathBuf::from("/proj/src/main.c"), 1000);
        assert_eq!(entry.stem(), "main");
    }

    #[test]
    fn stem_of_extensionless_file() {
        let entry = SourceEntry::new(PathBuf::from("/proj/Makefile"), 1000);
        assert_eq!(entry.stem(), "Makefile");
    }
}
