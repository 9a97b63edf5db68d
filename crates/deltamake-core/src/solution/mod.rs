//! The configuration model: solution documents, their loader, and the
//! incremental build planner.
//!
//! A *solution* (`solution.json`) defines path sets, listed source files
//! (mtimes captured at load), named builds, and sub-solutions to recurse
//! into. Loading is centralized in [`load_solution`], which validates the
//! document and dispatches the optional `type` field through the factory
//! registry.

mod build;
mod registry;

pub use build::{BuildError, BuildJob, PlanContext};
pub use registry::{register_defaults, SolutionFactory, SolutionRegistry};

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use deltamake_types::{DiffRecord, SourceEntry};

use crate::terminal::Terminal;

/// File name of a solution document, looked up in a solution's directory.
pub const SOLUTION_FILENAME: &str = "solution.json";
/// File name of the persisted differential record, next to the solution.
pub const DIFF_FILENAME: &str = "deltamake.json";

/// Fatal configuration errors. `MissingField` carries the path of the field
/// so the CLI can point at the exact hole in the document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed solution document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("value not set: {0}")]
    MissingField(String),
    #[error("solution type \"{0}\" is unknown")]
    UnknownType(String),
    #[error("build not found: \"{0}\"")]
    UnknownBuild(String),
    #[error("sub-solution codename not found: \"{0}\"")]
    UnknownCodename(String),
}

/// One loaded solution document.
///
/// Paths are absolute (resolved against the document's directory). Sources
/// are keyed by their document-relative path (the same key the differential
/// record uses) and iterate in that key's natural order.
#[derive(Debug)]
pub struct Solution {
    /// Directory the document was loaded from.
    pub dir: PathBuf,
    /// Ordered scan roots (`paths.scan`).
    pub scan_roots: Vec<PathBuf>,
    /// Where linked/archived outputs land (`paths.build`).
    pub build_dir: PathBuf,
    /// Where compiled objects land (`paths.tmp`).
    pub tmp_dir: PathBuf,
    /// Codename → relative directory of sub-solutions.
    pub sub_solutions: BTreeMap<String, String>,
    /// Relative source path → entry with its load-time mtime.
    pub sources: BTreeMap<String, SourceEntry>,
    /// Build name → raw parameter bag.
    pub builds: BTreeMap<String, Value>,
    /// The differential record for this solution.
    pub diff: DiffRecord,
}

impl Solution {
    /// Validate and extract the generic solution model from a parsed
    /// document.
    pub fn from_document(
        root: &Value,
        dir: &Path,
        terminal: &Terminal,
    ) -> Result<Self, ConfigError> {
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::MissingField("paths".into()))?;

        let mut scan_roots = Vec::new();
        match paths.get("scan") {
            Some(Value::Array(entries)) => {
                terminal.detail("Multiple scan paths:");
                for entry in entries.iter().filter_map(Value::as_str) {
                    terminal.detail(&format!("\t\"{entry}\""));
                    scan_roots.push(dir.join(entry));
                }
            }
            Some(Value::String(entry)) => {
                terminal.detail(&format!("Single scan path: \"{entry}\""));
                scan_roots.push(dir.join(entry));
            }
            _ => return Err(ConfigError::MissingField("paths.scan".into())),
        }

        let build_dir = paths
            .get("build")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::MissingField("paths.build".into()))?;
        let build_dir = dir.join(build_dir);

        let tmp_dir = paths
            .get("tmp")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::MissingField("paths.tmp".into()))?;
        let tmp_dir = dir.join(tmp_dir);

        let mut sub_solutions = BTreeMap::new();
        match root.get("solutions").and_then(Value::as_object) {
            None => terminal.detail("No sub-solutions set. Ignoring..."),
            Some(subs) => {
                terminal.detail("Sub-solutions:");
                for (codename, rel) in subs {
                    if let Some(rel) = rel.as_str() {
                        terminal.detail(&format!("\t\"{codename}\" -> \"{rel}\""));
                        sub_solutions.insert(codename.clone(), rel.to_string());
                    }
                }
            }
        }

        let files = root
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| ConfigError::MissingField("files".into()))?;

        let mut sources = BTreeMap::new();
        terminal.detail("Files:");
        for rel in files.iter().filter_map(Value::as_str) {
            terminal.detail(&format!("\t\"{rel}\""));
            let path = dir.join(rel);

            // A missing listed file is a warning, not a fatal error; it is
            // simply absent from the task stream.
            let mtime = match terminal.mtime(&path) {
                Ok(mtime) => mtime,
                Err(_) => {
                    terminal.warning(&format!("File \"{}\" does not exist!..", path.display()));
                    continue;
                }
            };

            sources.insert(rel.to_string(), SourceEntry::new(path, mtime));
        }

        let builds_value = root
            .get("builds")
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::MissingField("builds".into()))?;

        let mut builds = BTreeMap::new();
        terminal.detail("Builds:");
        for (name, params) in builds_value {
            terminal.detail(&format!("\t\"{name}\""));
            builds.insert(name.clone(), params.clone());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            scan_roots,
            build_dir,
            tmp_dir,
            sub_solutions,
            sources,
            builds,
            diff: DiffRecord::new(),
        })
    }

    /// Generate the planner state for one named build; fails on an unknown
    /// name. Sub-solutions referenced by the build are loaded here.
    pub fn gen_build(&self, name: &str, ctx: &PlanContext) -> Result<BuildJob, ConfigError> {
        BuildJob::new(self, name, ctx)
    }

    /// Replace this solution's differential record from a file. Missing or
    /// unreadable files leave the fresh record in place; reports whether a
    /// record was actually loaded.
    pub fn load_diff(&mut self, path: &Path, terminal: &Terminal) -> bool {
        terminal.detail(&format!("Loading diff \"{}\"...", path.display()));

        match DiffRecord::load(path) {
            Ok(Some(record)) => {
                terminal.detail(&format!("Diff version: {}", record.version));
                self.diff = record;
                true
            }
            Ok(None) => {
                terminal.detail(&format!("Can't open \"{}\". Ignoring..", path.display()));
                false
            }
            Err(err) => {
                terminal.warning(&format!("Ignoring differential record: {err}"));
                false
            }
        }
    }

    /// Persist this solution's differential record.
    pub fn save_diff(
        &self,
        path: &Path,
        terminal: &Terminal,
    ) -> Result<(), deltamake_types::DiffError> {
        terminal.detail(&format!("Saving diff \"{}\"...", path.display()));
        self.diff.save(path)
    }
}

/// Load a solution document: read, require a string `version`, dispatch the
/// optional `type` through the registry, fall through to the generic
/// solution otherwise.
pub fn load_solution(
    path: &Path,
    registry: &SolutionRegistry,
    terminal: &Terminal,
) -> Result<Solution, ConfigError> {
    terminal.detail(&format!("Loading solution \"{}\"...", path.display()));

    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let root: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = fs::canonicalize(parent).map_err(|source| ConfigError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    terminal.detail(&format!("Absolute path: \"{}\"", dir.display()));

    let version = root
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::MissingField("version".into()))?;
    terminal.detail(&format!("Solution version: {version}"));

    match root.get("type").and_then(Value::as_str) {
        Some(kind) => {
            terminal.detail(&format!("Solution type: {kind}"));
            let factory = registry
                .get(kind)
                .ok_or_else(|| ConfigError::UnknownType(kind.to_string()))?;
            factory.new_solution(&root, &dir, terminal)
        }
        None => {
            terminal.detail("Solution type is not set. Default value is used.");
            Solution::from_document(&root, &dir, terminal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn write_solution(dir: &Path, document: &Value) {
        fs::write(
            dir.join(SOLUTION_FILENAME),
            serde_json::to_string_pretty(document).unwrap(),
        )
        .unwrap();
    }

    fn fixture() -> (tempfile::TempDir, Arc<Terminal>, SolutionRegistry) {
        let mut registry = SolutionRegistry::new();
        register_defaults(&mut registry);
        (
            tempfile::tempdir().unwrap(),
            Arc::new(Terminal::new(false)),
            registry,
        )
    }

    #[test]
    fn loads_a_minimal_solution() {
        let (dir, terminal, registry) = fixture();
        fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
        write_solution(
            dir.path(),
            &json!({
                "version": "1.0",
                "paths": { "scan": "src", "build": "build", "tmp": "build/tmp" },
                "files": ["a.c"],
                "builds": { "default": {} },
            }),
        );

        let solution =
            load_solution(&dir.path().join(SOLUTION_FILENAME), &registry, &terminal).unwrap();

        assert_eq!(solution.scan_roots.len(), 1);
        assert_eq!(solution.sources.len(), 1);
        assert!(solution.sources.contains_key("a.c"));
        assert!(solution.builds.contains_key("default"));
        assert!(solution.sources["a.c"].mtime > 0);
    }

    #[test]
    fn scan_accepts_string_or_array() {
        let (dir, terminal, _) = fixture();
        let root = json!({
            "paths": { "scan": ["src", "vendor"], "build": "b", "tmp": "t" },
            "files": [],
            "builds": {},
        });
        let solution = Solution::from_document(&root, dir.path(), &terminal).unwrap();
        assert_eq!(solution.scan_roots.len(), 2);
    }

    #[rstest::rstest]
    #[case::paths(json!({}), "paths")]
    #[case::scan(json!({ "paths": { "build": "b", "tmp": "t" } }), "paths.scan")]
    #[case::build(json!({ "paths": { "scan": "s", "tmp": "t" } }), "paths.build")]
    #[case::tmp(json!({ "paths": { "scan": "s", "build": "b" } }), "paths.tmp")]
    #[case::files(json!({ "paths": { "scan": "s", "build": "b", "tmp": "t" } }), "files")]
    #[case::builds(
        json!({ "paths": { "scan": "s", "build": "b", "tmp": "t" }, "files": [] }),
        "builds"
    )]
    fn missing_fields_carry_their_path(#[case] document: Value, #[case] expected: &str) {
        let (dir, terminal, _) = fixture();
        let err = Solution::from_document(&document, dir.path(), &terminal).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref field) if field == expected));
    }

    #[test]
    fn missing_listed_file_is_skipped_with_a_warning() {
        let (dir, terminal, _) = fixture();
        let root = json!({
            "paths": { "scan": "s", "build": "b", "tmp": "t" },
            "files": ["ghost.c"],
            "builds": {},
        });
        let solution = Solution::from_document(&root, dir.path(), &terminal).unwrap();
        assert!(solution.sources.is_empty());
    }

    #[test]
    fn version_is_required() {
        let (dir, terminal, registry) = fixture();
        write_solution(
            dir.path(),
            &json!({
                "paths": { "scan": "s", "build": "b", "tmp": "t" },
                "files": [],
                "builds": {},
            }),
        );

        let err =
            load_solution(&dir.path().join(SOLUTION_FILENAME), &registry, &terminal).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref field) if field == "version"));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let (dir, terminal, registry) = fixture();
        write_solution(
            dir.path(),
            &json!({
                "version": "1.0",
                "type": "fortran",
                "paths": { "scan": "s", "build": "b", "tmp": "t" },
                "files": [],
                "builds": {},
            }),
        );

        let err =
            load_solution(&dir.path().join(SOLUTION_FILENAME), &registry, &terminal).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType(ref kind) if kind == "fortran"));
    }

    #[test]
    fn registered_factory_handles_its_type() {
        struct UppercaseFactory;

        impl SolutionFactory for UppercaseFactory {
            fn name(&self) -> &str {
                "uppercase"
            }

            fn new_solution(
                &self,
                root: &Value,
                dir: &Path,
                terminal: &Terminal,
            ) -> Result<Solution, ConfigError> {
                Solution::from_document(root, dir, terminal)
            }
        }

        let (dir, terminal, mut registry) = fixture();
        registry.register(Box::new(UppercaseFactory));
        write_solution(
            dir.path(),
            &json!({
                "version": "1.0",
                "type": "uppercase",
                "paths": { "scan": "s", "build": "b", "tmp": "t" },
                "files": [],
                "builds": {},
            }),
        );

        assert!(load_solution(&dir.path().join(SOLUTION_FILENAME), &registry, &terminal).is_ok());
    }
}
