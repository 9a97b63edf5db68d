//! `BuildSpec` — typed accessors over the raw per-build parameter bag.
//!
//! A build in a solution document is a heterogeneous JSON object: strings,
//! arrays, nested objects, everything optional. Rather than flattening it
//! into a struct up front, the bag is kept as a `serde_json::Value` tree and
//! read through accessors that apply the documented defaults.

use serde_json::Value;

/// What a build produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A linked executable (`type: "exec"`, the default).
    Exec,
    /// A static archive (`type: "lib"`).
    Lib,
}

/// One named build: the build name plus its raw parameter bag.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    name: String,
    params: Value,
}

impl BuildSpec {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_kind(&self) -> OutputKind {
        match self.params.get("type").and_then(Value::as_str) {
            Some("lib") => OutputKind::Lib,
            _ => OutputKind::Exec,
        }
    }

    pub fn outname(&self) -> &str {
        self.str_or("outname", "out")
    }

    pub fn compiler(&self) -> &str {
        self.str_or("compiler", "g++")
    }

    pub fn compiler_flags(&self) -> Option<&str> {
        self.params.get("compilerFlags").and_then(Value::as_str)
    }

    pub fn linker(&self) -> &str {
        self.str_or("linker", "g++")
    }

    pub fn linker_flags(&self) -> Option<&str> {
        self.params.get("linkerFlags").and_then(Value::as_str)
    }

    pub fn archiver(&self) -> &str {
        self.str_or("archiver", "ar")
    }

    /// `paths.include[]` — include directories passed as `-I`.
    pub fn include_paths(&self) -> Vec<&str> {
        self.nested_str_array("paths", "include")
    }

    /// `paths.lib[]` — library directories passed as `-L`.
    pub fn lib_paths(&self) -> Vec<&str> {
        self.nested_str_array("paths", "lib")
    }

    /// `defines[]` — preprocessor definitions passed as `-D`.
    pub fn defines(&self) -> Vec<&str> {
        self.str_array("defines")
    }

    /// `staticLibs[]` — archives appended verbatim to the link line.
    pub fn static_libs(&self) -> Vec<&str> {
        self.str_array("staticLibs")
    }

    /// Shell hook run synchronously before planning this build.
    pub fn pre(&self) -> Option<&str> {
        self.params.get("pre").and_then(Value::as_str)
    }

    /// Shell hook run synchronously after the link/archive step.
    pub fn post(&self) -> Option<&str> {
        self.params.get("post").and_then(Value::as_str)
    }

    /// Sub-solution references: codename → build name within that solution.
    ///
    /// The build name defaults to `default` when the sub-entry does not
    /// carry a `build` field.
    pub fn sub_builds(&self) -> Vec<(String, String)> {
        let Some(subs) = self.params.get("solutions").and_then(Value::as_object) else {
            return Vec::new();
        };

        subs.iter()
            .map(|(code, params)| {
                let build = params
                    .get("build")
                    .and_then(Value::as_str)
                    .unwrap_or("default");
                (code.clone(), build.to_string())
            })
            .collect()
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn str_array(&self, key: &str) -> Vec<&str> {
        self.params
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn nested_str_array(&self, outer: &str, inner: &str) -> Vec<&str> {
        self.params
            .get(outer)
            .and_then(|o| o.get(inner))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::compiler(|s: &BuildSpec| s.compiler().to_string(), "g++")]
    #[case::linker(|s: &BuildSpec| s.linker().to_string(), "g++")]
    #[case::archiver(|s: &BuildSpec| s.archiver().to_string(), "ar")]
    #[case::outname(|s: &BuildSpec| s.outname().to_string(), "out")]
    fn empty_bag_yields_defaults(
        #[case] get: fn(&BuildSpec) -> String,
        #[case] expected: &str,
    ) {
        let spec = BuildSpec::new("default", json!({}));
        assert_eq!(get(&spec), expected);
    }

    #[test]
    fn output_kind_defaults_to_exec() {
        let spec = BuildSpec::new("default", json!({}));
        assert_eq!(spec.output_kind(), OutputKind::Exec);
        let spec = BuildSpec::new("default", json!({ "type": "lib" }));
        assert_eq!(spec.output_kind(), OutputKind::Lib);
        // Unrecognized kinds fall back to exec.
        let spec = BuildSpec::new("default", json!({ "type": "dylib" }));
        assert_eq!(spec.output_kind(), OutputKind::Exec);
    }

    #[test]
    fn path_sets_and_defines() {
        let spec = BuildSpec::new(
            "default",
            json!({
                "paths": { "include": ["inc", "vendor/inc"], "lib": ["lib"] },
                "defines": ["NDEBUG", "VERSION=3"],
            }),
        );
        assert_eq!(spec.include_paths(), vec!["inc", "vendor/inc"]);
        assert_eq!(spec.lib_paths(), vec!["lib"]);
        assert_eq!(spec.defines(), vec!["NDEBUG", "VERSION=3"]);
        assert!(spec.static_libs().is_empty());
    }

    #[test]
    fn sub_builds_default_to_default() {
        let spec = BuildSpec::new(
            "default",
            json!({
                "solutions": {
                    "engine": {},
                    "tools": { "build": "release" },
                },
            }),
        );
        let mut subs = spec.sub_builds();
        subs.sort();
        assert_eq!(
            subs,
            vec![
                ("engine".to_string(), "default".to_string()),
                ("tools".to_string(), "release".to_string()),
            ]
        );
    }
}
