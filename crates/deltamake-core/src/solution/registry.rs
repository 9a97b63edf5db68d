//! Factory registry for solution kinds.
//!
//! A solution document may carry a `type` field; the loader dispatches it
//! through this registry. Factories self-register at startup
//! (`register_defaults`), the generic solution being the fall-through when
//! no `type` is present.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::terminal::Terminal;

use super::{ConfigError, Solution};

/// Builds a `Solution` from a parsed document of one particular kind.
pub trait SolutionFactory: Send + Sync {
    /// The `type` value this factory answers to.
    fn name(&self) -> &str;

    /// Construct the solution model from the document root. `dir` is the
    /// parent directory of the document; all paths resolve against it.
    fn new_solution(
        &self,
        root: &Value,
        dir: &Path,
        terminal: &Terminal,
    ) -> Result<Solution, ConfigError>;
}

/// Name → factory mapping consulted by the loader.
#[derive(Default)]
pub struct SolutionRegistry {
    factories: HashMap<String, Box<dyn SolutionFactory>>,
}

impl SolutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn SolutionFactory>) {
        tracing::debug!("solution factory registered: {}", factory.name());
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SolutionFactory> {
        self.factories.get(name).map(Box::as_ref)
    }
}

/// The generic solution, registered under an explicit name so documents may
/// also spell `"type": "generic"`.
struct GenericFactory;

impl SolutionFactory for GenericFactory {
    fn name(&self) -> &str {
        "generic"
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

/// Populate a registry with the built-in factories.
pub fn register_defaults(registry: &mut SolutionRegistry) {
    registry.register(Box::new(GenericFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_the_generic_factory() {
        let mut registry = SolutionRegistry::new();
        register_defaults(&mut registry);
        assert!(registry.get("generic").is_some());
        assert!(registry.get("c/cpp").is_none());
    }
}
