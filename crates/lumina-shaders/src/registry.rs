//! Fragment registry
//!
//! Maps include names to raw GLSL source text. Populated at startup from the
//! embedded source set (and optionally a directory of `*.glsl` files), then
//! read-mostly for the rest of its life.

use crate::resolver::{self, Directive};
use lumina_core::{Result, ShaderError};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Named, immutable GLSL source fragments
#[derive(Debug, Clone)]
pub struct FragmentRegistry {
    fragments: HashMap<String, String>,
    allow_overwrite: bool,
}

impl FragmentRegistry {
    /// Create an empty registry that allows replacing fragments
    pub fn new() -> Self {
        Self::with_policy(true)
    }

    /// Create an empty registry with an explicit overwrite policy
    pub fn with_policy(allow_overwrite: bool) -> Self {
        Self {
            fragments: HashMap::new(),
            allow_overwrite,
        }
    }

    /// Register a fragment, replacing any previous text under the same name
    /// when the policy allows it.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.fragments.contains_key(&name) {
            if !self.allow_overwrite {
                return Err(ShaderError::DuplicateName(name));
            }
            debug!("Replacing fragment '{}'", name);
        }
        self.fragments.insert(name, text.into());
        Ok(())
    }

    /// Put back `previous` as the text of `name`, or remove `name` when there
    /// was none. Bypasses the overwrite policy.
    pub fn restore(&mut self, name: &str, previous: Option<String>) {
        match previous {
            Some(text) => {
                self.fragments.insert(name.to_string(), text);
            }
            None => {
                self.fragments.remove(name);
            }
        }
    }

    /// Source text of a fragment
    pub fn lookup(&self, name: &str) -> Result<&str> {
        self.fragments
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| ShaderError::UnknownFragment {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fragments.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Register every `*.glsl` file in `dir`, named by file stem.
    ///
    /// Returns the registered names in sorted order.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "glsl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            self.register(name, text)?;
            loaded.push(name.to_string());
        }

        info!("Loaded {} fragments from {}", loaded.len(), dir.display());
        Ok(loaded)
    }

    /// Walk the include graph rooted at `name` without expanding any text.
    ///
    /// Returns every fragment reachable from `name` (including itself), or the
    /// first unknown or cyclic include found.
    pub fn check_includes(&self, name: &str) -> Result<BTreeSet<String>> {
        let mut visited = BTreeSet::new();
        let mut stack = Vec::new();
        self.walk(name, &mut stack, &mut visited)?;
        Ok(visited)
    }

    fn walk(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        visited: &mut BTreeSet<String>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ShaderError::CyclicInclude { cycle });
        }
        let text = self.lookup(name)?;
        if !visited.insert(name.to_string()) {
            // Already proven acyclic below this node.
            return Ok(());
        }

        stack.push(name.to_string());
        for (index, line) in text.lines().enumerate() {
            if let Some(directive) = resolver::parse_directive(name, index + 1, line)? {
                let Directive { target, .. } = directive;
                self.walk(&target, stack, visited)?;
            }
        }
        stack.pop();
        Ok(())
    }
}

impl Default for FragmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FragmentRegistry::new();
        registry.register("attributes", "in vec3 VertexPosition;\n").unwrap();
        assert_eq!(
            registry.lookup("attributes").unwrap(),
            "in vec3 VertexPosition;\n"
        );
        assert!(registry.contains("attributes"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = FragmentRegistry::new();
        assert!(matches!(
            registry.lookup("missing"),
            Err(ShaderError::UnknownFragment { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_overwrite_policy() {
        let mut registry = FragmentRegistry::new();
        registry.register("a", "one").unwrap();
        registry.register("a", "two").unwrap();
        assert_eq!(registry.lookup("a").unwrap(), "two");

        let mut strict = FragmentRegistry::with_policy(false);
        strict.register("a", "one").unwrap();
        assert!(matches!(
            strict.register("a", "two"),
            Err(ShaderError::DuplicateName(name)) if name == "a"
        ));
        assert_eq!(strict.lookup("a").unwrap(), "one");
    }

    #[test]
    fn test_check_includes_collects_dependencies() {
        let mut registry = FragmentRegistry::new();
        registry.register("root", "#include <a>\n#include <b> [2]\n").unwrap();
        registry.register("a", "#include <b>\n").unwrap();
        registry.register("b", "x{i}").unwrap();

        let deps = registry.check_includes("root").unwrap();
        let deps: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
        assert_eq!(deps, vec!["a", "b", "root"]);
    }

    #[test]
    fn test_check_includes_detects_cycle() {
        let mut registry = FragmentRegistry::new();
        registry.register("a", "#include <b>\n").unwrap();
        registry.register("b", "#include <a>\n").unwrap();

        match registry.check_includes("a") {
            Err(ShaderError::CyclicInclude { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_restore() {
        let mut registry = FragmentRegistry::with_policy(false);
        registry.register("a", "one").unwrap();
        registry.restore("a", Some("zero".to_string()));
        assert_eq!(registry.lookup("a").unwrap(), "zero");

        registry.restore("a", None);
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fog.glsl"), "uniform vec3 FogColor;\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = FragmentRegistry::new();
        let loaded = registry.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, vec!["fog".to_string()]);
        assert_eq!(registry.lookup("fog").unwrap(), "uniform vec3 FogColor;\n");
        assert!(!registry.contains("notes"));
    }
}
