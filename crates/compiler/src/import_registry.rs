//! Mapping from SL module names to TL import strategies (§4.8).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStrategy {
    /// A TL-side helper provides the module; emit a direct alias to it.
    /// `helper` is the name passed to `transit_runtime::support_module`.
    TlRuntime { helper: String },
    /// The TL uses a native library; record the link dependency.
    CLibrary { link_name: String, headers: Vec<String> },
    /// Recursively transpile the referenced SL source file.
    CompileSl,
    /// The module exists only as symbol-routed inline dispatch; no
    /// standalone TL module is emitted for it.
    InlineOnly,
    /// Hard failure at compile time if actually referenced.
    Unsupported { reason: String },
}

/// Registry of known SL module -> TL strategy mappings, plus the running
/// set of modules that ended up skipped (unresolved or explicitly
/// unsupported) during a single `generate` call.
#[derive(Debug, Default)]
pub struct ImportRegistry {
    known: HashMap<String, ImportStrategy>,
    /// Modules referenced by the program but not found in `known` and not
    /// resolvable as a relative `compile_sl` file; §7 ResolutionFailed.
    skipped: HashMap<String, String>,
}

impl ImportRegistry {
    pub fn new() -> Self {
        let mut registry = ImportRegistry::default();
        registry.seed_defaults();
        registry
    }

    fn seed_defaults(&mut self) {
        for (name, helper) in [
            ("math", "math_ops"),
            ("random", "random_ops"),
            ("itertools", "iter_ops"),
            ("collections", "collections_ops"),
            ("json", "json_ops"),
            ("re", "regex_ops"),
            ("string", "string_ops"),
            ("functools", "functools_ops"),
        ] {
            self.known.insert(
                name.to_string(),
                ImportStrategy::TlRuntime {
                    helper: helper.to_string(),
                },
            );
        }
        self.known.insert(
            "os".to_string(),
            ImportStrategy::CLibrary {
                link_name: "c".to_string(),
                headers: vec!["unistd.h".to_string(), "stdlib.h".to_string()],
            },
        );
        self.known
            .insert("typing".to_string(), ImportStrategy::InlineOnly);
        self.known
            .insert("abc".to_string(), ImportStrategy::InlineOnly);
        self.known.insert(
            "ctypes".to_string(),
            ImportStrategy::Unsupported {
                reason: "raw FFI pointer manipulation has no TL-safe lowering".to_string(),
            },
        );
    }

    pub fn register(&mut self, name: impl Into<String>, strategy: ImportStrategy) {
        self.known.insert(name.into(), strategy);
    }

    /// Resolve a module name. `is_relative_source` is true when the name
    /// was already confirmed (by the import compiler) to be a sibling
    /// source file, in which case an unknown name still resolves to
    /// `CompileSl` rather than `Unsupported`.
    pub fn resolve(&mut self, name: &str, is_relative_source: bool) -> ImportStrategy {
        if let Some(strategy) = self.known.get(name) {
            return strategy.clone();
        }
        if is_relative_source {
            return ImportStrategy::CompileSl;
        }
        self.skipped
            .insert(name.to_string(), "module not found in import registry".to_string());
        ImportStrategy::Unsupported {
            reason: "unresolved module, treated as skipped".to_string(),
        }
    }

    pub fn mark_skipped(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.insert(name.into(), reason.into());
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains_key(name)
    }

    pub fn skipped_modules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.skipped.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Resolve a relative import's target path by dot-counting against the
/// importing file's directory, per §4.8.
///
/// `level` is the number of leading dots (`from . import x` -> 1,
/// `from .. import x` -> 2, ...). Level 0 is an absolute import and this
/// function is not used for it.
pub fn resolve_relative(
    source_dir: &std::path::Path,
    level: u32,
    module: Option<&str>,
) -> std::path::PathBuf {
    let mut dir = source_dir.to_path_buf();
    // One dot means "this directory"; each additional dot climbs one level.
    for _ in 1..level {
        dir.pop();
    }
    if let Some(module) = module {
        for segment in module.split('.') {
            dir.push(segment);
        }
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn known_module_resolves_to_its_registered_strategy() {
        let mut reg = ImportRegistry::new();
        assert_eq!(
            reg.resolve("math", false),
            ImportStrategy::TlRuntime {
                helper: "math_ops".to_string()
            }
        );
    }

    #[test]
    fn unknown_absolute_module_is_skipped() {
        let mut reg = ImportRegistry::new();
        let strategy = reg.resolve("numpy", false);
        assert!(matches!(strategy, ImportStrategy::Unsupported { .. }));
        assert!(reg.is_skipped("numpy"));
    }

    #[test]
    fn unknown_relative_module_compiles_as_sl_source() {
        let mut reg = ImportRegistry::new();
        assert_eq!(reg.resolve("sibling_utils", true), ImportStrategy::CompileSl);
        assert!(!reg.is_skipped("sibling_utils"));
    }

    #[test]
    fn single_dot_resolves_within_same_directory() {
        let dir = Path::new("/proj/pkg");
        let resolved = resolve_relative(dir, 1, Some("utils"));
        assert_eq!(resolved, Path::new("/proj/pkg/utils"));
    }

    #[test]
    fn double_dot_climbs_one_level() {
        let dir = Path::new("/proj/pkg/sub");
        let resolved = resolve_relative(dir, 2, Some("utils"));
        assert_eq!(resolved, Path::new("/proj/pkg/utils"));
    }
}
