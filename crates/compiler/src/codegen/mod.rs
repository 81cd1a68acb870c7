//! Code generator orchestration (§4.9).
//!
//! `generate` runs the ten phases in the order the specification lays them
//! out: module pre-scan, class-registry population, mutation + lifetime
//! analysis, type inference, the function-trait call graph, import
//! collection, then emission (classes, functions, closures, entry point).
//! Everything upstream of emission is read-only analysis over the AST;
//! nothing here mutates the `Module` the caller handed in.

mod classes;
mod closures;
pub mod error;
mod expr;
mod functions;
pub mod state;
mod stmt;

use std::collections::HashSet;
use std::path::Path;

use crate::ast::{Module, Stmt, StmtKind};
use crate::call_graph;
use crate::class_registry::ClassRegistry;
use crate::closure_lowering;
use crate::config::{EmitMode, GeneratorConfig};
use crate::import_compiler::{self, ImportPlan, ModuleLoader};
use crate::import_registry::ImportRegistry;
use crate::lifetime_analyzer::LifetimeAnalyzer;
use crate::mutation_analyzer::MutationAnalyzer;
use crate::module_analyzer;
use crate::type_inferrer::TypeInferrer;

pub use error::{CodeGenError, CodeGenResult};
pub use state::CodeGenState;

/// Everything `generate` produces: the emitted TL source text plus the
/// bookkeeping a caller may want to inspect (skipped modules, debug-info
/// sidecar, native link requirements).
#[derive(Debug)]
pub struct GeneratedProgram {
    pub source: String,
    pub import_plan: ImportPlan,
    pub debug_line_map: Vec<(u32, u32)>,
    pub interned_string_count: usize,
}

pub fn generate(
    module: &Module,
    config: &GeneratorConfig,
    loader: &dyn ModuleLoader,
) -> CodeGenResult<GeneratedProgram> {
    // Phase 1: module-wide pre-scan.
    let summary = module_analyzer::analyze(module);

    // Class registry (§4.9 phase 4).
    let mut class_registry = crate::class_registry::ClassRegistry::new();
    for stmt in &module.body {
        if let StmtKind::ClassDef(c) = &stmt.kind {
            classes::register_class(&mut class_registry, c)
                .map_err(|e| CodeGenError::InternalInvariant(e.to_string()))?;
        }
    }

    // Mutation + lifetime analysis (§4.4/§4.5).
    let mut mutation = MutationAnalyzer::new();
    mutation.analyze(module);
    let mut lifetime = LifetimeAnalyzer::new();
    lifetime.analyze(module);

    // Flow-sensitive type inference (§4.3; needs class fields for attribute
    // access, so it runs after class registration).
    let mut type_inferrer = TypeInferrer::new();
    type_inferrer.analyze(module, &class_registry);

    // Function-trait call graph (§4.6).
    let mut known_functions = HashSet::new();
    collect_function_names(&module.body, &mut known_functions);
    let traits = call_graph::build(module, &known_functions);
    classes::backfill_error_unions(&mut class_registry, &traits);

    // Closure-wrapper pre-compile (§4.9 phase 3), feeding the capture-aware
    // emission below.
    let closure_plan = closure_lowering::analyze(module, &mutation);

    // Import collection & recursive pre-compilation (§4.8; §4.9 phase 2). A
    // caller-supplied `source_dir` overrides the directory inferred from
    // `module.source_path`, for callers whose AST was read from a location
    // (a cache, a pipe) that doesn't reflect where sibling modules live.
    let mut import_registry = ImportRegistry::new();
    let resolution_path = match &config.source_dir {
        Some(dir) => dir.join(
            module
                .source_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("module.sl")),
        ),
        None => module.source_path.clone(),
    };
    let import_plan = import_compiler::process(module, &resolution_path, &mut import_registry, loader);

    // Emission (phases 4-10 of §4.9).
    let mut state = CodeGenState::new();
    state.class_registry = class_registry;
    state.import_registry = import_registry;
    state.type_inferrer = type_inferrer;
    state.debug_info.enabled = config.debug;

    if summary.needs_runtime_helper {
        state.write_line("import runtime_support;");
    }

    // Phase 6: module-scope global pre-declaration. Names reached via a
    // `global` statement in some function body need a binding at module
    // scope before any function that reads them is emitted (I1); the Type
    // Inferrer keyed its `module`-scope findings under the same names. A
    // `global` declaration exists to let a function assign into the module
    // slot, so the slot itself is always mutable regardless of what the
    // Mutation Analyzer recorded against the declaring function's own scope.
    let mut global_names: Vec<&String> = summary.global_names.iter().collect();
    global_names.sort();
    for name in global_names {
        let ty = state.type_inferrer.global_type(name);
        state.write_line(&format!("var {name}: {ty} = {ty}::default();"));
        state.symbol_table.declare(name, ty, true);
    }

    // Phase 7: class definitions.
    for stmt in &module.body {
        if let StmtKind::ClassDef(c) = &stmt.kind {
            classes::emit_class(&mut state, c, &mutation)?;
        }
    }

    let classes_snapshot = state.class_registry.clone();

    let nested_defs = collect_nested_defs(&module.body);
    for closure in &closure_plan.closures {
        if let Some(nested) = nested_defs.get(&(closure.enclosing_function.clone(), closure.function_name.clone())) {
            closures::emit_closure(&mut state, closure, nested, &classes_snapshot, &mutation)?;
        }
    }

    // Phase 8: function definitions.
    for stmt in &module.body {
        if let StmtKind::FunctionDef(f) = &stmt.kind {
            if f.is_nested {
                continue;
            }
            if import_plan.skipped_functions.contains(&f.name) {
                emit_stub(&mut state, &f.name);
            } else {
                functions::emit_function(&mut state, f, &classes_snapshot, &mutation, &traits)?;
            }
        }
    }

    // Phase 9: entry point. Top-level executable statements (assignments,
    // bare expression statements, control flow -- anything that isn't a
    // `ClassDef`/`FunctionDef`/import) have no function of their own to live
    // in, so they're folded into the entry function itself; a module with
    // none still gets a no-op entry (P9, boundary behaviour).
    let top_level_stmts = collect_top_level_executable(&module.body);
    emit_entry_point(
        &mut state,
        config,
        &classes_snapshot,
        &mutation,
        &top_level_stmts,
        summary.has_top_level_main,
    )?;

    // Phase 10: lambda/closure wrapper emission, for the ad-hoc wrapper
    // structs expression emission discovered along the way. Runs last since
    // entry-point emission (phase 9) can itself contain inline `lambda`
    // expressions that still need to queue a wrapper struct.
    closures::drain_pending_lambda_structs(&mut state);

    Ok(GeneratedProgram {
        source: state.output,
        import_plan,
        debug_line_map: state.debug_info.line_map,
        interned_string_count: state.interned_strings.len(),
    })
}

/// Top-level statements that are neither declarations (`ClassDef`,
/// `FunctionDef`) nor import bookkeeping -- the statements phase 9 folds
/// into the entry function (script mode) / module initializer (module
/// mode) rather than dropping.
fn collect_top_level_executable(body: &[Stmt]) -> Vec<Stmt> {
    body.iter()
        .filter(|stmt| {
            !matches!(
                stmt.kind,
                StmtKind::ClassDef(_)
                    | StmtKind::FunctionDef(_)
                    | StmtKind::Import { .. }
                    | StmtKind::ImportFrom { .. }
            )
        })
        .cloned()
        .collect()
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

/// `(enclosing_function_name, nested_function_name) -> FunctionDef`, built
/// once so closure emission doesn't need to re-walk the tree per closure.
fn collect_nested_defs(body: &[Stmt]) -> std::collections::HashMap<(String, String), crate::ast::FunctionDef> {
    let mut out = std::collections::HashMap::new();
    for stmt in body {
        if let StmtKind::FunctionDef(f) = &stmt.kind {
            walk_for_nested(f, &mut out);
        }
    }
    out
}

fn walk_for_nested(
    f: &crate::ast::FunctionDef,
    out: &mut std::collections::HashMap<(String, String), crate::ast::FunctionDef>,
) {
    for stmt in &f.body {
        if let StmtKind::FunctionDef(nested) = &stmt.kind {
            if nested.is_nested {
                out.insert((f.name.clone(), nested.name.clone()), nested.clone());
                walk_for_nested(nested, out);
            }
        }
    }
}

fn emit_stub(state: &mut CodeGenState, name: &str) {
    state.write_line(&format!("fn {name}(...) -> Unknown {{"));
    state.indent();
    state.write_line("unsupported(\"transitively depends on a module that could not be resolved\");");
    state.dedent();
    state.write_line("}");
}

/// Phase 9. Script mode always gets exactly one entry function (P9); an
/// empty or main-less module still gets a no-op `__entry` rather than
/// producing no output at all. Module mode has no entry function of its own
/// (P9), but top-level statements still need somewhere to run, so they're
/// folded into an exported `__init_module` the module's consumer is
/// expected to call once before relying on module-level state (§9 "global
/// mutable state ... initialised on first access in module mode").
fn emit_entry_point(
    state: &mut CodeGenState,
    config: &GeneratorConfig,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
    top_level: &[Stmt],
    has_main: bool,
) -> CodeGenResult<()> {
    match config.mode {
        EmitMode::Script => {
            state.write_line("fn __entry() {");
            state.indent();
            stmt::emit_block(state, top_level, classes, mutation)?;
            if has_main {
                state.write_line("main();");
            }
            state.dedent();
            state.write_line("}");
        }
        EmitMode::Module => {
            if !top_level.is_empty() {
                state.write_line("fn __init_module() {");
                state.indent();
                stmt::emit_block(state, top_level, classes, mutation)?;
                state.dedent();
                state.write_line("}");
                state.write_line("export __init_module;");
            }
            state.write_line("export main;");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Constant, Expr, ExprKind, FunctionDef, Param, Span};

    struct NoSiblingLoader;
    impl ModuleLoader for NoSiblingLoader {
        fn load(&self, path: &Path) -> Result<Module, crate::import_compiler::ImportError> {
            Err(crate::import_compiler::ImportError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no fixture module"),
            })
        }
    }

    fn greet_module() -> Module {
        let body = vec![Stmt::new(
            Span::default(),
            StmtKind::Return {
                value: Some(Expr::new(Span::default(), ExprKind::Constant(Constant::Int(1)))),
            },
        )];
        let f = FunctionDef {
            name: "main".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: false,
        };
        Module {
            source_path: "m.sl".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(f))],
        }
    }

    #[test]
    fn script_mode_with_a_main_function_gets_an_entry_point() {
        let module = greet_module();
        let config = GeneratorConfig::new();
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("fn __entry()"));
        assert!(result.source.contains("fn main("));
    }

    #[test]
    fn module_mode_exports_main_instead_of_wrapping_it() {
        let module = greet_module();
        let config = GeneratorConfig::new().with_mode(EmitMode::Module);
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("export main;"));
        assert!(!result.source.contains("__entry"));
    }

    #[test]
    fn source_dir_override_is_used_over_the_module_path_parent() {
        struct RecordingLoader {
            seen: std::cell::RefCell<Vec<std::path::PathBuf>>,
        }
        impl ModuleLoader for RecordingLoader {
            fn load(&self, path: &Path) -> Result<Module, crate::import_compiler::ImportError> {
                self.seen.borrow_mut().push(path.to_path_buf());
                Err(crate::import_compiler::ImportError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no fixture module"),
                })
            }
        }

        let import = Stmt::new(
            Span::default(),
            StmtKind::ImportFrom {
                module: Some("sibling".into()),
                level: 1,
                names: vec![],
            },
        );
        let module = Module {
            source_path: "somewhere/else/m.sl".into(),
            body: vec![import],
        };
        let config = GeneratorConfig::new().with_source_dir("actual/source/dir");
        let loader = RecordingLoader { seen: std::cell::RefCell::new(Vec::new()) };
        generate(&module, &config, &loader).unwrap();
        assert!(loader
            .seen
            .borrow()
            .iter()
            .all(|p| p.starts_with("actual/source/dir")));
    }

    #[test]
    fn empty_module_still_gets_a_no_op_entry_point() {
        let module = Module {
            source_path: "m.sl".into(),
            body: vec![],
        };
        let config = GeneratorConfig::new();
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("fn __entry()"));
        assert!(result.source.contains("pass;"));
        assert!(!result.source.contains("main()"));
    }

    #[test]
    fn top_level_statements_with_no_function_are_folded_into_the_entry_point() {
        // `xs = [1, 2, 3]; print(xs)`, entirely top-level, no `main`.
        let assign = Stmt::new(
            Span::default(),
            StmtKind::Assign {
                targets: vec![Expr::new(Span::default(), ExprKind::Name("xs".into()))],
                value: Expr::new(
                    Span::default(),
                    ExprKind::List(vec![
                        Expr::new(Span::default(), ExprKind::Constant(Constant::Int(1))),
                        Expr::new(Span::default(), ExprKind::Constant(Constant::Int(2))),
                        Expr::new(Span::default(), ExprKind::Constant(Constant::Int(3))),
                    ]),
                ),
            },
        );
        let print_call = Stmt::new(
            Span::default(),
            StmtKind::Expr(Expr::new(
                Span::default(),
                ExprKind::Call {
                    func: Box::new(Expr::new(Span::default(), ExprKind::Name("print".into()))),
                    args: vec![Expr::new(Span::default(), ExprKind::Name("xs".into()))],
                    keywords: vec![],
                },
            )),
        );
        let module = Module {
            source_path: "m.sl".into(),
            body: vec![assign, print_call],
        };
        let config = GeneratorConfig::new();
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("fn __entry()"));
        assert!(result.source.contains("xs ="));
        assert!(!result.source.contains("main()"));
    }

    #[test]
    fn global_declared_name_is_pre_declared_at_module_scope() {
        // `def bump(): global counter; counter = counter + 1`
        let body = vec![
            Stmt::new(Span::default(), StmtKind::Global { names: vec!["counter".to_string()] }),
            Stmt::new(
                Span::default(),
                StmtKind::Assign {
                    targets: vec![Expr::new(Span::default(), ExprKind::Name("counter".into()))],
                    value: Expr::new(
                        Span::default(),
                        ExprKind::BinOp {
                            left: Box::new(Expr::new(Span::default(), ExprKind::Name("counter".into()))),
                            op: crate::ast::BinOp::Add,
                            right: Box::new(Expr::new(Span::default(), ExprKind::Constant(Constant::Int(1)))),
                        },
                    ),
                },
            ),
        ];
        let f = FunctionDef {
            name: "bump".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: false,
        };
        let module = Module {
            source_path: "m.sl".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(f))],
        };
        let config = GeneratorConfig::new();
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("var counter: int = int::default();"));
        assert!(result.source.contains("counter = (counter + 1);"));
    }

    #[test]
    fn unresolved_sibling_import_produces_a_stub_function() {
        let import = Stmt::new(
            Span::default(),
            StmtKind::ImportFrom {
                module: Some("sibling".into()),
                level: 0,
                names: vec![],
            },
        );
        let body = vec![import];
        let f = FunctionDef {
            name: "uses_sibling".into(),
            args: vec![Param { name: "x".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: false,
        };
        let module = Module {
            source_path: "m.sl".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(f))],
        };
        let config = GeneratorConfig::new();
        let result = generate(&module, &config, &NoSiblingLoader).unwrap();
        assert!(result.source.contains("fn uses_sibling(...)"));
        assert!(result.source.contains("unsupported("));
    }
}
