//! Transit: an AOT transpiler core that type-infers a dynamically-typed,
//! indentation-delimited scripting language into statically-typed TL source.
//!
//! This crate is the "core" only -- the lexer/parser that produces the
//! [`ast::Module`] this crate consumes lives outside it, same for the
//! notebook combiner, the on-disk artifact cache, and the invocation of the
//! external TL toolchain. [`compile_ast_file`] wires up the one piece this
//! crate does own a concrete implementation of: reading a pre-parsed AST
//! back off disk for callers (like the `transitc` binary) that don't carry
//! their own frontend.
//!
//! # Extending the generator
//!
//! External callers drive [`generate`] directly with their own
//! [`ModuleLoader`] and [`ImportRegistry`] when they need a different
//! sibling-resolution policy than [`JsonModuleLoader`]:
//!
//! ```rust,ignore
//! use transit::{generate, GeneratorConfig, ImportRegistry, JsonModuleLoader};
//!
//! let module = /* supplied by your own frontend */;
//! let config = GeneratorConfig::new().with_debug(true);
//! let program = generate(&module, &config, &JsonModuleLoader)?;
//! println!("{}", program.source);
//! ```

pub mod ast;
pub mod builtins;
pub mod call_graph;
pub mod class_registry;
pub mod closure_lowering;
pub mod codegen;
pub mod config;
pub mod import_compiler;
pub mod import_registry;
pub mod lifetime_analyzer;
pub mod module_analyzer;
pub mod mutation_analyzer;
pub mod symbol_table;
pub mod type_inferrer;
pub mod types;

pub use ast::Module;
pub use class_registry::{ClassInfo, ClassRegistry, ClassRegistryError, MethodInfo};
pub use codegen::{generate, CodeGenError, CodeGenResult, GeneratedProgram};
pub use config::{CInteropContext, DebugInfoWriter, EmitMode, GeneratorConfig, Target};
pub use import_compiler::{ImportError, ImportPlan, ModuleLoader};
pub use import_registry::{ImportRegistry, ImportStrategy};
pub use types::{Signature, Type};

use std::fs;
use std::path::{Path, PathBuf};

/// Reads a sibling module's pre-parsed AST back off disk.
///
/// The lexer/parser is an external collaborator (see [`ast`]'s module
/// doc), so this crate has no way to turn SL source text into a [`Module`]
/// on its own. What it can do is agree on an interchange format for
/// already-parsed trees: the external frontend writes each module's AST as
/// JSON next to the source file, and `JsonModuleLoader` reads it back.
/// Given an import path resolved to `foo.sl`, it looks for `foo.json`.
pub struct JsonModuleLoader;

impl ModuleLoader for JsonModuleLoader {
    fn load(&self, path: &Path) -> Result<Module, ImportError> {
        let json_path = path.with_extension("json");
        let text = fs::read_to_string(&json_path).map_err(|source| ImportError::Io {
            path: json_path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ImportError::Parse {
            path: json_path,
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to read AST file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not contain a valid AST: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error(transparent)]
    CodeGen(#[from] CodeGenError),
}

/// Reads the JSON-encoded AST at `ast_path`, runs it through [`generate`]
/// with `config`, and returns the generated program.
///
/// Sibling `compile_sl` imports are resolved with [`JsonModuleLoader`],
/// looking for a `.json` file next to each resolved `.sl` path.
pub fn compile_ast_file(
    ast_path: &Path,
    config: &GeneratorConfig,
) -> Result<GeneratedProgram, DriverError> {
    let text = fs::read_to_string(ast_path).map_err(|source| DriverError::Io {
        path: ast_path.to_path_buf(),
        source,
    })?;
    let module: Module = serde_json::from_str(&text).map_err(|e| DriverError::Malformed {
        path: ast_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let program = generate(&module, config, &JsonModuleLoader)?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Span, Stmt, StmtKind};

    #[test]
    fn compile_ast_file_reads_json_and_generates() {
        let dir = tempfile::tempdir().unwrap();
        let ast_path = dir.path().join("m.json");
        let module = Module {
            source_path: dir.path().join("m.sl"),
            body: vec![Stmt::new(Span::default(), StmtKind::Pass)],
        };
        fs::write(&ast_path, serde_json::to_string(&module).unwrap()).unwrap();

        let program = compile_ast_file(&ast_path, &GeneratorConfig::new()).unwrap();
        assert!(program.import_plan.skipped_modules.is_empty());
    }

    #[test]
    fn compile_ast_file_reports_io_error_for_missing_file() {
        let err = compile_ast_file(Path::new("/nonexistent/m.json"), &GeneratorConfig::new())
            .unwrap_err();
        assert!(matches!(err, DriverError::Io { .. }));
    }

    #[test]
    fn json_module_loader_round_trips_a_sibling_module() {
        let dir = tempfile::tempdir().unwrap();
        let sibling = Module {
            source_path: dir.path().join("sibling.sl"),
            body: vec![Stmt::new(Span::default(), StmtKind::Pass)],
        };
        fs::write(
            dir.path().join("sibling.json"),
            serde_json::to_string(&sibling).unwrap(),
        )
        .unwrap();

        let loaded = JsonModuleLoader.load(&dir.path().join("sibling.sl")).unwrap();
        assert_eq!(loaded.body.len(), 1);
    }
}
