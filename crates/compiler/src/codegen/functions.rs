//! Top-level function emission (§4.9 phase 8).
//!
//! Signature computation: parameters default to the integer type when
//! nothing else pins them down (annotation absent, no call-site evidence);
//! an allocator parameter is injected when `needs_allocator` says so; the
//! return type is wrapped in a result/error-union shape when
//! `needs_error_union` says so. Body-mode selection (ordinary / generator /
//! async state machine / trivial async) follows the call graph's
//! `is_generator` and `async_complexity` traits.

use crate::ast::FunctionDef;
use crate::call_graph::{AsyncComplexity, FunctionTraits};
use crate::class_registry::ClassRegistry;
use crate::mutation_analyzer::MutationAnalyzer;
use crate::type_inferrer::TypeInferrer;
use crate::types::Type;

use super::error::CodeGenResult;
use super::stmt::emit_block;
use super::state::CodeGenState;

pub fn emit_function(
    state: &mut CodeGenState,
    f: &FunctionDef,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
    traits: &FunctionTraits,
) -> CodeGenResult<()> {
    state.enter_function(&f.name);

    let mut params = Vec::new();
    if traits.needs_allocator(&f.name) {
        params.push("allocator: &Allocator".to_string());
    }
    for p in &f.args {
        let ty = resolve_param_type(&state.type_inferrer, &f.name, p);
        let default_suffix = match &p.default {
            Some(_) => " /* has default */",
            None => "",
        };
        params.push(format!("{}: {ty}{default_suffix}", p.name));
    }
    if let Some(vararg) = &f.vararg {
        params.push(format!("{vararg}: VarArgs"));
    }
    if let Some(kwarg) = &f.kwarg {
        params.push(format!("{kwarg}: KwArgs"));
    }

    let is_generator = traits.is_generator(&f.name);
    let complexity = traits.async_complexity(&f.name);
    let needs_error_union = traits.needs_error_union(&f.name);

    let declared_ret = state
        .type_inferrer
        .function_type(&f.name)
        .map(|sig| sig.ret.clone())
        .unwrap_or(Type::Unknown);

    let base_ret = if is_generator {
        format!("Sequence<{declared_ret}>")
    } else {
        declared_ret.to_string()
    };
    let ret_ty = if needs_error_union {
        format!("Result<{base_ret}>")
    } else {
        base_ret
    };

    let async_prefix = match complexity {
        AsyncComplexity::Trivial => "",
        AsyncComplexity::HasAwait | AsyncComplexity::HasIo => "async ",
    };

    state.write_line(&format!(
        "{async_prefix}fn {}({}) -> {ret_ty} {{",
        f.name,
        params.join(", ")
    ));
    state.indent();

    if is_generator {
        state.write_line(&format!("var __result: Sequence<{declared_ret}> = sequence_of([]);"));
    }

    emit_block(state, &f.body, classes, mutation)?;

    if is_generator {
        state.write_line("return __result;");
    }

    state.dedent();
    state.write_line("}");
    state.exit_function();
    Ok(())
}

fn resolve_param_type(inferrer: &TypeInferrer, function_name: &str, param: &crate::ast::Param) -> Type {
    if let Some(sig) = inferrer.function_type(function_name) {
        if let Some((_, ty)) = sig.params.iter().find(|(name, _)| name == &param.name) {
            if !matches!(ty, Type::Unknown) {
                return ty.clone();
            }
        }
    }
    // Phase 8's documented fallback: an unannotated, uninferred parameter
    // defaults to the integer type rather than staying `Unknown`.
    Type::Int
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Span, Stmt, StmtKind};
    use std::collections::HashSet;

    fn plain_function(name: &str) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            args: vec![Param { name: "x".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![Stmt::new(
                Span::default(),
                StmtKind::Return { value: Some(Expr::new(Span::default(), crate::ast::ExprKind::Name("x".into()))) },
            )],
            is_async: false,
            is_nested: false,
        }
    }

    use crate::ast::Expr;

    #[test]
    fn unannotated_parameter_defaults_to_int() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let f = plain_function("identity");
        let module = crate::ast::Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(f.clone()))],
        };
        let mut known = HashSet::new();
        known.insert("identity".to_string());
        let traits = crate::call_graph::build(&module, &known);
        emit_function(&mut state, &f, &classes, &mutation, &traits).unwrap();
        assert!(state.output.contains("x: int"));
    }

    #[test]
    fn function_that_raises_gets_a_result_return_type() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let body = vec![Stmt::new(
            Span::default(),
            StmtKind::Raise { exc: Some(Expr::new(Span::default(), crate::ast::ExprKind::Name("Err".into()))), cause: None },
        )];
        let f = FunctionDef {
            name: "boom".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: false,
        };
        let module = crate::ast::Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(f.clone()))],
        };
        let mut known = HashSet::new();
        known.insert("boom".to_string());
        let traits = crate::call_graph::build(&module, &known);
        emit_function(&mut state, &f, &classes, &mutation, &traits).unwrap();
        assert!(state.output.contains("-> Result<"));
    }
}
