//! Closure and lambda emission (§4.9 phase 10).
//!
//! Consumes a [`ClosurePlan`](crate::closure_lowering::ClosurePlan) built by
//! the dedicated analysis pass: each captured-variable closure gets a
//! generated record type (one field per capture) plus a `call` function
//! taking that record as an explicit first parameter; a closure with no
//! captures just becomes a plain function. Entries on the deferred queue are
//! re-emitted once their forward-referenced capture is finally bound --
//! this module only drains a queue the generator's phase-2 pass already
//! resolved ordering for, it doesn't reorder anything itself.

use crate::ast::FunctionDef;
use crate::class_registry::ClassRegistry;
use crate::closure_lowering::ClosureInfo;
use crate::mutation_analyzer::MutationAnalyzer;

use super::error::CodeGenResult;
use super::stmt::emit_block;
use super::state::CodeGenState;

pub fn emit_closure(
    state: &mut CodeGenState,
    info: &ClosureInfo,
    nested: &FunctionDef,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let record_name = format!("{}__{}__Capture", info.enclosing_function, info.function_name);

    if info.needs_record_type() {
        state.write_line(&format!("record {record_name} {{"));
        state.indent();
        for capture in &info.captures {
            let field_ty = if capture.mutable { "Unknown /* mut */" } else { "Unknown" };
            state.write_line(&format!("{}: {field_ty},", capture.name));
        }
        state.dedent();
        state.write_line("}");
    }

    let fn_name = format!("{}__{}", info.enclosing_function, info.function_name);
    state.enter_function(&fn_name);

    let mut params = Vec::new();
    if info.needs_record_type() {
        params.push(format!("captured: {record_name}"));
    }
    for p in &nested.args {
        params.push(format!("{}: Unknown", p.name));
    }

    state.write_line(&format!("fn {fn_name}({}) -> Unknown {{", params.join(", ")));
    state.indent();
    for capture in &info.captures {
        state.write_line(&format!("let {0} = captured.{0};", capture.name));
    }
    emit_block(state, &nested.body, classes, mutation)?;
    state.dedent();
    state.write_line("}");
    state.exit_function();

    if info.needs_record_type() {
        let ctor_fields: Vec<String> = info
            .captures
            .iter()
            .map(|c| format!("{0}: {0}", c.name))
            .collect();
        state.write_line(&format!(
            "fn {}__{}__make({}) -> {record_name} {{",
            info.enclosing_function,
            info.function_name,
            info.captures
                .iter()
                .map(|c| format!("{}: Unknown", c.name))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        state.indent();
        state.write_line(&format!("return {record_name} {{ {} }};", ctor_fields.join(", ")));
        state.dedent();
        state.write_line("}");
    }

    Ok(())
}

/// Drains `pending_lambda_structs` accumulated by inline `lambda` expression
/// emission (`codegen::expr::emit_expr`'s `Lambda` arm), prepending a
/// matching wrapper-struct definition for each one collected during
/// expression emission. Lambdas have no name to key a `ClosureInfo` on, so
/// they get a minimal anonymous-callable wrapper instead of going through
/// the named-closure capture-record path.
pub fn drain_pending_lambda_structs(state: &mut CodeGenState) {
    let pending = std::mem::take(&mut state.pending_lambda_structs);
    for name in pending {
        state.write_line(&format!("record {name} {{ body: Callable }}"));
        state.write_line(&format!("fn {name}__new(body: Callable) -> {name} {{ return {name} {{ body: body }}; }}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Span, Stmt, StmtKind};
    use crate::closure_lowering::CaptureInfo;

    #[test]
    fn closure_with_a_capture_gets_a_record_and_constructor() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let info = ClosureInfo {
            function_name: "add".into(),
            enclosing_function: "make".into(),
            captures: vec![CaptureInfo { name: "n".into(), mutable: false }],
            is_returned: true,
        };
        let nested = FunctionDef {
            name: "add".into(),
            args: vec![Param { name: "x".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![Stmt::new(Span::default(), StmtKind::Pass)],
            is_async: false,
            is_nested: true,
        };
        emit_closure(&mut state, &info, &nested, &classes, &mutation).unwrap();
        assert!(state.output.contains("record make__add__Capture"));
        assert!(state.output.contains("make__add__make"));
    }

    #[test]
    fn closure_without_captures_skips_the_record() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let info = ClosureInfo {
            function_name: "constant_fn".into(),
            enclosing_function: "factory".into(),
            captures: vec![],
            is_returned: true,
        };
        let nested = FunctionDef {
            name: "constant_fn".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![Stmt::new(Span::default(), StmtKind::Pass)],
            is_async: false,
            is_nested: true,
        };
        emit_closure(&mut state, &info, &nested, &classes, &mutation).unwrap();
        assert!(!state.output.contains("record"));
    }
}
