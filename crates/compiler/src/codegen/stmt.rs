//! Statement emission (§4.9 "Statement emission").
//!
//! Each `emit_*` function assumes the symbol table, mutation analysis and
//! lifetime analysis have already been run over the enclosing function by
//! `codegen::functions`; this module only consults them, it never mutates
//! `MutationAnalyzer`/`LifetimeAnalyzer` state.

use crate::ast::{ExceptHandler, Expr, ExprKind, Stmt, StmtKind, WithItem};
use crate::builtins::is_mutating_container_method;
use crate::class_registry::ClassRegistry;
use crate::mutation_analyzer::MutationAnalyzer;
use crate::types::Type;

use super::error::{CodeGenError, CodeGenResult};
use super::expr::emit_expr;
use super::state::CodeGenState;

pub fn emit_block(
    state: &mut CodeGenState,
    body: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    if body.is_empty() {
        state.write_line("pass;");
        return Ok(());
    }
    for stmt in body {
        emit_stmt(state, stmt, classes, mutation)?;
    }
    Ok(())
}

pub fn emit_stmt(
    state: &mut CodeGenState,
    stmt: &Stmt,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    state.debug_info.record(stmt.span.line);
    match &stmt.kind {
        StmtKind::Assign { targets, value } => emit_assign(state, targets, value, classes, mutation),
        StmtKind::AnnAssign { target, value, .. } => match value {
            Some(v) => emit_assign(state, std::slice::from_ref(target), v, classes, mutation),
            None => Ok(()),
        },
        StmtKind::AugAssign { target, op, value } => emit_aug_assign(state, target, *op, value, classes),
        StmtKind::If { test, body, orelse } => emit_if(state, test, body, orelse, classes, mutation),
        StmtKind::While { test, body, orelse } => emit_while(state, test, body, orelse, classes, mutation),
        StmtKind::For { target, iter, body, orelse } => emit_for(state, target, iter, body, orelse, classes, mutation),
        StmtKind::Match { subject, cases } => emit_match(state, subject, cases, classes, mutation),
        StmtKind::Return { value } => emit_return(state, value, classes),
        StmtKind::Raise { exc, cause } => emit_raise(state, exc, cause, classes),
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            emit_try(state, body, handlers, orelse, finalbody, classes, mutation)
        }
        StmtKind::With { items, body } => emit_with(state, items, body, classes, mutation),
        StmtKind::Import { .. } | StmtKind::ImportFrom { .. } => Ok(()),
        StmtKind::ClassDef(_) | StmtKind::FunctionDef(_) => Ok(()),
        StmtKind::Global { .. } => Ok(()),
        StmtKind::Del { targets } => emit_del(state, targets, classes),
        StmtKind::Pass => {
            state.write_line("pass;");
            Ok(())
        }
        StmtKind::Break => {
            state.write_line("break;");
            Ok(())
        }
        StmtKind::Continue => {
            state.write_line("continue;");
            Ok(())
        }
        StmtKind::Yield { value, is_yield_from } => emit_yield_stmt(state, value, *is_yield_from, classes),
        StmtKind::Expr(expr) => {
            let rendered = emit_expr(state, expr, classes)?;
            state.write_line(&format!("{rendered};"));
            Ok(())
        }
    }
}

fn emit_assign(
    state: &mut CodeGenState,
    targets: &[Expr],
    value: &Expr,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let rendered_value = emit_expr(state, value, classes)?;
    for target in targets {
        match &target.kind {
            ExprKind::Name(name) => {
                let scope = state.current_function.clone().unwrap_or_else(|| "module".to_string());
                let first_binding = !state.symbol_table.is_declared_in_current_scope(name);
                let rendered_target = state.resolve_name(name);
                if first_binding {
                    let kind = mutation.kind(&scope, name);
                    let binding = if kind.is_mutated() { "var" } else { "let" };
                    state.write_line(&format!("{binding} {rendered_target} = {rendered_value};"));
                } else {
                    state.write_line(&format!("{rendered_target} = {rendered_value};"));
                }
            }
            ExprKind::Tuple(elements) | ExprKind::List(elements) => {
                let temp = state.counters.next_temp();
                state.write_line(&format!("let {temp} = {rendered_value};"));
                for (index, element) in elements.iter().enumerate() {
                    let piece = format!("{temp}.element({index})");
                    emit_assign_single(state, element, &piece, classes, mutation)?;
                }
            }
            ExprKind::Attribute { value: recv, attr } => {
                let receiver = emit_expr(state, recv, classes)?;
                state.write_line(&format!("{receiver}.{attr} = {rendered_value};"));
            }
            ExprKind::Subscript { value: recv, index } => {
                let receiver = emit_expr(state, recv, classes)?;
                let idx = emit_expr(state, index, classes)?;
                state.write_line(&format!("{receiver}.set({idx}, {rendered_value});"));
            }
            _ => {
                return Err(CodeGenError::UnsupportedConstruct {
                    span: target.span,
                    category: "assignment_target",
                    detail: "unsupported assignment target shape".to_string(),
                })
            }
        }
    }
    Ok(())
}

fn emit_assign_single(
    state: &mut CodeGenState,
    target: &Expr,
    rendered_value: &str,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    match &target.kind {
        ExprKind::Name(name) => {
            let scope = state.current_function.clone().unwrap_or_else(|| "module".to_string());
            let first_binding = !state.symbol_table.is_declared_in_current_scope(name);
            let rendered_target = state.resolve_name(name);
            if first_binding {
                let kind = mutation.kind(&scope, name);
                let binding = if kind.is_mutated() { "var" } else { "let" };
                state.write_line(&format!("{binding} {rendered_target} = {rendered_value};"));
            } else {
                state.write_line(&format!("{rendered_target} = {rendered_value};"));
            }
            Ok(())
        }
        _ => {
            let rendered_target = emit_expr(state, target, classes)?;
            state.write_line(&format!("{rendered_target} = {rendered_value};"));
            Ok(())
        }
    }
}

fn emit_aug_assign(
    state: &mut CodeGenState,
    target: &Expr,
    op: crate::ast::BinOp,
    value: &Expr,
    classes: &ClassRegistry,
) -> CodeGenResult<()> {
    let rendered_target = emit_expr(state, target, classes)?;
    let rendered_value = emit_expr(state, value, classes)?;
    let sym = match op {
        crate::ast::BinOp::Add => "+=",
        crate::ast::BinOp::Sub => "-=",
        crate::ast::BinOp::Mul => "*=",
        crate::ast::BinOp::Div => "/=",
        crate::ast::BinOp::Mod => "%=",
        crate::ast::BinOp::BitOr => "|=",
        crate::ast::BinOp::BitXor => "^=",
        crate::ast::BinOp::BitAnd => "&=",
        crate::ast::BinOp::LShift => "<<=",
        crate::ast::BinOp::RShift => ">>=",
        crate::ast::BinOp::FloorDiv | crate::ast::BinOp::Pow | crate::ast::BinOp::MatMul => {
            state.write_line(&format!(
                "{rendered_target} = {};",
                super_binop_fallback(op, &rendered_target, &rendered_value)
            ));
            return Ok(());
        }
    };
    state.write_line(&format!("{rendered_target} {sym} {rendered_value};"));
    Ok(())
}

fn super_binop_fallback(op: crate::ast::BinOp, l: &str, r: &str) -> String {
    match op {
        crate::ast::BinOp::FloorDiv => format!("floor_div({l}, {r})"),
        crate::ast::BinOp::Pow => format!("pow({l}, {r})"),
        crate::ast::BinOp::MatMul => format!("matmul({l}, {r})"),
        _ => unreachable!("only called for the three operators with no TL compound-assign form"),
    }
}

fn emit_if(
    state: &mut CodeGenState,
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let rendered_test = emit_expr(state, test, classes)?;
    state.write_line(&format!("if {rendered_test} {{"));
    state.indent();
    emit_block(state, body, classes, mutation)?;
    state.dedent();
    if orelse.is_empty() {
        state.write_line("}");
    } else {
        state.write_line("} else {");
        state.indent();
        emit_block(state, orelse, classes, mutation)?;
        state.dedent();
        state.write_line("}");
    }
    Ok(())
}

fn emit_while(
    state: &mut CodeGenState,
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    if !orelse.is_empty() {
        // `while ... else:` has no direct TL construct; lower via a sentinel
        // flag the else-block reads once the loop exits normally.
        let flag = state.counters.next_shadow_var("loop_completed");
        state.write_line(&format!("var {flag} = true;"));
        let rendered_test = emit_expr(state, test, classes)?;
        state.write_line(&format!("while {rendered_test} {{"));
        state.indent();
        emit_block(state, body, classes, mutation)?;
        state.dedent();
        state.write_line("}");
        state.write_line(&format!("if {flag} {{"));
        state.indent();
        emit_block(state, orelse, classes, mutation)?;
        state.dedent();
        state.write_line("}");
        return Ok(());
    }
    let rendered_test = emit_expr(state, test, classes)?;
    state.write_line(&format!("while {rendered_test} {{"));
    state.indent();
    emit_block(state, body, classes, mutation)?;
    state.dedent();
    state.write_line("}");
    Ok(())
}

fn emit_for(
    state: &mut CodeGenState,
    target: &Expr,
    iter: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    if !orelse.is_empty() {
        return Err(CodeGenError::UnsupportedConstruct {
            span: Default::default(),
            category: "for_else",
            detail: "`for ... else:` is not lowered".to_string(),
        });
    }
    // `range(...)` gets a genuine numeric loop shape rather than a
    // materialised list, matching the Range direct-lowering's documented
    // special case.
    if let ExprKind::Call { func, args, .. } = &iter.kind {
        if let ExprKind::Name(name) = &func.kind {
            if name == "range" {
                let target_name = match &target.kind {
                    ExprKind::Name(n) => n.clone(),
                    _ => {
                        return Err(CodeGenError::UnsupportedConstruct {
                            span: target.span,
                            category: "for_target",
                            detail: "range() loop target must be a single name".to_string(),
                        })
                    }
                };
                let rendered = emit_range_loop_header(state, &target_name, args, classes)?;
                state.write_line(&rendered);
                state.indent();
                emit_block(state, body, classes, mutation)?;
                state.dedent();
                state.write_line("}");
                return Ok(());
            }
        }
    }
    let rendered_target = emit_expr(state, target, classes)?;
    let rendered_iter = emit_expr(state, iter, classes)?;
    state.write_line(&format!("for {rendered_target} in {rendered_iter} {{"));
    state.indent();
    emit_block(state, body, classes, mutation)?;
    state.dedent();
    state.write_line("}");
    Ok(())
}

fn emit_range_loop_header(
    state: &mut CodeGenState,
    target: &str,
    args: &[Expr],
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let rendered: Vec<String> = args
        .iter()
        .map(|a| emit_expr(state, a, classes))
        .collect::<CodeGenResult<Vec<_>>>()?;
    Ok(match rendered.len() {
        1 => format!("for {target} in 0..{} {{", rendered[0]),
        2 => format!("for {target} in {}..{} {{", rendered[0], rendered[1]),
        3 => format!("for {target} in ({}..{}).step_by({}) {{", rendered[0], rendered[1], rendered[2]),
        _ => format!("for {target} in range({}) {{", rendered.join(", ")),
    })
}

fn emit_match(
    state: &mut CodeGenState,
    subject: &Expr,
    cases: &[crate::ast::MatchCase],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let rendered_subject = emit_expr(state, subject, classes)?;
    let temp = state.counters.next_temp();
    state.write_line(&format!("let {temp} = {rendered_subject};"));
    for (i, case) in cases.iter().enumerate() {
        let cond = emit_pattern_test(&temp, &case.pattern);
        let guarded = match &case.guard {
            Some(g) => {
                let rendered_guard = emit_expr(state, g, classes)?;
                format!("({cond}) && ({rendered_guard})")
            }
            None => cond,
        };
        let keyword = if i == 0 { "if" } else { "} else if" };
        state.write_line(&format!("{keyword} {guarded} {{"));
        state.indent();
        emit_bindings_for_pattern(state, &temp, &case.pattern);
        emit_block(state, &case.body, classes, mutation)?;
        state.dedent();
    }
    state.write_line("}");
    Ok(())
}

fn emit_pattern_test(subject: &str, pattern: &crate::ast::Pattern) -> String {
    use crate::ast::Pattern;
    match pattern {
        Pattern::Wildcard | Pattern::Capture(_) => "true".to_string(),
        Pattern::Literal(c) => format!("({subject} == {})", literal_text(c)),
        Pattern::Class { name, .. } => format!("matches_class({subject}, \"{name}\")"),
        Pattern::Sequence(items) => format!("matches_sequence({subject}, {})", items.len()),
        Pattern::Mapping(_) => format!("matches_mapping({subject})"),
        Pattern::Or(alts) => {
            let parts: Vec<String> = alts.iter().map(|p| emit_pattern_test(subject, p)).collect();
            format!("({})", parts.join(" || "))
        }
    }
}

fn literal_text(c: &crate::ast::Constant) -> String {
    use crate::ast::Constant;
    match c {
        Constant::Int(n) => n.to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Str(s) => format!("{s:?}"),
        Constant::None => "none()".to_string(),
        _ => "0".to_string(),
    }
}

fn emit_bindings_for_pattern(state: &mut CodeGenState, subject: &str, pattern: &crate::ast::Pattern) {
    use crate::ast::Pattern;
    if let Pattern::Capture(name) = pattern {
        state.write_line(&format!("let {name} = {subject};"));
    }
}

fn emit_return(state: &mut CodeGenState, value: &Option<Expr>, classes: &ClassRegistry) -> CodeGenResult<()> {
    match value {
        Some(v) => {
            let rendered = emit_expr(state, v, classes)?;
            state.write_line(&format!("return {rendered};"));
        }
        None => state.write_line("return;"),
    }
    Ok(())
}

fn emit_raise(state: &mut CodeGenState, exc: &Option<Expr>, cause: &Option<Expr>, classes: &ClassRegistry) -> CodeGenResult<()> {
    match exc {
        Some(e) => {
            let rendered = emit_expr(state, e, classes)?;
            match cause {
                Some(c) => {
                    let rendered_cause = emit_expr(state, c, classes)?;
                    state.write_line(&format!("raise({rendered}, {rendered_cause});"));
                }
                None => state.write_line(&format!("raise({rendered});")),
            }
        }
        None => state.write_line("reraise();"),
    }
    Ok(())
}

fn emit_try(
    state: &mut CodeGenState,
    body: &[Stmt],
    handlers: &[ExceptHandler],
    orelse: &[Stmt],
    finalbody: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let helper = state.counters.next_try_helper();
    state.write_line(&format!("match {helper}::run(|| {{"));
    state.indent();
    emit_block(state, body, classes, mutation)?;
    if !orelse.is_empty() {
        emit_block(state, orelse, classes, mutation)?;
    }
    state.dedent();
    state.write_line("}) {");
    state.indent();
    state.write_line("Ok(()) => {}");
    for handler in handlers {
        let guard = match &handler.exc_type {
            Some(e) => emit_expr(state, e, classes)?,
            None => "_".to_string(),
        };
        state.write_line(&format!("Err(ref e) if matches_exception(e, \"{guard}\") => {{"));
        state.indent();
        if let Some(name) = &handler.bound_name {
            state.write_line(&format!("let {name} = e;"));
        }
        emit_block(state, &handler.body, classes, mutation)?;
        state.dedent();
        state.write_line("}");
    }
    state.write_line("Err(e) => return Err(e),");
    state.dedent();
    state.write_line("}");
    if !finalbody.is_empty() {
        emit_block(state, finalbody, classes, mutation)?;
    }
    Ok(())
}

fn emit_with(
    state: &mut CodeGenState,
    items: &[WithItem],
    body: &[Stmt],
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let mut bound_names = Vec::new();
    for item in items {
        let rendered_ctx = emit_expr(state, &item.context_expr, classes)?;
        let temp = match &item.optional_vars {
            Some(Expr { kind: ExprKind::Name(n), .. }) => n.clone(),
            Some(_) => state.counters.next_temp(),
            None => state.counters.next_temp(),
        };
        state.write_line(&format!("let {temp} = scoped_acquire({rendered_ctx});"));
        bound_names.push(temp);
    }
    emit_block(state, body, classes, mutation)?;
    for name in bound_names.into_iter().rev() {
        state.write_line(&format!("scoped_release({name});"));
    }
    Ok(())
}

fn emit_del(state: &mut CodeGenState, targets: &[Expr], classes: &ClassRegistry) -> CodeGenResult<()> {
    for target in targets {
        let rendered = emit_expr(state, target, classes)?;
        state.write_line(&format!("drop_binding({rendered});"));
    }
    Ok(())
}

fn emit_yield_stmt(
    state: &mut CodeGenState,
    value: &Option<Expr>,
    is_yield_from: bool,
    classes: &ClassRegistry,
) -> CodeGenResult<()> {
    // Generators are lowered to an owned materialised sequence (§9 Open
    // Question, resolved in DESIGN.md): `yield x` pushes onto the current
    // function's implicit result accumulator rather than suspending.
    match value {
        Some(v) => {
            let rendered = emit_expr(state, v, classes)?;
            if is_yield_from {
                state.write_line(&format!("__result.extend({rendered});"));
            } else {
                state.write_line(&format!("__result.push({rendered});"));
            }
        }
        None => state.write_line("__result.push(none());"),
    }
    Ok(())
}

/// Whether a statement contains a mutating-method call against `name`,
/// consulted by `functions.rs` when it can't rely solely on the mutation
/// analyzer's aug-assign/subscript facts (e.g. `x.append(1)`).
pub fn calls_mutating_method_on(expr: &Expr, name: &str) -> bool {
    if let ExprKind::Call { func, .. } = &expr.kind {
        if let ExprKind::Attribute { value, attr } = &func.kind {
            if let ExprKind::Name(n) = &value.kind {
                return n == name && is_mutating_container_method(attr);
            }
        }
    }
    false
}

pub fn infer_target_type(state: &mut CodeGenState, target: &Expr, classes: &ClassRegistry) -> Type {
    if let ExprKind::Name(name) = &target.kind {
        if let Some(ty) = state.symbol_table.get_type(name) {
            return ty;
        }
    }
    let scope = state.current_function.clone().unwrap_or_else(|| "module".to_string());
    state.type_inferrer.infer_expr(&scope, target, classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Constant, Span};
    use crate::mutation_analyzer::MutationAnalyzer;

    #[test]
    fn first_binding_to_a_name_emits_a_let() {
        let mut state = CodeGenState::new();
        state.enter_function("f");
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let target = Expr::new(Span::default(), ExprKind::Name("x".into()));
        let value = Expr::new(Span::default(), ExprKind::Constant(Constant::Int(1)));
        emit_assign(&mut state, &[target], &value, &classes, &mutation).unwrap();
        assert!(state.output.contains("let x = 1;"));
    }

    #[test]
    fn range_for_loop_lowers_to_a_numeric_range() {
        let mut state = CodeGenState::new();
        state.enter_function("f");
        let classes = ClassRegistry::new();
        let mutation = MutationAnalyzer::new();
        let target = Expr::new(Span::default(), ExprKind::Name("i".into()));
        let iter = Expr::new(
            Span::default(),
            ExprKind::Call {
                func: Box::new(Expr::new(Span::default(), ExprKind::Name("range".into()))),
                args: vec![Expr::new(Span::default(), ExprKind::Constant(Constant::Int(5)))],
                keywords: vec![],
            },
        );
        emit_for(&mut state, &target, &iter, &[], &[], &classes, &mutation).unwrap();
        assert!(state.output.contains("for i in 0..5 {"));
    }

    #[test]
    fn mutating_method_call_is_detected() {
        let expr = Expr::new(
            Span::default(),
            ExprKind::Call {
                func: Box::new(Expr::new(
                    Span::default(),
                    ExprKind::Attribute {
                        value: Box::new(Expr::new(Span::default(), ExprKind::Name("items".into()))),
                        attr: "append".into(),
                    },
                )),
                args: vec![],
                keywords: vec![],
            },
        );
        assert!(calls_mutating_method_on(&expr, "items"));
        assert!(!calls_mutating_method_on(&expr, "other"));
    }
}
