//! Module-wide pre-scan (§4.7), run as phase 1 of code generation.
//!
//! Everything here is a cheap, single linear pass over the top-level body --
//! it never recurses into nested function bodies beyond what's needed to
//! notice a `global` declaration or an async def, and it never consults the
//! Type Inferrer (which hasn't run yet at this point in the pipeline).

use std::collections::HashSet;

use crate::ast::{Constant, Expr, ExprKind, Module, Stmt, StmtKind};

#[derive(Debug, Default)]
pub struct ModuleSummary {
    pub global_names: HashSet<String>,
    pub uses_string_allocation: bool,
    pub needs_runtime_helper: bool,
    pub has_top_level_main: bool,
    pub has_top_level_async: bool,
}

pub fn analyze(module: &Module) -> ModuleSummary {
    let mut summary = ModuleSummary::default();
    for stmt in &module.body {
        scan_stmt(stmt, true, &mut summary);
    }
    summary
}

fn scan_stmt(stmt: &Stmt, top_level: bool, summary: &mut ModuleSummary) {
    match &stmt.kind {
        StmtKind::Global { names } => {
            summary.global_names.extend(names.iter().cloned());
        }
        StmtKind::FunctionDef(f) => {
            if top_level {
                if f.name == "main" {
                    summary.has_top_level_main = true;
                }
                if f.is_async {
                    summary.has_top_level_async = true;
                }
            }
            for s in &f.body {
                scan_stmt(s, false, summary);
            }
        }
        StmtKind::ClassDef(c) => {
            for s in &c.body {
                scan_stmt(s, false, summary);
            }
        }
        StmtKind::Assign { targets, value } => {
            for t in targets {
                scan_expr(t, summary);
            }
            scan_expr(value, summary);
        }
        StmtKind::AnnAssign { target, value, .. } => {
            scan_expr(target, summary);
            if let Some(v) = value {
                scan_expr(v, summary);
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            scan_expr(target, summary);
            scan_expr(value, summary);
        }
        StmtKind::If { test, body, orelse } => {
            scan_expr(test, summary);
            scan_block(body, summary);
            scan_block(orelse, summary);
        }
        StmtKind::While { test, body, orelse } => {
            scan_expr(test, summary);
            scan_block(body, summary);
            scan_block(orelse, summary);
        }
        StmtKind::For { target, iter, body, orelse } => {
            scan_expr(target, summary);
            scan_expr(iter, summary);
            scan_block(body, summary);
            scan_block(orelse, summary);
        }
        StmtKind::Match { subject, cases } => {
            scan_expr(subject, summary);
            for case in cases {
                if let Some(guard) = &case.guard {
                    scan_expr(guard, summary);
                }
                scan_block(&case.body, summary);
            }
        }
        StmtKind::Return { value } => {
            if let Some(v) = value {
                scan_expr(v, summary);
            }
        }
        StmtKind::Raise { exc, cause } => {
            for e in [exc, cause].into_iter().flatten() {
                scan_expr(e, summary);
            }
        }
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            scan_block(body, summary);
            for h in handlers {
                scan_block(&h.body, summary);
            }
            scan_block(orelse, summary);
            scan_block(finalbody, summary);
        }
        StmtKind::With { items, body } => {
            summary.needs_runtime_helper = true;
            for item in items {
                scan_expr(&item.context_expr, summary);
            }
            scan_block(body, summary);
        }
        StmtKind::Expr(e) => scan_expr(e, summary),
        StmtKind::Del { targets } => {
            for t in targets {
                scan_expr(t, summary);
            }
        }
        StmtKind::Yield { value, .. } => {
            if let Some(v) = value {
                scan_expr(v, summary);
            }
        }
        StmtKind::Import { .. } | StmtKind::ImportFrom { .. } | StmtKind::Pass
        | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn scan_block(body: &[Stmt], summary: &mut ModuleSummary) {
    for s in body {
        scan_stmt(s, false, summary);
    }
}

fn scan_expr(expr: &Expr, summary: &mut ModuleSummary) {
    match &expr.kind {
        ExprKind::Constant(Constant::Str(_)) => summary.uses_string_allocation = true,
        ExprKind::FString { parts } => {
            summary.uses_string_allocation = true;
            for part in parts {
                if let crate::ast::FStringPart::Expr { value, .. } = part {
                    scan_expr(value, summary);
                }
            }
        }
        ExprKind::Compare { left, ops, comparators } => {
            if ops.iter().any(|op| matches!(op, crate::ast::CmpOp::In | crate::ast::CmpOp::NotIn)) {
                summary.needs_runtime_helper = true;
            }
            scan_expr(left, summary);
            for c in comparators {
                scan_expr(c, summary);
            }
        }
        ExprKind::Call { func, args, keywords } => {
            scan_expr(func, summary);
            for a in args {
                scan_expr(a, summary);
            }
            for (_, v) in keywords {
                scan_expr(v, summary);
            }
        }
        ExprKind::BinOp { left, right, .. } => {
            scan_expr(left, summary);
            scan_expr(right, summary);
        }
        ExprKind::BoolOp { values, .. } => {
            for v in values {
                scan_expr(v, summary);
            }
        }
        ExprKind::UnaryOp { operand, .. } => scan_expr(operand, summary),
        ExprKind::Attribute { value, .. } => scan_expr(value, summary),
        ExprKind::Subscript { value, index } => {
            scan_expr(value, summary);
            scan_expr(index, summary);
        }
        ExprKind::List(elems) | ExprKind::Tuple(elems) | ExprKind::Set(elems) => {
            for e in elems {
                scan_expr(e, summary);
            }
        }
        ExprKind::Dict(entries) => {
            for (k, v) in entries {
                if let Some(k) = k {
                    scan_expr(k, summary);
                }
                scan_expr(v, summary);
            }
        }
        ExprKind::Lambda { body, .. } => scan_expr(body, summary),
        ExprKind::ListComp { element, generators }
        | ExprKind::SetComp { element, generators }
        | ExprKind::GeneratorExp { element, generators } => {
            for g in generators {
                scan_expr(&g.iter, summary);
                for cond in &g.ifs {
                    scan_expr(cond, summary);
                }
            }
            scan_expr(element, summary);
        }
        ExprKind::DictComp { key, value, generators } => {
            for g in generators {
                scan_expr(&g.iter, summary);
                for cond in &g.ifs {
                    scan_expr(cond, summary);
                }
            }
            scan_expr(key, summary);
            scan_expr(value, summary);
        }
        ExprKind::NamedExpr { target, value } => {
            scan_expr(target, summary);
            scan_expr(value, summary);
        }
        ExprKind::IfExp { test, body, orelse } => {
            scan_expr(test, summary);
            scan_expr(body, summary);
            scan_expr(orelse, summary);
        }
        ExprKind::Await(inner) | ExprKind::Starred(inner) => scan_expr(inner, summary),
        ExprKind::Slice { lower, upper, step } => {
            for e in [lower, upper, step].into_iter().flatten() {
                scan_expr(e, summary);
            }
        }
        ExprKind::Yield { value, .. } => {
            if let Some(v) = value {
                scan_expr(v, summary);
            }
        }
        ExprKind::Name(_) | ExprKind::Constant(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FunctionDef, Span};

    fn main_fn(is_async: bool) -> Stmt {
        Stmt::new(
            Span::default(),
            StmtKind::FunctionDef(FunctionDef {
                name: "main".into(),
                args: vec![],
                vararg: None,
                kwarg: None,
                decorators: vec![],
                return_annotation: None,
                body: vec![Stmt::new(Span::default(), StmtKind::Pass)],
                is_async,
                is_nested: false,
            }),
        )
    }

    #[test]
    fn detects_top_level_main() {
        let module = Module {
            source_path: "m.py".into(),
            body: vec![main_fn(false)],
        };
        let summary = analyze(&module);
        assert!(summary.has_top_level_main);
        assert!(!summary.has_top_level_async);
    }

    #[test]
    fn detects_top_level_async() {
        let module = Module {
            source_path: "m.py".into(),
            body: vec![main_fn(true)],
        };
        let summary = analyze(&module);
        assert!(summary.has_top_level_async);
    }

    #[test]
    fn string_constant_flags_string_allocation() {
        let assign = Stmt::new(
            Span::default(),
            StmtKind::Assign {
                targets: vec![Expr::new(Span::default(), ExprKind::Name("s".into()))],
                value: Expr::new(Span::default(), ExprKind::Constant(Constant::Str("hi".into()))),
            },
        );
        let module = Module {
            source_path: "m.py".into(),
            body: vec![assign],
        };
        let summary = analyze(&module);
        assert!(summary.uses_string_allocation);
    }

    #[test]
    fn membership_test_requires_runtime_helper() {
        let expr = Expr::new(
            Span::default(),
            ExprKind::Compare {
                left: Box::new(Expr::new(Span::default(), ExprKind::Name("x".into()))),
                ops: vec![crate::ast::CmpOp::In],
                comparators: vec![Expr::new(Span::default(), ExprKind::Name("xs".into()))],
            },
        );
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::Expr(expr))],
        };
        let summary = analyze(&module);
        assert!(summary.needs_runtime_helper);
    }
}
