//! Per-variable mutation classification (§4.4).
//!
//! The code generator consults this to choose, per binding: mutable vs
//! immutable, fixed-size array vs growable container, pointer-to-container
//! vs by-value. None of that logic lives here -- this module only records
//! *what happened* to each name; `codegen` decides what to do about it.

use std::collections::HashMap;

use crate::ast::{Expr, ExprKind, Module, Stmt, StmtKind};
use crate::builtins::is_mutating_container_method;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationKind {
    pub aug_assigned: bool,
    pub reassigned: bool,
    pub mutating_method_receiver: bool,
    pub subscript_assigned: bool,
}

impl MutationKind {
    pub fn is_mutated(&self) -> bool {
        self.aug_assigned
            || self.reassigned
            || self.mutating_method_receiver
            || self.subscript_assigned
    }
}

#[derive(Debug, Default)]
pub struct MutationAnalyzer {
    /// Keyed by `scope_name:var_name`, matching the Type Inferrer's keying
    /// convention so the two side tables stay easy to cross-reference.
    kinds: HashMap<String, MutationKind>,
    /// Names that were assigned to more than once in their declaring scope
    /// (tracked separately from `kinds` because "first vs reassignment" is
    /// also what the Symbol Table / code generator need for binding choice).
    seen_once: std::collections::HashSet<String>,
}

fn scope_key(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}

impl MutationAnalyzer {
    pub fn new() -> Self {
        MutationAnalyzer::default()
    }

    pub fn kind(&self, scope: &str, name: &str) -> MutationKind {
        self.kinds.get(&scope_key(scope, name)).copied().unwrap_or_default()
    }

    fn mark(&mut self, scope: &str, name: &str, f: impl FnOnce(&mut MutationKind)) {
        let entry = self.kinds.entry(scope_key(scope, name)).or_default();
        f(entry);
    }

    pub fn analyze(&mut self, module: &Module) {
        for stmt in &module.body {
            self.walk_stmt(stmt, "module");
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: &str) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.record_assign_target(scope, target);
                }
                self.walk_expr(value, scope);
            }
            StmtKind::AnnAssign { target, value, .. } => {
                self.record_assign_target(scope, target);
                if let Some(value) = value {
                    self.walk_expr(value, scope);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                if let ExprKind::Name(name) = &target.kind {
                    self.mark(scope, name, |k| k.aug_assigned = true);
                }
                self.walk_expr(value, scope);
            }
            StmtKind::If { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::While { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.record_assign_target(scope, target);
                self.walk_expr(iter, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::Match { subject, cases } => {
                self.walk_expr(subject, scope);
                for case in cases {
                    self.walk_block(&case.body, scope);
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope);
                }
            }
            StmtKind::Raise { exc, cause } => {
                for e in [exc, cause].into_iter().flatten() {
                    self.walk_expr(e, scope);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.walk_block(body, scope);
                for handler in handlers {
                    self.walk_block(&handler.body, scope);
                }
                self.walk_block(orelse, scope);
                self.walk_block(finalbody, scope);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.walk_expr(&item.context_expr, scope);
                    if let Some(target) = &item.optional_vars {
                        self.record_assign_target(scope, target);
                    }
                }
                self.walk_block(body, scope);
            }
            StmtKind::ClassDef(c) => {
                self.walk_block(&c.body, &c.name);
            }
            StmtKind::FunctionDef(f) => {
                self.walk_block(&f.body, &f.name);
            }
            StmtKind::Expr(e) => self.walk_expr(e, scope),
            StmtKind::Del { targets } => {
                for t in targets {
                    self.walk_expr(t, scope);
                }
            }
            StmtKind::Yield { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope);
                }
            }
            StmtKind::Global { .. } | StmtKind::Pass | StmtKind::Break | StmtKind::Continue
            | StmtKind::Import { .. } | StmtKind::ImportFrom { .. } => {}
        }
    }

    fn walk_block(&mut self, body: &[Stmt], scope: &str) {
        for stmt in body {
            self.walk_stmt(stmt, scope);
        }
    }

    fn record_assign_target(&mut self, scope: &str, target: &Expr) {
        match &target.kind {
            ExprKind::Name(name) => {
                let key = scope_key(scope, name);
                if self.seen_once.contains(&key) {
                    self.mark(scope, name, |k| k.reassigned = true);
                } else {
                    self.seen_once.insert(key);
                }
            }
            ExprKind::Tuple(elems) | ExprKind::List(elems) => {
                for elem in elems {
                    self.record_assign_target(scope, elem);
                }
            }
            ExprKind::Subscript { value, .. } => {
                if let ExprKind::Name(name) = &value.kind {
                    self.mark(scope, name, |k| k.subscript_assigned = true);
                }
            }
            _ => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr, scope: &str) {
        match &expr.kind {
            ExprKind::Call { func, args, keywords } => {
                if let ExprKind::Attribute { value, attr } = &func.kind {
                    if is_mutating_container_method(attr) {
                        if let ExprKind::Name(name) = &value.kind {
                            self.mark(scope, name, |k| k.mutating_method_receiver = true);
                        }
                    }
                    self.walk_expr(value, scope);
                } else {
                    self.walk_expr(func, scope);
                }
                for a in args {
                    self.walk_expr(a, scope);
                }
                for (_, v) in keywords {
                    self.walk_expr(v, scope);
                }
            }
            ExprKind::BinOp { left, right, .. } => {
                self.walk_expr(left, scope);
                self.walk_expr(right, scope);
            }
            ExprKind::BoolOp { values, .. } => {
                for v in values {
                    self.walk_expr(v, scope);
                }
            }
            ExprKind::Compare {
                left, comparators, ..
            } => {
                self.walk_expr(left, scope);
                for c in comparators {
                    self.walk_expr(c, scope);
                }
            }
            ExprKind::UnaryOp { operand, .. } => self.walk_expr(operand, scope),
            ExprKind::Attribute { value, .. } => self.walk_expr(value, scope),
            ExprKind::Subscript { value, index } => {
                self.walk_expr(value, scope);
                self.walk_expr(index, scope);
            }
            ExprKind::List(elems) | ExprKind::Tuple(elems) | ExprKind::Set(elems) => {
                for e in elems {
                    self.walk_expr(e, scope);
                }
            }
            ExprKind::Dict(entries) => {
                for (k, v) in entries {
                    if let Some(k) = k {
                        self.walk_expr(k, scope);
                    }
                    self.walk_expr(v, scope);
                }
            }
            ExprKind::Lambda { body, .. } => self.walk_expr(body, scope),
            ExprKind::ListComp { element, generators }
            | ExprKind::SetComp { element, generators }
            | ExprKind::GeneratorExp { element, generators } => {
                self.walk_expr(element, scope);
                for g in generators {
                    self.walk_expr(&g.iter, scope);
                    for cond in &g.ifs {
                        self.walk_expr(cond, scope);
                    }
                }
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.walk_expr(key, scope);
                self.walk_expr(value, scope);
                for g in generators {
                    self.walk_expr(&g.iter, scope);
                    for cond in &g.ifs {
                        self.walk_expr(cond, scope);
                    }
                }
            }
            ExprKind::FString { parts } => {
                for part in parts {
                    if let crate::ast::FStringPart::Expr { value, .. } = part {
                        self.walk_expr(value, scope);
                    }
                }
            }
            ExprKind::NamedExpr { target, value } => {
                self.record_assign_target(scope, target);
                self.walk_expr(value, scope);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_expr(body, scope);
                self.walk_expr(orelse, scope);
            }
            ExprKind::Await(inner) | ExprKind::Starred(inner) => self.walk_expr(inner, scope),
            ExprKind::Slice { lower, upper, step } => {
                for e in [lower, upper, step].into_iter().flatten() {
                    self.walk_expr(e, scope);
                }
            }
            ExprKind::Yield { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope);
                }
            }
            ExprKind::Name(_) | ExprKind::Constant(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Param, Span};

    fn name(n: &str) -> Expr {
        Expr::new(Span::default(), ExprKind::Name(n.to_string()))
    }

    #[test]
    fn aug_assign_marks_variable_mutated() {
        let mut analyzer = MutationAnalyzer::new();
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(
                Span::default(),
                StmtKind::AugAssign {
                    target: name("x"),
                    op: BinOp::Add,
                    value: Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(1))),
                },
            )],
        };
        analyzer.analyze(&module);
        assert!(analyzer.kind("module", "x").aug_assigned);
    }

    #[test]
    fn reverse_call_marks_mutating_receiver() {
        let mut analyzer = MutationAnalyzer::new();
        let call = Expr::new(
            Span::default(),
            ExprKind::Call {
                func: Box::new(Expr::new(
                    Span::default(),
                    ExprKind::Attribute {
                        value: Box::new(name("xs")),
                        attr: "reverse".to_string(),
                    },
                )),
                args: vec![],
                keywords: vec![],
            },
        );
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::Expr(call))],
        };
        analyzer.analyze(&module);
        assert!(analyzer.kind("module", "xs").mutating_method_receiver);
    }

    #[test]
    fn second_plain_assignment_is_reassignment() {
        let mut analyzer = MutationAnalyzer::new();
        let one = Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(1)));
        let two = Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(2)));
        let module = Module {
            source_path: "m.py".into(),
            body: vec![
                Stmt::new(
                    Span::default(),
                    StmtKind::Assign {
                        targets: vec![name("x")],
                        value: one,
                    },
                ),
                Stmt::new(
                    Span::default(),
                    StmtKind::Assign {
                        targets: vec![name("x")],
                        value: two,
                    },
                ),
            ],
        };
        analyzer.analyze(&module);
        assert!(analyzer.kind("module", "x").reassigned);
        let _unused: Option<Param> = None;
    }
}
