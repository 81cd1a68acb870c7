//! Per-variable use-range tracking (§4.5).
//!
//! The generator consults this to decide when a binding needs a *scoped
//! release* attached (arena deallocation, reference-count decrement, ...).
//! Order is a simple monotonically increasing "program point" counter
//! assigned during a single linear walk -- not a real instruction index,
//! just enough to compare first-use/last-use/cross-scope escape.

use std::collections::HashMap;

use crate::ast::{Expr, ExprKind, Module, Stmt, StmtKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifetime {
    pub first_use: u32,
    pub last_use: u32,
    pub declared_depth: u32,
    /// True once a use has been observed at a shallower (more outer) depth
    /// than the one the variable was declared at -- i.e. it escapes the
    /// scope it was declared in, such as via a `return` building a closure
    /// or container over it, or a `nonlocal`/capture reference.
    pub outlives_declaring_scope: bool,
}

#[derive(Debug, Default)]
pub struct LifetimeAnalyzer {
    lifetimes: HashMap<String, Lifetime>,
    point: u32,
    depth: u32,
}

fn scope_key(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}

impl LifetimeAnalyzer {
    pub fn new() -> Self {
        LifetimeAnalyzer::default()
    }

    pub fn lifetime(&self, scope: &str, name: &str) -> Option<Lifetime> {
        self.lifetimes.get(&scope_key(scope, name)).copied()
    }

    pub fn analyze(&mut self, module: &Module) {
        for stmt in &module.body {
            self.walk_stmt(stmt, "module");
        }
    }

    fn tick(&mut self) -> u32 {
        self.point += 1;
        self.point
    }

    fn touch(&mut self, scope: &str, name: &str, is_declaration: bool) {
        let point = self.tick();
        let key = scope_key(scope, name);
        let depth = self.depth;
        let entry = self.lifetimes.entry(key).or_insert_with(|| Lifetime {
            first_use: point,
            last_use: point,
            declared_depth: depth,
            outlives_declaring_scope: false,
        });
        if is_declaration && entry.first_use == entry.last_use && entry.first_use == point {
            entry.declared_depth = depth;
        }
        entry.last_use = point;
        if depth < entry.declared_depth {
            entry.outlives_declaring_scope = true;
        }
    }

    fn enter_block(&mut self) {
        self.depth += 1;
    }

    fn exit_block(&mut self) {
        self.depth -= 1;
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: &str) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                self.walk_expr(value, scope, false);
                for target in targets {
                    self.walk_expr(target, scope, true);
                }
            }
            StmtKind::AnnAssign { target, value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope, false);
                }
                self.walk_expr(target, scope, true);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.walk_expr(value, scope, false);
                self.walk_expr(target, scope, false);
            }
            StmtKind::If { test, body, orelse } => {
                self.walk_expr(test, scope, false);
                self.enter_block();
                self.walk_block(body, scope);
                self.exit_block();
                self.enter_block();
                self.walk_block(orelse, scope);
                self.exit_block();
            }
            StmtKind::While { test, body, orelse } => {
                self.walk_expr(test, scope, false);
                self.enter_block();
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
                self.exit_block();
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.walk_expr(iter, scope, false);
                self.enter_block();
                self.walk_expr(target, scope, true);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
                self.exit_block();
            }
            StmtKind::Match { subject, cases } => {
                self.walk_expr(subject, scope, false);
                for case in cases {
                    self.enter_block();
                    self.walk_block(&case.body, scope);
                    self.exit_block();
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    // A returned name escapes the function scope by
                    // definition; mark it by touching at depth 0.
                    let saved = self.depth;
                    self.walk_expr(value, scope, false);
                    self.depth = 0;
                    self.touch_expr_names(value, scope);
                    self.depth = saved;
                }
            }
            StmtKind::Raise { exc, cause } => {
                for e in [exc, cause].into_iter().flatten() {
                    self.walk_expr(e, scope, false);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.enter_block();
                self.walk_block(body, scope);
                self.exit_block();
                for handler in handlers {
                    self.enter_block();
                    self.walk_block(&handler.body, scope);
                    self.exit_block();
                }
                self.walk_block(orelse, scope);
                self.walk_block(finalbody, scope);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.walk_expr(&item.context_expr, scope, false);
                    if let Some(target) = &item.optional_vars {
                        self.walk_expr(target, scope, true);
                    }
                }
                self.enter_block();
                self.walk_block(body, scope);
                self.exit_block();
            }
            StmtKind::ClassDef(c) => {
                self.walk_block(&c.body, &c.name);
            }
            StmtKind::FunctionDef(f) => {
                self.enter_block();
                self.walk_block(&f.body, &f.name);
                self.exit_block();
            }
            StmtKind::Expr(e) => self.walk_expr(e, scope, false),
            StmtKind::Del { targets } => {
                for t in targets {
                    self.walk_expr(t, scope, false);
                }
            }
            StmtKind::Yield { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope, false);
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

    fn touch_expr_names(&mut self, expr: &Expr, scope: &str) {
        if let ExprKind::Name(name) = &expr.kind {
            self.touch(scope, name, false);
        }
    }

    fn walk_expr(&mut self, expr: &Expr, scope: &str, is_declaration: bool) {
        match &expr.kind {
            ExprKind::Name(name) => self.touch(scope, name, is_declaration),
            ExprKind::Tuple(elems) | ExprKind::List(elems) | ExprKind::Set(elems) => {
                for e in elems {
                    self.walk_expr(e, scope, is_declaration);
                }
            }
            ExprKind::Call { func, args, keywords } => {
                self.walk_expr(func, scope, false);
                for a in args {
                    self.walk_expr(a, scope, false);
                }
                for (_, v) in keywords {
                    self.walk_expr(v, scope, false);
                }
            }
            ExprKind::Attribute { value, .. } => self.walk_expr(value, scope, false),
            ExprKind::Subscript { value, index } => {
                self.walk_expr(value, scope, false);
                self.walk_expr(index, scope, false);
            }
            ExprKind::BinOp { left, right, .. } => {
                self.walk_expr(left, scope, false);
                self.walk_expr(right, scope, false);
            }
            ExprKind::BoolOp { values, .. } => {
                for v in values {
                    self.walk_expr(v, scope, false);
                }
            }
            ExprKind::Compare { left, comparators, .. } => {
                self.walk_expr(left, scope, false);
                for c in comparators {
                    self.walk_expr(c, scope, false);
                }
            }
            ExprKind::UnaryOp { operand, .. } => self.walk_expr(operand, scope, false),
            ExprKind::Dict(entries) => {
                for (k, v) in entries {
                    if let Some(k) = k {
                        self.walk_expr(k, scope, false);
                    }
                    self.walk_expr(v, scope, false);
                }
            }
            ExprKind::Lambda { body, .. } => self.walk_expr(body, scope, false),
            ExprKind::ListComp { element, generators }
            | ExprKind::SetComp { element, generators }
            | ExprKind::GeneratorExp { element, generators } => {
                for g in generators {
                    self.walk_expr(&g.iter, scope, false);
                }
                self.walk_expr(element, scope, false);
            }
            ExprKind::DictComp { key, value, generators } => {
                for g in generators {
                    self.walk_expr(&g.iter, scope, false);
                }
                self.walk_expr(key, scope, false);
                self.walk_expr(value, scope, false);
            }
            ExprKind::FString { parts } => {
                for part in parts {
                    if let crate::ast::FStringPart::Expr { value, .. } = part {
                        self.walk_expr(value, scope, false);
                    }
                }
            }
            ExprKind::NamedExpr { target, value } => {
                self.walk_expr(value, scope, false);
                self.walk_expr(target, scope, true);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.walk_expr(test, scope, false);
                self.walk_expr(body, scope, false);
                self.walk_expr(orelse, scope, false);
            }
            ExprKind::Await(inner) | ExprKind::Starred(inner) => self.walk_expr(inner, scope, false),
            ExprKind::Slice { lower, upper, step } => {
                for e in [lower, upper, step].into_iter().flatten() {
                    self.walk_expr(e, scope, false);
                }
            }
            ExprKind::Yield { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value, scope, false);
                }
            }
            ExprKind::Constant(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn name(n: &str) -> Expr {
        Expr::new(Span::default(), ExprKind::Name(n.to_string()))
    }

    #[test]
    fn variable_used_only_inside_if_body_does_not_outlive() {
        let mut analyzer = LifetimeAnalyzer::new();
        let assign = Stmt::new(
            Span::default(),
            StmtKind::Assign {
                targets: vec![name("x")],
                value: Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(1))),
            },
        );
        let use_in_if = Stmt::new(
            Span::default(),
            StmtKind::If {
                test: name("cond"),
                body: vec![Stmt::new(Span::default(), StmtKind::Expr(name("x")))],
                orelse: vec![],
            },
        );
        let module = Module {
            source_path: "m.py".into(),
            body: vec![assign, use_in_if],
        };
        analyzer.analyze(&module);
        let lt = analyzer.lifetime("module", "x").unwrap();
        assert!(!lt.outlives_declaring_scope);
    }

    #[test]
    fn returned_variable_outlives_its_function_scope() {
        let mut analyzer = LifetimeAnalyzer::new();
        analyzer.enter_block();
        let assign = Stmt::new(
            Span::default(),
            StmtKind::Assign {
                targets: vec![name("result")],
                value: Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(1))),
            },
        );
        analyzer.walk_stmt(&assign, "f");
        let ret = Stmt::new(
            Span::default(),
            StmtKind::Return {
                value: Some(name("result")),
            },
        );
        analyzer.walk_stmt(&ret, "f");
        let lt = analyzer.lifetime("f", "result").unwrap();
        assert!(lt.outlives_declaring_scope);
    }
}
