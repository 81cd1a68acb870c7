//! Closure capture materialisation (§4.10).
//!
//! A nested function with no free outer-scope name is lifted to a
//! module-level record with a single `call` method; the factory just
//! returns that record. A nested function that does capture names gets a
//! generated record type with one field per capture, and the factory
//! allocates + initialises an instance of it. Mutability of each capture is
//! read from the [`MutationAnalyzer`](crate::mutation_analyzer::MutationAnalyzer).
//!
//! Forward-referenced captures (an outer name the nested def closes over
//! but that isn't bound yet at the point the `def` appears) can't be
//! materialised immediately; those closures go on a deferred queue that the
//! generator drains as each such name is finally bound.

use std::collections::HashSet;

use crate::ast::{Expr, ExprKind, FunctionDef, Module, Stmt, StmtKind};
use crate::mutation_analyzer::MutationAnalyzer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInfo {
    pub name: String,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct ClosureInfo {
    pub function_name: String,
    pub enclosing_function: String,
    pub captures: Vec<CaptureInfo>,
    pub is_returned: bool,
}

impl ClosureInfo {
    pub fn needs_record_type(&self) -> bool {
        !self.captures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ClosurePlan {
    pub closures: Vec<ClosureInfo>,
    /// `function_name`s whose capture set includes a forward reference.
    pub deferred: Vec<String>,
}

pub fn analyze(module: &Module, mutation: &MutationAnalyzer) -> ClosurePlan {
    let mut plan = ClosurePlan::default();
    for stmt in &module.body {
        if let StmtKind::FunctionDef(f) = &stmt.kind {
            analyze_function(f, mutation, &mut plan);
        }
    }
    plan
}

fn analyze_function(f: &FunctionDef, mutation: &MutationAnalyzer, plan: &mut ClosurePlan) {
    let mut bound_so_far: HashSet<String> = f.args.iter().map(|p| p.name.clone()).collect();
    let all_bound: HashSet<String> = collect_all_bound_names(&f.body);

    walk_body_for_nested(&f.body, f, &mut bound_so_far, &all_bound, mutation, plan);

    // Recurse into every nested def (closures can themselves contain closures).
    for stmt in &f.body {
        if let StmtKind::FunctionDef(inner) = &stmt.kind {
            analyze_function(inner, mutation, plan);
        }
    }
}

fn walk_body_for_nested(
    body: &[Stmt],
    enclosing: &FunctionDef,
    bound_so_far: &mut HashSet<String>,
    all_bound_in_enclosing: &HashSet<String>,
    mutation: &MutationAnalyzer,
    plan: &mut ClosurePlan,
) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(nested) if nested.is_nested => {
                let free = free_variables(nested);
                let own_locals = collect_all_bound_names(&nested.body);
                let own_params: HashSet<String> = nested.args.iter().map(|p| p.name.clone()).collect();

                let mut captures = Vec::new();
                let mut forward_referenced = false;
                for name in &free {
                    if own_locals.contains(name) || own_params.contains(name) {
                        continue;
                    }
                    if !all_bound_in_enclosing.contains(name) {
                        // Not a local of the enclosing function at all --
                        // a module-level name or built-in, not a capture.
                        continue;
                    }
                    if !bound_so_far.contains(name) {
                        forward_referenced = true;
                    }
                    let kind = mutation.kind(&enclosing.name, name);
                    captures.push(CaptureInfo {
                        name: name.clone(),
                        mutable: kind.is_mutated(),
                    });
                }
                captures.sort_by(|a, b| a.name.cmp(&b.name));

                let is_returned = enclosing_returns_name(&enclosing.body, &nested.name);

                if forward_referenced {
                    plan.deferred.push(nested.name.clone());
                }
                plan.closures.push(ClosureInfo {
                    function_name: nested.name.clone(),
                    enclosing_function: enclosing.name.clone(),
                    captures,
                    is_returned,
                });

                bound_so_far.insert(nested.name.clone());
            }
            StmtKind::Assign { targets, .. } => {
                for t in targets {
                    mark_bound(t, bound_so_far);
                }
            }
            StmtKind::AnnAssign { target, .. } => mark_bound(target, bound_so_far),
            StmtKind::For { target, .. } => mark_bound(target, bound_so_far),
            StmtKind::If { body, orelse, .. } => {
                walk_body_for_nested(body, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
                walk_body_for_nested(orelse, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
            }
            StmtKind::While { body, orelse, .. } => {
                walk_body_for_nested(body, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
                walk_body_for_nested(orelse, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
            }
            StmtKind::Try { body, handlers, orelse, finalbody } => {
                walk_body_for_nested(body, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
                for h in handlers {
                    walk_body_for_nested(&h.body, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
                }
                walk_body_for_nested(orelse, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
                walk_body_for_nested(finalbody, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
            }
            StmtKind::With { body, .. } => {
                walk_body_for_nested(body, enclosing, bound_so_far, all_bound_in_enclosing, mutation, plan);
            }
            _ => {}
        }
    }
}

fn mark_bound(target: &Expr, bound_so_far: &mut HashSet<String>) {
    match &target.kind {
        ExprKind::Name(name) => {
            bound_so_far.insert(name.clone());
        }
        ExprKind::Tuple(elems) | ExprKind::List(elems) => {
            for e in elems {
                mark_bound(e, bound_so_far);
            }
        }
        _ => {}
    }
}

fn collect_all_bound_names(body: &[Stmt]) -> HashSet<String> {
    let mut out = HashSet::new();
    fn walk(body: &[Stmt], out: &mut HashSet<String>) {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Assign { targets, .. } => {
                    for t in targets {
                        collect_names(t, out);
                    }
                }
                StmtKind::AnnAssign { target, .. } => collect_names(target, out),
                StmtKind::For { target, body, orelse, .. } => {
                    collect_names(target, out);
                    walk(body, out);
                    walk(orelse, out);
                }
                StmtKind::If { body, orelse, .. } => {
                    walk(body, out);
                    walk(orelse, out);
                }
                StmtKind::While { body, orelse, .. } => {
                    walk(body, out);
                    walk(orelse, out);
                }
                StmtKind::Try { body, handlers, orelse, finalbody } => {
                    walk(body, out);
                    for h in handlers {
                        walk(&h.body, out);
                    }
                    walk(orelse, out);
                    walk(finalbody, out);
                }
                StmtKind::With { body, .. } => walk(body, out),
                StmtKind::FunctionDef(f) => {
                    out.insert(f.name.clone());
                }
                _ => {}
            }
        }
    }
    walk(body, &mut out);
    out
}

fn collect_names(expr: &Expr, out: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Name(name) => {
            out.insert(name.clone());
        }
        ExprKind::Tuple(elems) | ExprKind::List(elems) => {
            for e in elems {
                collect_names(e, out);
            }
        }
        _ => {}
    }
}

/// Free variables of a function: names read in the body that aren't bound
/// by its own params or by an assignment inside its own body.
fn free_variables(f: &FunctionDef) -> HashSet<String> {
    let bound: HashSet<String> = f
        .args
        .iter()
        .map(|p| p.name.clone())
        .chain(collect_all_bound_names(&f.body))
        .collect();
    let mut reads = HashSet::new();
    for stmt in &f.body {
        collect_reads_stmt(stmt, &mut reads);
    }
    reads.retain(|name| !bound.contains(name));
    reads
}

fn collect_reads_stmt(stmt: &Stmt, out: &mut HashSet<String>) {
    match &stmt.kind {
        StmtKind::Assign { targets, value } => {
            collect_reads_expr(value, out);
            for t in targets {
                if let ExprKind::Subscript { value, index } = &t.kind {
                    collect_reads_expr(value, out);
                    collect_reads_expr(index, out);
                }
            }
        }
        StmtKind::AnnAssign { value, .. } => {
            if let Some(v) = value {
                collect_reads_expr(v, out);
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            collect_reads_expr(target, out);
            collect_reads_expr(value, out);
        }
        StmtKind::If { test, body, orelse } => {
            collect_reads_expr(test, out);
            for s in body.iter().chain(orelse.iter()) {
                collect_reads_stmt(s, out);
            }
        }
        StmtKind::While { test, body, orelse } => {
            collect_reads_expr(test, out);
            for s in body.iter().chain(orelse.iter()) {
                collect_reads_stmt(s, out);
            }
        }
        StmtKind::For { iter, body, orelse, .. } => {
            collect_reads_expr(iter, out);
            for s in body.iter().chain(orelse.iter()) {
                collect_reads_stmt(s, out);
            }
        }
        StmtKind::Return { value } => {
            if let Some(v) = value {
                collect_reads_expr(v, out);
            }
        }
        StmtKind::Expr(e) => collect_reads_expr(e, out),
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            for s in body {
                collect_reads_stmt(s, out);
            }
            for h in handlers {
                for s in &h.body {
                    collect_reads_stmt(s, out);
                }
            }
            for s in orelse.iter().chain(finalbody.iter()) {
                collect_reads_stmt(s, out);
            }
        }
        StmtKind::With { items, body } => {
            for item in items {
                collect_reads_expr(&item.context_expr, out);
            }
            for s in body {
                collect_reads_stmt(s, out);
            }
        }
        StmtKind::FunctionDef(f) => {
            // A further-nested function's free variables may themselves
            // reach into this scope; fold them in too.
            out.extend(free_variables(f));
        }
        _ => {}
    }
}

fn collect_reads_expr(expr: &Expr, out: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Name(name) => {
            out.insert(name.clone());
        }
        ExprKind::Call { func, args, keywords } => {
            collect_reads_expr(func, out);
            for a in args {
                collect_reads_expr(a, out);
            }
            for (_, v) in keywords {
                collect_reads_expr(v, out);
            }
        }
        ExprKind::BinOp { left, right, .. } => {
            collect_reads_expr(left, out);
            collect_reads_expr(right, out);
        }
        ExprKind::BoolOp { values, .. } => {
            for v in values {
                collect_reads_expr(v, out);
            }
        }
        ExprKind::Compare { left, comparators, .. } => {
            collect_reads_expr(left, out);
            for c in comparators {
                collect_reads_expr(c, out);
            }
        }
        ExprKind::UnaryOp { operand, .. } => collect_reads_expr(operand, out),
        ExprKind::Attribute { value, .. } => collect_reads_expr(value, out),
        ExprKind::Subscript { value, index } => {
            collect_reads_expr(value, out);
            collect_reads_expr(index, out);
        }
        ExprKind::List(elems) | ExprKind::Tuple(elems) | ExprKind::Set(elems) => {
            for e in elems {
                collect_reads_expr(e, out);
            }
        }
        ExprKind::Dict(entries) => {
            for (k, v) in entries {
                if let Some(k) = k {
                    collect_reads_expr(k, out);
                }
                collect_reads_expr(v, out);
            }
        }
        ExprKind::Lambda { args, body } => {
            let mut inner = HashSet::new();
            collect_reads_expr(body, &mut inner);
            let params: HashSet<String> = args.iter().map(|p| p.name.clone()).collect();
            out.extend(inner.into_iter().filter(|n| !params.contains(n)));
        }
        ExprKind::ListComp { element, generators }
        | ExprKind::SetComp { element, generators }
        | ExprKind::GeneratorExp { element, generators } => {
            for g in generators {
                collect_reads_expr(&g.iter, out);
                for cond in &g.ifs {
                    collect_reads_expr(cond, out);
                }
            }
            collect_reads_expr(element, out);
        }
        ExprKind::DictComp { key, value, generators } => {
            for g in generators {
                collect_reads_expr(&g.iter, out);
                for cond in &g.ifs {
                    collect_reads_expr(cond, out);
                }
            }
            collect_reads_expr(key, out);
            collect_reads_expr(value, out);
        }
        ExprKind::FString { parts } => {
            for part in parts {
                if let crate::ast::FStringPart::Expr { value, .. } = part {
                    collect_reads_expr(value, out);
                }
            }
        }
        ExprKind::NamedExpr { value, .. } => collect_reads_expr(value, out),
        ExprKind::IfExp { test, body, orelse } => {
            collect_reads_expr(test, out);
            collect_reads_expr(body, out);
            collect_reads_expr(orelse, out);
        }
        ExprKind::Await(inner) | ExprKind::Starred(inner) => collect_reads_expr(inner, out),
        ExprKind::Slice { lower, upper, step } => {
            for e in [lower, upper, step].into_iter().flatten() {
                collect_reads_expr(e, out);
            }
        }
        ExprKind::Yield { value, .. } => {
            if let Some(v) = value {
                collect_reads_expr(v, out);
            }
        }
        ExprKind::Constant(_) => {}
    }
}

fn enclosing_returns_name(body: &[Stmt], target: &str) -> bool {
    body.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return { value: Some(v) } => expr_names_contain(v, target),
        StmtKind::If { body, orelse, .. } => {
            enclosing_returns_name(body, target) || enclosing_returns_name(orelse, target)
        }
        StmtKind::While { body, orelse, .. } => {
            enclosing_returns_name(body, target) || enclosing_returns_name(orelse, target)
        }
        StmtKind::For { body, orelse, .. } => {
            enclosing_returns_name(body, target) || enclosing_returns_name(orelse, target)
        }
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            enclosing_returns_name(body, target)
                || handlers.iter().any(|h| enclosing_returns_name(&h.body, target))
                || enclosing_returns_name(orelse, target)
                || enclosing_returns_name(finalbody, target)
        }
        _ => false,
    })
}

fn expr_names_contain(expr: &Expr, target: &str) -> bool {
    match &expr.kind {
        ExprKind::Name(n) => n == target,
        ExprKind::Tuple(elems) | ExprKind::List(elems) => {
            elems.iter().any(|e| expr_names_contain(e, target))
        }
        ExprKind::Call { func, .. } => expr_names_contain(func, target),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Span};

    fn name(n: &str) -> Expr {
        Expr::new(Span::default(), ExprKind::Name(n.to_string()))
    }

    // def make(n):
    //     def add(x):
    //         return x + n
    //     return add
    fn make_module() -> Module {
        let add_body = vec![Stmt::new(
            Span::default(),
            StmtKind::Return {
                value: Some(Expr::new(
                    Span::default(),
                    ExprKind::BinOp {
                        left: Box::new(name("x")),
                        op: crate::ast::BinOp::Add,
                        right: Box::new(name("n")),
                    },
                )),
            },
        )];
        let add = FunctionDef {
            name: "add".into(),
            args: vec![Param { name: "x".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: add_body,
            is_async: false,
            is_nested: true,
        };
        let make_body = vec![
            Stmt::new(Span::default(), StmtKind::FunctionDef(add)),
            Stmt::new(Span::default(), StmtKind::Return { value: Some(name("add")) }),
        ];
        let make = FunctionDef {
            name: "make".into(),
            args: vec![Param { name: "n".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: make_body,
            is_async: false,
            is_nested: false,
        };
        Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(make))],
        }
    }

    #[test]
    fn nested_function_captures_enclosing_parameter() {
        let module = make_module();
        let mutation = MutationAnalyzer::new();
        let plan = analyze(&module, &mutation);
        let add = plan.closures.iter().find(|c| c.function_name == "add").unwrap();
        assert_eq!(add.captures, vec![CaptureInfo { name: "n".into(), mutable: false }]);
        assert!(add.is_returned);
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn no_free_variables_means_no_record_type_needed() {
        let body = vec![Stmt::new(
            Span::default(),
            StmtKind::Return {
                value: Some(Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(1)))),
            },
        )];
        let inner = FunctionDef {
            name: "constant_fn".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: true,
        };
        let outer_body = vec![
            Stmt::new(Span::default(), StmtKind::FunctionDef(inner)),
            Stmt::new(Span::default(), StmtKind::Return { value: Some(name("constant_fn")) }),
        ];
        let outer = FunctionDef {
            name: "factory".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: outer_body,
            is_async: false,
            is_nested: false,
        };
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(outer))],
        };
        let mutation = MutationAnalyzer::new();
        let plan = analyze(&module, &mutation);
        let c = plan.closures.iter().find(|c| c.function_name == "constant_fn").unwrap();
        assert!(!c.needs_record_type());
    }
}
