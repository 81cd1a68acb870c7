//! Function-trait call graph (§4.6).
//!
//! Builds a directed graph of function-name -> callee-name and computes a
//! handful of per-function booleans/lattice values as a fixed point over
//! that graph: `needs_allocator`, `needs_error_union`, `is_pure`,
//! `is_generator`, `async_complexity`, `can_use_tco`.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, ExprKind, Module, Stmt, StmtKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AsyncComplexity {
    Trivial,
    HasAwait,
    HasIo,
}

impl AsyncComplexity {
    fn join(self, other: AsyncComplexity) -> AsyncComplexity {
        self.max(other)
    }
}

#[derive(Debug, Clone, Default)]
struct LocalFacts {
    /// Direct callees, including attribute-style method calls resolved by
    /// name only (receiver type is not needed here; needs_allocator's
    /// "including method calls via receiver type" note is approximated by
    /// also recording method names as possible callees).
    callees: HashSet<String>,
    allocates_directly: bool,
    raises_directly: bool,
    does_io_directly: bool,
    mutates_nonlocal: bool,
    has_yield: bool,
    is_async: bool,
    awaits: bool,
    /// Every `return` is a same-arity direct self-call.
    all_returns_are_self_tail_calls: bool,
    has_any_return: bool,
    arity: usize,
}

#[derive(Debug, Default)]
pub struct FunctionTraits {
    pub needs_allocator: HashMap<String, bool>,
    pub needs_error_union: HashMap<String, bool>,
    pub is_pure: HashMap<String, bool>,
    pub is_generator: HashMap<String, bool>,
    pub async_complexity: HashMap<String, AsyncComplexity>,
    pub can_use_tco: HashMap<String, bool>,
    edges: HashMap<String, HashSet<String>>,
}

impl FunctionTraits {
    pub fn needs_allocator(&self, name: &str) -> bool {
        self.needs_allocator.get(name).copied().unwrap_or(true)
    }

    pub fn needs_error_union(&self, name: &str) -> bool {
        self.needs_error_union.get(name).copied().unwrap_or(true)
    }

    pub fn is_pure(&self, name: &str) -> bool {
        self.is_pure.get(name).copied().unwrap_or(false)
    }

    pub fn is_generator(&self, name: &str) -> bool {
        self.is_generator.get(name).copied().unwrap_or(false)
    }

    pub fn async_complexity(&self, name: &str) -> AsyncComplexity {
        self.async_complexity
            .get(name)
            .copied()
            .unwrap_or(AsyncComplexity::Trivial)
    }

    pub fn can_use_tco(&self, name: &str) -> bool {
        self.can_use_tco.get(name).copied().unwrap_or(false)
    }

    pub fn callees(&self, name: &str) -> Option<&HashSet<String>> {
        self.edges.get(name)
    }
}

/// Build the call graph and compute all traits as a fixed point.
///
/// `known_functions` restricts callee edges to names actually declared in
/// this module (calls into skipped/unresolved modules don't create an
/// edge, matching the skipped-module closure property P6 -- those calls
/// are just treated as an opaque external effect, conservatively assumed
/// to allocate and possibly raise).
pub fn build(module: &Module, known_functions: &HashSet<String>) -> FunctionTraits {
    let mut facts: HashMap<String, LocalFacts> = HashMap::new();
    collect_facts(&module.body, known_functions, &mut facts);

    let mut traits = FunctionTraits::default();
    for (name, f) in &facts {
        traits.edges.insert(name.clone(), f.callees.clone());
        traits.needs_allocator.insert(name.clone(), f.allocates_directly);
        traits.needs_error_union.insert(name.clone(), f.raises_directly || f.does_io_directly);
        traits.is_pure.insert(
            name.clone(),
            !f.mutates_nonlocal && !f.does_io_directly && !f.raises_directly,
        );
        traits.is_generator.insert(name.clone(), f.has_yield);
        traits.async_complexity.insert(
            name.clone(),
            if f.does_io_directly {
                AsyncComplexity::HasIo
            } else if f.awaits {
                AsyncComplexity::HasAwait
            } else {
                AsyncComplexity::Trivial
            },
        );
        traits.can_use_tco.insert(
            name.clone(),
            f.has_any_return && f.all_returns_are_self_tail_calls && !f.has_yield,
        );
    }

    // Fixed point: propagate needs_allocator / needs_error_union / is_pure /
    // async_complexity through the call graph until nothing changes.
    loop {
        let mut changed = false;
        let names: Vec<String> = facts.keys().cloned().collect();
        for name in &names {
            let callees = traits.edges.get(name).cloned().unwrap_or_default();

            let mut needs_alloc = traits.needs_allocator(name);
            let mut needs_err = traits.needs_error_union(name);
            let mut pure = traits.is_pure(name);
            let mut complexity = traits.async_complexity(name);

            for callee in &callees {
                if traits.needs_allocator(callee) {
                    needs_alloc = true;
                }
                if traits.needs_error_union(callee) {
                    needs_err = true;
                }
                if !traits.is_pure(callee) {
                    pure = false;
                }
                complexity = complexity.join(traits.async_complexity(callee));
            }

            if needs_alloc != traits.needs_allocator(name) {
                traits.needs_allocator.insert(name.clone(), needs_alloc);
                changed = true;
            }
            if needs_err != traits.needs_error_union(name) {
                traits.needs_error_union.insert(name.clone(), needs_err);
                changed = true;
            }
            if pure != traits.is_pure(name) {
                traits.is_pure.insert(name.clone(), pure);
                changed = true;
            }
            if complexity != traits.async_complexity(name) {
                traits.async_complexity.insert(name.clone(), complexity);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    traits
}

fn collect_facts(
    body: &[Stmt],
    known_functions: &HashSet<String>,
    out: &mut HashMap<String, LocalFacts>,
) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(f) => {
                let mut facts = LocalFacts {
                    is_async: f.is_async,
                    all_returns_are_self_tail_calls: true,
                    arity: f.args.len(),
                    ..Default::default()
                };
                for s in &f.body {
                    walk_stmt_facts(s, &f.name, known_functions, &mut facts);
                }
                out.insert(f.name.clone(), facts);
                collect_facts(&f.body, known_functions, out);
            }
            StmtKind::ClassDef(c) => collect_facts(&c.body, known_functions, out),
            _ => {}
        }
    }
}

fn walk_stmt_facts(
    stmt: &Stmt,
    owner: &str,
    known_functions: &HashSet<String>,
    facts: &mut LocalFacts,
) {
    match &stmt.kind {
        StmtKind::Assign { targets, value } => {
            for t in targets {
                walk_expr_facts(t, owner, known_functions, facts);
            }
            walk_expr_facts(value, owner, known_functions, facts);
        }
        StmtKind::AnnAssign { target, value, .. } => {
            walk_expr_facts(target, owner, known_functions, facts);
            if let Some(v) = value {
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            facts.mutates_nonlocal = true;
            walk_expr_facts(target, owner, known_functions, facts);
            walk_expr_facts(value, owner, known_functions, facts);
        }
        StmtKind::If { test, body, orelse } => {
            walk_expr_facts(test, owner, known_functions, facts);
            for s in body.iter().chain(orelse.iter()) {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
        }
        StmtKind::While { test, body, orelse } => {
            walk_expr_facts(test, owner, known_functions, facts);
            for s in body.iter().chain(orelse.iter()) {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
        }
        StmtKind::For { iter, body, orelse, .. } => {
            walk_expr_facts(iter, owner, known_functions, facts);
            for s in body.iter().chain(orelse.iter()) {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
        }
        StmtKind::Match { subject, cases } => {
            walk_expr_facts(subject, owner, known_functions, facts);
            for case in cases {
                for s in &case.body {
                    walk_stmt_facts(s, owner, known_functions, facts);
                }
            }
        }
        StmtKind::Return { value } => {
            facts.has_any_return = true;
            match value {
                Some(Expr {
                    kind: ExprKind::Call { func, args, .. },
                    ..
                }) if is_self_call(func, owner) && args.len() == facts.arity => {
                    walk_expr_facts_inner_args(args, owner, known_functions, facts);
                }
                Some(v) => {
                    facts.all_returns_are_self_tail_calls = false;
                    walk_expr_facts(v, owner, known_functions, facts);
                }
                None => facts.all_returns_are_self_tail_calls = false,
            }
        }
        StmtKind::Raise { exc, cause } => {
            facts.raises_directly = true;
            for e in [exc, cause].into_iter().flatten() {
                walk_expr_facts(e, owner, known_functions, facts);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            for s in body {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
            for handler in handlers {
                for s in &handler.body {
                    walk_stmt_facts(s, owner, known_functions, facts);
                }
            }
            for s in orelse.iter().chain(finalbody.iter()) {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
        }
        StmtKind::With { items, body } => {
            for item in items {
                walk_expr_facts(&item.context_expr, owner, known_functions, facts);
            }
            for s in body {
                walk_stmt_facts(s, owner, known_functions, facts);
            }
        }
        StmtKind::Global { .. } => facts.mutates_nonlocal = true,
        StmtKind::Del { targets } => {
            for t in targets {
                walk_expr_facts(t, owner, known_functions, facts);
            }
        }
        StmtKind::Expr(e) => walk_expr_facts(e, owner, known_functions, facts),
        StmtKind::Yield { value, .. } => {
            facts.has_yield = true;
            if let Some(v) = value {
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {
            // Nested defs/classes are analyzed independently by
            // `collect_facts`'s recursive descent; they don't contribute
            // facts to the enclosing function directly.
        }
        StmtKind::Pass | StmtKind::Break | StmtKind::Continue | StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. } => {}
    }
}

fn walk_expr_facts_inner_args(
    args: &[Expr],
    owner: &str,
    known_functions: &HashSet<String>,
    facts: &mut LocalFacts,
) {
    for a in args {
        walk_expr_facts(a, owner, known_functions, facts);
    }
}

fn is_self_call(func: &Expr, owner: &str) -> bool {
    matches!(&func.kind, ExprKind::Name(name) if name == owner)
}

const IO_BUILTINS: &[&str] = &["print", "input", "open"];
const ALLOCATING_BUILTINS: &[&str] = &["list", "dict", "set", "tuple", "str"];

fn walk_expr_facts(
    expr: &Expr,
    owner: &str,
    known_functions: &HashSet<String>,
    facts: &mut LocalFacts,
) {
    match &expr.kind {
        ExprKind::Call { func, args, keywords } => {
            if let ExprKind::Name(name) = &func.kind {
                if known_functions.contains(name) {
                    facts.callees.insert(name.clone());
                } else if IO_BUILTINS.contains(&name.as_str()) {
                    facts.does_io_directly = true;
                } else if ALLOCATING_BUILTINS.contains(&name.as_str()) {
                    facts.allocates_directly = true;
                } else {
                    // Unknown callee (builtin we don't model, or an
                    // unresolved import): conservatively assume it may
                    // allocate, matching the generator's "unproven
                    // confluence" open question on allocator detection.
                    facts.allocates_directly = true;
                }
            } else if let ExprKind::Attribute { value, attr } = &func.kind {
                // Method calls via receiver type: approximated by name --
                // a full receiver-type-directed edge needs the Type
                // Inferrer's result, which runs in the same pipeline stage.
                facts.callees.insert(attr.clone());
                walk_expr_facts(value, owner, known_functions, facts);
            }
            for a in args {
                walk_expr_facts(a, owner, known_functions, facts);
            }
            for (_, v) in keywords {
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        ExprKind::Await(inner) => {
            facts.awaits = true;
            walk_expr_facts(inner, owner, known_functions, facts);
        }
        ExprKind::List(elems) | ExprKind::Tuple(elems) | ExprKind::Set(elems) => {
            facts.allocates_directly = true;
            for e in elems {
                walk_expr_facts(e, owner, known_functions, facts);
            }
        }
        ExprKind::Dict(entries) => {
            facts.allocates_directly = true;
            for (k, v) in entries {
                if let Some(k) = k {
                    walk_expr_facts(k, owner, known_functions, facts);
                }
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        ExprKind::BinOp { left, right, .. } => {
            walk_expr_facts(left, owner, known_functions, facts);
            walk_expr_facts(right, owner, known_functions, facts);
        }
        ExprKind::BoolOp { values, .. } => {
            for v in values {
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        ExprKind::Compare { left, comparators, .. } => {
            walk_expr_facts(left, owner, known_functions, facts);
            for c in comparators {
                walk_expr_facts(c, owner, known_functions, facts);
            }
        }
        ExprKind::UnaryOp { operand, .. } => walk_expr_facts(operand, owner, known_functions, facts),
        ExprKind::Attribute { value, .. } => walk_expr_facts(value, owner, known_functions, facts),
        ExprKind::Subscript { value, index } => {
            walk_expr_facts(value, owner, known_functions, facts);
            walk_expr_facts(index, owner, known_functions, facts);
        }
        ExprKind::Lambda { body, .. } => walk_expr_facts(body, owner, known_functions, facts),
        ExprKind::ListComp { element, generators }
        | ExprKind::SetComp { element, generators }
        | ExprKind::GeneratorExp { element, generators } => {
            facts.allocates_directly = true;
            for g in generators {
                walk_expr_facts(&g.iter, owner, known_functions, facts);
            }
            walk_expr_facts(element, owner, known_functions, facts);
        }
        ExprKind::DictComp { key, value, generators } => {
            facts.allocates_directly = true;
            for g in generators {
                walk_expr_facts(&g.iter, owner, known_functions, facts);
            }
            walk_expr_facts(key, owner, known_functions, facts);
            walk_expr_facts(value, owner, known_functions, facts);
        }
        ExprKind::FString { parts } => {
            facts.allocates_directly = true;
            for part in parts {
                if let crate::ast::FStringPart::Expr { value, .. } = part {
                    walk_expr_facts(value, owner, known_functions, facts);
                }
            }
        }
        ExprKind::NamedExpr { target, value } => {
            walk_expr_facts(target, owner, known_functions, facts);
            walk_expr_facts(value, owner, known_functions, facts);
        }
        ExprKind::IfExp { test, body, orelse } => {
            walk_expr_facts(test, owner, known_functions, facts);
            walk_expr_facts(body, owner, known_functions, facts);
            walk_expr_facts(orelse, owner, known_functions, facts);
        }
        ExprKind::Starred(inner) => walk_expr_facts(inner, owner, known_functions, facts),
        ExprKind::Slice { lower, upper, step } => {
            for e in [lower, upper, step].into_iter().flatten() {
                walk_expr_facts(e, owner, known_functions, facts);
            }
        }
        ExprKind::Yield { value, .. } => {
            facts.has_yield = true;
            if let Some(v) = value {
                walk_expr_facts(v, owner, known_functions, facts);
            }
        }
        ExprKind::Name(_) | ExprKind::Constant(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Span};

    fn span() -> Span {
        Span::default()
    }

    fn fib_module() -> Module {
        // def fib(n):
        //     if n < 2: return n
        //     return fib(n - 1) + fib(n - 2)
        let n = Expr::new(span(), ExprKind::Name("n".into()));
        let two = Expr::new(span(), ExprKind::Constant(crate::ast::Constant::Int(2)));
        let test = Expr::new(
            span(),
            ExprKind::Compare {
                left: Box::new(n.clone()),
                ops: vec![crate::ast::CmpOp::Lt],
                comparators: vec![two],
            },
        );
        let body = vec![
            Stmt::new(
                span(),
                StmtKind::If {
                    test,
                    body: vec![Stmt::new(span(), StmtKind::Return { value: Some(n.clone()) })],
                    orelse: vec![],
                },
            ),
            Stmt::new(span(), StmtKind::Return { value: Some(n) }),
        ];
        let func = crate::ast::FunctionDef {
            name: "fib".into(),
            args: vec![Param {
                name: "n".into(),
                annotation: None,
                default: None,
            }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body,
            is_async: false,
            is_nested: false,
        };
        Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(span(), StmtKind::FunctionDef(func))],
        }
    }

    #[test]
    fn simple_function_without_side_effects_is_pure() {
        let module = fib_module();
        let mut known = HashSet::new();
        known.insert("fib".to_string());
        let traits = build(&module, &known);
        assert!(traits.is_pure("fib"));
        assert!(!traits.needs_error_union("fib"));
    }

    #[test]
    fn print_call_forces_error_union_via_io() {
        let print_call = Stmt::new(
            span(),
            StmtKind::Expr(Expr::new(
                span(),
                ExprKind::Call {
                    func: Box::new(Expr::new(span(), ExprKind::Name("print".into()))),
                    args: vec![Expr::new(span(), ExprKind::Constant(crate::ast::Constant::Int(1)))],
                    keywords: vec![],
                },
            )),
        );
        let func = crate::ast::FunctionDef {
            name: "greet".into(),
            args: vec![],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![print_call],
            is_async: false,
            is_nested: false,
        };
        let module = Module {
            source_path: "m.py".into(),
            body: vec![Stmt::new(span(), StmtKind::FunctionDef(func))],
        };
        let mut known = HashSet::new();
        known.insert("greet".to_string());
        let traits = build(&module, &known);
        assert!(traits.needs_error_union("greet"));
        assert!(!traits.is_pure("greet"));
    }
}
