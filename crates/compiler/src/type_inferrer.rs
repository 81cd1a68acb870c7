//! Flow-sensitive type assignment over the AST (§4.3).
//!
//! Inference never fails: every expression gets *some* `Type`, falling back
//! to [`Type::Unknown`] when nothing better is known. That fallback is what
//! lets the code generator always have a plan (the duck-typed tagged-value
//! path) even for constructs the inferrer can't pin down.

use std::collections::HashMap;

use crate::ast::{
    BinOp, BoolOp, Comprehension, Constant, Expr, ExprKind, Module, Param, Stmt, StmtKind,
    TypeAnnotation,
};
use crate::builtins::builtin_return_type;
use crate::class_registry::ClassRegistry;
use crate::types::{Signature, Type};

/// A function's inferred (or annotated) interface.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub params: Vec<(String, Type)>,
    pub ret: Type,
}

/// Two-level type map: a global table for module-level names and one table
/// per function scope, keyed as `scope_name:var_name` per the spec's data
/// model. Scopes are flat by name here (not a stack) because the inferrer
/// runs as a single pre-pass before the generator's own scope-stack
/// (`SymbolTable`) exists.
#[derive(Debug, Default)]
pub struct TypeInferrer {
    global: HashMap<String, Type>,
    scoped: HashMap<String, Type>,
    functions: HashMap<String, FunctionType>,
    /// Names declared `global` somewhere in the module, collected up front
    /// so an assignment inside the declaring function's scope still widens
    /// the module-scope entry rather than only the function-local one.
    global_names: std::collections::HashSet<String>,
    /// Expressions (by span) whose evaluation requires the duck-typed
    /// runtime protocol: `in`/`not in` on a value of unknown shape.
    needs_runtime: std::collections::HashSet<(u32, u32)>,
}

fn scope_key(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}

impl TypeInferrer {
    pub fn new() -> Self {
        TypeInferrer::default()
    }

    pub fn function_type(&self, name: &str) -> Option<&FunctionType> {
        self.functions.get(name)
    }

    /// The widened type recorded for a module-scope name, or `Unknown` if
    /// the inferrer never saw an assignment to it (e.g. a `global` name a
    /// function only reads, never itself sets).
    pub fn global_type(&self, name: &str) -> Type {
        self.global.get(name).cloned().unwrap_or(Type::Unknown)
    }

    pub fn needs_runtime(&self, expr: &Expr) -> bool {
        self.needs_runtime.contains(&(expr.span.line, expr.span.column))
    }

    /// Entry point: walk the whole module, recording the type of every
    /// lvalue. Must run after the Module Analyzer / Class Registry
    /// population (function signatures and class fields feed call/attribute
    /// inference) but before the Mutation Analyzer.
    pub fn analyze(&mut self, module: &Module, classes: &ClassRegistry) {
        // Pre-register function signatures from annotations so forward
        // references (a function calling one defined later) still resolve.
        self.prescan_function_signatures(&module.body);
        self.prescan_global_names(&module.body);

        for stmt in &module.body {
            self.analyze_stmt(stmt, "module", classes);
        }
    }

    fn prescan_global_names(&mut self, body: &[Stmt]) {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Global { names } => self.global_names.extend(names.iter().cloned()),
                StmtKind::FunctionDef(f) => self.prescan_global_names(&f.body),
                StmtKind::ClassDef(c) => self.prescan_global_names(&c.body),
                _ => {}
            }
        }
    }

    fn prescan_function_signatures(&mut self, body: &[Stmt]) {
        for stmt in body {
            if let StmtKind::FunctionDef(f) = &stmt.kind {
                let params = f
                    .args
                    .iter()
                    .map(|p| (p.name.clone(), annotation_to_type(p.annotation.as_ref())))
                    .collect();
                let ret = f
                    .return_annotation
                    .as_ref()
                    .map(annotation_to_type_some)
                    .unwrap_or(Type::Unknown);
                self.functions
                    .insert(f.name.clone(), FunctionType { params, ret });
                self.prescan_function_signatures(&f.body);
            }
        }
    }

    fn analyze_stmt(&mut self, stmt: &Stmt, scope: &str, classes: &ClassRegistry) {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let value_ty = self.infer_expr(scope, value, classes);
                for target in targets {
                    self.assign_lvalue(scope, target, &value_ty, classes);
                }
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                // Annotation is authoritative regardless of what the value
                // expression would otherwise infer to.
                let declared = annotation_to_type_some(annotation);
                if let Some(value) = value {
                    self.infer_expr(scope, value, classes);
                }
                self.assign_lvalue(scope, target, &declared, classes);
            }
            StmtKind::AugAssign { target, value, .. } => {
                let value_ty = self.infer_expr(scope, value, classes);
                let current = self.lookup(scope, target);
                let joined = match current {
                    Some(cur) => Type::widen(&cur, &value_ty),
                    None => value_ty,
                };
                self.assign_lvalue(scope, target, &joined, classes);
            }
            StmtKind::If { test, body, orelse } => {
                self.infer_expr(scope, test, classes);
                for s in body {
                    self.analyze_stmt(s, scope, classes);
                }
                for s in orelse {
                    self.analyze_stmt(s, scope, classes);
                }
            }
            StmtKind::While { test, body, orelse } => {
                self.infer_expr(scope, test, classes);
                for s in body.iter().chain(orelse.iter()) {
                    self.analyze_stmt(s, scope, classes);
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iter_ty = self.infer_expr(scope, iter, classes);
                let element = element_type_of_iterable(&iter_ty);
                self.assign_lvalue(scope, target, &element, classes);
                for s in body.iter().chain(orelse.iter()) {
                    self.analyze_stmt(s, scope, classes);
                }
            }
            StmtKind::Match { subject, cases } => {
                self.infer_expr(scope, subject, classes);
                for case in cases {
                    for s in &case.body {
                        self.analyze_stmt(s, scope, classes);
                    }
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    let ty = self.infer_expr(scope, value, classes);
                    if let Some(f) = self.functions.get_mut(scope) {
                        f.ret = Type::widen(&f.ret, &ty);
                    }
                }
            }
            StmtKind::Raise { exc, cause } => {
                if let Some(exc) = exc {
                    self.infer_expr(scope, exc, classes);
                }
                if let Some(cause) = cause {
                    self.infer_expr(scope, cause, classes);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for s in body {
                    self.analyze_stmt(s, scope, classes);
                }
                for handler in handlers {
                    if let Some(name) = &handler.bound_name {
                        self.assign_lvalue_named(scope, name, &Type::Unknown);
                    }
                    for s in &handler.body {
                        self.analyze_stmt(s, scope, classes);
                    }
                }
                for s in orelse.iter().chain(finalbody.iter()) {
                    self.analyze_stmt(s, scope, classes);
                }
            }
            StmtKind::With { items, body } => {
                for item in items {
                    let ty = self.infer_expr(scope, &item.context_expr, classes);
                    if let Some(target) = &item.optional_vars {
                        self.assign_lvalue(scope, target, &ty, classes);
                    }
                }
                for s in body {
                    self.analyze_stmt(s, scope, classes);
                }
            }
            StmtKind::ClassDef(c) => {
                for s in &c.body {
                    self.analyze_stmt(s, &c.name, classes);
                }
            }
            StmtKind::FunctionDef(f) => {
                let fn_scope = f.name.clone();
                // Seed parameter bindings into the function's own scope so
                // the body can look them up.
                if let Some(sig) = self.functions.get(&f.name).cloned() {
                    for (name, ty) in &sig.params {
                        self.assign_lvalue_named(&fn_scope, name, ty);
                    }
                }
                for s in &f.body {
                    self.analyze_stmt(s, &fn_scope, classes);
                }
            }
            StmtKind::Expr(e) => {
                self.infer_expr(scope, e, classes);
            }
            StmtKind::Global { .. }
            | StmtKind::Del { .. }
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Import { .. }
            | StmtKind::ImportFrom { .. } => {}
            StmtKind::Yield {
                value,
                is_yield_from: _,
            } => {
                if let Some(value) = value {
                    self.infer_expr(scope, value, classes);
                }
            }
        }
    }

    fn assign_lvalue(&mut self, scope: &str, target: &Expr, ty: &Type, classes: &ClassRegistry) {
        match &target.kind {
            ExprKind::Name(name) => self.assign_lvalue_named(scope, name, ty),
            ExprKind::Tuple(elems) | ExprKind::List(elems) => {
                // Tuple/list unpacking: each target gets the corresponding
                // component type if known, else Unknown.
                if let Type::Tuple(component_types) = ty {
                    for (elem, component) in elems.iter().zip(component_types.iter()) {
                        self.assign_lvalue(scope, elem, component, classes);
                    }
                } else {
                    for elem in elems {
                        self.assign_lvalue(scope, elem, &Type::Unknown, classes);
                    }
                }
            }
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                // `self.x = ...` / `container[k] = ...`: these don't bind a
                // local name, they're handled by the mutation analyzer and
                // (for `self.x`) by class field collection in codegen.
            }
            _ => {}
        }
    }

    fn assign_lvalue_named(&mut self, scope: &str, name: &str, ty: &Type) {
        let key = scope_key(scope, name);
        let joined = match self.scoped.get(&key) {
            Some(existing) => Type::widen(existing, ty),
            None => ty.clone(),
        };
        self.scoped.insert(key, joined.clone());
        if scope == "module" || self.global_names.contains(name) {
            let joined_global = match self.global.get(name) {
                Some(existing) => Type::widen(existing, &joined),
                None => joined,
            };
            self.global.insert(name.to_string(), joined_global);
        }
    }

    fn lookup(&self, scope: &str, target: &Expr) -> Option<Type> {
        if let ExprKind::Name(name) = &target.kind {
            self.scoped
                .get(&scope_key(scope, name))
                .or_else(|| self.global.get(name))
                .cloned()
        } else {
            None
        }
    }

    /// Name resolution: prefer local-scope type, fall back to global, fall
    /// back to `unknown`.
    fn resolve_name(&self, scope: &str, name: &str) -> Type {
        self.scoped
            .get(&scope_key(scope, name))
            .or_else(|| self.global.get(name))
            .cloned()
            .unwrap_or(Type::Unknown)
    }

    pub fn infer_expr(&mut self, scope: &str, expr: &Expr, classes: &ClassRegistry) -> Type {
        match &expr.kind {
            ExprKind::Constant(c) => infer_constant(c),
            ExprKind::Name(name) => self.resolve_name(scope, name),
            ExprKind::UnaryOp { op, operand } => {
                let ty = self.infer_expr(scope, operand, classes);
                match op {
                    crate::ast::UnaryOp::Not => Type::Bool,
                    _ => ty,
                }
            }
            ExprKind::BinOp { left, op, right } => {
                let lt = self.infer_expr(scope, left, classes);
                let rt = self.infer_expr(scope, right, classes);
                infer_binop(*op, &lt, &rt)
            }
            ExprKind::BoolOp { op: _, values } => {
                let types: Vec<Type> = values
                    .iter()
                    .map(|v| self.infer_expr(scope, v, classes))
                    .collect();
                Type::widen_all(types.iter())
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                self.infer_expr(scope, left, classes);
                for c in comparators {
                    self.infer_expr(scope, c, classes);
                }
                if ops
                    .iter()
                    .any(|op| matches!(op, crate::ast::CmpOp::In | crate::ast::CmpOp::NotIn))
                {
                    self.needs_runtime.insert((expr.span.line, expr.span.column));
                }
                Type::Bool
            }
            ExprKind::Call { func, args, .. } => {
                for a in args {
                    self.infer_expr(scope, a, classes);
                }
                self.infer_call(scope, func, classes)
            }
            ExprKind::Attribute { value, attr } => {
                let receiver = self.infer_expr(scope, value, classes);
                if let Type::ClassInstance(class_name) = &receiver {
                    if let Some(info) = classes.get(class_name) {
                        if let Some(field_ty) = info.fields.get(attr) {
                            return field_ty.clone();
                        }
                    }
                }
                Type::Unknown
            }
            ExprKind::Subscript { value, index } => {
                let receiver = self.infer_expr(scope, value, classes);
                self.infer_expr(scope, index, classes);
                match receiver {
                    Type::List(elem) => *elem,
                    Type::Dict(_, v) => *v,
                    Type::Str { .. } => Type::str_runtime(),
                    Type::Bytes => Type::Bytes,
                    Type::Tuple(elems) => Type::widen_all(elems.iter()),
                    _ => Type::Unknown,
                }
            }
            ExprKind::List(elems) => {
                let types: Vec<Type> = elems
                    .iter()
                    .map(|e| self.infer_expr(scope, e, classes))
                    .collect();
                Type::List(Box::new(Type::widen_all(types.iter())))
            }
            ExprKind::Tuple(elems) => {
                let types = elems
                    .iter()
                    .map(|e| self.infer_expr(scope, e, classes))
                    .collect();
                Type::Tuple(types)
            }
            ExprKind::Dict(entries) => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for (k, v) in entries {
                    if let Some(k) = k {
                        keys.push(self.infer_expr(scope, k, classes));
                    }
                    values.push(self.infer_expr(scope, v, classes));
                }
                Type::Dict(
                    Box::new(Type::widen_all(keys.iter())),
                    Box::new(Type::widen_all(values.iter())),
                )
            }
            ExprKind::Set(elems) => {
                let types: Vec<Type> = elems
                    .iter()
                    .map(|e| self.infer_expr(scope, e, classes))
                    .collect();
                Type::Set(Box::new(Type::widen_all(types.iter())))
            }
            ExprKind::Lambda { args, body } => {
                let params = args
                    .iter()
                    .map(|p| annotation_to_type(p.annotation.as_ref()))
                    .collect();
                let ret = self.infer_expr(scope, body, classes);
                Type::Callable(Box::new(Signature::new(params, ret)))
            }
            ExprKind::ListComp { element, generators } => {
                let ty = self.infer_comprehension_element(scope, element, generators, classes);
                Type::List(Box::new(ty))
            }
            ExprKind::SetComp { element, generators } => {
                let ty = self.infer_comprehension_element(scope, element, generators, classes);
                Type::Set(Box::new(ty))
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                for g in generators {
                    let iter_ty = self.infer_expr(scope, &g.iter, classes);
                    let elem = element_type_of_iterable(&iter_ty);
                    self.assign_lvalue(scope, &g.target, &elem, classes);
                    for cond in &g.ifs {
                        self.infer_expr(scope, cond, classes);
                    }
                }
                let k = self.infer_expr(scope, key, classes);
                let v = self.infer_expr(scope, value, classes);
                Type::Dict(Box::new(k), Box::new(v))
            }
            ExprKind::GeneratorExp { element, generators } => {
                let ty = self.infer_comprehension_element(scope, element, generators, classes);
                Type::List(Box::new(ty))
            }
            ExprKind::FString { parts } => {
                for part in parts {
                    if let crate::ast::FStringPart::Expr { value, .. } = part {
                        self.infer_expr(scope, value, classes);
                    }
                }
                Type::str_runtime()
            }
            ExprKind::NamedExpr { target, value } => {
                let ty = self.infer_expr(scope, value, classes);
                self.assign_lvalue(scope, target, &ty, classes);
                ty
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.infer_expr(scope, test, classes);
                let a = self.infer_expr(scope, body, classes);
                let b = self.infer_expr(scope, orelse, classes);
                Type::widen(&a, &b)
            }
            ExprKind::Await(inner) => self.infer_expr(scope, inner, classes),
            ExprKind::Slice { lower, upper, step } => {
                for e in [lower, upper, step].into_iter().flatten() {
                    self.infer_expr(scope, e, classes);
                }
                Type::Unknown
            }
            ExprKind::Starred(inner) => self.infer_expr(scope, inner, classes),
            ExprKind::Yield { value, .. } => {
                if let Some(value) = value {
                    self.infer_expr(scope, value, classes)
                } else {
                    Type::None
                }
            }
        }
    }

    fn infer_comprehension_element(
        &mut self,
        scope: &str,
        element: &Expr,
        generators: &[Comprehension],
        classes: &ClassRegistry,
    ) -> Type {
        for g in generators {
            let iter_ty = self.infer_expr(scope, &g.iter, classes);
            let elem = element_type_of_iterable(&iter_ty);
            self.assign_lvalue(scope, &g.target, &elem, classes);
            for cond in &g.ifs {
                self.infer_expr(scope, cond, classes);
            }
        }
        self.infer_expr(scope, element, classes)
    }

    fn infer_call(&mut self, scope: &str, func: &Expr, classes: &ClassRegistry) -> Type {
        if let ExprKind::Name(name) = &func.kind {
            if let Some(sig) = self.functions.get(name) {
                return sig.ret.clone();
            }
            if classes.contains(name) {
                return Type::ClassInstance(name.clone());
            }
            if let Some(ty) = builtin_return_type(name) {
                return ty;
            }
            return Type::Unknown;
        }
        self.infer_expr(scope, func, classes)
    }
}

fn infer_constant(c: &Constant) -> Type {
    match c {
        Constant::Int(_) => Type::Int,
        Constant::BigInt(_) => Type::BigInt,
        Constant::Float(_) => Type::Float,
        Constant::Bool(_) => Type::Bool,
        Constant::Str(_) => Type::str_static(),
        Constant::Bytes(_) => Type::Bytes,
        Constant::None => Type::None,
        Constant::Ellipsis => Type::Unknown,
        Constant::Complex { .. } => Type::Unknown,
    }
}

fn infer_binop(op: BinOp, left: &Type, right: &Type) -> Type {
    match op {
        BinOp::Div => Type::Float,
        BinOp::FloorDiv => {
            if matches!(left, Type::Int | Type::BigInt) && matches!(right, Type::Int | Type::BigInt)
            {
                Type::widen(left, right)
            } else {
                Type::Float
            }
        }
        BinOp::Add => match (left, right) {
            (Type::Str { .. }, Type::Str { .. }) => Type::str_runtime(),
            (Type::Bytes, Type::Bytes) => Type::Bytes,
            (Type::List(a), Type::List(b)) => Type::List(Box::new(Type::widen(a, b))),
            _ => Type::widen(left, right),
        },
        BinOp::Mod if matches!(left, Type::Str { .. }) => Type::str_runtime(),
        _ => Type::widen(left, right),
    }
}

fn element_type_of_iterable(ty: &Type) -> Type {
    match ty {
        Type::List(elem) | Type::Set(elem) => (**elem).clone(),
        Type::Dict(k, _) => (**k).clone(),
        Type::Tuple(elems) => Type::widen_all(elems.iter()),
        Type::Str { .. } => Type::str_runtime(),
        _ => Type::Unknown,
    }
}

fn annotation_to_type(annotation: Option<&TypeAnnotation>) -> Type {
    annotation.map(annotation_to_type_some).unwrap_or(Type::Unknown)
}

fn annotation_to_type_some(annotation: &TypeAnnotation) -> Type {
    match annotation {
        TypeAnnotation::Name(name) => match name.as_str() {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "str" => Type::str_runtime(),
            "bytes" => Type::Bytes,
            "None" => Type::None,
            other => Type::ClassInstance(other.to_string()),
        },
        TypeAnnotation::Subscript { base, args } => match base.as_str() {
            "list" | "List" => Type::List(Box::new(
                args.first().map(annotation_to_type_some).unwrap_or(Type::Unknown),
            )),
            "set" | "Set" => Type::Set(Box::new(
                args.first().map(annotation_to_type_some).unwrap_or(Type::Unknown),
            )),
            "dict" | "Dict" => {
                let k = args.first().map(annotation_to_type_some).unwrap_or(Type::Unknown);
                let v = args.get(1).map(annotation_to_type_some).unwrap_or(Type::Unknown);
                Type::Dict(Box::new(k), Box::new(v))
            }
            "tuple" | "Tuple" => Type::Tuple(args.iter().map(annotation_to_type_some).collect()),
            _ => Type::Unknown,
        },
    }
}

/// Used by `prescan_function_signatures` callers that need a `Param`
/// defaulted type (no annotation, no call-site info yet): the code
/// generator's own fallback rule (phase 8) is to default to the integer
/// type, but the inferrer itself reports `Unknown` and lets codegen apply
/// that default at emission time.
pub fn default_param_type(_param: &Param) -> Type {
    Type::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn name_expr(n: &str) -> Expr {
        Expr::new(Span::default(), ExprKind::Name(n.to_string()))
    }

    fn const_expr(c: Constant) -> Expr {
        Expr::new(Span::default(), ExprKind::Constant(c))
    }

    #[test]
    fn reassignment_with_different_type_widens() {
        let mut inferrer = TypeInferrer::new();
        let classes = ClassRegistry::new();
        inferrer.assign_lvalue_named("module", "x", &Type::Int);
        inferrer.assign_lvalue_named("module", "x", &Type::Float);
        assert_eq!(inferrer.resolve_name("module", "x"), Type::Float);
        let _ = classes;
    }

    #[test]
    fn division_always_yields_float() {
        let mut inferrer = TypeInferrer::new();
        let classes = ClassRegistry::new();
        let expr = Expr::new(
            Span::default(),
            ExprKind::BinOp {
                left: Box::new(const_expr(Constant::Int(1))),
                op: BinOp::Div,
                right: Box::new(const_expr(Constant::Int(2))),
            },
        );
        assert_eq!(inferrer.infer_expr("module", &expr, &classes), Type::Float);
    }

    #[test]
    fn membership_test_flags_needs_runtime() {
        let mut inferrer = TypeInferrer::new();
        let classes = ClassRegistry::new();
        let span = Span::new(3, 1);
        let expr = Expr::new(
            span,
            ExprKind::Compare {
                left: Box::new(name_expr("x")),
                ops: vec![crate::ast::CmpOp::In],
                comparators: vec![name_expr("xs")],
            },
        );
        inferrer.infer_expr("module", &expr, &classes);
        assert!(inferrer.needs_runtime(&expr));
    }

    #[test]
    fn unresolved_name_falls_back_to_unknown() {
        let mut inferrer = TypeInferrer::new();
        let classes = ClassRegistry::new();
        assert_eq!(
            inferrer.infer_expr("module", &name_expr("mystery"), &classes),
            Type::Unknown
        );
    }
}
