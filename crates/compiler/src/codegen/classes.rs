//! Class emission (§4.9 phase 7, §4.11 generic classes).
//!
//! A class becomes a record type plus one emitted function per method, the
//! receiver passed explicitly as the first parameter (`self` or `&mut self`
//! per whether any method mutates a field). `__init__` becomes a `new`
//! constructor that returns the record; fields are discovered by scanning
//! `__init__` for `self.x = ...` assignments, not from an explicit
//! declaration list -- SL classes don't have one.

use std::collections::HashSet;

use crate::ast::{ClassDef, Expr, ExprKind, FunctionDef, Stmt, StmtKind};
use crate::class_registry::{ClassInfo, ClassRegistry, ClassRegistryError, MethodInfo};
use crate::call_graph::FunctionTraits;
use crate::mutation_analyzer::MutationAnalyzer;
use crate::types::Type;

use super::error::CodeGenResult;
use super::stmt::emit_block;
use super::state::CodeGenState;

const GENERIC_MARKERS: &[&str] = &["Generic", "typing.Generic"];

/// Phase 2 (populate the class registry) for a single class. Call once per
/// top-level `ClassDef` before any method body is emitted, so forward
/// references (a method calling a sibling class's method) resolve.
pub fn register_class(registry: &mut ClassRegistry, class: &ClassDef) -> Result<(), ClassRegistryError> {
    let mut fields = indexmap::IndexMap::new();
    let mut methods = indexmap::IndexMap::new();
    let mut is_mutable = false;

    for stmt in &class.body {
        if let StmtKind::FunctionDef(method) = &stmt.kind {
            if method.name == "__init__" {
                collect_self_fields(&method.body, &mut fields);
            }
            if method_mutates_self(method) {
                is_mutable = true;
            }
            methods.insert(
                method.name.clone(),
                MethodInfo {
                    name: method.name.clone(),
                    owner: class.name.clone(),
                    params: method.args.iter().map(|p| p.name.clone()).collect(),
                    returns_error: false,
                },
            );
        }
    }

    let is_generic = class.bases.iter().any(|b| GENERIC_MARKERS.contains(&b.as_str()));

    registry.register(ClassInfo {
        name: class.name.clone(),
        bases: class.bases.clone(),
        methods,
        fields,
        is_mutable,
        init_returns_error: false,
        is_generic,
    })
}

/// Backfills `init_returns_error` and each method's `returns_error` from the
/// call-graph's `needs_error_union` once it has been computed (it can only
/// run after the whole module's functions are known).
pub fn backfill_error_unions(registry: &mut ClassRegistry, traits: &FunctionTraits) {
    let names: Vec<String> = registry.iter().map(|c| c.name.clone()).collect();
    for name in names {
        if let Some(info) = registry.get_mut(&name) {
            if traits.needs_error_union("__init__") {
                info.init_returns_error = true;
            }
            for method in info.methods.values_mut() {
                method.returns_error = traits.needs_error_union(&method.name);
            }
        }
    }
}

fn collect_self_fields(body: &[Stmt], fields: &mut indexmap::IndexMap<String, Type>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for t in targets {
                    if let ExprKind::Attribute { value, attr } = &t.kind {
                        if is_self(value) && !fields.contains_key(attr) {
                            fields.insert(attr.clone(), Type::Unknown);
                        }
                    }
                }
            }
            StmtKind::AnnAssign { target, .. } => {
                if let ExprKind::Attribute { value, attr } = &target.kind {
                    if is_self(value) && !fields.contains_key(attr) {
                        fields.insert(attr.clone(), Type::Unknown);
                    }
                }
            }
            StmtKind::If { body, orelse, .. } => {
                collect_self_fields(body, fields);
                collect_self_fields(orelse, fields);
            }
            StmtKind::While { body, orelse, .. } => {
                collect_self_fields(body, fields);
                collect_self_fields(orelse, fields);
            }
            StmtKind::For { body, orelse, .. } => {
                collect_self_fields(body, fields);
                collect_self_fields(orelse, fields);
            }
            StmtKind::Try { body, handlers, orelse, finalbody } => {
                collect_self_fields(body, fields);
                for h in handlers {
                    collect_self_fields(&h.body, fields);
                }
                collect_self_fields(orelse, fields);
                collect_self_fields(finalbody, fields);
            }
            StmtKind::With { body, .. } => collect_self_fields(body, fields),
            _ => {}
        }
    }
}

fn is_self(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Name(n) if n == "self")
}

fn method_mutates_self(method: &FunctionDef) -> bool {
    fn walk(body: &[Stmt]) -> bool {
        body.iter().any(|stmt| match &stmt.kind {
            StmtKind::Assign { targets, .. } => targets.iter().any(|t| matches!(&t.kind, ExprKind::Attribute { value, .. } if is_self(value))),
            StmtKind::AugAssign { target, .. } => matches!(&target.kind, ExprKind::Attribute { value, .. } if is_self(value)),
            StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } | StmtKind::For { body, orelse, .. } => {
                walk(body) || walk(orelse)
            }
            StmtKind::Try { body, handlers, orelse, finalbody } => {
                walk(body) || handlers.iter().any(|h| walk(&h.body)) || walk(orelse) || walk(finalbody)
            }
            StmtKind::With { body, .. } => walk(body),
            _ => false,
        })
    }
    walk(&method.body)
}

/// Emits the record-with-methods form for one class. Must run after
/// `register_class`/`backfill_error_unions` for every class in the module
/// (a method may call a sibling class's method, or its own base's).
pub fn emit_class(
    state: &mut CodeGenState,
    class: &ClassDef,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let classes_snapshot = state.class_registry.clone();
    let info = classes_snapshot
        .get(&class.name)
        .expect("class_registry must be populated before emit_class runs");

    if !info.is_generic {
        state.write_line(&format!("record {} {{", class.name));
        state.indent();
        for (field, ty) in &info.fields {
            state.write_line(&format!("{field}: {ty},"));
        }
        state.dedent();
        state.write_line("}");
    } else {
        state.write_line(&format!("generic record {}<T> {{", class.name));
        state.indent();
        for (field, ty) in &info.fields {
            state.write_line(&format!("{field}: {ty},"));
        }
        state.dedent();
        state.write_line("}");
    }

    for stmt in &class.body {
        if let StmtKind::FunctionDef(method) = &stmt.kind {
            emit_method(state, class, method, &classes_snapshot, mutation)?;
        }
    }
    Ok(())
}

fn emit_method(
    state: &mut CodeGenState,
    class: &ClassDef,
    method: &FunctionDef,
    classes: &ClassRegistry,
    mutation: &MutationAnalyzer,
) -> CodeGenResult<()> {
    let fn_name = format!("{}__{}", class.name, method.name);
    state.enter_function(&fn_name);

    let is_init = method.name == "__init__";
    let receiver_mutates = classes.get(&class.name).map(|c| c.is_mutable).unwrap_or(false);

    let mut params = Vec::new();
    if !is_init {
        params.push(if receiver_mutates {
            "self: &mut Self".to_string()
        } else {
            "self: &Self".to_string()
        });
    }
    // Build the non-`self` parameter list (both __init__ and ordinary
    // methods declare `self` as args[0] in the source).
    let rest: Vec<&crate::ast::Param> = method.args.iter().skip(1).collect();
    for p in &rest {
        params.push(format!("{}: {}", p.name, param_type_text(p)));
    }

    let returns_error = classes
        .get(&class.name)
        .and_then(|c| c.methods.get(&method.name))
        .map(|m| m.returns_error)
        .unwrap_or(false);

    let return_ty = if is_init {
        if returns_error {
            format!("Result<{}>", class.name)
        } else {
            class.name.clone()
        }
    } else if returns_error {
        "Result<Unknown>".to_string()
    } else {
        "Unknown".to_string()
    };

    state.write_line(&format!(
        "fn {fn_name}({}) -> {return_ty} {{",
        params.join(", ")
    ));
    state.indent();

    let rewritten_body = rewrite_super_calls(&method.body, class);
    if is_init {
        state.write_line(&format!("var self = {}::default();", class.name));
        emit_block(state, &rewritten_body, classes, mutation)?;
        state.write_line("return self;");
    } else {
        emit_block(state, &rewritten_body, classes, mutation)?;
    }

    state.dedent();
    state.write_line("}");
    state.exit_function();
    Ok(())
}

fn param_type_text(_param: &crate::ast::Param) -> &'static str {
    "Unknown"
}

/// `super().method(...)` is rewritten to a direct qualified call to the
/// method the left-to-right MRO resolves for the *first declared base*,
/// since SL's `super()` with no arguments means "the next class in this
/// class's own MRO".
fn rewrite_super_calls(body: &[Stmt], class: &ClassDef) -> Vec<Stmt> {
    body.iter().map(|s| rewrite_stmt(s, class)).collect()
}

fn rewrite_stmt(stmt: &Stmt, class: &ClassDef) -> Stmt {
    let kind = match &stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(rewrite_expr(e, class)),
        StmtKind::Assign { targets, value } => StmtKind::Assign {
            targets: targets.clone(),
            value: rewrite_expr(value, class),
        },
        StmtKind::Return { value } => StmtKind::Return {
            value: value.as_ref().map(|v| rewrite_expr(v, class)),
        },
        StmtKind::If { test, body, orelse } => StmtKind::If {
            test: rewrite_expr(test, class),
            body: rewrite_super_calls(body, class),
            orelse: rewrite_super_calls(orelse, class),
        },
        other => other.clone(),
    };
    Stmt::new(stmt.span, kind)
}

fn rewrite_expr(expr: &Expr, class: &ClassDef) -> Expr {
    if let ExprKind::Call { func, args, keywords } = &expr.kind {
        if let ExprKind::Attribute { value, attr } = &func.kind {
            if is_super_call(value) {
                if let Some(base) = class.bases.first() {
                    let qualified = format!("{base}__{attr}");
                    return Expr::new(
                        expr.span,
                        ExprKind::Call {
                            func: Box::new(Expr::new(expr.span, ExprKind::Name(qualified))),
                            args: args.clone(),
                            keywords: keywords.clone(),
                        },
                    );
                }
            }
        }
    }
    expr.clone()
}

fn is_super_call(expr: &Expr) -> bool {
    matches!(
        &expr.kind,
        ExprKind::Call { func, args, .. } if args.is_empty() && matches!(&func.kind, ExprKind::Name(n) if n == "super")
    )
}

#[allow(dead_code)]
fn referenced_class_names(class: &ClassDef) -> HashSet<String> {
    class.bases.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, Span};

    fn init_with_field(field: &str) -> FunctionDef {
        let target = Expr::new(
            Span::default(),
            ExprKind::Attribute {
                value: Box::new(Expr::new(Span::default(), ExprKind::Name("self".into()))),
                attr: field.to_string(),
            },
        );
        let value = Expr::new(Span::default(), ExprKind::Constant(crate::ast::Constant::Int(0)));
        FunctionDef {
            name: "__init__".into(),
            args: vec![Param { name: "self".into(), annotation: None, default: None }],
            vararg: None,
            kwarg: None,
            decorators: vec![],
            return_annotation: None,
            body: vec![Stmt::new(Span::default(), StmtKind::Assign { targets: vec![target], value })],
            is_async: false,
            is_nested: false,
        }
    }

    #[test]
    fn init_self_assignment_becomes_a_field() {
        let class = ClassDef {
            name: "Point".into(),
            bases: vec![],
            decorators: vec![],
            body: vec![Stmt::new(Span::default(), StmtKind::FunctionDef(init_with_field("x")))],
        };
        let mut registry = ClassRegistry::new();
        register_class(&mut registry, &class).unwrap();
        let info = registry.get("Point").unwrap();
        assert!(info.fields.contains_key("x"));
    }

    #[test]
    fn generic_base_marks_class_as_generic() {
        let class = ClassDef {
            name: "Box".into(),
            bases: vec!["Generic".into()],
            decorators: vec![],
            body: vec![],
        };
        let mut registry = ClassRegistry::new();
        register_class(&mut registry, &class).unwrap();
        assert!(registry.get("Box").unwrap().is_generic);
    }

    #[test]
    fn super_call_is_rewritten_to_a_qualified_base_method() {
        let call = Expr::new(
            Span::default(),
            ExprKind::Call {
                func: Box::new(Expr::new(
                    Span::default(),
                    ExprKind::Attribute {
                        value: Box::new(Expr::new(
                            Span::default(),
                            ExprKind::Call {
                                func: Box::new(Expr::new(Span::default(), ExprKind::Name("super".into()))),
                                args: vec![],
                                keywords: vec![],
                            },
                        )),
                        attr: "greet".into(),
                    },
                )),
                args: vec![],
                keywords: vec![],
            },
        );
        let class = ClassDef {
            name: "Derived".into(),
            bases: vec!["Base".into()],
            decorators: vec![],
            body: vec![],
        };
        let rewritten = rewrite_expr(&call, &class);
        match rewritten.kind {
            ExprKind::Call { func, .. } => {
                assert!(matches!(func.kind, ExprKind::Name(n) if n == "Base__greet"));
            }
            _ => panic!("expected a call"),
        }
    }
}
