//! Expression emission (§4.9 "Expression emission").

use crate::ast::{BinOp, BoolOp, CmpOp, Constant, Expr, ExprKind, UnaryOp};
use crate::builtins::{direct_lowering, DirectLowering};
use crate::class_registry::ClassRegistry;
use crate::types::Type;

use super::error::{CodeGenError, CodeGenResult};
use super::state::CodeGenState;

pub fn emit_expr(state: &mut CodeGenState, expr: &Expr, classes: &ClassRegistry) -> CodeGenResult<String> {
    let scope = state.current_function.clone().unwrap_or_else(|| "module".to_string());
    match &expr.kind {
        ExprKind::Name(name) => Ok(state.resolve_name(name)),
        ExprKind::Constant(c) => emit_constant(state, c),
        ExprKind::UnaryOp { op, operand } => {
            let inner = emit_expr(state, operand, classes)?;
            Ok(match op {
                UnaryOp::Not => format!("!({inner})"),
                UnaryOp::Neg => format!("-({inner})"),
                UnaryOp::Pos => inner,
                UnaryOp::Invert => format!("~({inner})"),
            })
        }
        ExprKind::BinOp { left, op, right } => {
            let lt = state.type_inferrer.infer_expr(&scope, left, classes);
            let l = emit_expr(state, left, classes)?;
            let r = emit_expr(state, right, classes)?;
            Ok(emit_binop(*op, &l, &r, &lt))
        }
        ExprKind::BoolOp { op, values } => {
            let sep = match op {
                BoolOp::And => " && ",
                BoolOp::Or => " || ",
            };
            let parts = values
                .iter()
                .map(|v| emit_expr(state, v, classes))
                .collect::<CodeGenResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(sep)))
        }
        ExprKind::Compare { left, ops, comparators } => emit_compare(state, left, ops, comparators, classes),
        ExprKind::Call { func, args, keywords } => emit_call(state, func, args, keywords, classes),
        ExprKind::Attribute { value, attr } => {
            if let ExprKind::Name(name) = &value.kind {
                if name == "self" {
                    return Ok(format!("self.{attr}"));
                }
            }
            let receiver = emit_expr(state, value, classes)?;
            Ok(format!("{receiver}.{attr}"))
        }
        ExprKind::Subscript { value, index } => {
            if let ExprKind::Slice { lower, upper, step } = &index.kind {
                let receiver = emit_expr(state, value, classes)?;
                return emit_slice(state, &receiver, lower, upper, step, classes);
            }
            let receiver = emit_expr(state, value, classes)?;
            let idx = emit_expr(state, index, classes)?;
            Ok(format!("{receiver}[{idx}]"))
        }
        ExprKind::List(elems) => emit_sequence_literal(state, elems, "array_of", classes),
        ExprKind::Tuple(elems) => emit_sequence_literal(state, elems, "tuple_of", classes),
        ExprKind::Set(elems) => emit_sequence_literal(state, elems, "set_of", classes),
        ExprKind::Dict(entries) => {
            let mut parts = Vec::new();
            for (k, v) in entries {
                let value = emit_expr(state, v, classes)?;
                let key = match k {
                    Some(k) => emit_expr(state, k, classes)?,
                    None => return Err(CodeGenError::UnsupportedConstruct {
                        span: expr.span,
                        category: "dict_unpack",
                        detail: "`**` unpacking inside a dict literal is not lowered".to_string(),
                    }),
                };
                parts.push(format!("{key}: {value}"));
            }
            Ok(format!("map_of({{{}}})", parts.join(", ")))
        }
        ExprKind::Lambda { args, body } => {
            let params: Vec<&str> = args.iter().map(|p| p.name.as_str()).collect();
            let lambda_name = state.counters.next_lambda_struct();
            state.pending_lambda_structs.push(lambda_name.clone());
            let body_text = emit_expr(state, body, classes)?;
            Ok(format!("{lambda_name}::new(|{}| {body_text})", params.join(", ")))
        }
        ExprKind::ListComp { element, generators } => emit_comprehension(state, element, generators, "array_of", classes),
        ExprKind::SetComp { element, generators } => emit_comprehension(state, element, generators, "set_of", classes),
        ExprKind::GeneratorExp { element, generators } => emit_comprehension(state, element, generators, "array_of", classes),
        ExprKind::DictComp { key, value, generators } => {
            let mut lines = Vec::new();
            for g in generators {
                let iter = emit_expr(state, &g.iter, classes)?;
                let target = emit_expr(state, &g.target, classes)?;
                lines.push(format!("for {target} in {iter}"));
            }
            let k = emit_expr(state, key, classes)?;
            let v = emit_expr(state, value, classes)?;
            Ok(format!("map_comprehension({{{} => {k}: {v}}})", lines.join(" ")))
        }
        ExprKind::FString { parts } => {
            let mut pieces = Vec::new();
            for part in parts {
                match part {
                    crate::ast::FStringPart::Literal(s) => pieces.push(tl_string_literal(s)),
                    crate::ast::FStringPart::Expr { value, .. } => {
                        let v = emit_expr(state, value, classes)?;
                        pieces.push(format!("to_string({v})"));
                    }
                }
            }
            Ok(format!("string_concat([{}])", pieces.join(", ")))
        }
        ExprKind::NamedExpr { target, value } => {
            let t = emit_expr(state, target, classes)?;
            let v = emit_expr(state, value, classes)?;
            Ok(format!("({t} = {v})"))
        }
        ExprKind::IfExp { test, body, orelse } => {
            let t = emit_expr(state, test, classes)?;
            let a = emit_expr(state, body, classes)?;
            let b = emit_expr(state, orelse, classes)?;
            Ok(format!("(if {t} {{ {a} }} else {{ {b} }})"))
        }
        ExprKind::Await(inner) => {
            // Trivial-async lowering (§9): `await x` rewrites to `x` when
            // the enclosing function's trait analysis showed no true
            // asynchrony; state-machine lowering is handled at the
            // statement level in `functions.rs`, not per-expression.
            emit_expr(state, inner, classes)
        }
        ExprKind::Starred(inner) => {
            let v = emit_expr(state, inner, classes)?;
            Ok(format!("...{v}"))
        }
        ExprKind::Slice { .. } => Err(CodeGenError::InternalInvariant(
            "bare slice expression reached emit_expr outside a subscript".to_string(),
        )),
        ExprKind::Yield { .. } => Err(CodeGenError::InternalInvariant(
            "yield-as-expression reached emit_expr; generator bodies lower yields at statement level"
                .to_string(),
        )),
    }
}

fn emit_constant(state: &mut CodeGenState, c: &Constant) -> CodeGenResult<String> {
    Ok(match c {
        Constant::Int(n) => n.to_string(),
        Constant::BigInt(digits) => format!("bigint(\"{digits}\")"),
        Constant::Float(f) => {
            if f.is_nan() {
                "float_nan()".to_string()
            } else if f.is_infinite() {
                if *f > 0.0 { "float_infinity()".to_string() } else { "float_neg_infinity()".to_string() }
            } else {
                format!("{f:?}")
            }
        }
        Constant::Bool(b) => b.to_string(),
        Constant::Str(s) => {
            let index = state.intern_string(s);
            format!("interned_string({index})")
        }
        Constant::Bytes(bytes) => format!("bytes_literal({bytes:?})"),
        Constant::None => "none()".to_string(),
        Constant::Ellipsis => "ellipsis()".to_string(),
        Constant::Complex { re, im } => format!("complex({re:?}, {im:?})"),
    })
}

fn tl_string_literal(s: &str) -> String {
    format!("{:?}", s)
}

fn emit_binop(op: BinOp, l: &str, r: &str, left_ty: &Type) -> String {
    match op {
        BinOp::FloorDiv => format!("floor_div({l}, {r})"),
        BinOp::Pow => format!("pow({l}, {r})"),
        BinOp::Add if matches!(left_ty, Type::List(_)) => format!("concat({l}, {r})"),
        _ => {
            let sym = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Mod => "%",
                BinOp::LShift => "<<",
                BinOp::RShift => ">>",
                BinOp::BitOr => "|",
                BinOp::BitXor => "^",
                BinOp::BitAnd => "&",
                BinOp::MatMul => return format!("matmul({l}, {r})"),
                BinOp::FloorDiv | BinOp::Pow => unreachable!("handled above"),
            };
            format!("({l} {sym} {r})")
        }
    }
}

fn emit_compare(
    state: &mut CodeGenState,
    left: &Expr,
    ops: &[CmpOp],
    comparators: &[Expr],
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let mut pieces = Vec::new();
    let mut prev = emit_expr(state, left, classes)?;
    for (op, comparator) in ops.iter().zip(comparators.iter()) {
        let next = emit_expr(state, comparator, classes)?;
        let piece = match op {
            CmpOp::Eq => format!("({prev} == {next})"),
            CmpOp::NotEq => format!("({prev} != {next})"),
            CmpOp::Lt => format!("({prev} < {next})"),
            CmpOp::LtE => format!("({prev} <= {next})"),
            CmpOp::Gt => format!("({prev} > {next})"),
            CmpOp::GtE => format!("({prev} >= {next})"),
            CmpOp::Is => format!("identical({prev}, {next})"),
            CmpOp::IsNot => format!("!identical({prev}, {next})"),
            CmpOp::In => format!("runtime_contains({next}, {prev})"),
            CmpOp::NotIn => format!("!runtime_contains({next}, {prev})"),
        };
        pieces.push(piece);
        prev = next;
    }
    Ok(if pieces.len() == 1 {
        pieces.pop().unwrap()
    } else {
        format!("({})", pieces.join(" && "))
    })
}

fn emit_call(
    state: &mut CodeGenState,
    func: &Expr,
    args: &[Expr],
    keywords: &[(Option<String>, Expr)],
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    if let ExprKind::Name(name) = &func.kind {
        if let Some(lowering) = direct_lowering(name) {
            return emit_direct_lowering(state, lowering, args, classes);
        }
        let mut rendered = Vec::new();
        for a in args {
            rendered.push(emit_expr(state, a, classes)?);
        }
        for (kw, v) in keywords {
            let value = emit_expr(state, v, classes)?;
            rendered.push(match kw {
                Some(k) => format!("{k}: {value}"),
                None => value,
            });
        }
        if classes.contains(name) {
            return Ok(format!("{name}.new({})", rendered.join(", ")));
        }
        return Ok(format!("{name}({})", rendered.join(", ")));
    }
    if let ExprKind::Attribute { value, attr } = &func.kind {
        let receiver = emit_expr(state, value, classes)?;
        let mut rendered = Vec::new();
        for a in args {
            rendered.push(emit_expr(state, a, classes)?);
        }
        return Ok(format!("{receiver}.{attr}({})", rendered.join(", ")));
    }
    let callee = emit_expr(state, func, classes)?;
    let mut rendered = Vec::new();
    for a in args {
        rendered.push(emit_expr(state, a, classes)?);
    }
    Ok(format!("{callee}.call({})", rendered.join(", ")))
}

fn emit_direct_lowering(
    state: &mut CodeGenState,
    lowering: DirectLowering,
    args: &[Expr],
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let mut rendered = Vec::new();
    for a in args {
        rendered.push(emit_expr(state, a, classes)?);
    }
    Ok(match lowering {
        DirectLowering::Print => format!("tl_print([{}])", rendered.join(", ")),
        DirectLowering::Len => format!("{}.len()", rendered.first().cloned().unwrap_or_default()),
        DirectLowering::Abs => format!("abs({})", rendered.join(", ")),
        DirectLowering::Range => format!("range({})", rendered.join(", ")),
        DirectLowering::Enumerate => format!("enumerate({})", rendered.join(", ")),
        DirectLowering::Zip => format!("zip({})", rendered.join(", ")),
    })
}

fn emit_slice(
    state: &mut CodeGenState,
    receiver: &str,
    lower: &Option<Box<Expr>>,
    upper: &Option<Box<Expr>>,
    step: &Option<Box<Expr>>,
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let lo = match lower {
        Some(e) => emit_expr(state, e, classes)?,
        None => "0".to_string(),
    };
    let hi = match upper {
        Some(e) => emit_expr(state, e, classes)?,
        None => format!("{receiver}.len()"),
    };
    Ok(match step {
        Some(e) => {
            let step_text = emit_expr(state, e, classes)?;
            format!("{receiver}.slice_stepped({lo}, {hi}, {step_text})")
        }
        None => format!("{receiver}.slice({lo}, {hi})"),
    })
}

fn emit_sequence_literal(
    state: &mut CodeGenState,
    elems: &[Expr],
    ctor: &str,
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let mut rendered = Vec::new();
    for e in elems {
        rendered.push(emit_expr(state, e, classes)?);
    }
    Ok(format!("{ctor}([{}])", rendered.join(", ")))
}

fn emit_comprehension(
    state: &mut CodeGenState,
    element: &Expr,
    generators: &[crate::ast::Comprehension],
    ctor: &str,
    classes: &ClassRegistry,
) -> CodeGenResult<String> {
    let mut clauses = Vec::new();
    for g in generators {
        let target = emit_expr(state, &g.target, classes)?;
        let iter = emit_expr(state, &g.iter, classes)?;
        let mut clause = format!("for {target} in {iter}");
        for cond in &g.ifs {
            let c = emit_expr(state, cond, classes)?;
            clause.push_str(&format!(" if {c}"));
        }
        clauses.push(clause);
    }
    let elem = emit_expr(state, element, classes)?;
    Ok(format!("{ctor}({{{} => {elem}}})", clauses.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    #[test]
    fn print_call_lowers_to_direct_form() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let call = Expr::new(
            Span::default(),
            ExprKind::Call {
                func: Box::new(Expr::new(Span::default(), ExprKind::Name("print".into()))),
                args: vec![Expr::new(Span::default(), ExprKind::Constant(Constant::Int(1)))],
                keywords: vec![],
            },
        );
        let rendered = emit_expr(&mut state, &call, &classes).unwrap();
        assert!(rendered.starts_with("tl_print("));
    }

    #[test]
    fn repeated_string_literal_shares_intern_index() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let a = emit_expr(
            &mut state,
            &Expr::new(Span::default(), ExprKind::Constant(Constant::Str("hi".into()))),
            &classes,
        )
        .unwrap();
        let b = emit_expr(
            &mut state,
            &Expr::new(Span::default(), ExprKind::Constant(Constant::Str("hi".into()))),
            &classes,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn floor_division_uses_the_target_builtin() {
        let mut state = CodeGenState::new();
        let classes = ClassRegistry::new();
        let expr = Expr::new(
            Span::default(),
            ExprKind::BinOp {
                left: Box::new(Expr::new(Span::default(), ExprKind::Constant(Constant::Int(7)))),
                op: BinOp::FloorDiv,
                right: Box::new(Expr::new(Span::default(), ExprKind::Constant(Constant::Int(2)))),
            },
        );
        let rendered = emit_expr(&mut state, &expr, &classes).unwrap();
        assert_eq!(rendered, "floor_div(7, 2)");
    }
}
