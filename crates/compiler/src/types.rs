//! The semantic type algebra `T` computed by the Type Inferrer.
//!
//! `Type` is closed: every variant the generator can emit code for is listed
//! here, and `widen` is total over all pairs. There is no error variant --
//! inference never fails, it downgrades to [`Type::Unknown`] instead, which
//! routes the generator down the duck-typed tagged-value path (see
//! `codegen::expr`).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Unknown,
    Int,
    /// An integer literal or expression proven to exceed the native integer
    /// range; lowered to the TL big-int type rather than a machine word.
    BigInt,
    Float,
    Bool,
    Bytes,
    /// `is_static` distinguishes a compile-time string literal (can be
    /// interned, see `codegen::expr::emit_string`) from a runtime-built one.
    Str {
        is_static: bool,
    },
    None,
    List(Box<Type>),
    Tuple(Vec<Type>),
    Dict(Box<Type>, Box<Type>),
    Set(Box<Type>),
    Callable(Box<Signature>),
    ClassInstance(String),
    Closure {
        captures: Vec<Type>,
        signature: Box<Signature>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Signature {
            params,
            ret: Box::new(ret),
        }
    }
}

impl Type {
    pub fn str_static() -> Type {
        Type::Str { is_static: true }
    }

    pub fn str_runtime() -> Type {
        Type::Str { is_static: false }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::BigInt | Type::Float | Type::Bool)
    }

    /// True when a value of this type needs an allocator-backed
    /// representation in the emitted TL (container, heap string, closure,
    /// class instance) rather than being passable by value.
    pub fn needs_allocator(&self) -> bool {
        match self {
            Type::Unknown
            | Type::List(_)
            | Type::Dict(_, _)
            | Type::Set(_)
            | Type::ClassInstance(_)
            | Type::Closure { .. }
            | Type::BigInt => true,
            Type::Str { is_static } => !is_static,
            Type::Tuple(elems) => elems.iter().any(Type::needs_allocator),
            _ => false,
        }
    }

    /// Pairwise widening (the `⊔` operator from the spec's data model).
    ///
    /// Widening is commutative and, for the cases this generator actually
    /// sees (reassignment joins, heterogeneous literal elements, if-expr
    /// branches), terminates in one step -- there is no fixed-point chase
    /// here, unlike the call-graph traits.
    pub fn widen(a: &Type, b: &Type) -> Type {
        if a == b {
            return a.clone();
        }
        match (a, b) {
            (Type::Unknown, other) | (other, Type::Unknown) => other.clone(),
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            (Type::Int, Type::BigInt) | (Type::BigInt, Type::Int) => Type::BigInt,
            (Type::Bool, Type::Int) | (Type::Int, Type::Bool) => Type::Int,
            (Type::Bool, Type::Float) | (Type::Float, Type::Bool) => Type::Float,
            (Type::Str { is_static: a_s }, Type::Str { is_static: b_s }) => Type::Str {
                is_static: *a_s && *b_s,
            },
            (Type::List(x), Type::List(y)) => Type::List(Box::new(Type::widen(x, y))),
            (Type::Set(x), Type::Set(y)) => Type::Set(Box::new(Type::widen(x, y))),
            (Type::Dict(k1, v1), Type::Dict(k2, v2)) => Type::Dict(
                Box::new(Type::widen(k1, k2)),
                Box::new(Type::widen(v1, v2)),
            ),
            (Type::Tuple(xs), Type::Tuple(ys)) if xs.len() == ys.len() => Type::Tuple(
                xs.iter()
                    .zip(ys.iter())
                    .map(|(x, y)| Type::widen(x, y))
                    .collect(),
            ),
            // Divergent joins (e.g. class_instance(A) vs int) fall back to
            // Unknown, forcing the runtime-tagged representation.
            _ => Type::Unknown,
        }
    }

    pub fn widen_all<'a>(types: impl IntoIterator<Item = &'a Type>) -> Type {
        types
            .into_iter()
            .cloned()
            .reduce(|a, b| Type::widen(&a, &b))
            .unwrap_or(Type::Unknown)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "unknown"),
            Type::Int => write!(f, "int"),
            Type::BigInt => write!(f, "bigint"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Bytes => write!(f, "bytes"),
            Type::Str { .. } => write!(f, "string"),
            Type::None => write!(f, "none"),
            Type::List(t) => write!(f, "list[{t}]"),
            Type::Tuple(ts) => {
                write!(f, "tuple[")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
            Type::Dict(k, v) => write!(f, "dict[{k}, {v}]"),
            Type::Set(t) => write!(f, "set[{t}]"),
            Type::Callable(sig) => write!(f, "callable({} -> {})", sig.params.len(), sig.ret),
            Type::ClassInstance(name) => write!(f, "{name}"),
            Type::Closure { captures, .. } => write!(f, "closure[{}]", captures.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_widens_to_float() {
        assert_eq!(Type::widen(&Type::Int, &Type::Float), Type::Float);
    }

    #[test]
    fn unknown_is_absorbed() {
        assert_eq!(Type::widen(&Type::Unknown, &Type::Int), Type::Int);
        assert_eq!(Type::widen(&Type::Int, &Type::Unknown), Type::Int);
    }

    #[test]
    fn divergent_join_falls_back_to_unknown() {
        assert_eq!(
            Type::widen(&Type::Int, &Type::ClassInstance("Foo".into())),
            Type::Unknown
        );
    }

    #[test]
    fn heterogeneous_list_elements_widen() {
        let joined = Type::widen(&Type::List(Box::new(Type::Int)), &Type::List(Box::new(Type::Float)));
        assert_eq!(joined, Type::List(Box::new(Type::Float)));
    }

    #[test]
    fn static_string_loses_staticness_once_either_side_is_runtime() {
        let joined = Type::widen(&Type::str_static(), &Type::str_runtime());
        assert_eq!(joined, Type::str_runtime());
    }
}
