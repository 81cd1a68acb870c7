//! Recognised built-in functions (§4.9, "Dynamic dispatch on built-ins").
//!
//! `print`, `len`, `abs` and friends are first-class forms here: the code
//! generator bypasses the generic call path for them entirely so common
//! idioms don't force a runtime-dispatched value.

use crate::types::Type;

/// A built-in's declared result type, used by the Type Inferrer's `Call`
/// rule. `None` means the name isn't a recognised built-in at all (it's an
/// ordinary call that must resolve through a user function, a class, or
/// fall back to `Unknown`).
pub fn builtin_return_type(name: &str) -> Option<Type> {
    let ty = match name {
        "len" => Type::Int,
        "abs" => Type::Unknown, // depends on the argument; left polymorphic
        "print" => Type::None,
        "str" => Type::str_runtime(),
        "repr" => Type::str_runtime(),
        "int" => Type::Int,
        "float" => Type::Float,
        "bool" => Type::Bool,
        "list" => Type::List(Box::new(Type::Unknown)),
        "dict" => Type::Dict(Box::new(Type::Unknown), Box::new(Type::Unknown)),
        "set" => Type::Set(Box::new(Type::Unknown)),
        "tuple" => Type::Tuple(vec![]),
        "range" => Type::List(Box::new(Type::Int)),
        "enumerate" => Type::List(Box::new(Type::Tuple(vec![Type::Int, Type::Unknown]))),
        "zip" => Type::List(Box::new(Type::Unknown)),
        "sorted" => Type::List(Box::new(Type::Unknown)),
        "reversed" => Type::List(Box::new(Type::Unknown)),
        "sum" => Type::Unknown,
        "min" | "max" => Type::Unknown,
        "isinstance" => Type::Bool,
        "hasattr" => Type::Bool,
        "id" => Type::Int,
        _ => return None,
    };
    Some(ty)
}

/// Built-ins the generator lowers directly to a TL statement/expression
/// form instead of a generic call, and the emission shape it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectLowering {
    /// `print(...)` -> a direct call to the TL runtime's print helper,
    /// joining arguments with a single space like the source language does.
    Print,
    /// `len(x)` -> `.len()`/`.count()` on the receiver's emitted
    /// representation, chosen per the receiver's classified container kind.
    Len,
    /// `abs(x)` -> the TL standard library's `abs`.
    Abs,
    /// `range(...)` in a `for` loop position -> a numeric loop (see
    /// `codegen::stmt::emit_for`); outside that position it falls back to
    /// materialising a list.
    Range,
    Enumerate,
    Zip,
}

pub fn direct_lowering(name: &str) -> Option<DirectLowering> {
    match name {
        "print" => Some(DirectLowering::Print),
        "len" => Some(DirectLowering::Len),
        "abs" => Some(DirectLowering::Abs),
        "range" => Some(DirectLowering::Range),
        "enumerate" => Some(DirectLowering::Enumerate),
        "zip" => Some(DirectLowering::Zip),
        _ => None,
    }
}

/// Container mutating methods the Mutation Analyzer watches for (append,
/// extend, pop, sort, clear, insert, remove, ...).
pub const MUTATING_CONTAINER_METHODS: &[&str] = &[
    "append", "extend", "pop", "sort", "reverse", "clear", "insert", "remove", "update",
    "add", "discard", "popitem", "setdefault",
];

pub fn is_mutating_container_method(name: &str) -> bool {
    MUTATING_CONTAINER_METHODS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_has_no_return_value() {
        assert_eq!(builtin_return_type("print"), Some(Type::None));
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert_eq!(builtin_return_type("totally_user_defined"), None);
    }

    #[test]
    fn append_is_a_recognised_mutator() {
        assert!(is_mutating_container_method("append"));
        assert!(!is_mutating_container_method("keys"));
    }
}
