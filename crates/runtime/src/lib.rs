//! Embedded TL-source support modules (§4.8 `tl_runtime` import strategy).
//!
//! Each constant here is TL source text, not Rust: the generator's Import
//! Registry resolves a handful of SL standard-library modules (`math`,
//! `random`, `itertools`, `collections`, `json`, `re`, `string`,
//! `functools`) to one of these snippets rather than emitting a native
//! binding, and the external TL toolchain compiles the snippet alongside
//! the program's own generated output. [`support_module`] is the single
//! lookup point `transit-compiler` needs; everything else here is a plain
//! data table.

use indexmap::IndexMap;

/// `floor_div`/`pow`/`matmul` are emitted inline by the code generator
/// itself (see `codegen::expr::emit_binop`), so they aren't duplicated
/// here; this module only covers the standard-library-shaped helpers that
/// route through an `import` statement in the emitted program.
pub const MATH_OPS: &str = include_str!("modules/math_ops.tl");
pub const RANDOM_OPS: &str = include_str!("modules/random_ops.tl");
pub const ITER_OPS: &str = include_str!("modules/iter_ops.tl");
pub const COLLECTIONS_OPS: &str = include_str!("modules/collections_ops.tl");
pub const JSON_OPS: &str = include_str!("modules/json_ops.tl");
pub const REGEX_OPS: &str = include_str!("modules/regex_ops.tl");
pub const STRING_OPS: &str = include_str!("modules/string_ops.tl");
pub const FUNCTOOLS_OPS: &str = include_str!("modules/functools_ops.tl");

/// The duck-typed tagged-value protocol (`matches_sequence`,
/// `matches_mapping`, `runtime_contains`, `identical`, ...) the generator
/// falls back to whenever the Type Inferrer leaves a value `Unknown`.
/// Always linked in, unlike the table above -- it isn't gated on any one
/// `import` statement, since `Unknown`-typed values can show up regardless
/// of what a program imports.
pub const RUNTIME_SUPPORT: &str = include_str!("modules/runtime_support.tl");

/// Looks up the embedded TL source for one of the named helper modules the
/// Import Registry hands out (`ImportStrategy::TlRuntime { helper }`).
/// Returns `None` for a name the registry never actually produces --
/// callers that got `helper` from a live `ImportRegistry` should treat that
/// as an internal-invariant violation, not a recoverable case.
pub fn support_module(helper: &str) -> Option<&'static str> {
    module_table().get(helper).copied()
}

fn module_table() -> IndexMap<&'static str, &'static str> {
    let mut table = IndexMap::new();
    table.insert("math_ops", MATH_OPS);
    table.insert("random_ops", RANDOM_OPS);
    table.insert("iter_ops", ITER_OPS);
    table.insert("collections_ops", COLLECTIONS_OPS);
    table.insert("json_ops", JSON_OPS);
    table.insert("regex_ops", REGEX_OPS);
    table.insert("string_ops", STRING_OPS);
    table.insert("functools_ops", FUNCTOOLS_OPS);
    table
}

/// Every helper `transit-compiler`'s `ImportRegistry::seed_defaults` can
/// hand out, in the same order -- a mismatch here means the two crates
/// have drifted.
pub fn known_helpers() -> Vec<&'static str> {
    module_table().keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_seeded_helper_resolves_to_nonempty_source() {
        for helper in known_helpers() {
            let source = support_module(helper).unwrap();
            assert!(!source.trim().is_empty(), "{helper} is empty");
        }
    }

    #[test]
    fn unknown_helper_name_resolves_to_none() {
        assert!(support_module("totally_made_up").is_none());
    }

    #[test]
    fn runtime_support_is_always_available_and_nonempty() {
        assert!(!RUNTIME_SUPPORT.trim().is_empty());
    }
}
