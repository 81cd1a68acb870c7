//! Code generation error taxonomy (§7).
//!
//! `thiserror` is not something the teacher crate itself reaches for (its
//! own `CodeGenError` is a two-variant enum with a hand-written `Display`),
//! but the specification's five-kind taxonomy with per-kind structured
//! payloads is naturally a derive target, and `thiserror` is exactly what
//! the rest of this corpus (erhanbaris-timu, upstat-io-sigil-lang) reaches
//! for when an error enum needs that shape.

use crate::ast::Span;

#[derive(Debug, thiserror::Error)]
pub enum CodeGenError {
    /// The source uses a feature the generator cannot lower: dynamic
    /// import with a non-literal module name, metaclass construction,
    /// `exec` with a non-literal argument, monkey-patching, diamond-MRO
    /// ambiguity. Fatal.
    #[error("{span:?}: unsupported construct ({category}): {detail}")]
    UnsupportedConstruct {
        span: Span,
        category: &'static str,
        detail: String,
    },

    /// A state machine reached an impossible state: unbalanced scope
    /// push/pop, a missing capture-table entry, method lookup for an
    /// unregistered class. Signals a bug in the generator itself. Fatal.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Memory exhaustion from an auxiliary allocation. Fatal, no recovery.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// A write to the emission buffer failed (the out-of-process
    /// equivalent of the teacher's `Format` variant).
    #[error("output write failure: {0}")]
    Format(#[from] std::fmt::Error),
}

/// `ResolutionFailed` and `IOFailure` (§7 kinds 2 and 5) are *not*
/// represented here: both downgrade to skip-state internally rather than
/// propagating as a `CodeGenError`, and are instead recorded on
/// [`crate::import_compiler::ImportPlan`] for the caller to inspect.
pub type CodeGenResult<T> = Result<T, CodeGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_construct_formats_with_span_and_category() {
        let err = CodeGenError::UnsupportedConstruct {
            span: Span::new(12, 4),
            category: "dynamic_import",
            detail: "module name is not a string literal".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("dynamic_import"));
        assert!(rendered.contains("12"));
    }
}
