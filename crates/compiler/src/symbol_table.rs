//! Lexical scope stack shared by the Type Inferrer and the Code Generator.
//!
//! Thread-unsafe by contract, like the rest of the generator state: one
//! `SymbolTable` is created per `generate` call and never shared across
//! threads (see the concurrency model in SPEC_FULL.md).

use std::collections::HashMap;

use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Default)]
struct Frame {
    names: HashMap<String, Binding>,
}

/// Stack of lexical scopes.
///
/// Invariants (I1-I3 in SPEC_FULL.md):
/// - I1: every name the generator emits has been `declare`d in some
///   enclosing frame at the point of use.
/// - I2: `pop_scope` is always paired with a prior `push_scope`; `Drop`
///   cannot enforce this across an early return, so callers use
///   `ScopeGuard` (below) to pair them automatically.
/// - I3: in nested-function emission mode, `lookup` only consults the
///   current frame plus an explicit capture table, never outer frames.
#[derive(Debug, Default)]
pub struct SymbolTable {
    frames: Vec<Frame>,
    /// When `Some`, `lookup` is restricted to the top frame plus this table
    /// (nested-function mode, see §4.1).
    capture_table: Option<HashMap<String, Binding>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable::default();
        table.push_scope();
        table
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_scope(&mut self) {
        self.frames
            .pop()
            .expect("pop_scope called with no matching push_scope");
    }

    /// Number of live frames; `generate` asserts this is 1 (just the module
    /// frame) when it returns (property P2).
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declaring a name that already exists in the current frame silently
    /// overwrites it -- this emulates the source language's free rebinding
    /// rather than failing.
    pub fn declare(&mut self, name: &str, ty: Type, mutable: bool) {
        let frame = self
            .frames
            .last_mut()
            .expect("declare called with no active scope");
        frame.names.insert(name.to_string(), Binding { ty, mutable });
    }

    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.frames
            .last()
            .is_some_and(|f| f.names.contains_key(name))
    }

    /// Innermost-first lookup, honoring nested-function capture
    /// restriction (I3).
    pub fn lookup(&self, name: &str) -> Option<(&Binding, usize)> {
        if let Some(captures) = &self.capture_table {
            if let Some(top) = self.frames.last() {
                if let Some(binding) = top.names.get(name) {
                    return Some((binding, self.frames.len() - 1));
                }
            }
            return captures.get(name).map(|b| (b, 0));
        }
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            if let Some(binding) = frame.names.get(name) {
                return Some((binding, depth));
            }
        }
        None
    }

    pub fn get_type(&self, name: &str) -> Option<Type> {
        self.lookup(name).map(|(b, _)| b.ty.clone())
    }

    /// Enter nested-function emission mode for the duration of the closure
    /// `f`. While active, `lookup` sees only the current frame and
    /// `captures`.
    pub fn with_captures<R>(
        &mut self,
        captures: HashMap<String, Binding>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.capture_table.replace(captures);
        let result = f(self);
        self.capture_table = previous;
        result
    }
}

/// RAII guard pairing `push_scope`/`pop_scope` so early returns (e.g. a
/// `Fail compile` from the code generator) can't unbalance the stack.
pub struct ScopeGuard<'a> {
    table: &'a mut SymbolTable,
}

impl<'a> ScopeGuard<'a> {
    pub fn enter(table: &'a mut SymbolTable) -> Self {
        table.push_scope();
        ScopeGuard { table }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.table.pop_scope();
    }
}

impl std::ops::Deref for ScopeGuard<'_> {
    type Target = SymbolTable;
    fn deref(&self) -> &SymbolTable {
        self.table
    }
}

impl std::ops::DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut SymbolTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_sees_outer_declarations() {
        let mut table = SymbolTable::new();
        table.declare("x", Type::Int, false);
        {
            let mut inner = ScopeGuard::enter(&mut table);
            assert_eq!(inner.get_type("x"), Some(Type::Int));
        }
        assert_eq!(table.depth(), 1);
    }

    #[test]
    fn redeclaration_in_same_frame_overwrites() {
        let mut table = SymbolTable::new();
        table.declare("x", Type::Int, false);
        table.declare("x", Type::Str { is_static: true }, false);
        assert_eq!(table.get_type("x"), Some(Type::str_static()));
    }

    #[test]
    fn nested_function_mode_hides_outer_frames_not_in_captures() {
        let mut table = SymbolTable::new();
        table.declare("outer_only", Type::Int, false);
        table.push_scope();
        let mut captures = HashMap::new();
        captures.insert(
            "n".to_string(),
            Binding {
                ty: Type::Int,
                mutable: false,
            },
        );
        table.with_captures(captures, |inner| {
            inner.declare("x", Type::Bool, false);
            assert_eq!(inner.get_type("n"), Some(Type::Int));
            assert_eq!(inner.get_type("x"), Some(Type::Bool));
            assert_eq!(inner.get_type("outer_only"), None);
        });
        assert_eq!(table.get_type("outer_only"), Some(Type::Int));
    }
}
