//! Code-generator state (§3 "Code-Generator state").
//!
//! Everything the ten emission phases (§4.9) read or write lives here.
//! Function-local scratch sets are cleared on entry/exit to each function
//! (`enter_function`/`exit_function`) -- nothing here is meant to outlive a
//! single `generate` call.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::class_registry::ClassRegistry;
use crate::import_registry::ImportRegistry;
use crate::symbol_table::SymbolTable;
use crate::type_inferrer::TypeInferrer;

/// Per-variable classification the generator consults when emitting a name.
/// Modelled as named `HashSet<String>`s rather than a literal bitset --
/// idiomatic Rust favors the named-set shape over hand-rolled bit twiddling
/// for a handful of non-performance-critical classifications.
#[derive(Debug, Default)]
pub struct Classifications {
    pub dict_like: HashSet<String>,
    pub list_like: HashSet<String>,
    pub array_slice: HashSet<String>,
    pub arraylist_alias: HashSet<String>,
    pub closure_variable: HashSet<String>,
    pub callable_variable: HashSet<String>,
    pub big_int_variable: HashSet<String>,
}

/// Scratch bookkeeping cleared at the start and end of each function's
/// emission.
#[derive(Debug, Default)]
pub struct FunctionScratch {
    pub mutated_locals: HashSet<String>,
    pub aug_assigned_locals: HashSet<String>,
    pub used_locals: HashSet<String>,
    pub global_declared_locals: HashSet<String>,
    pub captured_by_nested_class: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub temp: usize,
    pub block_label: usize,
    pub try_helper: usize,
    pub lambda_struct: usize,
    pub shadow_var: usize,
}

impl Counters {
    pub fn next_temp(&mut self) -> String {
        self.temp += 1;
        format!("__t{}", self.temp)
    }

    pub fn next_block_label(&mut self, prefix: &str) -> String {
        self.block_label += 1;
        format!("{prefix}_{}", self.block_label)
    }

    pub fn next_try_helper(&mut self) -> String {
        self.try_helper += 1;
        format!("TryHelper{}", self.try_helper)
    }

    pub fn next_lambda_struct(&mut self) -> String {
        self.lambda_struct += 1;
        format!("Lambda{}", self.lambda_struct)
    }

    pub fn next_shadow_var(&mut self, base: &str) -> String {
        self.shadow_var += 1;
        format!("{base}__shadow{}", self.shadow_var)
    }
}

#[derive(Debug, Default)]
pub struct DebugInfo {
    pub enabled: bool,
    /// (source_line, emitted_line) pairs, recorded in emission order.
    pub line_map: Vec<(u32, u32)>,
    emitted_line: u32,
}

impl DebugInfo {
    pub fn record(&mut self, source_line: u32) {
        if self.enabled {
            self.line_map.push((source_line, self.emitted_line));
        }
    }

    pub fn note_newline(&mut self) {
        self.emitted_line += 1;
    }
}

pub struct CodeGenState {
    pub output: String,
    pub indent_depth: u32,
    pub symbol_table: SymbolTable,
    pub class_registry: ClassRegistry,
    pub import_registry: ImportRegistry,
    pub type_inferrer: TypeInferrer,
    pub classifications: Classifications,
    pub scratch: FunctionScratch,
    /// e.g. loop-variable -> shadow name; try/except variable hoisting;
    /// explicit shadowing on aug-assign. Cleared per function.
    pub var_renames: HashMap<String, String>,
    pub counters: Counters,
    pub debug_info: DebugInfo,
    /// String literals seen more than once, keyed by content, ordered by
    /// first sighting -- deterministic emission (P4/P5) needs an
    /// insertion-order map, not a `HashMap`.
    pub interned_strings: IndexMap<String, usize>,
    /// Lambda/closure wrapper types accumulated for phase 10, in the order
    /// they were discovered.
    pub pending_lambda_structs: Vec<String>,
    pub current_function: Option<String>,
}

impl Default for CodeGenState {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenState {
    pub fn new() -> Self {
        CodeGenState {
            output: String::new(),
            indent_depth: 0,
            symbol_table: SymbolTable::new(),
            class_registry: ClassRegistry::new(),
            import_registry: ImportRegistry::new(),
            type_inferrer: TypeInferrer::new(),
            classifications: Classifications::default(),
            scratch: FunctionScratch::default(),
            var_renames: HashMap::new(),
            counters: Counters::default(),
            debug_info: DebugInfo::default(),
            interned_strings: IndexMap::new(),
            pending_lambda_structs: Vec::new(),
            current_function: None,
        }
    }

    pub fn enter_function(&mut self, name: &str) {
        self.scratch = FunctionScratch::default();
        self.var_renames.clear();
        self.current_function = Some(name.to_string());
    }

    pub fn exit_function(&mut self) {
        self.scratch = FunctionScratch::default();
        self.var_renames.clear();
        self.current_function = None;
    }

    pub fn indent(&mut self) {
        self.indent_depth += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_depth = self.indent_depth.saturating_sub(1);
    }

    pub fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent_depth {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
        self.debug_info.note_newline();
    }

    pub fn write_inline(&mut self, text: &str) {
        let _ = write!(self.output, "{text}");
    }

    pub fn intern_string(&mut self, content: &str) -> usize {
        let next_index = self.interned_strings.len();
        *self
            .interned_strings
            .entry(content.to_string())
            .or_insert(next_index)
    }

    pub fn resolve_name(&self, name: &str) -> String {
        self.var_renames
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_function_clears_previous_scratch_state() {
        let mut state = CodeGenState::new();
        state.scratch.mutated_locals.insert("x".to_string());
        state.enter_function("f");
        assert!(state.scratch.mutated_locals.is_empty());
        assert_eq!(state.current_function.as_deref(), Some("f"));
    }

    #[test]
    fn interning_the_same_string_twice_returns_the_same_index() {
        let mut state = CodeGenState::new();
        let a = state.intern_string("hello");
        let b = state.intern_string("hello");
        assert_eq!(a, b);
        let c = state.intern_string("world");
        assert_ne!(a, c);
    }

    #[test]
    fn write_line_respects_indent_depth() {
        let mut state = CodeGenState::new();
        state.indent();
        state.write_line("x");
        assert_eq!(state.output, "    x\n");
    }
}
