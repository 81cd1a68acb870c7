//! Registry of declared classes and their method tables (§4.2).
//!
//! Method resolution is a left-to-right linearisation over *registered*
//! bases only: a base class that was never registered (because it comes
//! from a skipped or opaque import) contributes nothing and is simply
//! absent from the chain -- it does not hard-fail resolution, per the
//! "opaque-base opt-out" note in the design notes.

use indexmap::IndexMap;

use crate::types::Type;

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub owner: String,
    pub params: Vec<String>,
    pub returns_error: bool,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub bases: Vec<String>,
    pub methods: IndexMap<String, MethodInfo>,
    pub fields: IndexMap<String, Type>,
    pub is_mutable: bool,
    pub init_returns_error: bool,
    /// Classes that declare a type parameter through the recognised
    /// Generic-base pattern (§4.11); these never get a module-level
    /// pre-declaration.
    pub is_generic: bool,
}

/// A handful of well-known base-class names that mark a class as a test
/// case for the (external) test-discovery emitter; see `FUNCTION_TRAITS`'s
/// sibling concept of test-factory scanning in codegen phase 4.
const TEST_CASE_BASES: &[&str] = &["TestCase", "unittest.TestCase", "AsyncTestCase"];

#[derive(Debug, Default, Clone)]
pub struct ClassRegistry {
    /// Insertion order is preserved (IndexMap) so tie-breaks across runs
    /// are deterministic (property P4) and so module-level class emission
    /// follows declaration order.
    classes: IndexMap<String, ClassInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassRegistryError {
    #[error("class `{0}` is already registered")]
    DuplicateClass(String),
    #[error("registering class `{class}` would introduce a base-class cycle through `{through}`")]
    BaseCycle { class: String, through: String },
}

impl ClassRegistry {
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    pub fn register(&mut self, info: ClassInfo) -> Result<(), ClassRegistryError> {
        if self.classes.contains_key(&info.name) {
            return Err(ClassRegistryError::DuplicateClass(info.name));
        }
        for base in &info.bases {
            if self.creates_cycle(&info.name, base) {
                return Err(ClassRegistryError::BaseCycle {
                    class: info.name.clone(),
                    through: base.clone(),
                });
            }
        }
        self.classes.insert(info.name.clone(), info);
        Ok(())
    }

    fn creates_cycle(&self, new_class: &str, base: &str) -> bool {
        // A cycle can only be introduced if `base` (transitively) already
        // depends on `new_class` -- but `new_class` isn't registered yet,
        // so this really only guards self-inheritance and is here for
        // forward-compatibility with multi-pass registration order.
        if base == new_class {
            return true;
        }
        let mut seen = vec![base.to_string()];
        let mut i = 0;
        while i < seen.len() {
            if let Some(info) = self.classes.get(&seen[i]) {
                for b in &info.bases {
                    if b == new_class {
                        return true;
                    }
                    if !seen.contains(b) {
                        seen.push(b.clone());
                    }
                }
            }
            i += 1;
        }
        false
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassInfo> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Left-to-right MRO lookup. Bases are walked in declaration order;
    /// the first class in the chain (including `class` itself) that
    /// declares `method` wins. Bases absent from the registry (opaque,
    /// external, or unresolved imports) are skipped, not an error.
    pub fn find_method(&self, class: &str, method: &str) -> Option<&MethodInfo> {
        let info = self.classes.get(class)?;
        if let Some(m) = info.methods.get(method) {
            return Some(m);
        }
        for base in &info.bases {
            if let Some(m) = self.find_method(base, method) {
                return Some(m);
            }
        }
        None
    }

    /// Recursive inheritance walk recognising a fixed set of well-known
    /// test base classes. Opaque/unregistered bases simply don't match.
    pub fn is_test_case_subclass(&self, class: &str) -> bool {
        let Some(info) = self.classes.get(class) else {
            return false;
        };
        for base in &info.bases {
            if TEST_CASE_BASES.contains(&base.as_str()) || self.is_test_case_subclass(base) {
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, bases: &[&str]) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            bases: bases.iter().map(|s| s.to_string()).collect(),
            methods: IndexMap::new(),
            fields: IndexMap::new(),
            is_mutable: false,
            init_returns_error: false,
            is_generic: false,
        }
    }

    fn method(owner: &str, name: &str) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            owner: owner.to_string(),
            params: vec![],
            returns_error: false,
        }
    }

    #[test]
    fn method_resolves_through_single_base() {
        let mut reg = ClassRegistry::new();
        let mut a = class("A", &[]);
        a.methods.insert("greet".into(), method("A", "greet"));
        reg.register(a).unwrap();
        reg.register(class("B", &["A"])).unwrap();

        let found = reg.find_method("B", "greet").unwrap();
        assert_eq!(found.owner, "A");
    }

    #[test]
    fn derived_override_wins_over_base() {
        let mut reg = ClassRegistry::new();
        let mut a = class("A", &[]);
        a.methods.insert("greet".into(), method("A", "greet"));
        reg.register(a).unwrap();
        let mut b = class("B", &["A"]);
        b.methods.insert("greet".into(), method("B", "greet"));
        reg.register(b).unwrap();

        let found = reg.find_method("B", "greet").unwrap();
        assert_eq!(found.owner, "B");
    }

    #[test]
    fn opaque_unregistered_base_contributes_nothing() {
        let mut reg = ClassRegistry::new();
        reg.register(class("B", &["ExternalBase"])).unwrap();
        assert!(reg.find_method("B", "greet").is_none());
    }

    #[test]
    fn direct_self_inheritance_is_rejected() {
        let mut reg = ClassRegistry::new();
        let err = reg.register(class("A", &["A"])).unwrap_err();
        assert!(matches!(err, ClassRegistryError::BaseCycle { .. }));
    }

    #[test]
    fn test_case_subclass_detection_is_recursive() {
        let mut reg = ClassRegistry::new();
        reg.register(class("Base", &["TestCase"])).unwrap();
        reg.register(class("Derived", &["Base"])).unwrap();
        assert!(reg.is_test_case_subclass("Derived"));
        assert!(reg.is_test_case_subclass("Base"));
    }
}
