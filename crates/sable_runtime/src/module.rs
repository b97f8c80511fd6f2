//! Process-wide module registry.
//!
//! A `ModuleSpec` is a heap-independent description of a module: member
//! names mapped to native functions or code units. Each task materializes
//! its own `Module` object from the spec the first time it imports it, so
//! the registry itself never holds heap references.

use std::sync::Arc;

use indexmap::IndexMap;
use sable_ir::CodeUnit;

use crate::core::value::NativeFn;
use crate::core::{FastHashMap, fast_map_new};

#[derive(Clone, Debug)]
pub enum Member {
    Native(NativeFn),
    Code(Arc<CodeUnit>),
}

#[derive(Clone, Debug)]
pub struct ModuleSpec {
    pub name: String,
    members: IndexMap<String, Member>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), members: IndexMap::new() }
    }

    pub fn native(mut self, name: &str, f: NativeFn) -> Self {
        self.members.insert(name.to_string(), Member::Native(f));
        self
    }

    /// A bytecode member. Its globals resolve in this module first.
    pub fn code(mut self, name: &str, unit: impl Into<Arc<CodeUnit>>) -> Self {
        self.members.insert(name.to_string(), Member::Code(unit.into()));
        self
    }

    pub fn insert(&mut self, name: &str, member: Member) {
        self.members.insert(name.to_string(), member);
    }

    /// Members in definition order.
    pub fn members(&self) -> impl Iterator<Item = (&String, &Member)> {
        self.members.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Something that contributes members to a module, like a builtin provider.
pub trait NativeModule {
    fn install(&self, spec: &mut ModuleSpec);
}

/// Registered modules, shared read-only by every task of a process.
#[derive(Default)]
pub struct Registry {
    modules: FastHashMap<String, Arc<ModuleSpec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { modules: fast_map_new() }
    }

    /// Register `spec`, replacing any module of the same name.
    pub fn add(&mut self, spec: ModuleSpec) -> &mut Self {
        self.modules.insert(spec.name.clone(), Arc::new(spec));
        self
    }

    pub fn add_native(&mut self, name: &str, provider: &dyn NativeModule) -> &mut Self {
        let mut spec = ModuleSpec::new(name);
        provider.install(&mut spec);
        self.add(spec)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleSpec>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::heap::Ref;
    use crate::errors::Result;
    use crate::vm::Vm;

    fn answer(vm: &mut Vm, _args: &[Ref]) -> Result<Ref> {
        Ok(vm.new_int(42))
    }

    struct Answers;

    impl NativeModule for Answers {
        fn install(&self, spec: &mut ModuleSpec) {
            spec.insert("answer", Member::Native(answer));
        }
    }

    #[test]
    fn members_keep_definition_order() {
        let spec = ModuleSpec::new("m").native("b", answer).native("a", answer);
        let names: Vec<_> = spec.members().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(spec.len(), 2);
    }

    #[test]
    fn native_providers_fill_a_spec() {
        let mut registry = Registry::new();
        registry.add_native("answers", &Answers);
        let spec = registry.get("answers").unwrap();
        assert!(matches!(spec.get("answer"), Some(Member::Native(_))));
        assert!(registry.get("missing").is_none());
    }
}
