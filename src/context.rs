//! The symbol table the type checker resolves names against

mod scope_stack;

pub use scope_stack::*;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Func,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    /// The collision-free name of this binding
    pub canonical: Arc<str>,
    /// Generalized for functions and types, used as-is for variables
    pub ty: TypeId,
    /// Index of the realization base that introduced the binding
    pub base: usize,
}

/// The names bound within one realization base
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// The names defined in this scope, in the order that they were defined
    names: Vec<(Arc<str>, Binding)>,
    /// Every binding by its canonical name
    canonical: HashMap<Arc<str>, Binding>,
}

impl Scope {
    pub fn define(&mut self, name: Arc<str>, binding: Binding) {
        self.canonical.insert(binding.canonical.clone(), binding.clone());
        self.names.push((name, binding));
    }

    pub fn lookup(&self, target: &str) -> Option<&Binding> {
        self.names.iter().rev().find(|(name, _)| &**name == target).map(|(_, binding)| binding)
    }

    pub fn lookup_canonical(&self, canonical: &str) -> Option<&Binding> {
        self.canonical.get(canonical)
    }

    /// Removes the most recent binding of a name. The canonical entry is kept so that nodes
    /// resolved before the removal stay valid.
    pub fn remove(&mut self, target: &str) -> Option<Binding> {
        let index = self.names.iter().rposition(|(name, _)| &**name == target)?;
        Some(self.names.remove(index).1)
    }
}

/// A function (or the module) whose body is being type-checked
#[derive(Debug)]
pub struct Base {
    /// Realized name of the function, empty for a module
    pub name: String,
    /// Canonical name of the function being realized
    pub func_name: Option<Arc<str>>,
    pub func_ty: Option<TypeId>,
    pub return_type: Option<TypeId>,
    /// Number of loops enclosing the statement being checked
    pub loops: usize,
    token: Option<ScopeToken>,
}

impl Base {
    pub fn module() -> Self {
        Self {
            name: String::new(),
            func_name: None,
            func_ty: None,
            return_type: None,
            loops: 0,
            token: None,
        }
    }

    pub fn function(name: String, func_name: Arc<str>, func_ty: TypeId, return_type: TypeId) -> Self {
        Self {
            name,
            func_name: Some(func_name),
            func_ty: Some(func_ty),
            return_type: Some(return_type),
            ..Self::module()
        }
    }
}

#[derive(Debug, Default)]
pub struct Context {
    scopes: ScopeStack,
    bases: Vec<Base>,
    /// The current generalization level
    pub level: usize,
    /// Nodes that became done during the current pass
    pub changed_nodes: usize,
    /// Default argument expressions currently being evaluated
    pub default_call_depth: HashSet<String>,
}

impl Context {
    pub fn enter_base(&mut self, mut base: Base) {
        base.token = Some(self.scopes.push());
        self.bases.push(base);
    }

    pub fn exit_base(&mut self) -> Base {
        let mut base = self.bases.pop().expect("bug: no realization base to exit");
        let token = base.token.take().expect("bug: realization base was not entered");
        self.scopes.pop(token);
        base
    }

    pub fn base(&self) -> &Base {
        self.bases.last().expect("bug: no current realization base")
    }

    pub fn base_mut(&mut self) -> &mut Base {
        self.bases.last_mut().expect("bug: no current realization base")
    }

    pub fn bases(&self) -> &[Base] {
        &self.bases
    }

    pub fn base_index(&self) -> usize {
        self.bases.len().saturating_sub(1)
    }

    pub fn is_toplevel(&self) -> bool {
        self.bases.len() <= 1
    }

    /// Binds a name in the current base
    pub fn add(&mut self, name: impl Into<Arc<str>>, kind: BindingKind, canonical: Arc<str>, ty: TypeId) {
        let base = self.base_index();
        self.scopes.top_mut().define(name.into(), Binding {kind, canonical, ty, base});
    }

    /// Binds a name in the outermost base, where types and functions live
    pub fn add_global(&mut self, name: impl Into<Arc<str>>, kind: BindingKind, canonical: Arc<str>, ty: TypeId) {
        self.scopes.bottom_mut().define(name.into(), Binding {kind, canonical, ty, base: 0});
    }

    pub fn find(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup(name))
    }

    pub fn find_canonical(&self, canonical: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.lookup_canonical(canonical))
    }

    /// Finds a name bound in the current base only
    pub fn find_in_base(&self, name: &str) -> Option<&Binding> {
        self.scopes.top().lookup(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        self.scopes.top_mut().remove(name)
    }

    /// The realization base currently realizing a function with the given realized name
    pub fn in_flight(&self, realized_name: &str) -> Option<&Base> {
        self.bases.iter().rev().find(|base| base.name == realized_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::TypeStore;

    #[test]
    fn later_bindings_shadow_earlier_ones() {
        let mut types = TypeStore::default();
        let (t1, t2) = (types.new_unbound(0), types.new_unbound(0));

        let mut ctx = Context::default();
        ctx.enter_base(Base::module());
        ctx.add("x", BindingKind::Var, "x".into(), t1);
        ctx.add("x", BindingKind::Var, "x.1".into(), t2);

        assert_eq!(ctx.find("x").map(|b| b.ty), Some(t2));
        assert_eq!(ctx.find_canonical("x").map(|b| b.ty), Some(t1));

        ctx.remove("x");
        assert_eq!(ctx.find("x").map(|b| b.ty), Some(t1));
        assert_eq!(ctx.find_canonical("x.1").map(|b| b.ty), Some(t2));
    }

    #[test]
    fn function_bases_see_globals_but_not_each_others_locals() {
        let mut types = TypeStore::default();
        let ty = types.new_unbound(0);

        let mut ctx = Context::default();
        ctx.enter_base(Base::module());
        ctx.add("g", BindingKind::Var, "g".into(), ty);

        ctx.enter_base(Base::function("f[int]".into(), "f:0".into(), ty, ty));
        ctx.add("local", BindingKind::Var, "local".into(), ty);
        ctx.add_global("T", BindingKind::Type, "T".into(), ty);
        assert!(ctx.find("g").is_some());
        assert!(ctx.find_in_base("g").is_none());
        assert!(ctx.in_flight("f[int]").is_some());

        let base = ctx.exit_base();
        assert_eq!(base.name, "f[int]");
        assert!(ctx.find("local").is_none());
        assert!(ctx.find("T").is_some());
        assert!(ctx.is_toplevel());
    }
}
