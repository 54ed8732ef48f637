//! The type term model
//!
//! Every type lives in a [`TypeStore`] arena and is addressed by a [`TypeId`] handle. Types are
//! never deep-copied by unification. Binding a variable, lowering its level or growing a union
//! overwrites the node in place, and every such write is recorded in the arena's undo log so
//! that speculative unification can be rolled back with [`TypeStore::rollback_to`].

mod link;
mod class;
mod func;
mod static_ty;
mod union;
mod unify;
mod generalize;
mod names;

pub use link::*;
pub use class::*;
pub use func::*;
pub use static_ty::*;
pub use union::*;
pub use unify::*;
pub use generalize::*;

use std::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ena::snapshot_vec::{self, SnapshotVec, SnapshotVecDelegate};
use static_assertions::const_assert_eq;

/// A handle to a type node in a `TypeStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

const_assert_eq!(std::mem::size_of::<TypeId>(), 4);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Link(LinkType),
    Class(ClassType),
    Func(FuncType),
    Static(StaticType),
    Union(UnionType),
}

#[derive(Debug)]
struct TypeNodes;

impl SnapshotVecDelegate for TypeNodes {
    type Value = Type;
    type Undo = ();

    fn reverse(_values: &mut Vec<Type>, _action: ()) {}
}

/// A point in the undo log that the store can be rolled back to
#[must_use]
pub struct Snapshot {
    inner: snapshot_vec::Snapshot,
    next_var: usize,
    defaulted: usize,
}

/// The arena that owns every type created during a compilation session
pub struct TypeStore {
    nodes: SnapshotVec<TypeNodes>,
    /// Source of unique ids for type variables and generics
    next_var: usize,
    /// Number of snapshots currently open
    open_snapshots: usize,
    /// Realized names of types that can no longer change
    names: RefCell<HashMap<TypeId, Arc<str>>>,
    /// Variables that were given a default type
    defaulted: Vec<TypeId>,
}

impl Default for TypeStore {
    fn default() -> Self {
        Self {
            nodes: SnapshotVec::new(),
            next_var: 0,
            open_snapshots: 0,
            names: RefCell::default(),
            defaulted: Vec::new(),
        }
    }
}

impl fmt::Debug for TypeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeStore")
            .field("nodes", &self.nodes.len())
            .field("next_var", &self.next_var)
            .field("open_snapshots", &self.open_snapshots)
            .finish()
    }
}

impl TypeStore {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn push(&mut self, ty: Type) -> TypeId {
        let index = self.nodes.push(ty);
        TypeId(index as u32)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        self.nodes.get(id.index())
    }

    /// Overwrites a node, recording the previous value in the undo log
    pub(crate) fn set(&mut self, id: TypeId, ty: Type) {
        self.names.borrow_mut().remove(&id);
        self.nodes.set(id.index(), ty);
    }

    /// Allocates a fresh variable id
    pub fn fresh_var_id(&mut self) -> usize {
        let id = self.next_var;
        self.next_var += 1;
        id
    }

    /// Creates a fresh unbound type variable at the given level
    pub fn new_unbound(&mut self, level: usize) -> TypeId {
        self.new_var(level, None, None)
    }

    /// Creates a fresh unbound type variable that can only bind to static types of `kind`
    pub fn new_static_unbound(&mut self, level: usize, kind: StaticKind) -> TypeId {
        self.new_var(level, Some(kind), None)
    }

    pub fn new_var(&mut self, level: usize, static_kind: Option<StaticKind>, name: Option<Arc<str>>) -> TypeId {
        let id = self.fresh_var_id();
        self.push(Type::Link(LinkType::Unbound(TypeVar {id, level, static_kind, default: None, name})))
    }

    pub fn new_static(&mut self, value: StaticLiteral) -> TypeId {
        self.push(Type::Static(StaticType {value}))
    }

    pub fn new_class(&mut self, class: ClassType) -> TypeId {
        self.push(Type::Class(class))
    }

    /// Follows bound links until reaching a node that is not a forwarding link
    pub fn follow(&self, mut id: TypeId) -> TypeId {
        while let Type::Link(LinkType::Bound(target)) = self.get(id) {
            id = *target;
        }
        id
    }

    pub fn resolve(&self, id: TypeId) -> &Type {
        self.get(self.follow(id))
    }

    /// Returns the unbound variable this type currently is, if any
    pub fn unbound(&self, id: TypeId) -> Option<&TypeVar> {
        match self.resolve(id) {
            Type::Link(LinkType::Unbound(var)) => Some(var),
            _ => None,
        }
    }

    pub fn is_unbound(&self, id: TypeId) -> bool {
        self.unbound(id).is_some()
    }

    /// Returns the nominal class part of a type: the class itself, the `Function` class a
    /// function type extends or the `Union` class a union extends
    pub fn class(&self, id: TypeId) -> Option<&ClassType> {
        match self.resolve(id) {
            Type::Class(class) => Some(class),
            Type::Func(func) => Some(&func.base),
            Type::Union(union) => Some(&union.base),
            Type::Link(_) | Type::Static(_) => None,
        }
    }

    /// Returns the name of the class of this type, if it is known
    pub fn class_name(&self, id: TypeId) -> Option<&Arc<str>> {
        self.class(id).map(|class| &class.name)
    }

    pub fn is_class(&self, id: TypeId, name: &str) -> bool {
        match self.resolve(id) {
            Type::Class(class) => &*class.name == name,
            _ => false,
        }
    }

    pub fn func(&self, id: TypeId) -> Option<&FuncType> {
        match self.resolve(id) {
            Type::Func(func) => Some(func),
            _ => None,
        }
    }

    pub fn static_type(&self, id: TypeId) -> Option<&StaticType> {
        match self.resolve(id) {
            Type::Static(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn union(&self, id: TypeId) -> Option<&UnionType> {
        match self.resolve(id) {
            Type::Union(union) => Some(union),
            _ => None,
        }
    }

    /// Returns the static kind of this type: the kind of its literal, or the kind an unbound
    /// variable is restricted to
    pub fn static_kind(&self, id: TypeId) -> Option<StaticKind> {
        match self.resolve(id) {
            Type::Static(ty) => Some(ty.kind()),
            Type::Link(LinkType::Unbound(var)) | Type::Link(LinkType::Generic(var)) => var.static_kind,
            _ => None,
        }
    }

    /// Attaches a default type to an unbound variable. The default is applied only when a
    /// fixpoint pass makes no other progress.
    pub fn set_default(&mut self, var: TypeId, default: TypeId) {
        let var = self.follow(var);
        if let Type::Link(LinkType::Unbound(tv)) = self.get(var) {
            let tv = TypeVar {default: Some(default), ..tv.clone()};
            self.set(var, Type::Link(LinkType::Unbound(tv)));
            self.defaulted.push(var);
        }
    }

    /// Binds every still-unbound variable created at or after the node index `since` that has a
    /// default type to that default. Returns the number of variables that were bound.
    ///
    /// Variables created before `since` keep their defaults pending.
    pub fn apply_defaults(&mut self, since: usize) -> usize {
        debug_assert!(!self.in_snapshot(), "bug: defaults applied speculatively");
        let (older, candidates): (Vec<_>, Vec<_>) = std::mem::take(&mut self.defaulted).into_iter()
            .partition(|var| var.index() < since);
        self.defaulted = older;

        let mut applied = 0;
        for var in candidates {
            // Nodes created inside a rolled back snapshot may have been discarded
            if var.index() >= self.len() {
                continue;
            }
            let default = match self.unbound(var) {
                Some(TypeVar {default: Some(default), ..}) => *default,
                _ => continue,
            };
            if self.unify(var, default).is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// Builds the class type used for tuples of the given item types
    pub fn tuple_of(&mut self, items: &[TypeId]) -> TypeId {
        let generics = items.iter().enumerate().map(|(i, &ty)| {
            let name: Arc<str> = format!("T{}", i+1).into();
            Generic {nice_name: name.clone(), name, id: self.fresh_var_id(), ty, is_static: false}
        }).collect();

        self.new_class(ClassType {
            name: tuple_name(items.len()).into(),
            nice_name: "Tuple".into(),
            generics,
            hidden_generics: Vec::new(),
            is_record: true,
        })
    }

    /// Returns the item types of a tuple type
    pub fn tuple_items(&self, id: TypeId) -> Option<Vec<TypeId>> {
        let class = self.class(id)?;
        if !is_tuple_name(&class.name) {
            return None;
        }
        Some(class.generics.iter().map(|g| g.ty).collect())
    }

    pub fn snapshot(&mut self) -> Snapshot {
        self.open_snapshots += 1;
        Snapshot {
            inner: self.nodes.start_snapshot(),
            next_var: self.next_var,
            defaulted: self.defaulted.len(),
        }
    }

    /// Undoes every mutation made since the snapshot was taken, including discarding any nodes
    /// pushed after it
    pub fn rollback_to(&mut self, snapshot: Snapshot) {
        self.open_snapshots -= 1;
        self.nodes.rollback_to(snapshot.inner);
        self.next_var = snapshot.next_var;

        let len = self.nodes.len();
        self.names.borrow_mut().retain(|id, _| id.index() < len);
        self.defaulted.truncate(snapshot.defaulted);
    }

    /// Keeps every mutation made since the snapshot was taken
    pub fn commit(&mut self, snapshot: Snapshot) {
        self.open_snapshots -= 1;
        self.nodes.commit(snapshot.inner);
    }

    /// Runs `f` speculatively and rolls back every mutation it made, returning its result
    pub fn speculate<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let snapshot = self.snapshot();
        let result = f(self);
        self.rollback_to(snapshot);
        result
    }

    pub fn in_snapshot(&self) -> bool {
        self.open_snapshots > 0
    }
}

/// The reserved name of the tuple record with the given number of items
pub fn tuple_name(len: usize) -> String {
    format!("Tuple.{}", len)
}

pub fn is_tuple_name(name: &str) -> bool {
    name.strip_prefix("Tuple.").map_or(false, |len| len.parse::<usize>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_discards_bindings_and_new_nodes() {
        let mut store = TypeStore::default();
        let var = store.new_unbound(0);
        let int = store.new_class(ClassType::simple("int"));
        let before = store.len();

        let snapshot = store.snapshot();
        let tmp = store.new_unbound(0);
        store.unify(var, tmp).unwrap();
        store.unify(tmp, int).unwrap();
        assert!(store.is_class(var, "int"));
        store.rollback_to(snapshot);

        assert!(store.is_unbound(var));
        assert_eq!(store.len(), before);
        assert!(!store.in_snapshot());
    }

    #[test]
    fn defaults_apply_only_to_unconstrained_variables() {
        let mut store = TypeStore::default();
        let none = store.new_class(ClassType::simple("NoneType"));
        let int = store.new_class(ClassType::simple("int"));
        let (free, pinned) = (store.new_unbound(0), store.new_unbound(0));
        store.set_default(free, none);
        store.set_default(pinned, none);
        store.unify(pinned, int).unwrap();

        assert_eq!(store.apply_defaults(0), 1);
        assert!(store.is_class(free, "NoneType"));
        assert!(store.is_class(pinned, "int"));
        assert_eq!(store.apply_defaults(0), 0);
    }

    #[test]
    fn defaults_of_older_variables_stay_pending() {
        let mut store = TypeStore::default();
        let none = store.new_class(ClassType::simple("NoneType"));
        let outer = store.new_unbound(0);
        store.set_default(outer, none);

        let since = store.len();
        let inner = store.new_unbound(1);
        store.set_default(inner, none);

        assert_eq!(store.apply_defaults(since), 1);
        assert!(store.is_unbound(outer));
        assert!(store.is_class(inner, "NoneType"));
        assert_eq!(store.apply_defaults(0), 1);
        assert!(store.is_class(outer, "NoneType"));
    }

    #[test]
    fn rollback_forgets_defaults_and_variable_ids() {
        let mut store = TypeStore::default();
        let none = store.new_class(ClassType::simple("NoneType"));
        let kept = store.new_unbound(0);
        store.set_default(kept, none);
        let next_id = store.fresh_var_id() + 1;

        let snapshot = store.snapshot();
        let discarded = store.new_unbound(0);
        store.set_default(discarded, none);
        store.rollback_to(snapshot);

        assert_eq!(store.fresh_var_id(), next_id);
        // Only the variable that survived the rollback receives its default
        assert_eq!(store.apply_defaults(0), 1);
        assert!(store.is_class(kept, "NoneType"));
    }

    #[test]
    fn tuple_names_are_reserved() {
        let mut store = TypeStore::default();
        let int = store.new_class(ClassType::simple("int"));
        let str_ty = store.new_class(ClassType::simple("str"));
        let tuple = store.tuple_of(&[int, str_ty]);

        assert_eq!(&**store.class_name(tuple).unwrap(), "Tuple.2");
        assert_eq!(store.tuple_items(tuple), Some(vec![int, str_ty]));
        assert!(is_tuple_name("Tuple.0"));
        assert!(!is_tuple_name("Tuple"));
        assert!(!is_tuple_name("Tuple.x"));
    }
}
