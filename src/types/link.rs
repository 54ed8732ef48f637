use std::sync::Arc;

use super::TypeId;

/// The kind of compile-time literal a static type (or static type variable) carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticKind {
    Int,
    Str,
    Bool,
}

impl StaticKind {
    /// The name of the ordinary class whose values this kind describes
    pub fn type_name(self) -> &'static str {
        match self {
            StaticKind::Int => "int",
            StaticKind::Str => "str",
            StaticKind::Bool => "bool",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(StaticKind::Int),
            "str" => Some(StaticKind::Str),
            "bool" => Some(StaticKind::Bool),
            _ => None,
        }
    }
}

/// An inference variable or generic placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct TypeVar {
    /// Unique across the session. Generic placeholders keep the id of the variable they were
    /// generalized from so that instantiation can share one fresh variable per id.
    pub id: usize,
    /// The generalization level this variable was created at
    pub level: usize,
    /// Restricts the variable to static types of the given kind
    pub static_kind: Option<StaticKind>,
    /// Used when nothing else ever constrains the variable
    pub default: Option<TypeId>,
    /// The generic parameter name this variable stands for, if any
    pub name: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkType {
    Unbound(TypeVar),
    Generic(TypeVar),
    /// A forwarding pointer to the type this variable was unified with
    Bound(TypeId),
}
