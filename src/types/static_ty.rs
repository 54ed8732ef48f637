use std::fmt;

use super::StaticKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StaticLiteral {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl StaticLiteral {
    pub fn kind(&self) -> StaticKind {
        match self {
            StaticLiteral::Int(_) => StaticKind::Int,
            StaticLiteral::Str(_) => StaticKind::Str,
            StaticLiteral::Bool(_) => StaticKind::Bool,
        }
    }
}

impl fmt::Display for StaticLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticLiteral::Int(value) => write!(f, "{}", value),
            StaticLiteral::Str(value) => write!(f, "'{}'", value.escape_default()),
            StaticLiteral::Bool(true) => write!(f, "True"),
            StaticLiteral::Bool(false) => write!(f, "False"),
        }
    }
}

/// A compile-time value participating in unification as a type
///
/// A static whose value is not known yet is represented by an unbound variable restricted to
/// the static kind, so every `StaticType` node carries its evaluated literal.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticType {
    pub value: StaticLiteral,
}

impl StaticType {
    pub fn kind(&self) -> StaticKind {
        self.value.kind()
    }
}
