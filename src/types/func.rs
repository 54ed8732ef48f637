use std::sync::Arc;

use super::{ClassType, Generic, TypeId};

/// The class every function type extends
pub const FUNCTION_CLASS: &str = "Function";

/// The type of a function value
///
/// The base class is `Function[Tuple.N[args...], ret]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub base: ClassType,
    /// Canonical name of the defining function
    pub ast_name: Arc<str>,
    /// Distinguishes closures over the same source function
    pub index: usize,
    pub func_generics: Vec<Generic>,
    /// The enclosing class or function
    pub parent: Option<TypeId>,
}

impl FuncType {
    pub fn args_tuple(&self) -> TypeId {
        self.base.generics[0].ty
    }

    pub fn ret(&self) -> TypeId {
        self.base.generics[1].ty
    }
}
