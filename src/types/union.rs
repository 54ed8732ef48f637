use super::{ClassType, TypeId};

/// The maximum number of member types a union may collect
pub const MAX_UNION: usize = 256;

pub const UNION_CLASS: &str = "Union";

/// An algebraic sum of member types
///
/// An unsealed union accepts new members through unification. Sealing sorts and deduplicates
/// the members by realized name and fixes the single generic of the base class to a tuple of
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    /// `Union[T]` where `T` is the tuple of members once sealed
    pub base: ClassType,
    pub pending: Vec<TypeId>,
    pub sealed: bool,
}

impl UnionType {
    pub fn members_tuple(&self) -> TypeId {
        self.base.generics[0].ty
    }
}
