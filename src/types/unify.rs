use crate::fmt_ctx::DisplayCtx;

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum UnifyError {
    MismatchedTypes {
        ty1: TypeId,
        ty2: TypeId,
    },

    ArityMismatch {
        ty1: TypeId,
        ty1_arity: usize,
        ty2: TypeId,
        ty2_arity: usize,
    },

    /// Binding the variable would make the type contain itself
    Infinite {
        var: TypeId,
        ty: TypeId,
    },

    UnionTooLarge {
        union: TypeId,
    },
}

impl DisplayCtx<TypeStore> for UnifyError {
    fn fmt_ctx(&self, f: &mut std::fmt::Formatter<'_>, ctx: &TypeStore) -> std::fmt::Result {
        use UnifyError::*;
        match self {
            MismatchedTypes {ty1, ty2} => crate::cwrite!(f, ctx, "mismatched types: '{}' and '{}'", ty1, ty2),
            ArityMismatch {ty1, ty1_arity, ty2, ty2_arity} => crate::cwrite!(f, ctx,
                "'{}' has {} generics but '{}' has {}", ty1, ty1_arity, ty2, ty2_arity),
            Infinite {var, ty} => crate::cwrite!(f, ctx, "'{}' occurs in '{}'", var, ty),
            UnionTooLarge {union} => crate::cwrite!(f, ctx, "'{}' exceeds the maximum number of members", union),
        }
    }
}

/// The score of an agreement between two identical variables or literals
const SAME_SCORE: usize = 1;
/// Base score for two functions with the same identity
const FUNC_SCORE: usize = 2;
/// Base score for two classes with the same name
const CLASS_SCORE: usize = 3;

impl TypeStore {
    /// Makes `a` and `b` denote the same type
    ///
    /// Returns a score ranking how concretely the two sides agreed. Every mutation is written
    /// through the undo log, so callers that need to back out of a failed (or merely
    /// speculative) attempt take a snapshot first.
    pub fn unify(&mut self, a: TypeId, b: TypeId) -> Result<usize, UnifyError> {
        let a = self.follow(a);
        let b = self.follow(b);

        use LinkType::{Unbound, Bound};
        match (self.get(a).clone(), self.get(b).clone()) {
            (Type::Link(Unbound(va)), Type::Link(Unbound(vb))) => self.unify_vars(a, va, b, vb),
            (Type::Link(Unbound(var)), _) => self.bind(a, var, b),
            (_, Type::Link(Unbound(var))) => self.bind(b, var, a),

            (Type::Link(LinkType::Generic(g1)), Type::Link(LinkType::Generic(g2))) if g1.id == g2.id => Ok(SAME_SCORE),
            (Type::Link(LinkType::Generic(_)), _) | (_, Type::Link(LinkType::Generic(_))) => {
                Err(UnifyError::MismatchedTypes {ty1: a, ty2: b})
            },
            (Type::Link(Bound(_)), _) | (_, Type::Link(Bound(_))) => unreachable!("bug: bound links should have been followed"),

            (Type::Static(s1), Type::Static(s2)) => if s1.value == s2.value {
                Ok(SAME_SCORE)
            } else {
                Err(UnifyError::MismatchedTypes {ty1: a, ty2: b})
            },
            // A static literal is also a value of its ordinary class
            (Type::Static(s), Type::Class(c)) | (Type::Class(c), Type::Static(s)) => {
                if &*c.name == s.kind().type_name() && c.generics.is_empty() {
                    Ok(CLASS_SCORE)
                } else {
                    Err(UnifyError::MismatchedTypes {ty1: a, ty2: b})
                }
            },

            (Type::Union(u1), Type::Union(u2)) => self.unify_unions(a, u1, b, u2),
            (Type::Union(union), _) => self.unify_union_member(a, union, b),
            (_, Type::Union(union)) => self.unify_union_member(b, union, a),

            (Type::Func(f1), Type::Func(f2)) => self.unify_funcs(a, &f1, b, &f2),
            (Type::Func(func), Type::Class(class)) => self.unify_classes(a, &func.base, b, &class),
            (Type::Class(class), Type::Func(func)) => self.unify_classes(a, &class, b, &func.base),
            (Type::Class(c1), Type::Class(c2)) => self.unify_classes(a, &c1, b, &c2),

            _ => Err(UnifyError::MismatchedTypes {ty1: a, ty2: b}),
        }
    }

    /// Unifies two types and reports whether it would succeed, leaving no trace either way
    pub fn can_unify(&mut self, a: TypeId, b: TypeId) -> Option<usize> {
        self.speculate(|store| store.unify(a, b).ok())
    }

    fn unify_vars(&mut self, a: TypeId, va: TypeVar, b: TypeId, vb: TypeVar) -> Result<usize, UnifyError> {
        if va.id == vb.id {
            return Ok(SAME_SCORE);
        }
        if let (Some(k1), Some(k2)) = (va.static_kind, vb.static_kind) {
            if k1 != k2 {
                return Err(UnifyError::MismatchedTypes {ty1: a, ty2: b});
            }
        }

        // The newer variable forwards to the older one
        let ((from, from_var), (to, to_var)) = if va.id > vb.id {
            ((a, va), (b, vb))
        } else {
            ((b, vb), (a, va))
        };

        let merged = TypeVar {
            level: to_var.level.min(from_var.level),
            static_kind: to_var.static_kind.or(from_var.static_kind),
            default: to_var.default.or(from_var.default),
            name: to_var.name.clone().or(from_var.name),
            id: to_var.id,
        };
        if merged != to_var {
            self.set(to, Type::Link(LinkType::Unbound(merged)));
        }
        self.set(from, Type::Link(LinkType::Bound(to)));

        Ok(0)
    }

    fn bind(&mut self, var_id: TypeId, var: TypeVar, target: TypeId) -> Result<usize, UnifyError> {
        if let Some(kind) = var.static_kind {
            match self.get(target) {
                Type::Static(ty) if ty.kind() == kind => {},
                _ => return Err(UnifyError::MismatchedTypes {ty1: var_id, ty2: target}),
            }
        }

        self.adjust_levels(target, &var, var_id)?;
        self.set(var_id, Type::Link(LinkType::Bound(target)));

        Ok(0)
    }

    /// Lowers the level of every variable inside `ty` to the level of `var` so that binding
    /// `var` cannot smuggle an inner-level variable out of its generalization scope
    fn adjust_levels(&mut self, ty: TypeId, var: &TypeVar, var_id: TypeId) -> Result<(), UnifyError> {
        let ty = self.follow(ty);
        match self.get(ty).clone() {
            Type::Link(LinkType::Unbound(inner)) => {
                if inner.id == var.id {
                    return Err(UnifyError::Infinite {var: var_id, ty});
                }
                if inner.level > var.level {
                    self.set(ty, Type::Link(LinkType::Unbound(TypeVar {level: var.level, ..inner})));
                }
            },
            Type::Link(_) | Type::Static(_) => {},
            Type::Class(class) => {
                for g in class.all_generics() {
                    self.adjust_levels(g.ty, var, var_id)?;
                }
            },
            Type::Func(func) => {
                for g in func.base.all_generics().chain(&func.func_generics) {
                    self.adjust_levels(g.ty, var, var_id)?;
                }
                if let Some(parent) = func.parent {
                    self.adjust_levels(parent, var, var_id)?;
                }
            },
            Type::Union(union) => {
                for g in union.base.all_generics() {
                    self.adjust_levels(g.ty, var, var_id)?;
                }
                for member in union.pending {
                    self.adjust_levels(member, var, var_id)?;
                }
            },
        }

        Ok(())
    }

    fn unify_classes(&mut self, a: TypeId, c1: &ClassType, b: TypeId, c2: &ClassType) -> Result<usize, UnifyError> {
        // `Int[64]` is the same type as `int`
        match (&*c1.name, &*c2.name) {
            ("Int", "int") => return self.unify_int_width(&c1.generics),
            ("int", "Int") => return self.unify_int_width(&c2.generics),
            _ => {},
        }

        if c1.name != c2.name {
            return Err(UnifyError::MismatchedTypes {ty1: a, ty2: b});
        }
        if c1.generics.len() != c2.generics.len() || c1.hidden_generics.len() != c2.hidden_generics.len() {
            return Err(UnifyError::ArityMismatch {
                ty1: a,
                ty1_arity: c1.all_generics().count(),
                ty2: b,
                ty2_arity: c2.all_generics().count(),
            });
        }

        let mut score = CLASS_SCORE;
        for (g1, g2) in c1.generics.iter().zip(&c2.generics) {
            score += self.unify(g1.ty, g2.ty)?;
        }
        for (g1, g2) in c1.hidden_generics.iter().zip(&c2.hidden_generics) {
            score += self.unify(g1.ty, g2.ty)?;
        }

        Ok(score)
    }

    fn unify_int_width(&mut self, int_generics: &[Generic]) -> Result<usize, UnifyError> {
        let width = int_generics.first().map(|g| g.ty)
            .expect("bug: `Int` should have exactly one generic");
        let witness = self.new_static(StaticLiteral::Int(64));
        self.unify(width, witness)
    }

    fn unify_funcs(&mut self, a: TypeId, f1: &FuncType, b: TypeId, f2: &FuncType) -> Result<usize, UnifyError> {
        if f1.ast_name != f2.ast_name || f1.index != f2.index || f1.parent.is_some() != f2.parent.is_some() {
            return Err(UnifyError::MismatchedTypes {ty1: a, ty2: b});
        }

        let mut score = FUNC_SCORE;
        if let (Some(p1), Some(p2)) = (f1.parent, f2.parent) {
            score += self.unify(p1, p2)?;
        }

        assert_eq!(f1.func_generics.len(), f2.func_generics.len(),
            "bug: function `{}` was instantiated with different generic arities", f1.ast_name);
        for (g1, g2) in f1.func_generics.iter().zip(&f2.func_generics) {
            score += self.unify(g1.ty, g2.ty)?;
        }

        score += self.unify_classes(a, &f1.base, b, &f2.base)?;
        Ok(score)
    }

    fn unify_unions(&mut self, a: TypeId, u1: UnionType, b: TypeId, u2: UnionType) -> Result<usize, UnifyError> {
        if u1.sealed && u2.sealed {
            return self.unify(u1.members_tuple(), u2.members_tuple());
        }

        // An open union absorbs every candidate of the other side
        if !u1.sealed {
            for member in self.union_candidates(&u2) {
                self.add_union_member(a, member)?;
            }
        }
        if !u2.sealed {
            for member in self.union_candidates(&u1) {
                self.add_union_member(b, member)?;
            }
        }

        Ok(0)
    }

    fn unify_union_member(&mut self, union_id: TypeId, union: UnionType, other: TypeId) -> Result<usize, UnifyError> {
        if !union.sealed {
            self.add_union_member(union_id, other)?;
            return Ok(0);
        }

        for member in self.union_candidates(&union) {
            let snapshot = self.snapshot();
            match self.unify(member, other) {
                Ok(score) => {
                    self.commit(snapshot);
                    return Ok(score);
                },
                Err(_) => self.rollback_to(snapshot),
            }
        }

        Err(UnifyError::MismatchedTypes {ty1: union_id, ty2: other})
    }

    /// Returns the member types of a union: the sealed members, or the pending candidates
    pub fn union_candidates(&self, union: &UnionType) -> Vec<TypeId> {
        if union.sealed {
            self.tuple_items(union.members_tuple()).unwrap_or_default()
        } else {
            union.pending.clone()
        }
    }

    /// Adds a candidate member to an unsealed union. Nested unions contribute their members.
    pub fn add_union_member(&mut self, union_id: TypeId, member: TypeId) -> Result<(), UnifyError> {
        let union_id = self.follow(union_id);
        let member = self.follow(member);

        let mut union = match self.get(union_id) {
            Type::Union(union) => union.clone(),
            _ => panic!("bug: expected a union type"),
        };
        assert!(!union.sealed, "bug: cannot add members to a sealed union");

        let new_members = match self.get(member) {
            Type::Union(other) => self.union_candidates(&other.clone()),
            _ => vec![member],
        };

        for member in new_members {
            if union.pending.contains(&member) {
                continue;
            }
            if union.pending.len() >= MAX_UNION {
                return Err(UnifyError::UnionTooLarge {union: union_id});
            }
            union.pending.push(member);
        }

        self.set(union_id, Type::Union(union));
        Ok(())
    }

    /// Creates an open union
    pub fn new_union(&mut self, level: usize) -> TypeId {
        let members = self.new_unbound(level);
        let id = self.fresh_var_id();
        self.push(Type::Union(UnionType {
            base: ClassType {
                name: UNION_CLASS.into(),
                nice_name: UNION_CLASS.into(),
                generics: vec![Generic {name: "T".into(), nice_name: "T".into(), id, ty: members, is_static: false}],
                hidden_generics: Vec::new(),
                is_record: true,
            },
            pending: Vec::new(),
            sealed: false,
        }))
    }

    /// Seals a union: members are deduplicated and sorted by realized name, after which the
    /// union only unifies with its existing members
    ///
    /// Every pending member must be realizable.
    pub fn seal_union(&mut self, union_id: TypeId) -> Result<(), UnifyError> {
        let union_id = self.follow(union_id);
        let union = match self.get(union_id) {
            Type::Union(union) if !union.sealed => union.clone(),
            Type::Union(_) => return Ok(()),
            _ => panic!("bug: expected a union type"),
        };

        let mut members: Vec<(String, TypeId)> = Vec::new();
        for &member in &union.pending {
            let name = self.realized_name(member);
            if !members.iter().any(|(n, _)| *n == name) {
                members.push((name, member));
            }
        }
        members.sort_by(|(n1, _), (n2, _)| n1.cmp(n2));

        let items: Vec<_> = members.into_iter().map(|(_, ty)| ty).collect();
        let tuple = self.tuple_of(&items);
        let mut sealed = union;
        sealed.sealed = true;
        sealed.pending = items;
        let members_var = sealed.members_tuple();
        self.set(union_id, Type::Union(sealed));
        self.unify(members_var, tuple)?;

        Ok(())
    }

    /// Returns the sorted, deduplicated member types of a sealed union
    pub fn union_realization_types(&self, union_id: TypeId) -> Vec<TypeId> {
        match self.union(union_id) {
            Some(union) if union.sealed => self.union_candidates(union),
            Some(union) => union.pending.clone(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(store: &mut TypeStore, name: &str, generics: &[TypeId]) -> TypeId {
        let generics = generics.iter().enumerate().map(|(i, &ty)| Generic {
            name: format!("T{}", i).into(),
            nice_name: format!("T{}", i).into(),
            id: store.fresh_var_id(),
            ty,
            is_static: false,
        }).collect();
        store.new_class(ClassType {name: name.into(), nice_name: name.into(), generics, hidden_generics: Vec::new(), is_record: false})
    }

    #[test]
    fn binds_variables_through_generics() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let var = store.new_unbound(0);
        let list_var = class(&mut store, "List", &[var]);
        let list_int = class(&mut store, "List", &[int]);

        // Binding a variable adds nothing to the score
        let score = store.unify(list_var, list_int).unwrap();
        assert_eq!(score, CLASS_SCORE);
        let list_int2 = class(&mut store, "List", &[int]);
        assert_eq!(store.unify(list_int, list_int2), Ok(CLASS_SCORE + CLASS_SCORE));
        assert!(store.is_class(var, "int"));
    }

    #[test]
    fn rejects_distinct_names_and_arities() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let float = class(&mut store, "float", &[]);
        assert!(matches!(store.unify(int, float), Err(UnifyError::MismatchedTypes {..})));

        let one = class(&mut store, "Box", &[int]);
        let two = class(&mut store, "Box", &[int, int]);
        assert!(matches!(store.unify(one, two), Err(UnifyError::ArityMismatch {ty1_arity: 1, ty2_arity: 2, ..})));
    }

    #[test]
    fn hidden_generics_count_towards_arity() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let plain = class(&mut store, "Box", &[int]);
        let hidden = class(&mut store, "Box", &[int]);
        let id = store.fresh_var_id();
        let mut with_hidden = store.class(hidden).cloned().unwrap();
        with_hidden.hidden_generics.push(Generic {name: "H".into(), nice_name: "H".into(), id, ty: int, is_static: false});
        let hidden = store.new_class(with_hidden);

        assert!(matches!(store.unify(plain, hidden), Err(UnifyError::ArityMismatch {ty1_arity: 1, ty2_arity: 2, ..})));
        assert!(matches!(store.unify(hidden, plain), Err(UnifyError::ArityMismatch {ty1_arity: 2, ty2_arity: 1, ..})));
    }

    #[test]
    fn success_agrees_in_both_directions() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let str_ty = class(&mut store, "str", &[]);
        let v1 = store.new_unbound(0);
        let v2 = store.new_unbound(1);
        let v3 = store.new_unbound(0);
        let pairs = vec![
            (class(&mut store, "List", &[v1]), class(&mut store, "List", &[int])),
            (class(&mut store, "Dict", &[int, v2]), class(&mut store, "Dict", &[v3, str_ty])),
            (class(&mut store, "List", &[int]), class(&mut store, "List", &[str_ty])),
            (int, v3),
        ];

        for (a, b) in pairs {
            let forward = store.speculate(|store| store.unify(a, b).is_ok());
            let backward = store.speculate(|store| store.unify(b, a).is_ok());
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn int_alias_unifies_with_64_bit_width() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let width = store.new_static_unbound(0, StaticKind::Int);
        let int64 = class(&mut store, "Int", &[width]);

        store.unify(int, int64).unwrap();
        assert_eq!(store.static_type(width).map(|s| s.value.clone()), Some(StaticLiteral::Int(64)));

        let width32 = store.new_static(StaticLiteral::Int(32));
        let int32 = class(&mut store, "Int", &[width32]);
        assert!(store.can_unify(int32, int).is_none());
    }

    #[test]
    fn static_literals_compare_values() {
        let mut store = TypeStore::default();
        let three = store.new_static(StaticLiteral::Int(3));
        let other_three = store.new_static(StaticLiteral::Int(3));
        let four = store.new_static(StaticLiteral::Int(4));
        assert_eq!(store.unify(three, other_three), Ok(SAME_SCORE));
        assert!(store.unify(three, four).is_err());

        let var = store.new_static_unbound(0, StaticKind::Str);
        assert!(store.can_unify(var, three).is_none());
        let int = class(&mut store, "int", &[]);
        let int_var = store.new_static_unbound(0, StaticKind::Int);
        assert!(store.can_unify(int_var, int).is_none());
    }

    #[test]
    fn levels_are_lowered_when_binding() {
        let mut store = TypeStore::default();
        let outer = store.new_unbound(0);
        let inner = store.new_unbound(2);
        let list = class(&mut store, "List", &[inner]);

        store.unify(outer, list).unwrap();
        assert_eq!(store.unbound(inner).map(|var| var.level), Some(0));
    }

    #[test]
    fn cyclic_bindings_are_refused() {
        let mut store = TypeStore::default();
        let var = store.new_unbound(0);
        let list = class(&mut store, "List", &[var]);
        assert!(matches!(store.unify(var, list), Err(UnifyError::Infinite {..})));
    }

    #[test]
    fn open_unions_collect_and_sealed_unions_match_members() {
        let mut store = TypeStore::default();
        let int = class(&mut store, "int", &[]);
        let str_ty = class(&mut store, "str", &[]);
        let float = class(&mut store, "float", &[]);

        let union = store.new_union(0);
        store.unify(union, str_ty).unwrap();
        store.unify(union, int).unwrap();
        store.unify(union, int).unwrap();
        assert_eq!(store.union_realization_types(union).len(), 2);

        store.seal_union(union).unwrap();
        let members = store.union_realization_types(union);
        assert_eq!(members.iter().map(|&m| store.realized_name(m)).collect::<Vec<_>>(), vec!["int", "str"]);

        assert!(store.can_unify(union, int).is_some());
        assert!(store.can_unify(union, float).is_none());
    }
}
