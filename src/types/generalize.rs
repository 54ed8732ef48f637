use std::collections::HashMap;

use super::*;

/// Maps generic ids to the fresh variables (or explicit types) they are replaced with during one
/// instantiation
pub type Substitution = HashMap<usize, TypeId>;

impl TypeStore {
    /// Turns every unbound variable created at `level` or deeper into a generic placeholder
    ///
    /// Structure is copied into new nodes. Static literals and variables from outer levels are
    /// shared with the original.
    pub fn generalize(&mut self, ty: TypeId, level: usize) -> TypeId {
        let ty = self.follow(ty);
        match self.get(ty).clone() {
            Type::Link(LinkType::Unbound(var)) if var.level >= level => {
                let default = var.default.map(|default| self.generalize(default, level));
                self.push(Type::Link(LinkType::Generic(TypeVar {default, ..var})))
            },
            Type::Link(_) | Type::Static(_) => ty,
            Type::Class(class) => {
                let class = self.generalize_class(class, level);
                self.push(Type::Class(class))
            },
            Type::Func(func) => {
                let func = FuncType {
                    base: self.generalize_class(func.base, level),
                    func_generics: self.generalize_generics(func.func_generics, level),
                    parent: func.parent.map(|parent| self.generalize(parent, level)),
                    ..func
                };
                self.push(Type::Func(func))
            },
            Type::Union(union) => {
                let union = UnionType {
                    base: self.generalize_class(union.base, level),
                    pending: union.pending.into_iter().map(|member| self.generalize(member, level)).collect(),
                    sealed: union.sealed,
                };
                self.push(Type::Union(union))
            },
        }
    }

    fn generalize_class(&mut self, class: ClassType, level: usize) -> ClassType {
        ClassType {
            generics: self.generalize_generics(class.generics, level),
            hidden_generics: self.generalize_generics(class.hidden_generics, level),
            ..class
        }
    }

    fn generalize_generics(&mut self, generics: Vec<Generic>, level: usize) -> Vec<Generic> {
        generics.into_iter().map(|g| Generic {ty: self.generalize(g.ty, level), ..g}).collect()
    }

    /// Replaces every generic placeholder with a fresh unbound variable at `level`
    ///
    /// The same substitution must be threaded through every part of one instantiation so that
    /// a generic id occurring in several places maps to a single variable. Entries already in
    /// `subst` are used as-is, which is how a method is instantiated against a concrete class.
    pub fn instantiate(&mut self, ty: TypeId, level: usize, subst: &mut Substitution) -> TypeId {
        let ty = self.follow(ty);
        match self.get(ty).clone() {
            Type::Link(LinkType::Generic(var)) => {
                if let Some(&fresh) = subst.get(&var.id) {
                    return fresh;
                }

                let fresh = self.new_var(level, var.static_kind, var.name.clone());
                subst.insert(var.id, fresh);
                if let Some(default) = var.default {
                    let default = self.instantiate(default, level, subst);
                    self.set_default(fresh, default);
                }
                fresh
            },
            Type::Link(_) | Type::Static(_) => ty,
            Type::Class(class) => {
                let class = self.instantiate_class(class, level, subst);
                self.push(Type::Class(class))
            },
            Type::Func(func) => {
                let func_generics = self.instantiate_generics(func.func_generics, level, subst);
                for g in &func_generics {
                    subst.entry(g.id).or_insert(g.ty);
                }
                let func = FuncType {
                    base: self.instantiate_class(func.base, level, subst),
                    func_generics,
                    parent: func.parent.map(|parent| self.instantiate(parent, level, subst)),
                    ..func
                };
                self.push(Type::Func(func))
            },
            Type::Union(union) => {
                let union = UnionType {
                    base: self.instantiate_class(union.base, level, subst),
                    pending: union.pending.into_iter().map(|member| self.instantiate(member, level, subst)).collect(),
                    sealed: union.sealed,
                };
                self.push(Type::Union(union))
            },
        }
    }

    fn instantiate_class(&mut self, class: ClassType, level: usize, subst: &mut Substitution) -> ClassType {
        ClassType {
            generics: self.instantiate_generics(class.generics, level, subst),
            hidden_generics: self.instantiate_generics(class.hidden_generics, level, subst),
            ..class
        }
    }

    fn instantiate_generics(&mut self, generics: Vec<Generic>, level: usize, subst: &mut Substitution) -> Vec<Generic> {
        generics.into_iter().map(|g| Generic {ty: self.instantiate(g.ty, level, subst), ..g}).collect()
    }

    /// Builds the substitution that maps a class's declared generics to the types currently
    /// filling them in `class_ty`
    pub fn class_substitution(&self, class_ty: TypeId) -> Substitution {
        let mut subst = Substitution::new();
        if let Some(class) = self.class(class_ty) {
            for g in class.all_generics() {
                subst.insert(g.id, g.ty);
            }
        }
        subst
    }

    /// True if any unbound variable is reachable from this type
    pub fn has_unbounds(&self, ty: TypeId) -> bool {
        match self.resolve(ty) {
            Type::Link(LinkType::Unbound(_)) => true,
            Type::Link(_) | Type::Static(_) => false,
            Type::Class(class) => class.all_generics().any(|g| self.has_unbounds(g.ty)),
            Type::Func(func) => func.base.all_generics().chain(&func.func_generics).any(|g| self.has_unbounds(g.ty))
                || func.parent.map_or(false, |parent| self.has_unbounds(parent)),
            Type::Union(union) => union.pending.iter().any(|&member| self.has_unbounds(member)),
        }
    }

    /// True if the variable `var` is reachable from `ty`
    pub fn occurs_in(&self, var: TypeId, ty: TypeId) -> bool {
        let (var, ty) = (self.follow(var), self.follow(ty));
        if var == ty {
            return true;
        }
        match self.get(ty) {
            Type::Link(_) | Type::Static(_) => false,
            Type::Class(class) => class.all_generics().any(|g| self.occurs_in(var, g.ty)),
            Type::Func(func) => func.base.all_generics().chain(&func.func_generics).any(|g| self.occurs_in(var, g.ty))
                || func.parent.map_or(false, |parent| self.occurs_in(var, parent)),
            Type::Union(union) => union.pending.iter().any(|&member| self.occurs_in(var, member)),
        }
    }

    /// True if the type is concrete enough to be monomorphized
    ///
    /// A function's return type is excused, as is any argument that is itself a function.
    pub fn can_realize(&self, ty: TypeId) -> bool {
        match self.resolve(ty) {
            Type::Link(_) => false,
            Type::Static(_) => true,
            Type::Class(class) if &*class.name == "type" => !self.has_unbounds(ty),
            Type::Class(class) => class.all_generics().all(|g| self.can_realize(g.ty)),
            Type::Func(func) => {
                let args_ok = self.tuple_items(func.args_tuple()).unwrap_or_default().into_iter()
                    .all(|arg| self.func(arg).is_some() || self.can_realize(arg));
                args_ok
                    && func.func_generics.iter().all(|g| self.can_realize(g.ty))
                    && func.parent.map_or(true, |parent| self.can_realize(parent))
            },
            Type::Union(union) => {
                if union.sealed {
                    self.can_realize(union.members_tuple())
                } else {
                    !union.pending.is_empty() && union.pending.iter().all(|&member| self.can_realize(member))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic_class(store: &mut TypeStore, name: &str, params: &[TypeId]) -> TypeId {
        let generics = params.iter().enumerate().map(|(i, &ty)| Generic {
            name: format!("T{}", i).into(),
            nice_name: format!("T{}", i).into(),
            id: store.unbound(ty).map(|var| var.id).unwrap_or(usize::MAX),
            ty,
            is_static: false,
        }).collect();
        store.new_class(ClassType {name: name.into(), nice_name: name.into(), generics, hidden_generics: Vec::new(), is_record: false})
    }

    fn shape(store: &TypeStore, ty: TypeId) -> Vec<(String, bool)> {
        let class = store.class(ty).unwrap();
        class.generics.iter()
            .map(|g| (g.name.to_string(), matches!(store.resolve(g.ty), Type::Link(LinkType::Generic(_)))))
            .collect()
    }

    #[test]
    fn generalize_then_instantiate_round_trips() {
        let mut store = TypeStore::default();
        let k = store.new_unbound(1);
        let v = store.new_unbound(1);
        let dict = generic_class(&mut store, "Dict", &[k, v]);

        let generalized = store.generalize(dict, 1);
        assert_eq!(shape(&store, generalized), vec![("T0".to_string(), true), ("T1".to_string(), true)]);

        let instance = store.instantiate(generalized, 2, &mut Substitution::new());
        assert!(!store.has_unbounds(generalized));
        assert!(store.has_unbounds(instance));

        let again = store.generalize(instance, 1);
        assert_eq!(shape(&store, again), shape(&store, generalized));
    }

    #[test]
    fn outer_level_variables_stay_shared() {
        let mut store = TypeStore::default();
        let outer = store.new_unbound(0);
        let inner = store.new_unbound(1);
        let pair = generic_class(&mut store, "Pair", &[outer, inner]);

        let generalized = store.generalize(pair, 1);
        let class = store.class(generalized).unwrap().clone();
        assert_eq!(store.follow(class.generics[0].ty), outer);
        assert!(matches!(store.resolve(class.generics[1].ty), Type::Link(LinkType::Generic(_))));
    }

    #[test]
    fn one_fresh_variable_per_generic_id() {
        let mut store = TypeStore::default();
        let t = store.new_unbound(1);
        let pair = generic_class(&mut store, "Pair", &[t, t]);
        let generalized = store.generalize(pair, 1);

        let instance = store.instantiate(generalized, 1, &mut Substitution::new());
        let class = store.class(instance).unwrap().clone();
        assert_eq!(store.follow(class.generics[0].ty), store.follow(class.generics[1].ty));
    }

    #[test]
    fn finds_variables_nested_in_generics() {
        let mut store = TypeStore::default();
        let t = store.new_unbound(0);
        let other = store.new_unbound(0);
        let list = generic_class(&mut store, "List", &[t]);
        let nested = generic_class(&mut store, "Optional", &[list]);

        assert!(store.occurs_in(t, nested));
        assert!(!store.occurs_in(other, nested));
    }

    #[test]
    fn realizability_ignores_return_types() {
        let mut store = TypeStore::default();
        let int = store.new_class(ClassType::simple("int"));
        let ret = store.new_unbound(0);
        let args = store.tuple_of(&[int]);
        let func = store.push(Type::Func(FuncType {
            base: ClassType {
                name: FUNCTION_CLASS.into(),
                nice_name: FUNCTION_CLASS.into(),
                generics: vec![
                    Generic {name: "T".into(), nice_name: "T".into(), id: 0, ty: args, is_static: false},
                    Generic {name: "R".into(), nice_name: "R".into(), id: 1, ty: ret, is_static: false},
                ],
                hidden_generics: Vec::new(),
                is_record: true,
            },
            ast_name: "f".into(),
            index: 0,
            func_generics: Vec::new(),
            parent: None,
        }));

        assert!(store.can_realize(func));
        assert!(!store.can_realize(ret));
    }
}
