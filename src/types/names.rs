use std::fmt;
use std::sync::Arc;

use crate::fmt_ctx::DisplayCtx;

use super::*;

impl TypeStore {
    /// Returns the canonical realized name of a type, the key under which its monomorphized
    /// realization is cached
    ///
    /// Names of types that can no longer change are memoized.
    pub fn realized_name(&self, id: TypeId) -> String {
        let id = self.follow(id);
        if let Some(name) = self.names.borrow().get(&id) {
            return name.to_string();
        }

        let name = match self.get(id) {
            Type::Link(LinkType::Generic(var)) => var.name.as_deref().unwrap_or("?").to_string(),
            Type::Link(_) => "?".to_string(),
            Type::Static(ty) => ty.value.to_string(),
            Type::Class(class) => self.class_realized_name(class),
            Type::Func(func) => self.func_realized_name(func),
            Type::Union(union) => {
                let mut members: Vec<_> = self.union_candidates(union).into_iter()
                    .map(|member| self.realized_name(member))
                    .collect();
                if !union.sealed {
                    members.sort();
                    members.dedup();
                }
                format!("{}[{}]", union.base.name, members.join(","))
            },
        };

        if !self.in_snapshot() && self.is_final(id) {
            self.names.borrow_mut().insert(id, Arc::from(name.as_str()));
        }
        name
    }

    fn class_realized_name(&self, class: &ClassType) -> String {
        if class.generics.is_empty() && class.hidden_generics.is_empty() {
            return class.name.to_string();
        }

        let generics: Vec<_> = class.all_generics().map(|g| match self.static_type(g.ty) {
            // A static filling an ordinary generic stands for its class
            Some(ty) if !g.is_static => ty.kind().type_name().to_string(),
            _ => self.realized_name(g.ty),
        }).collect();
        format!("{}[{}]", class.name, generics.join(","))
    }

    fn func_realized_name(&self, func: &FuncType) -> String {
        let mut name = String::new();
        if let Some(parent) = func.parent {
            name.push_str(&self.realized_name(parent));
            name.push(':');
        }
        name.push_str(&func.ast_name);
        if func.index > 0 {
            name.push_str(&format!("/{}", func.index));
        }

        let args = self.tuple_items(func.args_tuple()).unwrap_or_default();
        let parts: Vec<_> = args.into_iter()
            .chain(func.func_generics.iter().map(|g| g.ty))
            .map(|ty| self.realized_name(ty))
            .collect();
        name.push('[');
        name.push_str(&parts.join(","));
        name.push(']');

        name
    }

    /// True if the type is realizable and nothing reachable from it can still change
    fn is_final(&self, id: TypeId) -> bool {
        self.can_realize(id) && !self.has_open_union(id)
    }

    fn has_open_union(&self, id: TypeId) -> bool {
        match self.resolve(id) {
            Type::Union(union) => !union.sealed,
            Type::Link(_) | Type::Static(_) => false,
            Type::Class(class) => class.all_generics().any(|g| self.has_open_union(g.ty)),
            Type::Func(func) => func.base.all_generics().chain(&func.func_generics).any(|g| self.has_open_union(g.ty))
                || func.parent.map_or(false, |parent| self.has_open_union(parent)),
        }
    }

    /// Renders a type for diagnostics
    ///
    /// Unresolved variables print as `?` and functions print with their signature.
    pub fn debug_string(&self, id: TypeId) -> String {
        match self.resolve(id) {
            Type::Link(LinkType::Unbound(var)) => match var.static_kind {
                Some(kind) => format!("Static[{}]", kind.type_name()),
                None => "?".to_string(),
            },
            Type::Link(LinkType::Generic(var)) => var.name.as_deref().unwrap_or("?").to_string(),
            Type::Link(LinkType::Bound(_)) => unreachable!("bug: bound links should have been followed"),
            Type::Static(ty) => ty.value.to_string(),
            Type::Class(class) if is_tuple_name(&class.name) => {
                let items: Vec<_> = class.generics.iter().map(|g| self.debug_string(g.ty)).collect();
                format!("Tuple[{}]", items.join(","))
            },
            Type::Class(class) => {
                if class.generics.is_empty() {
                    return class.nice_name.to_string();
                }
                let generics: Vec<_> = class.generics.iter().map(|g| self.debug_string(g.ty)).collect();
                format!("{}[{}]", class.nice_name, generics.join(","))
            },
            Type::Func(func) => {
                let args: Vec<_> = self.tuple_items(func.args_tuple()).unwrap_or_default().into_iter()
                    .map(|arg| self.debug_string(arg))
                    .collect();
                format!("{}({}) -> {}", func.ast_name, args.join(","), self.debug_string(func.ret()))
            },
            Type::Union(union) => {
                let members: Vec<_> = self.union_candidates(union).into_iter()
                    .map(|member| self.debug_string(member))
                    .collect();
                format!("Union[{}]", members.join(" | "))
            },
        }
    }
}

impl DisplayCtx<TypeStore> for TypeId {
    fn fmt_ctx(&self, f: &mut fmt::Formatter<'_>, ctx: &TypeStore) -> fmt::Result {
        write!(f, "{}", ctx.debug_string(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cformat;

    fn list_of(store: &mut TypeStore, item: TypeId) -> TypeId {
        let id = store.fresh_var_id();
        store.new_class(ClassType {
            name: "List".into(),
            nice_name: "List".into(),
            generics: vec![Generic {name: "T".into(), nice_name: "T".into(), id, ty: item, is_static: false}],
            hidden_generics: Vec::new(),
            is_record: false,
        })
    }

    #[test]
    fn realized_names_are_stable() {
        let mut store = TypeStore::default();
        let int = store.new_class(ClassType::simple("int"));
        let list = list_of(&mut store, int);
        let nested = list_of(&mut store, list);

        assert_eq!(store.realized_name(nested), "List[List[int]]");
        assert_eq!(store.realized_name(nested), store.realized_name(nested));
        let unit = store.tuple_of(&[]);
        assert_eq!(store.realized_name(unit), "Tuple.0");
    }

    #[test]
    fn statics_in_ordinary_generics_name_their_class() {
        let mut store = TypeStore::default();
        let five = store.new_static(StaticLiteral::Int(5));
        let list = list_of(&mut store, five);
        assert_eq!(store.realized_name(list), "List[int]");

        let name = store.new_static(StaticLiteral::Str("a".into()));
        assert_eq!(store.realized_name(name), "'a'");
    }

    #[test]
    fn memoized_names_do_not_survive_rollback() {
        let mut store = TypeStore::default();
        let var = store.new_unbound(0);
        let list = list_of(&mut store, var);
        assert_eq!(store.realized_name(list), "List[?]");

        let snapshot = store.snapshot();
        let int = store.new_class(ClassType::simple("int"));
        store.unify(var, int).unwrap();
        assert_eq!(store.realized_name(list), "List[int]");
        store.rollback_to(snapshot);

        assert_eq!(store.realized_name(list), "List[?]");
        assert_eq!(cformat!(&store, "{}", list), "List[?]");
    }
}
