use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    ast::{build::{self, FunctionBuilder}, ClassStmt, FunctionStmt, Param, ParamStatus},
    context::BindingKind,
    session::{ClassInfo, Field},
    types::{is_tuple_name, ClassType, Generic, LinkType, Type, TypeVar},
};

use super::{stmt::static_kind_of, ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    /// Registers a class: its generalized type, field types and methods. Classes are only
    /// registered once.
    pub(crate) fn register_class(&mut self, class: &Arc<ClassStmt>) -> TyResult<()> {
        if class.attrs.extend {
            return self.extend_class(class);
        }
        if self.sess.classes.contains_key(&class.name) {
            return Ok(());
        }

        let (class, mro) = self.inherit(class)?;
        let mut kinds = Vec::new();
        for param in class.params.iter().filter(|param| param.is_generic()) {
            kinds.push((param, static_kind_of(param)?));
        }

        self.sess.ctx.level += 1;
        let generics = self.bind_generic_params(&kinds);
        let hidden: Vec<_> = kinds.iter().map(|(param, _)| param.status == ParamStatus::HiddenGeneric).collect();
        let result = self.define_class(&class, mro, generics.iter().cloned().zip(hidden).collect());
        for generic in &generics {
            self.sess.ctx.remove(&generic.name);
        }
        self.sess.ctx.level -= 1;
        result?;

        tracing::trace!(class = %class.name, "registered class");
        Ok(())
    }

    fn define_class(&mut self, class: &Arc<ClassStmt>, mro: Vec<Arc<str>>, generics: Vec<(Generic, bool)>) -> TyResult<()> {
        let level = self.sess.ctx.level;
        let name = class.name.clone();
        let nice_name: Arc<str> = if is_tuple_name(&name) { "Tuple".into() } else { name.clone() };
        let (hidden, visible): (Vec<_>, Vec<_>) = generics.into_iter().partition(|(_, hidden)| *hidden);

        let ty = self.sess.types.new_class(ClassType {
            name: name.clone(),
            nice_name,
            generics: visible.into_iter().map(|(generic, _)| generic).collect(),
            hidden_generics: hidden.into_iter().map(|(generic, _)| generic).collect(),
            is_record: class.attrs.record,
        });
        self.sess.ctx.add_global(name.clone(), BindingKind::Type, name.clone(), ty);

        let mut fields = Vec::new();
        for param in class.params.iter().filter(|param| !param.is_generic()) {
            let annotation = param.type_expr.as_ref()
                .ok_or_else(|| TypeError::new(ErrorKind::ExpectedType(param.name.to_string()), class.span))?;
            fields.push(Field {name: param.plain_name().into(), ty: self.annotation_type(annotation)?});
        }

        let rtti = class.attrs.rtti || mro.iter().skip(1)
            .any(|parent| self.sess.classes.get(parent).map_or(false, |info| info.rtti));

        // Methods can refer to the class, so it is known before they are registered
        self.sess.classes.insert(name.clone(), ClassInfo {
            name: name.clone(),
            ast: class.clone(),
            ty,
            fields: fields.clone(),
            methods: HashMap::new(),
            class_vars: HashMap::new(),
            mro,
            is_record: class.attrs.record,
            rtti,
            realizations: HashMap::new(),
        });

        let mut methods = class.methods.clone();
        methods.extend(synthesized_members(class));
        self.register_methods(&name, methods)?;

        for (var, value) in &class.class_vars {
            let canonical: Arc<str> = format!("{}.{}", name, var).into();
            self.prepend_stmt(build::assign(&canonical, value.clone()).at(value.span))?;
            self.class_info_mut(&name).class_vars.insert(var.clone(), canonical);
        }

        let generalized = self.sess.types.generalize(ty, level);
        let fields: Vec<_> = fields.into_iter()
            .map(|field| Field {ty: self.sess.types.generalize(field.ty, level), ..field})
            .collect();
        let info = self.class_info_mut(&name);
        info.ty = generalized;
        info.fields = fields;
        self.sess.ctx.add_global(name.clone(), BindingKind::Type, name, generalized);

        Ok(())
    }

    /// Merges the fields and methods of the statically inherited parents into the class and
    /// computes its method resolution order
    fn inherit(&mut self, class: &Arc<ClassStmt>) -> TyResult<(Arc<ClassStmt>, Vec<Arc<str>>)> {
        let mut mro = vec![class.name.clone()];
        if class.bases.is_empty() {
            return Ok((class.clone(), mro));
        }

        let mut merged = (**class).clone();
        let mut params: Vec<Param> = Vec::new();
        let mut inherited: Vec<FunctionStmt> = Vec::new();
        for base in &class.bases {
            let info = self.sess.classes.get(base)
                .ok_or_else(|| TypeError::new(ErrorKind::IdNotFound(base.to_string()), class.span))?;

            for parent in &info.mro {
                if !mro.contains(parent) {
                    mro.push(parent.clone());
                }
            }

            for param in &info.ast.params {
                let defined = class.params.iter().chain(&params).any(|other| other.name == param.name);
                if !defined {
                    params.push(param.clone());
                }
            }

            for method in &info.ast.methods {
                let short = method.short_name();
                if class.methods.iter().any(|own| own.short_name() == short) {
                    continue;
                }
                let index = inherited.iter().filter(|other| other.short_name() == short).count();
                let mut copy = method.clone();
                copy.name = format!("{}.{}:{}", class.name, short, index).into();
                copy.attrs.parent_class = Some(class.name.clone());
                inherited.push(copy);
            }
        }

        params.extend(class.params.iter().cloned());
        merged.params = params;
        merged.methods.extend(inherited);
        Ok((Arc::new(merged), mro))
    }

    /// Adds the methods of an `extend` block to a class that is already registered
    fn extend_class(&mut self, class: &Arc<ClassStmt>) -> TyResult<()> {
        let declared = self.sess.classes.get(&class.name)
            .and_then(|info| self.sess.types.class(info.ty))
            .cloned()
            .ok_or_else(|| TypeError::new(ErrorKind::IdNotFound(class.name.to_string()), class.span))?;

        self.sess.ctx.level += 1;
        let level = self.sess.ctx.level;

        // The generics are bound to variables with the declared ids, so that the new methods
        // generalize over the same generics as the rest of the class
        let mut generics = Vec::new();
        for generic in declared.all_generics() {
            let static_kind = self.sess.types.static_kind(generic.ty);
            let var = self.sess.types.push(Type::Link(LinkType::Unbound(TypeVar {
                id: generic.id,
                level,
                static_kind,
                default: None,
                name: Some(generic.nice_name.clone()),
            })));
            let kind = if generic.is_static { BindingKind::Var } else { BindingKind::Type };
            self.sess.ctx.add(generic.nice_name.clone(), kind, generic.nice_name.clone(), var);
            generics.push(Generic {ty: var, ..generic.clone()});
        }
        let hidden = generics.split_off(declared.generics.len());
        let self_ty = self.sess.types.new_class(ClassType {generics, hidden_generics: hidden, ..declared.clone()});
        self.sess.ctx.add(class.name.clone(), BindingKind::Type, class.name.clone(), self_ty);

        let result = self.register_methods(&class.name, class.methods.clone());

        self.sess.ctx.remove(&class.name);
        for generic in declared.all_generics() {
            self.sess.ctx.remove(&generic.nice_name);
        }
        self.sess.ctx.level -= 1;
        result
    }

    fn register_methods(&mut self, class: &Arc<str>, methods: Vec<FunctionStmt>) -> TyResult<()> {
        for mut method in methods {
            if self.sess.functions.contains_key(&method.name) {
                let root = method.root_name().to_string();
                let index = self.sess.overloads.get(root.as_str()).map_or(0, |overloads| overloads.len());
                method.name = format!("{}:{}", root, index).into();
            }

            let short: Arc<str> = method.short_name().into();
            let root: Arc<str> = method.root_name().into();
            self.register_function(&Arc::new(method))?;
            self.class_info_mut(class).methods.insert(short, root);
        }
        Ok(())
    }
}

/// The constructor and helpers every class has unless it defines them itself
///
/// Records are built from their fields by `__new__`. Reference types are allocated by
/// `__new__` and initialized in place by `__init__`.
fn synthesized_members(class: &ClassStmt) -> Vec<FunctionStmt> {
    let defines = |short: &str| class.methods.iter().any(|method| method.short_name() == short);
    let name = &*class.name;
    let fields: Vec<_> = class.params.iter().filter(|param| !param.is_generic()).collect();
    let mut members = Vec::new();
    let method = |short: &str| FunctionBuilder::new(&format!("{}.{}:0", name, short)).method_of(name);

    if !defines("__new__") {
        let mut new = method("__new__").builtin().ret(build::id(name));
        if class.attrs.record {
            new = new.params(fields.iter().map(|field| build::param(field.plain_name(), field.type_expr.clone())).collect());
        }
        members.push(new.build());
    }

    if class.attrs.record {
        return members;
    }

    if !defines("__init__") {
        let mut body: Vec<_> = fields.iter()
            .map(|field| build::assign_member(build::id("self"), field.plain_name(), build::id(field.plain_name())))
            .collect();
        if body.is_empty() {
            body.push(build::pass());
        }
        let init = method("__init__")
            .param(build::param("self", None))
            .params(fields.iter().map(|field| build::param(field.plain_name(), field.type_expr.clone())).collect())
            .ret(build::id("NoneType"))
            .body(body);
        members.push(init.build());
    }

    if !defines("__raw__") {
        let raw = method("__raw__")
            .builtin()
            .param(build::param("self", None))
            .ret(build::index(build::id("Ptr"), build::id("byte")));
        members.push(raw.build());
    }

    members
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    fn short_names(members: &[FunctionStmt]) -> Vec<&str> {
        members.iter().map(|member| member.short_name()).collect()
    }

    #[test]
    fn records_only_get_a_constructor() {
        let point = ClassBuilder::new("Point").record().field("x", id("int")).field("y", id("int")).build();
        let members = synthesized_members(&point);
        assert_eq!(short_names(&members), vec!["__new__"]);
        assert_eq!(members[0].params.len(), 2);
        assert!(members[0].attrs.builtin);
    }

    #[test]
    fn reference_types_are_allocated_then_initialized() {
        let node = ClassBuilder::new("Node")
            .field("value", id("int"))
            .method(FunctionBuilder::new("__init__").param(param("self", None)).body(vec![pass()]))
            .build();
        let members = synthesized_members(&node);
        assert_eq!(short_names(&members), vec!["__new__", "__raw__"]);
        assert!(members[0].params.is_empty());
    }
}
