//! Fixpoint driver and realization (monomorphization) of functions and classes

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use crate::{
    ast::{build::{self, ClassBuilder, FunctionBuilder}, FunctionStmt, Stmt, StmtKind},
    context::{Base, BindingKind},
    session::{ClassRealization, FunctionRealization, Realization, RealizationKind},
    source_files::Span,
    types::{is_tuple_name, tuple_name, FuncType, Generic, Type, TypeId},
};

use super::{ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    /// Repeats passes over a statement until it is done or a pass makes no progress
    ///
    /// At the top level every statement of the suite is checked on its own: an error is
    /// reported, the statement that raised it is not visited again and the other statements
    /// keep going. Inside a function body the first error is returned.
    pub(crate) fn infer_types(&mut self, stmt: &mut Stmt, toplevel: bool) -> TyResult<bool> {
        let outer_changed = mem::take(&mut self.sess.ctx.changed_nodes);
        // Defaults of variables from enclosing bodies are applied by the enclosing driver
        let since = if toplevel { 0 } else { self.sess.types.len() };
        let result = self.fixpoint(stmt, toplevel, since);
        self.sess.ctx.changed_nodes = outer_changed;
        result
    }

    fn fixpoint(&mut self, stmt: &mut Stmt, toplevel: bool, since: usize) -> TyResult<bool> {
        let mut poisoned = HashSet::new();

        for pass in 0..self.sess.options.max_passes {
            self.sess.ctx.changed_nodes = 0;
            let realized_before = self.sess.realizations().len();

            let pending_span = if toplevel {
                let StmtKind::Suite(stmts) = &mut stmt.kind else {
                    panic!("bug: a module must be a suite");
                };
                for (i, child) in stmts.iter_mut().enumerate() {
                    if poisoned.contains(&i) {
                        continue;
                    }
                    if let Err(err) = self.transform_stmt(child) {
                        self.report(&err);
                        poisoned.insert(i);
                    }
                }

                let pending = stmts.iter().enumerate()
                    .find(|(i, child)| !child.done && !poisoned.contains(i))
                    .map(|(_, child)| child.span);
                match pending {
                    Some(span) => span,
                    None => {
                        stmt.done = poisoned.is_empty();
                        return Ok(stmt.done);
                    },
                }
            } else {
                self.transform_stmt(stmt)?;
                if stmt.done {
                    return Ok(true);
                }
                stmt.span
            };

            let changed = self.sess.ctx.changed_nodes;
            let realized = self.sess.realizations().len() - realized_before;
            tracing::debug!(pass, changed, realized, toplevel, "finished type checking pass");
            if changed > 0 || realized > 0 {
                continue;
            }

            let defaults = self.sess.types.apply_defaults(since);
            if defaults > 0 {
                tracing::debug!(defaults, "applied pending defaults");
                continue;
            }

            // Statements stuck behind an error that was already reported are not reported again
            if toplevel && poisoned.is_empty() {
                return Err(TypeError::new(ErrorKind::CannotTypecheck, pending_span));
            }
            return Ok(false);
        }

        Err(TypeError::new(ErrorKind::CannotTypecheck, stmt.span))
    }

    /// Realizes a type if it is concrete enough. Returns `None` while it is not.
    pub(crate) fn realize(&mut self, ty: TypeId) -> TyResult<Option<TypeId>> {
        if !self.sess.types.can_realize(ty) {
            return Ok(None);
        }

        match self.sess.types.resolve(ty).clone() {
            Type::Link(_) => Ok(None),
            Type::Static(_) => Ok(Some(ty)),
            Type::Func(_) => Ok(self.realize_func(ty)?.then(|| ty)),
            Type::Class(_) => self.realize_type(ty),
            Type::Union(union) => {
                if !union.sealed {
                    self.seal_union(ty, Span::default())?;
                }
                for member in self.sess.types.union_realization_types(ty) {
                    if self.realize(member)?.is_none() {
                        return Ok(None);
                    }
                }
                Ok(Some(ty))
            },
        }
    }

    pub(crate) fn realized(&mut self, ty: TypeId) -> TyResult<bool> {
        Ok(self.realize(ty)?.is_some())
    }

    /// Type-checks the body of a function for the concrete argument types in `ty`. Returns
    /// false while the body cannot be completed yet.
    fn realize_func(&mut self, ty: TypeId) -> TyResult<bool> {
        let func = self.sess.types.func(ty).cloned().expect("bug: not a function type");
        let name = self.sess.types.realized_name(ty);
        let info = self.sess.functions.get(&func.ast_name)
            .unwrap_or_else(|| panic!("bug: function `{}` is not registered", func.ast_name));
        let ast = info.ast.clone();

        if let Some(cached) = info.realizations.get(&name) {
            let cached = cached.ty;
            self.unify(ty, cached, ast.span)?;
            return Ok(true);
        }

        // A recursive call shares the type of the realization in progress
        if let Some(in_flight) = self.sess.ctx.in_flight(&name).and_then(|base| base.func_ty) {
            self.unify(ty, in_flight, ast.span)?;
            return Ok(true);
        }

        let body = match &ast.suite {
            Some(_) if !ast.attrs.builtin => {
                self.sess.ctx.enter_base(Base::function(name.clone(), func.ast_name.clone(), ty, func.ret()));
                let body = self.realize_body(&ast, &func);
                self.sess.ctx.exit_base();
                match body? {
                    Some(body) => Some(body),
                    None => return Ok(false),
                }
            },
            _ => None,
        };

        if self.sess.types.is_unbound(func.ret()) {
            let none = self.class_type("NoneType");
            self.unify(func.ret(), none, ast.span)?;
        }

        let typed = body.map(|body| Arc::new(FunctionStmt {suite: Some(body), ..(*ast).clone()}));
        let realization = FunctionRealization {name: name.clone(), ty, ast: typed};
        self.sess.functions.get_mut(&func.ast_name)
            .expect("bug: function disappeared while it was realized")
            .realizations.insert(name.clone(), realization);
        tracing::debug!(function = %name, "realized function");
        self.sess.queue_realization(Realization {name, kind: RealizationKind::Function, ty});

        Ok(true)
    }

    /// Checks a copy of the function body with the generics and parameters bound to the
    /// concrete types of this realization
    fn realize_body(&mut self, ast: &FunctionStmt, func: &FuncType) -> TyResult<Option<Stmt>> {
        if let (Some(class), Some(parent)) = (&ast.attrs.parent_class, func.parent) {
            let declared = self.sess.classes.get(class)
                .and_then(|info| self.sess.types.class(info.ty))
                .map(|class| class.all_generics().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            let filled = self.sess.types.class(parent)
                .map(|class| class.all_generics().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            for (declared, filled) in declared.iter().zip(&filled) {
                self.bind_generic(declared, filled.ty);
            }
        }
        for generic in &func.func_generics {
            self.bind_generic(generic, generic.ty);
        }

        let arg_tys = self.sess.types.tuple_items(func.args_tuple()).unwrap_or_default();
        let params = ast.params.iter().filter(|param| !param.is_generic());
        for (param, &arg_ty) in params.zip(&arg_tys) {
            let name: Arc<str> = param.plain_name().into();
            self.sess.ctx.add(name.clone(), BindingKind::Var, name, arg_ty);
        }

        let mut body = ast.suite.clone().expect("bug: realizing a function without a body");
        let done = self.infer_types(&mut body, false)?;
        Ok(done.then(|| body))
    }

    fn bind_generic(&mut self, generic: &Generic, ty: TypeId) {
        let kind = if generic.is_static { BindingKind::Var } else { BindingKind::Type };
        self.sess.ctx.add(generic.nice_name.clone(), kind, generic.nice_name.clone(), ty);
    }

    /// Records the concrete field types of a class instance
    fn realize_type(&mut self, ty: TypeId) -> TyResult<Option<TypeId>> {
        let class = self.class_name(ty).expect("bug: realizing a type that is not a class");
        if !self.sess.classes.contains_key(&class) {
            match class.strip_prefix("Tuple.").and_then(|len| len.parse().ok()) {
                Some(len) if is_tuple_name(&class) => {
                    self.tuple_class(len);
                },
                // Only classes still being registered and the builtin bases get here
                _ => return Ok(Some(ty)),
            }
        }

        let name = self.sess.types.realized_name(ty);
        let info = self.sess.classes.get(&class).expect("bug: class was just checked");
        if info.realizations.contains_key(&name) {
            return Ok(Some(ty));
        }
        let fields = info.fields.clone();

        // The placeholder ends the recursion of self-referential classes
        let placeholder = ClassRealization {name: name.clone(), ty, fields: Vec::new()};
        self.class_info_mut(&class).realizations.insert(name.clone(), placeholder);

        let generics: Vec<_> = self.sess.types.class(ty).map(|class| class.all_generics().map(|g| g.ty).collect())
            .unwrap_or_default();
        for generic in generics {
            if self.realize(generic)?.is_none() {
                self.class_info_mut(&class).realizations.remove(&name);
                return Ok(None);
            }
        }

        let mut subst = self.member_substitution(&class, ty);
        let level = self.sess.ctx.level;
        let mut realized_fields = Vec::with_capacity(fields.len());
        for field in fields {
            let field_ty = self.sess.types.instantiate(field.ty, level, &mut subst);
            if !self.sess.types.can_realize(field_ty) || self.realize(field_ty)?.is_none() {
                self.class_info_mut(&class).realizations.remove(&name);
                let field_name = format!("{}.{}", name, field.name);
                return Err(TypeError::new(ErrorKind::CannotRealize(field_name), Span::default()));
            }
            realized_fields.push((field.name, field_ty));
        }

        let realization = ClassRealization {name: name.clone(), ty, fields: realized_fields};
        self.class_info_mut(&class).realizations.insert(name.clone(), realization);
        tracing::debug!(class = %name, "realized class");
        self.sess.queue_realization(Realization {name, kind: RealizationKind::Class, ty});

        Ok(Some(ty))
    }

    pub(super) fn class_info_mut(&mut self, class: &str) -> &mut crate::session::ClassInfo {
        self.sess.classes.get_mut(class).unwrap_or_else(|| panic!("bug: class `{}` is not registered", class))
    }

    /// Registers a record class with one generic per field, once per name
    pub(crate) fn record_class(&mut self, name: &str, fields: &[Arc<str>]) -> Arc<str> {
        self.register_record(name, fields, |builder| builder)
    }

    fn register_record(&mut self, name: &str, fields: &[Arc<str>], methods: impl FnOnce(ClassBuilder) -> ClassBuilder) -> Arc<str> {
        if let Some(info) = self.sess.classes.get(name) {
            return info.name.clone();
        }

        let mut builder = ClassBuilder::new(name).record();
        for i in 1..=fields.len() {
            builder = builder.generic(&format!("T{}", i));
        }
        for (i, field) in fields.iter().enumerate() {
            builder = builder.field(field, build::id(&format!("T{}", i + 1)));
        }

        let class = Arc::new(methods(builder).build());
        self.register_class(&class)
            .unwrap_or_else(|err| panic!("bug: cannot register the record `{}`: {}", name, err.kind));
        class.name.clone()
    }

    /// The record class backing tuples with `len` items
    ///
    /// `__iter__` yields the first item type, so it is only called on tuples whose items all
    /// have the same type. Other tuples are unrolled by `for`.
    pub(crate) fn tuple_class(&mut self, len: usize) -> Arc<str> {
        let items: Vec<Arc<str>> = (1..=len).map(|i| format!("item{}", i).into()).collect();
        self.register_record(&tuple_name(len), &items, |builder| {
            if len == 0 {
                return builder;
            }
            let generator = build::index(build::id("Generator"), build::id("T1"));
            builder.method(FunctionBuilder::new("__iter__").param(build::param("self", None)).ret(generator).builtin())
        })
    }
}
