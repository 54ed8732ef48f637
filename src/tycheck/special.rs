//! Calls to the compiler builtins that are decided during type checking

use std::mem;
use std::sync::Arc;

use crate::{
    ast::{self, build, BinOp, CallArg, Expr, ExprKind, IdExpr, StaticValue},
    source_files::Span,
};

use super::{call::Callee, ErrorKind, TyResult, TypeChecker, TypeError};

const SPECIAL_CALLS: &[&str] = &[
    "isinstance",
    "staticlen",
    "hasattr",
    "getattr",
    "setattr",
    "compile_error",
    "type",
    "superf",
    "super",
    "__ptr__",
    "namedtuple",
    "partial",
    "statictuple",
    "tuple",
    "__realized__",
    "__static_print__",
    "__has_rtti__",
];

impl<'a> TypeChecker<'a> {
    /// The builtin a call refers to, unless the program bound that name itself
    pub(super) fn special_call_name(&self, expr: &Expr) -> Option<String> {
        let ExprKind::Call(call) = &expr.kind else { return None };
        match &call.expr.kind {
            ExprKind::Id(IdExpr {name, resolved: false}) if SPECIAL_CALLS.contains(&&**name) => {
                self.sess.ctx.find(name).is_none().then(|| name.to_string())
            },
            _ => None,
        }
    }

    pub(super) fn transform_special_call(&mut self, name: &str, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::Call(call) = &mut expr.kind else { unreachable!() };
        let args = &mut call.args;

        let replacement = match name {
            "isinstance" => self.special_isinstance(args, span)?,
            "staticlen" => self.special_staticlen(args, span)?,
            "hasattr" => self.special_hasattr(args, span)?,
            "getattr" => {
                expect_args(name, args, 2, span)?;
                match self.static_member(&mut args[1].value)? {
                    Some(member) => Some(build::dot(mem::take(&mut args[0].value), &member)),
                    None => None,
                }
            },
            "setattr" => {
                expect_args(name, args, 3, span)?;
                match self.static_member(&mut args[1].value)? {
                    Some(member) => {
                        let obj = mem::take(&mut args[0].value);
                        let value = mem::take(&mut args[2].value);
                        Some(build::stmt_expr(vec![build::assign_member(obj, &member, value).at(span)], build::none()))
                    },
                    None => None,
                }
            },
            "compile_error" => {
                expect_args(name, args, 1, span)?;
                if let Some(message) = self.static_member(&mut args[0].value)? {
                    return Err(TypeError::new(ErrorKind::Custom(message), span));
                }
                None
            },
            "type" => {
                expect_args(name, args, 1, span)?;
                self.transform_expr(&mut args[0].value, true)?;
                let ty = args[0].value.ty();
                (!self.sess.types.is_unbound(ty)).then(|| Expr::type_literal(ty, span))
            },
            "superf" => return self.special_superf(args, span),
            "super" => Some(self.special_super(args, span)?),
            "__ptr__" => {
                expect_args(name, args, 1, span)?;
                if !matches!(args[0].value.kind, ExprKind::Id(_)) {
                    return Err(TypeError::new(ErrorKind::CallPtrVar, args[0].value.span));
                }
                Some(build::call(build::id("__ptr_of__"), vec![mem::take(&mut args[0].value)]))
            },
            "namedtuple" => Some(self.special_namedtuple(args, span)?),
            "partial" => {
                if args.is_empty() || args[0].name.is_some() {
                    return Err(TypeError::new(ErrorKind::CallPartial("partial".to_string()), span));
                }
                let mut args = mem::take(args);
                let callee = args.remove(0).value;
                args.push(build::arg(build::ellipsis().at(span)));
                Some(build::call_args(callee, args))
            },
            "statictuple" => {
                let items = mem::take(args).into_iter().map(|arg| arg.value).collect();
                Some(build::tuple(items))
            },
            "tuple" => self.special_tuple(args, span)?,
            "__realized__" => return self.special_realized(args, span),
            "__static_print__" => self.special_static_print(args, span)?,
            "__has_rtti__" => {
                expect_args(name, args, 1, span)?;
                self.transform_expr(&mut args[0].value, true)?;
                let ty = args[0].value.ty();
                if !args[0].value.is_type() {
                    return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(ty)), args[0].value.span));
                }
                if self.sess.types.is_unbound(ty) {
                    return Ok(None);
                }
                let rtti = self.class_name(ty)
                    .and_then(|class| self.sess.classes.get(&class))
                    .map_or(false, |info| info.rtti);
                Some(build::boolean(rtti))
            },
            _ => unreachable!("bug: `{}` is not a special call", name),
        };

        match replacement {
            Some(replacement) => Ok(Some(self.transformed(replacement.at(span), true)?)),
            None => Ok(None),
        }
    }

    /// `isinstance` is decided from the static types. For unions it becomes a check of the
    /// member the value currently holds.
    fn special_isinstance(&mut self, args: &mut [CallArg], span: Span) -> TyResult<Option<Expr>> {
        expect_args("isinstance", args, 2, span)?;

        if let ExprKind::Tuple(types) = &args[1].value.kind {
            let value = &args[0].value;
            let any = types.iter()
                .map(|ty| build::call(build::id("isinstance"), vec![value.clone(), ty.clone()]).at(span))
                .reduce(|lhs, rhs| build::binary(BinOp::Or, lhs, rhs).at(span))
                .unwrap_or_else(|| build::boolean(false).at(span));
            return Ok(Some(any));
        }

        self.transform_expr(&mut args[0].value, true)?;
        let value_ty = args[0].value.ty();

        let category = match &args[1].value.kind {
            ExprKind::Id(IdExpr {name, resolved: false}) if self.sess.ctx.find(name).is_none() => {
                matches!(&**name, "Tuple" | "ByVal" | "ByRef").then(|| name.clone())
            },
            _ => None,
        };
        if let Some(category) = category {
            if self.sess.types.is_unbound(value_ty) {
                return Ok(None);
            }
            let result = match &*category {
                "Tuple" => self.sess.types.tuple_items(value_ty).is_some(),
                "ByVal" => self.is_record(value_ty),
                _ => self.class_name(value_ty).is_some() && !self.is_record(value_ty),
            };
            return Ok(Some(build::boolean(result)));
        }

        self.transform_expr(&mut args[1].value, true)?;
        let target = args[1].value.ty();
        if !args[1].value.is_type() {
            // A Python class object is only checked at runtime, and only Python objects can be
            // instances of it
            if !self.is_class(target, "pyobj") {
                return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(target)), args[1].value.span));
            }
            if self.sess.types.is_unbound(value_ty) {
                return Ok(None);
            }
            if !self.is_class(value_ty, "pyobj") {
                return Ok(Some(build::boolean(false)));
            }
            let value = mem::take(&mut args[0].value);
            let class = mem::take(&mut args[1].value);
            return Ok(Some(build::call(build::id("__py_isinstance__"), vec![value, class])));
        }
        if !self.sess.types.can_realize(value_ty) || !self.sess.types.can_realize(target) {
            return Ok(None);
        }

        let target_is_union = self.sess.types.union(target).is_some();
        if let Some(union) = self.sess.types.union(value_ty).cloned().filter(|_| !target_is_union) {
            if let Some(member) = union_construction_arg(&args[0].value) {
                return Ok(Some(build::boolean(self.sess.types.can_unify(member, target).is_some())));
            }
            if !union.sealed {
                return Ok(None);
            }

            let members = self.sess.types.union_realization_types(value_ty);
            let tag = members.iter().position(|&member| self.sess.types.can_unify(target, member).is_some());
            return Ok(Some(match tag {
                Some(tag) => {
                    let value = mem::take(&mut args[0].value);
                    let get_tag = build::call(build::id("__union_get_tag__"), vec![value]).at(span);
                    build::binary(BinOp::Eq, get_tag, build::int(tag as i64)).at(span)
                },
                None => build::boolean(false),
            }));
        }

        let inherits = match (self.class_name(value_ty), self.class_name(target)) {
            (Some(class), Some(target_class)) => self.sess.classes.get(&class)
                .map_or(false, |info| info.mro.contains(&target_class)),
            _ => false,
        };
        let result = inherits || self.sess.types.can_unify(value_ty, target).is_some();
        Ok(Some(build::boolean(result)))
    }

    fn special_staticlen(&mut self, args: &mut [CallArg], span: Span) -> TyResult<Option<Expr>> {
        expect_args("staticlen", args, 1, span)?;
        let value = &mut args[0].value;
        self.transform_expr(value, true)?;

        match &value.static_value {
            StaticValue::Str(Some(text)) => return Ok(Some(build::int(text.len() as i64))),
            StaticValue::Str(None) => return Ok(None),
            _ => {},
        }

        let ty = value.ty();
        if self.sess.types.is_unbound(ty) {
            return Ok(None);
        }
        if self.sess.types.union(ty).is_some() {
            if self.realize(ty)?.is_none() {
                return Ok(None);
            }
            let members = self.sess.types.union_realization_types(ty);
            return Ok(Some(build::int(members.len() as i64)));
        }
        match self.sess.types.tuple_items(ty) {
            Some(items) => Ok(Some(build::int(items.len() as i64))),
            None => Err(TypeError::new(ErrorKind::ExpectedTuple(self.type_name(ty)), value.span)),
        }
    }

    fn special_hasattr(&mut self, args: &mut [CallArg], span: Span) -> TyResult<Option<Expr>> {
        expect_args("hasattr", args, 2, span)?;
        self.transform_expr(&mut args[0].value, true)?;
        let member = match self.static_member(&mut args[1].value)? {
            Some(member) => member,
            None => return Ok(None),
        };

        let ty = args[0].value.ty();
        if self.sess.types.is_unbound(ty) {
            return Ok(None);
        }
        let found = match self.class_name(ty) {
            Some(class) => {
                let is_field = self.sess.classes.get(&class).map_or(false, |info| info.field(&member).is_some());
                is_field || self.sess.find_method(&class, &member).is_some()
            },
            None => false,
        };
        Ok(Some(build::boolean(found)))
    }

    /// Calls the closest earlier overload of the function being realized that accepts the
    /// arguments
    fn special_superf(&mut self, args: &mut Vec<CallArg>, span: Span) -> TyResult<Option<Expr>> {
        let base = self.sess.ctx.base();
        let (func_name, func_ty) = match (base.func_name.clone(), base.func_ty) {
            (Some(func_name), Some(func_ty)) => (func_name, func_ty),
            _ => return Err(TypeError::new(ErrorKind::CallSuperF("superf".to_string()), span)),
        };
        let root = ast::root_name(&func_name).to_string();
        let overloads = self.sess.overloads.get(root.as_str()).cloned().unwrap_or_default();
        let position = overloads.iter().position(|canonical| *canonical == func_name).unwrap_or(0);

        for arg in args.iter_mut() {
            self.transform_expr(&mut arg.value, true)?;
        }

        let is_method = self.function_ast(&func_name).attrs.parent_class.is_some();
        let class_ty = if is_method { self.sess.types.func(func_ty).and_then(|func| func.parent) } else { None };
        let infos: Vec<_> = args.iter().map(|arg| self.arg_info(arg.name.clone(), &arg.value)).collect();
        for canonical in overloads[..position].iter().rev() {
            if self.can_call(canonical, class_ty, &infos, false).is_some() {
                let callee = Callee::Named {canonical: canonical.clone(), class_ty};
                return self.build_call(callee, mem::take(args), false, span);
            }
        }

        if !infos.iter().all(|info| self.sess.types.can_realize(info.ty)) {
            return Ok(None);
        }
        Err(TypeError::new(ErrorKind::CallSuperF(root), span))
    }

    /// `super()` is `self` viewed as its first parent class
    fn special_super(&mut self, args: &[CallArg], span: Span) -> TyResult<Expr> {
        expect_args("super", args, 0, span)?;
        let class = self.sess.ctx.base().func_name.clone()
            .and_then(|func_name| self.function_ast(&func_name).attrs.parent_class.clone());
        let class = match class {
            Some(class) => class,
            None => return Err(TypeError::new(ErrorKind::CallSuperParent("super".to_string()), span)),
        };
        let parent = self.sess.classes.get(&class).and_then(|info| info.mro.get(1)).cloned()
            .ok_or_else(|| TypeError::new(ErrorKind::CallSuperParent(class.to_string()), span))?;

        Ok(build::call(build::id("__class_super__"), vec![build::id("self"), build::id(&parent)]))
    }

    /// `namedtuple("Name", ["a", "b"])` declares a record with a generic per field
    fn special_namedtuple(&mut self, args: &[CallArg], span: Span) -> TyResult<Expr> {
        let err = || TypeError::new(ErrorKind::CallNamedTuple, span);
        expect_args("namedtuple", args, 2, span).map_err(|_| err())?;
        let name = match &args[0].value.kind {
            ExprKind::Str(name) => name.clone(),
            _ => return Err(err()),
        };
        let fields = match &args[1].value.kind {
            ExprKind::List(items) => items.iter().map(|item| match &item.kind {
                ExprKind::Str(field) => Ok(Arc::from(field.as_str())),
                _ => Err(err()),
            }).collect::<TyResult<Vec<_>>>()?,
            _ => return Err(err()),
        };

        let class = self.record_class(&name, &fields);
        Ok(build::id(&class))
    }

    /// `tuple(T)` is the tuple type of the fields of the class `T`. `tuple(x)` copies the
    /// fields of `x` into a tuple.
    fn special_tuple(&mut self, args: &mut [CallArg], span: Span) -> TyResult<Option<Expr>> {
        expect_args("tuple", args, 1, span)?;
        self.transform_expr(&mut args[0].value, true)?;
        let ty = args[0].value.ty();
        if self.sess.types.is_unbound(ty) {
            return Ok(None);
        }
        let class = self.class_name(ty).filter(|class| self.sess.classes.contains_key(class))
            .ok_or_else(|| TypeError::new(ErrorKind::ExpectedTuple(self.type_name(ty)), args[0].value.span))?;
        let fields: Vec<_> = self.sess.classes[&class].fields.clone();

        if args[0].value.is_type() {
            if self.realize(ty)?.is_none() {
                return Ok(None);
            }
            let level = self.sess.ctx.level;
            let mut subst = self.member_substitution(&class, ty);
            let items: Vec<_> = fields.iter()
                .map(|field| self.sess.types.instantiate(field.ty, level, &mut subst))
                .collect();
            let tuple = self.tuple_class(items.len());
            let tuple_ty = self.class_type_of(&tuple, &items, span)?;
            return Ok(Some(Expr::type_literal(tuple_ty, span)));
        }

        let var = self.temp_name("tuple");
        let value = mem::take(&mut args[0].value);
        let items = fields.iter().map(|field| build::dot(build::id(&var).at(span), &field.name).at(span)).collect();
        let tuple = self.tuple_class(fields.len());
        Ok(Some(build::stmt_expr(
            vec![build::assign(&var, value).at(span)],
            build::call(build::id(&tuple).at(span), items).at(span),
        )))
    }

    /// `__realized__(f, args)` is the realization of `f` for the argument types in the tuple
    /// `args`
    ///
    /// The call `f(*args)` replaces both arguments on the first visit and stays in their place
    /// until its callee is realized.
    fn special_realized(&mut self, args: &mut Vec<CallArg>, span: Span) -> TyResult<Option<Expr>> {
        if args.len() == 2 {
            expect_args("__realized__", args, 2, span)?;
            let mut args_iter = mem::take(args).into_iter();
            let func = args_iter.next().map(|arg| arg.value).unwrap_or_default();
            let tuple = args_iter.next().map(|arg| arg.value).unwrap_or_default();
            let star = build::star(tuple).at(span);
            args.push(build::arg(build::call(func, vec![star]).at(span)));
        }
        expect_args("__realized__", args, 1, span)?;

        let call = &mut args[0].value;
        self.transform_expr(call, false)?;
        let callee = match &call.kind {
            ExprKind::Call(inner) if call.attrs.ordered_call => &inner.expr,
            ExprKind::Call(_) => return Ok(None),
            _ => return Err(TypeError::new(ErrorKind::CallRealizedFn, span)),
        };
        let callee_ty = callee.ty();
        if self.sess.types.func(callee_ty).is_none() {
            return Err(TypeError::new(ErrorKind::CallRealizedFn, span));
        }

        let mut callee = callee.clone();
        match self.realize(callee_ty)? {
            Some(realized) => {
                callee.ty = Some(realized);
                callee.done = true;
                Ok(Some(callee))
            },
            None => Ok(None),
        }
    }

    /// Logs the types of its arguments once they are realized
    fn special_static_print(&mut self, args: &mut [CallArg], span: Span) -> TyResult<Option<Expr>> {
        let mut realized = Vec::with_capacity(args.len());
        for arg in args.iter_mut() {
            self.transform_expr(&mut arg.value, true)?;
            match self.realize(arg.value.ty())? {
                Some(ty) => realized.push(ty),
                None => return Ok(None),
            }
        }

        for (arg, ty) in args.iter().zip(realized) {
            tracing::info!(
                at = ?span,
                ty = %self.type_name(ty),
                is_static = arg.value.is_static(),
                "static print",
            );
        }
        Ok(Some(build::call(build::id("NoneType").at(span), Vec::new())))
    }

    /// The value of an argument that must be a static string. `None` while it is not
    /// evaluated yet.
    fn static_member(&mut self, value: &mut Expr) -> TyResult<Option<String>> {
        self.transform_expr(value, false)?;
        match &value.static_value {
            StaticValue::Str(Some(member)) => Ok(Some(member.clone())),
            StaticValue::Str(None) => Ok(None),
            _ => Err(TypeError::new(ErrorKind::ExpectedStatic, value.span)),
        }
    }
}

/// Checks that a builtin got exactly `count` positional arguments
fn expect_args(name: &str, args: &[CallArg], count: usize, span: Span) -> TyResult<()> {
    if let Some(arg) = args.iter().find(|arg| arg.name.is_some()) {
        let arg_name = arg.name.as_deref().unwrap_or_default();
        return Err(TypeError::new(ErrorKind::CallArgsInvalid(name.to_string(), arg_name.to_string()), arg.value.span));
    }
    if args.len() > count {
        return Err(TypeError::new(ErrorKind::CallArgsMany(name.to_string(), count, args.len()), span));
    }
    if args.len() < count {
        return Err(TypeError::new(ErrorKind::CallArgsMissing(name.to_string(), format!("#{}", args.len() + 1)), span));
    }
    Ok(())
}

/// The type of the value a union is being built from, if the expression is that construction
fn union_construction_arg(value: &Expr) -> Option<crate::types::TypeId> {
    let ExprKind::Call(call) = &value.kind else { return None };
    let callee = call.expr.id()?;
    if ast::root_name(callee) != "__new_union__" {
        return None;
    }
    call.args.first().and_then(|arg| arg.value.ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    #[test]
    fn builtins_take_positional_arguments_only() {
        let span = Span::default();
        assert!(expect_args("staticlen", &[arg(id("x"))], 1, span).is_ok());
        assert_eq!(expect_args("staticlen", &[], 1, span).map_err(|err| err.kind),
            Err(ErrorKind::CallArgsMissing("staticlen".to_string(), "#1".to_string())));
        assert_eq!(expect_args("type", &[arg(id("x")), arg(id("y"))], 1, span).map_err(|err| err.kind),
            Err(ErrorKind::CallArgsMany("type".to_string(), 1, 2)));
        assert_eq!(expect_args("hasattr", &[arg(id("x")), kwarg("name", string("y"))], 2, span).map_err(|err| err.kind),
            Err(ErrorKind::CallArgsInvalid("hasattr".to_string(), "name".to_string())));
    }

    #[test]
    fn finds_union_construction_sites() {
        let mut types = crate::types::TypeStore::default();
        let mut value = id("x");
        value.ty = Some(types.new_unbound(0));
        let site = call(id("__new_union__:0"), vec![value, id("U")]);
        assert!(union_construction_arg(&site).is_some());
        assert!(union_construction_arg(&call(id("f"), vec![id("x")])).is_none());
    }
}
