use std::mem;

use crate::{
    ast::{build, Expr, ExprKind, IdExpr, StaticValue},
    context::BindingKind,
    types::{StaticKind, StaticLiteral, Substitution, Type, TypeId},
};

use super::{literal_expr, ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    pub(super) fn transform_none(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        if self.sess.types.is_unbound(ty) {
            let optional = self.class_type("Optional");
            let item = self.first_generic(optional).expect("bug: `Optional` has one generic");
            let none = self.class_type("NoneType");
            self.sess.types.set_default(item, none);
            self.unify(ty, optional, expr.span)?;
        }

        expr.done = self.realized(ty)?;
        Ok(None)
    }

    pub(super) fn transform_literal(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let (class, value) = match &expr.kind {
            ExprKind::Bool(value) => ("bool", StaticValue::Int(Some(*value as i64))),
            // Literals that do not fit an `i64` stay ints but lose their static value
            ExprKind::Int(text) => ("int", parse_int(text).map_or(StaticValue::NotStatic, |value| StaticValue::Int(Some(value)))),
            ExprKind::Float(_) => ("float", StaticValue::NotStatic),
            ExprKind::Str(value) => ("str", StaticValue::Str(Some(value.clone()))),
            _ => unreachable!("bug: not a literal"),
        };

        let ty = self.class_type(class);
        self.unify(expr.ty(), ty, expr.span)?;
        expr.static_value = value;
        expr.done = self.realized(expr.ty())?;

        Ok(None)
    }

    pub(super) fn transform_ellipsis(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = self.class_type("ellipsis");
        self.unify(expr.ty(), ty, expr.span)?;
        expr.done = self.realized(ty)?;
        Ok(None)
    }

    pub(super) fn transform_type_literal(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        expr.attrs.is_type = true;
        expr.done = self.realized(expr.ty())?;
        Ok(None)
    }

    pub(super) fn transform_id(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let span = expr.span;
        let ExprKind::Id(IdExpr {name, resolved}) = &mut expr.kind else { unreachable!() };

        let binding = if *resolved {
            self.sess.ctx.find_canonical(name)
        } else {
            self.sess.ctx.find(name)
        };
        let binding = match binding {
            Some(binding) => binding.clone(),
            // A bare `Union` is an open union that collects its members through unification
            None if !*resolved && &**name == "Union" => {
                let level = self.sess.ctx.level;
                let union = self.sess.types.new_union(level);
                return Ok(Some(self.transformed(Expr::type_literal(union, span), true)?));
            },
            None => return Err(TypeError::new(ErrorKind::IdNotFound(name.to_string()), span)),
        };

        match binding.kind {
            BindingKind::Var => {
                if let Some(value) = self.sess.types.static_type(binding.ty).map(|ty| ty.value.clone()) {
                    return Ok(Some(self.transformed(literal_expr(&value, span), false)?));
                }
                if let Some(kind) = self.sess.types.static_kind(binding.ty) {
                    // Static, but its value is not known yet
                    self.unify(ty, binding.ty, span)?;
                    expr.static_value = match kind {
                        StaticKind::Str => StaticValue::Str(None),
                        StaticKind::Int | StaticKind::Bool => StaticValue::Int(None),
                    };
                    return Ok(None);
                }
                self.unify(ty, binding.ty, span)?;
            },
            BindingKind::Func => if !*resolved {
                let level = self.sess.ctx.level;
                let func_ty = self.sess.types.instantiate(binding.ty, level, &mut Substitution::new());
                self.unify(ty, func_ty, span)?;
            },
            BindingKind::Type => {
                if !*resolved {
                    let level = self.sess.ctx.level;
                    let class_ty = self.sess.types.instantiate(binding.ty, level, &mut Substitution::new());
                    self.unify(ty, class_ty, span)?;
                }
                expr.attrs.is_type = true;
            },
        }

        *name = binding.canonical;
        *resolved = true;
        expr.done = self.realized(ty)?;

        Ok(None)
    }

    pub(super) fn transform_tuple(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ExprKind::Tuple(items) = &mut expr.kind else { unreachable!() };
        let items = mem::take(items);

        let class = self.tuple_class(items.len());
        let ctor = build::call(build::id(&class).at(expr.span), items).at(expr.span);
        Ok(Some(self.transformed(ctor, false)?))
    }

    /// `[a, b]` becomes a fresh list with every item appended in order
    pub(super) fn transform_list(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::List(items) = &mut expr.kind else { unreachable!() };
        let items = mem::take(items);

        let var = self.temp_name("list");
        let mut stmts = vec![build::assign(&var, build::call(build::id("List"), Vec::new()).at(span)).at(span)];
        for item in items {
            let item_span = item.span;
            let append = build::call(build::dot(build::id(&var), "append"), vec![item]).at(item_span);
            stmts.push(build::expr_stmt(append).at(item_span));
        }

        let list = build::stmt_expr(stmts, build::id(&var)).at(span);
        Ok(Some(self.transformed(list, false)?))
    }

    pub(super) fn transform_if_expr(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let ExprKind::If(if_expr) = &mut expr.kind else { unreachable!() };

        self.transform_expr(&mut if_expr.cond, false)?;
        if !self.to_bool(&mut if_expr.cond)? {
            return Ok(None);
        }
        if let Some(cond) = static_truth(&if_expr.cond) {
            let branch = if cond { &mut if_expr.then_expr } else { &mut if_expr.else_expr };
            let branch = mem::take(branch);
            return Ok(Some(self.transformed(branch, false)?));
        }

        self.transform_expr(&mut if_expr.then_expr, false)?;
        self.transform_expr(&mut if_expr.else_expr, false)?;
        if !self.unify_branches(&mut if_expr.then_expr, &mut if_expr.else_expr)? {
            return Ok(None);
        }
        let span = if_expr.then_expr.span;
        self.unify(ty, if_expr.then_expr.ty(), span)?;

        let children_done = if_expr.cond.done && if_expr.then_expr.done && if_expr.else_expr.done;
        expr.done = children_done && self.realized(ty)?;
        Ok(None)
    }

    /// Makes both branches of a conditional the same type, coercing one into the other when
    /// they differ. Returns false while either type is still unknown.
    fn unify_branches(&mut self, then_expr: &mut Expr, else_expr: &mut Expr) -> TyResult<bool> {
        let (then_ty, else_ty) = (then_expr.ty(), else_expr.ty());
        if self.sess.types.is_unbound(then_ty) || self.sess.types.is_unbound(else_ty) {
            return Ok(false);
        }

        if self.sess.types.can_unify(then_ty, else_ty).is_none() {
            if self.is_class(else_ty, "Optional") {
                self.wrap_expr(then_expr, else_ty)?;
            } else {
                self.wrap_expr(else_expr, then_ty)?;
            }
        }

        let span = else_expr.span;
        self.unify(then_expr.ty(), else_expr.ty(), span)?;
        Ok(true)
    }

    /// Coerces a checked condition to `bool` with `__bool__`. Static conditions are left as
    /// they are. Returns false while the type of the condition is unknown.
    pub(super) fn to_bool(&mut self, cond: &mut Expr) -> TyResult<bool> {
        if cond.is_static() {
            let Some(truth) = static_truth(cond) else { return Ok(false) };
            if !self.is_class(cond.ty(), "bool") {
                *cond = self.transformed(build::boolean(truth).at(cond.span), false)?;
            }
            return Ok(true);
        }
        let ty = cond.ty();
        if self.sess.types.is_unbound(ty) {
            return Ok(false);
        }
        if !self.is_class(ty, "bool") {
            let span = cond.span;
            let inner = mem::take(cond);
            *cond = self.transformed(build::call(build::dot(inner, "__bool__"), Vec::new()).at(span), false)?;
        }
        Ok(true)
    }

    pub(super) fn transform_dot(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let span = expr.span;
        let ExprKind::Dot(dot) = &mut expr.kind else { unreachable!() };
        self.transform_expr(&mut dot.expr, true)?;

        let obj_ty = dot.expr.ty();
        let member = dot.member.clone();
        let class = match self.class_name(obj_ty) {
            Some(class) => class,
            None if self.sess.types.is_unbound(obj_ty) => return Ok(None),
            None => return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(obj_ty), member.to_string()), span)),
        };

        if dot.expr.is_type() {
            if let Some(canonical) = self.sess.classes.get(&class).and_then(|info| info.class_vars.get(&member)).cloned() {
                let var = Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), span);
                return Ok(Some(self.transformed(var, false)?));
            }
            if let Some(canonical) = self.sess.method_overloads(&class, &member).last().cloned() {
                let method_ty = self.instantiate_function(&canonical, Some(obj_ty));
                let method = Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), span).with_type(method_ty);
                return Ok(Some(self.transformed(method, false)?));
            }
            return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(obj_ty), member.to_string()), span));
        }

        let has_method = self.sess.find_method(&class, &member).is_some();
        let field = self.sess.classes.get(&class).and_then(|info| info.field(&member)).map(|field| field.ty);

        if let Some(field_ty) = field {
            let level = self.sess.ctx.level;
            let mut subst = self.member_substitution(&class, obj_ty);
            let field_ty = self.sess.types.instantiate(field_ty, level, &mut subst);
            self.unify(ty, field_ty, span)?;
            let obj_done = dot.expr.done;
            expr.done = obj_done && self.realized(ty)?;
            return Ok(None);
        }

        if has_method {
            // A method that is not called becomes a partial call bound to the object
            let obj = mem::take(&mut dot.expr);
            let method = build::dot(obj, &member).at(span);
            let bound = build::call(method, vec![build::ellipsis().at(span)]).at(span);
            return Ok(Some(self.transformed(bound, false)?));
        }

        if &*class == "Optional" {
            let obj = mem::take(&mut dot.expr);
            let unwrapped = build::call(build::id("unwrap"), vec![obj]).at(span);
            return Ok(Some(self.transformed(build::dot(unwrapped, &member).at(span), false)?));
        }
        if &*class == "pyobj" {
            let obj = mem::take(&mut dot.expr);
            let getattr = build::call(build::dot(obj, "_getattr"), vec![build::string(&member)]).at(span);
            return Ok(Some(self.transformed(getattr, false)?));
        }

        Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(obj_ty), member.to_string()), span))
    }

    pub(super) fn transform_stmt_expr(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let ExprKind::StmtExpr(stmt_expr) = &mut expr.kind else { unreachable!() };

        let mut stmts_done = true;
        for stmt in &mut stmt_expr.stmts {
            self.transform_stmt(stmt)?;
            stmts_done &= stmt.done;
        }
        self.transform_expr(&mut stmt_expr.expr, false)?;
        let span = stmt_expr.expr.span;
        self.unify(ty, stmt_expr.expr.ty(), span)?;

        let children_done = stmts_done && stmt_expr.expr.done;
        expr.done = children_done && self.realized(ty)?;
        Ok(None)
    }

    /// `(var := value)` binds the variable and evaluates to it
    pub(super) fn transform_assign_expr(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::AssignExpr(assign) = &mut expr.kind else { unreachable!() };

        let value = mem::take(&mut assign.value);
        let bind = build::assign_mode(&assign.var, value, assign.update).at(span);
        let lowered = build::stmt_expr(vec![bind], build::id(&assign.var).at(span)).at(span);
        Ok(Some(self.transformed(lowered, false)?))
    }

    pub(super) fn transform_instantiate(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let span = expr.span;
        let ExprKind::Instantiate(inst) = &mut expr.kind else { unreachable!() };

        let special = match inst.expr.id() {
            Some(name) if self.sess.ctx.find(name).is_none() => Some(name.clone()),
            _ => None,
        };
        match special.as_deref() {
            Some("Static") => {
                let kind = match inst.params.as_slice() {
                    [param] => param.id().and_then(|name| StaticKind::from_type_name(name)),
                    _ => None,
                };
                let kind = kind.ok_or_else(|| {
                    let found = inst.params.first().and_then(|param| param.id()).map_or_else(|| "?".to_string(), |name| name.to_string());
                    TypeError::new(ErrorKind::BadStaticType(found), span)
                })?;
                let level = self.sess.ctx.level;
                let var = self.sess.types.new_static_unbound(level, kind);
                return Ok(Some(self.transformed(Expr::type_literal(var, span), true)?));
            },
            Some("Tuple") => {
                let params = self.type_params(&mut inst.params)?;
                let class = self.tuple_class(params.len());
                let tuple = self.class_type_of(&class, &params, span)?;
                return Ok(Some(self.transformed(Expr::type_literal(tuple, span), true)?));
            },
            Some("Union") => {
                let params = self.type_params(&mut inst.params)?;
                if !params.iter().all(|&param| self.sess.types.can_realize(param)) {
                    return Ok(None);
                }
                let union = self.sealed_union(&params, span)?;
                return Ok(Some(self.transformed(Expr::type_literal(union, span), true)?));
            },
            _ => {},
        }

        self.transform_expr(&mut inst.expr, true)?;
        let params = self.type_params(&mut inst.params)?;
        let callee_ty = inst.expr.ty();

        match self.sess.types.resolve(callee_ty).clone() {
            Type::Class(class) => {
                if class.generics.len() != params.len() {
                    return Err(TypeError::new(ErrorKind::GenericsMismatch(class.nice_name.to_string(), class.generics.len(), params.len()), span));
                }
                for (generic, &param) in class.generics.iter().zip(&params) {
                    self.unify(generic.ty, param, span)?;
                }
            },
            Type::Func(func) => {
                if func.func_generics.len() != params.len() {
                    return Err(TypeError::new(ErrorKind::GenericsMismatch(func.ast_name.to_string(), func.func_generics.len(), params.len()), span));
                }
                for (generic, &param) in func.func_generics.iter().zip(&params) {
                    self.unify(generic.ty, param, span)?;
                }
            },
            Type::Link(_) => return Ok(None),
            _ => return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(callee_ty)), span)),
        }

        self.unify(ty, callee_ty, span)?;
        expr.attrs.is_type = inst.expr.is_type();
        let children_done = inst.expr.done && inst.params.iter().all(|param| param.done);
        expr.done = children_done && self.realized(ty)?;
        Ok(None)
    }

    /// Checks the parameters of an instantiation. Static literals stand for their static
    /// types and statics that are not evaluated yet for their static variables.
    pub(super) fn type_params(&mut self, params: &mut [Expr]) -> TyResult<Vec<TypeId>> {
        let mut types = Vec::with_capacity(params.len());
        for param in params {
            self.transform_expr(param, true)?;
            if param.is_type() {
                types.push(param.ty());
                continue;
            }

            let value = match &param.static_value {
                StaticValue::Int(Some(value)) if self.is_class(param.ty(), "bool") => StaticLiteral::Bool(*value != 0),
                StaticValue::Int(Some(value)) => StaticLiteral::Int(*value),
                StaticValue::Str(Some(value)) => StaticLiteral::Str(value.clone()),
                StaticValue::Int(None) | StaticValue::Str(None) => {
                    types.push(param.ty());
                    continue;
                },
                StaticValue::NotStatic => {
                    return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(param.ty())), param.span));
                },
            };
            types.push(self.sess.types.new_static(value));
        }
        Ok(types)
    }

    /// `a:b:c` builds a `Slice`. Omitted parts are `None`.
    pub(super) fn transform_slice(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::Slice(slice) = &mut expr.kind else { unreachable!() };

        let parts = [slice.start.take(), slice.stop.take(), slice.step.take()].into_iter()
            .map(|part| part.unwrap_or_else(|| build::none().at(span)))
            .collect();
        let ctor = build::call(build::id("Slice").at(span), parts).at(span);
        Ok(Some(self.transformed(ctor, false)?))
    }
}

/// The truth value of a condition whose value is known at compile time
pub(super) fn static_truth(cond: &Expr) -> Option<bool> {
    match &cond.static_value {
        StaticValue::Int(Some(value)) => Some(*value != 0),
        StaticValue::Str(Some(value)) => Some(!value.is_empty()),
        _ => None,
    }
}

/// Parses an integer literal as written in source
pub(super) fn parse_int(text: &str) -> Option<i64> {
    let text = text.replace('_', "");
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0o") | Some("0O") => (&text[2..], 8),
        Some("0b") | Some("0B") => (&text[2..], 2),
        _ => (&text[..], 10),
    };
    i64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_literals() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("0xff"), Some(255));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("99999999999999999999"), None);
    }
}
