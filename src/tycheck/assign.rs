use std::mem;
use std::sync::Arc;

use crate::{
    ast::{build, AssignStmt, BinOp, BinaryExpr, Expr, ExprKind, IdExpr, IndexExpr, Stmt, StmtKind, UpdateMode},
    context::BindingKind,
    source_files::Span,
    types::TypeId,
};

use super::{ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    pub(super) fn transform_assign(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let span = stmt.span;
        let StmtKind::Assign(assign) = &mut stmt.kind else { unreachable!() };

        match &assign.lhs.kind {
            ExprKind::Id(_) => {},
            ExprKind::Index(_) => return self.assign_index(assign, span).map(Some),
            ExprKind::Dot(_) => {
                let rhs = assign.rhs.take().ok_or_else(|| TypeError::new(ErrorKind::AssignInvalid, span))?;
                let ExprKind::Dot(dot) = mem::take(&mut assign.lhs).kind else { unreachable!() };
                return Ok(Some(build::assign_member(dot.expr, &dot.member, rhs).at(span)));
            },
            ExprKind::Tuple(_) | ExprKind::List(_) => return self.assign_unpack(assign, span).map(Some),
            _ => return Err(TypeError::new(ErrorKind::AssignInvalid, assign.lhs.span)),
        }

        if assign.update == UpdateMode::AtomicUpdate {
            let name = assign.lhs.id().cloned().expect("bug: checked above");
            let ty = self.sess.ctx.find(&name).map(|binding| binding.ty)
                .ok_or_else(|| TypeError::new(ErrorKind::IdNotFound(name.to_string()), assign.lhs.span))?;
            if self.sess.types.is_unbound(ty) {
                return Ok(None);
            }
            match self.atomic_call(&name, ty, assign.rhs.as_ref(), span) {
                Some(call) => return Ok(Some(build::expr_stmt(call).at(span))),
                None => assign.update = UpdateMode::Update,
            }
        }

        stmt.done = match assign.update {
            UpdateMode::Assign => self.assign_name(assign, span)?,
            UpdateMode::Update | UpdateMode::AtomicUpdate => self.update_name(assign, span)?,
        };
        Ok(None)
    }

    /// Binds a name. The binding is made on the first visit and reused afterwards.
    fn assign_name(&mut self, assign: &mut AssignStmt, span: Span) -> TyResult<bool> {
        if assign.type_expr.as_ref().map_or(false, is_static_annotation) {
            return self.assign_static(assign, span);
        }

        let name = assign.lhs.id().cloned().expect("bug: not a name");
        let resolved = matches!(assign.lhs.kind, ExprKind::Id(IdExpr {resolved: true, ..}));
        if let Some(rhs) = &mut assign.rhs {
            self.transform_expr(rhs, true)?;
        }

        let ty = if resolved {
            self.sess.ctx.find_canonical(&name).map(|binding| binding.ty).expect("bug: resolved name has no binding")
        } else {
            let canonical = self.fresh_canonical(&name);
            match &assign.rhs {
                // A type alias
                Some(rhs) if rhs.is_type() => {
                    let ty = rhs.ty();
                    self.sess.ctx.add(name, BindingKind::Type, canonical.clone(), ty);
                    assign.lhs = Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), assign.lhs.span).with_type(ty);
                    assign.lhs.done = true;
                    return Ok(true);
                },
                _ => {
                    let ty = match &assign.type_expr {
                        Some(annotation) => self.annotation_type(annotation)?,
                        None => self.new_unbound(),
                    };
                    self.sess.ctx.add(name, BindingKind::Var, canonical.clone(), ty);
                    assign.lhs.kind = ExprKind::Id(IdExpr {name: canonical, resolved: true});
                    ty
                },
            }
        };
        assign.lhs.ty = Some(ty);

        let done = match &mut assign.rhs {
            Some(rhs) => {
                if rhs.is_type() {
                    return Err(TypeError::new(ErrorKind::UnexpectedType, rhs.span));
                }
                self.wrap_and_unify(rhs, ty)?;
                rhs.done
            },
            None => self.realized(ty)?,
        };
        assign.lhs.done = done;
        Ok(done)
    }

    /// `N: Static[int] = value` binds a compile-time constant
    fn assign_static(&mut self, assign: &mut AssignStmt, span: Span) -> TyResult<bool> {
        let rhs = assign.rhs.as_mut().ok_or_else(|| TypeError::new(ErrorKind::ExpectedStatic, span))?;
        self.transform_expr(rhs, false)?;
        let literal = match self.static_literal(rhs) {
            Some(literal) => literal,
            None if rhs.is_static() => return Ok(false),
            None => return Err(TypeError::new(ErrorKind::ExpectedStatic, rhs.span)),
        };
        let rhs_span = rhs.span;

        let ty = self.sess.types.new_static(literal);
        if let Some(annotation) = &assign.type_expr {
            let declared = self.annotation_type(annotation)?;
            self.unify(declared, ty, rhs_span)?;
        }

        let name = assign.lhs.id().cloned().expect("bug: not a name");
        let canonical = self.fresh_canonical(&name);
        self.sess.ctx.add(name, BindingKind::Var, canonical.clone(), ty);
        assign.lhs = Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), assign.lhs.span).with_type(ty);
        assign.lhs.done = true;
        Ok(true)
    }

    /// Assigns to a name that is already bound
    fn update_name(&mut self, assign: &mut AssignStmt, span: Span) -> TyResult<bool> {
        let name = assign.lhs.id().cloned().expect("bug: not a name");
        let resolved = matches!(assign.lhs.kind, ExprKind::Id(IdExpr {resolved: true, ..}));
        let binding = if resolved { self.sess.ctx.find_canonical(&name) } else { self.sess.ctx.find(&name) };
        let binding = binding.cloned()
            .ok_or_else(|| TypeError::new(ErrorKind::IdNotFound(name.to_string()), assign.lhs.span))?;

        if binding.kind != BindingKind::Var {
            return Err(TypeError::new(ErrorKind::AssignInvalid, assign.lhs.span));
        }
        let base = self.sess.ctx.base_index();
        if binding.base != 0 && binding.base != base {
            return Err(TypeError::new(ErrorKind::AssignLocalReference(name.to_string()), assign.lhs.span));
        }

        let rhs = assign.rhs.as_mut().ok_or_else(|| TypeError::new(ErrorKind::AssignInvalid, span))?;
        self.transform_expr(rhs, false)?;
        self.wrap_and_unify(rhs, binding.ty)?;

        let done = rhs.done;
        assign.lhs.kind = ExprKind::Id(IdExpr {name: binding.canonical, resolved: true});
        assign.lhs.ty = Some(binding.ty);
        assign.lhs.done = done;
        Ok(done)
    }

    /// The canonical name for a new binding of `name`
    fn fresh_canonical(&mut self, name: &Arc<str>) -> Arc<str> {
        if self.sess.ctx.find(name).is_none() {
            name.clone()
        } else {
            self.sess.canonical_name(name)
        }
    }

    /// An atomic update becomes a call to the matching atomic magic of the variable's type,
    /// or `None` if the type has no such magic
    fn atomic_call(&self, name: &str, ty: TypeId, rhs: Option<&Expr>, span: Span) -> Option<Expr> {
        let class = self.class_name(ty)?;
        let rhs = rhs?;

        let (magic, value) = match &rhs.kind {
            ExprKind::Binary(bin) if bin.op == BinOp::Add && bin.lhs.is_id(name) => ("__atomic_add__", bin.rhs.clone()),
            ExprKind::Call(call) if call.args.len() == 2 && call.args.iter().all(|arg| arg.name.is_none()) => {
                let magic = if call.expr.is_id("min") {
                    "__atomic_min__"
                } else if call.expr.is_id("max") {
                    "__atomic_max__"
                } else {
                    "__atomic_xchg__"
                };
                match (&call.args[0].value, &call.args[1].value) {
                    (var, other) | (other, var) if magic != "__atomic_xchg__" && var.is_id(name) => (magic, other.clone()),
                    _ => ("__atomic_xchg__", rhs.clone()),
                }
            },
            _ => ("__atomic_xchg__", rhs.clone()),
        };

        self.sess.find_method(&class, magic)?;
        let ptr = build::call(build::id("__ptr__"), vec![build::id(name)]).at(span);
        Some(build::call(build::dot(Expr::type_literal(ty, span), magic), vec![ptr, value]).at(span))
    }

    /// `a[i] = v` calls `__setitem__`. An in-place operator evaluates `a` and `i` only once.
    fn assign_index(&mut self, assign: &mut AssignStmt, span: Span) -> TyResult<Stmt> {
        let rhs = assign.rhs.take().ok_or_else(|| TypeError::new(ErrorKind::AssignInvalid, span))?;
        let ExprKind::Index(index) = mem::take(&mut assign.lhs).kind else { unreachable!() };
        let IndexExpr {expr: target, index: key} = *index;

        let in_place = match &rhs.kind {
            ExprKind::Binary(bin) if bin.in_place => match &bin.lhs.kind {
                ExprKind::Index(inner) => inner.expr == target && inner.index == key,
                _ => false,
            },
            _ => false,
        };
        if !in_place {
            let setitem = build::call(build::dot(target, "__setitem__"), vec![key, rhs]).at(span);
            return Ok(build::expr_stmt(setitem).at(span));
        }

        let rhs_span = rhs.span;
        let ExprKind::Binary(bin) = rhs.kind else { unreachable!() };
        let BinaryExpr {op, rhs: operand, ..} = *bin;
        let (obj, idx) = (self.temp_name("obj"), self.temp_name("idx"));
        let current = build::index(build::id(&obj), build::id(&idx)).at(rhs_span);
        let value = build::binary_in_place(op, current, operand).at(rhs_span);
        let setitem = build::call(build::dot(build::id(&obj), "__setitem__"), vec![build::id(&idx), value]).at(span);
        Ok(build::suite(vec![
            build::assign(&obj, target).at(span),
            build::assign(&idx, key).at(span),
            build::expr_stmt(setitem).at(span),
        ]).at(span))
    }

    /// `a, b = value` assigns the items of the value in order
    fn assign_unpack(&mut self, assign: &mut AssignStmt, span: Span) -> TyResult<Stmt> {
        let rhs = assign.rhs.take().ok_or_else(|| TypeError::new(ErrorKind::AssignInvalid, span))?;
        let items = match mem::take(&mut assign.lhs).kind {
            ExprKind::Tuple(items) | ExprKind::List(items) => items,
            _ => unreachable!(),
        };

        let var = self.temp_name("unpack");
        let mut stmts = vec![build::assign(&var, rhs).at(span)];
        for (i, item) in items.into_iter().enumerate() {
            if matches!(item.kind, ExprKind::Star(_)) {
                return Err(TypeError::new(ErrorKind::AssignInvalid, item.span));
            }
            let item_span = item.span;
            let value = build::index(build::id(&var), build::int(i as i64)).at(item_span);
            let unpacked = AssignStmt {lhs: item, rhs: Some(value), type_expr: None, update: assign.update};
            stmts.push(Stmt::new(StmtKind::Assign(Box::new(unpacked)), item_span));
        }
        Ok(build::suite(stmts).at(span))
    }

    pub(super) fn transform_assign_member(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let span = stmt.span;
        let StmtKind::AssignMember(assign) = &mut stmt.kind else { unreachable!() };
        self.transform_expr(&mut assign.lhs, true)?;

        let obj_ty = assign.lhs.ty();
        let member = assign.member.clone();
        let class = match self.class_name(obj_ty) {
            Some(class) => class,
            None if self.sess.types.is_unbound(obj_ty) => return Ok(None),
            None => return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(obj_ty), member.to_string()), span)),
        };
        let no_attr = || ErrorKind::DotNoAttr(class.to_string(), member.to_string());

        if assign.lhs.is_type() {
            let canonical = self.sess.classes.get(&class).and_then(|info| info.class_vars.get(&member)).cloned()
                .ok_or_else(|| TypeError::new(no_attr(), span))?;
            let rhs = mem::take(&mut assign.rhs);
            return Ok(Some(build::update(&canonical, rhs).at(span)));
        }

        if &*class == "Optional" {
            let obj = mem::take(&mut assign.lhs);
            let unwrapped = build::call(build::id("unwrap"), vec![obj]).at(span);
            let rhs = mem::take(&mut assign.rhs);
            return Ok(Some(build::assign_member(unwrapped, &member, rhs).at(span)));
        }

        let info = self.sess.classes.get(&class).ok_or_else(|| TypeError::new(no_attr(), span))?;
        if let Some(field_ty) = info.field(&member).map(|field| field.ty) {
            if info.is_record {
                return Err(TypeError::new(ErrorKind::AssignUnexpectedFrozen(self.type_name(obj_ty), member.to_string()), span));
            }

            let level = self.sess.ctx.level;
            let mut subst = self.member_substitution(&class, obj_ty);
            let field_ty = self.sess.types.instantiate(field_ty, level, &mut subst);
            self.transform_expr(&mut assign.rhs, false)?;
            self.wrap_and_unify(&mut assign.rhs, field_ty)?;
            stmt.done = assign.lhs.done && assign.rhs.done;
            return Ok(None);
        }

        let setter = self.sess.method_overloads(&class, &member).into_iter()
            .any(|canonical| self.function_ast(&canonical).attrs.property_setter);
        if setter {
            let obj = mem::take(&mut assign.lhs);
            let rhs = mem::take(&mut assign.rhs);
            let call = build::call(build::dot(obj, &member), vec![rhs]).at(span);
            return Ok(Some(build::expr_stmt(call).at(span)));
        }

        Err(TypeError::new(no_attr(), span))
    }

    pub(super) fn transform_del(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let span = stmt.span;
        let StmtKind::Del(target) = &mut stmt.kind else { unreachable!() };

        match &target.kind {
            ExprKind::Index(_) => {
                let ExprKind::Index(index) = mem::take(target).kind else { unreachable!() };
                let IndexExpr {expr, index} = *index;
                let delitem = build::call(build::dot(expr, "__delitem__"), vec![index]).at(span);
                Ok(Some(build::expr_stmt(delitem).at(span)))
            },
            ExprKind::Id(IdExpr {name, ..}) => {
                let name = name.clone();
                if self.sess.ctx.find_in_base(&name).is_none() {
                    let kind = match self.sess.ctx.find(&name) {
                        Some(_) => ErrorKind::DelNotAllowed(name.to_string()),
                        None => ErrorKind::IdNotFound(name.to_string()),
                    };
                    return Err(TypeError::new(kind, target.span));
                }
                self.sess.ctx.remove(&name);
                stmt.done = true;
                Ok(None)
            },
            _ => Err(TypeError::new(ErrorKind::DelInvalid, target.span)),
        }
    }
}

/// `Static[...]`
fn is_static_annotation(annotation: &Expr) -> bool {
    match &annotation.kind {
        ExprKind::Index(index) => index.expr.is_id("Static"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    #[test]
    fn recognizes_static_annotations() {
        assert!(is_static_annotation(&index(id("Static"), id("int"))));
        assert!(!is_static_annotation(&index(id("List"), id("int"))));
        assert!(!is_static_annotation(&id("int")));
    }
}
