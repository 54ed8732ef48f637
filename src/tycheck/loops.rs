use std::collections::HashSet;
use std::mem;

use crate::{
    ast::{build, Expr, ExprKind, IdExpr, Stmt, StmtKind},
    context::BindingKind,
    source_files::Span,
    types::StaticLiteral,
};

use super::{literal_expr, ErrorKind, TyResult, TypeChecker, TypeError};

/// Calls that a `for` loop unrolls at compile time
const STATIC_LOOPS: &[&str] = &["statictuple", "staticrange", "staticenumerate", "fn_overloads", "vars"];

/// What one unrolled iteration binds the loop variable to
enum LoopValue {
    Static(StaticLiteral),
    Expr(Expr),
}

enum StaticLoop {
    NotStatic,
    Wait,
    /// The statements binding the loop variable in each iteration
    Iterations(Vec<Vec<Stmt>>),
}

impl<'a> TypeChecker<'a> {
    pub(super) fn transform_while(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        if has_else(stmt) {
            return Ok(Some(self.rewrite_loop_else(stmt)));
        }
        let StmtKind::While(while_stmt) = &mut stmt.kind else { unreachable!() };

        self.transform_expr(&mut while_stmt.cond, false)?;
        let cond_known = self.to_bool(&mut while_stmt.cond)?;

        self.sess.ctx.base_mut().loops += 1;
        let body = self.transform_stmt(&mut while_stmt.suite);
        self.sess.ctx.base_mut().loops -= 1;
        body?;

        stmt.done = cond_known && while_stmt.cond.done && while_stmt.suite.done;
        Ok(None)
    }

    pub(super) fn transform_for(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        if has_else(stmt) {
            return Ok(Some(self.rewrite_loop_else(stmt)));
        }
        let span = stmt.span;
        let StmtKind::For(for_stmt) = &mut stmt.kind else { unreachable!() };

        // Unrolled iterations bind the pattern directly so that static keys stay static
        match self.static_loop(&for_stmt.var, &mut for_stmt.iter)? {
            StaticLoop::NotStatic => {},
            StaticLoop::Wait => return Ok(None),
            StaticLoop::Iterations(iterations) => {
                return Ok(Some(self.unroll(iterations, &for_stmt.suite, span)));
            },
        }

        let iter_ty = for_stmt.iter.ty();
        if self.sess.types.is_unbound(iter_ty) {
            return Ok(None);
        }

        // `for a, b in ...` binds a temporary and unpacks it at the start of the body
        if !matches!(for_stmt.var.kind, ExprKind::Id(_)) {
            let var = self.temp_name("for");
            let pattern = mem::replace(&mut for_stmt.var, build::id(&var).at(span));
            let body = mem::replace(&mut for_stmt.suite, build::pass());
            for_stmt.suite = build::suite(vec![build::assign_to(pattern, build::id(&var)).at(span), body]).at(span);
        }
        if !self.is_class(iter_ty, "Generator") {
            if !self.has_method(iter_ty, "__iter__") {
                return Err(TypeError::new(ErrorKind::ExpectedGenerator(self.type_name(iter_ty)), for_stmt.iter.span));
            }
            let iter_span = for_stmt.iter.span;
            let value = mem::take(&mut for_stmt.iter);
            for_stmt.iter = self.transformed(build::call(build::dot(value, "__iter__"), Vec::new()).at(iter_span), false)?;
        }
        let item_ty = match self.first_generic(for_stmt.iter.ty()) {
            Some(item_ty) if self.is_class(for_stmt.iter.ty(), "Generator") => item_ty,
            _ => return Ok(None),
        };

        let var_span = for_stmt.var.span;
        let ExprKind::Id(IdExpr {name, resolved}) = &mut for_stmt.var.kind else { unreachable!() };
        let var_ty = if *resolved {
            self.sess.ctx.find_canonical(name).map(|binding| binding.ty).expect("bug: resolved loop variable has no binding")
        } else {
            let canonical = if self.sess.ctx.find(name).is_none() { name.clone() } else { self.sess.canonical_name(name) };
            let ty = self.new_unbound();
            self.sess.ctx.add(name.clone(), BindingKind::Var, canonical.clone(), ty);
            *name = canonical;
            *resolved = true;
            ty
        };
        self.unify(var_ty, item_ty, var_span)?;
        for_stmt.var.ty = Some(var_ty);
        for_stmt.var.done = self.realized(var_ty)?;

        self.sess.ctx.base_mut().loops += 1;
        let body = self.transform_stmt(&mut for_stmt.suite);
        self.sess.ctx.base_mut().loops -= 1;
        body?;

        stmt.done = for_stmt.iter.done && for_stmt.var.done && for_stmt.suite.done;
        Ok(None)
    }

    /// `loop: body else: other` runs `other` only if the loop did not `break`
    fn rewrite_loop_else(&mut self, stmt: &mut Stmt) -> Stmt {
        let span = stmt.span;
        let flag = self.temp_name("no_break");
        let (body, else_suite) = match &mut stmt.kind {
            StmtKind::While(while_stmt) => (&mut while_stmt.suite, while_stmt.else_suite.take()),
            StmtKind::For(for_stmt) => (&mut for_stmt.suite, for_stmt.else_suite.take()),
            _ => unreachable!("bug: not a loop"),
        };
        let else_suite = else_suite.expect("bug: loop has no else clause");

        let on_break = || build::suite(vec![build::update(&flag, build::boolean(false)).at(span), build::brk().at(span)]).at(span);
        rewrite_loop_exits(body, &on_break, None);

        let looped = mem::replace(stmt, build::pass());
        build::suite(vec![
            build::assign(&flag, build::boolean(true)).at(span),
            looped,
            build::if_stmt(build::id(&flag).at(span), vec![else_suite], None).at(span),
        ]).at(span)
    }

    /// Decides whether a `for` loop iterates over something known at compile time and
    /// computes its iterations
    fn static_loop(&mut self, var: &Expr, iter: &mut Expr) -> TyResult<StaticLoop> {
        let span = iter.span;
        let kind = match &iter.kind {
            ExprKind::Tuple(_) => Some("statictuple".to_string()),
            ExprKind::Call(call) => match &call.expr.kind {
                ExprKind::Id(IdExpr {name, resolved: false}) if STATIC_LOOPS.contains(&&**name) && self.sess.ctx.find(name).is_none() => {
                    Some(name.to_string())
                },
                _ => None,
            },
            _ => None,
        };

        let kind = match kind {
            Some(kind) => kind,
            None => {
                self.transform_expr(iter, false)?;
                let Some(items) = self.sess.types.tuple_items(iter.ty()) else {
                    return Ok(StaticLoop::NotStatic);
                };
                if !self.sess.types.can_realize(iter.ty()) {
                    return Ok(StaticLoop::Wait);
                }
                // Tuples whose items share one type are iterated through `__iter__`. Every
                // item of any other tuple gets its own iteration.
                let item_types: HashSet<_> = items.iter().map(|&item| self.sess.types.realized_name(item)).collect();
                if item_types.len() == 1 {
                    return Ok(StaticLoop::NotStatic);
                }
                let tuple = self.single_eval(mem::take(iter))?;
                let iterations = (1..=items.len())
                    .map(|i| {
                        let item = build::dot(tuple.clone(), &format!("item{}", i)).at(span);
                        vec![bind_loop_value(var, LoopValue::Expr(item), span)]
                    })
                    .collect();
                return Ok(StaticLoop::Iterations(iterations));
            },
        };

        let args: Vec<&mut Expr> = match &mut iter.kind {
            ExprKind::Tuple(items) => items.iter_mut().collect(),
            ExprKind::Call(call) => {
                if let Some(arg) = call.args.iter().find(|arg| arg.name.is_some()) {
                    let arg_name = arg.name.as_deref().unwrap_or_default().to_string();
                    return Err(TypeError::new(ErrorKind::CallArgsInvalid(kind, arg_name), arg.value.span));
                }
                call.args.iter_mut().map(|arg| &mut arg.value).collect()
            },
            _ => unreachable!(),
        };

        let iterations = match kind.as_str() {
            "statictuple" => {
                let mut values = Vec::with_capacity(args.len());
                for value in args {
                    self.transform_expr(value, false)?;
                    match self.static_literal(value) {
                        Some(literal) => values.push(LoopValue::Static(literal)),
                        None if value.is_static() => return Ok(StaticLoop::Wait),
                        None => values.push(LoopValue::Expr(mem::take(value))),
                    }
                }
                values.into_iter().map(|value| vec![bind_loop_value(var, value, span)]).collect()
            },
            "staticrange" => {
                let mut bounds = Vec::with_capacity(args.len());
                for value in args {
                    self.transform_expr(value, false)?;
                    match self.static_literal(value) {
                        Some(StaticLiteral::Int(bound)) => bounds.push(bound),
                        None if value.is_static() => return Ok(StaticLoop::Wait),
                        _ => return Err(TypeError::new(ErrorKind::ExpectedStatic, value.span)),
                    }
                }
                let (start, stop, step) = match bounds[..] {
                    [stop] => (0, stop, 1),
                    [start, stop] => (start, stop, 1),
                    [start, stop, step] => (start, stop, step),
                    _ => return Err(TypeError::new(ErrorKind::CallArgsMany("staticrange".to_string(), 3, bounds.len()), span)),
                };
                static_range(start, stop, step).map_err(|kind| TypeError::new(kind, span))?
                    .into_iter()
                    .map(|i| vec![bind_loop_value(var, LoopValue::Static(StaticLiteral::Int(i)), span)])
                    .collect()
            },
            "staticenumerate" => {
                let value = single_arg(args, &kind, span)?;
                self.transform_expr(value, false)?;
                let ty = value.ty();
                if self.sess.types.is_unbound(ty) {
                    return Ok(StaticLoop::Wait);
                }
                let len = self.sess.types.tuple_items(ty)
                    .map(|items| items.len())
                    .ok_or_else(|| TypeError::new(ErrorKind::ExpectedTuple(self.type_name(ty)), value.span))?;
                let tuple = self.single_eval(mem::take(value))?;
                (0..len).map(|i| {
                    let item = build::dot(tuple.clone(), &format!("item{}", i + 1)).at(span);
                    bind_pair(var, LoopValue::Static(StaticLiteral::Int(i as i64)), item, span)
                }).collect()
            },
            "vars" => {
                let obj = single_arg(args, &kind, span)?;
                self.transform_expr(obj, false)?;
                let ty = obj.ty();
                if self.sess.types.is_unbound(ty) {
                    return Ok(StaticLoop::Wait);
                }
                let fields: Vec<_> = self.class_name(ty)
                    .and_then(|class| self.sess.classes.get(&class))
                    .map(|info| info.fields.iter().map(|field| field.name.clone()).collect())
                    .ok_or_else(|| TypeError::new(ErrorKind::DotNoAttr(self.type_name(ty), "__dict__".to_string()), span))?;
                let obj = self.single_eval(mem::take(obj))?;
                fields.iter().map(|field| {
                    let value = build::dot(obj.clone(), field).at(span);
                    bind_pair(var, LoopValue::Static(StaticLiteral::Str(field.to_string())), value, span)
                }).collect()
            },
            "fn_overloads" => {
                let func = single_arg(args, &kind, span)?;
                let name = func.id().cloned().ok_or_else(|| TypeError::new(ErrorKind::ExpectedStatic, func.span))?;
                let binding = self.sess.ctx.find(&name)
                    .filter(|binding| binding.kind == BindingKind::Func)
                    .cloned()
                    .ok_or_else(|| TypeError::new(ErrorKind::IdNotFound(name.to_string()), span))?;
                let root = crate::ast::root_name(&binding.canonical).to_string();
                let overloads = self.sess.overloads.get(root.as_str()).cloned().unwrap_or_else(|| vec![binding.canonical.clone()]);
                overloads.into_iter().map(|canonical| {
                    let func = Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), span);
                    vec![bind_loop_value(var, LoopValue::Expr(func), span)]
                }).collect()
            },
            _ => unreachable!("bug: `{}` is not a static loop", kind),
        };

        Ok(StaticLoop::Iterations(iterations))
    }

    /// Repeats the body once per iteration. A body that can leave the loop runs each iteration
    /// inside a one-shot `while` so that `break` and `continue` keep their meaning.
    fn unroll(&mut self, iterations: Vec<Vec<Stmt>>, body: &Stmt, span: Span) -> Stmt {
        if !contains_loop_exit(body) {
            let mut stmts = Vec::new();
            for bindings in iterations {
                stmts.extend(bindings);
                stmts.push(body.clone());
            }
            return build::suite(stmts).at(span);
        }

        let flag = self.temp_name("static_loop");
        let on_break = || build::suite(vec![build::update(&flag, build::boolean(false)).at(span), build::brk().at(span)]).at(span);
        let on_continue = || build::brk().at(span);

        let mut stmts = vec![build::assign(&flag, build::boolean(true)).at(span)];
        for mut iteration in iterations {
            let mut body = body.clone();
            rewrite_loop_exits(&mut body, &on_break, Some(&on_continue));
            iteration.push(body);
            iteration.push(build::brk().at(span));
            let once = build::while_loop(build::boolean(true).at(span), iteration, None).at(span);
            stmts.push(build::if_stmt(build::id(&flag).at(span), vec![once], None).at(span));
        }
        build::suite(stmts).at(span)
    }
}

/// The only argument of a static loop call
fn single_arg<'e>(args: Vec<&'e mut Expr>, name: &str, span: Span) -> TyResult<&'e mut Expr> {
    let count = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(TypeError::new(ErrorKind::CallArgsMany(name.to_string(), 1, count), span)),
    }
}

fn has_else(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::While(while_stmt) => while_stmt.else_suite.is_some(),
        StmtKind::For(for_stmt) => for_stmt.else_suite.is_some(),
        _ => false,
    }
}

/// Binds the loop variable for one unrolled iteration. Static values keep their static type.
fn bind_loop_value(var: &Expr, value: LoopValue, span: Span) -> Stmt {
    match (var.id(), value) {
        (Some(name), LoopValue::Static(literal)) => {
            let annotation = build::index(build::id("Static"), build::id(literal.kind().type_name()));
            build::assign_typed(name, annotation, literal_expr(&literal, span)).at(span)
        },
        (_, LoopValue::Static(literal)) => build::assign_to(var.clone(), literal_expr(&literal, span)).at(span),
        (_, LoopValue::Expr(value)) => build::assign_to(var.clone(), value).at(span),
    }
}

/// Binds `(key, value)` loop variables, keeping the key static when the pattern allows it
fn bind_pair(var: &Expr, key: LoopValue, value: Expr, span: Span) -> Vec<Stmt> {
    match &var.kind {
        ExprKind::Tuple(items) if items.len() == 2 => vec![
            bind_loop_value(&items[0], key, span),
            bind_loop_value(&items[1], LoopValue::Expr(value), span),
        ],
        _ => {
            let key = match key {
                LoopValue::Static(literal) => literal_expr(&literal, span),
                LoopValue::Expr(expr) => expr,
            };
            vec![build::assign_to(var.clone(), build::tuple(vec![key, value]).at(span)).at(span)]
        },
    }
}

/// The values of `staticrange(start, stop, step)`
fn static_range(start: i64, stop: i64, step: i64) -> Result<Vec<i64>, ErrorKind> {
    if step == 0 {
        return Err(ErrorKind::Custom("staticrange step cannot be zero".to_string()));
    }
    let mut values = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        values.push(i);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(values)
}

/// Replaces the `break` and `continue` statements that exit the given loop body. Nested loops
/// and definitions have their own exits and are left alone.
fn rewrite_loop_exits(stmt: &mut Stmt, on_break: &dyn Fn() -> Stmt, on_continue: Option<&dyn Fn() -> Stmt>) {
    match &mut stmt.kind {
        StmtKind::Break => *stmt = on_break(),
        StmtKind::Continue => if let Some(on_continue) = on_continue {
            *stmt = on_continue();
        },
        StmtKind::Suite(stmts) => for child in stmts {
            rewrite_loop_exits(child, on_break, on_continue);
        },
        StmtKind::If(if_stmt) => {
            rewrite_loop_exits(&mut if_stmt.if_suite, on_break, on_continue);
            if let Some(else_suite) = &mut if_stmt.else_suite {
                rewrite_loop_exits(else_suite, on_break, on_continue);
            }
        },
        _ => {},
    }
}

fn contains_loop_exit(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Break | StmtKind::Continue => true,
        StmtKind::Suite(stmts) => stmts.iter().any(contains_loop_exit),
        StmtKind::If(if_stmt) => {
            contains_loop_exit(&if_stmt.if_suite) || if_stmt.else_suite.as_ref().map_or(false, contains_loop_exit)
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    #[test]
    fn static_ranges_follow_the_step() {
        assert_eq!(static_range(0, 4, 1), Ok(vec![0, 1, 2, 3]));
        assert_eq!(static_range(1, 8, 3), Ok(vec![1, 4, 7]));
        assert_eq!(static_range(3, 0, -1), Ok(vec![3, 2, 1]));
        assert_eq!(static_range(3, 3, 1), Ok(vec![]));
        assert!(static_range(0, 3, 0).is_err());
    }

    #[test]
    fn static_ranges_stop_at_the_integer_limits() {
        assert_eq!(static_range(1, i64::MAX, i64::MAX), Ok(vec![1]));
        assert_eq!(static_range(i64::MAX - 1, i64::MAX, 2), Ok(vec![i64::MAX - 1]));
        assert_eq!(static_range(-1, i64::MIN, i64::MIN), Ok(vec![-1]));
    }

    #[test]
    fn nested_loops_keep_their_exits() {
        let body = suite(vec![
            if_stmt(id("a"), vec![brk()], Some(vec![cont()])),
            while_loop(id("b"), vec![brk()], None),
        ]);
        assert!(contains_loop_exit(&body));

        let mut rewritten = body.clone();
        rewrite_loop_exits(&mut rewritten, &|| pass(), None);
        let StmtKind::Suite(stmts) = &rewritten.kind else { unreachable!() };
        let StmtKind::If(if_stmt) = &stmts[0].kind else { unreachable!() };
        assert_eq!(if_stmt.if_suite, suite(vec![pass()]));
        assert_eq!(if_stmt.else_suite, Some(suite(vec![cont()])));
        assert_eq!(stmts[1], body_loop());
    }

    fn body_loop() -> Stmt {
        while_loop(id("b"), vec![brk()], None)
    }

    #[test]
    fn loops_without_exits_are_unrolled_flat() {
        let body = suite(vec![print(vec![id("x")])]);
        assert!(!contains_loop_exit(&body));
        assert!(!contains_loop_exit(&suite(vec![for_loop("y", id("z"), vec![brk()], None)])));
    }
}
