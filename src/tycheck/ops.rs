//! Operators: static folding, desugaring and magic method dispatch

use std::mem;

use crate::{
    ast::{build, BinOp, CallExpr, EllipsisMode, Expr, ExprKind, StaticValue, UnaryOp},
    source_files::Span,
    types::{StaticLiteral, TypeId},
};

use super::{literal_expr, ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    pub(super) fn transform_unary(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ty = expr.ty();
        let ExprKind::Unary(unary) = &mut expr.kind else { unreachable!() };
        self.transform_expr(&mut unary.expr, false)?;

        if unary.expr.is_static() {
            if let Some(value) = self.static_literal(&unary.expr) {
                if let Some(folded) = fold_static_unary(unary.op, &value) {
                    return Ok(Some(self.transformed(literal_expr(&folded, span), false)?));
                }
            } else {
                // The value is not known yet, but the result will be static too
                let class = if unary.op == UnaryOp::Not { "bool" } else { "int" };
                let class_ty = self.class_type(class);
                self.unify(ty, class_ty, span)?;
                expr.static_value = StaticValue::Int(None);
                return Ok(None);
            }
        }

        if self.sess.types.is_unbound(unary.expr.ty()) {
            return Ok(None);
        }

        let operand = mem::take(&mut unary.expr);
        let call = match unary.op {
            UnaryOp::Not => {
                let truth = build::call(build::dot(operand, "__bool__"), Vec::new()).at(span);
                build::call(build::dot(truth, "__invert__"), Vec::new())
            },
            op => build::call(build::dot(operand, &format!("__{}__", op.magic())), Vec::new()),
        };
        Ok(Some(self.transformed(call.at(span), false)?))
    }

    pub(super) fn transform_binary(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ty = expr.ty();
        let ExprKind::Binary(binary) = &mut expr.kind else { unreachable!() };
        let op = binary.op;
        // `int is int` compares types
        let allow_types = matches!(op, BinOp::Is | BinOp::IsNot);
        self.transform_expr(&mut binary.lhs, allow_types)?;
        self.transform_expr(&mut binary.rhs, allow_types)?;

        if binary.lhs.is_static() && binary.rhs.is_static() {
            let lhs = self.static_literal(&binary.lhs);
            let rhs = self.static_literal(&binary.rhs);
            match (lhs, rhs) {
                (Some(lhs), Some(rhs)) => {
                    let folded = fold_static(op, &lhs, &rhs, self.sess.options.python_compat)
                        .map_err(|kind| TypeError::new(kind, span))?;
                    if let Some(folded) = folded {
                        return Ok(Some(self.transformed(literal_expr(&folded, span), false)?));
                    }
                },
                _ => {
                    let strings = matches!(binary.lhs.static_value, StaticValue::Str(_));
                    let (class, marker) = match op {
                        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge |
                        BinOp::And | BinOp::Or => ("bool", StaticValue::Int(None)),
                        _ if strings => ("str", StaticValue::Str(None)),
                        _ => ("int", StaticValue::Int(None)),
                    };
                    let class_ty = self.class_type(class);
                    self.unify(ty, class_ty, span)?;
                    expr.static_value = marker;
                    return Ok(None);
                },
            }
        }

        let (lhs_ty, rhs_ty) = (binary.lhs.ty(), binary.rhs.ty());
        if self.sess.types.is_unbound(lhs_ty) || self.sess.types.is_unbound(rhs_ty) {
            return Ok(None);
        }

        if op == BinOp::Is {
            return match self.desugar_is(&mut binary.lhs, &mut binary.rhs, span)? {
                Some(replacement) => Ok(Some(self.transformed(replacement.at(span), false)?)),
                None => {
                    let bool_ty = self.class_type("bool");
                    self.unify(ty, bool_ty, span)?;
                    Ok(None)
                },
            };
        }

        let lhs = mem::take(&mut binary.lhs);
        let rhs = mem::take(&mut binary.rhs);
        let in_place = binary.in_place;
        let replacement = match op {
            BinOp::And | BinOp::Or => {
                let mut lhs = lhs;
                let mut rhs = rhs;
                self.to_bool(&mut lhs)?;
                self.to_bool(&mut rhs)?;
                if op == BinOp::And {
                    build::if_expr(lhs, rhs, build::boolean(false).at(span))
                } else {
                    build::if_expr(lhs, build::boolean(true).at(span), rhs)
                }
            },
            BinOp::In => build::call(build::dot(rhs, "__contains__"), vec![lhs]),
            BinOp::NotIn => build::unary(UnaryOp::Not, build::binary(BinOp::In, lhs, rhs).at(span)),
            BinOp::IsNot => build::unary(UnaryOp::Not, build::binary(BinOp::Is, lhs, rhs).at(span)),
            _ => self.dispatch_magic(op, lhs, rhs, in_place)?,
        };

        Ok(Some(self.transformed(replacement.at(span), false)?))
    }

    /// `a < b <= c` becomes `(a < (chain := b)) and (chain <= c)` so that every operand is
    /// evaluated once
    pub(super) fn transform_chain_binary(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::ChainBinary(chain) = &mut expr.kind else { unreachable!() };
        let mut lhs = mem::take(&mut chain.first);
        let rest = mem::take(&mut chain.rest);

        let last = rest.len().saturating_sub(1);
        let mut comparisons = Vec::with_capacity(rest.len());
        for (i, (op, operand)) in rest.into_iter().enumerate() {
            if i == last {
                comparisons.push(build::binary(op, mem::take(&mut lhs), operand).at(span));
                break;
            }
            let operand_span = operand.span;
            let var = self.temp_name("chain");
            let bound = build::stmt_expr(
                vec![build::assign(&var, operand).at(operand_span)],
                build::id(&var).at(operand_span),
            ).at(operand_span);
            comparisons.push(build::binary(op, lhs, bound).at(span));
            lhs = build::id(&var).at(operand_span);
        }

        let lowered = match comparisons.into_iter().rev().reduce(|rhs, lhs| build::binary(BinOp::And, lhs, rhs).at(span)) {
            Some(lowered) => lowered,
            // No operators at all
            None => lhs,
        };
        Ok(Some(self.transformed(lowered, false)?))
    }

    /// `x |> f(a, ...) |> g` evaluates `x` once and passes it to each stage in turn. A stage
    /// without `...` gets the value as its first argument. When a stage produces a generator,
    /// the remaining stages run for every item it yields and the pipeline evaluates to `None`.
    pub(super) fn transform_pipe(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::Pipe(items) = &mut expr.kind else { unreachable!() };
        assert!(!items.is_empty(), "bug: pipeline without a head");

        self.transform_expr(&mut items[0], false)?;
        if items.len() == 1 {
            return Ok(Some(items.remove(0)));
        }
        let head_ty = items[0].ty();
        if self.sess.types.is_unbound(head_ty) {
            return Ok(None);
        }

        let mut stages = mem::take(items);
        let head = stages.remove(0);
        let head_span = head.span;
        let var = self.temp_name("pipe");

        if self.is_class(head_ty, "Generator") {
            let rest = build::pipe(build::id(&var).at(head_span), stages).at(span);
            let each = build::for_loop(&var, head, vec![build::expr_stmt(rest).at(span)], None).at(span);
            let none = build::call(build::id("NoneType").at(span), Vec::new()).at(span);
            return Ok(Some(self.transformed(build::stmt_expr(vec![each], none).at(span), false)?));
        }

        let stage = fill_pipe_hole(stages.remove(0), build::id(&var).at(head_span));
        let rest = build::pipe(stage, stages).at(span);
        let lowered = build::stmt_expr(vec![build::assign(&var, head).at(head_span)], rest).at(span);
        Ok(Some(self.transformed(lowered, false)?))
    }

    /// `is` compares references by address, optionals by whether they hold the value and
    /// other records by value. Returns `None` while the operand types are not realized.
    fn desugar_is(&mut self, lhs: &mut Expr, rhs: &mut Expr, span: Span) -> TyResult<Option<Expr>> {
        let is_none = |expr: &Expr| matches!(expr.kind, ExprKind::None);
        if is_none(lhs) && is_none(rhs) {
            return Ok(Some(build::boolean(true)));
        }
        if is_none(lhs) {
            mem::swap(lhs, rhs);
        }

        if is_none(rhs) {
            let lhs_ty = lhs.ty();
            if !self.is_class(lhs_ty, "Optional") && !self.is_class(lhs_ty, "NoneType") {
                return Ok(Some(build::boolean(false)));
            }
            if self.is_none_type(lhs_ty) {
                return Ok(Some(build::boolean(true)));
            }
            let has = build::call(build::dot(mem::take(lhs), "__has__"), Vec::new()).at(span);
            return Ok(Some(build::call(build::dot(has, "__invert__"), Vec::new())));
        }

        let lhs_realized = self.realize(lhs.ty())?;
        let rhs_realized = self.realize(rhs.ty())?;
        let (Some(lhs_ty), Some(rhs_ty)) = (lhs_realized, rhs_realized) else {
            return Ok(None);
        };
        let same_name = self.sess.types.realized_name(lhs_ty) == self.sess.types.realized_name(rhs_ty);

        if lhs.is_type() && rhs.is_type() {
            return Ok(Some(build::boolean(same_name)));
        }
        let (lhs, rhs) = (mem::take(lhs), mem::take(rhs));
        if !self.is_record(lhs_ty) && !self.is_record(rhs_ty) {
            let lhs_raw = build::call(build::dot(lhs, "__raw__"), Vec::new()).at(span);
            let rhs_raw = build::call(build::dot(rhs, "__raw__"), Vec::new()).at(span);
            return Ok(Some(build::binary(BinOp::Eq, lhs_raw, rhs_raw)));
        }
        if self.is_class(lhs_ty, "Optional") {
            return Ok(Some(build::call(build::dot(lhs, "__is_optional__"), vec![rhs])));
        }
        if self.is_class(rhs_ty, "Optional") {
            return Ok(Some(build::call(build::dot(rhs, "__is_optional__"), vec![lhs])));
        }
        if !same_name {
            return Ok(Some(build::boolean(false)));
        }
        Ok(Some(build::binary(BinOp::Eq, lhs, rhs)))
    }

    /// True for `NoneType` and for optionals that can only ever be `None`, such as
    /// `Optional[Optional[NoneType]]`
    fn is_none_type(&self, ty: TypeId) -> bool {
        let mut ty = ty;
        loop {
            if self.is_class(ty, "NoneType") {
                return true;
            }
            match self.first_generic(ty) {
                Some(item) if self.is_class(ty, "Optional") => ty = item,
                _ => return false,
            }
        }
    }

    /// Finds the magic method implementing a binary operator, trying the in-place form, then
    /// the forward form on the left operand, then the reflected form on the right one
    fn dispatch_magic(&mut self, op: BinOp, lhs: Expr, rhs: Expr, in_place: bool) -> TyResult<Expr> {
        let span = lhs.span;
        let (lhs_ty, rhs_ty) = (lhs.ty(), rhs.ty());
        let magic = op.magic().expect("bug: operator without a magic method");

        if in_place {
            let method = format!("__i{}__", magic);
            if self.find_method_call(lhs_ty, &method, &[rhs_ty]) {
                return Ok(build::call(build::dot(lhs, &method), vec![rhs]));
            }
        }

        let method = format!("__{}__", magic);
        if self.find_method_call(lhs_ty, &method, &[rhs_ty]) {
            return Ok(build::call(build::dot(lhs, &method), vec![rhs]));
        }

        if self.is_class(lhs_ty, "pyobj") {
            return Ok(build::call(build::dot(lhs, &method), vec![rhs]));
        }
        if self.is_class(rhs_ty, "pyobj") {
            let lhs = build::call(build::dot(lhs, "__to_py__"), Vec::new()).at(span);
            return Ok(build::call(build::dot(lhs, &method), vec![rhs]));
        }

        if let Some(reflected) = op.reflected_magic() {
            let method = format!("__{}__", reflected);
            if self.find_method_call(rhs_ty, &method, &[lhs_ty]) {
                // Both operands are evaluated left to right before the reflected call
                let (lvar, rvar) = (self.temp_name("lhs"), self.temp_name("rhs"));
                let call = build::call(build::dot(build::id(&rvar), &method), vec![build::id(&lvar)]).at(span);
                return Ok(build::stmt_expr(vec![
                    build::assign(&lvar, lhs).at(span),
                    build::assign(&rvar, rhs).at(span),
                ], call));
            }
        }

        Err(TypeError::new(ErrorKind::OpNoMagic(op.symbol().to_string(), self.type_name(lhs_ty), self.type_name(rhs_ty)), span))
    }

    pub(super) fn transform_index(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let span = expr.span;
        let ExprKind::Index(index) = &mut expr.kind else { unreachable!() };

        let special = match index.expr.id() {
            Some(name) => ["Static", "Tuple", "Union"].contains(&&**name) && self.sess.ctx.find(name).is_none(),
            None => false,
        };
        if !special {
            self.transform_expr(&mut index.expr, true)?;
        }

        if special || index.expr.is_type() {
            let params = match mem::take(&mut index.index) {
                Expr {kind: ExprKind::Tuple(items), ..} => items,
                param => vec![param],
            };
            let target = mem::take(&mut index.expr);
            return Ok(Some(self.transformed(build::instantiate(target, params).at(span), true)?));
        }

        let obj_ty = index.expr.ty();
        if self.sess.types.is_unbound(obj_ty) {
            return Ok(None);
        }

        if let Some(items) = self.sess.types.tuple_items(obj_ty) {
            let len = items.len();
            if let ExprKind::Slice(slice) = &mut index.index.kind {
                let mut bounds = [None, None, None];
                let mut dynamic = false;
                for (bound, part) in bounds.iter_mut().zip([&mut slice.start, &mut slice.stop, &mut slice.step]) {
                    if let Some(part) = part {
                        self.transform_expr(part, false)?;
                        match part.static_value {
                            StaticValue::Int(Some(value)) => *bound = Some(value),
                            StaticValue::Int(None) => return Ok(None),
                            _ => {
                                dynamic = true;
                                break;
                            },
                        }
                    }
                }
                // Not static, so this is an ordinary `__getitem__` call
                if dynamic {
                    return self.getitem(expr, span);
                }

                let indices = slice_indices(len as i64, bounds[0], bounds[1], bounds[2])
                    .map_err(|kind| TypeError::new(kind, span))?;
                let tuple = self.single_eval(mem::take(&mut index.expr))?;
                let items = indices.into_iter()
                    .map(|i| build::dot(tuple.clone(), &format!("item{}", i + 1)).at(span))
                    .collect();
                return Ok(Some(self.transformed(build::tuple(items).at(span), false)?));
            }

            self.transform_expr(&mut index.index, false)?;
            match index.index.static_value {
                StaticValue::Int(Some(value)) => {
                    let position = if value < 0 { value + len as i64 } else { value };
                    if position < 0 || position >= len as i64 {
                        return Err(TypeError::new(ErrorKind::TupleRangeBounds(len, value), span));
                    }
                    let tuple = mem::take(&mut index.expr);
                    let item = build::dot(tuple, &format!("item{}", position + 1)).at(span);
                    return Ok(Some(self.transformed(item, false)?));
                },
                StaticValue::Int(None) => return Ok(None),
                _ => {},
            }
        }

        self.getitem(expr, span)
    }

    fn getitem(&mut self, expr: &mut Expr, span: Span) -> TyResult<Option<Expr>> {
        let ExprKind::Index(index) = &mut expr.kind else { unreachable!() };
        let target = mem::take(&mut index.expr);
        let idx = mem::take(&mut index.index);
        let call = build::call(build::dot(target, "__getitem__"), vec![idx]).at(span);
        Ok(Some(self.transformed(call, false)?))
    }

    /// Returns an expression that can be evaluated repeatedly: the expression itself if it is
    /// a name, otherwise a temporary assigned before the current statement
    pub(super) fn single_eval(&mut self, value: Expr) -> TyResult<Expr> {
        if matches!(value.kind, ExprKind::Id(_)) {
            return Ok(value);
        }
        let span = value.span;
        let var = self.temp_name("tmp");
        self.prepend_stmt(build::assign(&var, value).at(span))?;
        self.transformed(build::id(&var).at(span), false)
    }
}

/// Puts the value flowing through a pipeline into a stage
fn fill_pipe_hole(mut stage: Expr, value: Expr) -> Expr {
    if !matches!(stage.kind, ExprKind::Call(_)) {
        let span = stage.span;
        return build::call(stage, vec![value]).at(span);
    }

    let ExprKind::Call(call) = &mut stage.kind else { unreachable!() };
    let path = match pipe_hole_path(call, true) {
        Some(path) => path,
        None => {
            call.args.insert(0, build::arg(value));
            return stage;
        },
    };

    let (&last, outer) = path.split_last().expect("bug: empty path to a pipeline hole");
    let mut call: &mut CallExpr = call;
    for &index in outer {
        call = match &mut call.args[index].value.kind {
            ExprKind::Call(inner) => &mut **inner,
            _ => unreachable!("bug: pipeline hole path does not follow calls"),
        };
    }
    call.args[last].value = value;
    stage
}

/// The argument positions leading to the `...` that receives a pipeline value. Nested calls
/// only count an explicit pipeline `...`, the stage itself also takes a partial one.
fn pipe_hole_path(call: &CallExpr, outer: bool) -> Option<Vec<usize>> {
    call.args.iter().enumerate().find_map(|(i, arg)| match &arg.value.kind {
        ExprKind::Ellipsis(EllipsisMode::Pipe) => Some(vec![i]),
        ExprKind::Ellipsis(EllipsisMode::Partial) if outer => Some(vec![i]),
        ExprKind::Call(inner) => pipe_hole_path(inner, false).map(|mut path| {
            path.insert(0, i);
            path
        }),
        _ => None,
    })
}

fn fold_static_unary(op: UnaryOp, value: &StaticLiteral) -> Option<StaticLiteral> {
    let int = match value {
        StaticLiteral::Int(value) => *value,
        StaticLiteral::Bool(value) => *value as i64,
        StaticLiteral::Str(value) => return match op {
            UnaryOp::Not => Some(StaticLiteral::Bool(value.is_empty())),
            _ => None,
        },
    };

    Some(match op {
        UnaryOp::Not => StaticLiteral::Bool(int == 0),
        UnaryOp::Neg => StaticLiteral::Int(int.wrapping_neg()),
        UnaryOp::Pos => StaticLiteral::Int(int),
        UnaryOp::Invert => StaticLiteral::Int(!int),
    })
}

/// Folds a binary operator over two static values. Returns `None` for operators that are not
/// evaluated at compile time, like true division.
pub(super) fn fold_static(op: BinOp, lhs: &StaticLiteral, rhs: &StaticLiteral, python_compat: bool) -> Result<Option<StaticLiteral>, ErrorKind> {
    match (lhs, rhs) {
        (StaticLiteral::Str(lhs), StaticLiteral::Str(rhs)) => Ok(fold_static_strs(op, lhs, rhs)),
        (StaticLiteral::Str(_), _) | (_, StaticLiteral::Str(_)) => Ok(None),
        (lhs, rhs) => fold_static_ints(op, as_int(lhs), as_int(rhs), python_compat),
    }
}

fn as_int(value: &StaticLiteral) -> i64 {
    match value {
        StaticLiteral::Int(value) => *value,
        StaticLiteral::Bool(value) => *value as i64,
        StaticLiteral::Str(_) => unreachable!("bug: strings are not integers"),
    }
}

fn fold_static_strs(op: BinOp, lhs: &str, rhs: &str) -> Option<StaticLiteral> {
    use BinOp::*;
    Some(match op {
        Add => StaticLiteral::Str(format!("{}{}", lhs, rhs)),
        Eq => StaticLiteral::Bool(lhs == rhs),
        Ne => StaticLiteral::Bool(lhs != rhs),
        Lt => StaticLiteral::Bool(lhs < rhs),
        Le => StaticLiteral::Bool(lhs <= rhs),
        Gt => StaticLiteral::Bool(lhs > rhs),
        Ge => StaticLiteral::Bool(lhs >= rhs),
        _ => return None,
    })
}

pub(super) fn fold_static_ints(op: BinOp, lhs: i64, rhs: i64, python_compat: bool) -> Result<Option<StaticLiteral>, ErrorKind> {
    use BinOp::*;
    use StaticLiteral::{Bool, Int};

    Ok(Some(match op {
        Add => Int(lhs.wrapping_add(rhs)),
        Sub => Int(lhs.wrapping_sub(rhs)),
        Mul => Int(lhs.wrapping_mul(rhs)),
        FloorDiv => {
            if rhs == 0 {
                return Err(ErrorKind::StaticDivZero);
            }
            let quotient = lhs.wrapping_div(rhs);
            if python_compat && lhs.wrapping_rem(rhs) != 0 && (lhs < 0) != (rhs < 0) {
                Int(quotient - 1)
            } else {
                Int(quotient)
            }
        },
        Mod => {
            if rhs == 0 {
                return Err(ErrorKind::StaticDivZero);
            }
            let remainder = lhs.wrapping_rem(rhs);
            if python_compat && remainder != 0 && (remainder < 0) != (rhs < 0) {
                Int(remainder + rhs)
            } else {
                Int(remainder)
            }
        },
        LShift => Int(lhs.wrapping_shl(rhs as u32)),
        RShift => Int(lhs.wrapping_shr(rhs as u32)),
        BitAnd => Int(lhs & rhs),
        BitOr => Int(lhs | rhs),
        BitXor => Int(lhs ^ rhs),
        And => Bool(lhs != 0 && rhs != 0),
        Or => Bool(lhs != 0 || rhs != 0),
        Eq => Bool(lhs == rhs),
        Ne => Bool(lhs != rhs),
        Lt => Bool(lhs < rhs),
        Le => Bool(lhs <= rhs),
        Gt => Bool(lhs > rhs),
        Ge => Bool(lhs >= rhs),
        MatMul | TrueDiv | Pow | In | NotIn | Is | IsNot => return Ok(None),
    }))
}

/// The positions selected by `[start:stop:step]` in a sequence of length `len`, clamped the
/// way slices of sequences are
pub(super) fn slice_indices(len: i64, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Vec<usize>, ErrorKind> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ErrorKind::SliceStepZero);
    }

    let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
    let clamp = |bound: Option<i64>, default: i64| match bound {
        None => default,
        Some(bound) if bound < 0 => (bound + len).max(lower),
        Some(bound) => bound.min(upper),
    };
    let start = clamp(start, if step < 0 { upper } else { lower });
    let stop = clamp(stop, if step < 0 { lower } else { upper });

    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_integer_arithmetic() {
        assert_eq!(fold_static_ints(BinOp::Add, 3, 4, true), Ok(Some(StaticLiteral::Int(7))));
        assert_eq!(fold_static_ints(BinOp::Lt, 3, 4, true), Ok(Some(StaticLiteral::Bool(true))));
        assert_eq!(fold_static_ints(BinOp::TrueDiv, 3, 4, true), Ok(None));
        assert_eq!(fold_static_ints(BinOp::Mod, 1, 0, true), Err(ErrorKind::StaticDivZero));
    }

    #[test]
    fn floor_division_follows_python_compat() {
        assert_eq!(fold_static_ints(BinOp::FloorDiv, -7, 2, true), Ok(Some(StaticLiteral::Int(-4))));
        assert_eq!(fold_static_ints(BinOp::FloorDiv, -7, 2, false), Ok(Some(StaticLiteral::Int(-3))));
        assert_eq!(fold_static_ints(BinOp::Mod, -7, 2, true), Ok(Some(StaticLiteral::Int(1))));
        assert_eq!(fold_static_ints(BinOp::Mod, -7, 2, false), Ok(Some(StaticLiteral::Int(-1))));
    }

    #[test]
    fn folds_strings() {
        let (a, b) = (StaticLiteral::Str("a".into()), StaticLiteral::Str("b".into()));
        assert_eq!(fold_static(BinOp::Add, &a, &b, true), Ok(Some(StaticLiteral::Str("ab".into()))));
        assert_eq!(fold_static(BinOp::Lt, &a, &b, true), Ok(Some(StaticLiteral::Bool(true))));
        assert_eq!(fold_static(BinOp::Mul, &a, &b, true), Ok(None));
    }

    #[test]
    fn pipeline_values_fill_the_first_hole() {
        use crate::ast::build::*;

        assert_eq!(fill_pipe_hole(id("f"), id("x")), call(id("f"), vec![id("x")]));
        assert_eq!(fill_pipe_hole(call(id("f"), vec![int(1)]), id("x")), call(id("f"), vec![id("x"), int(1)]));
        assert_eq!(fill_pipe_hole(call(id("f"), vec![int(1), ellipsis()]), id("x")), call(id("f"), vec![int(1), id("x")]));

        let nested = call(id("f"), vec![int(1), call(id("g"), vec![pipe_hole()])]);
        assert_eq!(fill_pipe_hole(nested, id("x")), call(id("f"), vec![int(1), call(id("g"), vec![id("x")])]));

        // A partial `...` of a nested call belongs to that call
        let partial = call(id("f"), vec![call(id("g"), vec![ellipsis()])]);
        assert_eq!(
            fill_pipe_hole(partial, id("x")),
            call(id("f"), vec![id("x"), call(id("g"), vec![ellipsis()])]),
        );
    }

    #[test]
    fn folds_unary_operators() {
        assert_eq!(fold_static_unary(UnaryOp::Neg, &StaticLiteral::Int(5)), Some(StaticLiteral::Int(-5)));
        assert_eq!(fold_static_unary(UnaryOp::Not, &StaticLiteral::Int(0)), Some(StaticLiteral::Bool(true)));
        assert_eq!(fold_static_unary(UnaryOp::Not, &StaticLiteral::Str(String::new())), Some(StaticLiteral::Bool(true)));
        assert_eq!(fold_static_unary(UnaryOp::Neg, &StaticLiteral::Str("x".into())), None);
    }

    #[test]
    fn slices_clamp_like_sequences() {
        assert_eq!(slice_indices(5, Some(-2), None, None), Ok(vec![3, 4]));
        assert_eq!(slice_indices(5, None, None, Some(-1)), Ok(vec![4, 3, 2, 1, 0]));
        assert_eq!(slice_indices(5, Some(1), Some(100), Some(2)), Ok(vec![1, 3]));
        assert_eq!(slice_indices(5, Some(-100), Some(2), None), Ok(vec![0, 1]));
        assert_eq!(slice_indices(5, Some(3), Some(1), None), Ok(vec![]));
        assert_eq!(slice_indices(5, None, None, Some(0)), Err(ErrorKind::SliceStepZero));
    }

    #[test]
    fn huge_slice_steps_stop_after_one_item() {
        assert_eq!(slice_indices(3, Some(1), None, Some(i64::MAX)), Ok(vec![1]));
        assert_eq!(slice_indices(3, None, None, Some(i64::MIN)), Ok(vec![2]));
        assert_eq!(slice_indices(3, Some(-1), None, Some(i64::MIN + 1)), Ok(vec![2]));
    }
}
