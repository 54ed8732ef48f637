//! Matching call arguments against function signatures and scoring overloads

use std::mem;
use std::sync::Arc;

use crate::{
    ast::{build, EllipsisMode, Expr, ExprKind, FunctionStmt, IdExpr},
    types::{StaticLiteral, TypeId},
};

use super::{ErrorKind, TyResult, TypeChecker};

/// The shape of one parameter as far as argument reordering is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ParamSpec {
    pub name: Arc<str>,
    pub star: bool,
    pub kwstar: bool,
    pub has_default: bool,
    pub generic: bool,
    /// Hidden generics are never given by the caller
    pub hidden: bool,
}

impl ParamSpec {
    pub fn of(func: &FunctionStmt) -> Vec<ParamSpec> {
        func.params.iter().map(|param| ParamSpec {
            name: param.plain_name().into(),
            star: param.is_star(),
            kwstar: param.is_kwstar(),
            has_default: param.default.is_some(),
            generic: param.is_generic(),
            hidden: param.status == crate::ast::ParamStatus::HiddenGeneric,
        }).collect()
    }

    fn is_fillable(&self) -> bool {
        !self.star && !self.kwstar && !self.hidden
    }
}

/// Where the value of a parameter comes from, by index into the call's arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Slot {
    Arg(usize),
    /// Extra positional arguments packed into a tuple
    Star(Vec<usize>),
    /// Extra keyword arguments packed into a keyword tuple
    KwStar(Vec<usize>),
    Default,
    /// A generic that is determined by the other arguments
    Inferred,
    /// Left out of a partial call
    Missing,
}

/// Assigns every argument to the parameter it fills. `names` has one entry per argument,
/// `None` for positional arguments.
pub(super) fn reorder_arguments(
    func: &str,
    params: &[ParamSpec],
    names: &[Option<Arc<str>>],
    partial: bool,
) -> Result<Vec<Slot>, ErrorKind> {
    let mut slots: Vec<Option<Slot>> = vec![None; params.len()];
    let star = params.iter().position(|param| param.star);
    let kwstar = params.iter().position(|param| param.kwstar);
    let fillable: Vec<_> = params.iter().enumerate()
        .take(star.unwrap_or(params.len()))
        .filter(|(_, param)| param.is_fillable())
        .map(|(index, _)| index)
        .collect();

    let mut star_args = Vec::new();
    let mut kwstar_args = Vec::new();

    let positional: Vec<_> = names.iter().enumerate().filter(|(_, name)| name.is_none()).map(|(i, _)| i).collect();
    for (n, &arg) in positional.iter().enumerate() {
        match fillable.get(n) {
            Some(&index) => slots[index] = Some(Slot::Arg(arg)),
            None if star.is_some() => star_args.push(arg),
            None => return Err(ErrorKind::CallArgsMany(func.to_string(), fillable.len(), positional.len())),
        }
    }

    for (arg, name) in names.iter().enumerate() {
        let name = match name {
            Some(name) => name,
            None => continue,
        };

        let target = params.iter().position(|param| param.is_fillable() && param.name == *name);
        match target {
            Some(index) if slots[index].is_some() => return Err(ErrorKind::CallRepeatedName(name.to_string())),
            Some(index) => slots[index] = Some(Slot::Arg(arg)),
            None if kwstar.is_some() => kwstar_args.push(arg),
            None => return Err(ErrorKind::CallArgsInvalid(func.to_string(), name.to_string())),
        }
    }

    let mut star_args = Some(star_args);
    let mut kwstar_args = Some(kwstar_args);
    params.iter().zip(slots).map(|(param, slot)| {
        Ok(match slot {
            Some(slot) => slot,
            None if param.star => Slot::Star(star_args.take().unwrap_or_default()),
            None if param.kwstar => Slot::KwStar(kwstar_args.take().unwrap_or_default()),
            None if param.has_default => Slot::Default,
            None if param.generic => Slot::Inferred,
            None if partial => Slot::Missing,
            None => return Err(ErrorKind::CallArgsMissing(func.to_string(), param.name.to_string())),
        })
    }).collect()
}

/// What overload scoring needs to know about an argument that was already checked
#[derive(Debug, Clone)]
pub(super) struct ArgInfo {
    pub name: Option<Arc<str>>,
    pub ty: TypeId,
    pub is_type: bool,
    pub literal: Option<StaticLiteral>,
}

impl ArgInfo {
    pub fn positional(ty: TypeId) -> Self {
        Self {name: None, ty, is_type: false, literal: None}
    }
}

/// Classes that an unbound argument must not be unified with yet because the argument may
/// still turn out to need a coercion into them
const DEFERRED_CLASSES: &[&str] = &["float", "Optional", "pyobj", "Generator", "Union"];

impl<'a> TypeChecker<'a> {
    pub(super) fn arg_info(&self, name: Option<Arc<str>>, value: &Expr) -> ArgInfo {
        ArgInfo {
            name,
            ty: value.ty(),
            is_type: value.is_type(),
            literal: self.static_literal(value),
        }
    }

    /// Scores how well the arguments fit an overload without changing any type. Returns `None`
    /// if the overload cannot be called with them.
    pub(super) fn can_call(&mut self, canonical: &str, class_ty: Option<TypeId>, args: &[ArgInfo], partial: bool) -> Option<usize> {
        let snapshot = self.sess.types.snapshot();
        let score = self.score_call(canonical, class_ty, args, partial);
        self.sess.types.rollback_to(snapshot);

        crate::tycheck_debug!("scored {} as {:?}", canonical, score);
        score
    }

    fn score_call(&mut self, canonical: &str, class_ty: Option<TypeId>, args: &[ArgInfo], partial: bool) -> Option<usize> {
        let fn_ty = self.instantiate_function(canonical, class_ty);
        let ast = self.function_ast(canonical);
        let names: Vec<_> = args.iter().map(|arg| arg.name.clone()).collect();
        let slots = reorder_arguments(&ast.name, &ParamSpec::of(&ast), &names, partial).ok()?;

        let func = self.sess.types.func(fn_ty)?.clone();
        let param_tys = self.sess.types.tuple_items(func.args_tuple()).unwrap_or_default();
        let mut param_tys = param_tys.into_iter();

        let mut score = 0;
        let mut inferred = Vec::new();
        for (param, slot) in ast.params.iter().zip(&slots) {
            if param.is_generic() {
                let generic = func.func_generics.iter().find(|g| &*g.name == param.plain_name())?;
                match slot {
                    Slot::Arg(index) => {
                        let arg = &args[*index];
                        let value = if generic.is_static {
                            let literal = arg.literal.clone()?;
                            self.sess.types.new_static(literal)
                        } else if arg.is_type {
                            arg.ty
                        } else {
                            return None;
                        };
                        score += self.sess.types.unify(generic.ty, value).ok()?;
                    },
                    Slot::Inferred => inferred.push(generic.ty),
                    _ => {},
                }
                continue;
            }

            let param_ty = param_tys.next()?;
            match slot {
                Slot::Arg(index) => score += self.match_argument(&args[*index], param_ty)?,
                Slot::Star(indices) => {
                    let items: Vec<_> = indices.iter().map(|&index| args[index].ty).collect();
                    let tuple = self.sess.types.tuple_of(&items);
                    score += self.sess.types.unify(param_ty, tuple).ok()?;
                },
                Slot::KwStar(_) | Slot::Default | Slot::Missing | Slot::Inferred => {},
            }
        }

        // A generic nothing mentions can never be inferred
        let arg_tys = self.sess.types.tuple_items(func.args_tuple()).unwrap_or_default();
        for generic in inferred {
            if self.sess.types.is_unbound(generic) && !arg_tys.iter().any(|&ty| self.sess.types.occurs_in(generic, ty)) {
                return None;
            }
        }

        Some(score)
    }

    fn match_argument(&mut self, arg: &ArgInfo, param_ty: TypeId) -> Option<usize> {
        if arg.is_type {
            return None;
        }
        if self.is_deferred(arg.ty, param_ty) {
            return Some(0);
        }

        let snapshot = self.sess.types.snapshot();
        match self.sess.types.unify(arg.ty, param_ty) {
            Ok(score) => {
                self.sess.types.commit(snapshot);
                Some(score)
            },
            Err(_) => {
                self.sess.types.rollback_to(snapshot);
                self.can_wrap(arg.ty, param_ty).then(|| 0)
            },
        }
    }

    /// True if `from` is not known yet and `to` is a class it may have to be coerced into
    fn is_deferred(&self, from: TypeId, to: TypeId) -> bool {
        if !self.sess.types.is_unbound(from) {
            return false;
        }
        if self.sess.types.union(to).is_some() {
            return true;
        }
        self.class_name(to).map_or(false, |name| DEFERRED_CLASSES.contains(&&*name))
    }

    pub(super) fn has_method(&self, ty: TypeId, member: &str) -> bool {
        self.class_name(ty).map_or(false, |class| self.sess.find_method(&class, member).is_some())
    }

    /// True if a value of type `from` can be coerced into a value of type `to`
    pub(super) fn can_wrap(&mut self, from: TypeId, to: TypeId) -> bool {
        let types = &self.sess.types;
        if types.is_unbound(from) || types.is_unbound(to) {
            return false;
        }

        let (from_class, to_class) = match (self.class_name(from), self.class_name(to)) {
            (Some(from_class), Some(to_class)) => (from_class, to_class),
            _ => return false,
        };

        if &*to_class == "Generator" && &*from_class != "Generator" {
            return self.has_method(from, "__iter__");
        }
        if &*from_class == "int" && &*to_class == "float" {
            return true;
        }
        if &*to_class == "Optional" && &*from_class != "Optional" {
            return match self.first_generic(to) {
                Some(item) => self.sess.types.can_unify(from, item).is_some(),
                None => false,
            };
        }
        if &*from_class == "Optional" && &*to_class != "Optional" {
            return match self.first_generic(from) {
                Some(item) => self.sess.types.can_unify(item, to).is_some(),
                None => false,
            };
        }
        if &*to_class == "pyobj" && &*from_class != "pyobj" {
            return self.has_method(from, "__to_py__");
        }
        if &*from_class == "pyobj" && &*to_class != "pyobj" {
            return self.has_method(to, "__from_py__");
        }
        if self.sess.types.func(from).is_some() && self.sess.partials.contains_key(&to_class) {
            return true;
        }
        if self.sess.types.func(to).is_some() {
            if let Some(info) = self.sess.partials.get(&from_class) {
                return info.mask.iter().all(|&supplied| !supplied);
            }
        }

        let from_union = self.sess.types.union(from).is_some();
        let to_union = self.sess.types.union(to).map(|union| union.sealed);
        match (from_union, to_union) {
            (false, Some(true)) => {
                let members = self.sess.types.union_realization_types(to);
                return members.into_iter().any(|member| self.sess.types.can_unify(from, member).is_some());
            },
            (true, None) => {
                let members = self.sess.types.union_realization_types(from);
                return members.into_iter().any(|member| self.sess.types.can_unify(member, to).is_some());
            },
            _ => {},
        }

        // Statically inherited parents
        self.sess.classes.get(&from_class)
            .map_or(false, |info| info.mro.iter().skip(1).any(|parent| *parent == to_class))
    }

    /// True if unifying `from` with `to` would lose a coercion
    fn needs_wrap(&mut self, from: TypeId, to: TypeId) -> bool {
        if self.sess.types.can_unify(from, to).is_none() {
            return true;
        }

        // A sealed union accepts its members through unification, but the value still has to be
        // packed into or taken out of the union
        let from_union = self.sess.types.union(from).map(|union| union.sealed);
        let to_union = self.sess.types.union(to).map(|union| union.sealed);
        let from_class = self.class_name(from).is_some() && from_union.is_none();
        let to_class = self.class_name(to).is_some() && to_union.is_none();
        (to_union == Some(true) && from_class) || (from_union == Some(true) && to_class)
    }

    /// Makes a checked expression fit the expected type, coercing it when the types differ in a
    /// way a coercion covers. Leaves unknown arguments alone while they may still need one.
    pub(super) fn wrap_and_unify(&mut self, expr: &mut Expr, expected: TypeId) -> TyResult<()> {
        let ty = expr.ty();
        if self.is_deferred(ty, expected) {
            return Ok(());
        }

        let known = !self.sess.types.is_unbound(ty) && !self.sess.types.is_unbound(expected);
        if known && self.needs_wrap(ty, expected) && self.can_wrap(ty, expected) {
            self.wrap_expr(expr, expected)?;
        }

        self.unify(expr.ty(), expected, expr.span)?;
        Ok(())
    }

    /// Replaces a checked expression with its coercion into `to`. Returns false if no coercion
    /// applies.
    pub(super) fn wrap_expr(&mut self, expr: &mut Expr, to: TypeId) -> TyResult<bool> {
        let from = expr.ty();
        if !self.can_wrap(from, to) {
            return Ok(false);
        }

        let span = expr.span;
        let from_class = self.class_name(from).unwrap_or_else(|| "?".into());
        let to_class = self.class_name(to).unwrap_or_else(|| "?".into());
        let value = mem::take(expr);
        let type_arg = |ty: TypeId| Expr::type_literal(ty, span);

        let wrapped = if &*to_class == "Generator" && &*from_class != "Generator" {
            build::call(build::dot(value, "__iter__"), Vec::new())
        } else if &*from_class == "int" && &*to_class == "float" {
            build::call(build::id("float"), vec![value])
        } else if &*to_class == "Optional" && &*from_class != "Optional" {
            build::call(build::id("Optional"), vec![value])
        } else if &*from_class == "Optional" && &*to_class != "Optional" {
            build::call(build::id("unwrap"), vec![value])
        } else if &*to_class == "pyobj" && &*from_class != "pyobj" {
            build::call(build::dot(value, "__to_py__"), Vec::new())
        } else if &*from_class == "pyobj" && &*to_class != "pyobj" {
            build::call(build::dot(type_arg(to), "__from_py__"), vec![value])
        } else if self.sess.types.func(from).is_some() && self.sess.partials.contains_key(&to_class) {
            build::call(value, vec![Expr::new(ExprKind::Ellipsis(EllipsisMode::Partial), span)])
        } else if let Some(info) = self.sess.partials.get(&from_class).filter(|_| self.sess.types.func(to).is_some()) {
            let func = info.func.clone();
            let ty = self.instantiate_function(&func, None);
            Expr::new(ExprKind::Id(IdExpr {name: func, resolved: true}), span).with_type(ty)
        } else if self.sess.types.union(to).is_some() {
            build::call(build::id("__new_union__"), vec![value, type_arg(to)])
        } else if self.sess.types.union(from).is_some() {
            build::call(build::id("__get_union__"), vec![value, type_arg(to)])
        } else {
            build::call(build::id("__class_super__"), vec![value, type_arg(to)])
        };

        tracing::trace!(from = %from_class, to = %to_class, "coercing expression");
        *expr = self.transformed(wrapped.at(span), false)?;
        Ok(true)
    }

    /// True if some overload of the method can be called on a receiver of type `recv` with
    /// arguments of the given types
    pub(super) fn find_method_call(&mut self, recv: TypeId, member: &str, args: &[TypeId]) -> bool {
        let class = match self.class_name(recv) {
            Some(class) => class,
            None => return false,
        };

        let mut infos = vec![ArgInfo::positional(recv)];
        infos.extend(args.iter().map(|&ty| ArgInfo::positional(ty)));
        self.sess.method_overloads(&class, member).iter()
            .any(|canonical| self.can_call(canonical, Some(recv), &infos, false).is_some())
    }

    /// True if the type has value semantics. Functions and unions are records.
    pub(super) fn is_record(&self, ty: TypeId) -> bool {
        self.sess.types.class(ty).map_or(false, |class| class.is_record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ParamSpec {
        ParamSpec {name: name.into(), star: false, kwstar: false, has_default: false, generic: false, hidden: false}
    }

    fn names(names: &[Option<&str>]) -> Vec<Option<Arc<str>>> {
        names.iter().map(|name| name.map(Arc::from)).collect()
    }

    #[test]
    fn keyword_arguments_fill_by_name() {
        let params = [spec("a"), spec("b"), ParamSpec {has_default: true, ..spec("c")}];
        let slots = reorder_arguments("f", &params, &names(&[Some("b"), None]), false).unwrap();
        assert_eq!(slots, vec![Slot::Arg(1), Slot::Arg(0), Slot::Default]);
    }

    #[test]
    fn extra_arguments_go_to_variadics() {
        let params = [spec("a"), ParamSpec {star: true, ..spec("args")}, ParamSpec {kwstar: true, ..spec("kwargs")}];
        let slots = reorder_arguments("f", &params, &names(&[None, None, None, Some("x")]), false).unwrap();
        assert_eq!(slots, vec![Slot::Arg(0), Slot::Star(vec![1, 2]), Slot::KwStar(vec![3])]);
    }

    #[test]
    fn generics_are_inferred_when_left_out() {
        let params = [spec("opt"), ParamSpec {generic: true, ..spec("T")}];
        let slots = reorder_arguments("unwrap", &params, &names(&[None]), false).unwrap();
        assert_eq!(slots, vec![Slot::Arg(0), Slot::Inferred]);
    }

    #[test]
    fn partial_calls_leave_holes() {
        let params = [spec("a"), spec("b"), spec("c")];
        let slots = reorder_arguments("f", &params, &names(&[None]), true).unwrap();
        assert_eq!(slots, vec![Slot::Arg(0), Slot::Missing, Slot::Missing]);
    }

    #[test]
    fn reports_bad_argument_lists() {
        let params = [spec("a")];
        assert_eq!(reorder_arguments("f", &params, &names(&[None, None]), false),
            Err(ErrorKind::CallArgsMany("f".to_string(), 1, 2)));
        assert_eq!(reorder_arguments("f", &params, &names(&[None, Some("a")]), false),
            Err(ErrorKind::CallRepeatedName("a".to_string())));
        assert_eq!(reorder_arguments("f", &params, &names(&[Some("z")]), false),
            Err(ErrorKind::CallArgsInvalid("f".to_string(), "z".to_string())));
        assert_eq!(reorder_arguments("f", &params, &names(&[]), false),
            Err(ErrorKind::CallArgsMissing("f".to_string(), "a".to_string())));
    }
}
