use std::mem;
use std::sync::Arc;

use crate::{
    ast::{self, build, CallArg, CallExpr, EllipsisMode, Expr, ExprKind, IdExpr},
    context::BindingKind,
    session::PartialInfo,
    source_files::Span,
    types::TypeId,
};

use super::{overload::{reorder_arguments, ParamSpec, Slot}, ErrorKind, TyResult, TypeChecker, TypeError};

/// The function a call resolves to
#[derive(Debug, Clone)]
pub(super) enum Callee {
    /// A registered function, instantiated for this call. Methods pin their class generics to
    /// `class_ty`.
    Named {canonical: Arc<str>, class_ty: Option<TypeId>},
    /// An expression whose type is already a function
    Value(Expr),
}

impl<'a> TypeChecker<'a> {
    pub(super) fn transform_call(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        if expr.attrs.ordered_call {
            return self.transform_ordered_call(expr);
        }

        let span = expr.span;
        if let Some(name) = self.special_call_name(expr) {
            return self.transform_special_call(&name, expr);
        }

        let ExprKind::Call(call) = &mut expr.kind else { unreachable!() };
        if !self.expand_unpacked_args(call)? {
            return Ok(None);
        }

        let ends_with_ellipsis = matches!(call.args.last(), Some(CallArg {name: None, value}) if value.ellipsis() == Some(EllipsisMode::Partial));
        if ends_with_ellipsis {
            call.args.pop();
            expr.attrs.partial = true;
        }
        let partial = expr.attrs.partial;

        for (i, arg) in call.args.iter().enumerate() {
            if let Some(name) = &arg.name {
                if call.args[..i].iter().any(|other| other.name.as_ref() == Some(name)) {
                    return Err(TypeError::new(ErrorKind::CallRepeatedName(name.to_string()), arg.value.span));
                }
            }
        }

        for arg in &mut call.args {
            self.transform_expr(&mut arg.value, true)?;
        }

        let resolution = self.resolve_callee(call, partial, span)?;
        let (candidates, receiver) = match resolution {
            Resolution::Wait => return Ok(None),
            Resolution::Replace(replacement) => return Ok(Some(self.transformed(replacement, false)?)),
            Resolution::Value(callee) => {
                let args = mem::take(&mut call.args);
                return self.build_call(Callee::Value(callee), args, partial, span);
            },
            Resolution::Candidates(candidates, receiver) => (candidates, receiver),
        };

        let mut args = Vec::with_capacity(call.args.len() + 1);
        if let Some(receiver) = receiver {
            args.push(build::arg(receiver));
        }
        args.extend(call.args.iter().cloned());

        let callee = match self.select_overload(&candidates, &args, partial, span)? {
            Some(callee) => callee,
            None => {
                // Put the receiver back so the call looks the same on the next pass
                if args.len() > call.args.len() {
                    let receiver = args.remove(0).value;
                    match &mut call.expr.kind {
                        ExprKind::Dot(dot) => dot.expr = receiver,
                        _ => call.expr = receiver,
                    }
                }
                return Ok(None);
            },
        };

        call.args.clear();
        self.build_call(callee, args, partial, span)
    }

    /// Replaces `*x` and `**x` arguments with the fields of the record `x`. Returns false while
    /// the type of an unpacked value is unknown.
    fn expand_unpacked_args(&mut self, call: &mut CallExpr) -> TyResult<bool> {
        let mut i = 0;
        while i < call.args.len() {
            let keyword = match &call.args[i].value.kind {
                ExprKind::Star(_) => false,
                ExprKind::KwStar(_) => true,
                _ => {
                    i += 1;
                    continue;
                },
            };

            let span = call.args[i].value.span;
            let inner = match &mut call.args[i].value.kind {
                ExprKind::Star(inner) | ExprKind::KwStar(inner) => &mut **inner,
                _ => unreachable!(),
            };
            self.transform_expr(inner, false)?;
            let mut ty = inner.ty();
            if self.sess.types.is_unbound(ty) {
                return Ok(false);
            }
            if self.is_class(ty, "Optional") {
                let value = mem::take(inner);
                *inner = self.transformed(build::call(build::id("unwrap"), vec![value]).at(span), false)?;
                ty = inner.ty();
                if self.sess.types.is_unbound(ty) {
                    return Ok(false);
                }
            }

            let fields: Vec<Arc<str>> = match self.class_name(ty).and_then(|class| self.sess.classes.get(&class)) {
                Some(info) if info.is_record => info.fields.iter().map(|field| field.name.clone()).collect(),
                _ => {
                    let kind = if keyword {
                        ErrorKind::CallBadKwUnpack(self.type_name(ty))
                    } else {
                        ErrorKind::CallBadUnpack(self.type_name(ty))
                    };
                    return Err(TypeError::new(kind, span));
                },
            };

            // Each field is read from the value, so it must only be evaluated once
            let value = if matches!(inner.kind, ExprKind::Id(_)) {
                mem::take(inner)
            } else {
                let var = self.temp_name("unpack");
                let value = mem::take(inner);
                self.prepend_stmt(build::assign(&var, value).at(span))?;
                self.transformed(build::id(&var).at(span), false)?
            };

            let expanded: Vec<_> = fields.iter().map(|field| CallArg {
                name: keyword.then(|| field.clone()),
                value: build::dot(value.clone(), field).at(span),
            }).collect();
            let count = expanded.len();
            call.args.splice(i..=i, expanded);
            i += count;
        }

        Ok(true)
    }

    fn resolve_callee(&mut self, call: &mut CallExpr, partial: bool, span: Span) -> TyResult<Resolution> {
        match &mut call.expr.kind {
            ExprKind::Dot(dot) => {
                self.transform_expr(&mut dot.expr, true)?;
                let obj_ty = dot.expr.ty();
                let member = dot.member.clone();
                let class = match self.class_name(obj_ty) {
                    Some(class) => class,
                    None if self.sess.types.is_unbound(obj_ty) => return Ok(Resolution::Wait),
                    None => return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(obj_ty), member.to_string()), span)),
                };

                let overloads = self.sess.method_overloads(&class, &member);
                let is_field = self.sess.classes.get(&class).map_or(false, |info| info.field(&member).is_some());
                if dot.expr.is_type() {
                    if !overloads.is_empty() {
                        return Ok(Resolution::candidates(overloads, Some(obj_ty), None));
                    }
                } else if !is_field && !overloads.is_empty() {
                    let receiver = mem::take(&mut dot.expr);
                    return Ok(Resolution::candidates(overloads, Some(obj_ty), Some(receiver)));
                } else if !is_field && &*class == "Optional" {
                    let obj = mem::take(&mut dot.expr);
                    let unwrapped = build::call(build::id("unwrap"), vec![obj]).at(span);
                    let mut args = mem::take(&mut call.args);
                    if partial {
                        args.push(build::arg(build::ellipsis().at(span)));
                    }
                    return Ok(Resolution::Replace(build::call_args(build::dot(unwrapped, &member).at(span), args).at(span)));
                }
            },

            ExprKind::Id(IdExpr {name, resolved}) => {
                let binding = if *resolved {
                    self.sess.ctx.find_canonical(name)
                } else {
                    self.sess.ctx.find(name)
                };
                if let Some(binding) = binding.filter(|binding| binding.kind == BindingKind::Func) {
                    let canonical = binding.canonical.clone();
                    let overloads = if *resolved {
                        vec![canonical]
                    } else {
                        self.sess.overloads.get(ast::root_name(&canonical)).cloned().unwrap_or_else(|| vec![canonical])
                    };
                    return Ok(Resolution::candidates(overloads, None, None));
                }
            },

            _ => {},
        }

        self.transform_expr(&mut call.expr, true)?;
        let callee_ty = call.expr.ty();
        if self.sess.types.is_unbound(callee_ty) {
            return Ok(Resolution::Wait);
        }

        if call.expr.is_type() {
            return self.resolve_constructor(call, callee_ty, partial, span);
        }
        if self.sess.types.func(callee_ty).is_some() {
            return Ok(Resolution::Value(mem::take(&mut call.expr)));
        }

        let class = self.class_name(callee_ty);
        if let Some(info) = class.as_ref().and_then(|class| self.sess.partials.get(class)).cloned() {
            return self.expand_partial(call, &info, partial, span).map(Resolution::Replace);
        }

        let overloads = class.map(|class| self.sess.method_overloads(&class, "__call__")).unwrap_or_default();
        if overloads.is_empty() {
            return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(callee_ty), "__call__".to_string()), span));
        }
        let receiver = mem::take(&mut call.expr);
        Ok(Resolution::candidates(overloads, Some(callee_ty), Some(receiver)))
    }

    /// `T(args)` constructs a value of the type `T`
    fn resolve_constructor(&mut self, call: &mut CallExpr, ty: TypeId, partial: bool, span: Span) -> TyResult<Resolution> {
        if self.sess.types.union(ty).is_some() {
            let value = match call.args.as_mut_slice() {
                [CallArg {name: None, value}] if !partial => mem::take(value),
                _ => return Err(TypeError::new(ErrorKind::CallArgsMany(self.type_name(ty), 1, call.args.len()), span)),
            };
            let ctor = build::call(build::id("__new_union__"), vec![value, Expr::type_literal(ty, span)]);
            return Ok(Resolution::Replace(ctor.at(span)));
        }

        if self.is_record(ty) {
            let class = self.class_name(ty).expect("bug: records are classes");
            let overloads = self.sess.method_overloads(&class, "__new__");
            if overloads.is_empty() {
                return Err(TypeError::new(ErrorKind::DotNoAttr(self.type_name(ty), "__new__".to_string()), span));
            }
            return Ok(Resolution::candidates(overloads, Some(ty), None));
        }

        // Reference types are allocated and then initialized in place
        if partial {
            return Err(TypeError::new(ErrorKind::CallPartial(self.type_name(ty)), span));
        }
        let args = mem::take(&mut call.args);
        let var = self.temp_name("new");
        let alloc = build::call(build::dot(Expr::type_literal(ty, span), "__new__"), Vec::new()).at(span);
        let init = build::call_args(build::dot(build::id(&var), "__init__"), args).at(span);
        let ctor = build::stmt_expr(
            vec![build::assign(&var, alloc).at(span), build::expr_stmt(init).at(span)],
            build::id(&var).at(span),
        );
        Ok(Resolution::Replace(ctor.at(span)))
    }

    /// Calling a partial value calls the function it applies with the stored arguments filled
    /// back in
    fn expand_partial(&mut self, call: &mut CallExpr, info: &PartialInfo, partial: bool, span: Span) -> TyResult<Expr> {
        let value = if matches!(call.expr.kind, ExprKind::Id(_)) {
            mem::take(&mut call.expr)
        } else {
            let var = self.temp_name("partial");
            let value = mem::take(&mut call.expr);
            self.prepend_stmt(build::assign(&var, value).at(span))?;
            self.transformed(build::id(&var).at(span), false)?
        };

        let ast = self.function_ast(&info.func);
        let params = ast.params.iter().filter(|param| !param.is_generic());
        let (mut new_positional, new_named): (Vec<_>, Vec<_>) = mem::take(&mut call.args).into_iter()
            .partition(|arg| arg.name.is_none());
        new_positional.reverse();

        // Arguments stay positional up to the first parameter that nothing fills, so that new
        // positional arguments after a stored `*args` extend it
        let mut positional = true;
        let mut args = Vec::new();
        for (param, &supplied) in params.zip(&info.mask) {
            let field = || build::dot(value.clone(), param.plain_name()).at(span);
            if param.is_star() {
                if supplied {
                    args.push(build::arg(build::star(field()).at(span)));
                }
                args.extend(new_positional.drain(..).rev());
            } else if param.is_kwstar() {
                if supplied {
                    args.push(build::arg(build::kwstar(field()).at(span)));
                }
            } else if supplied && positional {
                args.push(build::arg(field()));
            } else if supplied {
                args.push(build::kwarg(param.plain_name(), field()));
            } else if positional && !new_positional.is_empty() {
                args.extend(new_positional.pop());
            } else {
                positional = false;
            }
        }
        args.extend(new_positional.into_iter().rev());
        args.extend(new_named);
        if partial {
            args.push(build::arg(build::ellipsis().at(span)));
        }

        let callee = Expr::new(ExprKind::Id(IdExpr {name: info.func.clone(), resolved: true}), span);
        Ok(build::call_args(callee, args).at(span))
    }

    /// Picks the overload to call. Returns `None` while the choice depends on argument types
    /// that are not known yet.
    fn select_overload(&mut self, candidates: &[Candidate], args: &[CallArg], partial: bool, span: Span) -> TyResult<Option<Callee>> {
        if let [candidate] = candidates {
            return Ok(Some(candidate.callee()));
        }

        let infos: Vec<_> = args.iter().map(|arg| self.arg_info(arg.name.clone(), &arg.value)).collect();
        let mut best: Option<(usize, &Candidate)> = None;
        let mut matching = 0;
        for candidate in candidates {
            if let Some(score) = self.can_call(&candidate.canonical, candidate.class_ty, &infos, partial) {
                matching += 1;
                // Later declarations win ties
                if best.map_or(true, |(best_score, _)| score >= best_score) {
                    best = Some((score, candidate));
                }
            }
        }

        let all_known = infos.iter().all(|info| self.sess.types.can_realize(info.ty));
        match best {
            Some(_) if matching > 1 && !all_known => Ok(None),
            Some((_, candidate)) => Ok(Some(candidate.callee())),
            None => {
                let name = candidates.first().map(|c| ast::root_name(&c.canonical).to_string()).unwrap_or_default();
                let arg_types: Vec<_> = infos.iter().map(|info| self.type_name(info.ty)).collect();
                Err(TypeError::new(ErrorKind::CallNoMatch(name, arg_types.join(", ")), span))
            },
        }
    }

    /// Reorders the arguments against the callee's signature and produces either an ordered
    /// call or, for partial calls, a partial value
    pub(super) fn build_call(&mut self, callee: Callee, args: Vec<CallArg>, partial: bool, span: Span) -> TyResult<Option<Expr>> {
        let (canonical, fn_ty) = match &callee {
            Callee::Named {canonical, class_ty} => (canonical.clone(), self.instantiate_function(canonical, *class_ty)),
            Callee::Value(expr) => {
                let func = self.sess.types.func(expr.ty()).expect("bug: callee value is not a function");
                (func.ast_name.clone(), expr.ty())
            },
        };
        let ast = self.function_ast(&canonical);
        let names: Vec<_> = args.iter().map(|arg| arg.name.clone()).collect();
        let slots = reorder_arguments(&ast.name, &ParamSpec::of(&ast), &names, partial)
            .map_err(|kind| TypeError::new(kind, span))?;
        let func = self.sess.types.func(fn_ty).cloned().expect("bug: instantiated function is not a function");

        // Generics first, so that defaults can see them
        for (param, slot) in ast.params.iter().zip(&slots) {
            if !param.is_generic() {
                continue;
            }
            let generic = func.func_generics.iter().find(|g| &*g.name == param.plain_name())
                .unwrap_or_else(|| panic!("bug: `{}` has no generic `{}`", canonical, param.name));
            let value = match slot {
                Slot::Arg(index) => &args[*index].value,
                Slot::Default => {
                    let default = param.default.clone().expect("bug: default slot without a default");
                    let default = self.transformed(default, true)?;
                    if default.is_type() {
                        self.unify(generic.ty, default.ty(), span)?;
                    }
                    continue;
                },
                Slot::Inferred => {
                    if self.sess.types.is_unbound(generic.ty) && !self.sess.types.occurs_in(generic.ty, func.args_tuple()) {
                        let name = ast::root_name(&canonical).to_string();
                        return Err(TypeError::new(ErrorKind::CallNoType(name, generic.name.to_string()), span));
                    }
                    continue;
                },
                _ => continue,
            };

            if generic.is_static {
                match self.static_literal(value) {
                    Some(literal) => {
                        let literal = self.sess.types.new_static(literal);
                        self.unify(generic.ty, literal, value.span)?;
                    },
                    None if value.is_static() => return Ok(None),
                    None => return Err(TypeError::new(ErrorKind::ExpectedStatic, value.span)),
                }
            } else if value.is_type() {
                self.unify(generic.ty, value.ty(), value.span)?;
            } else {
                return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(value.ty())), value.span));
            }
        }

        let mut args: Vec<_> = args.into_iter().map(Some).collect();
        let mut take = |index: usize| args[index].take().expect("bug: argument used twice").value;
        let mut ordered = Vec::new();
        let mut mask = Vec::new();
        for (param, slot) in ast.params.iter().zip(&slots) {
            if param.is_generic() {
                continue;
            }

            match slot {
                Slot::Arg(index) => ordered.push(take(*index)),
                Slot::Star(indices) => {
                    let items = indices.iter().map(|&index| take(index)).collect();
                    let mut tuple = build::tuple(items).at(span);
                    tuple.attrs.star_argument = true;
                    ordered.push(tuple);
                },
                Slot::KwStar(indices) => {
                    let names: Vec<Arc<str>> = indices.iter()
                        .map(|&index| names[index].clone().expect("bug: keyword argument without a name"))
                        .collect();
                    let class = self.kw_tuple_class(&names);
                    let items = indices.iter().map(|&index| take(index)).collect();
                    let mut kwtuple = build::call(build::id(&class), items).at(span);
                    kwtuple.attrs.kw_star_argument = true;
                    ordered.push(kwtuple);
                },
                Slot::Default => {
                    let default = param.default.clone().expect("bug: default slot without a default");
                    ordered.push(self.transform_default(&canonical, default, &func.func_generics)?);
                },
                Slot::Missing => {
                    mask.push(false);
                    continue;
                },
                Slot::Inferred => unreachable!("bug: only generics are inferred"),
            }
            mask.push(true);
        }

        if partial {
            return self.build_partial(&ast, &canonical, ordered, mask, span).map(Some);
        }

        let callee_expr = match callee {
            Callee::Named {canonical, ..} => Expr::new(ExprKind::Id(IdExpr {name: canonical, resolved: true}), span).with_type(fn_ty),
            Callee::Value(expr) => expr,
        };
        let mut call = build::call(callee_expr, ordered).at(span);
        call.attrs.ordered_call = true;
        call.attrs.no_argument_wrap = ast.attrs.no_argument_wrap;
        Ok(Some(self.transformed(call, false)?))
    }

    /// Checks a default argument with the generics of the callee in scope
    fn transform_default(&mut self, canonical: &str, default: Expr, generics: &[crate::types::Generic]) -> TyResult<Expr> {
        let key = format!("{:?}", default.kind);
        if self.sess.ctx.default_call_depth.contains(&key) {
            return Err(TypeError::new(ErrorKind::CallRecursiveDefault(ast::root_name(canonical).to_string()), default.span));
        }

        self.sess.ctx.default_call_depth.insert(key.clone());
        for generic in generics {
            let kind = if generic.is_static { BindingKind::Var } else { BindingKind::Type };
            self.sess.ctx.add(generic.name.clone(), kind, generic.name.clone(), generic.ty);
        }

        let result = self.transformed(default, false);

        for generic in generics {
            self.sess.ctx.remove(&generic.name);
        }
        self.sess.ctx.default_call_depth.remove(&key);
        result
    }

    /// A partial call stores the supplied arguments in a record named after the function and
    /// which of its parameters were supplied
    fn build_partial(&mut self, ast: &ast::FunctionStmt, canonical: &Arc<str>, supplied: Vec<Expr>, mask: Vec<bool>, span: Span) -> TyResult<Expr> {
        let mask_name: String = mask.iter().map(|&bit| if bit { '1' } else { '0' }).collect();
        let name = format!("Partial.{}.{}", mask_name, canonical);
        let fields: Vec<Arc<str>> = ast.params.iter()
            .filter(|param| !param.is_generic())
            .zip(&mask)
            .filter(|(_, &bit)| bit)
            .map(|(param, _)| param.plain_name().into())
            .collect();

        let class = self.record_class(&name, &fields);
        self.sess.partials.entry(class.clone()).or_insert_with(|| PartialInfo {func: canonical.clone(), mask});

        let ctor = build::call(build::id(&class), supplied).at(span);
        self.transformed(ctor, false)
    }

    /// Arguments of an ordered call are coerced into the parameter types. The call is done
    /// once the callee is realized.
    fn transform_ordered_call(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        let ty = expr.ty();
        let span = expr.span;
        let no_wrap = expr.attrs.no_argument_wrap;
        let ExprKind::Call(call) = &mut expr.kind else { unreachable!() };

        let func = self.sess.types.func(call.expr.ty()).cloned()
            .unwrap_or_else(|| panic!("bug: ordered call to a non-function at {:?}", span));
        let param_tys = self.sess.types.tuple_items(func.args_tuple()).unwrap_or_default();
        assert_eq!(param_tys.len(), call.args.len(), "bug: ordered call does not match its signature");

        let mut args_done = true;
        for (arg, &param_ty) in call.args.iter_mut().zip(&param_tys) {
            self.transform_expr(&mut arg.value, false)?;
            if no_wrap {
                self.unify(arg.value.ty(), param_ty, arg.value.span)?;
            } else {
                self.wrap_and_unify(&mut arg.value, param_ty)?;
            }
            args_done &= arg.value.done;
        }

        self.transform_expr(&mut call.expr, false)?;
        self.unify(ty, func.ret(), span)?;
        expr.done = args_done && call.expr.done && self.realized(ty)?;
        crate::tycheck_debug!("ordered call at {:?} done: {}", span, expr.done);
        Ok(None)
    }

    fn kw_tuple_class(&mut self, names: &[Arc<str>]) -> Arc<str> {
        let mut name = String::from("KwTuple");
        for field in names {
            name.push('.');
            name.push_str(field);
        }
        self.record_class(&name, names)
    }
}

#[derive(Debug, Clone)]
pub(super) struct Candidate {
    canonical: Arc<str>,
    class_ty: Option<TypeId>,
}

impl Candidate {
    fn callee(&self) -> Callee {
        Callee::Named {canonical: self.canonical.clone(), class_ty: self.class_ty}
    }
}

enum Resolution {
    /// The callee cannot be decided yet
    Wait,
    /// The call is rewritten into another expression
    Replace(Expr),
    /// A function value
    Value(Expr),
    /// Overloads to choose from and the receiver to pass as the first argument, if any
    Candidates(Vec<Candidate>, Option<Expr>),
}

impl Resolution {
    fn candidates(overloads: Vec<Arc<str>>, class_ty: Option<TypeId>, receiver: Option<Expr>) -> Self {
        let candidates = overloads.into_iter().map(|canonical| Candidate {canonical, class_ty}).collect();
        Resolution::Candidates(candidates, receiver)
    }
}
