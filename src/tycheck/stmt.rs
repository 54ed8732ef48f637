use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::{
    ast::{build, FunctionStmt, Param, Stmt, StmtKind},
    context::BindingKind,
    session::FunctionInfo,
    types::{ClassType, FuncType, Generic, StaticKind, Type, TypeId, FUNCTION_CLASS},
};

use super::{expr::static_truth, ErrorKind, TyResult, TypeChecker, TypeError};

impl<'a> TypeChecker<'a> {
    /// Visits a statement. A statement that desugars into another one is replaced and the
    /// replacement is checked right away.
    pub(super) fn visit_stmt(&mut self, stmt: &mut Stmt) -> TyResult<()> {
        crate::tycheck_debug!("visiting statement at {:?}", stmt.span);

        use StmtKind::*;
        let replacement = match &stmt.kind {
            Suite(_) => self.transform_suite(stmt)?,
            Pass => {
                stmt.done = true;
                None
            },
            Break | Continue => self.transform_loop_exit(stmt)?,
            Expr(_) => self.transform_expr_stmt(stmt)?,
            Assign(_) => self.transform_assign(stmt)?,
            AssignMember(_) => self.transform_assign_member(stmt)?,
            Del(_) => self.transform_del(stmt)?,
            Print(_) => self.transform_print(stmt)?,
            Return(_) => self.transform_return(stmt)?,
            While(_) => self.transform_while(stmt)?,
            For(_) => self.transform_for(stmt)?,
            If(_) => self.transform_if(stmt)?,
            Function(func) => {
                let func = func.clone();
                self.register_function(&func)?;
                stmt.done = true;
                None
            },
            Class(class) => {
                let class = class.clone();
                self.register_class(&class)?;
                stmt.done = true;
                None
            },
            Import(_) => self.transform_import(stmt)?,
        };

        if let Some(mut replacement) = replacement {
            self.transform_stmt(&mut replacement)?;
            *stmt = replacement;
            self.sess.ctx.changed_nodes += 1;
        }

        Ok(())
    }

    fn transform_suite(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let StmtKind::Suite(stmts) = &mut stmt.kind else { unreachable!() };
        let mut done = true;
        for child in stmts.iter_mut() {
            self.transform_stmt(child)?;
            done &= child.done;
        }
        stmt.done = done;
        Ok(None)
    }

    fn transform_loop_exit(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        if self.sess.ctx.base().loops == 0 {
            let keyword = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
            return Err(TypeError::new(ErrorKind::ExpectedLoop(keyword.to_string()), stmt.span));
        }
        stmt.done = true;
        Ok(None)
    }

    fn transform_expr_stmt(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let StmtKind::Expr(expr) = &mut stmt.kind else { unreachable!() };
        self.transform_expr(expr, false)?;
        stmt.done = expr.done;
        Ok(None)
    }

    fn transform_print(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let StmtKind::Print(values) = &mut stmt.kind else { unreachable!() };
        let mut done = true;
        for value in values.iter_mut() {
            self.transform_expr(value, false)?;
            done &= value.done;
        }
        stmt.done = done;
        Ok(None)
    }

    fn transform_return(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let span = stmt.span;
        let StmtKind::Return(value) = &mut stmt.kind else { unreachable!() };
        let ret = self.sess.ctx.base().return_type
            .ok_or_else(|| TypeError::new(ErrorKind::ReturnOutsideFunction, span))?;

        match value {
            Some(value) => {
                self.transform_expr(value, false)?;
                self.wrap_and_unify(value, ret)?;
                stmt.done = value.done;
            },
            None => {
                let none = self.class_type("NoneType");
                self.unify(ret, none, span)?;
                stmt.done = true;
            },
        }
        Ok(None)
    }

    /// `if` statements whose condition is static keep only the branch that is taken
    fn transform_if(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let span = stmt.span;
        let StmtKind::If(if_stmt) = &mut stmt.kind else { unreachable!() };

        self.transform_expr(&mut if_stmt.cond, false)?;
        if !self.to_bool(&mut if_stmt.cond)? {
            return Ok(None);
        }

        if let Some(cond) = static_truth(&if_stmt.cond) {
            let taken = if cond {
                mem::replace(&mut if_stmt.if_suite, build::pass())
            } else {
                if_stmt.else_suite.take().unwrap_or_else(build::pass)
            };
            return Ok(Some(taken.at(span)));
        }

        self.transform_stmt(&mut if_stmt.if_suite)?;
        let mut done = if_stmt.cond.done && if_stmt.if_suite.done;
        if let Some(else_suite) = &mut if_stmt.else_suite {
            self.transform_stmt(else_suite)?;
            done &= else_suite.done;
        }
        stmt.done = done;
        Ok(None)
    }

    /// Checks a registered module the first time it is imported
    fn transform_import(&mut self, stmt: &mut Stmt) -> TyResult<Option<Stmt>> {
        let StmtKind::Import(name) = &stmt.kind else { unreachable!() };
        let name = name.clone();
        let module = self.sess.modules.get_mut(&name)
            .ok_or_else(|| TypeError::new(ErrorKind::ImportNotFound(name.to_string()), stmt.span))?;

        if let Some(stmts) = module.stmts.take() {
            tracing::debug!(module = %name, "checking imported module");
            let checked = self.check_toplevel(stmts);
            if let Some(module) = self.sess.modules.get_mut(&name) {
                module.checked = Some(checked);
            }
        }

        stmt.done = true;
        Ok(None)
    }

    /// Computes the generalized type of a function definition and binds its name
    pub(super) fn register_function(&mut self, ast: &Arc<FunctionStmt>) -> TyResult<TypeId> {
        let outer_level = self.sess.ctx.level;
        self.sess.ctx.level += 1;
        let signature = self.function_signature(ast);
        self.sess.ctx.level = outer_level;
        let (generics, arg_tys, ret) = signature?;

        let method_of = ast.attrs.parent_class.clone();
        let parent = match &method_of {
            Some(class) => self.sess.ctx.find(class).map(|binding| binding.ty),
            None if !self.sess.ctx.is_toplevel() => self.sess.ctx.base().func_ty,
            None => None,
        };

        let args = self.sess.types.tuple_of(&arg_tys);
        let base = ClassType {
            name: FUNCTION_CLASS.into(),
            nice_name: FUNCTION_CLASS.into(),
            generics: vec![
                Generic {name: "T".into(), nice_name: "T".into(), id: self.sess.types.fresh_var_id(), ty: args, is_static: false},
                Generic {name: "R".into(), nice_name: "R".into(), id: self.sess.types.fresh_var_id(), ty: ret, is_static: false},
            ],
            hidden_generics: Vec::new(),
            is_record: true,
        };
        let func = FuncType {base, ast_name: ast.name.clone(), index: 0, func_generics: generics, parent};
        let ty = self.sess.types.push(Type::Func(func));

        // Methods also generalize over the generics of their class
        let threshold = if method_of.is_some() { outer_level } else { outer_level + 1 };
        let ty = self.sess.types.generalize(ty, threshold);

        self.sess.functions.entry(ast.name.clone())
            .and_modify(|info| {
                info.ast = ast.clone();
                info.ty = ty;
            })
            .or_insert_with(|| FunctionInfo {ast: ast.clone(), ty, realizations: HashMap::new()});

        let root: Arc<str> = ast.root_name().into();
        let overloads = self.sess.overloads.entry(root.clone()).or_default();
        if !overloads.contains(&ast.name) {
            overloads.push(ast.name.clone());
        }

        if method_of.is_some() {
            self.sess.ctx.add_global(ast.name.clone(), BindingKind::Func, ast.name.clone(), ty);
        } else {
            self.sess.ctx.add(root, BindingKind::Func, ast.name.clone(), ty);
        }

        tracing::trace!(function = %ast.name, ty = %self.type_name(ty), "registered function");
        Ok(ty)
    }

    /// The generics, argument types and return type of a function, with the generics bound
    /// while the annotations are checked
    fn function_signature(&mut self, ast: &FunctionStmt) -> TyResult<(Vec<Generic>, Vec<TypeId>, TypeId)> {
        let mut kinds = Vec::new();
        for param in ast.params.iter().filter(|param| param.is_generic()) {
            kinds.push((param, static_kind_of(param)?));
        }

        let generics = self.bind_generic_params(&kinds);
        let result = self.signature_types(ast);
        for generic in &generics {
            self.sess.ctx.remove(&generic.name);
        }

        let (args, ret) = result?;
        Ok((generics, args, ret))
    }

    /// Binds each generic parameter to a fresh variable at the current level
    pub(super) fn bind_generic_params(&mut self, params: &[(&Param, Option<StaticKind>)]) -> Vec<Generic> {
        let level = self.sess.ctx.level;
        params.iter().map(|&(param, kind)| {
            let name: Arc<str> = param.plain_name().into();
            let var = self.sess.types.new_var(level, kind, Some(name.clone()));
            let id = self.sess.types.unbound(var).map(|var| var.id).expect("bug: fresh variable is bound");
            let binding = if kind.is_some() { BindingKind::Var } else { BindingKind::Type };
            self.sess.ctx.add(name.clone(), binding, name.clone(), var);
            Generic {name: name.clone(), nice_name: name, id, ty: var, is_static: kind.is_some()}
        }).collect()
    }

    fn signature_types(&mut self, ast: &FunctionStmt) -> TyResult<(Vec<TypeId>, TypeId)> {
        let mut args = Vec::new();
        for param in ast.params.iter().filter(|param| !param.is_generic()) {
            let ty = match (&param.type_expr, &ast.attrs.parent_class) {
                (Some(annotation), _) => self.annotation_type(annotation)?,
                (None, Some(class)) if &*param.name == "self" => match self.sess.ctx.find(class) {
                    Some(binding) => binding.ty,
                    None => self.new_unbound(),
                },
                (None, _) => self.new_unbound(),
            };
            args.push(ty);
        }

        let ret = match &ast.ret {
            Some(annotation) => self.annotation_type(annotation)?,
            None => self.new_unbound(),
        };
        Ok((args, ret))
    }
}

/// The static kind a generic parameter is restricted to, `None` for type parameters
pub(super) fn static_kind_of(param: &Param) -> TyResult<Option<StaticKind>> {
    if !param.is_static_generic() {
        return Ok(None);
    }

    let Some(crate::ast::Expr {kind: crate::ast::ExprKind::Index(index), span, ..}) = &param.type_expr else {
        unreachable!("bug: static generics are annotated with `Static[...]`");
    };
    let name = index.index.id().map(|name| name.to_string()).unwrap_or_else(|| "?".to_string());
    StaticKind::from_type_name(&name)
        .map(Some)
        .ok_or_else(|| TypeError::new(ErrorKind::BadStaticType(name), *span))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    #[test]
    fn static_generics_name_their_kind() {
        assert_eq!(static_kind_of(&static_param("N", "int")), Ok(Some(StaticKind::Int)));
        assert_eq!(static_kind_of(&type_param("T")), Ok(None));
        assert_eq!(static_kind_of(&param("x", Some(id("int")))), Ok(None));
        assert_eq!(static_kind_of(&static_param("N", "float")).map_err(|err| err.kind),
            Err(ErrorKind::BadStaticType("float".to_string())));
    }
}
