//! The type checking visitor
//!
//! The checker walks the whole tree once per pass. Each visit makes the types of a node as
//! concrete as it currently can, possibly rewriting the node into a desugared form, and marks
//! the node done once every type under it is realized. Nodes that cannot be decided yet keep
//! unbound types and are visited again on the next pass. The drivers in `realize` repeat passes
//! until the tree is done or a pass makes no progress.

mod error;
mod expr;
mod ops;
mod call;
mod overload;
mod special;
mod assign;
mod loops;
mod stmt;
mod class;
mod realize;

pub use error::*;

use std::mem;
use std::sync::Arc;

use crate::{
    ast::{Expr, ExprKind, FunctionStmt, StaticValue, Stmt, StmtKind},
    diagnostics::Diagnostics,
    fmt_ctx::DisplayWith,
    session::Session,
    source_files::Span,
    types::{StaticLiteral, Substitution, TypeId, UnifyError},
};

pub struct TypeChecker<'a> {
    sess: &'a mut Session,
    diag: &'a Diagnostics,
    /// Statements to insert before the statement currently being checked
    prepend: Vec<Stmt>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(sess: &'a mut Session, diag: &'a Diagnostics) -> Self {
        Self {sess, diag, prepend: Vec::new()}
    }

    /// Type-checks the statements of a module to a fixpoint and returns the typed tree
    ///
    /// Errors are reported to the diagnostics as they are found. A top-level statement that
    /// raised an error is not checked again.
    pub fn check_module(&mut self, stmts: Vec<Stmt>) -> Stmt {
        if !self.sess.prelude_loaded {
            self.sess.prelude_loaded = true;
            let prelude = self.check_toplevel(crate::prelude::prelude_stmts());
            assert!(prelude.done, "bug: the prelude should type-check in a single pass");
        }

        self.check_toplevel(stmts)
    }

    pub(crate) fn check_toplevel(&mut self, stmts: Vec<Stmt>) -> Stmt {
        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::default(),
        };
        let mut module = Stmt::suite(stmts, span);

        if let Err(err) = self.infer_types(&mut module, true) {
            self.report(&err);
        }

        module
    }

    fn report(&self, err: &TypeError) {
        tracing::debug!(error = %err.kind, "reporting type error");
        let diag = self.diag.type_error(err);
        match err.kind {
            ErrorKind::CannotTypecheck => diag.help("annotate the types that cannot be inferred").emit(),
            _ => diag.emit(),
        }
    }

    /// Checks an expression, replacing it with its desugared form if it has one
    ///
    /// Type expressions are only accepted where `allow_types` is set.
    pub(crate) fn transform_expr(&mut self, expr: &mut Expr, allow_types: bool) -> TyResult<()> {
        if expr.ty.is_none() {
            expr.ty = Some(self.new_unbound());
        }

        if !expr.done {
            let span = expr.span;
            if let Some(mut replacement) = self.visit_expr(expr).map_err(|err| err.or_span(span))? {
                self.unify(expr.ty(), replacement.ty(), span)?;
                replacement.attrs.merge(expr.attrs);
                let orig = mem::replace(expr, replacement);
                expr.orig = Some(Box::new(orig));
                self.sess.ctx.changed_nodes += 1;
            }

            if expr.done {
                self.sess.ctx.changed_nodes += 1;
            }
        }

        if expr.is_type() && !allow_types {
            return Err(TypeError::new(ErrorKind::UnexpectedType, expr.span));
        }

        Ok(())
    }

    /// Checks an expression that is built by the checker and returns it
    pub(crate) fn transformed(&mut self, mut expr: Expr, allow_types: bool) -> TyResult<Expr> {
        self.transform_expr(&mut expr, allow_types)?;
        Ok(expr)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> TyResult<Option<Expr>> {
        crate::tycheck_debug!("visiting expression at {:?}", expr.span);

        use ExprKind::*;
        match &expr.kind {
            None => self.transform_none(expr),
            Bool(_) | Int(_) | Float(_) | Str(_) => self.transform_literal(expr),
            Id(_) => self.transform_id(expr),
            Star(_) | KwStar(_) => {
                Err(TypeError::new(ErrorKind::CallBadUnpack("argument".to_string()), expr.span))
            },
            Ellipsis(_) => self.transform_ellipsis(expr),
            Tuple(_) => self.transform_tuple(expr),
            List(_) => self.transform_list(expr),
            If(_) => self.transform_if_expr(expr),
            Unary(_) => self.transform_unary(expr),
            Binary(_) => self.transform_binary(expr),
            ChainBinary(_) => self.transform_chain_binary(expr),
            Pipe(_) => self.transform_pipe(expr),
            AssignExpr(_) => self.transform_assign_expr(expr),
            Index(_) => self.transform_index(expr),
            Instantiate(_) => self.transform_instantiate(expr),
            Slice(_) => self.transform_slice(expr),
            Call(_) => self.transform_call(expr),
            Dot(_) => self.transform_dot(expr),
            StmtExpr(_) => self.transform_stmt_expr(expr),
            Type => self.transform_type_literal(expr),
        }
    }

    /// Checks a statement, wrapping it in a suite with any statements the visit prepended
    pub(crate) fn transform_stmt(&mut self, stmt: &mut Stmt) -> TyResult<()> {
        if stmt.done {
            return Ok(());
        }

        let outer = mem::take(&mut self.prepend);
        let span = stmt.span;
        let result = self.visit_stmt(stmt).map_err(|err| err.or_span(span));
        let prepended = mem::replace(&mut self.prepend, outer);
        result?;

        if !prepended.is_empty() {
            let span = stmt.span;
            let inner = mem::replace(stmt, Stmt::new(StmtKind::Pass, span));
            let mut stmts = prepended;
            stmts.push(inner);
            let done = stmts.iter().all(|stmt| stmt.done);
            *stmt = Stmt {kind: StmtKind::Suite(stmts), span, done};
        }

        if stmt.done {
            self.sess.ctx.changed_nodes += 1;
        }

        Ok(())
    }

    /// Checks a statement and places it before the statement currently being checked
    pub(crate) fn prepend_stmt(&mut self, mut stmt: Stmt) -> TyResult<()> {
        self.transform_stmt(&mut stmt)?;
        self.prepend.push(stmt);
        Ok(())
    }

    pub(crate) fn unify(&mut self, a: TypeId, b: TypeId, span: Span) -> TyResult<usize> {
        self.sess.types.unify(a, b).map_err(|err| {
            let shown = DisplayWith {ctx: &self.sess.types, value: &err};
            tracing::trace!(error = %shown, "unification failed");
            let kind = match err {
                UnifyError::MismatchedTypes {ty1, ty2} |
                UnifyError::ArityMismatch {ty1, ty2, ..} => ErrorKind::TypeUnify(self.type_name(ty1), self.type_name(ty2)),
                UnifyError::Infinite {var, ty} => ErrorKind::TypeUnify(self.type_name(var), self.type_name(ty)),
                UnifyError::UnionTooLarge {union} => ErrorKind::UnionTooLarge(self.type_name(union)),
            };
            TypeError::new(kind, span)
        })
    }

    pub(crate) fn type_name(&self, ty: TypeId) -> String {
        self.sess.types.debug_string(ty)
    }

    pub(crate) fn new_unbound(&mut self) -> TypeId {
        let level = self.sess.ctx.level;
        self.sess.types.new_unbound(level)
    }

    /// Returns a fresh instance of a registered class
    pub(crate) fn class_type(&mut self, name: &str) -> TypeId {
        let ty = self.sess.classes.get(name)
            .unwrap_or_else(|| panic!("bug: class `{}` is not registered", name))
            .ty;
        let level = self.sess.ctx.level;
        self.sess.types.instantiate(ty, level, &mut Default::default())
    }

    /// Returns a fresh instance of a registered class with the given generic types
    pub(crate) fn class_type_of(&mut self, name: &str, generics: &[TypeId], span: Span) -> TyResult<TypeId> {
        let ty = self.class_type(name);
        let params: Vec<_> = self.sess.types.class(ty).map(|class| class.generics.iter().map(|g| g.ty).collect())
            .unwrap_or_default();
        for (&param, &generic) in params.iter().zip(generics) {
            self.unify(param, generic, span)?;
        }
        Ok(ty)
    }

    /// True if the type resolves to the given class
    pub(crate) fn is_class(&self, ty: TypeId, name: &str) -> bool {
        self.sess.types.is_class(ty, name)
    }

    pub(crate) fn class_name(&self, ty: TypeId) -> Option<Arc<str>> {
        self.sess.types.class_name(ty).cloned()
    }

    /// The first generic of a class instance, e.g. `T` in `Optional[T]`
    pub(crate) fn first_generic(&self, ty: TypeId) -> Option<TypeId> {
        self.sess.types.class(ty).and_then(|class| class.generics.first()).map(|g| g.ty)
    }

    pub(crate) fn temp_name(&mut self, prefix: &str) -> Arc<str> {
        self.sess.temp_name(prefix)
    }

    /// Maps the generics a class was declared with to the types filling them in an instance of
    /// that class
    pub(crate) fn member_substitution(&self, class: &str, instance: TypeId) -> Substitution {
        let declared = match self.sess.classes.get(class).and_then(|info| self.sess.types.class(info.ty)) {
            Some(declared) => declared,
            None => return Substitution::new(),
        };
        let filled = match self.sess.types.class(instance) {
            Some(filled) => filled,
            None => return Substitution::new(),
        };

        declared.all_generics().zip(filled.all_generics())
            .map(|(declared, filled)| (declared.id, filled.ty))
            .collect()
    }

    pub(crate) fn function_ast(&self, canonical: &str) -> Arc<FunctionStmt> {
        self.sess.functions.get(canonical)
            .unwrap_or_else(|| panic!("bug: function `{}` is not registered", canonical))
            .ast
            .clone()
    }

    /// Returns a fresh instance of a registered function. For methods, `class_ty` pins the
    /// class generics to those of the given instance.
    pub(crate) fn instantiate_function(&mut self, canonical: &str, class_ty: Option<TypeId>) -> TypeId {
        let info = self.sess.functions.get(canonical)
            .unwrap_or_else(|| panic!("bug: function `{}` is not registered", canonical));
        let ty = info.ty;
        let mut subst = match (&info.ast.attrs.parent_class, class_ty) {
            (Some(class), Some(class_ty)) => self.member_substitution(class, class_ty),
            _ => Substitution::new(),
        };

        let level = self.sess.ctx.level;
        self.sess.types.instantiate(ty, level, &mut subst)
    }

    /// Checks a type annotation and returns the type it denotes
    pub(crate) fn annotation_type(&mut self, annotation: &Expr) -> TyResult<TypeId> {
        if matches!(annotation.kind, ExprKind::None) {
            return Ok(self.class_type("NoneType"));
        }
        let annotation = self.transformed(annotation.clone(), true)?;
        if !annotation.is_type() {
            return Err(TypeError::new(ErrorKind::ExpectedType(self.type_name(annotation.ty())), annotation.span));
        }
        Ok(annotation.ty())
    }

    /// The evaluated static value of an expression as a literal
    pub(crate) fn static_literal(&self, expr: &Expr) -> Option<StaticLiteral> {
        match &expr.static_value {
            StaticValue::Int(Some(value)) if expr.ty.map_or(false, |ty| self.is_class(ty, "bool")) => {
                Some(StaticLiteral::Bool(*value != 0))
            },
            StaticValue::Int(Some(value)) => Some(StaticLiteral::Int(*value)),
            StaticValue::Str(Some(value)) => Some(StaticLiteral::Str(value.clone())),
            _ => None,
        }
    }

    /// Builds a sealed union of the given member types
    pub(crate) fn sealed_union(&mut self, members: &[TypeId], span: Span) -> TyResult<TypeId> {
        let level = self.sess.ctx.level;
        let union = self.sess.types.new_union(level);
        for &member in members {
            self.sess.types.add_union_member(union, member)
                .map_err(|_| TypeError::new(ErrorKind::UnionTooLarge(self.type_name(union)), span))?;
        }
        self.seal_union(union, span)?;
        Ok(union)
    }

    pub(crate) fn seal_union(&mut self, union: TypeId, span: Span) -> TyResult<()> {
        self.sess.types.seal_union(union).map_err(|err| match err {
            UnifyError::UnionTooLarge {union} => TypeError::new(ErrorKind::UnionTooLarge(self.type_name(union)), span),
            _ => TypeError::new(ErrorKind::TypeUnify(self.type_name(union), "Union".to_string()), span),
        })
    }
}

/// Builds an unchecked literal expression for a static value
pub(crate) fn literal_expr(value: &StaticLiteral, span: Span) -> Expr {
    let kind = match value {
        StaticLiteral::Int(value) => ExprKind::Int(value.to_string()),
        StaticLiteral::Str(value) => ExprKind::Str(value.clone()),
        StaticLiteral::Bool(value) => ExprKind::Bool(*value),
    };
    Expr::new(kind, span)
}
