use std::sync::Arc;

use super::{Expr, ExprKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStatus {
    Normal,
    Generic,
    /// A generic that is not part of the user-visible signature
    HiddenGeneric,
}

/// A function or class parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Variadic parameters keep their `*`/`**` prefix
    pub name: Arc<str>,
    pub type_expr: Option<Expr>,
    pub default: Option<Expr>,
    pub status: ParamStatus,
}

impl Param {
    /// Creates a parameter, inferring whether it is generic from its annotation
    pub fn new(name: impl Into<Arc<str>>, type_expr: Option<Expr>, default: Option<Expr>) -> Self {
        let status = match &type_expr {
            Some(ty) if is_generic_annotation(ty) => ParamStatus::Generic,
            _ => ParamStatus::Normal,
        };
        Self {name: name.into(), type_expr, default, status}
    }

    pub fn hidden(mut self) -> Self {
        self.status = ParamStatus::HiddenGeneric;
        self
    }

    pub fn is_generic(&self) -> bool {
        self.status != ParamStatus::Normal
    }

    pub fn is_star(&self) -> bool {
        self.name.starts_with('*') && !self.is_kwstar()
    }

    pub fn is_kwstar(&self) -> bool {
        self.name.starts_with("**")
    }

    /// The name without any variadic prefix
    pub fn plain_name(&self) -> &str {
        self.name.trim_start_matches('*')
    }

    /// For generics: the annotation is `Static[...]`
    pub fn is_static_generic(&self) -> bool {
        match &self.type_expr {
            Some(Expr {kind: ExprKind::Index(index), ..}) => index.expr.is_id("Static"),
            _ => false,
        }
    }
}

/// `type`, `TypeVar`, `TypeVar[...]` and `Static[...]` annotations declare generics
fn is_generic_annotation(ty: &Expr) -> bool {
    match &ty.kind {
        ExprKind::Id(_) => ty.is_id("type") || ty.is_id("TypeVar"),
        ExprKind::Index(index) => index.expr.is_id("TypeVar") || index.expr.is_id("Static"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::build::*;

    #[test]
    fn infers_generic_status_from_annotations() {
        assert_eq!(Param::new("T", Some(id("type")), None).status, ParamStatus::Generic);
        assert_eq!(Param::new("N", Some(index(id("Static"), id("int"))), None).status, ParamStatus::Generic);
        assert_eq!(Param::new("x", Some(id("int")), None).status, ParamStatus::Normal);
        assert_eq!(Param::new("x", None, None).status, ParamStatus::Normal);
        assert!(Param::new("N", Some(index(id("Static"), id("int"))), None).is_static_generic());
    }

    #[test]
    fn variadic_prefixes() {
        let args = Param::new("*args", None, None);
        let kwargs = Param::new("**kwargs", None, None);
        assert!(args.is_star() && !args.is_kwstar());
        assert!(kwargs.is_kwstar() && !kwargs.is_star());
        assert_eq!(kwargs.plain_name(), "kwargs");
    }
}
