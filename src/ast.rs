//! The pre-resolved syntax tree consumed by the type checker
//!
//! Names are already canonical when the tree reaches the checker. Each expression carries the
//! state the checker threads through repeated passes: its type, whether it is done, the static
//! value it evaluates to and the expression it replaced.

mod param;
pub mod build;

pub use param::*;

use std::fmt;
use std::sync::Arc;

use crate::{source_files::Span, types::TypeId};

/// A compile-time value attached to an expression
///
/// `None` inside a variant means the expression is static of that kind but its value is not
/// known yet. Booleans are static integers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StaticValue {
    #[default]
    NotStatic,
    Int(Option<i64>),
    Str(Option<String>),
}

impl StaticValue {
    pub fn is_static(&self) -> bool {
        !matches!(self, StaticValue::NotStatic)
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self, StaticValue::Int(Some(_)) | StaticValue::Str(Some(_)))
    }

    pub fn int(&self) -> Option<i64> {
        match self {
            StaticValue::Int(value) => *value,
            _ => None,
        }
    }

    pub fn str(&self) -> Option<&str> {
        match self {
            StaticValue::Str(value) => value.as_deref(),
            _ => None,
        }
    }
}

/// Decorations that survive a node being replaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprAttrs {
    /// The expression denotes a type rather than a value
    pub is_type: bool,
    /// A call that still misses arguments and produces a partial value
    pub partial: bool,
    /// Arguments of this call were already reordered against the callee signature
    pub ordered_call: bool,
    /// A `*args` tuple synthesized during reordering
    pub star_argument: bool,
    /// A `**kwargs` tuple synthesized during reordering
    pub kw_star_argument: bool,
    /// The callee must not coerce its arguments
    pub no_argument_wrap: bool,
}

impl ExprAttrs {
    pub fn merge(&mut self, other: ExprAttrs) {
        self.is_type |= other.is_type;
        self.partial |= other.partial;
        self.ordered_call |= other.ordered_call;
        self.star_argument |= other.star_argument;
        self.kw_star_argument |= other.kw_star_argument;
        self.no_argument_wrap |= other.no_argument_wrap;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Assigned on the first visit
    pub ty: Option<TypeId>,
    /// Set once every type under this node is realized. Never unset.
    pub done: bool,
    pub attrs: ExprAttrs,
    pub static_value: StaticValue,
    /// The expression this node replaced, if it was produced by a rewrite
    pub orig: Option<Box<Expr>>,
}

impl Default for Expr {
    fn default() -> Self {
        Expr::new(ExprKind::None, Span::default())
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
            done: false,
            attrs: ExprAttrs::default(),
            static_value: StaticValue::NotStatic,
            orig: None,
        }
    }

    /// An expression that denotes the given type
    pub fn type_literal(ty: TypeId, span: Span) -> Self {
        let mut expr = Expr::new(ExprKind::Type, span).with_type(ty);
        expr.attrs.is_type = true;
        expr
    }

    /// Moves the node to the given location
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = Some(ty);
        self
    }

    /// The type of this expression. Only valid after the expression has been visited.
    pub fn ty(&self) -> TypeId {
        self.ty.expect("bug: expression was not visited before its type was requested")
    }

    pub fn is_type(&self) -> bool {
        self.attrs.is_type
    }

    pub fn is_static(&self) -> bool {
        self.static_value.is_static()
    }

    pub fn id(&self) -> Option<&Arc<str>> {
        match &self.kind {
            ExprKind::Id(id) => Some(&id.name),
            _ => None,
        }
    }

    pub fn is_id(&self, name: &str) -> bool {
        self.id().map_or(false, |id| &**id == name)
    }

    pub fn ellipsis(&self) -> Option<EllipsisMode> {
        match &self.kind {
            ExprKind::Ellipsis(mode) => Some(*mode),
            _ => None,
        }
    }

    pub fn call(&self) -> Option<&CallExpr> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Follows rewrites back to the expression the upstream passes produced
    pub fn original(&self) -> &Expr {
        let mut expr = self;
        while let Some(orig) = &expr.orig {
            expr = orig;
        }
        expr
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    None,
    Bool(bool),
    /// Kept as written. Literals too large for an `i64` lose their static value.
    Int(String),
    Float(f64),
    Str(String),
    Id(IdExpr),
    Star(Box<Expr>),
    KwStar(Box<Expr>),
    Ellipsis(EllipsisMode),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    If(Box<IfExpr>),
    Unary(Box<UnaryExpr>),
    Binary(Box<BinaryExpr>),
    /// `a < b <= c`
    ChainBinary(Box<ChainBinaryExpr>),
    /// `a |> f |> g(x, ...)`. Holds the head followed by every stage.
    Pipe(Vec<Expr>),
    /// `(var := value)`
    AssignExpr(Box<AssignExpr>),
    Index(Box<IndexExpr>),
    Instantiate(Box<InstantiateExpr>),
    Slice(Box<SliceExpr>),
    Call(Box<CallExpr>),
    Dot(Box<DotExpr>),
    StmtExpr(Box<StmtExpr>),
    /// A type computed by the checker rather than written in source. The type is carried in
    /// the expression's `ty`.
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdExpr {
    pub name: Arc<str>,
    /// Set once the name was resolved, after which `name` holds the canonical binding name
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EllipsisMode {
    /// `...` as a value
    Standalone,
    /// A trailing `...` argument asking for a partial call, or a placeholder for a missing
    /// argument of one
    Partial,
    /// Marks where the value flowing through a pipeline goes in a stage
    Pipe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub cond: Expr,
    pub then_expr: Expr,
    pub else_expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `~`
    Invert,
    /// `+`
    Pos,
    /// `-`
    Neg,
}

impl UnaryOp {
    pub fn magic(self) -> &'static str {
        match self {
            UnaryOp::Not => "bool",
            UnaryOp::Invert => "invert",
            UnaryOp::Pos => "pos",
            UnaryOp::Neg => "neg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    MatMul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    /// `and`
    And,
    /// `or`
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl BinOp {
    /// The stem of the magic method implementing this operator, if it has one
    pub fn magic(self) -> Option<&'static str> {
        use BinOp::*;
        Some(match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            MatMul => "matmul",
            TrueDiv => "truediv",
            FloorDiv => "floordiv",
            Mod => "mod",
            Pow => "pow",
            LShift => "lshift",
            RShift => "rshift",
            BitAnd => "and",
            BitOr => "or",
            BitXor => "xor",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            And | Or | In | NotIn | Is | IsNot => return None,
        })
    }

    /// The magic method of the right operand that implements this operator with the operands
    /// swapped
    pub fn reflected_magic(self) -> Option<String> {
        use BinOp::*;
        match self {
            Lt => Some("gt".to_string()),
            Le => Some("ge".to_string()),
            Gt => Some("lt".to_string()),
            Ge => Some("le".to_string()),
            Eq => Some("eq".to_string()),
            Ne => Some("ne".to_string()),
            _ => self.magic().map(|magic| format!("r{}", magic)),
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            MatMul => "@",
            TrueDiv => "/",
            FloorDiv => "//",
            Mod => "%",
            Pow => "**",
            LShift => "<<",
            RShift => ">>",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            And => "and",
            Or => "or",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            In => "in",
            NotIn => "not in",
            Is => "is",
            IsNot => "is not",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinOp,
    pub lhs: Expr,
    pub rhs: Expr,
    /// `a op= b`
    pub in_place: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainBinaryExpr {
    pub first: Expr,
    /// Each operator with the operand on its right
    pub rest: Vec<(BinOp, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignExpr {
    pub var: Arc<str>,
    pub value: Expr,
    pub update: UpdateMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub expr: Expr,
    pub index: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateExpr {
    pub expr: Expr,
    pub params: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceExpr {
    pub start: Option<Expr>,
    pub stop: Option<Expr>,
    pub step: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    /// Set for keyword arguments
    pub name: Option<Arc<str>>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub expr: Expr,
    pub args: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DotExpr {
    pub expr: Expr,
    pub member: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmtExpr {
    pub stmts: Vec<Stmt>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    /// Never unset once set
    pub done: bool,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self {kind, span, done: false}
    }

    pub fn suite(stmts: Vec<Stmt>, span: Span) -> Self {
        Self::new(StmtKind::Suite(stmts), span)
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Suite(Vec<Stmt>),
    Pass,
    Break,
    Continue,
    Expr(Expr),
    Assign(Box<AssignStmt>),
    AssignMember(Box<AssignMemberStmt>),
    Del(Expr),
    Print(Vec<Expr>),
    Return(Option<Expr>),
    While(Box<WhileStmt>),
    For(Box<ForStmt>),
    If(Box<IfStmt>),
    Function(Arc<FunctionStmt>),
    Class(Arc<ClassStmt>),
    /// Type-checks the registered module with this name
    Import(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Binds a new name
    #[default]
    Assign,
    /// Rebinds a name the scoping pass found to be dominated by an earlier binding
    Update,
    /// An update that must go through the atomic magic methods
    AtomicUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub lhs: Expr,
    /// `None` for a bare declaration
    pub rhs: Option<Expr>,
    pub type_expr: Option<Expr>,
    pub update: UpdateMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignMemberStmt {
    pub lhs: Expr,
    pub member: Arc<str>,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub cond: Expr,
    pub suite: Stmt,
    pub else_suite: Option<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub var: Expr,
    pub iter: Expr,
    pub suite: Stmt,
    pub else_suite: Option<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub if_suite: Stmt,
    pub else_suite: Option<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionAttrs {
    /// Declared without a body: the signature is trusted as written
    pub builtin: bool,
    /// The canonical name of the class this function is a method of
    pub parent_class: Option<Arc<str>>,
    /// Called with `obj.name = value`
    pub property_setter: bool,
    /// Arguments are not coerced to the parameter types
    pub no_argument_wrap: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionStmt {
    /// Canonical name. Overloads share the root name and differ by a `:N` suffix.
    pub name: Arc<str>,
    pub params: Vec<Param>,
    pub ret: Option<Expr>,
    pub suite: Option<Stmt>,
    pub attrs: FunctionAttrs,
    pub span: Span,
}

impl FunctionStmt {
    /// The overload root of this function: its name without the overload suffix
    pub fn root_name(&self) -> &str {
        root_name(&self.name)
    }

    /// The name of the function without its class prefix or overload suffix
    pub fn short_name(&self) -> &str {
        let root = self.root_name();
        match &self.attrs.parent_class {
            Some(class) => root.strip_prefix(&**class).and_then(|rest| rest.strip_prefix('.')).unwrap_or(root),
            None => root,
        }
    }
}

/// Strips the overload suffix from a canonical function name
pub fn root_name(name: &str) -> &str {
    match name.rfind(':') {
        Some(index) if name[index+1..].chars().all(|ch| ch.is_ascii_digit()) => &name[..index],
        _ => name,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAttrs {
    /// Value semantics, fields stored inline
    pub record: bool,
    /// Adds methods to a class that was already defined
    pub extend: bool,
    /// Instances carry runtime type information. Inherited by subclasses.
    pub rtti: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassStmt {
    pub name: Arc<str>,
    /// Fields and generic parameters
    pub params: Vec<Param>,
    /// Class variables, bound once for the class
    pub class_vars: Vec<(Arc<str>, Expr)>,
    pub methods: Vec<FunctionStmt>,
    /// Statically inherited parent classes, closest first
    pub bases: Vec<Arc<str>>,
    pub attrs: ClassAttrs,
    pub span: Span,
}
