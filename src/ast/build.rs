//! Shorthand constructors for building trees by hand
//!
//! Every node gets an empty span. The prelude and the tests use these instead of a parser.

use std::sync::Arc;

use crate::source_files::Span;

use super::*;

fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::default())
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default())
}

pub fn id(name: &str) -> Expr {
    expr(ExprKind::Id(IdExpr {name: name.into(), resolved: false}))
}

pub fn none() -> Expr {
    expr(ExprKind::None)
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Bool(value))
}

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Int(value.to_string()))
}

/// An integer literal exactly as written in source
pub fn int_lit(text: &str) -> Expr {
    expr(ExprKind::Int(text.to_string()))
}

pub fn float(value: f64) -> Expr {
    expr(ExprKind::Float(value))
}

pub fn string(value: &str) -> Expr {
    expr(ExprKind::Str(value.to_string()))
}

pub fn ellipsis() -> Expr {
    expr(ExprKind::Ellipsis(EllipsisMode::Partial))
}

/// The `...` of a pipeline stage
pub fn pipe_hole() -> Expr {
    expr(ExprKind::Ellipsis(EllipsisMode::Pipe))
}

pub fn star(value: Expr) -> Expr {
    expr(ExprKind::Star(Box::new(value)))
}

pub fn kwstar(value: Expr) -> Expr {
    expr(ExprKind::KwStar(Box::new(value)))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    expr(ExprKind::Tuple(items))
}

pub fn list(items: Vec<Expr>) -> Expr {
    expr(ExprKind::List(items))
}

pub fn if_expr(cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
    expr(ExprKind::If(Box::new(IfExpr {cond, then_expr, else_expr})))
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary(Box::new(UnaryExpr {op, expr: operand})))
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary(Box::new(BinaryExpr {op, lhs, rhs, in_place: false})))
}

pub fn binary_in_place(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary(Box::new(BinaryExpr {op, lhs, rhs, in_place: true})))
}

/// `first op1 b op2 c ...`
pub fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    expr(ExprKind::ChainBinary(Box::new(ChainBinaryExpr {first, rest})))
}

/// `head |> stage1 |> stage2 ...`
pub fn pipe(head: Expr, stages: Vec<Expr>) -> Expr {
    let mut items = vec![head];
    items.extend(stages);
    expr(ExprKind::Pipe(items))
}

/// `(name := value)`
pub fn walrus(name: &str, value: Expr) -> Expr {
    expr(ExprKind::AssignExpr(Box::new(AssignExpr {var: name.into(), value, update: UpdateMode::Assign})))
}

pub fn index(value: Expr, idx: Expr) -> Expr {
    expr(ExprKind::Index(Box::new(IndexExpr {expr: value, index: idx})))
}

pub fn instantiate(value: Expr, params: Vec<Expr>) -> Expr {
    expr(ExprKind::Instantiate(Box::new(InstantiateExpr {expr: value, params})))
}

pub fn slice(start: Option<Expr>, stop: Option<Expr>, step: Option<Expr>) -> Expr {
    expr(ExprKind::Slice(Box::new(SliceExpr {start, stop, step})))
}

pub fn dot(value: Expr, member: &str) -> Expr {
    expr(ExprKind::Dot(Box::new(DotExpr {expr: value, member: member.into()})))
}

pub fn arg(value: Expr) -> CallArg {
    CallArg {name: None, value}
}

pub fn kwarg(name: &str, value: Expr) -> CallArg {
    CallArg {name: Some(name.into()), value}
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    call_args(callee, args.into_iter().map(arg).collect())
}

pub fn call_args(callee: Expr, args: Vec<CallArg>) -> Expr {
    expr(ExprKind::Call(Box::new(CallExpr {expr: callee, args})))
}

pub fn stmt_expr(stmts: Vec<Stmt>, value: Expr) -> Expr {
    expr(ExprKind::StmtExpr(Box::new(StmtExpr {stmts, expr: value})))
}

pub fn suite(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Suite(stmts))
}

pub fn pass() -> Stmt {
    stmt(StmtKind::Pass)
}

pub fn brk() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn cont() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn expr_stmt(value: Expr) -> Stmt {
    stmt(StmtKind::Expr(value))
}

fn assign_stmt(lhs: Expr, rhs: Option<Expr>, type_expr: Option<Expr>, update: UpdateMode) -> Stmt {
    stmt(StmtKind::Assign(Box::new(AssignStmt {lhs, rhs, type_expr, update})))
}

/// `name = value`, binding a new name
pub fn assign(name: &str, value: Expr) -> Stmt {
    assign_stmt(id(name), Some(value), None, UpdateMode::Assign)
}

/// `name: ty = value`
pub fn assign_typed(name: &str, ty: Expr, value: Expr) -> Stmt {
    assign_stmt(id(name), Some(value), Some(ty), UpdateMode::Assign)
}

/// `name: ty` without a value
pub fn declare(name: &str, ty: Expr) -> Stmt {
    assign_stmt(id(name), None, Some(ty), UpdateMode::Assign)
}

/// `lhs = value` for an arbitrary target
pub fn assign_to(lhs: Expr, value: Expr) -> Stmt {
    assign_stmt(lhs, Some(value), None, UpdateMode::Assign)
}

/// `name = value` where `name` is already bound
pub fn update(name: &str, value: Expr) -> Stmt {
    assign_stmt(id(name), Some(value), None, UpdateMode::Update)
}

/// `name = value` with an explicit binding mode
pub fn assign_mode(name: &str, value: Expr, update: UpdateMode) -> Stmt {
    assign_stmt(id(name), Some(value), None, update)
}

pub fn atomic_update(name: &str, value: Expr) -> Stmt {
    assign_stmt(id(name), Some(value), None, UpdateMode::AtomicUpdate)
}

pub fn assign_member(lhs: Expr, member: &str, value: Expr) -> Stmt {
    stmt(StmtKind::AssignMember(Box::new(AssignMemberStmt {lhs, member: member.into(), rhs: value})))
}

pub fn del(target: Expr) -> Stmt {
    stmt(StmtKind::Del(target))
}

pub fn print(values: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Print(values))
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return(Some(value)))
}

pub fn ret_none() -> Stmt {
    stmt(StmtKind::Return(None))
}

pub fn while_loop(cond: Expr, body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::While(Box::new(WhileStmt {
        cond,
        suite: suite(body),
        else_suite: else_body.map(suite),
    })))
}

pub fn for_loop(var: &str, iter: Expr, body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    for_pattern(id(var), iter, body, else_body)
}

/// A loop binding a pattern such as `a, b`
pub fn for_pattern(var: Expr, iter: Expr, body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::For(Box::new(ForStmt {
        var,
        iter,
        suite: suite(body),
        else_suite: else_body.map(suite),
    })))
}

pub fn if_stmt(cond: Expr, body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If(Box::new(IfStmt {cond, if_suite: suite(body), else_suite: else_body.map(suite)})))
}

pub fn import(module: &str) -> Stmt {
    stmt(StmtKind::Import(module.into()))
}

/// A normal parameter, optionally annotated
pub fn param(name: &str, ty: Option<Expr>) -> Param {
    Param::new(name, ty, None)
}

pub fn param_default(name: &str, ty: Option<Expr>, default: Expr) -> Param {
    Param::new(name, ty, Some(default))
}

/// `name: type`
pub fn type_param(name: &str) -> Param {
    Param::new(name, Some(id("type")), None)
}

/// `name: Static[kind]`
pub fn static_param(name: &str, kind: &str) -> Param {
    Param::new(name, Some(index(id("Static"), id(kind))), None)
}

/// Builds a function definition
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    func: FunctionStmt,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: FunctionStmt {
                name: name.into(),
                params: Vec::new(),
                ret: None,
                suite: None,
                attrs: FunctionAttrs::default(),
                span: Span::default(),
            },
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.func.params.push(param);
        self
    }

    pub fn params(mut self, params: Vec<Param>) -> Self {
        self.func.params.extend(params);
        self
    }

    pub fn ret(mut self, ty: Expr) -> Self {
        self.func.ret = Some(ty);
        self
    }

    pub fn body(mut self, stmts: Vec<Stmt>) -> Self {
        self.func.suite = Some(suite(stmts));
        self
    }

    /// Marks the function as a builtin whose signature is trusted without a body
    pub fn builtin(mut self) -> Self {
        self.func.attrs.builtin = true;
        self
    }

    pub fn method_of(mut self, class: &str) -> Self {
        self.func.attrs.parent_class = Some(class.into());
        self
    }

    pub fn property_setter(mut self) -> Self {
        self.func.attrs.property_setter = true;
        self
    }

    pub fn no_argument_wrap(mut self) -> Self {
        self.func.attrs.no_argument_wrap = true;
        self
    }

    pub fn build(self) -> FunctionStmt {
        self.func
    }

    pub fn stmt(self) -> Stmt {
        stmt(StmtKind::Function(Arc::new(self.func)))
    }
}

/// Builds a class definition
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassStmt,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassStmt {
                name: name.into(),
                params: Vec::new(),
                class_vars: Vec::new(),
                methods: Vec::new(),
                bases: Vec::new(),
                attrs: ClassAttrs::default(),
                span: Span::default(),
            },
        }
    }

    pub fn record(mut self) -> Self {
        self.class.attrs.record = true;
        self
    }

    /// Adds the methods to the already defined class of the same name
    pub fn extend(mut self) -> Self {
        self.class.attrs.extend = true;
        self
    }

    pub fn rtti(mut self) -> Self {
        self.class.attrs.rtti = true;
        self
    }

    pub fn generic(mut self, name: &str) -> Self {
        self.class.params.push(type_param(name));
        self
    }

    pub fn static_generic(mut self, name: &str, kind: &str) -> Self {
        self.class.params.push(static_param(name, kind));
        self
    }

    pub fn field(mut self, name: &str, ty: Expr) -> Self {
        self.class.params.push(Param::new(name, Some(ty), None));
        self
    }

    pub fn class_var(mut self, name: &str, value: Expr) -> Self {
        self.class.class_vars.push((name.into(), value));
        self
    }

    pub fn base(mut self, name: &str) -> Self {
        self.class.bases.push(name.into());
        self
    }

    /// Adds a method. The method name is given without the class prefix.
    pub fn method(mut self, method: FunctionBuilder) -> Self {
        let mut method = method.method_of(&self.class.name).build();
        let overloads = self.class.methods.iter().filter(|m| m.root_name().ends_with(&format!(".{}", method.name))).count();
        method.name = format!("{}.{}:{}", self.class.name, method.name, overloads).into();
        self.class.methods.push(method);
        self
    }

    pub fn build(self) -> ClassStmt {
        self.class
    }

    pub fn stmt(self) -> Stmt {
        stmt(StmtKind::Class(Arc::new(self.class)))
    }
}

/// `def name(...)`, numbered as the given overload
pub fn def(name: &str, overload: usize) -> FunctionBuilder {
    FunctionBuilder::new(&format!("{}:{}", name, overload))
}
