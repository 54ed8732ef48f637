use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;

use tyelab::{
    ast::{build::*, root_name, AssignStmt, BinOp, Expr, ExprKind, StaticValue, Stmt, StmtKind, UpdateMode},
    check_module,
    diagnostics::{BytesWriter, Diagnostics},
    session::Session,
    source_files::{SourceFiles, Span},
    tycheck::ErrorKind,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn diagnostics() -> Diagnostics {
    Diagnostics::with_writer(Arc::new(RwLock::new(SourceFiles::default())), BytesWriter::default())
}

/// Checks a module in a fresh session
fn check(stmts: Vec<Stmt>) -> (Session, Diagnostics, Option<Stmt>) {
    check_in(Session::default(), stmts)
}

fn check_in(mut sess: Session, stmts: Vec<Stmt>) -> (Session, Diagnostics, Option<Stmt>) {
    init_logging();
    let diag = diagnostics();
    let module = check_module(&mut sess, stmts, &diag).ok();
    (sess, diag, module)
}

/// Finds the assignment to a program variable, looking through the suites the checker adds
fn find_assign<'a>(stmt: &'a Stmt, name: &str) -> Option<&'a AssignStmt> {
    match &stmt.kind {
        StmtKind::Assign(assign) => {
            let canonical = assign.lhs.id()?;
            (canonical.split('.').next() == Some(name)).then(|| &**assign)
        },
        StmtKind::Suite(stmts) => stmts.iter().find_map(|stmt| find_assign(stmt, name)),
        _ => None,
    }
}

fn assigned<'a>(module: &'a Stmt, name: &str) -> &'a Expr {
    find_assign(module, name)
        .and_then(|assign| assign.rhs.as_ref())
        .unwrap_or_else(|| panic!("no assignment to `{}`", name))
}

fn type_of(sess: &Session, module: &Stmt, name: &str) -> String {
    sess.types.debug_string(assigned(module, name).ty())
}

/// The function a call ends up calling, looking through the statements wrapped around it
fn callee(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Call(call) => call.expr.id().map(|name| root_name(name).to_string()),
        ExprKind::StmtExpr(stmt_expr) => callee(&stmt_expr.expr),
        _ => None,
    }
}

/// The value of the first rebinding of an already bound variable
fn find_update<'a>(stmt: &'a Stmt, name: &str) -> Option<&'a Expr> {
    match &stmt.kind {
        StmtKind::Assign(assign) if assign.update == UpdateMode::Update && assign.lhs.is_id(name) => assign.rhs.as_ref(),
        StmtKind::Suite(stmts) => stmts.iter().find_map(|stmt| find_update(stmt, name)),
        _ => None,
    }
}

fn call_args_of(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Call(call) => call.args.iter().map(|arg| &arg.value).collect(),
        ExprKind::StmtExpr(stmt_expr) => call_args_of(&stmt_expr.expr),
        _ => Vec::new(),
    }
}

fn any_stmt(stmt: &Stmt, matches: &dyn Fn(&Stmt) -> bool) -> bool {
    if matches(stmt) {
        return true;
    }
    match &stmt.kind {
        StmtKind::Suite(stmts) => stmts.iter().any(|stmt| any_stmt(stmt, matches)),
        StmtKind::While(while_stmt) => any_stmt(&while_stmt.suite, matches),
        StmtKind::For(for_stmt) => any_stmt(&for_stmt.suite, matches),
        StmtKind::If(if_stmt) => {
            any_stmt(&if_stmt.if_suite, matches) || if_stmt.else_suite.as_ref().map_or(false, |suite| any_stmt(suite, matches))
        },
        _ => false,
    }
}

/// True if some expression statement calls the given function
fn calls(module: &Stmt, function: &str) -> bool {
    any_stmt(module, &|stmt| match &stmt.kind {
        StmtKind::Expr(expr) => callee(expr).as_deref() == Some(function),
        _ => false,
    })
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(stmt.kind, StmtKind::For(_) | StmtKind::While(_))
}

fn optional_int() -> Expr {
    index(id("Optional"), id("int"))
}

fn static_int() -> Expr {
    index(id("Static"), id("int"))
}

fn method(name: &str) -> FunctionBuilder {
    FunctionBuilder::new(name).param(param("self", None))
}

fn ident() -> Stmt {
    def("ident", 0)
        .param(param("x", None))
        .body(vec![ret(id("x"))])
        .stmt()
}

#[test]
fn static_arithmetic_folds() {
    let (sess, diag, module) = check(vec![
        assign("x", binary(BinOp::Add, int(3), int(4))),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert!(module.done);
    assert_eq!(assigned(&module, "x").static_value, StaticValue::Int(Some(7)));
    assert_eq!(type_of(&sess, &module, "x"), "int");
}

#[test]
fn unknown_names_are_reported() {
    let (_, diag, module) = check(vec![
        expr_stmt(id("missing")),
    ]);

    assert!(module.is_none());
    assert_eq!(diag.error_kinds(), vec![ErrorKind::IdNotFound("missing".to_string())]);
}

#[test]
fn generic_functions_realize_per_argument_type() {
    let (sess, diag, module) = check(vec![
        ident(),
        assign("a", call(id("ident"), vec![int(1)])),
        assign("b", call(id("ident"), vec![string("s")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "a"), "int");
    assert_eq!(type_of(&sess, &module, "b"), "str");
    assert!(sess.function_realization("ident:0[int]").is_some());
    assert!(sess.function_realization("ident:0[str]").is_some());
}

#[test]
fn each_realization_is_produced_once() {
    let (sess, diag, _) = check(vec![
        ident(),
        assign("a", call(id("ident"), vec![int(1)])),
        assign("b", call(id("ident"), vec![int(2)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let count = sess.realizations().iter().filter(|realization| realization.name == "ident:0[int]").count();
    assert_eq!(count, 1);
}

#[test]
fn last_matching_overload_wins() {
    let (sess, diag, module) = check(vec![
        def("f", 0).param(param("x", Some(id("int")))).ret(id("int")).body(vec![ret(id("x"))]).stmt(),
        def("f", 1).param(param("x", Some(id("int")))).ret(id("str")).body(vec![ret(string("x"))]).stmt(),
        assign("y", call(id("f"), vec![int(1)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "y"), "str");
}

#[test]
fn none_becomes_an_empty_optional() {
    let (sess, diag, module) = check(vec![
        assign_typed("x", optional_int(), none()),
        assign_typed("y", optional_int(), int(5)),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "x"), "Optional[int]");
    assert_eq!(type_of(&sess, &module, "y"), "Optional[int]");
}

#[test]
fn isinstance_is_decided_statically() {
    let (_, diag, module) = check(vec![
        assign("yes", call(id("isinstance"), vec![int(1), id("int")])),
        assign("no", call(id("isinstance"), vec![string("s"), id("int")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(assigned(&module, "yes").static_value, StaticValue::Int(Some(1)));
    assert_eq!(assigned(&module, "no").static_value, StaticValue::Int(Some(0)));
}

#[test]
fn recursive_defaults_are_rejected() {
    let (_, diag, _) = check(vec![
        def("f", 0)
            .param(param_default("x", None, call(id("f"), Vec::new())))
            .body(vec![ret(id("x"))])
            .stmt(),
        expr_stmt(call(id("f"), Vec::new())),
    ]);

    assert_eq!(diag.error_kinds(), vec![ErrorKind::CallRecursiveDefault("f".to_string())]);
}

#[test]
fn errors_do_not_stop_other_statements() {
    let (sess, diag, _) = check(vec![
        ident(),
        expr_stmt(id("missing")),
        assign("a", call(id("ident"), vec![int(1)])),
    ]);

    assert_eq!(diag.error_kinds(), vec![ErrorKind::IdNotFound("missing".to_string())]);
    assert!(sess.function_realization("ident:0[int]").is_some());
}

#[test]
fn sessions_check_independently_in_parallel() {
    let program = || vec![
        ident(),
        assign("a", call(id("ident"), vec![int(1)])),
        assign("b", call(id("ident"), vec![float(1.5)])),
    ];

    let results: Vec<Vec<String>> = (0..8).into_par_iter().map(|_| {
        let mut sess = Session::default();
        let diag = diagnostics();
        check_module(&mut sess, program(), &diag).expect("module checks");
        let mut names: Vec<_> = sess.realizations().iter().map(|realization| realization.name.clone()).collect();
        names.sort();
        names
    }).collect();

    assert!(results[0].iter().any(|name| name == "ident:0[float]"));
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn isinstance_on_a_union_checks_its_members() {
    let union = || index(id("Union"), tuple(vec![id("int"), id("str")]));
    let (sess, diag, module) = check(vec![
        assign_typed("u", union(), int(1)),
        assign("is_int", call(id("isinstance"), vec![id("u"), id("int")])),
        assign("is_float", call(id("isinstance"), vec![id("u"), id("float")])),
        assign("built_int", call(id("isinstance"), vec![call(union(), vec![int(1)]), id("int")])),
        assign("built_str", call(id("isinstance"), vec![call(union(), vec![int(1)]), id("str")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "is_int"), "bool");
    assert_eq!(assigned(&module, "is_float").static_value, StaticValue::Int(Some(0)));

    // The member is only known at runtime, so the tag the value holds is compared
    let is_int = assigned(&module, "is_int");
    assert_eq!(callee(is_int).as_deref(), Some("int.__eq__"));
    let compared = call_args_of(is_int);
    assert_eq!(callee(compared[0]).as_deref(), Some("__union_get_tag__"));

    // A union built on the spot holds the member it was built from
    assert_eq!(assigned(&module, "built_int").static_value, StaticValue::Int(Some(1)));
    assert_eq!(assigned(&module, "built_str").static_value, StaticValue::Int(Some(0)));
}

#[test]
fn partial_calls_complete_like_direct_calls() {
    let add3 = def("add3", 0)
        .params(vec![param("a", Some(id("int"))), param("b", Some(id("int"))), param("c", Some(id("int")))])
        .ret(id("int"))
        .body(vec![ret(id("a"))])
        .stmt();
    let (sess, diag, module) = check(vec![
        add3,
        assign("direct", call(id("add3"), vec![int(1), int(2), int(3)])),
        assign("p", call(id("add3"), vec![int(1), ellipsis()])),
        assign("via", call(id("p"), vec![int(2), int(3)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "direct"), type_of(&sess, &module, "via"));
}

#[test]
fn partials_of_star_functions_extend_the_stored_arguments() {
    let (sess, diag, module) = check(vec![
        def("f", 0)
            .params(vec![param("a", Some(id("int"))), param("*args", None)])
            .body(vec![ret(id("a"))])
            .stmt(),
        assign("p", call(id("f"), vec![int(1), ellipsis()])),
        assign("r", call(id("p"), vec![int(2), int(3)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "r"), "int");
}

#[test]
fn is_none_checks_whether_an_optional_is_empty() {
    let (sess, diag, module) = check(vec![
        assign_typed("x", optional_int(), int(5)),
        assign("empty", binary(BinOp::Is, id("x"), none())),
        assign("flipped", binary(BinOp::Is, none(), id("x"))),
        assign("int_is_none", binary(BinOp::Is, int(5), none())),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "empty"), "bool");
    let empty = assigned(&module, "empty");
    assert_eq!(callee(empty).as_deref(), Some("bool.__invert__"));
    assert_eq!(callee(call_args_of(empty)[0]).as_deref(), Some("Optional.__has__"));
    assert_eq!(callee(assigned(&module, "flipped")).as_deref(), Some("bool.__invert__"));
    assert_eq!(assigned(&module, "int_is_none").static_value, StaticValue::Int(Some(0)));
}

#[test]
fn is_compares_types_and_optionals() {
    let (_, diag, module) = check(vec![
        assign_typed("x", optional_int(), int(5)),
        assign("both_none", binary(BinOp::Is, none(), none())),
        assign("same_type", binary(BinOp::Is, id("int"), id("int"))),
        assign("other_type", binary(BinOp::Is, id("int"), id("str"))),
        assign("against_optional", binary(BinOp::Is, int(5), id("x"))),
        assign("not_same", binary(BinOp::IsNot, id("int"), id("str"))),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(assigned(&module, "both_none").static_value, StaticValue::Int(Some(1)));
    assert_eq!(assigned(&module, "same_type").static_value, StaticValue::Int(Some(1)));
    assert_eq!(assigned(&module, "other_type").static_value, StaticValue::Int(Some(0)));
    assert_eq!(callee(assigned(&module, "against_optional")).as_deref(), Some("Optional.__is_optional__"));
    assert_eq!(assigned(&module, "not_same").static_value, StaticValue::Int(Some(1)));
}

#[test]
fn static_enumerate_keeps_indices_static() {
    let pattern = tuple(vec![id("i"), id("x")]);
    let (_, diag, module) = check(vec![
        assign("t", tuple(vec![int(1), string("a")])),
        for_pattern(pattern, call(id("staticenumerate"), vec![id("t")]), vec![
            assign_typed("s", static_int(), id("i")),
        ], None),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert!(!any_stmt(&module.expect("module checks"), &is_loop));
}

#[test]
fn static_loops_honor_break_and_continue() {
    let (_, diag, module) = check(vec![
        assign("total", int(0)),
        for_loop("i", call(id("staticrange"), vec![int(4)]), vec![
            if_stmt(binary(BinOp::Eq, id("i"), int(1)), vec![cont()], None),
            if_stmt(binary(BinOp::Eq, id("i"), int(3)), vec![brk()], None),
            update("total", binary(BinOp::Add, id("total"), id("i"))),
        ], None),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    // Each iteration runs inside a one-shot loop so that the exits keep working
    assert!(any_stmt(&module, &|stmt| matches!(stmt.kind, StmtKind::While(_))));
    assert!(!any_stmt(&module, &|stmt| matches!(stmt.kind, StmtKind::For(_))));
}

#[test]
fn only_heterogeneous_tuples_are_unrolled() {
    let (_, diag, module) = check(vec![
        assign("same", tuple(vec![int(1), int(2)])),
        for_loop("x", id("same"), vec![expr_stmt(id("x"))], None),
    ]);
    assert_eq!(diag.emitted_errors(), 0);
    assert!(any_stmt(&module.expect("module checks"), &|stmt| matches!(stmt.kind, StmtKind::For(_))));

    let (_, diag, module) = check(vec![
        assign("mixed", tuple(vec![int(1), string("a")])),
        for_loop("x", id("mixed"), vec![expr_stmt(id("x"))], None),
    ]);
    assert_eq!(diag.emitted_errors(), 0);
    assert!(!any_stmt(&module.expect("module checks"), &is_loop));
}

#[test]
fn tuples_are_indexed_and_sliced_statically() {
    let (sess, diag, module) = check(vec![
        assign("t", tuple(vec![int(1), string("a"), float(2.5)])),
        assign("second", index(id("t"), int(1))),
        assign("last", index(id("t"), int(-1))),
        assign("front", index(id("t"), slice(None, Some(int(2)), None))),
        assign("huge_step", index(id("t"), slice(Some(int(1)), None, Some(int_lit("9223372036854775807"))))),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "second"), "str");
    assert_eq!(type_of(&sess, &module, "last"), "float");
    assert_eq!(type_of(&sess, &module, "front"), "Tuple[int,str]");
    assert_eq!(type_of(&sess, &module, "huge_step"), "Tuple[str]");

    let (_, diag, _) = check(vec![
        assign("t", tuple(vec![int(1), string("a")])),
        assign("missing", index(id("t"), int(5))),
    ]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::TupleRangeBounds(2, 5)]);
}

#[test]
fn isinstance_of_no_types_is_false_at_the_call() {
    let at = Span::new(3, 20);
    let (_, diag, module) = check(vec![
        assign("none_of", call(id("isinstance"), vec![int(1), tuple(Vec::new())]).at(at)),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    let none_of = assigned(&module, "none_of");
    assert_eq!(none_of.static_value, StaticValue::Int(Some(0)));
    assert_eq!(none_of.span, at);
}

#[test]
fn isinstance_defers_python_objects_to_runtime() {
    let to_py = |value: Expr| call(dot(value, "__to_py__"), Vec::new());
    let (_, diag, module) = check(vec![
        assign("obj", to_py(int(1))),
        assign("class", to_py(int(2))),
        assign("dynamic", call(id("isinstance"), vec![id("obj"), id("class")])),
        assign("native", call(id("isinstance"), vec![int(1), id("class")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(callee(assigned(&module, "dynamic")).as_deref(), Some("__py_isinstance__"));
    assert_eq!(assigned(&module, "native").static_value, StaticValue::Int(Some(0)));

    let (_, diag, _) = check(vec![
        assign("value", int(1)),
        assign("bad", call(id("isinstance"), vec![int(1), id("value")])),
    ]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::ExpectedType("int".to_string())]);
}

#[test]
fn staticlen_counts_union_members() {
    let union = index(id("Union"), tuple(vec![id("int"), id("str")]));
    let (_, diag, module) = check(vec![
        assign_typed("u", union, int(1)),
        assign("n", call(id("staticlen"), vec![id("u")])),
        assign("m", call(id("staticlen"), vec![tuple(vec![int(1), int(2), int(3)])])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(assigned(&module, "n").static_value, StaticValue::Int(Some(2)));
    assert_eq!(assigned(&module, "m").static_value, StaticValue::Int(Some(3)));
}

#[test]
fn operators_fall_back_to_reflected_magic() {
    let (sess, diag, module) = check(vec![
        assign("f", binary(BinOp::Add, int(1), float(2.0))),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "f"), "float");
    assert_eq!(callee(assigned(&module, "f")).as_deref(), Some("float.__radd__"));
}

#[test]
fn in_place_operators_prefer_in_place_magic() {
    let counter = ClassBuilder::new("Counter")
        .field("n", id("int"))
        .method(method("__iadd__")
            .param(param("other", Some(id("int"))))
            .ret(id("Counter"))
            .body(vec![
                assign_member(id("self"), "n", binary(BinOp::Add, dot(id("self"), "n"), id("other"))),
                ret(id("self")),
            ]))
        .stmt();
    let (sess, diag, module) = check(vec![
        counter,
        assign("c", call(id("Counter"), vec![int(0)])),
        update("c", binary_in_place(BinOp::Add, id("c"), int(1))),
        assign("x", int(1)),
        update("x", binary_in_place(BinOp::Add, id("x"), int(2))),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(find_update(&module, "c").and_then(callee).as_deref(), Some("Counter.__iadd__"));
    // Without an in-place magic the forward one is used
    assert_eq!(find_update(&module, "x").and_then(callee).as_deref(), Some("int.__add__"));
    assert_eq!(type_of(&sess, &module, "c"), "Counter");
}

#[test]
fn atomic_updates_use_atomic_magic() {
    let (_, diag, module) = check(vec![
        assign("n", int(0)),
        atomic_update("n", binary(BinOp::Add, id("n"), int(1))),
        atomic_update("n", call(id("max"), vec![id("n"), int(5)])),
        atomic_update("n", int(7)),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert!(calls(&module, "int.__atomic_add__"));
    assert!(calls(&module, "int.__atomic_max__"));
    assert!(calls(&module, "int.__atomic_xchg__"));
}

#[test]
fn tuple_targets_unpack_item_by_item() {
    let (sess, diag, module) = check(vec![
        assign_to(tuple(vec![id("a"), id("b")]), tuple(vec![int(1), string("s")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "a"), "int");
    assert_eq!(type_of(&sess, &module, "b"), "str");
}

#[test]
fn subclasses_inherit_fields_and_methods() {
    let (sess, diag, module) = check(vec![
        ClassBuilder::new("Animal")
            .field("legs", id("int"))
            .method(method("count").ret(id("int")).body(vec![ret(dot(id("self"), "legs"))]))
            .stmt(),
        ClassBuilder::new("Dog").base("Animal")
            .field("name", id("str"))
            .stmt(),
        assign("dog", call(id("Dog"), vec![int(4), string("rex")])),
        assign("legs", call(dot(id("dog"), "count"), Vec::new())),
        assign("name", dot(id("dog"), "name")),
        assign("is_animal", call(id("isinstance"), vec![id("dog"), id("Animal")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "legs"), "int");
    assert_eq!(type_of(&sess, &module, "name"), "str");
    assert_eq!(assigned(&module, "is_animal").static_value, StaticValue::Int(Some(1)));
    let mro: Vec<_> = sess.classes["Dog"].mro.iter().map(|class| class.to_string()).collect();
    assert_eq!(mro, ["Dog", "Animal"]);
}

#[test]
fn extend_blocks_add_methods_to_existing_classes() {
    let (sess, diag, module) = check(vec![
        ClassBuilder::new("Meters").record().field("value", id("int")).stmt(),
        ClassBuilder::new("Meters").extend()
            .method(method("doubled")
                .ret(id("int"))
                .body(vec![ret(binary(BinOp::Mul, dot(id("self"), "value"), int(2)))]))
            .stmt(),
        assign("m", call(id("Meters"), vec![int(3)])),
        assign("d", call(dot(id("m"), "doubled"), Vec::new())),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "d"), "int");
}

#[test]
fn imports_check_registered_modules_once() {
    let mut sess = Session::default();
    sess.add_module("geometry", vec![
        def("geometry.area", 0)
            .params(vec![param("w", Some(id("int"))), param("h", Some(id("int")))])
            .ret(id("int"))
            .body(vec![ret(binary(BinOp::Mul, id("w"), id("h")))])
            .stmt(),
    ]);
    let (sess, diag, module) = check_in(sess, vec![
        import("geometry"),
        import("geometry"),
        assign("a", call(id("geometry.area"), vec![int(2), int(3)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "a"), "int");
    let geometry = &sess.modules["geometry"];
    assert!(geometry.stmts.is_none());
    assert!(geometry.checked.is_some());

    let (_, diag, _) = check(vec![import("missing")]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::ImportNotFound("missing".to_string())]);
}

#[test]
fn del_removes_bindings_and_items() {
    let (_, diag, _) = check(vec![
        assign("x", int(1)),
        del(id("x")),
        expr_stmt(id("x")),
    ]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::IdNotFound("x".to_string())]);

    let (_, diag, module) = check(vec![
        assign("items", list(vec![int(1), int(2)])),
        del(index(id("items"), int(0))),
    ]);
    assert_eq!(diag.emitted_errors(), 0);
    assert!(calls(&module.expect("module checks"), "List.__delitem__"));
}

#[test]
fn chained_comparisons_evaluate_each_operand_once() {
    let (sess, diag, module) = check(vec![
        assign("x", int(5)),
        update("x", int(6)),
        assign("between", chain(int(1), vec![(BinOp::Le, id("x")), (BinOp::Lt, int(10))])),
        assign("folded", chain(int(1), vec![(BinOp::Lt, int(2))])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "between"), "bool");
    assert_eq!(assigned(&module, "folded").static_value, StaticValue::Int(Some(1)));
    let ExprKind::If(between) = &assigned(&module, "between").kind else { panic!("`and` lowers to a conditional") };
    assert_eq!(callee(&between.cond).as_deref(), Some("int.__le__"));
    assert_eq!(callee(&between.then_expr).as_deref(), Some("int.__lt__"));
}

#[test]
fn assignment_expressions_bind_and_evaluate_to_the_value() {
    let (sess, diag, module) = check(vec![
        assign("y", binary(BinOp::Add, walrus("n", int(4)), int(1))),
        assign("m", id("n")),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "y"), "int");
    assert_eq!(type_of(&sess, &module, "m"), "int");
}

fn pipeline_functions() -> Vec<Stmt> {
    vec![
        def("double", 0)
            .param(param("x", Some(id("int"))))
            .ret(id("int"))
            .body(vec![ret(binary(BinOp::Mul, id("x"), int(2)))])
            .stmt(),
        def("add", 0)
            .params(vec![param("a", Some(id("int"))), param("b", Some(id("int")))])
            .ret(id("int"))
            .body(vec![ret(binary(BinOp::Add, id("a"), id("b")))])
            .stmt(),
        def("show", 0)
            .param(param("x", Some(id("int"))))
            .ret(id("str"))
            .body(vec![ret(string("x"))])
            .stmt(),
    ]
}

#[test]
fn pipelines_pass_values_through_each_stage() {
    let mut stmts = pipeline_functions();
    stmts.extend([
        assign("hole", pipe(int(3), vec![id("double"), call(id("add"), vec![int(1), pipe_hole()])])),
        assign("first", pipe(int(3), vec![call(id("add"), vec![int(1)]), id("show")])),
    ]);
    let (sess, diag, module) = check(stmts);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "hole"), "int");
    assert_eq!(type_of(&sess, &module, "first"), "str");
}

#[test]
fn pipelines_run_the_rest_for_every_generated_item() {
    let mut stmts = pipeline_functions();
    let items = call(dot(call(id("range"), vec![int(3)]), "__iter__"), Vec::new());
    stmts.push(assign("each", pipe(items, vec![id("double"), id("show")])));
    let (sess, diag, module) = check(stmts);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "each"), "NoneType");
}

#[test]
fn realized_names_the_function_for_argument_types() {
    let (sess, diag, module) = check(vec![
        ident(),
        assign("f", call(id("__realized__"), vec![id("ident"), tuple(vec![int(1)])])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert!(type_of(&sess, &module, "f").ends_with("-> int"));
    assert!(assigned(&module, "f").done);
    assert!(sess.function_realization("ident:0[int]").is_some());

    let (_, diag, _) = check(vec![
        ClassBuilder::new("Box").field("value", id("int")).stmt(),
        assign("f", call(id("__realized__"), vec![id("Box"), tuple(vec![int(1)])])),
    ]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::CallRealizedFn]);
}

#[test]
fn static_print_waits_for_realized_arguments() {
    let (sess, diag, module) = check(vec![
        expr_stmt(call(id("__static_print__"), vec![int(1), id("str")])),
        assign("printed", call(id("__static_print__"), vec![float(1.5)])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    assert_eq!(type_of(&sess, &module.expect("module checks"), "printed"), "NoneType");
}

#[test]
fn runtime_type_information_is_inherited() {
    let (_, diag, module) = check(vec![
        ClassBuilder::new("Shape").rtti().stmt(),
        ClassBuilder::new("Square").base("Shape").field("side", id("int")).stmt(),
        ClassBuilder::new("Point").record().field("x", id("int")).stmt(),
        assign("square", call(id("__has_rtti__"), vec![id("Square")])),
        assign("point", call(id("__has_rtti__"), vec![id("Point")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(assigned(&module, "square").static_value, StaticValue::Int(Some(1)));
    assert_eq!(assigned(&module, "point").static_value, StaticValue::Int(Some(0)));

    let (_, diag, _) = check(vec![assign("bad", call(id("__has_rtti__"), vec![int(1)]))]);
    assert_eq!(diag.error_kinds(), vec![ErrorKind::ExpectedType("int".to_string())]);
}

#[test]
fn tuple_converts_classes_and_values() {
    let (sess, diag, module) = check(vec![
        ClassBuilder::new("Pair").record().field("x", id("int")).field("y", id("str")).stmt(),
        assign("PairTuple", call(id("tuple"), vec![id("Pair")])),
        assign("p", call(id("Pair"), vec![int(1), string("s")])),
        assign("t", call(id("tuple"), vec![id("p")])),
    ]);

    assert_eq!(diag.emitted_errors(), 0);
    let module = module.expect("module checks");
    assert_eq!(type_of(&sess, &module, "PairTuple"), "Tuple[int,str]");
    assert_eq!(type_of(&sess, &module, "t"), "Tuple[int,str]");
}
