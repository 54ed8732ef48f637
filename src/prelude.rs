//! The builtin classes and functions every module is checked against
//!
//! Classes other code depends on are declared bare first and receive their methods through
//! `extend` blocks once every class their signatures mention exists.

use crate::ast::{
    build::{self, def, id, index, param, type_param, ClassBuilder, FunctionBuilder},
    BinOp,
    Expr,
    Param,
    Stmt,
};

/// The statements of the prelude, in the order they are checked
pub fn prelude_stmts() -> Vec<Stmt> {
    let mut stmts = Vec::new();

    for name in ["NoneType", "bool", "byte", "int", "float", "str", "pyobj", "ellipsis"] {
        stmts.push(ClassBuilder::new(name).record().stmt());
    }
    stmts.push(ClassBuilder::new("Ptr").record().generic("T").stmt());
    stmts.push(ClassBuilder::new("Int").record().static_generic("N", "int").stmt());

    stmts.push(bool_methods());
    stmts.push(ptr_methods());
    stmts.push(int_methods());
    stmts.push(float_methods());
    stmts.push(str_methods());
    stmts.push(pyobj_methods());

    stmts.push(optional_class());
    stmts.push(slice_class());
    stmts.push(generator_class());
    stmts.push(list_class());
    stmts.push(range_class());

    stmts.extend(builtin_functions());
    stmts
}

/// A builtin method taking `self` followed by the given parameters
fn method(name: &str, params: Vec<Param>, ret: Expr) -> FunctionBuilder {
    FunctionBuilder::new(name)
        .param(param("self", None))
        .params(params)
        .ret(ret)
        .builtin()
}

/// A builtin method of a class taking no `self`
fn static_method(name: &str, params: Vec<Param>, ret: Expr) -> FunctionBuilder {
    FunctionBuilder::new(name).params(params).ret(ret).builtin()
}

fn typed(name: &str, ty: &str) -> Param {
    param(name, Some(id(ty)))
}

fn generic_of(class: &str, arg: &str) -> Expr {
    index(id(class), id(arg))
}

/// Adds `__name__(self, other: operand) -> ret` for each name
fn binary_methods(mut class: ClassBuilder, names: &[&str], operand: &str, ret: &str) -> ClassBuilder {
    for name in names {
        class = class.method(method(&format!("__{}__", name), vec![typed("other", operand)], id(ret)));
    }
    class
}

const ARITHMETIC: &[&str] = &["add", "sub", "mul", "floordiv", "mod", "pow"];
const BITWISE: &[&str] = &["and", "or", "xor", "lshift", "rshift"];
const COMPARISONS: &[&str] = &["eq", "ne", "lt", "le", "gt", "ge"];

fn bool_methods() -> Stmt {
    let class = ClassBuilder::new("bool").extend()
        .method(static_method("__new__", vec![typed("x", "int")], id("bool")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__invert__", Vec::new(), id("bool")));
    binary_methods(class, &["eq", "ne", "and", "or", "xor"], "bool", "bool").stmt()
}

fn ptr_methods() -> Stmt {
    ClassBuilder::new("Ptr").extend()
        .method(static_method("__new__", vec![typed("len", "int")], generic_of("Ptr", "T")))
        .method(method("__getitem__", vec![typed("index", "int")], id("T")))
        .method(method("__setitem__", vec![typed("index", "int"), typed("value", "T")], id("NoneType")))
        .method(method("__eq__", vec![param("other", Some(generic_of("Ptr", "T")))], id("bool")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .stmt()
}

fn int_methods() -> Stmt {
    let mut class = ClassBuilder::new("int").extend()
        .method(static_method("__new__", vec![typed("x", "float")], id("int")))
        .method(static_method("__new__", vec![typed("x", "bool")], id("int")));
    class = binary_methods(class, ARITHMETIC, "int", "int");
    class = binary_methods(class, BITWISE, "int", "int");
    class = binary_methods(class, COMPARISONS, "int", "bool");
    class = class
        .method(method("__truediv__", vec![typed("other", "int")], id("float")))
        .method(method("__neg__", Vec::new(), id("int")))
        .method(method("__pos__", Vec::new(), id("int")))
        .method(method("__invert__", Vec::new(), id("int")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__to_py__", Vec::new(), id("pyobj")))
        .method(static_method("__from_py__", vec![typed("obj", "pyobj")], id("int")));

    for atomic in ["add", "min", "max", "xchg"] {
        let params = vec![param("ptr", Some(generic_of("Ptr", "int"))), typed("value", "int")];
        class = class.method(static_method(&format!("__atomic_{}__", atomic), params, id("int")));
    }
    class.stmt()
}

fn float_methods() -> Stmt {
    let mut class = ClassBuilder::new("float").extend()
        .method(static_method("__new__", vec![typed("x", "int")], id("float")));
    class = binary_methods(class, &["add", "sub", "mul", "truediv", "floordiv", "mod", "pow"], "float", "float");
    class = binary_methods(class, COMPARISONS, "float", "bool");
    class = binary_methods(class, &["radd", "rsub", "rmul", "rtruediv"], "int", "float");
    class
        .method(method("__neg__", Vec::new(), id("float")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__to_py__", Vec::new(), id("pyobj")))
        .stmt()
}

fn str_methods() -> Stmt {
    let class = ClassBuilder::new("str").extend()
        .method(method("__len__", Vec::new(), id("int")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__getitem__", vec![typed("index", "int")], id("str")))
        .method(method("__contains__", vec![typed("other", "str")], id("bool")))
        .method(method("__to_py__", Vec::new(), id("pyobj")))
        .method(static_method("__from_py__", vec![typed("obj", "pyobj")], id("str")));
    let class = binary_methods(class, &["add"], "str", "str");
    binary_methods(class, &["eq", "ne", "lt"], "str", "bool").stmt()
}

fn pyobj_methods() -> Stmt {
    ClassBuilder::new("pyobj").extend()
        .method(method("_getattr", vec![typed("name", "str")], id("pyobj")))
        .method(method("__call__", vec![param("*args", None)], id("pyobj")))
        .method(method("__add__", vec![typed("other", "pyobj")], id("pyobj")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__to_py__", Vec::new(), id("pyobj")))
        .stmt()
}

fn optional_class() -> Stmt {
    let optional = generic_of("Optional", "T");
    ClassBuilder::new("Optional").record().generic("T")
        .method(static_method("__new__", Vec::new(), optional.clone()))
        .method(static_method("__new__", vec![typed("value", "T")], optional.clone()))
        .method(method("__has__", Vec::new(), id("bool")))
        .method(method("__bool__", Vec::new(), id("bool")))
        .method(method("__is_optional__", vec![param("other", Some(optional))], id("bool")))
        .stmt()
}

fn generator_class() -> Stmt {
    ClassBuilder::new("Generator").record().generic("T")
        .method(method("__iter__", Vec::new(), generic_of("Generator", "T")))
        .method(method("__next__", Vec::new(), id("T")))
        .method(method("done", Vec::new(), id("bool")))
        .stmt()
}

fn list_class() -> Stmt {
    let len = build::dot(id("self"), "len");
    ClassBuilder::new("List").generic("T")
        .field("arr", generic_of("Ptr", "T"))
        .field("len", id("int"))
        .method(method("__init__", Vec::new(), id("NoneType")))
        .method(method("append", vec![typed("value", "T")], id("NoneType")))
        .method(method("__getitem__", vec![typed("index", "int")], id("T")))
        .method(method("__getitem__", vec![typed("index", "Slice")], generic_of("List", "T")))
        .method(method("__setitem__", vec![typed("index", "int"), typed("value", "T")], id("NoneType")))
        .method(method("__delitem__", vec![typed("index", "int")], id("NoneType")))
        .method(method("__contains__", vec![typed("value", "T")], id("bool")))
        .method(method("__iter__", Vec::new(), generic_of("Generator", "T")))
        .method(FunctionBuilder::new("__len__")
            .param(param("self", None))
            .ret(id("int"))
            .body(vec![build::ret(len.clone())]))
        .method(FunctionBuilder::new("__bool__")
            .param(param("self", None))
            .ret(id("bool"))
            .body(vec![build::ret(build::binary(BinOp::Ne, len, build::int(0)))]))
        .stmt()
}

fn range_class() -> Stmt {
    ClassBuilder::new("range").record()
        .field("start", id("int"))
        .field("stop", id("int"))
        .field("step", id("int"))
        .method(static_method("__new__", vec![typed("stop", "int")], id("range")))
        .method(static_method("__new__", vec![typed("start", "int"), typed("stop", "int")], id("range")))
        .method(static_method("__new__", vec![typed("start", "int"), typed("stop", "int"), typed("step", "int")], id("range")))
        .method(method("__iter__", Vec::new(), generic_of("Generator", "int")))
        .stmt()
}

fn slice_class() -> Stmt {
    let optional_int = || generic_of("Optional", "int");
    ClassBuilder::new("Slice").record()
        .field("start", optional_int())
        .field("stop", optional_int())
        .field("step", optional_int())
        .stmt()
}

fn builtin_functions() -> Vec<Stmt> {
    let builtin = |name: &str, params: Vec<Param>, ret: Expr| def(name, 0).params(params).ret(ret).builtin().stmt();

    let mut stmts = vec![
        builtin("unwrap", vec![param("opt", Some(generic_of("Optional", "T"))), type_param("T")], id("T")),
        builtin("__new_union__", vec![typed("value", "T"), type_param("U"), type_param("T")], id("U")),
        builtin("__get_union__", vec![typed("value", "U"), type_param("T"), type_param("U")], id("T")),
        builtin("__union_get_tag__", vec![typed("value", "U"), type_param("U")], id("int")),
        builtin("__class_super__", vec![typed("obj", "T"), type_param("B"), type_param("T")], id("B")),
        builtin("__ptr_of__", vec![typed("value", "T"), type_param("T")], generic_of("Ptr", "T")),
        builtin("__py_isinstance__", vec![typed("obj", "pyobj"), typed("class", "pyobj")], id("bool")),
    ];

    stmts.push(def("len", 0)
        .param(param("x", None))
        .ret(id("int"))
        .body(vec![build::ret(build::call(build::dot(id("x"), "__len__"), Vec::new()))])
        .stmt());

    for (name, op) in [("min", BinOp::Lt), ("max", BinOp::Gt)] {
        let pick = build::if_expr(build::binary(op, id("a"), id("b")), id("a"), id("b"));
        stmts.push(def(name, 0)
            .params(vec![param("a", None), param("b", None)])
            .body(vec![build::ret(pick)])
            .stmt());
    }

    stmts
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ast::StmtKind;

    #[test]
    fn bases_are_declared_before_their_extensions() {
        let stmts = prelude_stmts();
        let position = |name: &str, extend: bool| stmts.iter().position(|stmt| match &stmt.kind {
            StmtKind::Class(class) => &*class.name == name && class.attrs.extend == extend,
            _ => false,
        });

        for name in ["bool", "Ptr", "int", "float", "str", "pyobj"] {
            let declared = position(name, false).expect("class is declared");
            let extended = position(name, true).expect("class is extended");
            assert!(declared < extended, "`{}` is extended before it is declared", name);
        }
        assert!(position("Generator", false) < position("List", false));
    }

    #[test]
    fn overloads_are_numbered_in_order() {
        let stmts = prelude_stmts();
        let range = stmts.iter().find_map(|stmt| match &stmt.kind {
            StmtKind::Class(class) if &*class.name == "range" => Some(class.clone()),
            _ => None,
        }).expect("range is declared");
        let names: Vec<_> = range.methods.iter().map(|method| method.name.to_string()).collect();
        assert_eq!(names, ["range.__new__:0", "range.__new__:1", "range.__new__:2", "range.__iter__:0"]);
    }
}
