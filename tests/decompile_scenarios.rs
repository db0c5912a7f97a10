//! End-to-end decompilation scenarios: version-specific bytecode is
//! assembled through the crate's own opcode tables and the emitted AST is
//! checked against the source structure it came from.

mod common;

use std::sync::Arc;

use common::{assemble, assemble_with_labels, encode_exception_table, CodeBuilder, Jump, Label, Op};
use pyrev::ast::{
    BinOp, BoolOpKind, CmpOp, ComprehensionKind, Expr, MatchPattern, Stmt,
};
use pyrev::{decompile_module, CodeObject, Const, Opcode, Version};

fn name(n: &str) -> Expr {
    Expr::Name(n.to_owned())
}

fn lit_int(value: i64) -> Expr {
    Expr::Literal(Const::Int(value))
}

fn lit_str(value: &str) -> Expr {
    Expr::Literal(Const::Str(value.to_owned()))
}

fn call0(func: &str) -> Expr {
    Expr::Call {
        func: Box::new(name(func)),
        args: Vec::new(),
        keywords: Vec::new(),
    }
}

/// Wrap a function code object in a module that defines it (3.3–3.10
/// MAKE_FUNCTION layout: code then qualname).
fn module_defining(version: Version, function: CodeObject) -> CodeObject {
    let fname = function.name.clone();
    let bytecode = assemble(
        version,
        &[
            Op(Opcode::LoadConst, 0),
            Op(Opcode::LoadConst, 1),
            Op(Opcode::MakeFunction, 0),
            Op(Opcode::StoreName, 0),
            Op(Opcode::LoadConst, 2),
            Op(Opcode::ReturnValue, 0),
        ],
    );
    CodeBuilder::new("<module>", version, bytecode)
        .consts(vec![
            Const::Code(Arc::new(function)),
            Const::Str(fname.clone()),
            Const::None,
        ])
        .names(&[&fname])
        .build()
}

fn function_body(module: &pyrev::Module) -> &[Stmt] {
    match &module.body[..] {
        [Stmt::FunctionDef { body, .. }] => body,
        other => panic!("expected a single function definition, got {other:?}"),
    }
}

#[test]
fn if_elif_else_with_returns() {
    // def f(x):
    //     if x == 0: return 'a'
    //     elif x == 1: return 'b'
    //     else: return 'c'
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadFast, 0),
            Op(Opcode::LoadConst, 1),
            Op(Opcode::CompareOp, 2), // ==
            Jump(Opcode::PopJumpIfFalse, "elif"),
            Op(Opcode::LoadConst, 2),
            Op(Opcode::ReturnValue, 0),
            Label("elif"),
            Op(Opcode::LoadFast, 0),
            Op(Opcode::LoadConst, 3),
            Op(Opcode::CompareOp, 2),
            Jump(Opcode::PopJumpIfFalse, "else"),
            Op(Opcode::LoadConst, 4),
            Op(Opcode::ReturnValue, 0),
            Label("else"),
            Op(Opcode::LoadConst, 5),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let function = CodeBuilder::new("f", v, bytecode)
        .consts(vec![
            Const::None,
            Const::Int(0),
            Const::Str("a".into()),
            Const::Int(1),
            Const::Str("b".into()),
            Const::Str("c".into()),
        ])
        .varnames(&["x"])
        .argcount(1)
        .build();
    let module = decompile_module(&module_defining(v, function)).unwrap();

    let body = function_body(&module);
    let [Stmt::If { test, body: then, orelse }] = body else {
        panic!("expected one if statement, got {body:?}");
    };
    assert_eq!(
        *test,
        Expr::Compare {
            left: Box::new(name("x")),
            ops: vec![CmpOp::Eq],
            comparators: vec![lit_int(0)],
        }
    );
    assert_eq!(then[..], [Stmt::Return(Some(lit_str("a")))]);
    // The elif is a nested if in the else slot.
    let [Stmt::If { test: elif_test, body: elif_then, orelse: elif_orelse }] = &orelse[..] else {
        panic!("expected elif, got {orelse:?}");
    };
    assert_eq!(
        *elif_test,
        Expr::Compare {
            left: Box::new(name("x")),
            ops: vec![CmpOp::Eq],
            comparators: vec![lit_int(1)],
        }
    );
    assert_eq!(elif_then[..], [Stmt::Return(Some(lit_str("b")))]);
    assert_eq!(elif_orelse[..], [Stmt::Return(Some(lit_str("c")))]);
}

#[test]
fn try_except_else_finally_3_11() {
    // try: f()
    // except ValueError as e: g(e)
    // else: h()
    // finally: k()
    let v = Version::V3_11;
    let (bytecode, labels) = assemble_with_labels(
        v,
        &[
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 0), // f
            Op(Opcode::Precall, 0),
            Op(Opcode::Call, 0),
            Op(Opcode::PopTop, 0),
            Label("else"),
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 1), // h
            Op(Opcode::Precall, 0),
            Op(Opcode::Call, 0),
            Op(Opcode::PopTop, 0),
            Label("fin_norm"),
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 2), // k
            Op(Opcode::Precall, 0),
            Op(Opcode::Call, 0),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
            Label("handler"),
            Op(Opcode::PushExcInfo, 0),
            Op(Opcode::LoadName, 3), // ValueError
            Op(Opcode::CheckExcMatch, 0),
            Jump(Opcode::PopJumpForwardIfFalse, "reraise"),
            Op(Opcode::StoreName, 4), // e
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 5), // g
            Op(Opcode::LoadName, 4),
            Op(Opcode::Precall, 1),
            Op(Opcode::Call, 1),
            Op(Opcode::PopTop, 0),
            Op(Opcode::PopExcept, 0),
            Label("h_end"),
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 2),
            Op(Opcode::Precall, 0),
            Op(Opcode::Call, 0),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
            Label("reraise"),
            Op(Opcode::Reraise, 0),
            Label("fin_handler"),
            Op(Opcode::PushExcInfo, 0),
            Op(Opcode::PushNull, 0),
            Op(Opcode::LoadName, 2),
            Op(Opcode::Precall, 0),
            Op(Opcode::Call, 0),
            Op(Opcode::PopTop, 0),
            Op(Opcode::Reraise, 0),
        ],
    );
    let table = encode_exception_table(&[
        (0, labels["else"], labels["handler"], 0, false),
        (0, labels["fin_norm"], labels["fin_handler"], 0, false),
        (labels["handler"], labels["h_end"], labels["fin_handler"], 1, false),
    ]);
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::None])
        .names(&["f", "h", "k", "ValueError", "e", "g"])
        .exceptiontable(table)
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::Try { body, handlers, orelse, finalbody }] = &module.body[..] else {
        panic!("expected a single try statement, got {:?}", module.body);
    };
    assert_eq!(body[..], [Stmt::Expr(call0("f"))]);
    assert_eq!(1, handlers.len());
    assert_eq!(handlers[0].typ, Some(name("ValueError")));
    assert_eq!(handlers[0].name.as_deref(), Some("e"));
    assert_eq!(
        handlers[0].body[..],
        [Stmt::Expr(Expr::Call {
            func: Box::new(name("g")),
            args: vec![name("e")],
            keywords: Vec::new(),
        })]
    );
    assert_eq!(orelse[..], [Stmt::Expr(call0("h"))]);
    assert_eq!(finalbody[..], [Stmt::Expr(call0("k"))]);
}

#[test]
fn inline_list_comprehension_3_12() {
    // def f():
    //     xs = [i * 2 for i in range(10) if i % 2]
    //     return xs
    let v = Version::V3_12;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::Resume, 0),
            Op(Opcode::LoadGlobal, 1), // range, with the push-null bit
            Op(Opcode::LoadConst, 1),  // 10
            Op(Opcode::Call, 1),
            Op(Opcode::GetIter, 0),
            Op(Opcode::LoadFastAndClear, 1), // spill i
            Op(Opcode::Swap, 2),
            Op(Opcode::BuildList, 0),
            Op(Opcode::Swap, 2),
            Label("for"),
            Jump(Opcode::ForIter, "end"),
            Op(Opcode::StoreFast, 1), // i
            Op(Opcode::LoadFast, 1),
            Op(Opcode::LoadConst, 2), // 2
            Op(Opcode::BinaryOp, 6),  // %
            Jump(Opcode::PopJumpIfFalse, "next"),
            Op(Opcode::LoadFast, 1),
            Op(Opcode::LoadConst, 2),
            Op(Opcode::BinaryOp, 5), // *
            Op(Opcode::ListAppend, 2),
            Label("next"),
            Jump(Opcode::JumpBackward, "for"),
            Label("end"),
            Op(Opcode::EndFor, 0),
            Op(Opcode::Swap, 2),
            Op(Opcode::StoreFast, 1), // restore i
            Op(Opcode::StoreFast, 0), // xs
            Op(Opcode::LoadFast, 0),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let function = CodeBuilder::new("f", v, bytecode)
        .consts(vec![Const::None, Const::Int(10), Const::Int(2)])
        .names(&["range"])
        .varnames(&["xs", "i"])
        .build();
    let module = decompile_module(&module_defining_3_12(v, function)).unwrap();

    let body = function_body(&module);
    let [Stmt::Assign { targets, value }, Stmt::Return(Some(returned))] = body else {
        panic!("expected assign + return, got {body:?}");
    };
    assert_eq!(targets[..], [name("xs")]);
    assert_eq!(*returned, name("xs"));
    let Expr::Comprehension { kind, element, value: dict_value, clauses } = value else {
        panic!("expected a comprehension, got {value:?}");
    };
    assert_eq!(*kind, ComprehensionKind::List);
    assert!(dict_value.is_none());
    assert_eq!(
        **element,
        Expr::BinOp {
            left: Box::new(name("i")),
            op: BinOp::Mult,
            right: Box::new(lit_int(2)),
        }
    );
    assert_eq!(1, clauses.len());
    assert_eq!(clauses[0].target, name("i"));
    assert_eq!(
        clauses[0].iter,
        Expr::Call {
            func: Box::new(name("range")),
            args: vec![lit_int(10)],
            keywords: Vec::new(),
        }
    );
    assert_eq!(
        clauses[0].ifs[..],
        [Expr::BinOp {
            left: Box::new(name("i")),
            op: BinOp::Mod,
            right: Box::new(lit_int(2)),
        }]
    );
}

/// 3.11+ MAKE_FUNCTION pops only the code object.
fn module_defining_3_12(version: Version, function: CodeObject) -> CodeObject {
    let fname = function.name.clone();
    let bytecode = assemble(
        version,
        &[
            Op(Opcode::LoadConst, 0),
            Op(Opcode::MakeFunction, 0),
            Op(Opcode::StoreName, 0),
            Op(Opcode::ReturnConst, 1),
        ],
    );
    CodeBuilder::new("<module>", version, bytecode)
        .consts(vec![Const::Code(Arc::new(function)), Const::None])
        .names(&[&fname])
        .build()
}

#[test]
fn match_literal_and_wildcard_3_10() {
    // def f(v):
    //     match v:
    //         case 0: return 'z'
    //         case _: return 'o'
    let v = Version::V3_10;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadFast, 0),
            Op(Opcode::DupTop, 0),
            Op(Opcode::LoadConst, 1), // 0
            Op(Opcode::CompareOp, 2), // ==
            Jump(Opcode::PopJumpIfFalse, "wild"),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadConst, 2), // 'z'
            Op(Opcode::ReturnValue, 0),
            Label("wild"),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadConst, 3), // 'o'
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let function = CodeBuilder::new("f", v, bytecode)
        .consts(vec![
            Const::None,
            Const::Int(0),
            Const::Str("z".into()),
            Const::Str("o".into()),
        ])
        .varnames(&["v"])
        .argcount(1)
        .build();
    let module = decompile_module(&module_defining(v, function)).unwrap();

    let body = function_body(&module);
    let [Stmt::Match { subject, cases }] = body else {
        panic!("expected a match statement, got {body:?}");
    };
    assert_eq!(*subject, name("v"));
    assert_eq!(2, cases.len());
    assert_eq!(cases[0].pattern, MatchPattern::Value(lit_int(0)));
    assert_eq!(cases[0].body[..], [Stmt::Return(Some(lit_str("z")))]);
    assert_eq!(
        cases[1].pattern,
        MatchPattern::As {
            pattern: None,
            name: None,
        }
    );
    assert_eq!(cases[1].body[..], [Stmt::Return(Some(lit_str("o")))]);
}

#[test]
fn chained_comparison_3_9() {
    // def f(x):
    //     if 0 < x < 100: return x
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadConst, 1), // 0
            Op(Opcode::LoadFast, 0),
            Op(Opcode::DupTop, 0),
            Op(Opcode::RotThree, 0),
            Op(Opcode::CompareOp, 0), // <
            Jump(Opcode::JumpIfFalseOrPop, "cleanup"),
            Op(Opcode::LoadConst, 2), // 100
            Op(Opcode::CompareOp, 0),
            Jump(Opcode::PopJumpIfFalse, "exit"),
            Op(Opcode::LoadFast, 0),
            Op(Opcode::ReturnValue, 0),
            Label("cleanup"),
            Op(Opcode::PopTop, 0),
            Jump(Opcode::JumpForward, "exit"),
            Label("exit"),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let function = CodeBuilder::new("f", v, bytecode)
        .consts(vec![Const::None, Const::Int(0), Const::Int(100)])
        .varnames(&["x"])
        .argcount(1)
        .build();
    let module = decompile_module(&module_defining(v, function)).unwrap();

    let body = function_body(&module);
    let [Stmt::If { test, body: then, orelse }] = body else {
        panic!("expected a single if, got {body:?}");
    };
    assert_eq!(
        *test,
        Expr::Compare {
            left: Box::new(lit_int(0)),
            ops: vec![CmpOp::Lt, CmpOp::Lt],
            comparators: vec![name("x"), lit_int(100)],
        }
    );
    assert_eq!(then[..], [Stmt::Return(Some(name("x")))]);
    assert!(orelse.is_empty());
}

#[test]
fn short_circuit_ternary_3_12() {
    // y = a if (b and c) or d else e
    let v = Version::V3_12;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadName, 1), // b
            Jump(Opcode::PopJumpIfFalse, "try_d"),
            Op(Opcode::LoadName, 2), // c
            Jump(Opcode::PopJumpIfTrue, "then"),
            Label("try_d"),
            Op(Opcode::LoadName, 3), // d
            Jump(Opcode::PopJumpIfFalse, "orelse"),
            Label("then"),
            Op(Opcode::LoadName, 0), // a
            Jump(Opcode::JumpForward, "merge"),
            Label("orelse"),
            Op(Opcode::LoadName, 4), // e
            Label("merge"),
            Op(Opcode::StoreName, 5), // y
            Op(Opcode::ReturnConst, 0),
        ],
    )
    .0;
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::None])
        .names(&["a", "b", "c", "d", "e", "y"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::Assign { targets, value }] = &module.body[..] else {
        panic!("expected a single assignment, got {:?}", module.body);
    };
    assert_eq!(targets[..], [name("y")]);
    let Expr::IfExp { test, body, orelse } = value else {
        panic!("expected a conditional expression, got {value:?}");
    };
    assert_eq!(**body, name("a"));
    assert_eq!(**orelse, name("e"));
    assert_eq!(
        **test,
        Expr::BoolOp {
            op: BoolOpKind::Or,
            values: vec![
                Expr::BoolOp {
                    op: BoolOpKind::And,
                    values: vec![name("b"), name("c")],
                },
                name("d"),
            ],
        }
    );
}

#[test]
fn while_loop_with_call_body() {
    // while x: f()
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Label("loop"),
            Op(Opcode::LoadName, 0), // x
            Jump(Opcode::PopJumpIfFalse, "exit"),
            Op(Opcode::LoadName, 1), // f
            Op(Opcode::CallFunction, 0),
            Op(Opcode::PopTop, 0),
            Jump(Opcode::JumpAbsolute, "loop"),
            Label("exit"),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::None])
        .names(&["x", "f"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::While { test, body, orelse }] = &module.body[..] else {
        panic!("expected a while loop, got {:?}", module.body);
    };
    assert_eq!(*test, name("x"));
    assert_eq!(body[..], [Stmt::Expr(call0("f"))]);
    assert!(orelse.is_empty());
}

#[test]
fn for_loop_over_iterable() {
    // for item in xs: f(item)
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadName, 0), // xs
            Op(Opcode::GetIter, 0),
            Label("for"),
            Jump(Opcode::ForIter, "exit"),
            Op(Opcode::StoreName, 1), // item
            Op(Opcode::LoadName, 2),  // f
            Op(Opcode::LoadName, 1),
            Op(Opcode::CallFunction, 1),
            Op(Opcode::PopTop, 0),
            Jump(Opcode::JumpAbsolute, "for"),
            Label("exit"),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::None])
        .names(&["xs", "item", "f"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::For { target, iter, body, orelse, is_async }] = &module.body[..] else {
        panic!("expected a for loop, got {:?}", module.body);
    };
    assert_eq!(*target, name("item"));
    assert_eq!(*iter, name("xs"));
    assert!(!*is_async);
    assert!(orelse.is_empty());
    assert_eq!(
        body[..],
        [Stmt::Expr(Expr::Call {
            func: Box::new(name("f")),
            args: vec![name("item")],
            keywords: Vec::new(),
        })]
    );
}

#[test]
fn imports_plain_and_from() {
    // import os
    // from sys import path as p
    let v = Version::V3_9;
    let bytecode = assemble(
        v,
        &[
            Op(Opcode::LoadConst, 0), // 0
            Op(Opcode::LoadConst, 1), // None
            Op(Opcode::ImportName, 0),
            Op(Opcode::StoreName, 0),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::LoadConst, 2), // ('path',)
            Op(Opcode::ImportName, 1),
            Op(Opcode::ImportFrom, 2),
            Op(Opcode::StoreName, 3),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadConst, 1),
            Op(Opcode::ReturnValue, 0),
        ],
    );
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![
            Const::Int(0),
            Const::None,
            Const::Tuple(vec![Const::Str("path".into())]),
        ])
        .names(&["os", "sys", "path", "p"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::Import { names }, Stmt::ImportFrom { module: from, names: from_names, level }] =
        &module.body[..]
    else {
        panic!("expected import + from-import, got {:?}", module.body);
    };
    assert_eq!(1, names.len());
    assert_eq!("os", names[0].name);
    assert!(names[0].asname.is_none());
    assert_eq!(from.as_deref(), Some("sys"));
    assert_eq!(0, *level);
    assert_eq!(1, from_names.len());
    assert_eq!("path", from_names[0].name);
    assert_eq!(from_names[0].asname.as_deref(), Some("p"));
}

#[test]
fn chain_and_augmented_assignment() {
    // a = b = 1
    // a += 2
    let v = Version::V3_9;
    let bytecode = assemble(
        v,
        &[
            Op(Opcode::LoadConst, 0),
            Op(Opcode::DupTop, 0),
            Op(Opcode::StoreName, 0),
            Op(Opcode::StoreName, 1),
            Op(Opcode::LoadName, 0),
            Op(Opcode::LoadConst, 1),
            Op(Opcode::InplaceAdd, 0),
            Op(Opcode::StoreName, 0),
            Op(Opcode::LoadConst, 2),
            Op(Opcode::ReturnValue, 0),
        ],
    );
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::Int(1), Const::Int(2), Const::None])
        .names(&["a", "b"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::Assign { targets, value }, Stmt::AugAssign { target, op, value: delta }] =
        &module.body[..]
    else {
        panic!("expected chain assign + aug assign, got {:?}", module.body);
    };
    assert_eq!(targets[..], [name("a"), name("b")]);
    assert_eq!(*value, lit_int(1));
    assert_eq!(*target, name("a"));
    assert_eq!(*op, BinOp::Add);
    assert_eq!(*delta, lit_int(2));
}

#[test]
fn with_statement_3_9() {
    // with cm: f()
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadName, 0), // cm
            Jump(Opcode::SetupWith, "cleanup"),
            Op(Opcode::PopTop, 0),
            Op(Opcode::LoadName, 1), // f
            Op(Opcode::CallFunction, 0),
            Op(Opcode::PopTop, 0),
            Op(Opcode::PopBlock, 0),
            // normal-path __exit__(None, None, None)
            Op(Opcode::LoadConst, 0),
            Op(Opcode::DupTop, 0),
            Op(Opcode::DupTop, 0),
            Op(Opcode::CallFunction, 3),
            Op(Opcode::PopTop, 0),
            Jump(Opcode::JumpForward, "after"),
            Label("cleanup"),
            Op(Opcode::WithExceptStart, 0),
            Jump(Opcode::PopJumpIfTrue, "silenced"),
            Op(Opcode::Reraise, 0),
            Label("silenced"),
            Op(Opcode::PopTop, 0),
            Label("after"),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::None])
        .names(&["cm", "f"])
        .build();
    let module = decompile_module(&code).unwrap();

    let [Stmt::With { items, body, is_async }] = &module.body[..] else {
        panic!("expected a with statement, got {:?}", module.body);
    };
    assert!(!*is_async);
    assert_eq!(1, items.len());
    assert_eq!(items[0].context, name("cm"));
    assert!(items[0].optional_vars.is_none());
    assert_eq!(body[..], [Stmt::Expr(call0("f"))]);
}

#[test]
fn decompilation_is_deterministic() {
    let v = Version::V3_9;
    let bytecode = assemble_with_labels(
        v,
        &[
            Op(Opcode::LoadName, 0),
            Jump(Opcode::PopJumpIfFalse, "else"),
            Op(Opcode::LoadConst, 0),
            Op(Opcode::StoreName, 1),
            Jump(Opcode::JumpForward, "end"),
            Label("else"),
            Op(Opcode::LoadConst, 1),
            Op(Opcode::StoreName, 1),
            Label("end"),
            Op(Opcode::LoadConst, 2),
            Op(Opcode::ReturnValue, 0),
        ],
    )
    .0;
    let code = CodeBuilder::new("<module>", v, bytecode)
        .consts(vec![Const::Int(1), Const::Int(2), Const::None])
        .names(&["cond", "x"])
        .build();
    let first = decompile_module(&code).unwrap();
    let second = decompile_module(&code).unwrap();
    assert_eq!(first, second);
}
