use super::push::*;
use super::*;
use crate::ast::*;
use crate::config::Config;
use crate::error::InnerError;
use crate::layout::{dat_pass1, dat_pass2, resolve_method_indexes, resolve_obj_indexes, resolve_vars};
use proptest::prelude::*;

fn method(name: &str, public: bool, body: Vec<AstStatement>) -> MethodDecl {
    MethodDecl {
        name: Ident::new(name),
        public,
        result: None,
        params: vec![],
        locals: vec![],
        body,
    }
}

fn stmt(kind: AstStatementKind) -> AstStatement {
    AstStatement::new(kind)
}

fn ret(e: AstExp) -> AstStatement {
    stmt(AstStatementKind::Return(Some(e)))
}

fn var(name: &str) -> AstExp {
    AstExp::new(AstExpKind::Variable {
        name: name.into(),
        size: None,
        indices: vec![],
    })
}

fn compile(source: SourceObject) -> crate::error::Result<GlobalTable> {
    let program = Program {
        root: source.file.clone(),
        objects: vec![source],
    };
    let config = Config::default();
    let mut globals = GlobalTable::register(program)?;
    let order = globals.order().to_vec();
    for &id in &order {
        resolve_obj_indexes(&mut globals, id)?;
        resolve_method_indexes(&mut globals, id);
    }
    for &id in &order {
        dat_pass1(&mut globals, id, &config)?;
        resolve_vars(&mut globals, id)?;
        dat_pass2(&mut globals, id, &config)?;
        compile_methods(&mut globals, id, &config)?;
    }
    Ok(globals)
}

fn object(methods: Vec<MethodDecl>) -> SourceObject {
    SourceObject {
        file: "main".into(),
        methods,
        ..Default::default()
    }
}

/// Bytes of the first method of a single-object program.
fn main_bytes(source: SourceObject) -> Vec<u8> {
    let globals = compile(source).unwrap();
    globals.table(0).methods[0].bytes.clone()
}

fn body_bytes(body: Vec<AstStatement>) -> Vec<u8> {
    main_bytes(object(vec![method("main", true, body)]))
}

fn compile_error(source: SourceObject) -> InnerError {
    compile(source).unwrap_err().inner().clone()
}

#[test]
fn test_return_folded_sum() {
    let sum = AstExp::binary(AstBinaryOp::Add, AstExp::int(1), AstExp::int(1));
    let expected = vec![PUSH_KP, 0x00, 0x33, 0x32];
    assert_eq!(expected, body_bytes(vec![ret(sum)]));
}

#[test]
fn test_fold_with_con() {
    let mut source = object(vec![method(
        "main",
        true,
        vec![ret(AstExp::binary(AstBinaryOp::Multiply, AstExp::id("X"), AstExp::int(3)))],
    )]);
    source.constants.push(ConDecl {
        name: Ident::new("X"),
        value: AstExp::int(10),
    });
    assert_eq!(vec![PUSH_K1, 30, 0x33, 0x32], main_bytes(source));
}

#[test]
fn test_failed_fold_emits_runtime_code() {
    let quotient = AstExp::binary(AstBinaryOp::Divide, AstExp::int(1), AstExp::int(0));
    let expected = vec![PUSH_ONE, PUSH_ZERO, 0xf6, 0x33, 0x32];
    assert_eq!(expected, body_bytes(vec![ret(quotient)]));
}

#[test]
fn test_local_is_not_folded() {
    let mut main = method(
        "main",
        true,
        vec![ret(AstExp::binary(AstBinaryOp::Add, AstExp::id("x"), AstExp::int(1)))],
    );
    main.locals.push(LocalDecl {
        name: Ident::new("x"),
        count: None,
    });
    // x sits after RESULT
    let expected = vec![0x64, PUSH_ONE, 0xec, 0x33, 0x32];
    assert_eq!(expected, main_bytes(object(vec![main])));
}

#[test]
fn test_assign_long_var() {
    let mut source = object(vec![method(
        "main",
        true,
        vec![stmt(AstStatementKind::Exp(AstExp::assign(var("a"), AstExp::int(5))))],
    )]);
    source.vars.push(VarDecl {
        name: Ident::new("a"),
        size: Size::Long,
        dims: vec![],
    });
    assert_eq!(vec![PUSH_K1, 5, 0x41, 0x32], main_bytes(source));
}

#[test]
fn test_post_increment_byte() {
    let bump = AstExp::unary(AstUnaryOp::PostIncrement, var("b"));
    let mut source = object(vec![method("main", true, vec![stmt(AstStatementKind::Exp(bump))])]);
    source.vars.push(VarDecl {
        name: Ident::new("b"),
        size: Size::Byte,
        dims: vec![],
    });
    assert_eq!(vec![0x8a, 0x00, 0x2a, 0x32], main_bytes(source));
}

#[test]
fn test_two_dimensional_subscript() {
    let cell = AstExp::new(AstExpKind::Variable {
        name: "a".into(),
        size: None,
        indices: vec![AstExp::int(1), AstExp::int(2)],
    });
    let mut source = object(vec![method(
        "main",
        true,
        vec![stmt(AstStatementKind::Exp(AstExp::assign(cell, AstExp::int(0))))],
    )]);
    source.vars.push(VarDecl {
        name: Ident::new("a"),
        size: Size::Long,
        dims: vec![AstExp::int(2), AstExp::int(3)],
    });
    // 1 * 3 + 2, then an indexed long pop
    assert_eq!(vec![PUSH_ZERO, PUSH_K1, 5, 0xd9, 0x00, 0x32], main_bytes(source));
}

#[test]
fn test_too_many_subscripts() {
    let cell = AstExp::new(AstExpKind::Variable {
        name: "a".into(),
        size: None,
        indices: vec![AstExp::int(1), AstExp::int(2)],
    });
    let mut source = object(vec![method("main", true, vec![ret(cell)])]);
    source.vars.push(VarDecl {
        name: Ident::new("a"),
        size: Size::Long,
        dims: vec![AstExp::int(4)],
    });
    assert_eq!(InnerError::context("too many subscripts"), compile_error(source));
}

#[test]
fn test_if_else() {
    let branch = stmt(AstStatementKind::If {
        negate: false,
        condition: AstExp::id("TRUE"),
        then: vec![ret(AstExp::int(1))],
        els: Some(vec![ret(AstExp::int(2))]),
    });
    let expected = vec![0x34, 0x0a, 0x04, 0x36, 0x33, 0x04, 0x03, 0x37, 0x00, 0x33, 0x32];
    assert_eq!(expected, body_bytes(vec![branch]));
}

#[test]
fn test_repeat_times_quit() {
    let repeat = stmt(AstStatementKind::Repeat(AstRepeat::Times {
        count: AstExp::int(3),
        body: vec![stmt(AstStatementKind::Quit)],
    }));
    let expected = vec![0x37, 0x21, 0x08, 0x04, 0x0b, 0x02, 0x09, 0x7c, 0x32];
    assert_eq!(expected, body_bytes(vec![repeat]));
}

#[test]
fn test_next_outside_loop() {
    let source = object(vec![method("main", true, vec![stmt(AstStatementKind::Next)])]);
    assert_eq!(InnerError::context("no enclosing REPEAT loop"), compile_error(source));
}

#[test]
fn test_case_single_arm() {
    let case = stmt(AstStatementKind::Case {
        value: AstExp::int(1),
        arms: vec![AstCaseArm {
            matches: vec![AstRange::Single(AstExp::int(1))],
            body: vec![ret(AstExp::int(2))],
        }],
        other: vec![],
    });
    // the end address is object relative: the method starts at 8
    let expected = vec![0x38, 0x13, 0x36, 0x36, 0x0d, 0x01, 0x0c, 0x37, 0x00, 0x33, 0x0c, 0x32];
    assert_eq!(expected, body_bytes(vec![case]));
}

#[test]
fn test_string_pool_follows_return() {
    let expected = vec![0x87, 0x80, 0x0d, 0x33, 0x32, b'h', b'i', 0];
    assert_eq!(expected, body_bytes(vec![ret(AstExp::new(AstExpKind::Str("hi".into())))]));
}

#[test]
fn test_local_call() {
    let source = object(vec![
        method("main", true, vec![stmt(AstStatementKind::Exp(AstExp::id("foo")))]),
        method("foo", false, vec![]),
    ]);
    let globals = compile(source).unwrap();
    assert_eq!(vec![0x01, 0x05, 0x02, 0x32], globals.table(0).methods[0].bytes);
    assert_eq!(vec![0x32], globals.table(0).methods[1].bytes);
}

#[test]
fn test_wrong_argument_count() {
    let call = AstExp::call("foo", vec![AstExp::int(1)]);
    let source = object(vec![
        method("main", true, vec![stmt(AstStatementKind::Exp(call))]),
        method("foo", false, vec![]),
    ]);
    let expected = InnerError::context("wrong number of arguments (1 instead of 0)");
    assert_eq!(expected, compile_error(source));
}

#[test]
fn test_unused_value() {
    let source = object(vec![method("main", true, vec![stmt(AstStatementKind::Exp(AstExp::int(1)))])]);
    assert_eq!(InnerError::context("expression value is not used"), compile_error(source));
}

#[test]
fn test_method_offsets_and_size() {
    let source = object(vec![
        method("helper", false, vec![ret(AstExp::int(7))]),
        method("main", true, vec![]),
    ]);
    let globals = compile(source).unwrap();
    let table = globals.table(0);
    // PUBs are laid out first, right after the two table entries
    assert_eq!(12, table.methods[1].offset);
    assert_eq!(13, table.methods[0].offset);
    assert_eq!(20, table.size_in_bytes);
}

#[test]
fn test_push_forms() {
    assert_eq!(vec![PUSH_MINUS_ONE], push_int(-1));
    assert_eq!(vec![PUSH_KP, 0x00], push_int(2));
    assert_eq!(vec![PUSH_KP, 0x27], push_int(255));
    assert_eq!(vec![PUSH_K1, 200], push_int(200));
    assert_eq!(vec![PUSH_KP, 0x67], push_int(-256));
    assert_eq!(vec![PUSH_K2, 0x01, 0x2b, BIT_NOT], push_int(-300));
    assert_eq!(vec![PUSH_K3, 0x01, 0x23, 0x45], push_int(0x12345));
    assert_eq!(vec![PUSH_K4, 0x12, 0x34, 0x56, 0x79], push_int(0x1234_5679));
}

#[test]
fn test_stack_op_forms() {
    assert_eq!(Ok(vec![0x48]), encode_stack_op(StackOp::Push, 4, Space::Var, 8, false));
    assert_eq!(Ok(vec![0xcd, 40]), encode_stack_op(StackOp::Pop, 4, Space::Local, 40, false));
    assert_eq!(Ok(vec![0x84, 0x80, 200]), encode_stack_op(StackOp::Push, 1, Space::Obj, 200, false));
    assert!(encode_stack_op(StackOp::Push, 4, Space::Var, 6, false).is_err());
    assert_eq!(0x80, encode_mem_op(StackOp::Push, 1, false));
    assert_eq!(0xd1, encode_mem_op(StackOp::Pop, 4, true));
}

fn minimal_len(v: i32) -> usize {
    let bits = v as u32;
    if (-1..=1).contains(&v) {
        1
    } else if kp(v).is_some() || bits <= 0xff {
        2
    } else if bits <= 0xffff || !bits <= 0xff {
        3
    } else if bits <= 0xff_ffff || !bits <= 0xffff {
        4
    } else {
        5
    }
}

proptest! {
    #[test]
    fn test_push_round_trip(v in any::<i32>()) {
        let bytes = push_int(v);
        prop_assert_eq!(Some((v, bytes.len())), decode_push(&bytes));
        prop_assert_eq!(minimal_len(v), bytes.len());
    }

    #[test]
    fn test_push_min_len(v in any::<i32>(), min_len in 1usize..=5) {
        let mut bytes = Vec::new();
        encode_push(v, min_len, &mut bytes);
        prop_assert!(bytes.len() >= min_len);
        prop_assert_eq!(Some((v, bytes.len())), decode_push(&bytes));
    }
}
