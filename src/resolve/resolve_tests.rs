use super::*;
use crate::ast::*;
use crate::error::InnerError;
use crate::value::Value;

fn public(name: &str) -> MethodDecl {
    MethodDecl {
        name: Ident::new(name),
        public: true,
        result: None,
        params: vec![],
        locals: vec![],
        body: vec![],
    }
}

fn object(file: &str, objs: &[&str]) -> SourceObject {
    SourceObject {
        file: file.into(),
        objs: objs
            .iter()
            .map(|f| ObjDecl {
                name: Ident::new(format!("{f}_obj")),
                file: Ident::new(*f),
                count: None,
                pointer: false,
            })
            .collect(),
        methods: vec![public("start")],
        ..Default::default()
    }
}

fn con(name: &str, value: AstExp) -> ConDecl {
    ConDecl {
        name: Ident::new(name),
        value,
    }
}

fn register(objects: Vec<SourceObject>) -> crate::error::Result<GlobalTable> {
    let root = objects[0].file.clone();
    GlobalTable::register(Program { root, objects })
}

fn eval_in(globals: &GlobalTable, e: &AstExp) -> crate::error::Result<Value> {
    Evaluator::new(globals, globals.root()).eval(e)
}

fn files_in_order(globals: &GlobalTable) -> Vec<&str> {
    globals.order().iter().map(|&id| globals.table(id).file.as_str()).collect()
}

#[test]
fn test_builtin_constants() {
    let globals = register(vec![object("main", &[])]).unwrap();
    assert_eq!(Ok(Value::Int(i32::MAX)), eval_in(&globals, &AstExp::id("POSX")));
    assert_eq!(Ok(Value::Int(0x400)), eval_in(&globals, &AstExp::id("pll16x")));
    assert_eq!(Ok(Value::Float(std::f32::consts::PI)), eval_in(&globals, &AstExp::id("PI")));
    assert_eq!(0, globals.table(0).user_constants().count());
}

#[test]
fn test_duplicate_symbol() {
    let mut main = object("main", &[]);
    main.constants.push(con("start", AstExp::int(1)));
    let err = register(vec![main]).unwrap_err();
    assert_eq!(&InnerError::DuplicateSymbol("start".into()), err.inner());
    assert_eq!(Some("main.spin"), err.file());
}

#[test]
fn test_circular_constant() {
    let mut main = object("main", &[]);
    main.constants.push(con("A", AstExp::binary(AstBinaryOp::Add, AstExp::id("B"), AstExp::int(1))));
    main.constants.push(con("B", AstExp::id("A")));
    let globals = register(vec![main]).unwrap();
    let err = eval_in(&globals, &AstExp::id("A")).unwrap_err();
    assert_eq!(&InnerError::CircularReference("A".into()), err.inner());
}

#[test]
fn test_constants_are_evaluated_once_on_demand() {
    let mut main = object("main", &[]);
    main.constants.push(con("A", AstExp::binary(AstBinaryOp::Multiply, AstExp::id("B"), AstExp::int(2))));
    main.constants.push(con("B", AstExp::int(21)));
    let globals = register(vec![main]).unwrap();
    assert_eq!(Ok(Value::Int(42)), eval_in(&globals, &AstExp::id("A")));
    assert_eq!(Ok(Value::Int(42)), eval_in(&globals, &AstExp::id("a")));
}

#[test]
fn test_obj_constant() {
    let main = object("main", &["sub"]);
    let mut sub = object("sub", &[]);
    sub.constants.push(con("K", AstExp::int(7)));
    let globals = register(vec![main, sub]).unwrap();
    let e = AstExp::new(AstExpKind::ObjConst {
        object: "sub_obj".into(),
        name: "K".into(),
    });
    assert_eq!(Ok(Value::Int(7)), eval_in(&globals, &e));
}

#[test]
fn test_reinclusion_moves_to_end() {
    let main = object("main", &["b", "a"]);
    let a = object("a", &["b"]);
    let b = object("b", &[]);
    let globals = register(vec![main, a, b]).unwrap();
    assert_eq!(vec!["main.spin", "a.spin", "b.spin"], files_in_order(&globals));
}

#[test]
fn test_file_names_ignore_case() {
    let main = object("main", &["Sub.SPIN"]);
    let sub = object("sub", &[]);
    let globals = register(vec![main, sub]).unwrap();
    assert_eq!(2, globals.len());
    assert_eq!(Some(1), globals.file_id("SUB"));
}

#[test]
fn test_circular_object() {
    let main = object("main", &["a"]);
    let a = object("a", &["main"]);
    let err = register(vec![main, a]).unwrap_err();
    assert_eq!(&InnerError::CircularObject("main.spin".into()), err.inner());
}

#[test]
fn test_missing_object() {
    let err = register(vec![object("main", &["gone"])]).unwrap_err();
    assert_eq!(&InnerError::MissingObject("gone.spin".into()), err.inner());
}

#[test]
fn test_no_public_methods() {
    let mut main = object("main", &[]);
    main.methods[0].public = false;
    let err = register(vec![main]).unwrap_err();
    assert_eq!(&InnerError::NoPublicMethods("main.spin".into()), err.inner());
}

#[test]
fn test_local_scope_shadows_nothing() {
    let globals = register(vec![object("main", &[])]).unwrap();
    let table = globals.table(0);
    let mut locals = LocalScope::new();
    locals.add(&Ident::new("x"), 4, table).unwrap();
    assert!(locals.add(&Ident::new("X"), 8, table).is_err());
    assert!(locals.add(&Ident::new("start"), 8, table).is_err());
    assert!(matches!(globals.lookup(0, Some(&locals), "x"), Some(Resolved::Local(4))));
}

#[test]
fn test_integer_operators() {
    let int = Value::Int;
    assert_eq!(Ok(int(0xf)), binary(AstBinaryOp::ShiftRight, int(-1), int(28)));
    assert_eq!(Ok(int(-1)), binary(AstBinaryOp::ShiftRightArithmetic, int(-16), int(8)));
    assert_eq!(Ok(int(8)), binary(AstBinaryOp::Reverse, int(1), int(4)));
    assert_eq!(Ok(int(2)), binary(AstBinaryOp::MultiplyHigh, int(0x4000_0000), int(8)));
    assert_eq!(Ok(int(0x8000_0001_u32 as i32)), binary(AstBinaryOp::RotateRight, int(3), int(1)));
    assert_eq!(Ok(int(-1)), binary(AstBinaryOp::LessThan, int(1), int(2)));
    assert_eq!(Ok(int(3)), binary(AstBinaryOp::Max, int(3), int(-5)));
    assert_eq!(Err(InnerError::DivideByZero), binary(AstBinaryOp::Modulo, int(1), int(0)));
    assert_eq!(Ok(int(5)), unary(AstUnaryOp::Encode, int(0x10)));
    assert_eq!(Ok(int(8)), unary(AstUnaryOp::Decode, int(3)));
    assert_eq!(Ok(int(4)), unary(AstUnaryOp::Sqrt, int(17)));
    assert_eq!(Ok(int(0)), unary(AstUnaryOp::LogicalNot, int(7)));
}

#[test]
fn test_float_operators() {
    let float = Value::Float;
    assert_eq!(Ok(float(3.5)), binary(AstBinaryOp::Add, float(1.5), float(2.0)));
    assert_eq!(Ok(float(1.0)), binary(AstBinaryOp::LessThan, float(1.0), float(2.0)));
    assert_eq!(Ok(float(-2.0)), unary(AstUnaryOp::Negate, float(2.0)));
    assert!(binary(AstBinaryOp::ShiftLeft, float(1.0), float(2.0)).is_err());
    assert!(matches!(
        binary(AstBinaryOp::Add, Value::Int(1), float(2.0)),
        Err(InnerError::TypeMismatch(_))
    ));
}

#[test]
fn test_converters() {
    let globals = register(vec![object("main", &[])]).unwrap();
    let convert = |conv, e| AstExp::new(AstExpKind::Convert(conv, Box::new(e)));
    assert_eq!(Ok(Value::Int(3)), eval_in(&globals, &convert(Converter::Round, AstExp::float(2.5))));
    // just under a half: adding 0.5 in single precision would round up to 1
    let below_half = AstExp::float(f32::from_bits(0x3eff_ffff));
    assert_eq!(Ok(Value::Int(0)), eval_in(&globals, &convert(Converter::Round, below_half)));
    assert_eq!(Ok(Value::Int(2)), eval_in(&globals, &convert(Converter::Trunc, AstExp::float(2.7))));
    assert_eq!(Ok(Value::Float(3.0)), eval_in(&globals, &convert(Converter::Float, AstExp::int(3))));
}

#[test]
fn test_here_outside_dat() {
    let globals = register(vec![object("main", &[])]).unwrap();
    let err = eval_in(&globals, &AstExp::new(AstExpKind::Here)).unwrap_err();
    assert!(matches!(err.inner(), InnerError::NonConstant(_)));
    let here = Evaluator::new(&globals, 0).in_dat(12).eval(&AstExp::new(AstExpKind::Here));
    assert_eq!(Ok(Value::Int(12)), here);
}
