use super::*;
use crate::ast::*;
use crate::error::InnerError;

fn method(name: &str, body: Vec<AstStatement>) -> MethodDecl {
    MethodDecl {
        name: Ident::new(name),
        public: true,
        result: None,
        params: vec![],
        locals: vec![],
        body,
    }
}

fn returns(value: AstExp) -> Vec<AstStatement> {
    vec![AstStatement::new(AstStatementKind::Return(Some(value)))]
}

fn object(file: &str, objs: &[(&str, &str)]) -> SourceObject {
    SourceObject {
        file: file.into(),
        objs: objs
            .iter()
            .map(|(name, file)| ObjDecl {
                name: Ident::new(*name),
                file: Ident::new(*file),
                count: None,
                pointer: false,
            })
            .collect(),
        methods: vec![method("start", returns(AstExp::int(1)))],
        ..Default::default()
    }
}

fn con(name: &str, value: AstExp) -> ConDecl {
    ConDecl {
        name: Ident::new(name),
        value,
    }
}

fn build(objects: Vec<SourceObject>, config: &Config) -> Result<Compilation> {
    let root = objects[0].file.clone();
    compile(Program { root, objects }, config)
}

fn build_default(objects: Vec<SourceObject>) -> Compilation {
    build(objects, &Config::default()).unwrap()
}

fn with_constants(constants: Vec<ConDecl>) -> SourceObject {
    let mut main = object("main", &[]);
    main.constants = constants;
    main
}

fn error_of(objects: Vec<SourceObject>, config: &Config) -> InnerError {
    build(objects, config).unwrap_err().inner().clone()
}

#[test]
fn test_single_method_image() {
    let mut main = object("main", &[]);
    let sum = AstExp::binary(AstBinaryOp::Add, AstExp::int(1), AstExp::int(1));
    main.methods = vec![method("main", returns(sum))];
    let compilation = build_default(vec![main]);
    let image = &compilation.image;

    assert_eq!(vec![0x00, 0x1b, 0xb7, 0x00], image.memory[0..4].to_vec());
    assert_eq!(0, image.memory[4]);
    assert_eq!(0x10, image.word(6));
    assert_eq!(0x1c, image.word(8));
    assert_eq!(0x24, image.word(10));
    assert_eq!(0x18, image.initial_pc());
    // RESULT only
    assert_eq!(0x28, image.initial_sp());

    let header = vec![0x0c, 0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0x00];
    assert_eq!(header, image.memory[0x10..0x18].to_vec());
    assert_eq!(vec![0x37, 0x00, 0x33, 0x32], image.memory[0x18..0x1c].to_vec());
    assert_eq!(vec![0xff, 0xff, 0xf9, 0xff, 0xff, 0xff, 0xf9, 0xff], image.memory[0x1c..0x24].to_vec());

    assert_eq!(0x1c, image.binary().len());
    assert_eq!(32768, image.eeprom().len());
    assert!(image.checksum_ok());
    assert!(compilation.warnings().is_empty());
}

#[test]
fn test_duplicate_objects_share_one_copy() {
    let main = object("main", &[("a", "sub"), ("b", "sub2")]);
    let compilation = build_default(vec![main, object("sub", &[]), object("sub2", &[])]);
    let globals = &compilation.globals;
    let sub = globals.file_id("sub").unwrap();
    let sub2 = globals.file_id("sub2").unwrap();
    assert_eq!(Some(sub2), globals.record(sub).forward_link);
    assert_eq!(None, globals.record(sub2).forward_link);

    let image = &compilation.image;
    // main is 20 bytes, so the surviving copy lands at $24
    assert_eq!(0x24, globals.record(sub2).address);
    let entries = vec![0x14, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00];
    assert_eq!(entries, image.memory[0x18..0x20].to_vec());
    assert_eq!(0x30, image.var_base);
    assert!(image.checksum_ok());
}

#[test]
fn test_without_deduplication() {
    let main = object("main", &[("a", "sub"), ("b", "sub2")]);
    let config = Config {
        eliminate_duplicates: false,
        ..Default::default()
    };
    let compilation = build(vec![main, object("sub", &[]), object("sub2", &[])], &config).unwrap();
    let image = &compilation.image;
    let entries = vec![0x14, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00];
    assert_eq!(entries, image.memory[0x18..0x20].to_vec());
    assert_eq!(0x3c, image.var_base);
}

#[test]
fn test_duplicates_link_to_latest() {
    let main = object("main", &[("a", "x"), ("b", "y"), ("c", "z")]);
    let compilation = build_default(vec![main, object("x", &[]), object("y", &[]), object("z", &[])]);
    let globals = &compilation.globals;
    let z = globals.file_id("z").unwrap();
    for file in ["x", "y"] {
        let id = globals.file_id(file).unwrap();
        assert_eq!(Some(z), globals.record(id).forward_link);
        assert_eq!(z, globals.canonical(id));
    }
    assert_eq!(None, globals.record(globals.root()).forward_link);
}

#[test]
fn test_different_objects_are_kept() {
    let main = object("main", &[("a", "sub"), ("b", "other")]);
    let mut other = object("other", &[]);
    other.methods = vec![method("start", returns(AstExp::int(0)))];
    let compilation = build_default(vec![main, object("sub", &[]), other]);
    let globals = &compilation.globals;
    assert!(globals.order().iter().all(|&id| globals.record(id).forward_link.is_none()));
}

#[test]
fn test_var_offsets_of_instances() {
    let mut main = object("main", &[]);
    main.vars.push(VarDecl {
        name: Ident::new("x"),
        size: Size::Long,
        dims: vec![],
    });
    main.objs.push(ObjDecl {
        name: Ident::new("subs"),
        file: Ident::new("sub"),
        count: Some(AstExp::int(2)),
        pointer: false,
    });
    let mut sub = object("sub", &[]);
    sub.vars.push(VarDecl {
        name: Ident::new("y"),
        size: Size::Word,
        dims: vec![],
    });
    let compilation = build_default(vec![main, sub]);
    let sub = compilation.globals.file_id("sub").unwrap();
    assert_eq!(vec![(sub, 4), (sub, 8)], object_entries(&compilation.globals, 0));
}

#[test]
fn test_clock_from_xinfreq() {
    let mode = AstExp::binary(AstBinaryOp::Add, AstExp::id("XTAL1"), AstExp::id("PLL16X"));
    let main = with_constants(vec![con("_CLKMODE", mode), con("_XINFREQ", AstExp::int(5_000_000))]);
    let image = build_default(vec![main]).image;
    let expected = ClockSettings {
        frequency: 80_000_000,
        mode: 0x6f,
    };
    assert_eq!(expected, image.clock);
    assert_eq!(80_000_000_i32.to_le_bytes().to_vec(), image.memory[0..4].to_vec());
    assert_eq!(0x6f, image.memory[4]);
    assert!(image.checksum_ok());
}

#[test]
fn test_clock_errors() {
    let config = Config::default();
    let freq_only = with_constants(vec![con("_CLKFREQ", AstExp::int(80_000_000))]);
    assert_eq!(
        InnerError::ClockSettings("_CLKMODE must be specified".into()),
        error_of(vec![freq_only], &config)
    );

    let mode_only = with_constants(vec![con("_CLKMODE", AstExp::id("XTAL1"))]);
    assert_eq!(
        InnerError::ClockSettings("_CLKFREQ or _XINFREQ must be specified".into()),
        error_of(vec![mode_only], &config)
    );

    let conflicting = with_constants(vec![
        con("_CLKMODE", AstExp::binary(AstBinaryOp::Add, AstExp::id("XTAL1"), AstExp::id("PLL16X"))),
        con("_XINFREQ", AstExp::int(5_000_000)),
        con("_CLKFREQ", AstExp::int(80_000_001)),
    ]);
    assert_eq!(
        InnerError::ClockSettings("conflicting _CLKFREQ and _XINFREQ".into()),
        error_of(vec![conflicting], &config)
    );

    let float = with_constants(vec![con("_STACK", AstExp::float(1.0))]);
    assert!(matches!(error_of(vec![float], &config), InnerError::TypeMismatch(_)));
}

#[test]
fn test_encode_clock_mode() {
    assert_eq!(Ok(0x00), encode_clock_mode(0x001));
    assert_eq!(Ok(0x01), encode_clock_mode(0x002));
    assert_eq!(Ok(0x63), encode_clock_mode(0x044));
    assert_eq!(Ok(0x6f), encode_clock_mode(0x408));
    assert_eq!(Ok(0x3a), encode_clock_mode(0x020));
    assert!(encode_clock_mode(0x018).is_err());
    assert!(encode_clock_mode(0x408 | 0x200).is_err());
}

#[test]
fn test_image_too_large() {
    let config = Config {
        memory_size: 16,
        ..Default::default()
    };
    assert!(matches!(error_of(vec![object("main", &[])], &config), InnerError::ImageTooLarge(_)));
}

#[test]
fn test_stack_budget() {
    let config = Config::default();
    let stack = with_constants(vec![con("_STACK", AstExp::int(8192))]);
    assert_eq!(
        InnerError::ImageTooLarge("_STACK + _FREE must be < 8192 longs".into()),
        error_of(vec![stack], &config)
    );

    // program ends at $1c: 7 longs, plus 16 default stack longs
    let free = with_constants(vec![con("_FREE", AstExp::int(8170))]);
    assert_eq!(
        InnerError::ImageTooLarge("program too big by 1 longs".into()),
        error_of(vec![free], &config)
    );

    let fits = with_constants(vec![con("_FREE", AstExp::int(8169))]);
    assert!(build(vec![fits], &config).is_ok());
}

#[test]
fn test_space_stub() {
    let main = with_constants(vec![con("_SPACE", AstExp::int(10))]);
    let compilation = build_default(vec![main]);
    let image = &compilation.image;
    // 10 rounds up to the 12 byte minimum; the stub adds 8
    assert_eq!(0x24, compilation.globals.record(0).address);
    let header = vec![0x14, 0x00, 0x02, 0x01, 0x0c, 0x00, 0x00, 0x00, 0x14, 0x00];
    assert_eq!(header, image.memory[0x10..0x1a].to_vec());
    assert_eq!(vec![0x01, 0x06, 0x02, 0x01, 0x32], image.memory[0x1c..0x21].to_vec());
    assert_eq!(0x1c, image.initial_pc());
    assert!(image.checksum_ok());
}

#[test]
fn test_negative_space() {
    let main = with_constants(vec![con("_SPACE", AstExp::int(-4))]);
    assert!(matches!(error_of(vec![main], &Config::default()), InnerError::ValueOutOfRange(_)));
}
