use serde::{Deserialize, Serialize};

pub type Identifier = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: Identifier,
    #[serde(default)]
    pub pos: Pos,
}

impl Ident {
    pub fn new(name: impl Into<Identifier>) -> Self {
        Self {
            name: name.into(),
            pos: Pos::default(),
        }
    }

    pub fn at(name: impl Into<Identifier>, pos: Pos) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

/// Everything the parser hands over: the root file name plus every source
/// object reachable from it through OBJ declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub root: Identifier,
    pub objects: Vec<SourceObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceObject {
    pub file: Identifier,
    #[serde(default)]
    pub constants: Vec<ConDecl>,
    #[serde(default)]
    pub vars: Vec<VarDecl>,
    #[serde(default)]
    pub objs: Vec<ObjDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub dat: Vec<DatEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConDecl {
    pub name: Ident,
    pub value: AstExp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    pub fn bytes(self) -> i32 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Ident,
    pub size: Size,
    #[serde(default)]
    pub dims: Vec<AstExp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjDecl {
    pub name: Ident,
    pub file: Ident,
    #[serde(default)]
    pub count: Option<AstExp>,
    /// Shares the instance storage of another object instead of owning VAR space.
    #[serde(default)]
    pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: Ident,
    pub public: bool,
    #[serde(default)]
    pub result: Option<Ident>,
    #[serde(default)]
    pub params: Vec<Ident>,
    #[serde(default)]
    pub locals: Vec<LocalDecl>,
    #[serde(default)]
    pub body: Vec<AstStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: Ident,
    #[serde(default)]
    pub count: Option<AstExp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatEntry {
    /// `alignment` 0 keeps whatever alignment is current.
    Label { name: Ident, alignment: u8 },
    Org { pos: Pos, origin: Option<AstExp> },
    Orgx { pos: Pos },
    Instruction(DatInstruction),
    Res { pos: Pos, count: Option<AstExp> },
    Fit { pos: Pos, limit: Option<AstExp> },
    File { pos: Pos, bytes: Vec<u8> },
    Data(DatData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatInstruction {
    pub pos: Pos,
    pub mnemonic: Identifier,
    /// Instruction template with the condition field already filled in.
    pub opcode: u32,
    pub cond: u8,
    #[serde(default)]
    pub dest: Option<AstExp>,
    #[serde(default)]
    pub src: Option<AstExp>,
    #[serde(default)]
    pub immediate: bool,
    /// WR=1, WC=2, WZ=4, NR=8.
    #[serde(default)]
    pub effect: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatData {
    pub pos: Pos,
    pub alignment: u8,
    pub size: u8,
    pub value: AstExp,
    #[serde(default)]
    pub count: Option<AstExp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstStatement {
    #[serde(default)]
    pub pos: Pos,
    pub kind: AstStatementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstStatementKind {
    Exp(AstExp),
    Return(Option<AstExp>),
    Abort(Option<AstExp>),
    If {
        negate: bool,
        condition: AstExp,
        then: Vec<AstStatement>,
        els: Option<Vec<AstStatement>>,
    },
    Repeat(AstRepeat),
    Next,
    Quit,
    Case {
        value: AstExp,
        arms: Vec<AstCaseArm>,
        other: Vec<AstStatement>,
    },
    Reboot,
    FillMove(FillMoveOp, Vec<AstExp>),
    Wait(WaitOp, Vec<AstExp>),
    Clkset(AstExp, AstExp),
    Cogstop(AstExp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstRepeat {
    Forever(Vec<AstStatement>),
    Times {
        count: AstExp,
        body: Vec<AstStatement>,
    },
    /// `REPEAT WHILE/UNTIL cond`
    PreCondition {
        until: bool,
        condition: AstExp,
        body: Vec<AstStatement>,
    },
    /// `REPEAT ... WHILE/UNTIL cond`
    PostCondition {
        until: bool,
        condition: AstExp,
        body: Vec<AstStatement>,
    },
    FromTo {
        var: AstExp,
        from: AstExp,
        to: AstExp,
        step: Option<AstExp>,
        body: Vec<AstStatement>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstCaseArm {
    pub matches: Vec<AstRange>,
    pub body: Vec<AstStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstRange {
    Single(AstExp),
    Span(AstExp, AstExp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMoveOp {
    ByteFill,
    WordFill,
    LongFill,
    ByteMove,
    WordMove,
    LongMove,
}

impl FillMoveOp {
    pub fn opcode(self) -> u8 {
        match self {
            Self::ByteFill => 0x18,
            Self::WordFill => 0x19,
            Self::LongFill => 0x1a,
            Self::ByteMove => 0x1c,
            Self::WordMove => 0x1d,
            Self::LongMove => 0x1e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitOp {
    Cnt,
    Peq,
    Pne,
    Vid,
}

impl WaitOp {
    pub fn opcode(self) -> u8 {
        match self {
            Self::Cnt => 0x23,
            Self::Peq => 0x1b,
            Self::Pne => 0x1f,
            Self::Vid => 0x27,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstExp {
    #[serde(default)]
    pub pos: Pos,
    pub kind: AstExpKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstExpKind {
    Int(i32),
    Float(f32),
    Id(Identifier),
    /// `name.size[i][j]`
    Variable {
        name: Identifier,
        size: Option<Size>,
        indices: Vec<AstExp>,
    },
    /// `obj#CON`
    ObjConst {
        object: Identifier,
        name: Identifier,
    },
    /// `BYTE[base][index]`
    Memory {
        size: Size,
        base: Box<AstExp>,
        index: Option<Box<AstExp>>,
    },
    Call {
        object: Option<Identifier>,
        object_index: Option<Box<AstExp>>,
        method: Identifier,
        args: Vec<AstExp>,
        abort_trap: bool,
    },
    Unary(AstUnaryOp, Box<AstExp>),
    Binary(AstBinaryOp, Box<AstExp>, Box<AstExp>),
    /// `op == None` is plain `:=`.
    Assign {
        op: Option<AstBinaryOp>,
        target: Box<AstExp>,
        value: Box<AstExp>,
    },
    Look {
        kind: LookKind,
        value: Box<AstExp>,
        items: Vec<AstRange>,
    },
    Register {
        reg: u8,
        bits: Option<(Box<AstExp>, Option<Box<AstExp>>)>,
    },
    Spr(Box<AstExp>),
    ReadOnly(ReadOnlyVar),
    Convert(Converter, Box<AstExp>),
    Constant(Box<AstExp>),
    Str(String),
    /// `cog == None` is COGNEW.
    Cog {
        cog: Option<Box<AstExp>>,
        code: Box<AstExp>,
        stack: Box<AstExp>,
    },
    StrComp(Box<AstExp>, Box<AstExp>),
    StrSize(Box<AstExp>),
    Lock(LockOp, Vec<AstExp>),
    /// `$`
    Here,
    /// `@@@label`
    AbsoluteAddress(Identifier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookKind {
    Lookup,
    Lookupz,
    Lookdown,
    Lookdownz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadOnlyVar {
    Chipver,
    Clkfreq,
    Clkmode,
    Cogid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Converter {
    Float,
    Round,
    Trunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockOp {
    New,
    Ret,
    Set,
    Clr,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum AstBinaryOp {
    RotateRight,
    RotateLeft,
    ShiftRight,
    ShiftLeft,
    ShiftRightArithmetic,
    Reverse,
    Max,
    Min,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Add,
    Subtract,
    Multiply,
    MultiplyHigh,
    Divide,
    Modulo,
    LogicalAnd,
    LogicalOr,
    LessThan,
    GreaterThan,
    NotEqual,
    IsEqual,
    LessOrEqual,
    GreaterOrEqual,
}

impl AstBinaryOp {
    pub fn opcode(self) -> u8 {
        match self {
            Self::RotateRight => 0xe0,
            Self::RotateLeft => 0xe1,
            Self::ShiftRight => 0xe2,
            Self::ShiftLeft => 0xe3,
            Self::Max => 0xe4,
            Self::Min => 0xe5,
            Self::BitwiseAnd => 0xe8,
            Self::BitwiseOr => 0xea,
            Self::BitwiseXor => 0xeb,
            Self::Add => 0xec,
            Self::Subtract => 0xed,
            Self::ShiftRightArithmetic => 0xee,
            Self::Reverse => 0xef,
            Self::LogicalAnd => 0xf0,
            Self::LogicalOr => 0xf2,
            Self::Multiply => 0xf4,
            Self::MultiplyHigh => 0xf5,
            Self::Divide => 0xf6,
            Self::Modulo => 0xf7,
            Self::LessThan => 0xf9,
            Self::GreaterThan => 0xfa,
            Self::NotEqual => 0xfb,
            Self::IsEqual => 0xfc,
            Self::LessOrEqual => 0xfd,
            Self::GreaterOrEqual => 0xfe,
        }
    }

    /// Opcode of the `op=` form applied through a USING stack op.
    pub fn assign_opcode(self) -> u8 {
        self.opcode() - 0xa0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum AstUnaryOp {
    Negate,
    Complement,
    Abs,
    Encode,
    Decode,
    Sqrt,
    LogicalNot,
    /// `@x`
    AddressOf,
    /// `@@x`
    ObjectAddress,
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
    /// `~x`
    SignExtendByte,
    /// `x~`
    PostClear,
    /// `~~x`
    SignExtendWord,
    /// `x~~`
    PostSet,
    /// `?x`
    RandomForward,
    /// `x?`
    RandomReverse,
}

impl AstUnaryOp {
    /// `None` for the address operators, which have no opcode of their own.
    pub fn opcode(self) -> Option<u8> {
        let op = match self {
            Self::Negate => 0xe6,
            Self::Complement => 0xe7,
            Self::Abs => 0xe9,
            Self::Encode => 0xf1,
            Self::Decode => 0xf3,
            Self::Sqrt => 0xf8,
            Self::LogicalNot => 0xff,
            Self::AddressOf | Self::ObjectAddress => return None,
            Self::PreIncrement => 0x20,
            Self::PostIncrement => 0x28,
            Self::PreDecrement => 0x30,
            Self::PostDecrement => 0x38,
            Self::SignExtendByte => 0x10,
            Self::PostClear => 0x18,
            Self::SignExtendWord => 0x14,
            Self::PostSet => 0x1c,
            Self::RandomForward => 0x08,
            Self::RandomReverse => 0x0c,
        };
        Some(op)
    }

    /// Operators that modify their operand in place.
    pub fn is_assignment(self) -> bool {
        self.opcode().is_some_and(|op| op < 0x40)
    }
}

impl AstExp {
    pub fn new(kind: AstExpKind) -> Self {
        Self {
            pos: Pos::default(),
            kind,
        }
    }

    pub fn at(kind: AstExpKind, pos: Pos) -> Self {
        Self { pos, kind }
    }

    pub fn int(v: i32) -> Self {
        Self::new(AstExpKind::Int(v))
    }

    pub fn float(v: f32) -> Self {
        Self::new(AstExpKind::Float(v))
    }

    pub fn id(name: impl Into<Identifier>) -> Self {
        Self::new(AstExpKind::Id(name.into()))
    }

    pub fn unary(op: AstUnaryOp, operand: AstExp) -> Self {
        Self::new(AstExpKind::Unary(op, Box::new(operand)))
    }

    pub fn binary(op: AstBinaryOp, left: AstExp, right: AstExp) -> Self {
        Self::new(AstExpKind::Binary(op, Box::new(left), Box::new(right)))
    }

    pub fn assign(target: AstExp, value: AstExp) -> Self {
        Self::new(AstExpKind::Assign {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn call(method: impl Into<Identifier>, args: Vec<AstExp>) -> Self {
        Self::new(AstExpKind::Call {
            object: None,
            object_index: None,
            method: method.into(),
            args,
            abort_trap: false,
        })
    }

    pub fn get_id(&self) -> Option<&str> {
        match &self.kind {
            AstExpKind::Id(name) => Some(name),
            _ => None,
        }
    }
}

impl AstStatement {
    pub fn new(kind: AstStatementKind) -> Self {
        Self {
            pos: Pos::default(),
            kind,
        }
    }
}
