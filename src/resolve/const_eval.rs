use super::global::GlobalTable;
use super::symbols::*;
use crate::ast::*;
use crate::error::{InnerError, Result};
use crate::value::Value;

type OpResult<T> = std::result::Result<T, InnerError>;

/// Where a DAT constant expression is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatContext {
    /// Cog address of the current DAT location, the value of `$`.
    pub here: i32,
}

/// Side-effect free evaluation of constant expressions against the symbol tables.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    globals: &'a GlobalTable,
    obj: ObjId,
    locals: Option<&'a LocalScope>,
    dat: Option<DatContext>,
}

impl<'a> Evaluator<'a> {
    pub fn new(globals: &'a GlobalTable, obj: ObjId) -> Self {
        Self {
            globals,
            obj,
            locals: None,
            dat: None,
        }
    }

    pub fn in_dat(self, here: i32) -> Self {
        Self {
            dat: Some(DatContext { here }),
            ..self
        }
    }

    pub fn with_locals(self, locals: &'a LocalScope) -> Self {
        Self {
            locals: Some(locals),
            ..self
        }
    }

    pub fn eval_int(&self, e: &AstExp) -> Result<i32> {
        self.eval(e)?.int().map_err(|err| err.at(e.pos))
    }

    pub fn eval_float(&self, e: &AstExp) -> Result<f32> {
        self.eval(e)?.float().map_err(|err| err.at(e.pos))
    }

    pub fn eval(&self, e: &AstExp) -> Result<Value> {
        match &e.kind {
            AstExpKind::Int(i) => Ok(Value::Int(*i)),
            AstExpKind::Float(f) => Ok(Value::Float(*f)),
            AstExpKind::Id(name) => self.eval_id(name, e.pos),
            AstExpKind::Variable { name, size: None, indices } if indices.is_empty() => {
                self.eval_id(name, e.pos)
            }
            AstExpKind::ObjConst { object, name } => self.eval_obj_const(object, name, e.pos),
            AstExpKind::Unary(AstUnaryOp::AddressOf, operand) => {
                let dat = self.dat_symbol(operand)?;
                Ok(Value::Int(dat.dp))
            }
            AstExpKind::Unary(op, operand) => {
                let v = self.eval(operand)?;
                unary(*op, v).map_err(|err| err.at(e.pos))
            }
            AstExpKind::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, l, r).map_err(|err| err.at(e.pos))
            }
            AstExpKind::Register { reg, bits: None } if self.dat.is_some() => {
                Ok(Value::Int(i32::from(*reg) + 0x1f0))
            }
            AstExpKind::Convert(conv, inner) => self.eval_convert(*conv, inner),
            AstExpKind::Constant(inner) => self.eval(inner),
            AstExpKind::Here => match self.dat {
                Some(ctx) => Ok(Value::Int(ctx.here)),
                None => Err(InnerError::non_constant("$ valid only in DAT context").at(e.pos)),
            },
            AstExpKind::AbsoluteAddress(name) => {
                let id = AstExp::at(AstExpKind::Id(name.clone()), e.pos);
                let dat = self.dat_symbol(&id)?;
                let hub = self.globals.table(self.obj).hub_address;
                Ok(Value::Int(dat.dp + hub))
            }
            AstExpKind::Register { .. } => {
                Err(InnerError::non_constant("register not allowed in constant expression").at(e.pos))
            }
            _ => Err(InnerError::non_constant("expected a constant expression").at(e.pos)),
        }
    }

    fn eval_id(&self, name: &str, pos: Pos) -> Result<Value> {
        match self.globals.lookup_existing(self.obj, self.locals, name, pos)? {
            Resolved::Dat(dat) => match self.dat {
                Some(_) if dat.cog_x4 & 3 != 0 => {
                    Err(InnerError::MisalignedAddress(name.to_owned()).at(pos))
                }
                Some(_) => Ok(Value::Int(dat.cog_x4 / 4)),
                None => Ok(Value::Int(dat.dp)),
            },
            Resolved::Con(owner, con) => self.con_value(owner, con),
            _ => Err(InnerError::non_constant(format!("{name} is not a constant")).at(pos)),
        }
    }

    /// Evaluates a constant on first use and memoizes the result.
    pub fn con_value(&self, owner: ObjId, con: &ConSymbol) -> Result<Value> {
        match con.state() {
            ConState::Done(v) => Ok(v),
            ConState::Evaluating => {
                Err(InnerError::CircularReference(con.name.name.clone()).at(con.name.pos))
            }
            ConState::Pending => {
                con.set_state(ConState::Evaluating);
                let result = Evaluator::new(self.globals, owner).eval(&con.value);
                match result {
                    Ok(v) => con.set_state(ConState::Done(v)),
                    Err(_) => con.set_state(ConState::Pending),
                }
                let file = &self.globals.table(owner).file;
                result.map_err(|e| e.in_file(file))
            }
        }
    }

    fn eval_obj_const(&self, object: &str, name: &str, pos: Pos) -> Result<Value> {
        let Resolved::Obj(obj) = self.globals.lookup_existing(self.obj, self.locals, object, pos)? else {
            return Err(InnerError::non_constant(format!("{object} is not an object")).at(pos));
        };
        match self.globals.lookup_existing(obj.target, None, name, pos)? {
            Resolved::Con(owner, con) => self.con_value(owner, con),
            _ => Err(InnerError::non_constant(format!("{object}#{name} is not a constant")).at(pos)),
        }
    }

    fn dat_symbol(&self, e: &AstExp) -> Result<&'a DatSymbol> {
        let name = match &e.kind {
            AstExpKind::Id(name) => name,
            AstExpKind::Variable { name, size: None, indices } if indices.is_empty() => name,
            _ => return Err(InnerError::non_constant("expected DAT symbol").at(e.pos)),
        };
        match self.globals.lookup_existing(self.obj, self.locals, name, e.pos)? {
            Resolved::Dat(dat) => Ok(dat),
            _ => Err(InnerError::non_constant(format!("{name} is not a DAT symbol")).at(e.pos)),
        }
    }

    fn eval_convert(&self, conv: Converter, inner: &AstExp) -> Result<Value> {
        match conv {
            Converter::Float => Ok(Value::Float(self.eval_int(inner)? as f32)),
            Converter::Round => Ok(Value::Int((f64::from(self.eval_float(inner)?) + 0.5) as i32)),
            Converter::Trunc => Ok(Value::Int(self.eval_float(inner)? as i32)),
        }
    }
}

fn bool_int(b: bool) -> i32 {
    if b {
        -1
    } else {
        0
    }
}

fn bool_float(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn bad_operator() -> InnerError {
    InnerError::non_constant("bad operator in constant expression")
}

pub fn unary(op: AstUnaryOp, v: Value) -> OpResult<Value> {
    match v {
        Value::Int(i) => unary_int(op, i).map(Value::Int),
        Value::Float(f) => unary_float(op, f).map(Value::Float),
    }
}

fn unary_int(op: AstUnaryOp, i: i32) -> OpResult<i32> {
    let v = match op {
        AstUnaryOp::Sqrt => f64::from(i as u32).sqrt() as i32,
        AstUnaryOp::Abs => i.wrapping_abs(),
        AstUnaryOp::Decode => 1i32.wrapping_shl(i as u32),
        AstUnaryOp::Encode => 32 - (i as u32).leading_zeros() as i32,
        AstUnaryOp::Complement => !i,
        AstUnaryOp::LogicalNot => bool_int(i == 0),
        AstUnaryOp::Negate => i.wrapping_neg(),
        _ => return Err(bad_operator()),
    };
    Ok(v)
}

fn unary_float(op: AstUnaryOp, f: f32) -> OpResult<f32> {
    let v = match op {
        AstUnaryOp::Sqrt => f.sqrt(),
        AstUnaryOp::Abs => f.abs(),
        AstUnaryOp::LogicalNot => bool_float(f == 0.0),
        AstUnaryOp::Negate => -f,
        _ => return Err(bad_operator()),
    };
    Ok(v)
}

pub fn binary(op: AstBinaryOp, l: Value, r: Value) -> OpResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => binary_int(op, a, b).map(Value::Int),
        (Value::Float(a), Value::Float(b)) => binary_float(op, a, b).map(Value::Float),
        _ => Err(InnerError::TypeMismatch(
            "can't mix integer and floating-point operands".into(),
        )),
    }
}

/// Shift and rotate counts behave like the repeated single-bit steps of the
/// interpreter: non-positive counts leave the value alone.
fn binary_int(op: AstBinaryOp, a: i32, b: i32) -> OpResult<i32> {
    let count = b.max(0);
    let v = match op {
        AstBinaryOp::RotateRight => a.rotate_right((count % 32) as u32),
        AstBinaryOp::RotateLeft => a.rotate_left((count % 32) as u32),
        AstBinaryOp::ShiftRight => (a as u32).checked_shr(count as u32).unwrap_or(0) as i32,
        AstBinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
        AstBinaryOp::ShiftRightArithmetic => a >> count.min(31),
        AstBinaryOp::Reverse => reverse_bits(a, count),
        AstBinaryOp::BitwiseAnd => a & b,
        AstBinaryOp::BitwiseOr => a | b,
        AstBinaryOp::BitwiseXor => a ^ b,
        AstBinaryOp::Multiply => a.wrapping_mul(b),
        AstBinaryOp::MultiplyHigh => ((i64::from(a) * i64::from(b)) >> 32) as i32,
        AstBinaryOp::Divide if b == 0 => return Err(InnerError::DivideByZero),
        AstBinaryOp::Divide => a.wrapping_div(b),
        AstBinaryOp::Modulo if b == 0 => return Err(InnerError::DivideByZero),
        AstBinaryOp::Modulo => a.wrapping_rem(b),
        AstBinaryOp::Add => a.wrapping_add(b),
        AstBinaryOp::Subtract => a.wrapping_sub(b),
        AstBinaryOp::Max => a.max(b),
        AstBinaryOp::Min => a.min(b),
        AstBinaryOp::LessThan => bool_int(a < b),
        AstBinaryOp::GreaterThan => bool_int(a > b),
        AstBinaryOp::NotEqual => bool_int(a != b),
        AstBinaryOp::IsEqual => bool_int(a == b),
        AstBinaryOp::LessOrEqual => bool_int(a <= b),
        AstBinaryOp::GreaterOrEqual => bool_int(a >= b),
        AstBinaryOp::LogicalAnd => bool_int(a != 0 && b != 0),
        AstBinaryOp::LogicalOr => bool_int(a != 0 || b != 0),
    };
    Ok(v)
}

/// Reverses the low `n` bits; counts past 64 no longer change the result.
fn reverse_bits(a: i32, n: i32) -> i32 {
    let mut a = a;
    let mut r = 0i32;
    for _ in 0..n.min(64) {
        r = (r << 1) | (a & 1);
        a >>= 1;
    }
    r
}

fn binary_float(op: AstBinaryOp, a: f32, b: f32) -> OpResult<f32> {
    let v = match op {
        AstBinaryOp::Multiply => a * b,
        AstBinaryOp::Divide => a / b,
        AstBinaryOp::Add => a + b,
        AstBinaryOp::Subtract => a - b,
        AstBinaryOp::Max => a.max(b),
        AstBinaryOp::Min => a.min(b),
        AstBinaryOp::LessThan => bool_float(a < b),
        AstBinaryOp::GreaterThan => bool_float(a > b),
        AstBinaryOp::NotEqual => bool_float(a != b),
        AstBinaryOp::IsEqual => bool_float(a == b),
        AstBinaryOp::LessOrEqual => bool_float(a <= b),
        AstBinaryOp::GreaterOrEqual => bool_float(a >= b),
        AstBinaryOp::LogicalAnd => bool_float(a != 0.0 && b != 0.0),
        AstBinaryOp::LogicalOr => bool_float(a != 0.0 || b != 0.0),
        _ => return Err(bad_operator()),
    };
    Ok(v)
}
