use super::stack_op::{encode_mem_op, encode_stack_op, Space, StackOp};
use super::MethodEmitter;
use crate::ast::*;
use crate::error::{InnerError, Result};
use crate::resolve::{MethodSymbol, Resolved};

const COG_PUSH_ANY: u8 = 0x34;

fn unused(pos: Pos) -> crate::error::CompileError {
    InnerError::context("expression value is not used").at(pos)
}

fn not_assignable(pos: Pos) -> crate::error::CompileError {
    InnerError::context("expression is not assignable").at(pos)
}

/// The name of a bare identifier, with or without the variable syntax.
fn simple_name(e: &AstExp) -> Option<&str> {
    match &e.kind {
        AstExpKind::Id(name) => Some(name),
        AstExpKind::Variable {
            name,
            size: None,
            indices,
        } if indices.is_empty() => Some(name),
        _ => None,
    }
}

fn check_args(method: &MethodSymbol, given: usize, pos: Pos) -> Result<()> {
    if given == method.param_count() {
        return Ok(());
    }
    let msg = format!(
        "wrong number of arguments ({given} instead of {})",
        method.param_count()
    );
    Err(InnerError::context(msg).at(pos))
}

/// Combines `a[i][j]...` into one linear index: `((i * d1) + j) * d2 + ...`.
fn subscript(indices: &[AstExp], dims: &[i32]) -> Result<Option<AstExp>> {
    match indices {
        [] => return Ok(None),
        [single] => return Ok(Some(single.clone())),
        _ => {}
    }
    if indices.len() < dims.len() {
        let pos = indices[indices.len() - 1].pos;
        return Err(InnerError::context("not enough subscripts").at(pos));
    }
    if indices.len() > dims.len() {
        let pos = indices[dims.len()].pos;
        return Err(InnerError::context("too many subscripts").at(pos));
    }
    let mut index = indices[0].clone();
    for (next, &dim) in indices[1..].iter().zip(&dims[1..]) {
        let pos = next.pos;
        let dim = AstExp::at(AstExpKind::Int(dim), pos);
        index = AstExp::at(AstExpKind::Binary(AstBinaryOp::Multiply, Box::new(index), Box::new(dim)), pos);
        index = AstExp::at(AstExpKind::Binary(AstBinaryOp::Add, Box::new(index), Box::new(next.clone())), pos);
    }
    Ok(Some(index))
}

impl<'a> MethodEmitter<'a> {
    /// Emits `e`; with `keep` its value is left on the stack.
    pub fn emit_exp(&mut self, e: &AstExp, keep: bool) -> Result<()> {
        if keep && self.is_foldable(e) {
            if let Ok(value) = self.evaluator().eval(e) {
                self.out.push_int(value.as_bits());
                return Ok(());
            }
        }
        match &e.kind {
            AstExpKind::Id(name) => self.emit_id(e, name, keep),
            AstExpKind::Variable { name, .. } if simple_name(e).is_some() => self.emit_id(e, name, keep),
            AstExpKind::Call {
                object,
                object_index,
                method,
                args,
                abort_trap,
            } => {
                let call = Call {
                    object: object.as_deref(),
                    object_index: object_index.as_deref(),
                    method,
                    args,
                    abort_trap: *abort_trap,
                };
                self.emit_call(&call, e.pos, keep)
            }
            AstExpKind::Unary(op, operand) => self.emit_unary(*op, operand, e.pos, keep),
            AstExpKind::Assign { op, target, value } => {
                self.emit_exp(value, true)?;
                if op.is_none() && !keep {
                    return self.emit_stack_op(target, StackOp::Pop);
                }
                self.emit_stack_op(target, StackOp::Using)?;
                let opcode = op.map_or(0, AstBinaryOp::assign_opcode);
                self.out.push(if keep { opcode + 0x80 } else { opcode });
                Ok(())
            }
            AstExpKind::Cog { cog, code, stack } => self.emit_cog(cog.as_deref(), code, stack, e.pos, keep),
            AstExpKind::Lock(op, args) => {
                if keep && *op == LockOp::Ret {
                    return Err(InnerError::context("LOCKRET does not return a value").at(e.pos));
                }
                for arg in args {
                    self.emit_exp(arg, true)?;
                }
                let opcode = match (op, keep) {
                    (LockOp::Clr, true) => 0x2b,
                    (LockOp::Clr, false) => 0x2f,
                    (LockOp::New, true) => 0x29,
                    (LockOp::New, false) => 0x2d,
                    (LockOp::Set, true) => 0x2a,
                    (LockOp::Set, false) => 0x2e,
                    (LockOp::Ret, _) => 0x22,
                };
                self.out.push(opcode);
                Ok(())
            }
            _ if !keep => Err(unused(e.pos)),
            AstExpKind::Int(_)
            | AstExpKind::Float(_)
            | AstExpKind::ObjConst { .. }
            | AstExpKind::Convert(..)
            | AstExpKind::Constant(_) => {
                let value = self.evaluator().eval(e)?;
                self.out.push_int(value.as_bits());
                Ok(())
            }
            AstExpKind::Variable { .. }
            | AstExpKind::Memory { .. }
            | AstExpKind::Register { .. }
            | AstExpKind::Spr(_) => self.emit_stack_op(e, StackOp::Push),
            AstExpKind::Binary(op, left, right) => {
                self.emit_exp(left, true)?;
                self.emit_exp(right, true)?;
                self.out.push(op.opcode());
                Ok(())
            }
            AstExpKind::Look { kind, value, items } => self.emit_look(*kind, value, items),
            AstExpKind::ReadOnly(var) => {
                let bytes: &[u8] = match var {
                    ReadOnlyVar::Chipver => &[0x34, 0x80],
                    ReadOnlyVar::Clkfreq => &[0x35, 0xc0],
                    ReadOnlyVar::Clkmode => &[0x38, 0x04, 0x80],
                    ReadOnlyVar::Cogid => &[0x3f, 0x89],
                };
                self.out.extend(bytes);
                Ok(())
            }
            AstExpKind::Str(text) => {
                let target = self.out.new_target();
                self.out.string_offset(target);
                self.strings.push((target, text.clone()));
                Ok(())
            }
            AstExpKind::StrComp(a, b) => {
                self.emit_exp(a, true)?;
                self.emit_exp(b, true)?;
                self.out.push(0x17);
                Ok(())
            }
            AstExpKind::StrSize(s) => {
                self.emit_exp(s, true)?;
                self.out.push(0x16);
                Ok(())
            }
            AstExpKind::Here => Err(InnerError::non_constant("$ valid only in DAT context").at(e.pos)),
            AstExpKind::AbsoluteAddress(name) => {
                let Resolved::Dat(dat) = self.lookup(name, e.pos)? else {
                    let msg = format!("{name} is not a DAT symbol");
                    return Err(InnerError::context(msg).at(e.pos));
                };
                let hub = self.globals.table(self.obj).hub_address;
                self.out.push_int(dat.dp + hub);
                Ok(())
            }
        }
    }

    /// Operator trees made only of literals and constants are pushed as one
    /// value. Evaluation failures fall back to run-time code.
    fn is_foldable(&self, e: &AstExp) -> bool {
        matches!(e.kind, AstExpKind::Unary(..) | AstExpKind::Binary(..)) && self.is_constant(e)
    }

    fn is_constant(&self, e: &AstExp) -> bool {
        if let Some(name) = simple_name(e) {
            return matches!(
                self.globals.lookup(self.obj, Some(self.locals), name),
                Some(Resolved::Con(..))
            );
        }
        match &e.kind {
            AstExpKind::Int(_)
            | AstExpKind::Float(_)
            | AstExpKind::ObjConst { .. }
            | AstExpKind::Convert(..)
            | AstExpKind::Constant(_) => true,
            AstExpKind::Unary(op, operand) => {
                op.opcode().is_some() && !op.is_assignment() && self.is_constant(operand)
            }
            AstExpKind::Binary(_, left, right) => self.is_constant(left) && self.is_constant(right),
            _ => false,
        }
    }

    fn emit_id(&mut self, e: &AstExp, name: &str, keep: bool) -> Result<()> {
        match self.lookup(name, e.pos)? {
            Resolved::Method(_) => {
                let call = Call {
                    object: None,
                    object_index: None,
                    method: name,
                    args: &[],
                    abort_trap: false,
                };
                self.emit_call(&call, e.pos, keep)
            }
            _ if !keep => Err(unused(e.pos)),
            _ => self.emit_stack_op(e, StackOp::Push),
        }
    }

    /// Emits a load, store, read-modify-write or address-of on `e`.
    pub fn emit_stack_op(&mut self, e: &AstExp, op: StackOp) -> Result<()> {
        if let Some(name) = simple_name(e) {
            return self.emit_named_stack_op(name, e.pos, op);
        }
        match &e.kind {
            AstExpKind::Variable { name, size, indices } => {
                let no_dims: &[i32] = &[];
                let (space, declared, offset, dims) = match self.lookup(name, e.pos)? {
                    Resolved::Local(offset) => (Space::Local, 4, offset, no_dims),
                    Resolved::Var(var) if var.dims.is_empty() => (Space::Var, var.size.bytes(), var.offset, no_dims),
                    Resolved::Var(var) => (Space::Var, var.size.bytes(), var.offset, var.dim_values.as_slice()),
                    Resolved::Dat(dat) => (Space::Obj, dat.alignment, dat.dp, no_dims),
                    _ => return Err(not_assignable(e.pos)),
                };
                let size = size.map_or(declared, Size::bytes);
                if space != Space::Local && size > declared {
                    return Err(InnerError::context("size override must be smaller").at(e.pos));
                }
                let index = subscript(indices, dims)?;
                self.stack_op(op, size, space, offset, index.as_ref(), e.pos)
            }
            AstExpKind::Memory { size, base, index } => {
                self.emit_exp(base, true)?;
                if let Some(index) = index {
                    self.emit_exp(index, true)?;
                }
                self.out.push(encode_mem_op(op, size.bytes(), index.is_some()));
                Ok(())
            }
            AstExpKind::Register { reg, bits } => {
                if op == StackOp::Pea {
                    return Err(InnerError::context("can't apply @ to register").at(e.pos));
                }
                match bits {
                    None => self.out.push(0x3f),
                    Some((bit, None)) => {
                        self.emit_exp(bit, true)?;
                        self.out.push(0x3d);
                    }
                    Some((high, Some(low))) => {
                        self.emit_exp(high, true)?;
                        self.emit_exp(low, true)?;
                        self.out.push(0x3e);
                    }
                }
                self.out.push(0x90 + reg + ((op as u8) << 5));
                Ok(())
            }
            AstExpKind::Spr(index) => {
                let opcode = match op {
                    StackOp::Push => 0x24,
                    StackOp::Pop => 0x25,
                    StackOp::Using => 0x26,
                    StackOp::Pea => return Err(InnerError::context("can't apply @ to SPR").at(e.pos)),
                };
                self.emit_exp(index, true)?;
                self.out.push(opcode);
                Ok(())
            }
            _ => Err(not_assignable(e.pos)),
        }
    }

    fn emit_named_stack_op(&mut self, name: &str, pos: Pos, op: StackOp) -> Result<()> {
        match self.lookup(name, pos)? {
            Resolved::Con(owner, con) if op == StackOp::Push => {
                let value = self.evaluator().con_value(owner, con)?;
                self.out.push_int(value.as_bits());
                Ok(())
            }
            Resolved::Local(offset) => self.stack_op(op, 4, Space::Local, offset, None, pos),
            Resolved::Var(var) => self.stack_op(op, var.size.bytes(), Space::Var, var.offset, None, pos),
            Resolved::Dat(dat) => self.stack_op(op, dat.alignment, Space::Obj, dat.dp, None, pos),
            // An object reference is the pair (object address, VAR address << 16),
            // stored relative to the current object.
            Resolved::Obj(obj) if op == StackOp::Push => {
                self.stack_op(StackOp::Push, 4, Space::Obj, obj.index << 2, None, pos)?;
                self.out.push_int(self.globals.table(self.obj).hub_address);
                self.out.extend(&[0xec, 0x43, 0x37, 0x03, 0xe3, 0xec]);
                Ok(())
            }
            Resolved::Obj(obj) if op == StackOp::Pop => {
                self.out.push_int(self.globals.table(self.obj).hub_address);
                self.out.extend(&[0xed, 0x43, 0x37, 0x03, 0xe3, 0xed]);
                self.stack_op(StackOp::Pop, 4, Space::Obj, obj.index << 2, None, pos)
            }
            _ => Err(not_assignable(pos)),
        }
    }

    fn stack_op(&mut self, op: StackOp, size: i32, space: Space, offset: i32, index: Option<&AstExp>, pos: Pos) -> Result<()> {
        if let Some(index) = index {
            self.emit_exp(index, true)?;
        }
        let bytes = encode_stack_op(op, size, space, offset, index.is_some())
            .map_err(|msg| InnerError::ValueOutOfRange(msg).at(pos))?;
        self.out.extend(&bytes);
        Ok(())
    }

    /// Access width used by the sized increment and decrement opcodes.
    fn operand_size(&self, e: &AstExp) -> Result<i32> {
        let size = match &e.kind {
            AstExpKind::Id(name) | AstExpKind::Variable { name, size: None, .. } => {
                match self.lookup(name, e.pos)? {
                    Resolved::Local(_) => 4,
                    Resolved::Var(var) => var.size.bytes(),
                    Resolved::Dat(dat) => dat.alignment,
                    _ => return Err(not_assignable(e.pos)),
                }
            }
            AstExpKind::Variable { size: Some(size), .. } | AstExpKind::Memory { size, .. } => size.bytes(),
            AstExpKind::Register { .. } => 0,
            AstExpKind::Spr(_) => 4,
            _ => return Err(not_assignable(e.pos)),
        };
        Ok(size)
    }

    fn emit_unary(&mut self, op: AstUnaryOp, operand: &AstExp, pos: Pos, keep: bool) -> Result<()> {
        let Some(opcode) = op.opcode() else {
            if !keep {
                return Err(unused(pos));
            }
            if op == AstUnaryOp::AddressOf {
                return self.emit_stack_op(operand, StackOp::Pea);
            }
            // @@: add the object base to an offset
            self.emit_exp(operand, true)?;
            self.out.extend(&[0x97, 0x00]);
            return Ok(());
        };

        if op.is_assignment() {
            self.emit_stack_op(operand, StackOp::Using)?;
            let mut opcode = opcode;
            if (0x20..0x40).contains(&opcode) {
                opcode += match self.operand_size(operand)? {
                    1 => 2,
                    2 => 4,
                    4 => 6,
                    _ => 0,
                };
            }
            self.out.push(if keep { opcode + 0x80 } else { opcode });
        } else if keep {
            self.emit_exp(operand, true)?;
            self.out.push(opcode);
        } else {
            self.emit_stack_op(operand, StackOp::Using)?;
            self.out.push(opcode - 0xa0);
        }
        Ok(())
    }

    fn emit_call(&mut self, call: &Call<'_>, pos: Pos, keep: bool) -> Result<()> {
        let frame = match (call.abort_trap, keep) {
            (false, true) => 0x00,
            (false, false) => 0x01,
            (true, true) => 0x02,
            (true, false) => 0x03,
        };
        self.out.push(frame);
        for arg in call.args {
            self.emit_exp(arg, true)?;
        }

        let Some(object) = call.object else {
            if call.object_index.is_some() {
                return Err(InnerError::context("indexed call needs an object").at(pos));
            }
            let method = self.local_method(call.method, pos)?;
            check_args(method, call.args.len(), pos)?;
            self.out.extend(&[0x05, method.index as u8]);
            return Ok(());
        };

        let Resolved::Obj(obj) = self.lookup(object, pos)? else {
            return Err(InnerError::context(format!("{object} is not an object")).at(pos));
        };
        let Resolved::Method(method) = self.globals.lookup_existing(obj.target, None, call.method, pos)? else {
            let msg = format!("{object}.{} is not a method", call.method);
            return Err(InnerError::context(msg).at(pos));
        };
        if !method.public {
            let msg = format!("method {} is PRI", method.name.name);
            return Err(InnerError::context(msg).at(pos));
        }
        check_args(method, call.args.len(), pos)?;
        match call.object_index {
            None => self.out.extend(&[0x06, obj.index as u8, method.index as u8]),
            Some(index) => {
                self.emit_exp(index, true)?;
                self.out.extend(&[0x07, obj.index as u8, method.index as u8]);
            }
        }
        Ok(())
    }

    fn local_method(&self, name: &str, pos: Pos) -> Result<&'a MethodSymbol> {
        match self.lookup(name, pos)? {
            Resolved::Method(method) => Ok(method),
            _ => Err(InnerError::context(format!("{name} is not a method")).at(pos)),
        }
    }

    fn emit_look(&mut self, kind: LookKind, value: &AstExp, items: &[AstRange]) -> Result<()> {
        let zero_based = matches!(kind, LookKind::Lookupz | LookKind::Lookdownz);
        self.out.push(if zero_based { 0x35 } else { 0x36 });
        let end = self.out.new_target();
        self.out.offset(end);
        self.emit_exp(value, true)?;

        let (single, range) = match kind {
            LookKind::Lookup | LookKind::Lookupz => (0x10, 0x12),
            LookKind::Lookdown | LookKind::Lookdownz => (0x11, 0x13),
        };
        for item in items {
            match item {
                AstRange::Single(e) => {
                    self.emit_exp(e, true)?;
                    self.out.push(single);
                }
                AstRange::Span(low, high) => {
                    self.emit_exp(low, true)?;
                    self.emit_exp(high, true)?;
                    self.out.push(range);
                }
            }
        }
        self.out.push(0x0f);
        self.out.place(end);
        Ok(())
    }

    /// COGNEW (`cog == None`) and COGINIT. A Spin method started in a new cog
    /// is pushed as `index + params << 8` and launched through the stack mark.
    fn emit_cog(&mut self, cog: Option<&AstExp>, code: &AstExp, stack: &AstExp, pos: Pos, keep: bool) -> Result<()> {
        if cog.is_some() && keep {
            return Err(InnerError::context("COGINIT does not return a value").at(pos));
        }

        let spin_method = match &code.kind {
            AstExpKind::Id(name) => match self.globals.lookup(self.obj, Some(self.locals), name) {
                Some(Resolved::Method(method)) => Some((method, &[][..])),
                _ => None,
            },
            AstExpKind::Call {
                object: None,
                method,
                args,
                ..
            } => Some((self.local_method(method, code.pos)?, args.as_slice())),
            AstExpKind::Call { object: Some(_), .. } => {
                self.warn(code.pos, "calling a method in another object");
                None
            }
            _ => None,
        };

        match spin_method {
            Some((method, args)) => {
                for arg in args {
                    self.emit_exp(arg, true)?;
                }
                let param_count = method.param_count() as i32;
                self.out.push_int(method.index + (param_count << 8));
            }
            None => {
                match cog {
                    Some(cog) => self.emit_exp(cog, true)?,
                    None => self.out.push(COG_PUSH_ANY),
                }
                self.emit_exp(code, true)?;
            }
        }

        self.emit_exp(stack, true)?;

        if spin_method.is_some() {
            self.out.push(0x15);
            if let Some(cog) = cog {
                self.emit_exp(cog, true)?;
                self.out.extend(&[0x3f, 0x8f, 0x37, 0x61, 0xd1]);
            }
        }
        self.out.push(if keep { 0x28 } else { 0x2c });
        Ok(())
    }
}

struct Call<'e> {
    object: Option<&'e str>,
    object_index: Option<&'e AstExp>,
    method: &'e str,
    args: &'e [AstExp],
    abort_trap: bool,
}
