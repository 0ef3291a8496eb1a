//! Method bytecode.
//!
//! A [`MethodEmitter`] walks one method body and appends to a
//! [`ByteStream`]: plain bytes, relocation records for branches, CASE and
//! LOOKUP tables and string pointers, and the targets they refer to. The
//! string pool is appended after the implicit final RETURN, then the stream
//! is fixed up against the method's offset in its object.
mod exp;
mod method;
pub mod push;
mod stack_op;
mod statement;

#[cfg(test)]
mod emit_tests;

pub use method::{compile_method, compile_methods, CompiledMethod};
pub use stack_op::{encode_mem_op, encode_stack_op, Space, StackOp};

use crate::ast::{AstStatement, Pos};
use crate::error::{InnerError, Result};
use crate::fixup::{ByteStream, TargetId};
use crate::resolve::{Evaluator, GlobalTable, LocalScope, ObjId, Resolved};

const RETURN: u8 = 0x32;

pub struct MethodEmitter<'a> {
    globals: &'a GlobalTable,
    obj: ObjId,
    locals: &'a LocalScope,
    out: ByteStream,
    strings: Vec<(TargetId, String)>,
    next: Option<TargetId>,
    quit: Option<TargetId>,
    /// QUIT out of a counted REPEAT has to drop the loop counter.
    inside_plain: bool,
    case_nesting: i32,
    warnings: Vec<(Pos, String)>,
}

impl<'a> MethodEmitter<'a> {
    pub fn new(globals: &'a GlobalTable, obj: ObjId, locals: &'a LocalScope) -> Self {
        Self {
            globals,
            obj,
            locals,
            out: ByteStream::new(),
            strings: Vec::new(),
            next: None,
            quit: None,
            inside_plain: true,
            case_nesting: 0,
            warnings: Vec::new(),
        }
    }

    pub fn stream(&self) -> &ByteStream {
        &self.out
    }

    pub fn emit_body(&mut self, body: &[AstStatement]) -> Result<()> {
        self.emit_block(body)
    }

    /// Appends the final RETURN and the string pool, then resolves the
    /// stream for a method starting at object offset `base`.
    pub fn finish(mut self, base: i32, limit: usize) -> std::result::Result<(Vec<u8>, Vec<(Pos, String)>), InnerError> {
        self.out.push(RETURN);
        for (target, text) in std::mem::take(&mut self.strings) {
            self.out.place(target);
            for ch in text.chars() {
                self.out.push(ch as u8);
            }
            self.out.push(0);
        }
        self.out.fixup(base, limit)?;
        Ok((self.out.to_bytes(), self.warnings))
    }

    fn lookup(&self, name: &str, pos: Pos) -> Result<Resolved<'a>> {
        self.globals.lookup_existing(self.obj, Some(self.locals), name, pos)
    }

    fn evaluator(&self) -> Evaluator<'a> {
        Evaluator::new(self.globals, self.obj).with_locals(self.locals)
    }

    fn warn(&mut self, pos: Pos, message: impl Into<String>) {
        self.warnings.push((pos, message.into()));
    }
}
