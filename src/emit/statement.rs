use super::stack_op::StackOp;
use super::MethodEmitter;
use crate::ast::*;
use crate::error::{InnerError, Result};
use crate::fixup::TargetId;

const GOTO: u8 = 0x04;
const JUMP_IF_FALSE: u8 = 0x0a;
const JUMP_IF_TRUE: u8 = 0x0b;
const CASE_DONE: u8 = 0x0c;

impl MethodEmitter<'_> {
    pub(crate) fn emit_block(&mut self, body: &[AstStatement]) -> Result<()> {
        for statement in body {
            self.emit_statement(statement)?;
        }
        Ok(())
    }

    pub fn emit_statement(&mut self, s: &AstStatement) -> Result<()> {
        match &s.kind {
            AstStatementKind::Exp(e) => self.emit_exp(e, false),
            AstStatementKind::Return(value) => self.emit_exit(value.as_ref(), 0x32),
            AstStatementKind::Abort(value) => self.emit_exit(value.as_ref(), 0x30),
            AstStatementKind::If {
                negate,
                condition,
                then,
                els,
            } => {
                self.emit_exp(condition, true)?;
                let else_target = self.out.new_target();
                self.out.jump(if *negate { JUMP_IF_TRUE } else { JUMP_IF_FALSE }, else_target);
                self.emit_block(then)?;
                match els {
                    None => self.out.place(else_target),
                    Some(els) => {
                        let end = self.out.new_target();
                        self.out.jump(GOTO, end);
                        self.out.place(else_target);
                        self.emit_block(els)?;
                        self.out.place(end);
                    }
                }
                Ok(())
            }
            AstStatementKind::Repeat(repeat) => self.emit_repeat(repeat),
            AstStatementKind::Next => self.emit_next_quit(true, s.pos),
            AstStatementKind::Quit => self.emit_next_quit(false, s.pos),
            AstStatementKind::Case { value, arms, other } => self.emit_case(value, arms, other),
            AstStatementKind::Reboot => {
                self.out.extend(&[0x37, 0x06, 0x35, 0x20]);
                Ok(())
            }
            AstStatementKind::FillMove(op, args) => self.emit_builtin(args, op.opcode()),
            AstStatementKind::Wait(op, args) => self.emit_builtin(args, op.opcode()),
            AstStatementKind::Clkset(mode, freq) => {
                self.emit_exp(mode, true)?;
                self.emit_exp(freq, true)?;
                self.out.push(0x20);
                Ok(())
            }
            AstStatementKind::Cogstop(cog) => {
                self.emit_exp(cog, true)?;
                self.out.push(0x21);
                Ok(())
            }
        }
    }

    /// RETURN and ABORT; the opcode after `bare` takes a value.
    fn emit_exit(&mut self, value: Option<&AstExp>, bare: u8) -> Result<()> {
        match value {
            None => self.out.push(bare),
            Some(value) => {
                self.emit_exp(value, true)?;
                self.out.push(bare + 1);
            }
        }
        Ok(())
    }

    fn emit_builtin(&mut self, args: &[AstExp], opcode: u8) -> Result<()> {
        for arg in args {
            self.emit_exp(arg, true)?;
        }
        self.out.push(opcode);
        Ok(())
    }

    fn emit_repeat(&mut self, repeat: &AstRepeat) -> Result<()> {
        let saved = (self.next, self.quit, self.case_nesting, self.inside_plain);
        let next = self.out.new_target();
        let quit = self.out.new_target();
        self.next = Some(next);
        self.quit = Some(quit);
        self.case_nesting = 0;
        let result = self.emit_loop(repeat, next, quit);
        (self.next, self.quit, self.case_nesting, self.inside_plain) = saved;
        result
    }

    fn emit_loop(&mut self, repeat: &AstRepeat, next: TargetId, quit: TargetId) -> Result<()> {
        match repeat {
            AstRepeat::Forever(body) => {
                self.inside_plain = true;
                self.out.place(next);
                self.emit_block(body)?;
                self.out.jump(GOTO, next);
            }
            AstRepeat::Times { count, body } => {
                self.inside_plain = false;
                self.emit_exp(count, true)?;
                self.out.jump(0x08, quit);
                let top = self.out.new_target();
                self.out.place(top);
                self.emit_block(body)?;
                self.out.place(next);
                self.out.jump(0x09, top);
            }
            AstRepeat::PreCondition { until, condition, body } => {
                self.inside_plain = true;
                self.out.place(next);
                self.emit_exp(condition, true)?;
                self.out.jump(if *until { JUMP_IF_TRUE } else { JUMP_IF_FALSE }, quit);
                self.emit_block(body)?;
                self.out.jump(GOTO, next);
            }
            AstRepeat::PostCondition { until, condition, body } => {
                self.inside_plain = true;
                let top = self.out.new_target();
                self.out.place(top);
                self.emit_block(body)?;
                self.out.place(next);
                self.emit_exp(condition, true)?;
                self.out.jump(if *until { JUMP_IF_FALSE } else { JUMP_IF_TRUE }, top);
            }
            AstRepeat::FromTo {
                var,
                from,
                to,
                step,
                body,
            } => {
                self.inside_plain = true;
                let top = self.out.new_target();
                self.emit_exp(from, true)?;
                self.emit_stack_op(var, StackOp::Pop)?;
                self.out.place(top);
                self.emit_block(body)?;
                self.out.place(next);
                let mut opcode = 0x02;
                if let Some(step) = step {
                    self.emit_exp(step, true)?;
                    opcode = 0x06;
                }
                self.emit_exp(from, true)?;
                self.emit_exp(to, true)?;
                self.emit_stack_op(var, StackOp::Using)?;
                self.out.jump(opcode, top);
            }
        }
        self.out.place(quit);
        Ok(())
    }

    /// Jumping out of a CASE first pops its saved dispatch state.
    fn emit_next_quit(&mut self, is_next: bool, pos: Pos) -> Result<()> {
        let target = if is_next { self.next } else { self.quit };
        let Some(target) = target else {
            return Err(InnerError::context("no enclosing REPEAT loop").at(pos));
        };
        if self.case_nesting > 0 {
            self.out.push_int(self.case_nesting << 3);
            self.out.push(0x14);
        }
        let opcode = if !is_next && !self.inside_plain {
            JUMP_IF_TRUE
        } else {
            GOTO
        };
        self.out.jump(opcode, target);
        Ok(())
    }

    fn emit_case(&mut self, value: &AstExp, arms: &[AstCaseArm], other: &[AstStatement]) -> Result<()> {
        self.case_nesting += 1;
        let end = self.out.new_target();
        self.out.offset(end);
        self.emit_exp(value, true)?;

        let targets: Vec<TargetId> = arms.iter().map(|_| self.out.new_target()).collect();
        for (arm, &target) in arms.iter().zip(&targets) {
            for range in &arm.matches {
                match range {
                    AstRange::Single(e) => {
                        self.emit_exp(e, true)?;
                        self.out.jump(0x0d, target);
                    }
                    AstRange::Span(low, high) => {
                        self.emit_exp(low, true)?;
                        self.emit_exp(high, true)?;
                        self.out.jump(0x0e, target);
                    }
                }
            }
        }
        self.emit_block(other)?;
        self.out.push(CASE_DONE);

        for (arm, &target) in arms.iter().zip(&targets) {
            self.out.place(target);
            self.emit_block(&arm.body)?;
            self.out.push(CASE_DONE);
        }
        self.out.place(end);
        self.case_nesting -= 1;
        Ok(())
    }
}
