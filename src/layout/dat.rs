use crate::ast::*;
use crate::config::Config;
use crate::error::{InnerError, Result};
use crate::resolve::{symbol_key, DatSymbol, Evaluator, GlobalTable, ObjId, SymbolRef};
use crate::value::Value;

const JUMP_MNEMONICS: [&str; 4] = ["JMP", "DJNZ", "TJNZ", "TJZ"];

/// Bound on cog addresses (x4) set by ORG and RES, leaving room for `dp`.
const COG_X4_LIMIT: i32 = i32::MAX / 4;

/// What a DAT pass does at each entry; the bookkeeping of `dp`, cog
/// addresses and alignment is shared by both passes.
pub trait DatPhase {
    fn label(&mut self, globals: &mut GlobalTable, id: ObjId, key: String, symbol: DatSymbol) -> Result<()>;

    /// `at` is the offset into the DAT blob.
    fn instruction(&mut self, eval: &Evaluator, instr: &DatInstruction, at: usize) -> Result<()>;

    /// Returns an advisory message if the value does not fit.
    fn data(&mut self, eval: &Evaluator, data: &DatData, count: i32, at: usize) -> Result<Option<String>>;

    fn file(&mut self, bytes: &[u8], at: usize);

    /// Only one pass reports the structural warnings.
    fn reports_warnings(&self) -> bool;
}

/// First pass: sizes entries and registers labels.
#[derive(Debug, Default)]
pub struct SizePhase;

impl DatPhase for SizePhase {
    fn label(&mut self, globals: &mut GlobalTable, id: ObjId, key: String, symbol: DatSymbol) -> Result<()> {
        globals.table_mut(id).add_dat(key, symbol)
    }

    fn instruction(&mut self, _: &Evaluator, _: &DatInstruction, _: usize) -> Result<()> {
        Ok(())
    }

    fn data(&mut self, _: &Evaluator, _: &DatData, _: i32, _: usize) -> Result<Option<String>> {
        Ok(None)
    }

    fn file(&mut self, _: &[u8], _: usize) {}

    fn reports_warnings(&self) -> bool {
        true
    }
}

/// Second pass: serializes data and instructions against resolved labels.
#[derive(Debug)]
pub struct EmitPhase {
    pub bytes: Vec<u8>,
}

impl EmitPhase {
    pub fn new(len: usize) -> Self {
        Self { bytes: vec![0; len] }
    }

    fn write(&mut self, at: usize, size: usize, value: i32) {
        let le = value.to_le_bytes();
        self.bytes[at..at + size].copy_from_slice(&le[..size]);
    }
}

impl DatPhase for EmitPhase {
    fn label(&mut self, globals: &mut GlobalTable, id: ObjId, key: String, symbol: DatSymbol) -> Result<()> {
        let table = globals.table(id);
        let Some(SymbolRef::Dat(i)) = table.lookup(&key) else {
            return Err(InnerError::UnknownSymbol(symbol.name.name).at(symbol.name.pos));
        };
        let first = &table.dats[i];
        if first.dp != symbol.dp || first.cog_x4 != symbol.cog_x4 {
            let msg = format!("label {} moved between DAT passes", symbol.name.name);
            return Err(InnerError::context(msg).at(symbol.name.pos));
        }
        Ok(())
    }

    fn instruction(&mut self, eval: &Evaluator, instr: &DatInstruction, at: usize) -> Result<()> {
        let word = encode_instruction(eval, instr)?;
        self.write(at, 4, word as i32);
        Ok(())
    }

    fn data(&mut self, eval: &Evaluator, data: &DatData, count: i32, at: usize) -> Result<Option<String>> {
        let value = eval.eval(&data.value)?;
        if !value.is_int() && data.size != 4 {
            let msg = "floating-point not allowed in byte or word data";
            return Err(InnerError::TypeMismatch(msg.into()).at(data.value.pos));
        }
        let bits = value.as_bits();
        let size = usize::from(data.size);
        for n in 0..count as usize {
            self.write(at + n * size, size, bits);
        }
        let truncated = match (value, data.size) {
            (Value::Int(v), 1) => v & !0xff != 0,
            (Value::Int(v), 2) => v & !0xffff != 0,
            _ => false,
        };
        Ok(truncated.then(|| "data truncation".to_owned()))
    }

    fn file(&mut self, bytes: &[u8], at: usize) {
        self.bytes[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn reports_warnings(&self) -> bool {
        false
    }
}

fn encode_instruction(eval: &Evaluator, instr: &DatInstruction) -> Result<u32> {
    let ret_label;
    let mut dest = instr.dest.as_ref();
    if dest.is_none() && instr.mnemonic.eq_ignore_ascii_case("CALL") {
        if let Some(label) = instr.src.as_ref().and_then(AstExp::get_id) {
            ret_label = AstExp::at(AstExpKind::Id(format!("{label}_ret")), instr.pos);
            dest = Some(&ret_label);
        }
    }
    let d = register_field(eval, dest, "destination")?;
    let s = register_field(eval, instr.src.as_ref(), "source")?;

    let mut word = instr
        .opcode
        .wrapping_add(d << 9)
        .wrapping_add(s)
        .wrapping_add(u32::from(instr.immediate) << 22);
    word |= u32::from(instr.effect & 7) << 23;
    if instr.effect >= 8 {
        word &= !(1 << 23);
    }
    word = (word & !(0x0f << 18)) | (u32::from(instr.cond) << 18);
    Ok(word)
}

fn register_field(eval: &Evaluator, e: Option<&AstExp>, which: &str) -> Result<u32> {
    let Some(e) = e else { return Ok(0) };
    let v = eval.eval_int(e)?;
    if v & !0x1ff != 0 {
        let msg = format!("{which} register cannot exceed $1ff");
        return Err(InnerError::ValueOutOfRange(msg).at(e.pos));
    }
    Ok(v as u32)
}

fn align(dp: i32, alignment: i32) -> i32 {
    let alignment = alignment.max(1);
    (dp + alignment - 1) & -alignment
}

/// Walks the DAT entries of one object with the given phase and returns the
/// byte offset just past the last entry.
pub fn walk_dat<P: DatPhase>(globals: &mut GlobalTable, id: ObjId, config: &Config, phase: &mut P) -> Result<i32> {
    let entries = std::mem::take(&mut globals.table_mut(id).dat);
    let result = DatWalker::new(globals, id, config).run(&entries, phase);
    let table = globals.table_mut(id);
    table.dat = entries;
    result.map_err(|e| e.in_file(&table.file))
}

struct DatWalker<'a> {
    globals: &'a mut GlobalTable,
    id: ObjId,
    fit_limit: i32,
    header: i32,
    /// Past this the object cannot fit in hub memory.
    dp_limit: i32,
    dp: i32,
    /// Cog address (x4) minus `dp`.
    ooo: i32,
    alignment: i32,
    orgx: bool,
    after_res: bool,
}

impl<'a> DatWalker<'a> {
    fn new(globals: &'a mut GlobalTable, id: ObjId, config: &Config) -> Self {
        let header = globals.table(id).header_size;
        Self {
            globals,
            id,
            fit_limit: config.fit_limit,
            header,
            dp_limit: i32::try_from(config.memory_size).map_or(COG_X4_LIMIT, |m| m.min(COG_X4_LIMIT)),
            dp: header,
            ooo: -header,
            alignment: 1,
            orgx: false,
            after_res: false,
        }
    }

    fn here(&self) -> i32 {
        if self.orgx {
            0
        } else {
            (self.dp + self.ooo) / 4
        }
    }

    fn offset(&self) -> usize {
        (self.dp - self.header) as usize
    }

    /// `dp` after `count` units of `unit` bytes, or an error if that runs
    /// past hub memory.
    fn advanced(&self, pos: Pos, unit: i32, count: i32) -> Result<i32> {
        unit.checked_mul(count)
            .and_then(|n| self.dp.checked_add(n))
            .filter(|&end| end <= self.dp_limit)
            .ok_or_else(|| {
                let msg = format!("DAT section exceeds {} bytes", self.dp_limit);
                InnerError::ImageTooLarge(msg).at(pos)
            })
    }

    /// Sets `ooo` so the current `dp` maps to cog address `base + 4 * longs`.
    fn set_cog(&mut self, pos: Pos, base: i32, longs: i32) -> Result<()> {
        let cog_x4 = longs
            .checked_mul(4)
            .and_then(|n| base.checked_add(n))
            .filter(|c| (-COG_X4_LIMIT..=COG_X4_LIMIT).contains(c))
            .ok_or_else(|| InnerError::ValueOutOfRange("cog address out of range".into()).at(pos))?;
        self.ooo = cog_x4 - self.dp;
        Ok(())
    }

    fn eval(&self) -> Evaluator<'_> {
        Evaluator::new(&*self.globals, self.id).in_dat(self.here())
    }

    fn eval_int_or(&self, e: Option<&AstExp>, default: i32) -> Result<i32> {
        e.map_or(Ok(default), |e| self.eval().eval_int(e))
    }

    fn warn<P: DatPhase>(&mut self, phase: &P, pos: Pos, msg: &str) {
        if phase.reports_warnings() {
            self.globals.warn(self.id, pos, msg);
        }
    }

    fn run<P: DatPhase>(mut self, entries: &[DatEntry], phase: &mut P) -> Result<i32> {
        self.globals.table_mut(self.id).latest_label.clear();
        for entry in entries {
            self.entry(entry, phase)?;
        }
        Ok(self.dp)
    }

    fn entry<P: DatPhase>(&mut self, entry: &DatEntry, phase: &mut P) -> Result<()> {
        match entry {
            DatEntry::Label { name, alignment } => {
                if *alignment != 0 {
                    self.alignment = i32::from(*alignment);
                    self.dp = align(self.dp, self.alignment);
                }
                let local = name.name.starts_with(':');
                let key = if local {
                    self.globals.table(self.id).canonical_name(&name.name)
                } else {
                    symbol_key(&name.name)
                };
                let symbol = DatSymbol {
                    name: name.clone(),
                    alignment: self.alignment,
                    dp: self.dp,
                    cog_x4: if self.orgx { 0 } else { self.dp + self.ooo },
                };
                phase.label(self.globals, self.id, key, symbol)?;
                if !local {
                    self.globals.table_mut(self.id).latest_label.clone_from(&name.name);
                }
            }
            DatEntry::Org { pos, origin } => {
                self.dp = align(self.dp, 4);
                let org = self.eval_int_or(origin.as_ref(), 0)?;
                self.set_cog(*pos, 0, org)?;
                self.orgx = false;
                self.alignment = 4;
                self.after_res = false;
            }
            DatEntry::Orgx { .. } => {
                self.orgx = true;
                self.after_res = false;
            }
            DatEntry::Instruction(instr) => {
                self.alignment = 4;
                self.dp = align(self.dp, 4);
                if self.after_res {
                    self.warn(phase, instr.pos, "assembly language after RES");
                }
                let mnemonic = instr.mnemonic.to_ascii_uppercase();
                if JUMP_MNEMONICS.contains(&mnemonic.as_str()) && !instr.immediate {
                    let msg = format!("{mnemonic} with non-immediate operand");
                    self.warn(phase, instr.pos, &msg);
                }
                let end = self.advanced(instr.pos, 4, 1)?;
                phase.instruction(&self.eval(), instr, self.offset())?;
                self.dp = end;
            }
            DatEntry::Res { pos, count } => {
                self.alignment = 4;
                self.dp = align(self.dp, 4);
                let count = self.eval_int_or(count.as_ref(), 1)?;
                self.set_cog(*pos, self.dp + self.ooo, count)?;
                self.after_res = true;
            }
            DatEntry::Fit { pos, limit } => {
                if !self.orgx {
                    let limit = self.eval_int_or(limit.as_ref(), self.fit_limit)?;
                    let cog = (self.dp + self.ooo + 3) / 4;
                    if cog > limit {
                        return Err(InnerError::OriginOverflow(cog - limit).at(*pos));
                    }
                }
            }
            DatEntry::File { pos, bytes } => {
                self.alignment = 1;
                if self.after_res {
                    self.warn(phase, *pos, "FILE after RES");
                }
                let len = i32::try_from(bytes.len()).unwrap_or(i32::MAX);
                let end = self.advanced(*pos, 1, len)?;
                phase.file(bytes, self.offset());
                self.dp = end;
            }
            DatEntry::Data(data) => {
                if !matches!(data.size, 1 | 2 | 4) {
                    let msg = format!("data size must be 1, 2 or 4, not {}", data.size);
                    return Err(InnerError::context(msg).at(data.pos));
                }
                let alignment = i32::from(data.alignment);
                if i32::from(data.size) < alignment {
                    let msg = "size override must be larger";
                    return Err(InnerError::context(msg).at(data.pos));
                }
                self.dp = align(self.dp, alignment);
                if self.after_res {
                    self.warn(phase, data.pos, "data after RES");
                }
                let count = self.eval_int_or(data.count.as_ref(), 1)?;
                if count < 0 {
                    let msg = format!("negative data count {count}");
                    return Err(InnerError::ValueOutOfRange(msg).at(data.pos));
                }
                let end = self.advanced(data.pos, i32::from(data.size), count)?;
                let message = phase.data(&self.eval(), data, count, self.offset())?;
                if let Some(message) = message {
                    self.globals.warn(self.id, data.value.pos, message);
                }
                self.dp = end;
                self.alignment = alignment;
            }
        }
        Ok(())
    }
}
