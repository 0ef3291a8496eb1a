use super::clock::{clock_settings, int_con, ClockSettings};
use super::dedup::object_entries;
use crate::ast::Pos;
use crate::config::{Config, DEFAULT_MEMORY_SIZE};
use crate::error::{InnerError, Result};
use crate::layout::total_var_size;
use crate::resolve::{GlobalTable, ObjId};

/// Boot header bytes in front of the first object.
pub const HEADER_SIZE: i32 = 0x10;

const STACK_GUARD: [u8; 8] = [0xff, 0xff, 0xf9, 0xff, 0xff, 0xff, 0xf9, 0xff];
/// Calls method 1 of the object at the stub's table pointer, then returns.
const SPACE_STUB: [u8; 5] = [0x01, 0x06, 0x02, 0x01, 0x32];

/// A linked hub memory image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub memory: Vec<u8>,
    pub var_base: usize,
    pub stack_base: usize,
    pub clock: ClockSettings,
}

impl Image {
    /// Program bytes only, up to the VAR base.
    pub fn binary(&self) -> &[u8] {
        &self.memory[..self.var_base]
    }

    /// The whole memory, as burned into EEPROM.
    pub fn eeprom(&self) -> &[u8] {
        &self.memory
    }

    pub fn word(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.memory[at], self.memory[at + 1]])
    }

    pub fn initial_pc(&self) -> usize {
        self.word(0x0c) as usize
    }

    pub fn initial_sp(&self) -> usize {
        self.word(0x0e) as usize
    }

    pub fn checksum_ok(&self) -> bool {
        self.memory.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) == 0
    }
}

fn too_large(msg: String) -> crate::error::CompileError {
    InnerError::ImageTooLarge(msg).at(Pos::default())
}

fn put_word(memory: &mut [u8], at: usize, value: i32) {
    memory[at] = value as u8;
    memory[at + 1] = (value >> 8) as u8;
}

fn push_word(out: &mut Vec<u8>, value: i32) {
    out.push(value as u8);
    out.push((value >> 8) as u8);
}

/// Bytes reserved after the header by `_SPACE`, summed over every object.
fn reserved_space(globals: &GlobalTable) -> Result<i32> {
    let mut space = 0;
    for &id in globals.order() {
        if let Some((value, pos)) = int_con(globals, id, "_SPACE")? {
            if value < 0 {
                let file = &globals.table(id).file;
                return Err(InnerError::ValueOutOfRange("_SPACE < 0".to_owned()).at(pos).in_file(file));
            }
            log::debug!("{}: _SPACE = {value}", globals.table(id).file);
            space += value;
        }
    }
    if space > 0 {
        space = ((space + 3) & !3).max(12);
        log::info!("reserving {space} bytes at $0010");
        space += 8;
    }
    Ok(space)
}

/// Serializes one compiled object at hub address `base`: header, method
/// table, sub-object table, DAT bytes, then the methods.
pub(crate) fn object_bytes(globals: &GlobalTable, id: ObjId, base: i32) -> Vec<u8> {
    let table = globals.table(id);
    let mut out = Vec::with_capacity(table.size_in_bytes as usize);
    push_word(&mut out, table.size_in_bytes);
    out.push((table.method_count() + 1) as u8);
    out.push(table.n_objs as u8);
    for method in table.methods_in_table_order() {
        push_word(&mut out, method.offset);
        push_word(&mut out, method.locals_size);
    }
    for (target, var_offset) in object_entries(globals, id) {
        push_word(&mut out, globals.record(target).address - base);
        push_word(&mut out, var_offset);
    }
    out.extend_from_slice(&table.dat_bytes);
    for method in table.methods_in_table_order() {
        out.extend_from_slice(&method.bytes);
    }
    out.resize(table.size_in_bytes as usize, 0);
    out
}

/// Assigns final addresses to the surviving objects and writes the image.
pub fn build_image(globals: &mut GlobalTable, config: &Config) -> Result<Image> {
    let space = reserved_space(globals)?;
    let base = HEADER_SIZE + space;
    let memory_size = config.memory_size as i32;

    let order = globals.order().to_vec();
    let survivors: Vec<ObjId> = order
        .iter()
        .copied()
        .filter(|&id| globals.record(id).forward_link.is_none())
        .collect();
    let mut address = base;
    for &id in &survivors {
        globals.record_mut(id).address = address;
        log::debug!("{} at {address:#06x}", globals.table(id).file);
        address += globals.table(id).size_in_bytes;
    }
    if address >= memory_size {
        return Err(too_large(format!("program is {address} bytes, memory is {memory_size}")));
    }

    let mut memory = vec![0u8; config.memory_size];
    for &id in &survivors {
        let at = globals.record(id).address;
        let bytes = object_bytes(globals, id, at);
        let at = at as usize;
        memory[at..at + bytes.len()].copy_from_slice(&bytes);
    }

    let clock = clock_settings(globals)?;
    memory[0..4].copy_from_slice(&clock.frequency.to_le_bytes());
    memory[4] = clock.mode;
    put_word(&mut memory, 6, HEADER_SIZE);

    let var_base = address;
    put_word(&mut memory, 8, var_base);

    let root = globals.root();
    address += total_var_size(globals, root);
    let free = int_con(globals, root, "_FREE")?.map_or(0, |(v, _)| v);
    let stack = int_con(globals, root, "_STACK")?.map_or(config.default_stack_longs, |(v, _)| v);
    if config.memory_size == DEFAULT_MEMORY_SIZE {
        if stack + free >= 8192 {
            return Err(too_large("_STACK + _FREE must be < 8192 longs".to_owned()));
        }
        let excess = address / 4 + free + stack - 8192;
        if excess > 0 {
            return Err(too_large(format!("program too big by {excess} longs")));
        }
    }
    if address + STACK_GUARD.len() as i32 > memory_size {
        return Err(too_large(format!("no room for the stack guard at {address:#06x}")));
    }
    let guard_at = address as usize;
    memory[guard_at..guard_at + STACK_GUARD.len()].copy_from_slice(&STACK_GUARD);
    let stack_base = address + STACK_GUARD.len() as i32;
    put_word(&mut memory, 10, stack_base);

    let root_table = globals.table(root);
    let Some(first) = root_table.first_public() else {
        return Err(InnerError::NoPublicMethods(root_table.file.clone()).at(Pos::default()));
    };
    let root_address = globals.record(globals.canonical(root)).address;
    put_word(&mut memory, 12, root_address + first.offset);
    put_word(&mut memory, 14, stack_base + first.all_locals_size());

    if space > 0 {
        let stub = HEADER_SIZE + space - 8;
        let at = HEADER_SIZE as usize;
        put_word(&mut memory, at, space);
        memory[at + 2] = 2;
        memory[at + 3] = 1;
        put_word(&mut memory, at + 4, stub - HEADER_SIZE);
        put_word(&mut memory, at + 8, space);
        let stub = stub as usize;
        memory[stub..stub + SPACE_STUB.len()].copy_from_slice(&SPACE_STUB);
        put_word(&mut memory, 12, stub as i32);
    }

    let sum = memory.iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
    memory[5] = sum.wrapping_neg();

    Ok(Image {
        memory,
        var_base: var_base as usize,
        stack_base: stack_base as usize,
        clock,
    })
}
