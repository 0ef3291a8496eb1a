#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOp {
    Push = 0,
    Pop = 1,
    Using = 2,
    /// Push effective address.
    Pea = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Mem = 0,
    Obj = 1,
    Var = 2,
    Local = 3,
}

/// Encodes a load/store of `size` bytes at `offset` in `space`. The index
/// expression, if any, must already be on the stack.
pub fn encode_stack_op(op: StackOp, size: i32, space: Space, offset: i32, indexed: bool) -> Result<Vec<u8>, String> {
    let short_space = matches!(space, Space::Var | Space::Local);
    if offset < 32 && size == 4 && short_space && !indexed {
        if offset & 3 != 0 {
            return Err(format!("non-long offset {offset}"));
        }
        let base = if space == Space::Var { 0x40 } else { 0x60 };
        return Ok(vec![base | op as u8 | offset as u8]);
    }
    let mut bytes = vec![long_form(op, size, space, indexed)];
    if offset < 128 {
        bytes.push(offset as u8);
    } else {
        bytes.push(((offset >> 8) | 0x80) as u8);
        bytes.push(offset as u8);
    }
    Ok(bytes)
}

/// Memory access through an address on the stack; no offset operand.
pub fn encode_mem_op(op: StackOp, size: i32, indexed: bool) -> u8 {
    long_form(op, size, Space::Mem, indexed)
}

fn long_form(op: StackOp, size: i32, space: Space, indexed: bool) -> u8 {
    let index_bit = if indexed { 0x10 } else { 0 };
    0x80 | (((size >> 1) << 5) as u8) | ((space as u8) << 2) | op as u8 | index_bit
}
