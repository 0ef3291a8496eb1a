//! Relocatable bytecode and the fixed-point engine that resolves it.
//!
//! A method is emitted as a [`ByteStream`]: runs of final bytes, relocation
//! records whose width depends on where their target lands, and target
//! markers. Targets live in an arena and records refer to them by index, so
//! any number of records may share one target.
//!
//! [`ByteStream::fixup`] alternates an assign pass (addresses from current
//! widths) and a resolve pass (re-encode every record) until neither changes
//! anything. Record widths only ever grow; a record that would shrink, or a
//! stream that keeps changing past the iteration limit, is a divergence.
use crate::emit::push::encode_push;
use crate::error::InnerError;

type Result<T> = std::result::Result<T, InnerError>;

#[cfg(test)]
mod fixup_tests;

pub const STRING_PUSH: u8 = 0x87;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// Relative branch with the given opcode.
    Jump(u8),
    /// Push of the target's object-relative address.
    Offset,
    /// Two-byte push of a string's object-relative address.
    StringOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloc {
    pub kind: RelocKind,
    pub target: TargetId,
    pub bytes: Vec<u8>,
    pub address: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Code(Vec<u8>),
    Reloc(Reloc),
    Target(TargetId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TargetSlot {
    address: i32,
    placed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    chunks: Vec<Chunk>,
    targets: Vec<TargetSlot>,
}

/// Relative branch operand: one byte for -64..62, otherwise two bytes with
/// the high bit of the first set for forward branches. A forward 63 takes the
/// long form, matching the `80 3f` the Propeller Tool emits.
pub fn encode_jump_offset(delta: i32, two_bytes: bool) -> Vec<u8> {
    if delta >= 0 {
        if delta < 63 && !two_bytes {
            vec![delta as u8]
        } else {
            vec![((delta >> 8) | 0x80) as u8, delta as u8]
        }
    } else if delta >= -64 && !two_bytes {
        vec![(delta + 128) as u8]
    } else {
        vec![(delta >> 8) as u8, delta as u8]
    }
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn push(&mut self, byte: u8) {
        if let Some(Chunk::Code(code)) = self.chunks.last_mut() {
            code.push(byte);
        } else {
            self.chunks.push(Chunk::Code(vec![byte]));
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    pub fn push_int(&mut self, v: i32) {
        let mut bytes = Vec::with_capacity(5);
        encode_push(v, 1, &mut bytes);
        self.extend(&bytes);
    }

    pub fn new_target(&mut self) -> TargetId {
        self.targets.push(TargetSlot::default());
        TargetId(self.targets.len() - 1)
    }

    pub fn place(&mut self, target: TargetId) {
        debug_assert!(!self.targets[target.0].placed, "target placed twice");
        self.targets[target.0].placed = true;
        self.chunks.push(Chunk::Target(target));
    }

    pub fn jump(&mut self, opcode: u8, target: TargetId) {
        self.reloc(RelocKind::Jump(opcode), target, vec![opcode, 0]);
    }

    pub fn offset(&mut self, target: TargetId) {
        self.reloc(RelocKind::Offset, target, vec![0, 0]);
    }

    pub fn string_offset(&mut self, target: TargetId) {
        self.reloc(RelocKind::StringOffset, target, vec![STRING_PUSH, 0x80, 0]);
    }

    fn reloc(&mut self, kind: RelocKind, target: TargetId, bytes: Vec<u8>) {
        self.chunks.push(Chunk::Reloc(Reloc {
            kind,
            target,
            bytes,
            address: 0,
        }));
    }

    pub fn target_address(&self, target: TargetId) -> i32 {
        self.targets[target.0].address
    }

    pub fn len(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Code(code) => code.len(),
                Chunk::Reloc(reloc) => reloc.bytes.len(),
                Chunk::Target(_) => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves every record for a stream that starts at object offset
    /// `base`, stopping with an error after `limit` rounds.
    pub fn fixup(&mut self, base: i32, limit: usize) -> Result<()> {
        if let Some(i) = self.targets.iter().position(|t| !t.placed) {
            let msg = format!("branch target {i} is never placed");
            return Err(InnerError::FixupDivergence(msg));
        }
        for round in 1..=limit {
            let moved = self.assign(base);
            let resized = self.resolve()?;
            log::trace!("fixup round {round}: moved={moved} resized={resized}");
            if !moved && !resized {
                return Ok(());
            }
        }
        let msg = format!("still changing after {limit} rounds");
        Err(InnerError::FixupDivergence(msg))
    }

    fn assign(&mut self, base: i32) -> bool {
        let mut changed = false;
        let mut address = base;
        for chunk in &mut self.chunks {
            match chunk {
                Chunk::Code(code) => address += code.len() as i32,
                Chunk::Reloc(reloc) => {
                    changed |= reloc.address != address;
                    reloc.address = address;
                    address += reloc.bytes.len() as i32;
                }
                Chunk::Target(t) => {
                    let slot = &mut self.targets[t.0];
                    changed |= slot.address != address;
                    slot.address = address;
                }
            }
        }
        changed
    }

    fn resolve(&mut self) -> Result<bool> {
        let mut changed = false;
        for chunk in &mut self.chunks {
            let Chunk::Reloc(reloc) = chunk else { continue };
            let target = self.targets[reloc.target.0].address;
            let bytes = encode_reloc(reloc, target);
            if bytes.len() < reloc.bytes.len() {
                let msg = format!(
                    "record at {} shrank from {} to {} bytes",
                    reloc.address,
                    reloc.bytes.len(),
                    bytes.len()
                );
                return Err(InnerError::FixupDivergence(msg));
            }
            if bytes != reloc.bytes {
                changed = true;
                reloc.bytes = bytes;
            }
        }
        Ok(changed)
    }

    /// Final bytes; only meaningful after a successful [`ByteStream::fixup`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in &self.chunks {
            match chunk {
                Chunk::Code(code) => out.extend_from_slice(code),
                Chunk::Reloc(reloc) => out.extend_from_slice(&reloc.bytes),
                Chunk::Target(_) => {}
            }
        }
        out
    }
}

fn encode_reloc(reloc: &Reloc, target: i32) -> Vec<u8> {
    match reloc.kind {
        RelocKind::Jump(opcode) => {
            let len = reloc.bytes.len();
            let delta = target - (reloc.address + len as i32);
            let operand = encode_jump_offset(delta, len == 3);
            let mut bytes = Vec::with_capacity(3);
            bytes.push(opcode);
            bytes.extend(operand);
            bytes
        }
        RelocKind::Offset => {
            let mut bytes = Vec::with_capacity(5);
            encode_push(target, reloc.bytes.len(), &mut bytes);
            bytes
        }
        RelocKind::StringOffset => vec![STRING_PUSH, 0x80 | (target >> 8) as u8, target as u8],
    }
}
