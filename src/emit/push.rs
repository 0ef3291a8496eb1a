//! Immediate push encodings.
//!
//! Every code path that pushes an integer goes through [`encode_push`], so
//! jumps tables, string pointers and plain literals always agree.

pub const PUSH_MINUS_ONE: u8 = 0x34;
pub const PUSH_ZERO: u8 = 0x35;
pub const PUSH_ONE: u8 = 0x36;
pub const PUSH_KP: u8 = 0x37;
pub const PUSH_K1: u8 = 0x38;
pub const PUSH_K2: u8 = 0x39;
pub const PUSH_K3: u8 = 0x3a;
pub const PUSH_K4: u8 = 0x3b;
pub const BIT_NOT: u8 = 0xe7;

/// Operand of the power-of-two push form, if `v` has one.
///
/// `%000bbbbb` is 2^(b+1), `%001bbbbb` is 2^(b+1)-1, `%010bbbbb` its
/// complement, `%011bbbbb` its negation.
pub fn kp(v: i32) -> Option<u8> {
    let mut m: i32 = 2;
    for b in 0..31u8 {
        if v == m {
            return Some(b);
        }
        if v == m.wrapping_sub(1) {
            return Some(b | 0x20);
        }
        if v == !m {
            return Some(b | 0x40);
        }
        if v == m.wrapping_neg() {
            return Some(b | 0x60);
        }
        m = m.wrapping_shl(1);
    }
    None
}

fn kp_value(b: u8) -> i32 {
    let m = 2i32.wrapping_shl(u32::from(b & 0x1f));
    match b >> 5 {
        0 => m,
        1 => m.wrapping_sub(1),
        2 => !m,
        _ => m.wrapping_neg(),
    }
}

/// Appends the shortest push of `v` that is at least `min_len` bytes long.
pub fn encode_push(v: i32, min_len: usize, out: &mut Vec<u8>) {
    let bits = v as u32;
    match v {
        -1 if min_len <= 1 => out.push(PUSH_MINUS_ONE),
        0 if min_len <= 1 => out.push(PUSH_ZERO),
        1 if min_len <= 1 => out.push(PUSH_ONE),
        _ => {
            if let Some(b) = kp(v).filter(|_| min_len <= 2) {
                out.extend([PUSH_KP, b]);
            } else if bits & 0xffff_ff00 == 0 && min_len <= 2 {
                out.extend([PUSH_K1, bits as u8]);
            } else if bits | 0xff == u32::MAX && min_len <= 3 {
                out.extend([PUSH_K1, !bits as u8, BIT_NOT]);
            } else if bits & 0xffff_0000 == 0 && min_len <= 3 {
                out.extend([PUSH_K2, (bits >> 8) as u8, bits as u8]);
            } else if bits | 0xffff == u32::MAX && min_len <= 4 {
                out.extend([PUSH_K2, (!bits >> 8) as u8, !bits as u8, BIT_NOT]);
            } else if bits & 0xff00_0000 == 0 && min_len <= 4 {
                out.extend([PUSH_K3, (bits >> 16) as u8, (bits >> 8) as u8, bits as u8]);
            } else {
                out.push(PUSH_K4);
                out.extend(bits.to_be_bytes());
            }
        }
    }
}

pub fn push_int(v: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    encode_push(v, 1, &mut out);
    out
}

/// Reads one push form back; returns the value and the bytes consumed.
pub fn decode_push(bytes: &[u8]) -> Option<(i32, usize)> {
    let (&op, rest) = bytes.split_first()?;
    let (value, len) = match op {
        PUSH_MINUS_ONE => (-1, 1),
        PUSH_ZERO => (0, 1),
        PUSH_ONE => (1, 1),
        PUSH_KP => (kp_value(*rest.first()?), 2),
        PUSH_K1 | PUSH_K2 | PUSH_K3 | PUSH_K4 => {
            let n = usize::from(op - PUSH_K1) + 1;
            let operand = rest.get(..n)?;
            let value = operand.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)) as i32;
            (value, n + 1)
        }
        _ => return None,
    };
    match bytes.get(len) {
        Some(&BIT_NOT) if matches!(op, PUSH_K1 | PUSH_K2) => Some((!value, len + 1)),
        _ => Some((value, len)),
    }
}
