use crate::ast::Pos;
use crate::error::{InnerError, Result};
use crate::resolve::{Evaluator, GlobalTable, ObjId, Resolved};

pub const DEFAULT_CLOCK_FREQUENCY: i32 = 12_000_000;

/// Frequency long and mode byte at the start of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSettings {
    pub frequency: i32,
    pub mode: u8,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_CLOCK_FREQUENCY,
            mode: 0,
        }
    }
}

/// Integer value of a linker constant such as `_STACK`, if `id` declares it.
pub(crate) fn int_con(globals: &GlobalTable, id: ObjId, name: &str) -> Result<Option<(i32, Pos)>> {
    let file = &globals.table(id).file;
    match globals.lookup(id, None, name) {
        None => Ok(None),
        Some(Resolved::Con(owner, con)) => {
            let value = Evaluator::new(globals, id).con_value(owner, con)?;
            let value = value
                .int()
                .map_err(|_| InnerError::TypeMismatch(format!("{name} must be an int")).at(con.name.pos))
                .map_err(|e| e.in_file(file))?;
            Ok(Some((value, con.name.pos)))
        }
        Some(_) => Err(InnerError::context(format!("{name} must be a CON"))
            .at(Pos::default())
            .in_file(file)),
    }
}

/// Derives the clock from the root object's `_CLKFREQ`, `_XINFREQ` and
/// `_CLKMODE`. Giving all three requires them to agree.
pub fn clock_settings(globals: &GlobalTable) -> Result<ClockSettings> {
    let root = globals.root();
    let file = &globals.table(root).file;
    let clkfreq = int_con(globals, root, "_CLKFREQ")?;
    let xinfreq = int_con(globals, root, "_XINFREQ")?;
    let clkmode = int_con(globals, root, "_CLKMODE")?;

    let fail = |msg: &str, pos: Pos| -> Result<ClockSettings> {
        Err(InnerError::ClockSettings(msg.to_owned()).at(pos).in_file(file))
    };
    let frequency = match (clkfreq, xinfreq, clkmode) {
        (None, None, None) => return Ok(ClockSettings::default()),
        (_, Some((_, pos)), None) | (Some((_, pos)), None, None) => {
            return fail("_CLKMODE must be specified", pos);
        }
        (None, None, Some((_, pos))) => return fail("_CLKFREQ or _XINFREQ must be specified", pos),
        (Some((freq, _)), None, Some(_)) => freq,
        (None, Some((xin, _)), Some((mode, _))) => xin.wrapping_mul(mode >> 6),
        (Some((freq, pos)), Some((xin, _)), Some((mode, _))) => {
            if freq != xin.wrapping_mul(mode >> 6) {
                return fail("conflicting _CLKFREQ and _XINFREQ", pos);
            }
            freq
        }
    };

    let Some((mode, pos)) = clkmode else {
        return Ok(ClockSettings::default());
    };
    let mode = encode_clock_mode(mode).map_err(|e| e.at(pos).in_file(file))?;
    Ok(ClockSettings { frequency, mode })
}

/// Maps `_CLKMODE` (one oscillator setting, at most one PLL multiplier) to
/// the CLK register byte.
pub fn encode_clock_mode(clkmode: i32) -> std::result::Result<u8, InnerError> {
    let mut mode = match single_bit(clkmode & 0x3f)? {
        None | Some(0) => 0x00,
        Some(1) => 0x01,
        Some(2) => 0x02,
        Some(3) => 0x2a,
        Some(4) => 0x32,
        Some(_) => 0x3a,
    };
    let pll = clkmode >> 6;
    if pll == 0 {
        return Ok(mode);
    }
    mode |= 0x60;
    if let Some(bit) = single_bit(pll & 0x1f)? {
        mode += bit + 1;
    }
    Ok(mode)
}

fn single_bit(bits: i32) -> std::result::Result<Option<u8>, InnerError> {
    match bits.count_ones() {
        0 => Ok(None),
        1 => Ok(Some(bits.trailing_zeros() as u8)),
        _ => Err(InnerError::ClockSettings("invalid _CLKMODE".to_owned())),
    }
}
