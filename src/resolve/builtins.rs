use super::symbols::{ConSymbol, ObjectTable};
use crate::ast::{AstExp, Ident};
use crate::error::Result;

const INT_CONSTANTS: [(&str, i32); 15] = [
    ("TRUE", -1),
    ("FALSE", 0),
    ("POSX", i32::MAX),
    ("NEGX", i32::MIN),
    ("RCFAST", 0x001),
    ("RCSLOW", 0x002),
    ("XINPUT", 0x004),
    ("XTAL1", 0x008),
    ("XTAL2", 0x010),
    ("XTAL3", 0x020),
    ("PLL1X", 0x040),
    ("PLL2X", 0x080),
    ("PLL4X", 0x100),
    ("PLL8X", 0x200),
    ("PLL16X", 0x400),
];

/// Registers the constants every object sees without declaring them.
pub(super) fn install(table: &mut ObjectTable) -> Result<()> {
    for (name, value) in INT_CONSTANTS {
        table.add_con(ConSymbol::new(Ident::new(name), AstExp::int(value), true))?;
    }
    let pi = AstExp::float(std::f32::consts::PI);
    table.add_con(ConSymbol::new(Ident::new("PI"), pi, true))
}
