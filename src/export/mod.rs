//! SOB containers: one compiled object with its exports and imports, for
//! linking against later without recompiling the source.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! "SOB1"  timestamp:4  hash:4
//! exports:2  export_bytes:2  imports:2  import_bytes:2  body_bytes:2
//! checksum:1  reserved:1  var_size:2
//! exports  imports  body
//! ```
//!
//! The body is the object as it would sit in memory, with the sub-object
//! table zeroed. Every body byte feeds the hash and the checksum.

use crate::error::Result;
use crate::resolve::{Evaluator, GlobalTable, ObjId};
use crate::value::Value;

pub const SOB_MAGIC: &[u8; 4] = b"SOB1";
pub const SOB_HEADER_SIZE: usize = 26;

const EXPORT_INT: u8 = 0;
const EXPORT_FLOAT: u8 = 1;
const EXPORT_PUB: u8 = 2;

/// Rolling hash and additive checksum over the object body.
#[derive(Debug, Default)]
struct Body {
    bytes: Vec<u8>,
    hash: i32,
    checksum: u8,
}

impl Body {
    fn push(&mut self, byte: u8) {
        self.checksum = self.checksum.wrapping_add(byte);
        self.hash = self.hash.rotate_left(1) ^ i32::from(byte);
        self.bytes.push(byte);
    }

    fn push_word(&mut self, value: i32) {
        self.push(value as u8);
        self.push((value >> 8) as u8);
    }

    fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }
}

/// `foo.spin` becomes `foo.sob`.
pub fn sob_file_name(file: &str) -> String {
    match file.len().checked_sub(5) {
        Some(stem) if file.is_char_boundary(stem) && file[stem..].eq_ignore_ascii_case(".spin") => {
            format!("{}.sob", &file[..stem])
        }
        _ => format!("{file}.sob"),
    }
}

fn import_name(file: &str) -> String {
    let upper = file.to_ascii_uppercase();
    match upper.strip_suffix(".SPIN") {
        Some(stem) => stem.to_owned(),
        None => upper,
    }
}

/// Serializes compiled object `id`.
pub fn write_sob(globals: &GlobalTable, id: ObjId) -> Result<Vec<u8>> {
    let table = globals.table(id);
    let eval = Evaluator::new(globals, id);

    let mut exports = Vec::new();
    let mut num_exports = 0;
    for con in table.user_constants() {
        exports.extend(con.name.name.to_ascii_uppercase().bytes());
        exports.push(0);
        match eval.con_value(id, con)? {
            Value::Int(i) => {
                exports.push(EXPORT_INT);
                exports.extend(i.to_le_bytes());
            }
            Value::Float(f) => {
                exports.push(EXPORT_FLOAT);
                exports.extend(f.to_le_bytes());
            }
        }
        num_exports += 1;
    }
    for method in table.methods.iter().filter(|m| m.public) {
        exports.extend(method.name.name.to_ascii_uppercase().bytes());
        exports.push(0);
        exports.push(EXPORT_PUB);
        exports.push(method.index as u8);
        exports.push(method.param_count() as u8);
        num_exports += 1;
    }

    let mut imports = Vec::new();
    for obj in &table.objs {
        imports.extend(import_name(&obj.file.name).bytes());
        imports.push(0);
        imports.extend((obj.count as u16).to_le_bytes());
        imports.push(0);
    }

    let mut body = Body::default();
    body.push_word(table.size_in_bytes);
    body.push((table.method_count() + 1) as u8);
    body.push(table.n_objs as u8);
    for method in table.methods_in_table_order() {
        body.push_word(method.offset);
        body.push_word(method.locals_size);
    }
    for _ in 0..table.n_objs {
        body.extend(&[0; 4]);
    }
    body.extend(&table.dat_bytes);
    for method in table.methods_in_table_order() {
        body.extend(&method.bytes);
    }
    while body.bytes.len() % 4 != 0 {
        body.push(0);
    }

    let mut out = Vec::with_capacity(SOB_HEADER_SIZE + exports.len() + imports.len() + body.bytes.len());
    out.extend(SOB_MAGIC);
    out.extend(0i32.to_le_bytes());
    out.extend(body.hash.to_le_bytes());
    for field in [num_exports, exports.len(), table.objs.len(), imports.len(), body.bytes.len()] {
        out.extend((field as u16).to_le_bytes());
    }
    out.push(body.checksum);
    out.push(0);
    out.extend((table.var_size as u16).to_le_bytes());
    out.extend(exports);
    out.extend(imports);
    out.extend(body.bytes);
    log::debug!("{}: {} byte SOB, hash {:#010x}", table.file, out.len(), body.hash);
    Ok(out)
}
