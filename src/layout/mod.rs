//! Per-object geometry.
//!
//! Sub-object and method table indices come first, then the DAT section is
//! walked twice by one traversal: the size phase places labels, the emit
//! phase serializes bytes once every label is known. VAR storage is packed
//! between the two DAT passes.
mod dat;
mod indices;
mod var;


pub use dat::{walk_dat, DatPhase, EmitPhase, SizePhase};
pub use indices::{resolve_method_indexes, resolve_obj_indexes};
pub use var::{resolve_vars, total_var_size};

use crate::config::Config;
use crate::error::Result;
use crate::resolve::{GlobalTable, ObjId};

/// Places every DAT label and sizes the DAT blob.
pub fn dat_pass1(globals: &mut GlobalTable, id: ObjId, config: &Config) -> Result<()> {
    let end = walk_dat(globals, id, config, &mut SizePhase)?;
    let table = globals.table_mut(id);
    table.dat_bytes = vec![0; (end - table.header_size) as usize];
    log::debug!("{}: {} DAT bytes", table.file, table.dat_bytes.len());
    Ok(())
}

/// Serializes the DAT blob against the labels placed by `dat_pass1`.
pub fn dat_pass2(globals: &mut GlobalTable, id: ObjId, config: &Config) -> Result<()> {
    let mut phase = EmitPhase::new(globals.table(id).dat_bytes.len());
    walk_dat(globals, id, config, &mut phase)?;
    globals.table_mut(id).dat_bytes = phase.bytes;
    Ok(())
}
