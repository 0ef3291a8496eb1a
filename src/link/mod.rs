//! Whole-program compilation and the memory image.
//!
//! [`build_objects`] runs the per-object stages in global declaration order,
//! handing out provisional hub addresses as it goes. Structurally identical
//! objects are then collapsed onto one survivor and the survivors are laid
//! out behind the 16-byte boot header.
mod clock;
mod dedup;
mod image;

#[cfg(test)]
mod link_tests;

pub use clock::{clock_settings, encode_clock_mode, ClockSettings, DEFAULT_CLOCK_FREQUENCY};
pub use dedup::{eliminate_duplicates, object_entries, same_object};
pub use image::{build_image, Image, HEADER_SIZE};

use crate::ast::Program;
use crate::config::Config;
use crate::emit::compile_methods;
use crate::error::{Result, Warning};
use crate::layout::{dat_pass1, dat_pass2, resolve_method_indexes, resolve_obj_indexes, resolve_vars};
use crate::resolve::GlobalTable;

#[derive(Debug, Clone)]
pub struct Compilation {
    pub globals: GlobalTable,
    pub image: Image,
}

impl Compilation {
    pub fn warnings(&self) -> &[Warning] {
        &self.globals.warnings
    }
}

/// Registers, lays out, compiles, deduplicates and links `program`.
pub fn compile(program: Program, config: &Config) -> Result<Compilation> {
    log::info!("registering objects");
    let mut globals = GlobalTable::register(program)?;
    build_objects(&mut globals, config)?;
    if config.eliminate_duplicates {
        log::info!("eliminating duplicate objects");
        eliminate_duplicates(&mut globals);
    }
    log::info!("linking");
    let image = build_image(&mut globals, config)?;
    Ok(Compilation { globals, image })
}

/// Index resolution for every object, then layout and method compilation
/// object by object.
pub fn build_objects(globals: &mut GlobalTable, config: &Config) -> Result<()> {
    let order = globals.order().to_vec();

    log::info!("resolving indexes");
    for &id in &order {
        let file = globals.table(id).file.clone();
        resolve_obj_indexes(globals, id).map_err(|e| e.in_file(&file))?;
        resolve_method_indexes(globals, id);
    }

    log::info!("compiling {} objects", order.len());
    let mut address = HEADER_SIZE;
    for &id in &order {
        let file = globals.table(id).file.clone();
        globals.table_mut(id).hub_address = address;
        log::debug!("{file}: provisional hub address {address:#06x}");
        dat_pass1(globals, id, config).map_err(|e| e.in_file(&file))?;
        resolve_vars(globals, id).map_err(|e| e.in_file(&file))?;
        dat_pass2(globals, id, config).map_err(|e| e.in_file(&file))?;
        address += compile_methods(globals, id, config)?;
    }
    Ok(())
}
