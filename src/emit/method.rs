use super::MethodEmitter;
use crate::ast::{Ident, Pos};
use crate::config::Config;
use crate::error::{InnerError, Result};
use crate::resolve::{Evaluator, GlobalTable, LocalScope, ObjId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    pub bytes: Vec<u8>,
    pub locals_size: i32,
    pub warnings: Vec<(Pos, String)>,
}

/// Compiles every method of an object, PUBs first, into the bytes that
/// follow its header and DAT section. Returns the object size rounded up to
/// a long.
pub fn compile_methods(globals: &mut GlobalTable, id: ObjId, config: &Config) -> Result<i32> {
    let (mut offset, order, file) = {
        let table = globals.table(id);
        let n1 = table.method_count() as i32 + 1;
        let start = n1 * 4 + table.n_objs * 4 + table.dat_bytes.len() as i32;
        let pubs = (0..table.methods.len()).filter(|&i| table.methods[i].public);
        let pris = (0..table.methods.len()).filter(|&i| !table.methods[i].public);
        (start, pubs.chain(pris).collect::<Vec<_>>(), table.file.clone())
    };

    for i in order {
        let compiled = compile_method(globals, id, i, offset, config).map_err(|e| e.in_file(&file))?;
        for (pos, message) in compiled.warnings {
            globals.warn(id, pos, message);
        }
        let method = &mut globals.table_mut(id).methods[i];
        log::trace!("{file}: {} at {offset}, {} bytes", method.name.name, compiled.bytes.len());
        method.offset = offset;
        method.locals_size = compiled.locals_size;
        offset += compiled.bytes.len() as i32;
        method.bytes = compiled.bytes;
    }

    let table = globals.table_mut(id);
    table.size_in_bytes = (offset + 3) & !3;
    log::debug!("{file}: {} bytes", table.size_in_bytes);
    Ok(table.size_in_bytes)
}

/// Builds the frame of method `index` (result at 0, then parameters, then
/// locals) and emits its body for object offset `base`.
pub fn compile_method(globals: &GlobalTable, id: ObjId, index: usize, base: i32, config: &Config) -> Result<CompiledMethod> {
    let table = globals.table(id);
    let method = &table.methods[index];
    let eval = Evaluator::new(globals, id);

    let mut locals = LocalScope::new();
    if let Some(result) = &method.result {
        locals.add(result, 0, table)?;
    }
    let mut frame = 4;
    for param in &method.params {
        locals.add(param, frame, table)?;
        frame += 4;
    }
    let mut locals_size = 0;
    for local in &method.locals {
        let count = match &local.count {
            Some(e) => eval.eval_int(e)?,
            None => 1,
        };
        if count < 1 {
            let msg = format!("array size of {} must be positive", local.name.name);
            return Err(InnerError::ValueOutOfRange(msg).at(local.name.pos));
        }
        locals.add(&local.name, frame, table)?;
        frame += 4 * count;
        locals_size += 4 * count;
    }
    if method.result.is_none() && globals.lookup(id, Some(&locals), "RESULT").is_none() {
        locals.add(&Ident::at("RESULT", method.name.pos), 0, table)?;
    }

    let mut emitter = MethodEmitter::new(globals, id, &locals);
    emitter.emit_body(&method.body)?;
    let (bytes, warnings) = emitter
        .finish(base, config.fixup_iteration_limit)
        .map_err(|e| e.at(method.name.pos))?;
    Ok(CompiledMethod {
        bytes,
        locals_size,
        warnings,
    })
}
