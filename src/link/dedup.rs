use crate::layout::total_var_size;
use crate::resolve::{GlobalTable, ObjId};

/// Sub-object table of `id`, one entry per instance: the surviving object
/// it calls into and the instance's VAR offset from the parent's VAR base.
pub fn object_entries(globals: &GlobalTable, id: ObjId) -> Vec<(ObjId, i32)> {
    let table = globals.table(id);
    let mut var_offset = table.var_size;
    let mut entries = Vec::with_capacity(table.n_objs as usize);
    for obj in &table.objs {
        let target = globals.canonical(obj.target);
        for _ in 0..obj.count {
            entries.push((target, var_offset));
            if obj.needs_var_space {
                var_offset += total_var_size(globals, obj.target);
            }
        }
    }
    entries
}

/// Two compiled objects are interchangeable when their method tables, sub-object
/// tables and DAT bytes are identical.
pub fn same_object(globals: &GlobalTable, a: ObjId, b: ObjId) -> bool {
    let (ta, tb) = (globals.table(a), globals.table(b));
    if ta.method_count() != tb.method_count() {
        return false;
    }
    let methods_match = ta
        .methods_in_table_order()
        .zip(tb.methods_in_table_order())
        .all(|(ma, mb)| ma.offset == mb.offset && ma.locals_size == mb.locals_size && ma.bytes == mb.bytes);
    methods_match && object_entries(globals, a) == object_entries(globals, b) && ta.dat_bytes == tb.dat_bytes
}

/// Points every duplicate at the copy declared latest. Later objects are
/// visited first, so links stay one hop deep.
pub fn eliminate_duplicates(globals: &mut GlobalTable) {
    let order = globals.order().to_vec();
    for i in (1..order.len()).rev() {
        let survivor = globals.record(order[i]).forward_link.unwrap_or(order[i]);
        for &candidate in order[..i].iter().rev() {
            if globals.record(candidate).forward_link.is_some() {
                continue;
            }
            if same_object(globals, candidate, survivor) {
                log::debug!(
                    "{} duplicates {}",
                    globals.table(candidate).file,
                    globals.table(survivor).file
                );
                globals.record_mut(candidate).forward_link = Some(survivor);
            }
        }
    }
}
