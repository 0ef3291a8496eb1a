use crate::ast::Size;
use crate::error::{InnerError, Result};
use crate::resolve::{Evaluator, GlobalTable, ObjId};

/// Evaluates VAR dimensions and packs longs, then words, then bytes.
pub fn resolve_vars(globals: &mut GlobalTable, id: ObjId) -> Result<()> {
    let dims = {
        let eval = Evaluator::new(globals, id);
        let mut all = Vec::new();
        for var in &globals.table(id).vars {
            let mut values = Vec::with_capacity(var.dims.len());
            for dim in &var.dims {
                let n = eval.eval_int(dim)?;
                if n < 1 {
                    let msg = format!("array size of {} must be positive", var.name.name);
                    return Err(InnerError::ValueOutOfRange(msg).at(dim.pos));
                }
                values.push(n);
            }
            if values.is_empty() {
                values.push(1);
            }
            all.push(values);
        }
        all
    };

    let table = globals.table_mut(id);
    for (var, values) in table.vars.iter_mut().zip(dims) {
        var.dim_values = values;
    }
    let mut offset = 0;
    for size in [Size::Long, Size::Word, Size::Byte] {
        for var in table.vars.iter_mut().filter(|v| v.size == size) {
            var.offset = offset;
            offset += size.bytes() * var.element_count();
        }
    }
    table.var_size = (offset + 3) & !3;
    Ok(())
}

/// VAR bytes of an object plus those of every sub-object instance that owns
/// its own storage.
pub fn total_var_size(globals: &GlobalTable, id: ObjId) -> i32 {
    let table = globals.table(id);
    if let Some(size) = table.total_var_size.get() {
        return size;
    }
    let mut size = table.var_size;
    for obj in table.objs.iter().filter(|o| o.needs_var_space) {
        size += obj.count * total_var_size(globals, obj.target);
    }
    table.total_var_size.set(Some(size));
    size
}
