use crate::error::{InnerError, Result};
use crate::resolve::{Evaluator, GlobalTable, ObjId};

/// Sub-object table slots follow the method slots, so method count must be final.
pub fn resolve_obj_indexes(globals: &mut GlobalTable, id: ObjId) -> Result<()> {
    let counts = {
        let eval = Evaluator::new(globals, id);
        globals
            .table(id)
            .objs
            .iter()
            .map(|obj| match &obj.count_exp {
                Some(e) => {
                    let count = eval.eval_int(e)?;
                    if count < 1 {
                        let msg = format!("object count must be positive, got {count}");
                        return Err(InnerError::ValueOutOfRange(msg).at(e.pos));
                    }
                    Ok(count)
                }
                None => Ok(1),
            })
            .collect::<Result<Vec<i32>>>()?
    };

    let table = globals.table_mut(id);
    let methods = table.method_count() as i32;
    let mut n_objs = 0;
    for (obj, count) in table.objs.iter_mut().zip(counts) {
        obj.count = count;
        obj.index = n_objs + methods + 1;
        n_objs += count;
    }
    if n_objs > 255 || methods + 1 > 255 {
        let msg = format!("too many methods or objects in {}", table.file);
        return Err(InnerError::ValueOutOfRange(msg).at(Default::default()));
    }
    table.n_objs = n_objs;
    table.header_size = (n_objs + methods + 1) * 4;
    Ok(())
}

/// Method indexes start at 1: PUBs first, then PRIs.
pub fn resolve_method_indexes(globals: &mut GlobalTable, id: ObjId) {
    let table = globals.table_mut(id);
    let publics = table.methods.iter().filter(|m| m.public).count() as i32;
    let (mut next_pub, mut next_pri) = (1, publics + 1);
    for method in &mut table.methods {
        if method.public {
            method.index = next_pub;
            next_pub += 1;
        } else {
            method.index = next_pri;
            next_pri += 1;
        }
    }
}
