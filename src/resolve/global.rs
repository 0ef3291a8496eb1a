use super::builtins;
use super::symbols::*;
use crate::ast::*;
use crate::error::{InnerError, Result, Warning};
use std::collections::HashMap;

/// One source file after registration.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub table: ObjectTable,
    /// Final hub address, assigned by the linker.
    pub address: i32,
    /// Set when this object is a structural duplicate of another one.
    pub forward_link: Option<ObjId>,
    already_read: bool,
}

/// All objects of one compilation, with the declaration order later phases
/// depend on: re-included files move to the end of the log.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    records: Vec<ObjectRecord>,
    files: HashMap<String, ObjId>,
    order: Vec<ObjId>,
    pub warnings: Vec<Warning>,
}

/// OBJ file names get `.spin` appended when they lack it.
pub fn normalize_file_name(name: &str) -> String {
    if name.to_ascii_uppercase().ends_with(".SPIN") {
        name.to_owned()
    } else {
        format!("{name}.spin")
    }
}

fn file_key(name: &str) -> String {
    symbol_key(&normalize_file_name(name))
}

impl GlobalTable {
    /// Registers the root object and, depth first, everything it includes.
    pub fn register(program: Program) -> Result<Self> {
        let mut sources: HashMap<String, SourceObject> = program
            .objects
            .into_iter()
            .map(|source| (file_key(&source.file), source))
            .collect();

        let mut globals = Self::default();
        let root = Ident::new(program.root);
        globals.visit(&root, &mut sources)?;

        for unused in sources.keys() {
            log::debug!("source object {unused} is never included");
        }
        log::info!("registered {} objects", globals.records.len());
        Ok(globals)
    }

    fn visit(&mut self, file: &Ident, sources: &mut HashMap<String, SourceObject>) -> Result<ObjId> {
        let key = file_key(&file.name);
        if let Some(&id) = self.files.get(&key) {
            self.add_existing(id, file)?;
            let children: Vec<ObjId> = self.records[id].table.objs.iter().map(|o| o.target).collect();
            for child in children {
                self.add_existing(child, file)?;
            }
            return Ok(id);
        }

        let Some(source) = sources.remove(&key) else {
            return Err(InnerError::MissingObject(normalize_file_name(&file.name)).at(file.pos));
        };
        let display_name = normalize_file_name(&source.file);
        let table = build_table(source).map_err(|e| e.in_file(&display_name))?;

        let id = self.records.len();
        self.records.push(ObjectRecord {
            table,
            address: 0,
            forward_link: None,
            already_read: false,
        });
        self.files.insert(key, id);
        self.order.push(id);

        let obj_files: Vec<Ident> = self.records[id].table.objs.iter().map(|o| o.file.clone()).collect();
        for (i, obj_file) in obj_files.iter().enumerate() {
            let child = self
                .visit(obj_file, sources)
                .map_err(|e| e.in_file(&display_name))?;
            self.records[id].table.objs[i].target = child;
        }

        if self.records[id].table.first_public().is_none() {
            return Err(InnerError::NoPublicMethods(display_name).at(file.pos));
        }
        self.records[id].already_read = true;
        Ok(id)
    }

    /// Moves an already registered file to the end of the declaration log.
    fn add_existing(&mut self, id: ObjId, file: &Ident) -> Result<()> {
        if !self.records[id].already_read {
            let name = self.records[id].table.file.clone();
            return Err(InnerError::CircularObject(name).at(file.pos));
        }
        self.order.retain(|&other| other != id);
        self.order.push(id);
        Ok(())
    }

    pub fn root(&self) -> ObjId {
        0
    }

    /// Global declaration order.
    pub fn order(&self) -> &[ObjId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: ObjId) -> &ObjectRecord {
        &self.records[id]
    }

    pub fn record_mut(&mut self, id: ObjId) -> &mut ObjectRecord {
        &mut self.records[id]
    }

    pub fn table(&self, id: ObjId) -> &ObjectTable {
        &self.records[id].table
    }

    pub fn table_mut(&mut self, id: ObjId) -> &mut ObjectTable {
        &mut self.records[id].table
    }

    pub fn file_id(&self, name: &str) -> Option<ObjId> {
        self.files.get(&file_key(name)).copied()
    }

    /// The surviving copy of `id` after deduplication.
    pub fn canonical(&self, id: ObjId) -> ObjId {
        let mut id = id;
        while let Some(next) = self.records[id].forward_link {
            id = next;
        }
        id
    }

    /// Searches the method scope, then the object, then the file names.
    pub fn lookup(&self, obj: ObjId, locals: Option<&LocalScope>, name: &str) -> Option<Resolved<'_>> {
        let table = self.table(obj);
        let key = table.canonical_name(name);
        if let Some(offset) = locals.and_then(|l| l.lookup(&key)) {
            return Some(Resolved::Local(offset));
        }
        if let Some(sym) = table.lookup(&key) {
            let resolved = match sym {
                SymbolRef::Con(i) => Resolved::Con(obj, &table.cons[i]),
                SymbolRef::Dat(i) => Resolved::Dat(&table.dats[i]),
                SymbolRef::Var(i) => Resolved::Var(&table.vars[i]),
                SymbolRef::Obj(i) => Resolved::Obj(&table.objs[i]),
                SymbolRef::Method(i) => Resolved::Method(&table.methods[i]),
            };
            return Some(resolved);
        }
        self.files.get(&key).map(|&id| Resolved::File(id))
    }

    pub fn lookup_existing(
        &self,
        obj: ObjId,
        locals: Option<&LocalScope>,
        name: &str,
        pos: Pos,
    ) -> Result<Resolved<'_>> {
        self.lookup(obj, locals, name)
            .ok_or_else(|| InnerError::UnknownSymbol(name.to_owned()).at(pos))
    }

    pub fn warn(&mut self, obj: ObjId, pos: Pos, message: impl Into<String>) {
        let warning = Warning::new(&self.table(obj).file, pos, message);
        self.warnings.push(warning);
    }
}

fn build_table(source: SourceObject) -> Result<ObjectTable> {
    let mut table = ObjectTable::new(normalize_file_name(&source.file));
    builtins::install(&mut table)?;

    for con in source.constants {
        table.add_con(ConSymbol::new(con.name, con.value, false))?;
    }
    for var in source.vars {
        table.add_var(VarSymbol {
            name: var.name,
            size: var.size,
            dims: var.dims,
            dim_values: Vec::new(),
            offset: 0,
        })?;
    }
    for obj in source.objs {
        let file = Ident::at(normalize_file_name(&obj.file.name), obj.file.pos);
        table.add_obj(ObjSymbol {
            name: obj.name,
            file,
            count_exp: obj.count,
            needs_var_space: !obj.pointer,
            target: 0,
            count: 1,
            index: 0,
        })?;
    }
    for method in source.methods {
        table.add_method(MethodSymbol {
            name: method.name,
            public: method.public,
            result: method.result,
            params: method.params,
            locals: method.locals,
            body: method.body,
            index: 0,
            offset: 0,
            locals_size: 0,
            bytes: Vec::new(),
        })?;
    }
    table.dat = source.dat;
    Ok(table)
}
