use crate::ast::*;
use crate::error::{InnerError, Result};
use crate::value::Value;
use std::cell::Cell;
use std::collections::HashMap;

/// Index of a compiled-object record in the global table.
pub type ObjId = usize;

/// Symbol names are case-insensitive.
pub fn symbol_key(name: &str) -> String {
    name.to_ascii_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConState {
    Pending,
    Evaluating,
    Done(Value),
}

#[derive(Debug, Clone)]
pub struct ConSymbol {
    pub name: Ident,
    pub value: AstExp,
    pub builtin: bool,
    state: Cell<ConState>,
}

impl ConSymbol {
    pub fn new(name: Ident, value: AstExp, builtin: bool) -> Self {
        Self {
            name,
            value,
            builtin,
            state: Cell::new(ConState::Pending),
        }
    }

    pub(crate) fn state(&self) -> ConState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ConState) {
        self.state.set(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatSymbol {
    pub name: Ident,
    pub alignment: i32,
    /// Byte offset from the start of the object.
    pub dp: i32,
    pub cog_x4: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSymbol {
    pub name: Ident,
    pub size: Size,
    pub dims: Vec<AstExp>,
    /// Evaluated dimensions, filled in by VAR layout.
    pub dim_values: Vec<i32>,
    pub offset: i32,
}

impl VarSymbol {
    pub fn element_count(&self) -> i32 {
        self.dim_values.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjSymbol {
    pub name: Ident,
    pub file: Ident,
    pub count_exp: Option<AstExp>,
    pub needs_var_space: bool,
    /// Valid once the including object has been registered.
    pub target: ObjId,
    pub count: i32,
    pub index: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSymbol {
    pub name: Ident,
    pub public: bool,
    pub result: Option<Ident>,
    pub params: Vec<Ident>,
    pub locals: Vec<LocalDecl>,
    pub body: Vec<AstStatement>,
    pub index: i32,
    pub offset: i32,
    pub locals_size: i32,
    pub bytes: Vec<u8>,
}

impl MethodSymbol {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn size(&self) -> i32 {
        self.bytes.len() as i32
    }

    /// Frame bytes the interpreter reserves on a call.
    pub fn all_locals_size(&self) -> i32 {
        self.locals_size + (self.param_count() as i32 + 1) * 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolRef {
    Con(usize),
    Dat(usize),
    Var(usize),
    Obj(usize),
    Method(usize),
}

/// Everything declared directly in one source file, plus its layout results.
#[derive(Debug, Clone)]
pub struct ObjectTable {
    pub file: Identifier,
    names: HashMap<String, SymbolRef>,
    pub cons: Vec<ConSymbol>,
    pub dats: Vec<DatSymbol>,
    pub vars: Vec<VarSymbol>,
    pub objs: Vec<ObjSymbol>,
    pub methods: Vec<MethodSymbol>,
    pub dat: Vec<DatEntry>,
    pub latest_label: Identifier,
    pub n_objs: i32,
    pub header_size: i32,
    pub dat_bytes: Vec<u8>,
    pub var_size: i32,
    /// Pre-dedup hub address used by `@@@` and object-address pushes.
    pub hub_address: i32,
    pub size_in_bytes: i32,
    pub(crate) total_var_size: Cell<Option<i32>>,
}

impl ObjectTable {
    pub fn new(file: Identifier) -> Self {
        Self {
            file,
            names: HashMap::new(),
            cons: Vec::new(),
            dats: Vec::new(),
            vars: Vec::new(),
            objs: Vec::new(),
            methods: Vec::new(),
            dat: Vec::new(),
            latest_label: Identifier::new(),
            n_objs: 0,
            header_size: 0,
            dat_bytes: Vec::new(),
            var_size: 0,
            hub_address: 0,
            size_in_bytes: 0,
            total_var_size: Cell::new(None),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<SymbolRef> {
        self.names.get(key).copied()
    }

    fn insert(&mut self, key: String, name: &Ident, sym: SymbolRef) -> Result<()> {
        if self.names.contains_key(&key) {
            return Err(InnerError::DuplicateSymbol(name.name.clone()).at(name.pos));
        }
        self.names.insert(key, sym);
        Ok(())
    }

    /// Local labels (`:name`) are scoped to the latest non-local label.
    pub fn canonical_name(&self, name: &str) -> String {
        if name.starts_with(':') {
            symbol_key(&format!("{}{name}", self.latest_label))
        } else {
            symbol_key(name)
        }
    }

    pub fn add_con(&mut self, con: ConSymbol) -> Result<()> {
        let sym = SymbolRef::Con(self.cons.len());
        self.insert(symbol_key(&con.name.name), &con.name, sym)?;
        self.cons.push(con);
        Ok(())
    }

    pub fn add_dat(&mut self, key: String, dat: DatSymbol) -> Result<()> {
        let sym = SymbolRef::Dat(self.dats.len());
        self.insert(key, &dat.name, sym)?;
        self.dats.push(dat);
        Ok(())
    }

    pub fn add_var(&mut self, var: VarSymbol) -> Result<()> {
        let sym = SymbolRef::Var(self.vars.len());
        self.insert(symbol_key(&var.name.name), &var.name, sym)?;
        self.vars.push(var);
        Ok(())
    }

    pub fn add_obj(&mut self, obj: ObjSymbol) -> Result<()> {
        let sym = SymbolRef::Obj(self.objs.len());
        self.insert(symbol_key(&obj.name.name), &obj.name, sym)?;
        self.objs.push(obj);
        Ok(())
    }

    pub fn add_method(&mut self, method: MethodSymbol) -> Result<()> {
        let sym = SymbolRef::Method(self.methods.len());
        self.insert(symbol_key(&method.name.name), &method.name, sym)?;
        self.methods.push(method);
        Ok(())
    }

    /// Method-table order: PUBs first, then PRIs, each in declaration order.
    pub fn methods_in_table_order(&self) -> impl Iterator<Item = &MethodSymbol> {
        let pubs = self.methods.iter().filter(|m| m.public);
        let pris = self.methods.iter().filter(|m| !m.public);
        pubs.chain(pris)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn first_public(&self) -> Option<&MethodSymbol> {
        self.methods.iter().find(|m| m.public)
    }

    /// User-declared constants, in declaration order.
    pub fn user_constants(&self) -> impl Iterator<Item = &ConSymbol> {
        self.cons.iter().filter(|c| !c.builtin)
    }
}

/// Parameters and locals of the method being compiled.
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    names: HashMap<String, i32>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if the name is already taken in this method or its object.
    pub fn add(&mut self, name: &Ident, offset: i32, object: &ObjectTable) -> Result<()> {
        let key = symbol_key(&name.name);
        if self.names.contains_key(&key) || object.lookup(&key).is_some() {
            return Err(InnerError::DuplicateSymbol(name.name.clone()).at(name.pos));
        }
        self.names.insert(key, offset);
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<i32> {
        self.names.get(key).copied()
    }
}

/// Meaning of an identifier after scope resolution.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Local(i32),
    Con(ObjId, &'a ConSymbol),
    Dat(&'a DatSymbol),
    Var(&'a VarSymbol),
    Obj(&'a ObjSymbol),
    Method(&'a MethodSymbol),
    File(ObjId),
}
