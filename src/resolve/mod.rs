//! Symbol tables of one compilation.
//!
//! Three scopes are searched in order: the method being compiled, the
//! object that declares it, and the global table of object files. Constants
//! are evaluated on first use and cached.
mod builtins;
mod const_eval;
mod global;
mod symbols;

#[cfg(test)]
mod resolve_tests;

pub use const_eval::{binary, unary, DatContext, Evaluator};
pub use global::{normalize_file_name, GlobalTable, ObjectRecord};
pub use symbols::*;
