#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]

pub mod ast;
pub mod config;
#[cfg(feature = "emit")]
pub mod emit;
pub mod error;
#[cfg(feature = "export")]
pub mod export;
#[cfg(feature = "emit")]
pub mod fixup;
#[cfg(feature = "layout")]
pub mod layout;
#[cfg(feature = "link")]
pub mod link;
#[cfg(feature = "resolve")]
pub mod resolve;
pub mod value;
