//! shell-ir - A span-carrying intermediate representation for shell scripts
//!
//! This library defines the IR that front ends lower shell source into,
//! the source arena its spans point at, the runtime diagnostics contract,
//! and reference producers and consumers for both ends.

pub mod diagnostics;
pub mod interpreter;
pub mod ir;
pub mod parser;
pub mod source;

pub use ir::types::*;
pub use parser::{parse, ParseException, Parser};
