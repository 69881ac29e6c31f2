//! Interpreter module
//!
//! A dry-run consumer of the IR: it evaluates variables, functions and
//! subshells and records external commands instead of running them.

pub mod env;
pub mod errors;
pub mod interpreter;
pub mod types;

pub use env::{Environment, Variable};
pub use errors::EvalError;
pub use interpreter::Interpreter;
pub use types::{Invocation, InterpreterOptions, ResolvedRedirect, Value};
