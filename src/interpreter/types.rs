//! Interpreter Types
//!
//! Options, values and the records the dry-run consumer produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::RedirOp;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 100;
pub const DEFAULT_MAX_ARRAY_INDEX: usize = 65_535;

/// Consumer options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Unset variables are a name resolution error (set -u)
    pub nounset: bool,
    /// Maximum nesting of function calls
    pub max_call_depth: usize,
    /// Largest index an array assignment may write
    pub max_array_index: usize,
    /// Value of `$0`
    pub script_name: String,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            nounset: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_array_index: DEFAULT_MAX_ARRAY_INDEX,
            script_name: "shell-ir".to_string(),
        }
    }
}

/// A variable's value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Array(Vec<String>),
}

impl Value {
    /// Integer view used for array indexes.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Array(items) => write!(f, "{}", items.join(" ")),
        }
    }
}

/// A redirection with its target expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRedirect {
    pub op: RedirOp,
    pub fd: u32,
    /// File name, or the expanded body for here-documents
    pub target: String,
}

/// An external command that would have been run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// Exported variables plus the command's own environment pairs
    pub env: Vec<(String, String)>,
    pub redirects: Vec<ResolvedRedirect>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))?;
        for r in &self.redirects {
            if r.op.is_here_doc() {
                write!(f, " {}{}<body of {} bytes>", r.fd, r.op, r.target.len())?;
            } else {
                write!(f, " {}{}{}", r.fd, r.op, r.target)?;
            }
        }
        Ok(())
    }
}
