//! Runtime diagnostics.
//!
//! Consumers raise [`RuntimeError`]s; each carries one of three categories
//! and an [`ErrorLocation`]. [`render`] turns one into a trace: the fail
//! location with a caret under the offending span, then the stack location
//! when there is one.

use std::fmt;
use std::fmt::Write;

use serde::Serialize;
use thiserror::Error;

use crate::source::{Arena, ErrorLocation, SpanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// A name could not be resolved against the environment
    NameResolution,
    /// An expression or call produced no valid value
    ValueCall,
    /// Operands of incompatible kinds, attributed to the operator
    Type,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameResolution => write!(f, "name resolution error"),
            Self::ValueCall => write!(f, "value error"),
            Self::Type => write!(f, "type error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("{name}: unbound variable")]
    Name { name: String, location: ErrorLocation },

    #[error("{message}")]
    Value { message: String, location: ErrorLocation },

    #[error("{message}")]
    Type { message: String, location: ErrorLocation },
}

impl RuntimeError {
    pub fn name(name: impl Into<String>, location: ErrorLocation) -> Self {
        RuntimeError::Name {
            name: name.into(),
            location,
        }
    }

    pub fn value(message: impl Into<String>, location: ErrorLocation) -> Self {
        RuntimeError::Value {
            message: message.into(),
            location,
        }
    }

    pub fn type_error(message: impl Into<String>, location: ErrorLocation) -> Self {
        RuntimeError::Type {
            message: message.into(),
            location,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RuntimeError::Name { .. } => ErrorCategory::NameResolution,
            RuntimeError::Value { .. } => ErrorCategory::ValueCall,
            RuntimeError::Type { .. } => ErrorCategory::Type,
        }
    }

    pub fn location(&self) -> ErrorLocation {
        match self {
            RuntimeError::Name { location, .. }
            | RuntimeError::Value { location, .. }
            | RuntimeError::Type { location, .. } => *location,
        }
    }
}

/// Render a full trace for `err`.
pub fn render(err: &RuntimeError, arena: &Arena) -> String {
    let location = err.location();
    let mut out = String::new();
    render_span(location.fail(), arena, &mut out);
    if let Some(stack) = location.stack() {
        render_span(stack, arena, &mut out);
    }
    let _ = writeln!(out, "{}: {}", err.category(), err);
    out.push_str("---\n");
    out
}

/// `Line N of 'path'`, the source line, and a caret marking the span.
fn render_span(id: SpanId, arena: &Arena, out: &mut String) {
    let (span, line) = match arena.span(id).and_then(|s| arena.line(s.line_id).map(|l| (s, l))) {
        Some(found) => found,
        None => {
            out.push_str("<span had no position info>\n");
            return;
        }
    };
    let path = arena.path(line.path_index).unwrap_or("<unknown>");
    let _ = writeln!(out, "Line {} of '{}'", line.line_num, path);
    let _ = writeln!(out, "  {}", line.text.trim_end());

    out.push_str("  ");
    // keep tabs so the caret lines up
    for c in line.text.chars().take(span.col) {
        out.push(if c == '\t' { '\t' } else { ' ' });
    }
    out.push('^');
    for _ in 1..span.length {
        out.push('~');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let loc = ErrorLocation::at(SpanId(0));
        assert_eq!(RuntimeError::name("x", loc).category(), ErrorCategory::NameResolution);
        assert_eq!(RuntimeError::value("bad", loc).category(), ErrorCategory::ValueCall);
        assert_eq!(RuntimeError::type_error("bad", loc).category(), ErrorCategory::Type);
        assert_eq!(RuntimeError::name("x", loc).to_string(), "x: unbound variable");
    }

    #[test]
    fn test_render_fail_location() {
        let mut arena = Arena::new();
        let first = arena.add_source("main.sh", "echo $undefined");
        let span = arena.add_span(first, 5, 10);
        let err = RuntimeError::name("undefined", ErrorLocation::at(span));
        let expected = "Line 1 of 'main.sh'\n  echo $undefined\n       ^~~~~~~~~\nname resolution error: undefined: unbound variable\n---\n";
        assert_eq!(render(&err, &arena), expected);
    }

    #[test]
    fn test_render_includes_stack_location() {
        let mut arena = Arena::new();
        let first = arena.add_source("main.sh", "f() {\n\techo $y\n}\nf");
        let fail = arena.add_span(first.offset(1), 6, 2);
        let call = arena.add_span(first.offset(3), 0, 1);
        let err = RuntimeError::name("y", ErrorLocation::new(&arena, fail, Some(call)));
        let trace = render(&err, &arena);
        assert!(trace.starts_with("Line 2 of 'main.sh'\n  \techo $y\n  \t     ^~\n"));
        assert!(trace.contains("Line 4 of 'main.sh'\n  f\n  ^\n"));
    }

    #[test]
    fn test_render_unknown_span() {
        let arena = Arena::new();
        let err = RuntimeError::value("oops", ErrorLocation::at(SpanId(3)));
        assert!(render(&err, &arena).starts_with("<span had no position info>"));
    }
}
