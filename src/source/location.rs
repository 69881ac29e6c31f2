//! Fail and stack locations for runtime errors.

use serde::{Deserialize, Serialize};

use super::{Arena, SpanId};

/// The fail location is the minimal span that caused an error. The stack
/// location names the enclosing compound construct (call, subshell,
/// substitution) and is only kept when it sits on a different line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    fail: SpanId,
    stack: Option<SpanId>,
}

impl ErrorLocation {
    /// Build a location, dropping `enclosing` when it shares a line with
    /// `fail`.
    pub fn new(arena: &Arena, fail: SpanId, enclosing: Option<SpanId>) -> Self {
        let stack = enclosing.filter(|outer| !arena.same_line(fail, *outer));
        Self { fail, stack }
    }

    /// A location with no enclosing construct.
    pub fn at(fail: SpanId) -> Self {
        Self { fail, stack: None }
    }

    /// Rebuild a location whose stack span was already filtered, e.g. one
    /// read back from a [`VarSub`](crate::ir::VarSub).
    pub(crate) fn from_parts(fail: SpanId, stack: Option<SpanId>) -> Self {
        Self { fail, stack }
    }

    pub fn fail(&self) -> SpanId {
        self.fail
    }

    pub fn stack(&self) -> Option<SpanId> {
        self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "( echo $x )\n(\n  echo $y\n)";

    #[test]
    fn test_same_line_stack_is_omitted() {
        let mut arena = Arena::new();
        let first = arena.add_source("t.sh", SRC);
        let open = arena.add_span(first, 0, 1);
        let fail = arena.add_span(first, 7, 2);
        let loc = ErrorLocation::new(&arena, fail, Some(open));
        assert_eq!(loc.fail(), fail);
        assert_eq!(loc.stack(), None);
    }

    #[test]
    fn test_different_line_stack_is_kept() {
        let mut arena = Arena::new();
        let first = arena.add_source("t.sh", SRC);
        let open = arena.add_span(first.offset(1), 0, 1);
        let fail = arena.add_span(first.offset(2), 7, 2);
        let loc = ErrorLocation::new(&arena, fail, Some(open));
        assert_eq!(loc.stack(), Some(open));
        assert_ne!(loc.stack(), Some(loc.fail()));
    }

    #[test]
    fn test_no_enclosing_construct() {
        let mut arena = Arena::new();
        let first = arena.add_source("t.sh", SRC);
        let fail = arena.add_span(first, 7, 2);
        assert_eq!(ErrorLocation::new(&arena, fail, None), ErrorLocation::at(fail));
    }
}
