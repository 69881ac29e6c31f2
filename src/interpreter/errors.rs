//! Consumer Errors
//!
//! Evaluation either fails with a categorized [`RuntimeError`] that points
//! into the source, or with a structural defect in the tree itself.

use thiserror::Error;

use crate::diagnostics::RuntimeError;
use crate::ir::IrError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("structural error: {0}")]
    Structural(#[from] IrError),
}

impl EvalError {
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            EvalError::Runtime(e) => Some(e),
            EvalError::Structural(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ErrorLocation, SpanId};

    #[test]
    fn test_display() {
        let runtime: EvalError = RuntimeError::name("x", ErrorLocation::at(SpanId(0))).into();
        assert_eq!(runtime.to_string(), "x: unbound variable");
        assert!(runtime.as_runtime().is_some());

        let structural: EvalError = IrError::EmptyCommandSeq.into();
        assert_eq!(structural.to_string(), "structural error: command sequence has no children");
        assert!(structural.as_runtime().is_none());
    }
}
