//! Structural validation of IR trees.
//!
//! A front end calls [`validate_command`] before handing a tree to a
//! consumer. Violations are defects in the producer, so validation stops at
//! the first one instead of collecting them.

use lazy_static::lazy_static;
use regex_lite::Regex;
use thiserror::Error;
use tracing::trace;

use super::types::*;
use crate::source::{Arena, SpanId};

lazy_static! {
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

/// True when `name` is a legal variable name in both dialects.
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("command sequence has no children")]
    EmptyCommandSeq,

    #[error("simple command has no words, redirects or environment")]
    EmptySimpleCommand,

    #[error("here-document '{delimiter}' consumed before its body was read")]
    UnfilledHereDoc { delimiter: String },

    #[error("here-document '{delimiter}' filled twice")]
    HereDocAlreadyFilled { delimiter: String },

    #[error("here-document '{delimiter}' has a body that disagrees with its filled flag")]
    InconsistentHereDoc { delimiter: String },

    #[error("user variable has an empty name")]
    EmptyVarName,

    #[error("invalid variable name '{name}'")]
    InvalidVariableName { name: String },

    #[error("single-quoted part holds {kind} token '{val}'")]
    ExpansionInSingleQuote { kind: TokenKind, val: String },

    #[error("literal expression holds {kind} token '{val}'")]
    NonLiteralToken { kind: TokenKind, val: String },

    #[error("double-quoted part directly contains another double-quoted part")]
    NestedDoubleQuote,

    #[error("invalid {kind} literal '{text}'")]
    InvalidLiteral { kind: &'static str, text: String },

    #[error("operator '{op}' cannot build a {expected}")]
    InvalidRedirectOperator { op: RedirOp, expected: &'static str },

    #[error("span {0} does not resolve in the source arena")]
    DanglingSpan(usize),

    #[error("stack location {stack} is on the same line as fail location {fail}")]
    RedundantStackLocation { fail: usize, stack: usize },
}

/// Validate a whole tree, including every span it references.
pub fn validate_command(cmd: &Command, arena: &Arena) -> Result<(), IrError> {
    match cmd {
        Command::SimpleCommand(simple) => {
            if simple.words.is_empty() && simple.redirects.is_empty() && simple.more_env.is_empty() {
                return Err(IrError::EmptySimpleCommand);
            }
            for word in &simple.words {
                validate_word(word, arena)?;
            }
            for redir in &simple.redirects {
                validate_redir(redir, arena)?;
            }
            for pair in &simple.more_env {
                check_name(&pair.name)?;
                check_opt_span(pair.span_id, arena)?;
                validate_word(&pair.value, arena)?;
            }
            Ok(())
        }
        Command::VarDecl(decl) => {
            check_name(&decl.name)?;
            check_opt_span(decl.name_span_id, arena)?;
            validate_expr(&decl.value, arena)
        }
        Command::VarAssign(assign) => {
            validate_lvalue(&assign.lhs, arena)?;
            validate_expr(&assign.rhs, arena)
        }
        Command::CommandSeq(seq) => {
            if seq.children.is_empty() {
                return Err(IrError::EmptyCommandSeq);
            }
            seq.children.iter().try_for_each(|child| validate_command(child, arena))
        }
        Command::Fork(fork) => {
            check_opt_span(fork.span_id, arena)?;
            validate_command(&fork.child, arena)
        }
    }
}

pub fn validate_word(word: &Word, arena: &Arena) -> Result<(), IrError> {
    word.parts.iter().try_for_each(|part| validate_word_part(part, arena))
}

fn validate_word_part(part: &WordPart, arena: &Arena) -> Result<(), IrError> {
    match part {
        WordPart::Literal(token) => validate_token(token, arena),
        WordPart::SingleQuoted(sq) => {
            for token in &sq.tokens {
                check_single_quoted_token(token)?;
                validate_token(token, arena)?;
            }
            Ok(())
        }
        WordPart::DoubleQuoted(dq) => {
            for inner in &dq.parts {
                if matches!(inner, WordPart::DoubleQuoted(_)) {
                    return Err(IrError::NestedDoubleQuote);
                }
                validate_word_part(inner, arena)?;
            }
            Ok(())
        }
        WordPart::VarSub(vs) => validate_var_sub(vs, arena),
    }
}

pub(crate) fn check_single_quoted_token(token: &Token) -> Result<(), IrError> {
    if token.is_literal() {
        Ok(())
    } else {
        Err(IrError::ExpansionInSingleQuote {
            kind: token.kind,
            val: token.val.clone(),
        })
    }
}

pub(crate) fn check_literal_token(token: &Token) -> Result<(), IrError> {
    if token.is_literal() {
        Ok(())
    } else {
        Err(IrError::NonLiteralToken {
            kind: token.kind,
            val: token.val.clone(),
        })
    }
}

pub(crate) fn check_name(name: &str) -> Result<(), IrError> {
    if name.is_empty() {
        return Err(IrError::EmptyVarName);
    }
    if !is_valid_name(name) {
        return Err(IrError::InvalidVariableName { name: name.to_string() });
    }
    Ok(())
}

fn validate_token(token: &Token, arena: &Arena) -> Result<(), IrError> {
    check_opt_span(token.span_id, arena)
}

fn validate_var_sub(vs: &VarSub, arena: &Arena) -> Result<(), IrError> {
    if let Var::UserVar(name) = &vs.var {
        check_name(name)?;
    }
    check_span(vs.span_id, arena)?;
    if let Some(stack) = vs.stack_span_id {
        check_span(stack, arena)?;
        if arena.same_line(vs.span_id, stack) {
            return Err(IrError::RedundantStackLocation {
                fail: vs.span_id.0,
                stack: stack.0,
            });
        }
    }
    trace!(var = %vs.var.name(), span = vs.span_id.0, "var sub ok");
    Ok(())
}

fn validate_redir(redir: &Redir, arena: &Arena) -> Result<(), IrError> {
    match redir {
        Redir::Redirect(r) => {
            if r.op.is_here_doc() {
                return Err(IrError::InvalidRedirectOperator {
                    op: r.op,
                    expected: "redirect",
                });
            }
            check_opt_span(r.op_span_id, arena)?;
            validate_word(&r.target, arena)
        }
        Redir::HereDoc(h) => {
            if !h.op().is_here_doc() {
                return Err(IrError::InvalidRedirectOperator {
                    op: h.op(),
                    expected: "here-document",
                });
            }
            check_opt_span(h.op_span_id(), arena)?;
            validate_word(h.body()?, arena)
        }
    }
}

pub fn validate_expr(expr: &Expr, arena: &Arena) -> Result<(), IrError> {
    match expr {
        Expr::SingleQuotedLiteral(t) | Expr::DoubleQuotedLiteral(t) => {
            check_literal_token(t)?;
            validate_token(t, arena)
        }
        Expr::IntLiteral(lit) => validate_token(&lit.token, arena),
        Expr::FloatLiteral(lit) => validate_token(&lit.token, arena),
        Expr::VarSub(vs) => validate_var_sub(vs, arena),
        Expr::Word(w) => validate_word(w, arena),
    }
}

fn validate_lvalue(lhs: &LValue, arena: &Arena) -> Result<(), IrError> {
    match lhs {
        LValue::LeftVar(v) => {
            check_name(&v.name)?;
            check_opt_span(v.span_id, arena)
        }
        LValue::LeftIndex(ix) => {
            check_opt_span(ix.span_id, arena)?;
            validate_expr(&ix.obj, arena)?;
            validate_expr(&ix.index, arena)
        }
    }
}

fn check_span(id: SpanId, arena: &Arena) -> Result<(), IrError> {
    if arena.resolves(id) {
        Ok(())
    } else {
        Err(IrError::DanglingSpan(id.0))
    }
}

fn check_opt_span(id: Option<SpanId>, arena: &Arena) -> Result<(), IrError> {
    id.map_or(Ok(()), |id| check_span(id, arena))
}
