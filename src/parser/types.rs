//! Parser Types and Constants
//!
//! Errors, limits and options shared by the lexer and both dialect parsers.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::IrError;
use crate::parser::lexer::{Token, TokenType};

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_TOKENS: usize = 100_000;
pub const MAX_PARSE_ITERATIONS: usize = 1_000_000;
pub const MAX_PARSER_DEPTH: usize = 200; // Max nesting of groups and subshells

/// Check if a token type is a redirection operator
pub fn is_redirection_token(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Less
            | TokenType::Great
            | TokenType::DLess
            | TokenType::DGreat
            | TokenType::LessAnd
            | TokenType::GreatAnd
            | TokenType::LessGreat
            | TokenType::DLessDash
            | TokenType::Clobber
            | TokenType::TLess
    )
}

/// Operators that join commands in ways the IR cannot represent
pub fn is_unsupported_operator(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Pipe | TokenType::PipeAmp | TokenType::AndAnd | TokenType::OrOr | TokenType::Amp | TokenType::DSemi
    )
}

#[derive(Debug, Error)]
pub struct ParseException {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub token: Option<Token>,
}

impl fmt::Display for ParseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl ParseException {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            token: None,
        }
    }

    pub fn with_token(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
            token: Some(token.clone()),
        }
    }

    /// A structural error raised while building IR at `token`.
    pub fn from_ir(err: IrError, token: &Token) -> Self {
        Self::with_token(err.to_string(), token)
    }
}

/// Source dialect accepted by the front end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Posix,
    Expr,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" | "sh" => Ok(Dialect::Posix),
            "expr" => Ok(Dialect::Expr),
            other => Err(format!("unknown dialect '{}' (expected posix or expr)", other)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Posix => write!(f, "posix"),
            Dialect::Expr => write!(f, "expr"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Options for parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub dialect: Dialect,
    /// Path recorded in the arena for diagnostics
    pub source_name: String,
    pub max_input_size: usize,
    pub max_depth: usize,
    /// Run tree validation before returning
    pub validate: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Posix,
            source_name: "<stdin>".to_string(),
            max_input_size: MAX_INPUT_SIZE,
            max_depth: MAX_PARSER_DEPTH,
            validate: true,
        }
    }
}

impl ParseOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = ParseOptions::default();
        assert_eq!(opts.dialect, Dialect::Posix);
        assert!(opts.validate);
        assert_eq!(opts.max_depth, MAX_PARSER_DEPTH);
    }

    #[test]
    fn test_options_from_partial_toml() {
        let opts = ParseOptions::from_toml_str("dialect = \"expr\"\nmax_depth = 8\n").unwrap();
        assert_eq!(opts.dialect, Dialect::Expr);
        assert_eq!(opts.max_depth, 8);
        assert_eq!(opts.source_name, "<stdin>");
    }

    #[test]
    fn test_options_reject_unknown_dialect() {
        assert!(matches!(
            ParseOptions::from_toml_str("dialect = \"fish\""),
            Err(ConfigError::Toml(_))
        ));
        assert!("fish".parse::<Dialect>().is_err());
        assert_eq!("expr".parse::<Dialect>(), Ok(Dialect::Expr));
    }

    #[test]
    fn test_exception_display() {
        let err = ParseException::new("unexpected ')'", 3, 7);
        assert_eq!(err.to_string(), "Parse error at 3:7: unexpected ')'");
    }
}
