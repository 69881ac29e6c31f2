//! Parser module for shell scripts
//!
//! This module contains the lexer and the parsers that lower both source
//! dialects into the IR.

pub mod types;
pub mod lexer;
pub mod word_parser;
pub mod command_parser;
pub mod expr_parser;
pub mod parser;

// Re-exports
pub use types::{ConfigError, Dialect, ParseException, ParseOptions};
pub use lexer::{Lexer, LexerError, Token, TokenType};
pub use parser::{parse, parse_with_options, ParsedScript, Parser};
