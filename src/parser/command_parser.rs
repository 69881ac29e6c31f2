//! Simple Command Parser
//!
//! Handles assignment words, declaration builtins, arguments and
//! redirections. A simple command normalizes to one of:
//!   - VarAssign (or a sequence of them) when it is only assignments
//!   - VarAssign with scope and flags for `local`, `export`, `readonly`,
//!     `declare` and `typeset` when every operand is an assignment
//!   - SimpleCommand otherwise, with prefix assignments as EnvPairs

use regex_lite::Regex;

use crate::ir::{AssignFlag, AssignFlags, AssignScope, Command, EnvPair, Expr, HereDoc, LValue, Redir, RedirOp, IR};
use crate::parser::lexer::{Token, TokenType};
use crate::parser::parser::{normalize_list, Parser};
use crate::parser::types::{is_redirection_token, ParseException};
use crate::parser::word_parser::{parse_heredoc_body, word_to_expr};
use crate::source::SpanId;

lazy_static::lazy_static! {
    static ref ASSIGNMENT: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(\[([^\]]*)\])?=").unwrap();
}

/// Builtins whose assignment operands become VarAssign nodes
const DECL_BUILTINS: &[&str] = &["local", "declare", "typeset", "export", "readonly"];

/// True for an unquoted `NAME=...` or `NAME[index]=...` word.
pub(crate) fn is_assignment_word(token: &Token) -> bool {
    if token.token_type != TokenType::Word {
        return false;
    }
    ASSIGNMENT.is_match(&token.value)
}

/// An assignment word split into its pieces, with columns in characters.
struct AssignmentParts<'t> {
    name: &'t str,
    index: Option<(&'t str, usize)>,
    rhs: &'t str,
    rhs_column: usize,
}

fn split_assignment(token: &Token) -> Option<AssignmentParts<'_>> {
    let caps = ASSIGNMENT.captures(&token.value)?;
    let whole = caps.get(0)?;
    let name = caps.get(1)?.as_str();
    let index = caps.get(3).map(|m| {
        let column = token.column + token.value[..m.start()].chars().count();
        (m.as_str(), column)
    });
    Some(AssignmentParts {
        name,
        index,
        rhs: &token.value[whole.end()..],
        rhs_column: token.column + whole.as_str().chars().count(),
    })
}

impl Parser {
    pub(crate) fn parse_simple_command(&mut self) -> Result<Command, ParseException> {
        let start = self.current();
        let mut prefix: Vec<Token> = Vec::new();
        let mut words: Vec<Token> = Vec::new();
        let mut redirects: Vec<Redir> = Vec::new();

        loop {
            let token = self.current();
            match token.token_type {
                TokenType::Number => {
                    self.advance();
                    let fd = token
                        .value
                        .parse::<u32>()
                        .map_err(|_| ParseException::with_token("bad file descriptor", &token))?;
                    redirects.push(self.parse_redirection(Some(fd))?);
                }
                t if is_redirection_token(t) => {
                    redirects.push(self.parse_redirection(None)?);
                }
                TokenType::Word => {
                    self.advance();
                    if words.is_empty() && is_assignment_word(&token) {
                        prefix.push(token);
                    } else {
                        words.push(token);
                    }
                }
                // braces are ordinary words in argument position
                TokenType::LBrace | TokenType::RBrace if !words.is_empty() => {
                    self.advance();
                    words.push(token);
                }
                TokenType::LParen if words.len() == 1 && prefix.is_empty() => {
                    return Err(ParseException::with_token(
                        "function definitions are not supported",
                        &words[0],
                    ));
                }
                _ => break,
            }
        }

        if words.is_empty() && redirects.is_empty() {
            let mut assigns = Vec::with_capacity(prefix.len());
            for token in &prefix {
                let (lhs, rhs) = self.parse_assignment(token)?;
                assigns.push(IR::var_assign(lhs, rhs, AssignScope::Global, AssignFlags::new()));
            }
            return normalize_list(assigns).ok_or_else(|| ParseException::with_token("expected a command", &start));
        }

        if prefix.is_empty() && redirects.is_empty() {
            if let Some(cmd) = self.parse_declaration(&words)? {
                return Ok(cmd);
            }
        }

        let mut more_env = Vec::with_capacity(prefix.len());
        for token in &prefix {
            more_env.push(self.parse_env_pair(token)?);
        }
        let mut parsed_words = Vec::with_capacity(words.len());
        for token in &words {
            parsed_words.push(self.parse_word_token(token)?);
        }

        IR::simple_command(parsed_words, redirects, more_env).map_err(|e| ParseException::from_ir(e, &start))
    }

    // ===========================================================================
    // ASSIGNMENTS
    // ===========================================================================

    /// Split `NAME=value` or `NAME[index]=value` into an lvalue and a
    /// normalized right-hand side.
    fn parse_assignment(&mut self, token: &Token) -> Result<(LValue, Expr), ParseException> {
        let parts = split_assignment(token)
            .ok_or_else(|| ParseException::with_token("expected an assignment", token))?;
        let name_span = self.span_at(token.line, token.column, parts.name.len());

        let lhs = match parts.index {
            None => IR::left_var(parts.name, Some(name_span)).map_err(|e| ParseException::from_ir(e, token))?,
            Some((index_text, index_column)) => {
                if index_text.is_empty() {
                    return Err(ParseException::with_token(
                        format!("empty index in assignment to '{}'", parts.name),
                        token,
                    ));
                }
                let var = IR::user_var(parts.name).map_err(|e| ParseException::from_ir(e, token))?;
                let obj = Expr::VarSub(IR::var_sub(&self.arena, var, name_span, self.innermost_enclosing()));
                let bracket_span = self.span_at(token.line, index_column - 1, 1);
                let index = word_to_expr(self.parse_word_at(index_text, token.line, index_column)?);
                IR::left_index(obj, index, Some(bracket_span))
            }
        };

        let rhs = word_to_expr(self.parse_word_at(parts.rhs, token.line, parts.rhs_column)?);
        Ok((lhs, rhs))
    }

    fn parse_env_pair(&mut self, token: &Token) -> Result<EnvPair, ParseException> {
        let parts = split_assignment(token)
            .ok_or_else(|| ParseException::with_token("expected an assignment", token))?;
        if parts.index.is_some() {
            return Err(ParseException::with_token(
                format!("indexed assignment to '{}' cannot be a command environment", parts.name),
                token,
            ));
        }
        let span = self.span_at(token.line, token.column, parts.name.len());
        let value = self.parse_word_at(parts.rhs, token.line, parts.rhs_column)?;
        IR::env_pair(parts.name, value, Some(span)).map_err(|e| ParseException::from_ir(e, token))
    }

    /// `local`, `declare`, `typeset`, `export` and `readonly` with only
    /// assignment operands. Returns `None` to fall back to a plain command.
    fn parse_declaration(&mut self, words: &[Token]) -> Result<Option<Command>, ParseException> {
        let builtin = match words.first() {
            Some(t) if !t.quoted && DECL_BUILTINS.contains(&t.value.as_str()) => t.value.as_str(),
            _ => return Ok(None),
        };
        let (mut scope, mut flags) = match builtin {
            "export" => (AssignScope::Global, AssignFlags::new().with(AssignFlag::Export)),
            "readonly" => (AssignScope::Global, AssignFlags::new().with(AssignFlag::ReadOnly)),
            _ => (AssignScope::Local, AssignFlags::new()),
        };
        let allows_global = matches!(builtin, "declare" | "typeset");

        let mut i = 1;
        while let Some(word) = words.get(i) {
            if word.quoted || !word.value.starts_with('-') {
                break;
            }
            if word.value.len() < 2 {
                return Ok(None);
            }
            for c in word.value[1..].chars() {
                match c {
                    'x' => flags.insert(AssignFlag::Export),
                    'r' => flags.insert(AssignFlag::ReadOnly),
                    'g' if allows_global => scope = AssignScope::Global,
                    _ => return Ok(None),
                }
            }
            i += 1;
        }

        let operands = &words[i..];
        if operands.is_empty() || !operands.iter().all(is_assignment_word) {
            return Ok(None);
        }

        let mut assigns = Vec::with_capacity(operands.len());
        for token in operands {
            let (lhs, rhs) = self.parse_assignment(token)?;
            assigns.push(IR::var_assign(lhs, rhs, scope, flags.clone()));
        }
        Ok(normalize_list(assigns))
    }

    // ===========================================================================
    // REDIRECTIONS
    // ===========================================================================

    fn parse_redirection(&mut self, fd: Option<u32>) -> Result<Redir, ParseException> {
        let op_token = self.advance();
        let op = redir_op(op_token.token_type)
            .ok_or_else(|| ParseException::with_token("expected a redirection operator", &op_token))?;
        let op_span = self.span_of(&op_token);
        let fd = fd.unwrap_or_else(|| op.default_fd());

        if !self.check(&[TokenType::Word, TokenType::LBrace, TokenType::RBrace]) {
            return Err(self.error(&format!("expected redirection target after '{}'", op)));
        }
        let target = self.advance();

        if op.is_here_doc() {
            return self.parse_here_doc(op, op_span, fd, &op_token, &target);
        }

        let word = self.parse_word_token(&target)?;
        IR::redirect(op, Some(op_span), word, fd).map_err(|e| ParseException::from_ir(e, &op_token))
    }

    /// Declare the here-document, then fill it from the body the lexer
    /// collected. The redirect is only usable once filled.
    fn parse_here_doc(
        &mut self,
        op: RedirOp,
        op_span: SpanId,
        fd: u32,
        op_token: &Token,
        target: &Token,
    ) -> Result<Redir, ParseException> {
        let (delimiter, quoted) = match &op_token.heredoc {
            Some(body) => (body.delimiter.clone(), body.quoted),
            None => (
                target.value.replace(['\'', '"', '\\'], ""),
                target.quoted,
            ),
        };
        let declared = HereDoc::declare(op, Some(op_span), fd, !quoted, delimiter.clone())
            .map_err(|e| ParseException::from_ir(e, op_token))?;

        let body = op_token.heredoc.as_ref().ok_or_else(|| {
            ParseException::with_token(format!("here-document '{}' has no body", delimiter), op_token)
        })?;
        let enclosing = self.innermost_enclosing();
        let word = parse_heredoc_body(&mut self.arena, self.base, body, enclosing)?;
        let filled = declared.fill(word).map_err(|e| ParseException::from_ir(e, op_token))?;
        Ok(Redir::HereDoc(filled))
    }
}

fn redir_op(t: TokenType) -> Option<RedirOp> {
    let op = match t {
        TokenType::Less => RedirOp::Less,
        TokenType::Great => RedirOp::Great,
        TokenType::DGreat => RedirOp::DGreat,
        TokenType::LessAnd => RedirOp::LessAnd,
        TokenType::GreatAnd => RedirOp::GreatAnd,
        TokenType::LessGreat => RedirOp::LessGreat,
        TokenType::Clobber => RedirOp::Clobber,
        TokenType::TLess => RedirOp::TLess,
        TokenType::DLess => RedirOp::DLess,
        TokenType::DLessDash => RedirOp::DLessDash,
        _ => return None,
    };
    Some(op)
}
