//! Lexer for Shell Source
//!
//! Splits input into operator and word tokens for the parser. Words keep
//! their quotes; the word parser decomposes them later. Here-document
//! bodies are read after the next newline and attached to the operator
//! token that declared them.

use std::collections::HashMap;

/// Token types for the shell lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    // Separators
    Newline,
    Semicolon,
    Amp, // &

    // Operators the IR has no node for
    Pipe,    // |
    PipeAmp, // |&
    AndAnd,  // &&
    OrOr,    // ||
    DSemi,   // ;;

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<

    // Grouping
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // Words
    Word,
    Number, // fd directly before a redirection operator

    Comment,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::PipeAmp => "|&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::DSemi => ";;",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Word => "WORD",
            Self::Number => "NUMBER",
            Self::Comment => "COMMENT",
        }
    }
}

/// One line of a here-document body.
#[derive(Debug, Clone, PartialEq)]
pub struct HeredocLine {
    /// Line text without its newline, leading tabs removed for `<<-`
    pub text: String,
    pub line: usize,
    /// 1-based column where `text` starts
    pub column: usize,
}

/// Body read for a `<<` or `<<-` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct HeredocBody {
    pub delimiter: String,
    pub strip_tabs: bool,
    /// Delimiter was quoted, so the body is not expanded
    pub quoted: bool,
    pub lines: Vec<HeredocLine>,
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Character offsets into the input
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// For WORD tokens: any quoting or escaping present
    pub quoted: bool,
    /// For here-document operators, once the body has been read
    pub heredoc: Option<HeredocBody>,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            line,
            column,
            quoted: false,
            heredoc: None,
        }
    }

    pub fn with_quotes(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }
}

/// Error thrown when the lexer encounters invalid input
#[derive(Debug, Clone)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexerError {}

impl LexerError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Here-document waiting for the end of its line
#[derive(Debug, Clone)]
struct PendingHeredoc {
    token_index: usize,
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

lazy_static::lazy_static! {
    /// Single-character operators
    static ref SINGLE_CHAR_OPS: HashMap<char, TokenType> = {
        let mut m = HashMap::new();
        m.insert('|', TokenType::Pipe);
        m.insert('&', TokenType::Amp);
        m.insert(';', TokenType::Semicolon);
        m.insert('(', TokenType::LParen);
        m.insert(')', TokenType::RParen);
        m.insert('<', TokenType::Less);
        m.insert('>', TokenType::Great);
        m
    };
}

/// Two-character operators (`<<` is handled separately)
const TWO_CHAR_OPS: &[(&str, TokenType)] = &[
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    ("|&", TokenType::PipeAmp),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
];

/// Check if a character is a word boundary (ends a word token)
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let len = self.input.len();

        while self.pos < len {
            // Here-document bodies start on the line after their operator
            if !self.pending_heredocs.is_empty()
                && self.tokens.last().map(|t| t.token_type) == Some(TokenType::Newline)
            {
                self.read_heredoc_content()?;
                continue;
            }

            self.skip_whitespace();

            if self.pos >= len {
                break;
            }

            if let Some(token) = self.next_token()? {
                self.tokens.push(token);
            }
        }

        if !self.pending_heredocs.is_empty()
            && self.tokens.last().map(|t| t.token_type) == Some(TokenType::Newline)
        {
            self.read_heredoc_content()?;
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            "",
            self.pos,
            self.pos,
            self.line,
            self.column,
        ));

        Ok(self.tokens)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' => {
                    self.advance();
                }
                '\\' if self.peek(1) == Some('\n') => {
                    // Line continuation
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
        let start_line = self.line;
        let start_column = self.column;
        let start_pos = self.pos;

        let c0 = match self.current() {
            Some(c) => c,
            None => return Ok(None),
        };
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        if c0 == '#' {
            return Ok(Some(self.read_comment(start_pos, start_line, start_column)));
        }

        if c0 == '\n' {
            self.advance();
            return Ok(Some(Token::new(
                TokenType::Newline,
                "\n",
                start_pos,
                self.pos,
                start_line,
                start_column,
            )));
        }

        let op = |lexer: &mut Lexer, token_type: TokenType, width: usize| {
            for _ in 0..width {
                lexer.advance();
            }
            Token::new(
                token_type,
                token_type.as_str(),
                start_pos,
                lexer.pos,
                start_line,
                start_column,
            )
        };

        if c0 == '<' && c1 == Some('<') {
            if c2 == Some('<') {
                return Ok(Some(op(self, TokenType::TLess, 3)));
            }
            let strip_tabs = c2 == Some('-');
            let width = if strip_tabs { 3 } else { 2 };
            let token_type = if strip_tabs { TokenType::DLessDash } else { TokenType::DLess };
            let token = op(self, token_type, width);
            self.register_heredoc_from_lookahead(strip_tabs);
            return Ok(Some(token));
        }

        if let Some(next) = c1 {
            for (op_str, token_type) in TWO_CHAR_OPS {
                let mut chars = op_str.chars();
                if chars.next() == Some(c0) && chars.next() == Some(next) {
                    return Ok(Some(op(self, *token_type, 2)));
                }
            }
        }

        if let Some(token_type) = SINGLE_CHAR_OPS.get(&c0) {
            return Ok(Some(op(self, *token_type, 1)));
        }

        self.read_word(start_pos, start_line, start_column)
    }

    fn read_comment(&mut self, start: usize, line: usize, column: usize) -> Token {
        let mut value = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            value.push(c);
            self.advance();
        }
        Token::new(TokenType::Comment, value, start, self.pos, line, column)
    }

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> Result<Option<Token>, LexerError> {
        let mut value = String::new();
        let mut quoted = false;

        while let Some(c) = self.current() {
            if is_word_boundary(c) {
                break;
            }
            match c {
                '\'' => {
                    quoted = true;
                    self.read_single_quoted(&mut value)?;
                }
                '"' => {
                    quoted = true;
                    self.read_double_quoted(&mut value)?;
                }
                '\\' => {
                    quoted = true;
                    value.push(c);
                    self.advance();
                    if let Some(next) = self.advance() {
                        value.push(next);
                    }
                }
                '$' if self.peek(1) == Some('{') => self.read_until_close(&mut value, '{', '}', "${")?,
                '$' if self.peek(1) == Some('(') => self.read_until_close(&mut value, '(', ')', "$(")?,
                '`' => self.read_backquoted(&mut value)?,
                _ => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        if value.is_empty() {
            return Ok(None);
        }

        let token_type = if !quoted && value == "{" {
            TokenType::LBrace
        } else if !quoted && value == "}" {
            TokenType::RBrace
        } else if value.chars().all(|c| c.is_ascii_digit()) && matches!(self.current(), Some('<' | '>')) {
            TokenType::Number
        } else {
            TokenType::Word
        };

        Ok(Some(
            Token::new(token_type, value, start, self.pos, line, column).with_quotes(quoted),
        ))
    }

    fn read_single_quoted(&mut self, value: &mut String) -> Result<(), LexerError> {
        let (line, column) = (self.line, self.column);
        value.push('\'');
        self.advance();
        loop {
            match self.advance() {
                Some('\'') => {
                    value.push('\'');
                    return Ok(());
                }
                Some(c) => value.push(c),
                None => return Err(LexerError::new("unterminated single quote", line, column)),
            }
        }
    }

    fn read_double_quoted(&mut self, value: &mut String) -> Result<(), LexerError> {
        let (line, column) = (self.line, self.column);
        value.push('"');
        self.advance();
        loop {
            match self.current() {
                Some('"') => {
                    value.push('"');
                    self.advance();
                    return Ok(());
                }
                Some('\\') => {
                    value.push('\\');
                    self.advance();
                    if let Some(next) = self.advance() {
                        value.push(next);
                    }
                }
                Some('$') if self.peek(1) == Some('{') => self.read_until_close(value, '{', '}', "${")?,
                Some('$') if self.peek(1) == Some('(') => self.read_until_close(value, '(', ')', "$(")?,
                Some('`') => self.read_backquoted(value)?,
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
                None => return Err(LexerError::new("unterminated double quote", line, column)),
            }
        }
    }

    /// Consume `$` plus a balanced `open`..`close` group.
    fn read_until_close(&mut self, value: &mut String, open: char, close: char, what: &str) -> Result<(), LexerError> {
        let (line, column) = (self.line, self.column);
        value.push('$');
        self.advance();
        let mut depth = 0usize;
        while let Some(c) = self.advance() {
            value.push(c);
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(LexerError::new(format!("unterminated {}", what), line, column))
    }

    fn read_backquoted(&mut self, value: &mut String) -> Result<(), LexerError> {
        let (line, column) = (self.line, self.column);
        value.push('`');
        self.advance();
        while let Some(c) = self.advance() {
            value.push(c);
            if c == '`' {
                return Ok(());
            }
        }
        Err(LexerError::new("unterminated backquote", line, column))
    }

    fn read_heredoc_content(&mut self) -> Result<(), LexerError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let start_line = self.line;
            let mut lines = Vec::new();
            let mut terminated = false;

            while self.pos < self.input.len() {
                let line = self.line;
                let mut text = String::new();
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
                let had_newline = self.current() == Some('\n');
                if had_newline {
                    self.advance();
                }

                let stripped = if heredoc.strip_tabs {
                    text.trim_start_matches('\t')
                } else {
                    text.as_str()
                };
                if stripped == heredoc.delimiter {
                    terminated = true;
                    break;
                }
                let column = 1 + (text.chars().count() - stripped.chars().count());
                let mut body = stripped.to_string();
                if had_newline {
                    body.push('\n');
                }
                lines.push(HeredocLine { text: body, line, column });
            }

            if !terminated {
                return Err(LexerError::new(
                    format!("here-document delimited by end of input (wanted '{}')", heredoc.delimiter),
                    start_line,
                    1,
                ));
            }

            if let Some(token) = self.tokens.get_mut(heredoc.token_index) {
                token.heredoc = Some(HeredocBody {
                    delimiter: heredoc.delimiter,
                    strip_tabs: heredoc.strip_tabs,
                    quoted: heredoc.quoted,
                    lines,
                });
            }
        }
        Ok(())
    }

    /// Peek at the delimiter word after `<<` so its body can be read once
    /// the line ends. The delimiter word itself is still lexed normally.
    fn register_heredoc_from_lookahead(&mut self, strip_tabs: bool) {
        let mut i = self.pos;
        while matches!(self.input.get(i), Some(' ' | '\t')) {
            i += 1;
        }

        let mut delimiter = String::new();
        let mut quoted = false;

        while let Some(&c) = self.input.get(i) {
            if is_word_boundary(c) {
                break;
            }
            match c {
                '\'' | '"' => {
                    quoted = true;
                    i += 1;
                    while let Some(&q) = self.input.get(i) {
                        i += 1;
                        if q == c {
                            break;
                        }
                        delimiter.push(q);
                    }
                }
                '\\' => {
                    quoted = true;
                    i += 1;
                    if let Some(&next) = self.input.get(i) {
                        delimiter.push(next);
                        i += 1;
                    }
                }
                _ => {
                    delimiter.push(c);
                    i += 1;
                }
            }
        }

        if !delimiter.is_empty() {
            self.pending_heredocs.push(PendingHeredoc {
                token_index: self.tokens.len(),
                delimiter,
                strip_tabs,
                quoted,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(input: &str) -> Vec<TokenType> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_simple_command() {
        let tokens = Lexer::new("echo hello world").tokenize().unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].value, "echo");
        assert_eq!(tokens[2].column, 12);
        assert_eq!(tokens[3].token_type, TokenType::Eof);
    }

    #[test]
    fn test_quotes_stay_in_word() {
        let tokens = Lexer::new("echo \"a $x b\" 'c d'").tokenize().unwrap();
        assert_eq!(tokens[1].value, "\"a $x b\"");
        assert!(tokens[1].quoted);
        assert_eq!(tokens[2].value, "'c d'");
    }

    #[test]
    fn test_unterminated_quote() {
        let err = Lexer::new("echo 'abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated single quote"));
        assert_eq!((err.line, err.column), (1, 6));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            types("a; b && c || d | e &"),
            vec![
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Word,
                TokenType::AndAnd,
                TokenType::Word,
                TokenType::OrOr,
                TokenType::Word,
                TokenType::Pipe,
                TokenType::Word,
                TokenType::Amp,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_redirection_with_fd() {
        assert_eq!(
            types("cmd 2>>log <in"),
            vec![
                TokenType::Word,
                TokenType::Number,
                TokenType::DGreat,
                TokenType::Word,
                TokenType::Less,
                TokenType::Word,
                TokenType::Eof,
            ]
        );
        // a detached number is an argument
        assert_eq!(types("echo 2 >x")[1], TokenType::Word);
    }

    #[test]
    fn test_braces_are_reserved_only_alone() {
        assert_eq!(
            types("{ a; }"),
            vec![
                TokenType::LBrace,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::RBrace,
                TokenType::Eof,
            ]
        );
        assert_eq!(types("echo {a,b}")[1], TokenType::Word);
    }

    #[test]
    fn test_heredoc_body_attached_to_operator() {
        let tokens = Lexer::new("cat <<EOF\nhello $x\nEOF\necho done\n").tokenize().unwrap();
        let op = tokens.iter().find(|t| t.token_type == TokenType::DLess).unwrap();
        let body = op.heredoc.as_ref().unwrap();
        assert_eq!(body.delimiter, "EOF");
        assert!(!body.quoted);
        assert_eq!(body.lines.len(), 1);
        assert_eq!(body.lines[0].text, "hello $x\n");
        assert_eq!(body.lines[0].line, 2);
        assert!(tokens.iter().any(|t| t.value == "done" && t.line == 4));
    }

    #[test]
    fn test_heredoc_strip_tabs_and_quoted_delimiter() {
        let tokens = Lexer::new("cat <<-'END'\n\t\tkeep $x\n\tEND\n").tokenize().unwrap();
        let body = tokens[1].heredoc.as_ref().unwrap();
        assert!(body.quoted);
        assert!(body.strip_tabs);
        assert_eq!(body.lines[0].text, "keep $x\n");
        assert_eq!(body.lines[0].column, 3);
    }

    #[test]
    fn test_two_heredocs_fill_in_order() {
        let tokens = Lexer::new("cat <<A <<B\na\nA\nb\nB\n").tokenize().unwrap();
        let bodies: Vec<&HeredocBody> = tokens.iter().filter_map(|t| t.heredoc.as_ref()).collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].delimiter, "A");
        assert_eq!(bodies[0].lines[0].text, "a\n");
        assert_eq!(bodies[1].delimiter, "B");
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = Lexer::new("cat <<EOF\nnever closed\n").tokenize().unwrap_err();
        assert!(err.message.contains("wanted 'EOF'"));
    }

    #[test]
    fn test_comment() {
        let tokens = Lexer::new("echo a # note\n").tokenize().unwrap();
        assert_eq!(tokens[2].token_type, TokenType::Comment);
        assert_eq!(tokens[3].token_type, TokenType::Newline);
    }
}
