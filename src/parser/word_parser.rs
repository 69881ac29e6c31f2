//! Word Parsing
//!
//! Decomposes the raw text of a word token into IR word parts, registering
//! a span for every literal run and substitution it finds. Also holds the
//! right-hand-side normalization shared by both dialects.

use lazy_static::lazy_static;
use regex_lite::Regex;

use crate::ir::{self, Expr, SpecialVar, TokenKind, Var, Word, WordPart, IR};
use crate::parser::lexer::HeredocBody;
use crate::parser::types::ParseException;
use crate::source::{Arena, LineId, SpanId};

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref FLOAT: Regex = Regex::new(r"^[0-9]+\.[0-9]+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unquoted,
    DoubleQuoted,
    HereDoc,
}

/// Parser over the characters of one word, or one here-document line.
pub struct WordParser<'a> {
    arena: &'a mut Arena,
    base: LineId,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    enclosing: Option<SpanId>,
}

impl<'a> WordParser<'a> {
    /// `line` and `column` are the 1-based position of the first character
    /// of `text`; `base` is the arena id of source line 1.
    pub fn new(
        arena: &'a mut Arena,
        base: LineId,
        text: &str,
        line: usize,
        column: usize,
        enclosing: Option<SpanId>,
    ) -> Self {
        Self {
            arena,
            base,
            chars: text.chars().collect(),
            pos: 0,
            line,
            column,
            enclosing,
        }
    }

    pub fn parse_word(mut self) -> Result<Word, ParseException> {
        let parts = self.scan(Mode::Unquoted)?;
        Ok(IR::word(parts))
    }

    // -------------------------------------------------------------------------
    // Cursor
    // -------------------------------------------------------------------------

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
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

    fn error(&self, message: impl Into<String>) -> ParseException {
        ParseException::new(message, self.line, self.column)
    }

    fn span(&mut self, line: usize, column: usize, length: usize) -> SpanId {
        self.arena
            .add_span(self.base.offset(line.saturating_sub(1)), column.saturating_sub(1), length)
    }

    fn token(&mut self, kind: TokenKind, val: String, line: usize, column: usize) -> ir::Token {
        let length = val.trim_end_matches('\n').chars().count();
        let span = self.span(line, column, length);
        IR::token(kind, val, Some(span))
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    fn scan(&mut self, mode: Mode) -> Result<Vec<WordPart>, ParseException> {
        let mut parts = Vec::new();
        let mut run = LiteralRun::default();

        loop {
            let c = match self.current() {
                Some(c) => c,
                None if mode == Mode::DoubleQuoted => return Err(self.error("unterminated double quote")),
                None => break,
            };

            match c {
                '"' if mode == Mode::DoubleQuoted => {
                    self.advance();
                    break;
                }
                '\\' => {
                    self.flush(&mut run, &mut parts);
                    self.escape(mode, &mut run, &mut parts);
                }
                '\'' if mode == Mode::Unquoted => {
                    self.flush(&mut run, &mut parts);
                    parts.push(self.single_quoted()?);
                }
                '"' if mode == Mode::Unquoted => {
                    self.flush(&mut run, &mut parts);
                    let (open_line, open_column) = (self.line, self.column);
                    self.advance();
                    let mut inner = self.scan(Mode::DoubleQuoted)?;
                    if inner.is_empty() {
                        let span = self.span(open_line, open_column, 2);
                        inner.push(WordPart::Literal(IR::token(TokenKind::LitChars, "", Some(span))));
                    }
                    parts.push(IR::double_quoted(inner).map_err(|e| self.error(e.to_string()))?);
                }
                '`' => return Err(self.error("command substitution with backquotes is not supported")),
                '$' => {
                    let (line, column) = (self.line, self.column);
                    match self.var_sub()? {
                        Some(vs) => {
                            self.flush(&mut run, &mut parts);
                            parts.push(WordPart::VarSub(vs));
                        }
                        None => {
                            run.push('$', line, column);
                            self.advance();
                        }
                    }
                }
                '\n' => {
                    run.push(c, self.line, self.column);
                    self.advance();
                    self.flush(&mut run, &mut parts);
                }
                _ => {
                    run.push(c, self.line, self.column);
                    self.advance();
                }
            }
        }

        self.flush(&mut run, &mut parts);
        Ok(parts)
    }

    fn flush(&mut self, run: &mut LiteralRun, parts: &mut Vec<WordPart>) {
        if let Some((text, line, column)) = run.take() {
            let token = self.token(TokenKind::LitChars, text, line, column);
            parts.push(WordPart::Literal(token));
        }
    }

    /// Handle a backslash at the cursor.
    fn escape(&mut self, mode: Mode, run: &mut LiteralRun, parts: &mut Vec<WordPart>) {
        let (line, column) = (self.line, self.column);
        self.advance();
        let next = match self.current() {
            Some(c) => c,
            None => {
                run.push('\\', line, column);
                return;
            }
        };
        if next == '\n' && mode != Mode::HereDoc {
            // line continuation
            self.advance();
            return;
        }
        let escapes = match mode {
            Mode::Unquoted => true,
            Mode::DoubleQuoted => matches!(next, '$' | '"' | '\\' | '`'),
            Mode::HereDoc => matches!(next, '$' | '\\' | '`'),
        };
        if escapes {
            self.advance();
            let token = self.token(TokenKind::LitEscapedChar, format!("\\{}", next), line, column);
            parts.push(WordPart::Literal(token));
        } else {
            run.push('\\', line, column);
        }
    }

    /// `'...'`, one token per source line. `''` yields a single empty token.
    fn single_quoted(&mut self) -> Result<WordPart, ParseException> {
        let (open_line, open_column) = (self.line, self.column);
        self.advance();
        let mut tokens = Vec::new();
        let mut run = LiteralRun::default();
        loop {
            let (line, column) = (self.line, self.column);
            match self.advance() {
                Some('\'') => break,
                Some('\n') => {
                    run.push('\n', line, column);
                    if let Some((text, line, column)) = run.take() {
                        tokens.push(self.token(TokenKind::LitChars, text, line, column));
                    }
                }
                Some(c) => run.push(c, line, column),
                None => return Err(ParseException::new("unterminated single quote", open_line, open_column)),
            }
        }
        match run.take() {
            Some((text, line, column)) => tokens.push(self.token(TokenKind::LitChars, text, line, column)),
            None if tokens.is_empty() => {
                let span = self.span(open_line, open_column, 2);
                tokens.push(IR::token(TokenKind::LitChars, "", Some(span)));
            }
            None => {}
        }
        IR::single_quoted(tokens).map_err(|e| self.error(e.to_string()))
    }

    /// Parse a substitution at `$`. Returns `None` when the `$` is literal.
    fn var_sub(&mut self) -> Result<Option<ir::VarSub>, ParseException> {
        let (line, column) = (self.line, self.column);
        let next = match self.peek(1) {
            Some(c) => c,
            None => return Ok(None),
        };

        let var = match next {
            '{' => {
                let close = (self.pos + 2..self.chars.len()).find(|&i| self.chars[i] == '}');
                let close = match close {
                    Some(i) => i,
                    None => return Err(self.error("unterminated ${")),
                };
                let inner: String = self.chars[self.pos + 2..close].iter().collect();
                let var = braced_var(&inner).ok_or_else(|| {
                    self.error(format!("parameter expansion '${{{}}}' is not supported", inner))
                })?;
                for _ in self.pos..=close {
                    self.advance();
                }
                var
            }
            '(' => return Err(self.error("command substitution '$(...)' is not supported")),
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.advance();
                let mut name = String::new();
                while let Some(c) = self.current() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    self.advance();
                }
                Var::UserVar(name)
            }
            c => match SpecialVar::from_char(c) {
                Some(special) => {
                    self.advance();
                    self.advance();
                    Var::SystemVar(special)
                }
                None => return Ok(None),
            },
        };

        let length = self.column - column;
        let span = self.span(line, column, length);
        Ok(Some(IR::var_sub(&*self.arena, var, span, self.enclosing)))
    }
}

/// Literal characters waiting to become a token.
#[derive(Default)]
struct LiteralRun {
    text: String,
    start: Option<(usize, usize)>,
}

impl LiteralRun {
    fn push(&mut self, c: char, line: usize, column: usize) {
        if self.start.is_none() {
            self.start = Some((line, column));
        }
        self.text.push(c);
    }

    fn take(&mut self) -> Option<(String, usize, usize)> {
        let (line, column) = self.start.take()?;
        Some((std::mem::take(&mut self.text), line, column))
    }
}

/// The variable named inside `${...}`.
fn braced_var(inner: &str) -> Option<Var> {
    if ir::is_valid_name(inner) {
        return Some(Var::UserVar(inner.to_string()));
    }
    if DIGITS.is_match(inner) {
        let n: u32 = inner.parse().ok()?;
        return Some(Var::SystemVar(if n == 0 { SpecialVar::Zero } else { SpecialVar::Arg(n) }));
    }
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => SpecialVar::from_char(c).map(Var::SystemVar),
        _ => None,
    }
}

/// Parse a here-document body into a word. Quoted delimiters give one
/// single-quoted part with a token per line; otherwise substitutions are
/// parsed as in double quotes.
pub fn parse_heredoc_body(
    arena: &mut Arena,
    base: LineId,
    body: &HeredocBody,
    enclosing: Option<SpanId>,
) -> Result<Word, ParseException> {
    if body.quoted {
        let mut tokens = Vec::new();
        for line in &body.lines {
            let length = line.text.trim_end_matches('\n').chars().count();
            let span = arena.add_span(base.offset(line.line - 1), line.column - 1, length);
            tokens.push(IR::token(TokenKind::LitChars, line.text.clone(), Some(span)));
        }
        if tokens.is_empty() {
            return Ok(IR::word(vec![]));
        }
        let part = IR::single_quoted(tokens).map_err(|e| ParseException::new(e.to_string(), 1, 1))?;
        return Ok(IR::word(vec![part]));
    }

    let mut parts = Vec::new();
    for line in &body.lines {
        let mut parser = WordParser::new(arena, base, &line.text, line.line, line.column, enclosing);
        parts.extend(parser.scan(Mode::HereDoc)?);
    }
    Ok(IR::word(parts))
}

/// Normalize an assignment right-hand side.
///
/// Digits become an integer, `digits.digits` a float, a lone quoted string
/// or substitution its own literal variant; anything else stays a word.
pub fn word_to_expr(word: Word) -> Expr {
    let single = match word.parts.as_slice() {
        [part] => part_to_expr(part),
        _ => None,
    };
    single.unwrap_or(Expr::Word(word))
}

fn part_to_expr(part: &WordPart) -> Option<Expr> {
    match part {
        WordPart::Literal(t) if t.kind == TokenKind::LitChars && DIGITS.is_match(&t.val) => {
            IR::int_literal(IR::token(TokenKind::LitDigits, t.val.clone(), t.span_id)).ok()
        }
        WordPart::Literal(t) if t.kind == TokenKind::LitChars && FLOAT.is_match(&t.val) => {
            IR::float_literal(IR::token(TokenKind::LitFloat, t.val.clone(), t.span_id)).ok()
        }
        WordPart::SingleQuoted(sq) => {
            let val: String = sq.tokens.iter().map(|t| t.val.as_str()).collect();
            let span = sq.tokens.first().and_then(|t| t.span_id);
            Some(Expr::SingleQuotedLiteral(IR::token(TokenKind::LitChars, val, span)))
        }
        WordPart::DoubleQuoted(dq) if dq.parts.iter().all(|p| matches!(p, WordPart::Literal(_))) => {
            let mut val = String::new();
            for part in &dq.parts {
                if let WordPart::Literal(t) = part {
                    val.push_str(t.literal_text());
                }
            }
            let span = Word { parts: vec![part.clone()] }.first_span();
            Some(Expr::DoubleQuotedLiteral(IR::token(TokenKind::LitChars, val, span)))
        }
        WordPart::VarSub(vs) => Some(Expr::VarSub(vs.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::printer::{print_expr, print_word};
    use crate::parser::lexer::HeredocLine;

    fn parse(src: &str) -> (Arena, Word) {
        let mut arena = Arena::new();
        let base = arena.add_source("t.sh", src);
        let word = WordParser::new(&mut arena, base, src, 1, 1, None).parse_word().unwrap();
        (arena, word)
    }

    #[test]
    fn test_double_quoted_with_var_sub() {
        let (arena, word) = parse("\"a$x b\"");
        assert_eq!(
            print_word(&word),
            r#"{[DQ [Lit <Lit_Chars "a">] [VarSub x] [Lit <Lit_Chars " b">]]}"#
        );
        let vs = match &word.parts[0] {
            WordPart::DoubleQuoted(dq) => match &dq.parts[1] {
                WordPart::VarSub(vs) => vs.clone(),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(arena.snippet(vs.span_id).as_deref(), Some("$x"));
    }

    #[test]
    fn test_unquoted_parts_and_escapes() {
        let (arena, word) = parse(r"a\$b${c}'d e'");
        assert_eq!(
            print_word(&word),
            r#"{[Lit <Lit_Chars "a">] [Lit <Lit_EscapedChar "\\$">] [Lit <Lit_Chars "b">] [VarSub c] [SQ <Lit_Chars "d e">]}"#
        );
        assert_eq!(word.static_text(), None);
        if let WordPart::VarSub(vs) = &word.parts[3] {
            assert_eq!(arena.snippet(vs.span_id).as_deref(), Some("${c}"));
        }
    }

    #[test]
    fn test_special_and_positional_vars() {
        let (_, word) = parse("$@$1${10}$?");
        let names: Vec<String> = word
            .parts
            .iter()
            .filter_map(|p| match p {
                WordPart::VarSub(vs) => Some(vs.var.name()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["@", "1", "10", "?"]);
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        let (_, word) = parse("a$");
        assert_eq!(word.static_text().as_deref(), Some("a$"));
    }

    #[test]
    fn test_unsupported_substitutions() {
        for src in ["$(ls)", "`ls`", "${x:-y}", "\"$(ls)\""] {
            let mut arena = Arena::new();
            let base = arena.add_source("t.sh", src);
            let result = WordParser::new(&mut arena, base, src, 1, 1, None).parse_word();
            assert!(result.is_err(), "{} should be rejected", src);
        }
    }

    #[test]
    fn test_empty_single_quotes_keep_a_token() {
        let (_, word) = parse("''");
        assert_eq!(print_word(&word), r#"{[SQ <Lit_Chars "">]}"#);
    }

    #[test]
    fn test_empty_double_quotes_keep_a_positioned_token() {
        let (arena, word) = parse("\"\"");
        assert_eq!(print_word(&word), r#"{[DQ [Lit <Lit_Chars "">]]}"#);
        let span = word.first_span().unwrap();
        assert_eq!(arena.snippet(span).unwrap(), "\"\"");

        match word_to_expr(word) {
            Expr::DoubleQuotedLiteral(t) => {
                assert_eq!(t.val, "");
                assert_eq!(t.span_id, Some(span));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_quoted_newline_run_starts_after_quote() {
        let (arena, word) = parse("'\ncd'");
        let tokens = match &word.parts[0] {
            WordPart::SingleQuoted(sq) => sq.tokens.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(tokens.len(), 2);
        let first = arena.location(tokens[0].span_id.unwrap()).unwrap();
        assert_eq!((first.line, first.col), (1, 1));
        let second = arena.location(tokens[1].span_id.unwrap()).unwrap();
        assert_eq!((second.line, second.col), (2, 0));
    }

    #[test]
    fn test_word_to_expr_rules() {
        let cases = [
            ("1", "(IntLiteral 1)"),
            ("2.5", "(FloatLiteral 2.5)"),
            ("'a b'", r#"(SingleQuotedLiteral <Lit_Chars "a b">)"#),
            ("\"q\\\"\"", r#"(DoubleQuotedLiteral <Lit_Chars "q\"">)"#),
            ("$v", "(VarSub v)"),
            ("a$v", r#"(Word {[Lit <Lit_Chars "a">] [VarSub v]})"#),
            ("\"$v\"", "(Word {[DQ [VarSub v]]})"),
        ];
        for (src, expected) in cases {
            let (_, word) = parse(src);
            assert_eq!(print_expr(&word_to_expr(word)), expected, "{}", src);
        }
    }

    #[test]
    fn test_heredoc_body_expansion() {
        let mut arena = Arena::new();
        let base = arena.add_source("t.sh", "cat <<EOF\nhi $name \\$\nEOF");
        let body = HeredocBody {
            delimiter: "EOF".to_string(),
            strip_tabs: false,
            quoted: false,
            lines: vec![HeredocLine {
                text: "hi $name \\$\n".to_string(),
                line: 2,
                column: 1,
            }],
        };
        let word = parse_heredoc_body(&mut arena, base, &body, None).unwrap();
        assert_eq!(
            print_word(&word),
            r#"{[Lit <Lit_Chars "hi ">] [VarSub name] [Lit <Lit_Chars " ">] [Lit <Lit_EscapedChar "\\$">] [Lit <Lit_Chars "\n">]}"#
        );
    }

    #[test]
    fn test_quoted_heredoc_body_is_literal() {
        let mut arena = Arena::new();
        let base = arena.add_source("t.sh", "cat <<'EOF'\n$x\nEOF");
        let body = HeredocBody {
            delimiter: "EOF".to_string(),
            strip_tabs: false,
            quoted: true,
            lines: vec![HeredocLine {
                text: "$x\n".to_string(),
                line: 2,
                column: 1,
            }],
        };
        let word = parse_heredoc_body(&mut arena, base, &body, None).unwrap();
        assert_eq!(print_word(&word), r#"{[SQ <Lit_Chars "$x\n">]}"#);
    }
}
