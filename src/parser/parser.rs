//! Recursive Descent Parser
//!
//! Consumes lexer tokens and produces a validated IR tree. Only constructs
//! that normalize into the five command variants are accepted; anything
//! else is rejected with a parse error naming the construct.
//!
//! Grammar (simplified):
//!   script     ::= list
//!   list       ::= command ((';' | NEWLINE) command)*
//!   command    ::= simple_cmd | '{' list '}' | '(' list ')' | expr_stmt
//!   simple_cmd ::= (assignment)* (word | redirection)*
//!   expr_stmt  ::= ('var' | 'const') NAME '=' EXPR
//!                | ('setvar' | 'setglobal') LVALUE '=' EXPR
//!                | 'fork' '{' list '}'

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::ir::{self, Command, CommandSeq, IR};
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::{
    is_redirection_token, is_unsupported_operator, Dialect, ParseException, ParseOptions, MAX_PARSE_ITERATIONS,
    MAX_TOKENS,
};
use crate::parser::word_parser::WordParser;
use crate::source::{Arena, LineId, SpanId};

lazy_static::lazy_static! {
    /// Words that start constructs with no IR counterpart
    static ref RESERVED_WORDS: HashSet<&'static str> = {
        [
            "if", "then", "else", "elif", "fi", "for", "while", "until", "do", "done", "case", "esac",
            "in", "function", "select", "time", "coproc", "!", "[[", "]]",
        ]
        .into_iter()
        .collect()
    };

    /// Statement keywords of the expression dialect
    pub(crate) static ref EXPR_KEYWORDS: HashSet<&'static str> = {
        ["var", "const", "setvar", "setglobal", "fork"].into_iter().collect()
    };
}

/// A parsed script together with the arena its spans point into.
#[derive(Debug)]
pub struct ParsedScript {
    pub arena: Arena,
    /// `None` for input with no commands
    pub command: Option<Command>,
}

pub struct Parser {
    pub(crate) options: ParseOptions,
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) arena: Arena,
    pub(crate) base: LineId,
    /// Spans of the subshells around the cursor, innermost last
    pub(crate) enclosing: Vec<SpanId>,
    depth: usize,
    parse_iterations: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Parser {
            options,
            tokens: Vec::new(),
            pos: 0,
            arena: Arena::new(),
            base: LineId(0),
            enclosing: Vec::new(),
            depth: 0,
            parse_iterations: 0,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse a whole script into a fresh arena.
    pub fn parse(&mut self, input: &str) -> Result<ParsedScript, ParseException> {
        self.parse_into(Arena::new(), input)
    }

    /// Parse a script, registering its lines in `arena`.
    pub fn parse_into(&mut self, mut arena: Arena, input: &str) -> Result<ParsedScript, ParseException> {
        if input.len() > self.options.max_input_size {
            return Err(ParseException::new(
                format!(
                    "Input too large: {} bytes exceeds limit of {}",
                    input.len(),
                    self.options.max_input_size
                ),
                1,
                1,
            ));
        }

        self.base = arena.add_source(self.options.source_name.clone(), input);
        self.arena = arena;
        self.tokens = Lexer::new(input)
            .tokenize()
            .map_err(|e| ParseException::new(e.message, e.line, e.column))?;

        if self.tokens.len() > MAX_TOKENS {
            return Err(ParseException::new(
                format!("Too many tokens: {} exceeds limit of {}", self.tokens.len(), MAX_TOKENS),
                1,
                1,
            ));
        }

        self.pos = 0;
        self.enclosing.clear();
        self.depth = 0;
        self.parse_iterations = 0;

        let command = self.parse_script()?;

        if self.options.validate {
            if let Some(cmd) = &command {
                ir::validate_command(cmd, &self.arena)
                    .map_err(|e| ParseException::new(format!("invalid tree: {}", e), 1, 1))?;
            }
        }

        debug!(
            source = %self.options.source_name,
            dialect = %self.options.dialect,
            tokens = self.tokens.len(),
            spans = self.arena.span_count(),
            "parsed script"
        );

        Ok(ParsedScript {
            arena: std::mem::take(&mut self.arena),
            command,
        })
    }

    // ===========================================================================
    // HELPER METHODS
    // ===========================================================================

    pub(crate) fn current(&self) -> Token {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token) => token.clone(),
            None => Token::new(TokenType::Eof, "", 0, 0, 1, 1),
        }
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, types: &[TokenType]) -> bool {
        let current_type = self.tokens.get(self.pos).map(|t| &t.token_type);
        types.iter().any(|t| current_type == Some(t))
    }

    pub(crate) fn expect(&mut self, token_type: TokenType, message: &str) -> Result<Token, ParseException> {
        if self.check(&[token_type]) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    pub(crate) fn error(&self, message: &str) -> ParseException {
        let token = self.current();
        ParseException::with_token(message, &token)
    }

    fn check_iteration_limit(&mut self) -> Result<(), ParseException> {
        self.parse_iterations += 1;
        if self.parse_iterations > MAX_PARSE_ITERATIONS {
            return Err(self.error("Maximum parse iterations exceeded (possible infinite loop)"));
        }
        Ok(())
    }

    fn skip_newlines(&mut self) {
        while self.check(&[TokenType::Newline, TokenType::Comment]) {
            self.advance();
        }
    }

    /// True at a token that ends a command.
    pub(crate) fn is_command_end(&self) -> bool {
        self.check(&[
            TokenType::Eof,
            TokenType::Newline,
            TokenType::Semicolon,
            TokenType::Comment,
            TokenType::RParen,
            TokenType::RBrace,
        ])
    }

    /// Span covering the first line of a token.
    pub(crate) fn span_of(&mut self, token: &Token) -> SpanId {
        let length = token.value.split('\n').next().map_or(0, |l| l.chars().count());
        self.arena
            .add_span(self.base.offset(token.line - 1), token.column - 1, length)
    }

    pub(crate) fn span_at(&mut self, line: usize, column: usize, length: usize) -> SpanId {
        self.arena.add_span(self.base.offset(line - 1), column - 1, length)
    }

    pub(crate) fn innermost_enclosing(&self) -> Option<SpanId> {
        self.enclosing.last().copied()
    }

    /// Parse `text`, which starts at `line`:`column` of the source.
    pub(crate) fn parse_word_at(&mut self, text: &str, line: usize, column: usize) -> Result<ir::Word, ParseException> {
        let enclosing = self.innermost_enclosing();
        WordParser::new(&mut self.arena, self.base, text, line, column, enclosing).parse_word()
    }

    pub(crate) fn parse_word_token(&mut self, token: &Token) -> Result<ir::Word, ParseException> {
        self.parse_word_at(&token.value, token.line, token.column)
    }

    fn enter_nesting(&mut self) -> Result<(), ParseException> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(self.error(&format!("Nesting deeper than {} levels", self.options.max_depth)));
        }
        Ok(())
    }

    fn leave_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn unsupported(&self, token: &Token) -> ParseException {
        let what = match token.token_type {
            TokenType::Pipe | TokenType::PipeAmp => "pipelines".to_string(),
            TokenType::AndAnd | TokenType::OrOr => format!("'{}' lists", token.value),
            TokenType::Amp => "background jobs ('&')".to_string(),
            TokenType::DSemi => "case terminators (';;')".to_string(),
            _ => format!("'{}'", token.value),
        };
        ParseException::with_token(format!("{} cannot be represented", what), token)
    }

    // ===========================================================================
    // LISTS & COMPOUND COMMANDS
    // ===========================================================================

    fn parse_script(&mut self) -> Result<Option<Command>, ParseException> {
        let commands = self.parse_list(&[TokenType::Eof])?;
        if !self.check(&[TokenType::Eof]) {
            let token = self.current();
            return Err(ParseException::with_token(
                format!("syntax error near unexpected token '{}'", token.value),
                &token,
            ));
        }
        Ok(normalize_list(commands))
    }

    /// Parse commands up to (not including) one of `terminators`.
    pub(crate) fn parse_list(&mut self, terminators: &[TokenType]) -> Result<Vec<Command>, ParseException> {
        let mut commands = Vec::new();

        loop {
            self.check_iteration_limit()?;
            self.skip_newlines();
            if self.check(terminators) || self.check(&[TokenType::Eof]) {
                break;
            }

            commands.push(self.parse_command()?);

            if self.check(&[TokenType::Semicolon]) {
                self.advance();
                continue;
            }
            if self.check(&[TokenType::Newline, TokenType::Comment]) {
                continue;
            }
            if self.check(terminators) || self.check(&[TokenType::Eof]) {
                break;
            }

            let token = self.current();
            if is_unsupported_operator(token.token_type) {
                return Err(self.unsupported(&token));
            }
            return Err(ParseException::with_token(
                format!("syntax error near unexpected token '{}'", token.value),
                &token,
            ));
        }

        Ok(commands)
    }

    fn parse_command(&mut self) -> Result<Command, ParseException> {
        let token = self.current();
        match token.token_type {
            TokenType::LParen => self.parse_subshell(),
            TokenType::LBrace => self.parse_group(),
            TokenType::Word
                if self.options.dialect == Dialect::Expr
                    && !token.quoted
                    && EXPR_KEYWORDS.contains(token.value.as_str()) =>
            {
                self.parse_expr_statement()
            }
            TokenType::Word if !token.quoted && RESERVED_WORDS.contains(token.value.as_str()) => Err(
                ParseException::with_token(format!("'{}' compound commands are not supported", token.value), &token),
            ),
            TokenType::Word | TokenType::Number => self.parse_simple_command(),
            t if is_redirection_token(t) => self.parse_simple_command(),
            t if is_unsupported_operator(t) => Err(self.unsupported(&token)),
            _ => Err(ParseException::with_token(
                format!("syntax error near unexpected token '{}'", token.value),
                &token,
            )),
        }
    }

    /// `( list )` becomes a Fork. Substitutions inside record the `(` as
    /// their enclosing construct.
    fn parse_subshell(&mut self) -> Result<Command, ParseException> {
        let open = self.advance();
        let next = self.current();
        if next.token_type == TokenType::LParen && next.start == open.end {
            return Err(ParseException::with_token("arithmetic commands '((' are not supported", &open));
        }

        self.enter_nesting()?;
        let span = self.span_of(&open);
        self.enclosing.push(span);
        let body = self.parse_list(&[TokenType::RParen])?;
        self.enclosing.pop();
        self.expect(TokenType::RParen, "expected ')' to close subshell")?;
        self.leave_nesting();
        self.check_after_compound("subshell")?;

        trace!(line = open.line, commands = body.len(), "subshell");
        let child = normalize_list(body).ok_or_else(|| ParseException::with_token("empty subshell", &open))?;
        Ok(IR::fork(child, Some(span)))
    }

    /// `{ list; }` always becomes a CommandSeq, even with one child.
    pub(crate) fn parse_group(&mut self) -> Result<Command, ParseException> {
        let open = self.expect(TokenType::LBrace, "expected '{'")?;
        self.enter_nesting()?;
        let body = self.parse_list(&[TokenType::RBrace])?;
        self.expect(TokenType::RBrace, "expected '}' to close brace group")?;
        self.leave_nesting();
        self.check_after_compound("brace group")?;

        IR::command_seq(body).map_err(|e| ParseException::from_ir(e, &open))
    }

    fn check_after_compound(&self, what: &str) -> Result<(), ParseException> {
        let token = self.current();
        if is_redirection_token(token.token_type) || token.token_type == TokenType::Number {
            return Err(ParseException::with_token(
                format!("redirections on a {} cannot be represented", what),
                &token,
            ));
        }
        if matches!(token.token_type, TokenType::Word | TokenType::LParen | TokenType::LBrace) {
            return Err(ParseException::with_token(
                format!("unexpected '{}' after {}", token.value, what),
                &token,
            ));
        }
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// One command stays as is; several become a sequence.
pub(crate) fn normalize_list(mut commands: Vec<Command>) -> Option<Command> {
    match commands.len() {
        0 => None,
        1 => commands.pop(),
        _ => Some(Command::CommandSeq(CommandSeq { children: commands })),
    }
}

/// Convenience function to parse a POSIX script
pub fn parse(input: &str) -> Result<ParsedScript, ParseException> {
    Parser::new().parse(input)
}

/// Parse with explicit options
pub fn parse_with_options(input: &str, options: ParseOptions) -> Result<ParsedScript, ParseException> {
    Parser::with_options(options).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::visit::{walk_command, Visitor};
    use crate::ir::{print_tree, to_shell, Redir, VarSub};

    fn tree(input: &str) -> String {
        let parsed = parse(input).unwrap();
        print_tree(&parsed.command.unwrap())
    }

    fn err(input: &str) -> String {
        parse(input).unwrap_err().message
    }

    #[derive(Default)]
    struct VarSubs(Vec<VarSub>);

    impl Visitor for VarSubs {
        fn visit_var_sub(&mut self, vs: &VarSub) {
            self.0.push(vs.clone());
        }
    }

    fn var_subs(cmd: &Command) -> Vec<VarSub> {
        let mut v = VarSubs::default();
        v.visit_command(cmd);
        v.0
    }

    #[test]
    fn test_parse_empty() {
        let parsed = parse("").unwrap();
        assert!(parsed.command.is_none());
        assert!(parse("\n# only a comment\n").unwrap().command.is_none());
    }

    #[test]
    fn test_parse_double_quoted_word() {
        assert_eq!(
            tree("echo \"a$x b\""),
            r#"(SimpleCommand {[Lit <Lit_Chars "echo">]} {[DQ [Lit <Lit_Chars "a">] [VarSub x] [Lit <Lit_Chars " b">]]})"#
        );
    }

    #[test]
    fn test_parse_local_indexed_assignment() {
        assert_eq!(
            tree("local y[0]=1"),
            "(VarAssign (LeftIndex (VarSub y) (IntLiteral 0)) (IntLiteral 1) Local flags=[])"
        );
    }

    #[test]
    fn test_index_may_be_a_substitution() {
        assert_eq!(
            tree("a[$i]=x"),
            r#"(VarAssign (LeftIndex (VarSub a) (VarSub i)) (Word {[Lit <Lit_Chars "x">]}) Global flags=[])"#
        );
    }

    #[test]
    fn test_command_seq_preserves_order() {
        let parsed = parse("echo 1; echo 2\necho 3\n\necho 4").unwrap();
        let cmd = parsed.command.unwrap();
        match &cmd {
            Command::CommandSeq(seq) => assert_eq!(seq.children.len(), 4),
            other => panic!("expected CommandSeq, got {:?}", other),
        }

        struct Args(Vec<String>);
        impl Visitor for Args {
            fn visit_command(&mut self, cmd: &Command) {
                if let Command::SimpleCommand(simple) = cmd {
                    if let Some(text) = simple.words.get(1).and_then(|w| w.static_text()) {
                        self.0.push(text);
                    }
                }
                walk_command(self, cmd);
            }
        }
        let mut args = Args(vec![]);
        args.visit_command(&cmd);
        assert_eq!(args.0, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_brace_group_is_always_a_seq() {
        assert_eq!(
            tree("{ echo a; }"),
            "(CommandSeq\n  (SimpleCommand {[Lit <Lit_Chars \"echo\">]} {[Lit <Lit_Chars \"a\">]}))"
        );
        assert!(err("{ }").contains("no children"));
    }

    #[test]
    fn test_subshell_becomes_fork() {
        let out = tree("( a; b )");
        assert!(out.starts_with("(Fork\n  (CommandSeq\n"));
        assert_eq!(tree("(a)"), "(Fork\n  (SimpleCommand {[Lit <Lit_Chars \"a\">]}))");
    }

    #[test]
    fn test_assignments_without_command() {
        assert_eq!(
            tree("x=1 y=$z"),
            "(CommandSeq\n  (VarAssign (LeftVar x) (IntLiteral 1) Global flags=[])\n  (VarAssign (LeftVar y) (VarSub z) Global flags=[]))"
        );
        assert_eq!(tree("x="), "(VarAssign (LeftVar x) (Word {}) Global flags=[])");
    }

    #[test]
    fn test_env_prefix_becomes_env_pair() {
        assert_eq!(
            tree("FOO=bar env"),
            r#"(SimpleCommand (EnvPair FOO {[Lit <Lit_Chars "bar">]}) {[Lit <Lit_Chars "env">]})"#
        );
        assert!(err("a[1]=x cmd").contains("environment"));
    }

    #[test]
    fn test_declaration_builtins() {
        assert_eq!(tree("export A=1"), "(VarAssign (LeftVar A) (IntLiteral 1) Global flags=[Export])");
        assert_eq!(tree("readonly A=1"), "(VarAssign (LeftVar A) (IntLiteral 1) Global flags=[ReadOnly])");
        assert_eq!(
            tree("declare -g -xr A=1"),
            "(VarAssign (LeftVar A) (IntLiteral 1) Global flags=[Export ReadOnly])"
        );
        assert_eq!(tree("local -x A=1"), "(VarAssign (LeftVar A) (IntLiteral 1) Local flags=[Export])");
        // not every operand is an assignment, or an unknown flag
        assert!(tree("export A").starts_with("(SimpleCommand"));
        assert!(tree("local -a arr=1").starts_with("(SimpleCommand"));
        assert!(tree("local -g x=1").starts_with("(SimpleCommand"));
    }

    #[test]
    fn test_redirections() {
        assert_eq!(
            tree("cmd 2>err <in"),
            r#"(SimpleCommand {[Lit <Lit_Chars "cmd">]} (Redirect > 2 {[Lit <Lit_Chars "err">]}) (Redirect < 0 {[Lit <Lit_Chars "in">]}))"#
        );
        assert!(tree(">out").starts_with("(SimpleCommand (Redirect > 1"));
        assert!(err("cmd >").contains("redirection target"));
    }

    #[test]
    fn test_heredoc_is_filled_before_use() {
        let parsed = parse("cat <<EOF\nhi $x\nEOF\necho after\n").unwrap();
        let cmd = parsed.command.unwrap();
        let seq = match &cmd {
            Command::CommandSeq(seq) => seq,
            other => panic!("expected CommandSeq, got {:?}", other),
        };
        let doc = match &seq.children[0] {
            Command::SimpleCommand(simple) => match &simple.redirects[0] {
                Redir::HereDoc(doc) => doc.clone(),
                other => panic!("expected HereDoc, got {:?}", other),
            },
            other => panic!("expected SimpleCommand, got {:?}", other),
        };
        assert!(doc.was_filled());
        assert!(doc.do_expansion());
        assert_eq!(doc.delimiter(), "EOF");
        assert_eq!(doc.body().unwrap().parts.len(), 3);
    }

    #[test]
    fn test_heredoc_without_body_is_an_error() {
        assert!(err("cat <<EOF").contains("no body"));
        assert!(err("cat <<EOF\nunterminated\n").contains("wanted 'EOF'"));
    }

    #[test]
    fn test_every_var_sub_has_a_resolvable_span() {
        let parsed = parse("echo $a \"$b\" ${c}\nx=$d\n(\n  echo $e\n)").unwrap();
        let subs = var_subs(&parsed.command.unwrap());
        assert_eq!(subs.len(), 5);
        for vs in subs {
            assert!(parsed.arena.resolves(vs.span_id));
            assert!(parsed.arena.snippet(vs.span_id).unwrap().starts_with('$'));
        }
    }

    #[test]
    fn test_stack_location_same_line_is_omitted() {
        let parsed = parse("( echo $x )").unwrap();
        let subs = var_subs(&parsed.command.unwrap());
        assert_eq!(subs[0].stack_span_id, None);
    }

    #[test]
    fn test_stack_location_other_line_is_kept() {
        let parsed = parse("(\n  echo $y\n)").unwrap();
        let subs = var_subs(&parsed.command.unwrap());
        let stack = subs[0].stack_span_id.expect("stack location");
        let loc = parsed.arena.location(stack).unwrap();
        assert_eq!((loc.line, loc.col), (1, 0));
        assert_eq!(parsed.arena.location(subs[0].span_id).unwrap().line, 2);
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(err("a | b").contains("pipelines"));
        assert!(err("a && b").contains("'&&' lists"));
        assert!(err("a &").contains("background"));
        assert!(err("if true; then a; fi").contains("'if'"));
        assert!(err("f() { a; }").contains("function definitions"));
        assert!(err("echo $(ls)").contains("command substitution"));
        assert!(err("{ a; } >f").contains("redirections on a brace group"));
        assert!(err("((x))").contains("arithmetic"));
    }

    #[test]
    fn test_error_position() {
        let e = parse("echo ok\necho 'open").unwrap_err();
        assert_eq!((e.line, e.column), (2, 6));
    }

    #[test]
    fn test_max_depth() {
        let options = ParseOptions {
            max_depth: 2,
            ..ParseOptions::default()
        };
        assert!(parse_with_options("( ( a ) )", options.clone()).is_ok());
        let e = parse_with_options("( ( ( a ) ) )", options).unwrap_err();
        assert!(e.message.contains("Nesting deeper"));
    }

    #[test]
    fn test_max_input_size() {
        let options = ParseOptions {
            max_input_size: 4,
            ..ParseOptions::default()
        };
        assert!(parse_with_options("echo hello", options).is_err());
    }

    #[test]
    fn test_reserialized_tree_parses_back() {
        let sources = [
            "echo \"a$x b\" 'c d' e\\ f",
            "local y[0]=1",
            "x=1; export A=$x; readonly B=\"q\"; declare -g -x -r C=2.5",
            "{ a; ( b; c ) }",
            "FOO=1 BAR= cmd 2>err",
            "cat <<EOF >out\nhello $name \\$HOME\nEOF\necho done",
            "cat <<'EOF'\nraw $x\nEOF",
        ];
        for src in sources {
            let first = parse(src).unwrap().command.unwrap();
            let shell = to_shell(&first);
            let second = parse(&shell)
                .unwrap_or_else(|e| panic!("{:?} reserialized as {:?}: {}", src, shell, e))
                .command
                .unwrap();
            assert_eq!(print_tree(&first), print_tree(&second), "{:?}", shell);
        }
    }
}
