//! IR Node Types
//!
//! The closed set of node variants both shell dialects normalize into.
//! Trees are built bottom-up by a front end and are read-only afterwards;
//! every child is owned by exactly one parent.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::{Arena, ErrorLocation, SpanId};

// =============================================================================
// TOKENS
// =============================================================================

/// Token kinds that can appear inside IR nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    LitChars,
    LitEscapedChar, // \x, value keeps the backslash
    LitDigits,
    LitFloat,
    LitName,

    // Substitutions
    VSubName,    // $name
    VSubNumber,  // $1
    VSubSpecial, // $@ $? ...
}

/// Coarse classification of a [`TokenKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Lit,
    VSub,
}

impl TokenKind {
    pub fn kind(&self) -> Kind {
        match self {
            Self::LitChars | Self::LitEscapedChar | Self::LitDigits | Self::LitFloat | Self::LitName => {
                Kind::Lit
            }
            Self::VSubName | Self::VSubNumber | Self::VSubSpecial => Kind::VSub,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LitChars => "Lit_Chars",
            Self::LitEscapedChar => "Lit_EscapedChar",
            Self::LitDigits => "Lit_Digits",
            Self::LitFloat => "Lit_Float",
            Self::LitName => "Lit_Name",
            Self::VSubName => "VSub_Name",
            Self::VSubNumber => "VSub_Number",
            Self::VSubSpecial => "VSub_Special",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexical atom. `span_id` is absent only for synthesized tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub val: String,
    pub span_id: Option<SpanId>,
}

impl Token {
    pub fn is_literal(&self) -> bool {
        self.kind.kind() == Kind::Lit
    }

    /// The text this token contributes after quote removal.
    pub fn literal_text(&self) -> &str {
        match self.kind {
            TokenKind::LitEscapedChar => self.val.strip_prefix('\\').unwrap_or(&self.val),
            _ => &self.val,
        }
    }
}

// =============================================================================
// VARIABLE REFERENCES
// =============================================================================

/// Shell-maintained variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialVar {
    At,     // $@
    Star,   // $*
    Pound,  // $#
    QMark,  // $?
    Dollar, // $$
    Bang,   // $!
    Hyphen, // $-
    Zero,   // $0
    /// Positional parameter $1, $2, ...
    Arg(u32),
}

impl SpecialVar {
    /// Map the character after `$` to a special variable.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '@' => Some(Self::At),
            '*' => Some(Self::Star),
            '#' => Some(Self::Pound),
            '?' => Some(Self::QMark),
            '$' => Some(Self::Dollar),
            '!' => Some(Self::Bang),
            '-' => Some(Self::Hyphen),
            '0' => Some(Self::Zero),
            d if d.is_ascii_digit() => d.to_digit(10).map(Self::Arg),
            _ => None,
        }
    }
}

impl fmt::Display for SpecialVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At => write!(f, "@"),
            Self::Star => write!(f, "*"),
            Self::Pound => write!(f, "#"),
            Self::QMark => write!(f, "?"),
            Self::Dollar => write!(f, "$"),
            Self::Bang => write!(f, "!"),
            Self::Hyphen => write!(f, "-"),
            Self::Zero => write!(f, "0"),
            Self::Arg(n) => write!(f, "{}", n),
        }
    }
}

/// A read reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Var {
    SystemVar(SpecialVar),
    UserVar(String),
}

impl Var {
    pub fn name(&self) -> String {
        match self {
            Var::SystemVar(v) => v.to_string(),
            Var::UserVar(name) => name.clone(),
        }
    }
}

/// A substitution site. Shared by [`WordPart::VarSub`] and [`Expr::VarSub`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSub {
    pub var: Var,
    pub span_id: SpanId,
    /// Enclosing compound construct, never on the same line as `span_id`
    pub stack_span_id: Option<SpanId>,
}

impl VarSub {
    pub fn error_location(&self) -> ErrorLocation {
        match self.stack_span_id {
            Some(stack) => ErrorLocation::from_parts(self.span_id, Some(stack)),
            None => ErrorLocation::at(self.span_id),
        }
    }

    /// Location for a failure at this site when the consumer knows of an
    /// enclosing frame (e.g. a function call). The construct recorded at
    /// parse time is closer, so it wins.
    pub fn error_location_in(&self, arena: &Arena, frame: Option<SpanId>) -> ErrorLocation {
        ErrorLocation::new(arena, self.span_id, self.stack_span_id.or(frame))
    }
}

// =============================================================================
// WORDS
// =============================================================================

/// A quoting-sensitive fragment of a word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WordPart {
    /// Unquoted literal run
    Literal(Token),
    /// '...' - literal tokens only, never expanded
    SingleQuoted(SingleQuotedPart),
    /// "..." - expansion-eligible
    DoubleQuoted(DoubleQuotedPart),
    /// $name, ${name}, $1, $@ ...
    VarSub(VarSub),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleQuotedPart {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleQuotedPart {
    pub parts: Vec<WordPart>,
}

/// One shell argument before expansion. Part order is evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// The first span found in the word, used to attribute errors to it.
    pub fn first_span(&self) -> Option<SpanId> {
        fn part_span(part: &WordPart) -> Option<SpanId> {
            match part {
                WordPart::Literal(t) => t.span_id,
                WordPart::SingleQuoted(sq) => sq.tokens.iter().find_map(|t| t.span_id),
                WordPart::DoubleQuoted(dq) => dq.parts.iter().find_map(part_span),
                WordPart::VarSub(vs) => Some(vs.span_id),
            }
        }
        self.parts.iter().find_map(part_span)
    }

    /// The word's text when it contains no substitutions.
    pub fn static_text(&self) -> Option<String> {
        fn push(part: &WordPart, out: &mut String) -> bool {
            match part {
                WordPart::Literal(t) => {
                    out.push_str(t.literal_text());
                    true
                }
                WordPart::SingleQuoted(sq) => {
                    for t in &sq.tokens {
                        out.push_str(&t.val);
                    }
                    true
                }
                WordPart::DoubleQuoted(dq) => dq.parts.iter().all(|p| push(p, out)),
                WordPart::VarSub(_) => false,
            }
        }
        let mut out = String::new();
        if self.parts.iter().all(|p| push(p, &mut out)) {
            Some(out)
        } else {
            None
        }
    }
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedirOp {
    Less,      // <
    Great,     // >
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    TLess,     // <<<
    DLess,     // <<
    DLessDash, // <<-
}

impl RedirOp {
    pub fn is_here_doc(&self) -> bool {
        matches!(self, Self::DLess | Self::DLessDash)
    }

    /// File descriptor used when none is written before the operator.
    pub fn default_fd(&self) -> u32 {
        match self {
            Self::Less | Self::LessAnd | Self::LessGreat | Self::TLess | Self::DLess | Self::DLessDash => 0,
            Self::Great | Self::DGreat | Self::GreatAnd | Self::Clobber => 1,
        }
    }
}

impl fmt::Display for RedirOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Less => write!(f, "<"),
            Self::Great => write!(f, ">"),
            Self::DGreat => write!(f, ">>"),
            Self::LessAnd => write!(f, "<&"),
            Self::GreatAnd => write!(f, ">&"),
            Self::LessGreat => write!(f, "<>"),
            Self::Clobber => write!(f, ">|"),
            Self::TLess => write!(f, "<<<"),
            Self::DLess => write!(f, "<<"),
            Self::DLessDash => write!(f, "<<-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Redir {
    Redirect(Redirect),
    HereDoc(HereDoc),
}

impl Redir {
    pub fn op(&self) -> RedirOp {
        match self {
            Redir::Redirect(r) => r.op,
            Redir::HereDoc(h) => h.op(),
        }
    }

    pub fn fd(&self) -> u32 {
        match self {
            Redir::Redirect(r) => r.fd,
            Redir::HereDoc(h) => h.fd(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub op: RedirOp,
    pub op_span_id: Option<SpanId>,
    pub target: Word,
    pub fd: u32,
}

/// A here-document redirection.
///
/// Construction is two-phase: [`HereDoc::declare`] yields the declared
/// value when the operator is parsed, and [`HereDoc::fill`] consumes it
/// once the body has been read. Fields are private so the body and the
/// filled flag cannot drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HereDocFields")]
pub struct HereDoc {
    op: RedirOp,
    op_span_id: Option<SpanId>,
    body: Option<Word>,
    fd: u32,
    do_expansion: bool,
    delimiter: String,
    was_filled: bool,
}

/// Wire form of [`HereDoc`]. Deserialization goes through
/// `TryFrom<HereDocFields>` so a decoded value obeys the same rules as one
/// built with `declare` and `fill`.
#[doc(hidden)]
#[derive(Deserialize)]
pub struct HereDocFields {
    pub op: RedirOp,
    pub op_span_id: Option<SpanId>,
    pub body: Option<Word>,
    pub fd: u32,
    pub do_expansion: bool,
    pub delimiter: String,
    pub was_filled: bool,
}

impl HereDoc {
    pub(crate) fn declared(
        op: RedirOp,
        op_span_id: Option<SpanId>,
        fd: u32,
        do_expansion: bool,
        delimiter: String,
    ) -> Self {
        Self {
            op,
            op_span_id,
            body: None,
            fd,
            do_expansion,
            delimiter,
            was_filled: false,
        }
    }

    pub(crate) fn with_body(self, body: Word) -> Self {
        Self {
            body: Some(body),
            was_filled: true,
            ..self
        }
    }

    pub fn op(&self) -> RedirOp {
        self.op
    }

    pub fn op_span_id(&self) -> Option<SpanId> {
        self.op_span_id
    }

    pub fn fd(&self) -> u32 {
        self.fd
    }

    pub fn do_expansion(&self) -> bool {
        self.do_expansion
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn was_filled(&self) -> bool {
        self.was_filled
    }

    /// The body, or `None` while still declared. Consumers should use
    /// [`HereDoc::body`], which fails instead.
    pub fn body_if_filled(&self) -> Option<&Word> {
        self.body.as_ref()
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    SingleQuotedLiteral(Token),
    DoubleQuotedLiteral(Token),
    IntLiteral(IntLiteral),
    FloatLiteral(FloatLiteral),
    VarSub(VarSub),
    /// A word that is not a single literal or substitution, e.g. `a$b`
    Word(Word),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntLiteral {
    pub value: i64,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatLiteral {
    pub value: f64,
    pub token: Token,
}

impl Expr {
    pub fn span_id(&self) -> Option<SpanId> {
        match self {
            Expr::SingleQuotedLiteral(t) | Expr::DoubleQuotedLiteral(t) => t.span_id,
            Expr::IntLiteral(lit) => lit.token.span_id,
            Expr::FloatLiteral(lit) => lit.token.span_id,
            Expr::VarSub(vs) => Some(vs.span_id),
            Expr::Word(w) => w.first_span(),
        }
    }
}

// =============================================================================
// ASSIGNMENT TARGETS & METADATA
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LValue {
    LeftVar(LeftVar),
    LeftIndex(LeftIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeftVar {
    pub name: String,
    pub span_id: Option<SpanId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeftIndex {
    pub obj: Box<Expr>,
    pub index: Box<Expr>,
    /// Span of the `[` operator
    pub span_id: Option<SpanId>,
}

impl LValue {
    pub fn span_id(&self) -> Option<SpanId> {
        match self {
            LValue::LeftVar(v) => v.span_id,
            LValue::LeftIndex(ix) => ix.span_id.or_else(|| ix.obj.span_id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignScope {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssignFlag {
    Export,
    ReadOnly,
}

/// Zero or more [`AssignFlag`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignFlags(BTreeSet<AssignFlag>);

impl AssignFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: AssignFlag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: AssignFlag) {
        self.0.insert(flag);
    }

    pub fn contains(&self, flag: AssignFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AssignFlag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<AssignFlag> for AssignFlags {
    fn from_iter<I: IntoIterator<Item = AssignFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Mutability of a declaration in the expression dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclMode {
    Var,
    Const,
}

// =============================================================================
// COMMANDS
// =============================================================================

/// The five executable variants every dialect construct normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    SimpleCommand(SimpleCommand),
    VarDecl(VarDecl),
    VarAssign(VarAssign),
    /// Universal block: brace groups, do-groups, command lists
    CommandSeq(CommandSeq),
    /// Universal subshell
    Fork(Fork),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCommand {
    pub words: Vec<Word>,
    pub redirects: Vec<Redir>,
    pub more_env: Vec<EnvPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub mode: DeclMode,
    pub name: String,
    pub name_span_id: Option<SpanId>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarAssign {
    pub lhs: LValue,
    pub rhs: Expr,
    pub scope: AssignScope,
    pub flags: AssignFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSeq {
    pub children: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fork {
    pub child: Box<Command>,
    /// Span of the construct that opened the subshell
    pub span_id: Option<SpanId>,
}

/// Per-command environment override: `NAME=value cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvPair {
    pub name: String,
    pub value: Word,
    pub span_id: Option<SpanId>,
}

impl Command {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Command::SimpleCommand(_) => "SimpleCommand",
            Command::VarDecl(_) => "VarDecl",
            Command::VarAssign(_) => "VarAssign",
            Command::CommandSeq(_) => "CommandSeq",
            Command::Fork(_) => "Fork",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(val: &str) -> Token {
        Token {
            kind: TokenKind::LitChars,
            val: val.to_string(),
            span_id: None,
        }
    }

    #[test]
    fn test_token_kind_classification() {
        assert_eq!(TokenKind::LitDigits.kind(), Kind::Lit);
        assert_eq!(TokenKind::VSubSpecial.kind(), Kind::VSub);
        assert_eq!(TokenKind::LitEscapedChar.to_string(), "Lit_EscapedChar");
    }

    #[test]
    fn test_escaped_char_literal_text() {
        let t = Token {
            kind: TokenKind::LitEscapedChar,
            val: "\\$".to_string(),
            span_id: None,
        };
        assert_eq!(t.literal_text(), "$");
        assert_eq!(lit("abc").literal_text(), "abc");
    }

    #[test]
    fn test_special_var_from_char() {
        assert_eq!(SpecialVar::from_char('@'), Some(SpecialVar::At));
        assert_eq!(SpecialVar::from_char('3'), Some(SpecialVar::Arg(3)));
        assert_eq!(SpecialVar::from_char('0'), Some(SpecialVar::Zero));
        assert_eq!(SpecialVar::from_char('x'), None);
        assert_eq!(Var::SystemVar(SpecialVar::QMark).name(), "?");
    }

    #[test]
    fn test_word_static_text() {
        let word = Word {
            parts: vec![
                WordPart::Literal(lit("a")),
                WordPart::SingleQuoted(SingleQuotedPart { tokens: vec![lit("b c")] }),
                WordPart::DoubleQuoted(DoubleQuotedPart { parts: vec![WordPart::Literal(lit("d"))] }),
            ],
        };
        assert_eq!(word.static_text().as_deref(), Some("ab cd"));

        let dynamic = Word {
            parts: vec![WordPart::VarSub(VarSub {
                var: Var::UserVar("x".to_string()),
                span_id: SpanId(0),
                stack_span_id: None,
            })],
        };
        assert_eq!(dynamic.static_text(), None);
        assert_eq!(dynamic.first_span(), Some(SpanId(0)));
    }

    #[test]
    fn test_assign_flags_are_a_set() {
        let flags = AssignFlags::new()
            .with(AssignFlag::Export)
            .with(AssignFlag::Export)
            .with(AssignFlag::ReadOnly);
        assert_eq!(flags.iter().count(), 2);
        assert!(flags.contains(AssignFlag::ReadOnly));
        assert!(AssignFlags::new().is_empty());
    }

    #[test]
    fn test_redir_op_defaults() {
        assert!(RedirOp::DLessDash.is_here_doc());
        assert!(!RedirOp::TLess.is_here_doc());
        assert_eq!(RedirOp::Great.default_fd(), 1);
        assert_eq!(RedirOp::DLess.default_fd(), 0);
        assert_eq!(RedirOp::Clobber.to_string(), ">|");
    }
}
