//! IR factory.
//!
//! Front ends build trees through [`IR`] instead of struct literals. The
//! constructors that can receive inconsistent input return `Result` and
//! reject it at construction time.

use super::types::*;
use super::validate::{check_literal_token, check_name, check_single_quoted_token, IrError};
use crate::source::{Arena, SpanId};

/// Factory for IR nodes.
pub struct IR;

impl IR {
    // -------------------------------------------------------------------------
    // Lexical & word layer
    // -------------------------------------------------------------------------

    pub fn token(kind: TokenKind, val: impl Into<String>, span_id: Option<SpanId>) -> Token {
        Token {
            kind,
            val: val.into(),
            span_id,
        }
    }

    /// Unquoted literal run.
    pub fn literal(val: impl Into<String>, span_id: Option<SpanId>) -> WordPart {
        WordPart::Literal(Self::token(TokenKind::LitChars, val, span_id))
    }

    pub fn single_quoted(tokens: Vec<Token>) -> Result<WordPart, IrError> {
        for token in &tokens {
            check_single_quoted_token(token)?;
        }
        Ok(WordPart::SingleQuoted(SingleQuotedPart { tokens }))
    }

    pub fn double_quoted(parts: Vec<WordPart>) -> Result<WordPart, IrError> {
        if parts.iter().any(|p| matches!(p, WordPart::DoubleQuoted(_))) {
            return Err(IrError::NestedDoubleQuote);
        }
        Ok(WordPart::DoubleQuoted(DoubleQuotedPart { parts }))
    }

    pub fn word(parts: Vec<WordPart>) -> Word {
        Word { parts }
    }

    // -------------------------------------------------------------------------
    // Reference layer
    // -------------------------------------------------------------------------

    pub fn user_var(name: impl Into<String>) -> Result<Var, IrError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Var::UserVar(name))
    }

    pub fn system_var(var: SpecialVar) -> Var {
        Var::SystemVar(var)
    }

    /// A substitution site. `enclosing` is the span of the innermost compound
    /// construct around it; it is kept only when it lies on another line.
    pub fn var_sub(arena: &Arena, var: Var, span_id: SpanId, enclosing: Option<SpanId>) -> VarSub {
        let stack_span_id = enclosing.filter(|outer| !arena.same_line(span_id, *outer));
        VarSub {
            var,
            span_id,
            stack_span_id,
        }
    }

    pub fn left_var(name: impl Into<String>, span_id: Option<SpanId>) -> Result<LValue, IrError> {
        let name = name.into();
        check_name(&name)?;
        Ok(LValue::LeftVar(LeftVar { name, span_id }))
    }

    /// `obj[index]`. Both operands are required, so partial indexing cannot
    /// be expressed.
    pub fn left_index(obj: Expr, index: Expr, span_id: Option<SpanId>) -> LValue {
        LValue::LeftIndex(LeftIndex {
            obj: Box::new(obj),
            index: Box::new(index),
            span_id,
        })
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    pub fn single_quoted_literal(token: Token) -> Result<Expr, IrError> {
        check_literal_token(&token)?;
        Ok(Expr::SingleQuotedLiteral(token))
    }

    pub fn double_quoted_literal(token: Token) -> Result<Expr, IrError> {
        check_literal_token(&token)?;
        Ok(Expr::DoubleQuotedLiteral(token))
    }

    pub fn int_literal(token: Token) -> Result<Expr, IrError> {
        let value = token.val.parse::<i64>().map_err(|_| IrError::InvalidLiteral {
            kind: "integer",
            text: token.val.clone(),
        })?;
        Ok(Expr::IntLiteral(IntLiteral { value, token }))
    }

    pub fn float_literal(token: Token) -> Result<Expr, IrError> {
        let value = token
            .val
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| IrError::InvalidLiteral {
                kind: "float",
                text: token.val.clone(),
            })?;
        Ok(Expr::FloatLiteral(FloatLiteral { value, token }))
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    pub fn simple_command(
        words: Vec<Word>,
        redirects: Vec<Redir>,
        more_env: Vec<EnvPair>,
    ) -> Result<Command, IrError> {
        if words.is_empty() && redirects.is_empty() && more_env.is_empty() {
            return Err(IrError::EmptySimpleCommand);
        }
        for redir in &redirects {
            if let Redir::HereDoc(doc) = redir {
                if !doc.was_filled() {
                    return Err(IrError::UnfilledHereDoc {
                        delimiter: doc.delimiter().to_string(),
                    });
                }
            }
        }
        Ok(Command::SimpleCommand(SimpleCommand {
            words,
            redirects,
            more_env,
        }))
    }

    pub fn var_decl(
        mode: DeclMode,
        name: impl Into<String>,
        name_span_id: Option<SpanId>,
        value: Expr,
    ) -> Result<Command, IrError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Command::VarDecl(VarDecl {
            mode,
            name,
            name_span_id,
            value,
        }))
    }

    pub fn var_assign(lhs: LValue, rhs: Expr, scope: AssignScope, flags: AssignFlags) -> Command {
        Command::VarAssign(VarAssign { lhs, rhs, scope, flags })
    }

    pub fn command_seq(children: Vec<Command>) -> Result<Command, IrError> {
        if children.is_empty() {
            return Err(IrError::EmptyCommandSeq);
        }
        Ok(Command::CommandSeq(CommandSeq { children }))
    }

    pub fn fork(child: Command, span_id: Option<SpanId>) -> Command {
        Command::Fork(Fork {
            child: Box::new(child),
            span_id,
        })
    }

    pub fn env_pair(name: impl Into<String>, value: Word, span_id: Option<SpanId>) -> Result<EnvPair, IrError> {
        let name = name.into();
        check_name(&name)?;
        Ok(EnvPair { name, value, span_id })
    }

    // -------------------------------------------------------------------------
    // Redirections
    // -------------------------------------------------------------------------

    pub fn redirect(op: RedirOp, op_span_id: Option<SpanId>, target: Word, fd: u32) -> Result<Redir, IrError> {
        if op.is_here_doc() {
            return Err(IrError::InvalidRedirectOperator {
                op,
                expected: "redirect",
            });
        }
        Ok(Redir::Redirect(Redirect {
            op,
            op_span_id,
            target,
            fd,
        }))
    }

    pub fn here_doc(
        op: RedirOp,
        op_span_id: Option<SpanId>,
        fd: u32,
        do_expansion: bool,
        delimiter: impl Into<String>,
    ) -> Result<HereDoc, IrError> {
        HereDoc::declare(op, op_span_id, fd, do_expansion, delimiter)
    }
}

impl TryFrom<HereDocFields> for HereDoc {
    type Error = IrError;

    fn try_from(fields: HereDocFields) -> Result<Self, Self::Error> {
        let doc = HereDoc::declare(fields.op, fields.op_span_id, fields.fd, fields.do_expansion, fields.delimiter)?;
        match (fields.was_filled, fields.body) {
            (true, Some(body)) => doc.fill(body),
            (false, None) => Ok(doc),
            _ => Err(IrError::InconsistentHereDoc {
                delimiter: doc.delimiter().to_string(),
            }),
        }
    }
}

impl HereDoc {
    /// Enter the declared state. The body is attached later with
    /// [`HereDoc::fill`].
    pub fn declare(
        op: RedirOp,
        op_span_id: Option<SpanId>,
        fd: u32,
        do_expansion: bool,
        delimiter: impl Into<String>,
    ) -> Result<HereDoc, IrError> {
        if !op.is_here_doc() {
            return Err(IrError::InvalidRedirectOperator {
                op,
                expected: "here-document",
            });
        }
        Ok(HereDoc::declared(op, op_span_id, fd, do_expansion, delimiter.into()))
    }

    /// Move to the filled state. Consumes the declared value so no copy of
    /// it stays reachable.
    pub fn fill(self, body: Word) -> Result<HereDoc, IrError> {
        if self.was_filled() {
            return Err(IrError::HereDocAlreadyFilled {
                delimiter: self.delimiter().to_string(),
            });
        }
        Ok(self.with_body(body))
    }

    /// The body of a filled here-document.
    pub fn body(&self) -> Result<&Word, IrError> {
        match self.body_if_filled() {
            Some(body) if self.was_filled() => Ok(body),
            _ => Err(IrError::UnfilledHereDoc {
                delimiter: self.delimiter().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vsub_token() -> Token {
        IR::token(TokenKind::VSubName, "$x", None)
    }

    #[test]
    fn test_single_quoted_rejects_expansion() {
        let ok = IR::single_quoted(vec![IR::token(TokenKind::LitChars, "$x", None)]);
        assert!(ok.is_ok());
        let bad = IR::single_quoted(vec![vsub_token()]);
        assert!(matches!(bad, Err(IrError::ExpansionInSingleQuote { .. })));
    }

    #[test]
    fn test_double_quoted_allows_single_quoted_but_not_double() {
        let sq = IR::single_quoted(vec![IR::token(TokenKind::LitChars, "a", None)]).unwrap();
        assert!(IR::double_quoted(vec![sq]).is_ok());

        let dq = IR::double_quoted(vec![]).unwrap();
        assert_eq!(IR::double_quoted(vec![dq]), Err(IrError::NestedDoubleQuote));
    }

    #[test]
    fn test_user_var_requires_name() {
        assert_eq!(IR::user_var(""), Err(IrError::EmptyVarName));
        assert!(matches!(IR::user_var("a b"), Err(IrError::InvalidVariableName { .. })));
        assert_eq!(IR::user_var("ok"), Ok(Var::UserVar("ok".to_string())));
    }

    #[test]
    fn test_var_sub_drops_same_line_stack() {
        let mut arena = Arena::new();
        let first = arena.add_source("t.sh", "( echo $x\n  $y )");
        let open = arena.add_span(first, 0, 1);
        let x = arena.add_span(first, 7, 2);
        let y = arena.add_span(first.offset(1), 2, 2);

        let same = IR::var_sub(&arena, IR::user_var("x").unwrap(), x, Some(open));
        assert_eq!(same.stack_span_id, None);

        let other = IR::var_sub(&arena, IR::user_var("y").unwrap(), y, Some(open));
        assert_eq!(other.stack_span_id, Some(open));
        assert_eq!(other.error_location().stack(), Some(open));
    }

    #[test]
    fn test_literals_parse_values() {
        let int = IR::int_literal(IR::token(TokenKind::LitDigits, "42", None)).unwrap();
        assert!(matches!(int, Expr::IntLiteral(IntLiteral { value: 42, .. })));

        let float = IR::float_literal(IR::token(TokenKind::LitFloat, "1.5", None)).unwrap();
        assert!(matches!(float, Expr::FloatLiteral(ref f) if f.value == 1.5));

        assert!(IR::int_literal(IR::token(TokenKind::LitDigits, "4x", None)).is_err());
        assert!(IR::double_quoted_literal(vsub_token()).is_err());
    }

    #[test]
    fn test_left_index_takes_full_expressions() {
        let mut arena = Arena::new();
        let first = arena.add_source("t.sh", "a[$i]=1");
        let span = arena.add_span(first, 2, 2);
        let index = Expr::VarSub(IR::var_sub(&arena, IR::user_var("i").unwrap(), span, None));
        let obj = IR::single_quoted_literal(IR::token(TokenKind::LitName, "a", None)).unwrap();
        match IR::left_index(obj, index, None) {
            LValue::LeftIndex(ix) => assert!(matches!(*ix.index, Expr::VarSub(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_command_seq_requires_children() {
        assert_eq!(IR::command_seq(vec![]), Err(IrError::EmptyCommandSeq));
        assert_eq!(IR::simple_command(vec![], vec![], vec![]), Err(IrError::EmptySimpleCommand));
    }

    #[test]
    fn test_redirect_operator_families() {
        let target = IR::word(vec![IR::literal("out", None)]);
        assert!(IR::redirect(RedirOp::Great, None, target.clone(), 1).is_ok());
        assert!(matches!(
            IR::redirect(RedirOp::DLess, None, target, 0),
            Err(IrError::InvalidRedirectOperator { .. })
        ));
        assert!(HereDoc::declare(RedirOp::Less, None, 0, true, "EOF").is_err());
    }

    #[test]
    fn test_heredoc_two_phase() {
        let declared = HereDoc::declare(RedirOp::DLess, None, 0, true, "EOF").unwrap();
        assert!(!declared.was_filled());
        assert_eq!(
            declared.body(),
            Err(IrError::UnfilledHereDoc {
                delimiter: "EOF".to_string()
            })
        );

        let body = IR::word(vec![IR::literal("hello\n", None)]);
        let filled = declared.fill(body.clone()).unwrap();
        assert!(filled.was_filled());
        assert_eq!(filled.body(), Ok(&body));

        assert!(matches!(
            filled.fill(body),
            Err(IrError::HereDocAlreadyFilled { .. })
        ));
    }

    #[test]
    fn test_heredoc_deserialization_checks_state() {
        let body = IR::word(vec![IR::literal("hi\n", None)]);
        let filled = HereDoc::declare(RedirOp::DLess, None, 0, true, "EOF")
            .unwrap()
            .fill(body)
            .unwrap();
        let json = serde_json::to_value(&filled).unwrap();
        let decoded: HereDoc = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded, filled);

        let mut claims_unfilled = json.clone();
        claims_unfilled["was_filled"] = serde_json::Value::Bool(false);
        assert!(serde_json::from_value::<HereDoc>(claims_unfilled).is_err());

        let mut missing_body = json.clone();
        missing_body["body"] = serde_json::Value::Null;
        assert!(serde_json::from_value::<HereDoc>(missing_body).is_err());

        let mut wrong_op = json;
        wrong_op["op"] = serde_json::to_value(RedirOp::Less).unwrap();
        assert!(serde_json::from_value::<HereDoc>(wrong_op).is_err());
    }

    #[test]
    fn test_simple_command_rejects_unfilled_heredoc() {
        let doc = IR::here_doc(RedirOp::DLessDash, None, 0, false, "END").unwrap();
        let words = vec![IR::word(vec![IR::literal("cat", None)])];
        let result = IR::simple_command(words, vec![Redir::HereDoc(doc)], vec![]);
        assert!(matches!(result, Err(IrError::UnfilledHereDoc { .. })));
    }
}
