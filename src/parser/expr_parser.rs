//! Expression Dialect Statements
//!
//! The expression dialect adds statement keywords that map directly onto
//! IR nodes:
//!   var NAME = EXPR          -> VarDecl (Var)
//!   const NAME = EXPR        -> VarDecl (Const)
//!   setvar LVALUE = EXPR     -> VarAssign (Local)
//!   setglobal LVALUE = EXPR  -> VarAssign (Global)
//!   fork { list }            -> Fork
//!
//! Everything else parses as in the POSIX dialect.

use regex_lite::Regex;

use crate::ir::{self, AssignFlags, AssignScope, Command, DeclMode, Expr, LValue, Var, IR};
use crate::parser::lexer::{Token, TokenType};
use crate::parser::parser::Parser;
use crate::parser::types::ParseException;
use crate::parser::word_parser::word_to_expr;

lazy_static::lazy_static! {
    static ref LVALUE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(\[(.+)\])?$").unwrap();
}

impl Parser {
    pub(crate) fn parse_expr_statement(&mut self) -> Result<Command, ParseException> {
        let keyword = self.advance();
        match keyword.value.as_str() {
            "var" | "const" => {
                let mode = if keyword.value == "var" {
                    DeclMode::Var
                } else {
                    DeclMode::Const
                };
                let name = self.expect_operand(&format!("expected a name after '{}'", keyword.value))?;
                if name.quoted || !ir::is_valid_name(&name.value) {
                    return Err(ParseException::with_token(
                        format!("'{}' is not a valid variable name", name.value),
                        &name,
                    ));
                }
                let name_span = self.span_of(&name);
                self.expect_equals()?;
                let value = self.parse_expr_operand()?;
                self.expect_statement_end()?;
                IR::var_decl(mode, name.value.clone(), Some(name_span), value)
                    .map_err(|e| ParseException::from_ir(e, &name))
            }
            "setvar" | "setglobal" => {
                let scope = if keyword.value == "setvar" {
                    AssignScope::Local
                } else {
                    AssignScope::Global
                };
                let target = self.expect_operand(&format!("expected a place after '{}'", keyword.value))?;
                let lhs = self.parse_lvalue_operand(&target)?;
                self.expect_equals()?;
                let value = self.parse_expr_operand()?;
                self.expect_statement_end()?;
                Ok(IR::var_assign(lhs, value, scope, AssignFlags::new()))
            }
            "fork" => {
                if !self.check(&[TokenType::LBrace]) {
                    return Err(self.error("expected '{' after 'fork'"));
                }
                let span = self.span_of(&keyword);
                self.enclosing.push(span);
                let body = self.parse_group()?;
                self.enclosing.pop();
                Ok(IR::fork(body, Some(span)))
            }
            other => Err(ParseException::with_token(format!("unknown statement '{}'", other), &keyword)),
        }
    }

    fn expect_operand(&mut self, message: &str) -> Result<Token, ParseException> {
        self.expect(TokenType::Word, message)
    }

    fn expect_equals(&mut self) -> Result<(), ParseException> {
        let token = self.current();
        if token.token_type == TokenType::Word && !token.quoted && token.value == "=" {
            self.advance();
            Ok(())
        } else {
            Err(ParseException::with_token("expected ' = ' between the place and its value", &token))
        }
    }

    fn expect_statement_end(&self) -> Result<(), ParseException> {
        if self.is_command_end() {
            Ok(())
        } else {
            let token = self.current();
            Err(ParseException::with_token(
                format!("unexpected '{}' after expression", token.value),
                &token,
            ))
        }
    }

    /// A bare name is a variable reference; anything else is a word,
    /// normalized like an assignment right-hand side.
    fn parse_expr_operand(&mut self) -> Result<Expr, ParseException> {
        let token = self.expect_operand("expected an expression")?;
        self.operand_to_expr(&token.value, token.quoted, token.line, token.column)
    }

    fn operand_to_expr(&mut self, text: &str, quoted: bool, line: usize, column: usize) -> Result<Expr, ParseException> {
        if !quoted && ir::is_valid_name(text) {
            let span = self.span_at(line, column, text.chars().count());
            let var = Var::UserVar(text.to_string());
            return Ok(Expr::VarSub(IR::var_sub(&self.arena, var, span, self.innermost_enclosing())));
        }
        Ok(word_to_expr(self.parse_word_at(text, line, column)?))
    }

    fn parse_lvalue_operand(&mut self, token: &Token) -> Result<LValue, ParseException> {
        let caps = match LVALUE.captures(&token.value) {
            Some(caps) if !token.quoted => caps,
            _ => {
                return Err(ParseException::with_token(
                    format!("'{}' is not an assignable place", token.value),
                    token,
                ))
            }
        };
        let name = caps.get(1).map_or("", |m| m.as_str());
        let name_span = self.span_at(token.line, token.column, name.len());

        match caps.get(3) {
            None => IR::left_var(name, Some(name_span)).map_err(|e| ParseException::from_ir(e, token)),
            Some(index) => {
                let var = IR::user_var(name).map_err(|e| ParseException::from_ir(e, token))?;
                let obj = Expr::VarSub(IR::var_sub(&self.arena, var, name_span, self.innermost_enclosing()));
                let index_column = token.column + token.value[..index.start()].chars().count();
                let bracket_span = self.span_at(token.line, index_column - 1, 1);
                let index = self.operand_to_expr(index.as_str(), false, token.line, index_column)?;
                Ok(IR::left_index(obj, index, Some(bracket_span)))
            }
        }
    }
}
