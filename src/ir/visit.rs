//! Read-only tree walking.
//!
//! Implement [`Visitor`] and override the hooks you care about; the default
//! of each hook descends with the matching `walk_*` function. Children are
//! visited in the order they were supplied at construction.

use super::types::*;

pub trait Visitor {
    fn visit_command(&mut self, cmd: &Command) {
        walk_command(self, cmd);
    }

    fn visit_word(&mut self, word: &Word) {
        walk_word(self, word);
    }

    fn visit_word_part(&mut self, part: &WordPart) {
        walk_word_part(self, part);
    }

    fn visit_token(&mut self, _token: &Token) {}

    fn visit_var_sub(&mut self, _var_sub: &VarSub) {}

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_lvalue(&mut self, lhs: &LValue) {
        walk_lvalue(self, lhs);
    }

    fn visit_redir(&mut self, redir: &Redir) {
        walk_redir(self, redir);
    }

    fn visit_env_pair(&mut self, pair: &EnvPair) {
        self.visit_word(&pair.value);
    }
}

pub fn walk_command<V: Visitor + ?Sized>(v: &mut V, cmd: &Command) {
    match cmd {
        Command::SimpleCommand(simple) => {
            for pair in &simple.more_env {
                v.visit_env_pair(pair);
            }
            for word in &simple.words {
                v.visit_word(word);
            }
            for redir in &simple.redirects {
                v.visit_redir(redir);
            }
        }
        Command::VarDecl(decl) => v.visit_expr(&decl.value),
        Command::VarAssign(assign) => {
            v.visit_lvalue(&assign.lhs);
            v.visit_expr(&assign.rhs);
        }
        Command::CommandSeq(seq) => {
            for child in &seq.children {
                v.visit_command(child);
            }
        }
        Command::Fork(fork) => v.visit_command(&fork.child),
    }
}

pub fn walk_word<V: Visitor + ?Sized>(v: &mut V, word: &Word) {
    for part in &word.parts {
        v.visit_word_part(part);
    }
}

pub fn walk_word_part<V: Visitor + ?Sized>(v: &mut V, part: &WordPart) {
    match part {
        WordPart::Literal(token) => v.visit_token(token),
        WordPart::SingleQuoted(sq) => {
            for token in &sq.tokens {
                v.visit_token(token);
            }
        }
        WordPart::DoubleQuoted(dq) => {
            for inner in &dq.parts {
                v.visit_word_part(inner);
            }
        }
        WordPart::VarSub(vs) => v.visit_var_sub(vs),
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::SingleQuotedLiteral(t) | Expr::DoubleQuotedLiteral(t) => v.visit_token(t),
        Expr::IntLiteral(lit) => v.visit_token(&lit.token),
        Expr::FloatLiteral(lit) => v.visit_token(&lit.token),
        Expr::VarSub(vs) => v.visit_var_sub(vs),
        Expr::Word(w) => v.visit_word(w),
    }
}

pub fn walk_lvalue<V: Visitor + ?Sized>(v: &mut V, lhs: &LValue) {
    if let LValue::LeftIndex(ix) = lhs {
        v.visit_expr(&ix.obj);
        v.visit_expr(&ix.index);
    }
}

/// Here-document bodies are only walked once filled.
pub fn walk_redir<V: Visitor + ?Sized>(v: &mut V, redir: &Redir) {
    match redir {
        Redir::Redirect(r) => v.visit_word(&r.target),
        Redir::HereDoc(h) => {
            if let Some(body) = h.body_if_filled() {
                v.visit_word(body);
            }
        }
    }
}
