//! IR printers.
//!
//! [`print_tree`] renders a span-free debug tree. Brackets mark the layer a
//! node belongs to: `()` command/expr nodes, `{}` words, `[]` word parts,
//! `<>` tokens. Two trees print the same exactly when they are equal apart
//! from their spans, which is what the tests compare.
//!
//! [`to_shell`] re-serializes a tree into surface syntax that parses back
//! to an equivalent tree.

use std::fmt::Write;

use super::types::*;

// =============================================================================
// DEBUG TREE
// =============================================================================

pub fn print_tree(cmd: &Command) -> String {
    let mut out = String::new();
    tree_command(cmd, 0, &mut out);
    out
}

pub fn print_word(word: &Word) -> String {
    let mut out = String::new();
    tree_word(word, &mut out);
    out
}

pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    tree_expr(expr, &mut out);
    out
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn tree_command(cmd: &Command, depth: usize, out: &mut String) {
    indent(depth, out);
    match cmd {
        Command::SimpleCommand(simple) => {
            out.push_str("(SimpleCommand");
            for pair in &simple.more_env {
                let _ = write!(out, " (EnvPair {} ", pair.name);
                tree_word(&pair.value, out);
                out.push(')');
            }
            for word in &simple.words {
                out.push(' ');
                tree_word(word, out);
            }
            for redir in &simple.redirects {
                out.push(' ');
                tree_redir(redir, out);
            }
            out.push(')');
        }
        Command::VarDecl(decl) => {
            let mode = match decl.mode {
                DeclMode::Var => "Var",
                DeclMode::Const => "Const",
            };
            let _ = write!(out, "(VarDecl {} {} ", mode, decl.name);
            tree_expr(&decl.value, out);
            out.push(')');
        }
        Command::VarAssign(assign) => {
            out.push_str("(VarAssign ");
            tree_lvalue(&assign.lhs, out);
            out.push(' ');
            tree_expr(&assign.rhs, out);
            let scope = match assign.scope {
                AssignScope::Global => "Global",
                AssignScope::Local => "Local",
            };
            let flags: Vec<&str> = assign
                .flags
                .iter()
                .map(|f| match f {
                    AssignFlag::Export => "Export",
                    AssignFlag::ReadOnly => "ReadOnly",
                })
                .collect();
            let _ = write!(out, " {} flags=[{}])", scope, flags.join(" "));
        }
        Command::CommandSeq(seq) => {
            out.push_str("(CommandSeq");
            for child in &seq.children {
                out.push('\n');
                tree_command(child, depth + 1, out);
            }
            out.push(')');
        }
        Command::Fork(fork) => {
            out.push_str("(Fork\n");
            tree_command(&fork.child, depth + 1, out);
            out.push(')');
        }
    }
}

fn tree_token(token: &Token, out: &mut String) {
    let _ = write!(out, "<{} {:?}>", token.kind, token.val);
}

fn tree_word(word: &Word, out: &mut String) {
    out.push('{');
    for (i, part) in word.parts.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        tree_word_part(part, out);
    }
    out.push('}');
}

fn tree_word_part(part: &WordPart, out: &mut String) {
    match part {
        WordPart::Literal(token) => {
            out.push_str("[Lit ");
            tree_token(token, out);
            out.push(']');
        }
        WordPart::SingleQuoted(sq) => {
            out.push_str("[SQ");
            for token in &sq.tokens {
                out.push(' ');
                tree_token(token, out);
            }
            out.push(']');
        }
        WordPart::DoubleQuoted(dq) => {
            out.push_str("[DQ");
            for inner in &dq.parts {
                out.push(' ');
                tree_word_part(inner, out);
            }
            out.push(']');
        }
        WordPart::VarSub(vs) => {
            let _ = write!(out, "[VarSub {}]", vs.var.name());
        }
    }
}

fn tree_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::SingleQuotedLiteral(t) => {
            out.push_str("(SingleQuotedLiteral ");
            tree_token(t, out);
            out.push(')');
        }
        Expr::DoubleQuotedLiteral(t) => {
            out.push_str("(DoubleQuotedLiteral ");
            tree_token(t, out);
            out.push(')');
        }
        Expr::IntLiteral(lit) => {
            let _ = write!(out, "(IntLiteral {})", lit.value);
        }
        Expr::FloatLiteral(lit) => {
            let _ = write!(out, "(FloatLiteral {})", lit.value);
        }
        Expr::VarSub(vs) => {
            let _ = write!(out, "(VarSub {})", vs.var.name());
        }
        Expr::Word(w) => {
            out.push_str("(Word ");
            tree_word(w, out);
            out.push(')');
        }
    }
}

fn tree_lvalue(lhs: &LValue, out: &mut String) {
    match lhs {
        LValue::LeftVar(v) => {
            let _ = write!(out, "(LeftVar {})", v.name);
        }
        LValue::LeftIndex(ix) => {
            out.push_str("(LeftIndex ");
            tree_expr(&ix.obj, out);
            out.push(' ');
            tree_expr(&ix.index, out);
            out.push(')');
        }
    }
}

fn tree_redir(redir: &Redir, out: &mut String) {
    match redir {
        Redir::Redirect(r) => {
            let _ = write!(out, "(Redirect {} {} ", r.op, r.fd);
            tree_word(&r.target, out);
            out.push(')');
        }
        Redir::HereDoc(h) => {
            let expand = if h.do_expansion() { "expand" } else { "literal" };
            let _ = write!(out, "(HereDoc {} {} {} {:?} ", h.op(), h.fd(), expand, h.delimiter());
            match h.body_if_filled() {
                Some(body) => tree_word(body, out),
                None => out.push_str("unfilled"),
            }
            out.push(')');
        }
    }
}

// =============================================================================
// SURFACE SYNTAX
// =============================================================================

/// Characters that must be escaped in an unquoted word.
const UNQUOTED_META: &[char] = &[
    ' ', '\t', ';', '&', '|', '(', ')', '<', '>', '\'', '"', '$', '`', '\\', '{', '}', '#', '*', '?', '[', ']',
];

/// Characters that must be escaped inside double quotes.
const DQUOTED_META: &[char] = &['"', '$', '`', '\\'];

/// Characters that must be escaped in an expanded here-document body.
const HEREDOC_META: &[char] = &['$', '`', '\\'];

pub fn to_shell(cmd: &Command) -> String {
    let mut w = ShellWriter::default();
    w.command(cmd);
    w.out
}

pub fn word_to_shell(word: &Word) -> String {
    let mut out = String::new();
    if word.parts.is_empty() {
        out.push_str("''");
    }
    for part in &word.parts {
        match part {
            WordPart::Literal(t) => match t.kind {
                TokenKind::LitEscapedChar => out.push_str(&t.val),
                // a backslash-newline would be a line continuation
                _ if t.val.contains('\n') => out.push_str(&single_quote(&t.val)),
                _ => escape_into(&t.val, UNQUOTED_META, &mut out),
            },
            WordPart::SingleQuoted(sq) => {
                let text: String = sq.tokens.iter().map(|t| t.val.as_str()).collect();
                out.push_str(&single_quote(&text));
            }
            WordPart::DoubleQuoted(dq) => {
                out.push('"');
                for inner in &dq.parts {
                    dquoted_part(inner, &mut out);
                }
                out.push('"');
            }
            WordPart::VarSub(vs) => var_ref(&vs.var, &mut out),
        }
    }
    out
}

#[derive(Default)]
struct ShellWriter {
    out: String,
    depth: usize,
}

impl ShellWriter {
    /// Write one line, then any here-document bodies it opened.
    fn line(&mut self, text: &str, heredocs: Vec<String>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        for body in heredocs {
            self.out.push_str(&body);
        }
    }

    fn command(&mut self, cmd: &Command) {
        match cmd {
            Command::SimpleCommand(simple) => {
                let mut heredocs = Vec::new();
                let text = simple_to_shell(simple, &mut heredocs);
                self.line(&text, heredocs);
            }
            Command::VarDecl(decl) => {
                let keyword = match decl.mode {
                    DeclMode::Var => "var",
                    DeclMode::Const => "const",
                };
                let text = format!("{} {} = {}", keyword, decl.name, expr_to_shell(&decl.value));
                self.line(&text, vec![]);
            }
            Command::VarAssign(assign) => {
                let text = assign_to_shell(assign);
                self.line(&text, vec![]);
            }
            Command::CommandSeq(seq) => {
                self.line("{", vec![]);
                self.depth += 1;
                for child in &seq.children {
                    self.command(child);
                }
                self.depth -= 1;
                self.line("}", vec![]);
            }
            Command::Fork(fork) => {
                self.line("(", vec![]);
                self.depth += 1;
                match fork.child.as_ref() {
                    // `( a; b )` already reads back as a sequence
                    Command::CommandSeq(seq) if seq.children.len() > 1 => {
                        for child in &seq.children {
                            self.command(child);
                        }
                    }
                    child => self.command(child),
                }
                self.depth -= 1;
                self.line(")", vec![]);
            }
        }
    }
}

fn simple_to_shell(simple: &SimpleCommand, heredocs: &mut Vec<String>) -> String {
    let mut pieces = Vec::new();
    for pair in &simple.more_env {
        pieces.push(format!("{}={}", pair.name, value_to_shell(&pair.value)));
    }
    for word in &simple.words {
        pieces.push(word_to_shell(word));
    }
    for redir in &simple.redirects {
        pieces.push(redir_to_shell(redir, heredocs));
    }
    pieces.join(" ")
}

fn redir_to_shell(redir: &Redir, heredocs: &mut Vec<String>) -> String {
    let fd = |op: RedirOp, fd: u32| {
        if fd == op.default_fd() {
            String::new()
        } else {
            fd.to_string()
        }
    };
    match redir {
        Redir::Redirect(r) => format!("{}{}{}", fd(r.op, r.fd), r.op, word_to_shell(&r.target)),
        Redir::HereDoc(h) => {
            let mut body = match h.body_if_filled() {
                Some(word) => heredoc_body(word, h.do_expansion()),
                None => String::new(),
            };
            if !body.is_empty() && !body.ends_with('\n') {
                body.push('\n');
            }
            body.push_str(h.delimiter());
            body.push('\n');
            heredocs.push(body);
            if h.do_expansion() {
                format!("{}{}{}", fd(h.op(), h.fd()), h.op(), h.delimiter())
            } else {
                format!("{}{}'{}'", fd(h.op(), h.fd()), h.op(), h.delimiter())
            }
        }
    }
}

fn heredoc_body(word: &Word, expand: bool) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Literal(t) if expand && t.kind != TokenKind::LitEscapedChar => {
                escape_into(&t.val, HEREDOC_META, &mut out)
            }
            WordPart::Literal(t) => out.push_str(&t.val),
            WordPart::SingleQuoted(sq) => {
                for t in &sq.tokens {
                    out.push_str(&t.val);
                }
            }
            WordPart::DoubleQuoted(dq) => {
                for inner in &dq.parts {
                    dquoted_part(inner, &mut out);
                }
            }
            WordPart::VarSub(vs) => var_ref(&vs.var, &mut out),
        }
    }
    out
}

fn escape_into(text: &str, meta: &[char], out: &mut String) {
    for c in text.chars() {
        if meta.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn var_ref(var: &Var, out: &mut String) {
    let _ = write!(out, "${{{}}}", var.name());
}

fn single_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

fn dquoted_part(part: &WordPart, out: &mut String) {
    match part {
        WordPart::Literal(t) if t.kind == TokenKind::LitEscapedChar => out.push_str(&t.val),
        WordPart::Literal(t) => escape_into(&t.val, DQUOTED_META, out),
        WordPart::SingleQuoted(sq) => {
            for t in &sq.tokens {
                escape_into(&t.val, DQUOTED_META, out);
            }
        }
        // Rejected by construction; flatten if one slips through.
        WordPart::DoubleQuoted(dq) => {
            for inner in &dq.parts {
                dquoted_part(inner, out);
            }
        }
        WordPart::VarSub(vs) => var_ref(&vs.var, out),
    }
}

pub fn expr_to_shell(expr: &Expr) -> String {
    match expr {
        Expr::SingleQuotedLiteral(t) => single_quote(&t.val),
        Expr::DoubleQuotedLiteral(t) => {
            let mut out = String::from("\"");
            escape_into(&t.val, DQUOTED_META, &mut out);
            out.push('"');
            out
        }
        Expr::IntLiteral(lit) => lit.token.val.clone(),
        Expr::FloatLiteral(lit) => lit.token.val.clone(),
        Expr::VarSub(vs) => {
            let mut out = String::new();
            var_ref(&vs.var, &mut out);
            out
        }
        Expr::Word(w) => value_to_shell(w),
    }
}

/// Right-hand sides may be empty, unlike arguments.
fn value_to_shell(word: &Word) -> String {
    if word.parts.is_empty() {
        String::new()
    } else {
        word_to_shell(word)
    }
}

fn lvalue_to_shell(lhs: &LValue) -> String {
    match lhs {
        LValue::LeftVar(v) => v.name.clone(),
        LValue::LeftIndex(ix) => {
            let obj = match ix.obj.as_ref() {
                Expr::VarSub(vs) => vs.var.name(),
                Expr::SingleQuotedLiteral(t) | Expr::DoubleQuotedLiteral(t) => t.val.clone(),
                other => expr_to_shell(other),
            };
            format!("{}[{}]", obj, expr_to_shell(&ix.index))
        }
    }
}

fn assign_to_shell(assign: &VarAssign) -> String {
    let export = assign.flags.contains(AssignFlag::Export);
    let readonly = assign.flags.contains(AssignFlag::ReadOnly);
    let prefix = match (assign.scope, export, readonly) {
        (AssignScope::Global, false, false) => "",
        (AssignScope::Global, true, false) => "export ",
        (AssignScope::Global, false, true) => "readonly ",
        (AssignScope::Global, true, true) => "declare -g -x -r ",
        (AssignScope::Local, false, false) => "local ",
        (AssignScope::Local, true, false) => "local -x ",
        (AssignScope::Local, false, true) => "local -r ",
        (AssignScope::Local, true, true) => "local -x -r ",
    };
    format!("{}{}={}", prefix, lvalue_to_shell(&assign.lhs), expr_to_shell(&assign.rhs))
}
