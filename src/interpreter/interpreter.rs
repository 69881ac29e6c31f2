//! Dry-run Interpreter
//!
//! Walks a validated tree against an [`Environment`]. Words are expanded
//! in part order with no splitting or globbing. `echo`, `true` and `false`
//! run in-process with captured output; any other command is recorded as
//! an [`Invocation`] instead of being executed.
//!
//! Runtime failures carry an [`ErrorLocation`]: the fail span is the node
//! that caused the error, and the stack span is the innermost enclosing
//! construct (a subshell recorded at parse time, else the active call
//! site), dropped when it shares the fail span's line.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::diagnostics::RuntimeError;
use crate::interpreter::env::{Environment, Variable};
use crate::interpreter::errors::EvalError;
use crate::interpreter::types::{Invocation, InterpreterOptions, ResolvedRedirect, Value};
use crate::ir::{
    self, AssignFlag, AssignScope, Command, DeclMode, Expr, Fork, IrError, LValue, Redir, SimpleCommand, SpecialVar,
    VarAssign, VarDecl, VarSub, Var, Word, WordPart,
};
use crate::source::{Arena, ErrorLocation, SpanId};

/// An active function call.
#[derive(Debug, Clone)]
struct Frame {
    args: Vec<String>,
    /// Span of the word that named the function
    call_site: Option<SpanId>,
}

pub struct Interpreter<'a> {
    arena: &'a Arena,
    options: InterpreterOptions,
    env: Environment,
    functions: IndexMap<String, Command>,
    frames: Vec<Frame>,
    /// Top-level positional parameters
    positional: Vec<String>,
    stdout: String,
    invocations: Vec<Invocation>,
    last_status: i32,
}

impl<'a> Interpreter<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        Self::with_options(arena, InterpreterOptions::default())
    }

    pub fn with_options(arena: &'a Arena, options: InterpreterOptions) -> Self {
        Interpreter {
            arena,
            options,
            env: Environment::new(),
            functions: IndexMap::new(),
            frames: Vec::new(),
            positional: Vec::new(),
            stdout: String::new(),
            invocations: Vec::new(),
            last_status: 0,
        }
    }

    /// Register `body` as a function. The body is validated up front so a
    /// defective tree fails here rather than at its first call.
    pub fn define_function(&mut self, name: impl Into<String>, body: Command) -> Result<(), IrError> {
        let name = name.into();
        if !ir::is_valid_name(&name) {
            return Err(IrError::InvalidVariableName { name });
        }
        ir::validate_command(&body, self.arena)?;
        debug!(function = %name, "defined function");
        self.functions.insert(name, body);
        Ok(())
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Validate, then execute.
    pub fn run(&mut self, cmd: &Command) -> Result<i32, EvalError> {
        ir::validate_command(cmd, self.arena)?;
        self.execute(cmd)
    }

    pub fn execute(&mut self, cmd: &Command) -> Result<i32, EvalError> {
        trace!(node = cmd.variant_name(), "execute");
        let status = match cmd {
            Command::SimpleCommand(simple) => self.execute_simple(simple)?,
            Command::VarDecl(decl) => {
                self.execute_decl(decl)?;
                0
            }
            Command::VarAssign(assign) => {
                self.execute_assign(assign)?;
                0
            }
            Command::CommandSeq(seq) => {
                let mut status = 0;
                for child in &seq.children {
                    status = self.execute(child)?;
                }
                status
            }
            Command::Fork(fork) => self.execute_fork(fork)?,
        };
        self.last_status = status;
        Ok(status)
    }

    // =========================================================================
    // LOCATIONS
    // =========================================================================

    fn call_site(&self) -> Option<SpanId> {
        self.frames.last().and_then(|f| f.call_site)
    }

    /// Location of a failure at `span`, with the active call site as stack.
    fn locate(&self, span: Option<SpanId>) -> ErrorLocation {
        match span {
            Some(fail) => ErrorLocation::new(self.arena, fail, self.call_site()),
            None => ErrorLocation::at(self.call_site().unwrap_or(SpanId::UNKNOWN)),
        }
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn execute_simple(&mut self, simple: &SimpleCommand) -> Result<i32, EvalError> {
        let mut argv = Vec::with_capacity(simple.words.len());
        for word in &simple.words {
            argv.push(self.expand_word(word)?);
        }
        let mut env_pairs = Vec::with_capacity(simple.more_env.len());
        for pair in &simple.more_env {
            env_pairs.push((pair.name.clone(), self.expand_word(&pair.value)?));
        }
        let mut redirects = Vec::with_capacity(simple.redirects.len());
        for redir in &simple.redirects {
            redirects.push(self.resolve_redirect(redir)?);
        }

        let name = match argv.first() {
            Some(name) => name.clone(),
            // redirections alone only need their targets resolved
            None => return Ok(0),
        };
        let name_span = simple.words.first().and_then(Word::first_span);
        if name.is_empty() {
            return Err(RuntimeError::value("command name is empty", self.locate(name_span)).into());
        }

        if let Some(body) = self.functions.get(&name).cloned() {
            return self.call_function(&name, &body, argv.split_off(1), env_pairs, name_span);
        }

        match name.as_str() {
            "echo" => {
                self.stdout.push_str(&argv[1..].join(" "));
                self.stdout.push('\n');
                Ok(0)
            }
            "true" => Ok(0),
            "false" => Ok(1),
            _ => {
                let mut env = self.env.exported();
                for (key, value) in env_pairs {
                    match env.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => env.push((key, value)),
                    }
                }
                let invocation = Invocation { argv, env, redirects };
                debug!(command = %invocation, "recorded invocation");
                self.invocations.push(invocation);
                Ok(0)
            }
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        body: &Command,
        args: Vec<String>,
        env_pairs: Vec<(String, String)>,
        call_site: Option<SpanId>,
    ) -> Result<i32, EvalError> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(RuntimeError::value(
                format!("{}: maximum call depth ({}) exceeded", name, self.options.max_call_depth),
                self.locate(call_site),
            )
            .into());
        }

        trace!(function = %name, depth = self.frames.len() + 1, "call");
        self.frames.push(Frame { args, call_site });
        self.env.push_scope();
        for (key, value) in env_pairs {
            self.env.set(&key, Value::Str(value), AssignScope::Local).exported = true;
        }
        let result = self.execute(body);
        self.env.pop_scope();
        self.frames.pop();
        result
    }

    /// Run the child against a copy of the environment.
    fn execute_fork(&mut self, fork: &Fork) -> Result<i32, EvalError> {
        let saved = self.env.clone();
        let result = self.execute(&fork.child);
        self.env = saved;
        result
    }

    fn execute_decl(&mut self, decl: &VarDecl) -> Result<(), EvalError> {
        let value = self.eval_expr(&decl.value)?;
        let mut var = Variable::new(value);
        var.readonly = decl.mode == DeclMode::Const;
        if !self.env.declare(&decl.name, var) {
            return Err(RuntimeError::value(
                format!("'{}' was already declared", decl.name),
                self.locate(decl.name_span_id),
            )
            .into());
        }
        Ok(())
    }

    fn execute_assign(&mut self, assign: &VarAssign) -> Result<(), EvalError> {
        let value = self.eval_expr(&assign.rhs)?;
        let lhs_span = assign.lhs.span_id();

        let (name, value) = match &assign.lhs {
            LValue::LeftVar(v) => (v.name.clone(), value),
            LValue::LeftIndex(ix) => {
                let name = match ix.obj.as_ref() {
                    Expr::VarSub(VarSub {
                        var: Var::UserVar(name),
                        ..
                    }) => name.clone(),
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("cannot assign to an element of {}", describe(other)),
                            self.locate(lhs_span),
                        )
                        .into())
                    }
                };
                let index_value = self.eval_expr(&ix.index)?;
                let index = index_value.as_index().ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("array index must be an integer, got '{}'", index_value),
                        self.locate(lhs_span),
                    )
                })?;
                let index = usize::try_from(index)
                    .ok()
                    .filter(|&i| i <= self.options.max_array_index)
                    .ok_or_else(|| {
                        RuntimeError::value(format!("{}[{}]: bad array subscript", name, index), self.locate(lhs_span))
                    })?;

                let mut items = match self.env.target(&name, assign.scope).map(|v| &v.value) {
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.to_string()],
                    None => Vec::new(),
                };
                if items.len() <= index {
                    items.resize(index + 1, String::new());
                }
                items[index] = value.to_string();
                (name, Value::Array(items))
            }
        };

        if self.env.target(&name, assign.scope).map_or(false, |v| v.readonly) {
            return Err(RuntimeError::value(format!("{}: readonly variable", name), self.locate(lhs_span)).into());
        }

        let var = self.env.set(&name, value, assign.scope);
        if assign.flags.contains(AssignFlag::Export) {
            var.exported = true;
        }
        if assign.flags.contains(AssignFlag::ReadOnly) {
            var.readonly = true;
        }
        Ok(())
    }

    fn resolve_redirect(&self, redir: &Redir) -> Result<ResolvedRedirect, EvalError> {
        match redir {
            Redir::Redirect(r) => Ok(ResolvedRedirect {
                op: r.op,
                fd: r.fd,
                target: self.expand_word(&r.target)?,
            }),
            // quoted bodies hold only single-quoted parts, so expansion
            // leaves them verbatim
            Redir::HereDoc(doc) => Ok(ResolvedRedirect {
                op: doc.op(),
                fd: doc.fd(),
                target: self.expand_word(doc.body()?)?,
            }),
        }
    }

    // =========================================================================
    // EXPANSION
    // =========================================================================

    pub fn expand_word(&self, word: &Word) -> Result<String, EvalError> {
        let mut out = String::new();
        for part in &word.parts {
            self.expand_part(part, &mut out)?;
        }
        Ok(out)
    }

    fn expand_part(&self, part: &WordPart, out: &mut String) -> Result<(), EvalError> {
        match part {
            WordPart::Literal(token) => out.push_str(token.literal_text()),
            WordPart::SingleQuoted(sq) => {
                for token in &sq.tokens {
                    out.push_str(&token.val);
                }
            }
            WordPart::DoubleQuoted(dq) => {
                for inner in &dq.parts {
                    self.expand_part(inner, out)?;
                }
            }
            WordPart::VarSub(vs) => out.push_str(&self.lookup(vs)?.to_string()),
        }
        Ok(())
    }

    pub fn eval_expr(&self, expr: &Expr) -> Result<Value, EvalError> {
        Ok(match expr {
            Expr::SingleQuotedLiteral(t) | Expr::DoubleQuotedLiteral(t) => Value::Str(t.val.clone()),
            Expr::IntLiteral(lit) => Value::Int(lit.value),
            Expr::FloatLiteral(lit) => Value::Float(lit.value),
            Expr::VarSub(vs) => self.lookup(vs)?,
            Expr::Word(word) => Value::Str(self.expand_word(word)?),
        })
    }

    fn lookup(&self, vs: &VarSub) -> Result<Value, EvalError> {
        let value = match &vs.var {
            Var::UserVar(name) => self.env.get(name).map(|v| v.value.clone()),
            Var::SystemVar(special) => self.special(*special).map(Value::Str),
        };
        match value {
            Some(value) => Ok(value),
            None if self.options.nounset => Err(RuntimeError::name(
                vs.var.name(),
                vs.error_location_in(self.arena, self.call_site()),
            )
            .into()),
            None => Ok(Value::Str(String::new())),
        }
    }

    fn special(&self, var: SpecialVar) -> Option<String> {
        let args = self.frames.last().map_or(self.positional.as_slice(), |f| f.args.as_slice());
        match var {
            SpecialVar::At | SpecialVar::Star => Some(args.join(" ")),
            SpecialVar::Pound => Some(args.len().to_string()),
            SpecialVar::QMark => Some(self.last_status.to_string()),
            SpecialVar::Dollar => Some(std::process::id().to_string()),
            // nothing ever runs in the background
            SpecialVar::Bang => None,
            SpecialVar::Hyphen => Some(if self.options.nounset { "u" } else { "" }.to_string()),
            SpecialVar::Zero => Some(self.options.script_name.clone()),
            SpecialVar::Arg(n) => (n as usize).checked_sub(1).and_then(|i| args.get(i)).cloned(),
        }
    }
}

fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::VarSub(_) => "a special variable",
        Expr::SingleQuotedLiteral(_) | Expr::DoubleQuotedLiteral(_) | Expr::Word(_) => "a string",
        Expr::IntLiteral(_) | Expr::FloatLiteral(_) => "a number",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{render, ErrorCategory};
    use crate::ir::{HereDoc, RedirOp, IR};
    use crate::parser::{parse, parse_with_options, Dialect, ParseOptions, Parser};

    fn command(src: &str) -> (Arena, Command) {
        let parsed = parse(src).unwrap();
        (parsed.arena, parsed.command.unwrap())
    }

    /// Parse several scripts into one arena.
    fn commands(sources: &[&str]) -> (Arena, Vec<Command>) {
        let mut arena = Arena::new();
        let mut out = Vec::new();
        for src in sources {
            let parsed = Parser::new().parse_into(arena, src).unwrap();
            arena = parsed.arena;
            out.push(parsed.command.unwrap());
        }
        (arena, out)
    }

    fn stdout_of(src: &str) -> String {
        let (arena, cmd) = command(src);
        let mut interp = Interpreter::new(&arena);
        interp.run(&cmd).unwrap();
        interp.stdout().to_string()
    }

    fn runtime_error(arena: &Arena, cmd: &Command) -> RuntimeError {
        let mut interp = Interpreter::new(arena);
        match interp.run(cmd) {
            Err(EvalError::Runtime(e)) => e,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_echo_expands_parts_in_order() {
        assert_eq!(stdout_of("x=hi; echo \"$x there\" 'lit' a\\ b"), "hi there lit a b\n");
    }

    #[test]
    fn test_unbound_variable_is_a_name_error_at_the_site() {
        let (arena, cmd) = command("echo ok $nope");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::NameResolution);
        assert_eq!(arena.snippet(err.location().fail()).unwrap(), "$nope");
        assert_eq!(err.location().stack(), None);
        assert!(render(&err, &arena).ends_with("name resolution error: nope: unbound variable\n---\n"));
    }

    #[test]
    fn test_nounset_off_expands_to_empty() {
        let (arena, cmd) = command("echo [$nope]");
        let options = InterpreterOptions {
            nounset: false,
            ..InterpreterOptions::default()
        };
        let mut interp = Interpreter::with_options(&arena, options);
        interp.run(&cmd).unwrap();
        assert_eq!(interp.stdout(), "[]\n");
    }

    #[test]
    fn test_error_in_function_has_call_site_as_stack() {
        let mut parser = Parser::with_options(ParseOptions {
            source_name: "lib.sh".to_string(),
            ..ParseOptions::default()
        });
        let lib = parser.parse("echo $undefined").unwrap();
        let mut parser = Parser::with_options(ParseOptions {
            source_name: "main.sh".to_string(),
            ..ParseOptions::default()
        });
        let main = parser.parse_into(lib.arena, "echo start\nf").unwrap();
        let arena = main.arena;

        let mut interp = Interpreter::new(&arena);
        interp.define_function("f", lib.command.unwrap()).unwrap();
        let err = match interp.run(&main.command.unwrap()) {
            Err(EvalError::Runtime(e)) => e,
            other => panic!("expected a runtime error, got {:?}", other),
        };

        let fail = arena.location(err.location().fail()).unwrap();
        assert_eq!((fail.path.as_str(), fail.line), ("lib.sh", 1));
        let stack = arena.location(err.location().stack().unwrap()).unwrap();
        assert_eq!((stack.path.as_str(), stack.line), ("main.sh", 2));

        let trace = render(&err, &arena);
        assert!(trace.starts_with("Line 1 of 'lib.sh'\n  echo $undefined\n       ^~~~~~~~~\n"));
        assert!(trace.contains("Line 2 of 'main.sh'\n  f\n  ^\n"));
        assert_eq!(interp.stdout(), "start\n");
    }

    #[test]
    fn test_call_site_on_same_line_is_omitted() {
        let (arena, cmd) = command("g; echo $u");
        let children = match cmd {
            Command::CommandSeq(seq) => seq.children,
            other => panic!("expected CommandSeq, got {:?}", other),
        };
        let mut interp = Interpreter::new(&arena);
        interp.define_function("g", children[1].clone()).unwrap();
        match interp.execute(&children[0]) {
            Err(EvalError::Runtime(e)) => assert_eq!(e.location().stack(), None),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_function_locals_and_arguments() {
        let (arena, mut cmds) = commands(&["local x=inner; echo $x $1 $#", "x=outer; f a b; echo $x"]);
        let main = cmds.remove(1);
        let body = cmds.remove(0);
        let mut interp = Interpreter::new(&arena);
        interp.define_function("f", body).unwrap();
        interp.run(&main).unwrap();
        assert_eq!(interp.stdout(), "inner a 2\nouter\n");
        assert!(interp.define_function("1f", main).is_err());
    }

    #[test]
    fn test_call_depth_overflow() {
        let (arena, body) = command("f");
        let options = InterpreterOptions {
            max_call_depth: 5,
            ..InterpreterOptions::default()
        };
        let mut interp = Interpreter::with_options(&arena, options);
        interp.define_function("f", body.clone()).unwrap();
        match interp.run(&body) {
            Err(EvalError::Runtime(e)) => {
                assert_eq!(e.category(), ErrorCategory::ValueCall);
                assert!(e.to_string().contains("maximum call depth (5)"));
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_fork_changes_do_not_leak() {
        assert_eq!(stdout_of("x=1; ( x=2; echo $x ); echo $x"), "2\n1\n");
    }

    #[test]
    fn test_exit_status_and_qmark() {
        assert_eq!(stdout_of("false; echo $?; true; echo $?"), "1\n0\n");
    }

    #[test]
    fn test_readonly_assignment_is_a_value_error_at_lvalue() {
        let (arena, cmd) = command("readonly R=1\nR=2");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::ValueCall);
        let loc = arena.location(err.location().fail()).unwrap();
        assert_eq!((loc.line, loc.col), (2, 0));
        assert_eq!(err.to_string(), "R: readonly variable");
    }

    #[test]
    fn test_non_integer_index_is_a_type_error_at_bracket() {
        let (arena, cmd) = command("i=one\na[$i]=1");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::Type);
        assert_eq!(arena.snippet(err.location().fail()).unwrap(), "[");
    }

    #[test]
    fn test_indexed_assignment_builds_array() {
        assert_eq!(stdout_of("a[0]=x; a[1]=y; i=2; a[$i]=z; echo $a"), "x y z\n");
    }

    #[test]
    fn test_out_of_range_index_is_a_value_error() {
        let (arena, cmd) = command("a[9223372036854775807]=x");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::ValueCall);
        assert_eq!(err.to_string(), "a[9223372036854775807]: bad array subscript");
        assert_eq!(arena.snippet(err.location().fail()).unwrap(), "[");

        let (arena, cmd) = command("a[4]=x; a[5]=y");
        let options = InterpreterOptions {
            max_array_index: 4,
            ..Default::default()
        };
        let mut interp = Interpreter::with_options(&arena, options);
        match interp.run(&cmd) {
            Err(EvalError::Runtime(e)) => assert_eq!(e.to_string(), "a[5]: bad array subscript"),
            other => panic!("expected a runtime error, got {:?}", other),
        }
        assert_eq!(
            interp.env().get("a").map(|v| v.value.clone()),
            Some(Value::Array(vec![String::new(), String::new(), String::new(), String::new(), "x".to_string()]))
        );
    }

    #[test]
    fn test_empty_quoted_command_name_has_a_position() {
        let (arena, cmd) = command("echo ok\n\"\" arg");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::ValueCall);
        let loc = arena.location(err.location().fail()).unwrap();
        assert_eq!((loc.line, loc.col), (2, 0));
    }

    #[test]
    fn test_empty_command_name() {
        let (arena, cmd) = command("e=\n$e arg");
        let err = runtime_error(&arena, &cmd);
        assert_eq!(err.category(), ErrorCategory::ValueCall);
        assert_eq!(arena.location(err.location().fail()).unwrap().line, 2);
    }

    #[test]
    fn test_external_commands_are_recorded() {
        let (arena, cmd) = command("export P=1; H=0; FOO=bar sort -u <in >out\ncat <<EOF\nhi $P\nEOF");
        let mut interp = Interpreter::new(&arena);
        interp.run(&cmd).unwrap();
        let calls = interp.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].argv, vec!["sort", "-u"]);
        assert_eq!(
            calls[0].env,
            vec![("P".to_string(), "1".to_string()), ("FOO".to_string(), "bar".to_string())]
        );
        assert_eq!(calls[0].redirects[0].target, "in");
        assert_eq!(calls[0].redirects[1].op, RedirOp::Great);
        assert_eq!(calls[1].redirects[0].target, "hi 1\n");
    }

    #[test]
    fn test_unfilled_heredoc_is_a_structural_error() {
        let arena = Arena::new();
        let declared = HereDoc::declare(RedirOp::DLess, None, 0, true, "EOF").unwrap();
        let cmd = Command::SimpleCommand(SimpleCommand {
            words: vec![IR::word(vec![IR::literal("cat", None)])],
            redirects: vec![Redir::HereDoc(declared)],
            more_env: vec![],
        });
        let mut interp = Interpreter::new(&arena);
        assert!(matches!(
            interp.execute(&cmd),
            Err(EvalError::Structural(IrError::UnfilledHereDoc { .. }))
        ));
    }

    #[test]
    fn test_var_and_const_declarations() {
        let options = ParseOptions {
            dialect: Dialect::Expr,
            ..ParseOptions::default()
        };
        let parsed = parse_with_options("var x = 1\nconst y = 'two'\necho $x $y", options.clone()).unwrap();
        let mut interp = Interpreter::new(&parsed.arena);
        interp.run(parsed.command.as_ref().unwrap()).unwrap();
        assert_eq!(interp.stdout(), "1 two\n");

        let parsed = parse_with_options("const c = 1\nsetvar c = 2", options.clone()).unwrap();
        let err = runtime_error(&parsed.arena, parsed.command.as_ref().unwrap());
        assert_eq!(err.to_string(), "c: readonly variable");

        let parsed = parse_with_options("var x = 1\nvar x = 2", options).unwrap();
        let err = runtime_error(&parsed.arena, parsed.command.as_ref().unwrap());
        assert_eq!(parsed.arena.location(err.location().fail()).unwrap().line, 2);
    }
}
