use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use shell_ir::diagnostics::render;
use shell_ir::interpreter::{EvalError, Interpreter};
use shell_ir::ir::{print_tree, to_shell};
use shell_ir::parser::{self as front, Dialect, ParseOptions};

#[derive(Parser)]
#[command(name = "shell-ir")]
#[command(about = "Parse shell scripts into a span-carrying IR")]
#[command(version)]
struct Cli {
    /// Parse the script from command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Source dialect (posix or expr)
    #[arg(long = "dialect")]
    dialect: Option<Dialect>,

    /// TOML file with parse options
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Dump the tree as JSON
    #[arg(long = "json")]
    json: bool,

    /// Print the tree back as shell source
    #[arg(long = "shell", conflicts_with = "json")]
    shell: bool,

    /// Evaluate with the dry-run interpreter
    #[arg(long = "run")]
    run: bool,

    /// Script file to parse
    #[arg()]
    script_file: Option<PathBuf>,

    /// Positional parameters for --run
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shell_ir=warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => match ParseOptions::from_file(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => ParseOptions::default(),
    };
    if let Some(dialect) = cli.dialect {
        options.dialect = dialect;
    }

    // Determine script source: -c, file, or stdin
    let script = if let Some(s) = cli.script.clone() {
        options.source_name = "<command line>".to_string();
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                options.source_name = file.display().to_string();
                content
            }
            Err(e) => {
                eprintln!("Error: Cannot read script file: {}: {}", file.display(), e);
                std::process::exit(2);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: No script provided. Use -c 'script', provide a script file, or pipe via stdin.");
            std::process::exit(2);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    let parsed = match front::parse_with_options(&script, options) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let command = match parsed.command {
        Some(command) => command,
        None => std::process::exit(0),
    };

    if cli.run {
        let mut interp = Interpreter::new(&parsed.arena);
        interp.set_positional(cli.args.clone());
        let result = interp.run(&command);

        if cli.json {
            let exit_code = if result.is_ok() { interp.last_status() } else { 1 };
            println!(
                "{}",
                serde_json::json!({
                    "stdout": interp.stdout(),
                    "invocations": interp.invocations(),
                    "exitCode": exit_code,
                })
            );
        } else {
            print!("{}", interp.stdout());
            for invocation in interp.invocations() {
                println!("+ {}", invocation);
            }
        }

        match result {
            Ok(status) => std::process::exit(status),
            Err(EvalError::Runtime(e)) => {
                eprint!("{}", render(&e, &parsed.arena));
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&command) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else if cli.shell {
        print!("{}", to_shell(&command));
    } else {
        println!("{}", print_tree(&command));
    }
}
