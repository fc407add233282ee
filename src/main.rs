//! Wisp CLI: execute script files or run the REPL.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use colored::Colorize;
use mimalloc::MiMalloc;

use wisplang::{bytecode, InterpretResult, Vm, VmConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file.
    Run { file: String, dump_bytecode: bool },
    /// Start the REPL.
    Repl,
}

fn print_usage() {
    eprintln!("Wisp {} - Wisplang Interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: wisp [options] [script.wisp]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --dump-bytecode  Print the compiled bytecode before running");
    eprintln!("  -h, --help       Show this help");
}

fn parse_args(args: &[String]) -> Option<Command> {
    let mut dump_bytecode = false;
    let mut file = None;

    for arg in args {
        match arg.as_str() {
            "--dump-bytecode" => dump_bytecode = true,
            "-h" | "--help" => return None,
            _ if arg.starts_with('-') => return None,
            _ if file.is_none() => file = Some(arg.clone()),
            _ => return None,
        }
    }

    Some(match file {
        Some(file) => Command::Run {
            file,
            dump_bytecode,
        },
        None => Command::Repl,
    })
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match parse_args(&args) {
        None => {
            print_usage();
            64 // EX_USAGE
        }
        Some(Command::Run {
            file,
            dump_bytecode,
        }) => run_file(&file, dump_bytecode),
        Some(Command::Repl) => run_repl(),
    };

    process::exit(code);
}

/// Resolve an import against the running script's directory: either a
/// sibling `<name>.wisp` file or a `<name>/module.wisp` package.
fn module_loader(script_dir: PathBuf) -> Box<dyn FnMut(&str) -> Option<String>> {
    Box::new(move |name| {
        let file = script_dir.join(format!("{}.wisp", name));
        if let Ok(source) = fs::read_to_string(&file) {
            return Some(source);
        }
        fs::read_to_string(script_dir.join(name).join("module.wisp")).ok()
    })
}

fn run_file(path: &str, dump_bytecode: bool) -> i32 {
    if dump_bytecode {
        let Ok(source) = fs::read_to_string(path) else {
            eprintln!("{}", format!("Could not read file '{}'.", path).red());
            return 66; // EX_NOINPUT
        };

        let script_dir = Path::new(path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = VmConfig::default();
        config.load_module = Some(module_loader(script_dir));
        let mut vm = Vm::with_config(config);

        let Some(func) = vm.compile_module("main", &source) else {
            return InterpretResult::CompileError.exit_code();
        };
        println!("{}", bytecode::disassemble_fn(&vm, &func));
        println!("---");
        return vm.run_fn(func).exit_code();
    }

    match wisplang::run_file(Path::new(path)) {
        Ok(result) => result.exit_code(),
        Err(error) => {
            eprintln!("{}", error.to_string().red());
            66 // EX_NOINPUT
        }
    }
}

/// Count of unbalanced open braces, used to accept multi-line input.
fn open_braces(line: &str) -> i32 {
    let opens = line.matches('{').count() as i32;
    let closes = line.matches('}').count() as i32;
    opens - closes
}

fn run_repl() -> i32 {
    let mut vm = Vm::new();

    println!("{}", format!("-- wisp v{}", VERSION).cyan());

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        if buffer.is_empty() {
            print!("{} ", ">".green());
        } else {
            print!("{} ", "|".green());
        }
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        buffer.push_str(&line);
        if open_braces(&buffer) > 0 {
            continue;
        }

        vm.interpret("repl", &buffer);
        buffer.clear();
    }

    0
}
