//! Wisplang: a dynamically-typed, class-based scripting language with
//! lightweight cooperative fibers.
//!
//! The pipeline is a pull-based lexer feeding a single-pass Pratt compiler
//! that emits bytecode directly, executed by a stack-based VM whose unit of
//! concurrency is the fiber.
//!
//! # Architecture
//!
//! - `lexer`: source text to tokens, one at a time
//! - `compiler`: tokens to bytecode, no intermediate AST
//! - `bytecode`: the instruction set and a disassembler
//! - `value`: the runtime value and heap object model, including fibers
//! - `vm`: the interpreter trampoline, core classes and embedding API

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]

pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod span;
pub mod value;
pub mod vm;

pub use error::WispError;
pub use vm::{InterpretResult, Vm, VmConfig};

/// Interpret `source` as the main module in a fresh VM.
pub fn run(source: &str) -> InterpretResult {
    Vm::new().interpret("main", source)
}

/// Read and interpret a script file, resolving imports against the
/// script's directory (`<name>.wisp` next to it, or `<name>/module.wisp`).
pub fn run_file(path: &std::path::Path) -> Result<InterpretResult, WispError> {
    let source = std::fs::read_to_string(path)?;

    let script_dir = path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let mut config = VmConfig::default();
    config.load_module = Some(Box::new(move |name| {
        let file = script_dir.join(format!("{}.wisp", name));
        if let Ok(source) = std::fs::read_to_string(&file) {
            return Some(source);
        }
        std::fs::read_to_string(script_dir.join(name).join("module.wisp")).ok()
    }));

    let mut vm = Vm::with_config(config);
    Ok(vm.interpret(&path.display().to_string(), &source))
}

/// Compile `source` as the main module in a fresh VM and return its
/// disassembly, or `None` on a compile error.
pub fn disassemble(source: &str) -> Option<String> {
    let mut vm = Vm::new();
    let func = vm.compile_module("main", source)?;
    Some(bytecode::disassemble_fn(&vm, &func))
}
