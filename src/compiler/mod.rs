//! Single-pass bytecode compiler.
//!
//! A Pratt parser that consumes tokens straight from the scanner and emits
//! bytecode as it goes; there is no intermediate AST. Compilation of nested
//! functions and methods pushes a new function compiler onto a chain, which
//! is also what upvalue resolution walks when flattening closures.
//!
//! - `grammar`: precedence table and expression handlers
//! - `stmt`: statements, definitions and class compilation
//! - `signature`: method signatures and their canonical mangling

mod grammar;
pub mod signature;
mod stmt;

pub use signature::{Signature, SignatureType};

use crate::bytecode::{instruction_width, Op};
use crate::error::Diagnostic;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::span::Span;
use crate::value::{FnRef, ModuleRef, ObjFn, Value};
use crate::vm::{DefineError, Vm};

/// Most locals one function can declare.
pub const MAX_LOCALS: usize = 255;
/// Most upvalues one function can capture.
pub const MAX_UPVALUES: usize = 255;
/// Most constants one function can reference.
pub const MAX_CONSTANTS: usize = 1 << 16;
/// Longest variable name.
pub const MAX_VARIABLE_NAME: usize = 64;
/// Longest method name (before mangling).
pub const MAX_METHOD_NAME: usize = 64;
/// Most fields a class can have, including inherited ones.
pub const MAX_FIELDS: usize = 255;

/// A local variable in a function compiler.
#[derive(Debug, Clone)]
struct Local {
    name: String,
    /// Scope depth the variable was declared at. Zero is the outermost scope
    /// of a function; -1 marks slot zero (the receiver).
    depth: i32,
    /// True once a nested function captures this local, so scope exit closes
    /// the upvalue instead of popping.
    is_upvalue: bool,
}

/// An upvalue recorded while compiling one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CompilerUpvalue {
    /// True when capturing a local of the enclosing function, false when
    /// capturing one of its upvalues.
    is_local: bool,
    index: usize,
}

/// Bookkeeping for the innermost loop being compiled.
#[derive(Debug, Clone)]
struct LoopInfo {
    /// Offset of the first condition instruction, jumped back to.
    start: usize,
    /// Offset of the exit jump's operand, patched once the end is known.
    exit_jump: usize,
    /// Offset of the first body instruction, where `break` placeholders are
    /// scanned for.
    body: usize,
    /// Scope depth a `break` must discard down to.
    scope_depth: i32,
}

/// Per-class state while compiling a class body.
#[derive(Debug, Clone)]
struct ClassInfo {
    /// Field names, implicitly declared on first reference. Slot order is
    /// this class's own layout; binding offsets it past inherited fields.
    fields: Vec<String>,
    /// True while the method being compiled is static.
    is_static_method: bool,
    /// Signature of the method being compiled, for unnamed `super` calls.
    signature: Option<Signature>,
}

/// Which instruction family loads a resolved variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Local,
    Upvalue,
    ModuleVar,
}

/// State for one function being compiled.
struct FnCompiler {
    bytecode: Vec<u8>,
    constants: Vec<Value>,
    /// Source line per bytecode byte.
    source_lines: Vec<u32>,
    locals: Vec<Local>,
    upvalues: Vec<CompilerUpvalue>,
    /// -1 is module scope; 0 the outermost scope of a function or method.
    scope_depth: i32,
    num_params: usize,
    loops: Vec<LoopInfo>,
    /// Set while this function's body is textually inside a class
    /// definition (static fields hoist into this function's locals).
    class_info: Option<ClassInfo>,
}

impl FnCompiler {
    /// A compiler for module-level code.
    fn module_level() -> Self {
        Self {
            bytecode: Vec::new(),
            constants: Vec::new(),
            source_lines: Vec::new(),
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: -1,
            num_params: 0,
            loops: Vec::new(),
            class_info: None,
        }
    }

    /// A compiler for a function or method body. Slot zero holds the
    /// receiver: methods can resolve it as `this`, plain functions get a
    /// nameless slot so references to `this` keep walking up to an
    /// enclosing method.
    fn nested(is_method: bool) -> Self {
        let receiver = Local {
            name: if is_method {
                "this".to_string()
            } else {
                String::new()
            },
            depth: -1,
            is_upvalue: false,
        };
        Self {
            bytecode: Vec::new(),
            constants: Vec::new(),
            source_lines: Vec::new(),
            locals: vec![receiver],
            upvalues: Vec::new(),
            scope_depth: 0,
            num_params: 0,
            loops: Vec::new(),
            class_info: None,
        }
    }
}

/// The compiler: scanner state, diagnostics and the function-compiler chain.
pub struct Compiler<'vm> {
    vm: &'vm mut Vm,
    module: ModuleRef,
    source_path: String,
    print_errors: bool,

    scanner: Scanner,
    current: Token,
    previous: Token,

    has_error: bool,
    diagnostics: Vec<Diagnostic>,

    /// Chain of function compilers; index 0 is module level, the last entry
    /// is the function currently being compiled.
    fns: Vec<FnCompiler>,
}

/// Compile `source` against `module`. Returns the module-body function, or
/// `None` if any error was recorded. Diagnostics go to the VM's error sink
/// when `print_errors` is set.
pub fn compile(
    vm: &mut Vm,
    module: ModuleRef,
    source_path: &str,
    source: &str,
    print_errors: bool,
) -> Option<FnRef> {
    let mut compiler = Compiler::new(vm, module, source_path, source, print_errors);

    compiler.next_token();
    compiler.ignore_newlines();

    while !compiler.match_token(&TokenKind::Eof) {
        compiler.definition();

        // If there is no newline, it must be the end of file on this line.
        if !compiler.match_line() {
            compiler.consume(&TokenKind::Eof, "Expect end of file.");
            break;
        }
    }

    compiler.emit_op(Op::Null);
    compiler.emit_op(Op::Return);

    // Report any implicitly declared module variables that never got a
    // definition.
    let undefined: Vec<String> = compiler
        .module
        .borrow()
        .variables
        .iter()
        .filter(|v| v.value.is_undefined())
        .map(|v| v.name.clone())
        .collect();
    for name in undefined {
        compiler.error(&format!("Variable '{}' is used but not defined.", name));
    }

    compiler.end_compiler("(script)")
}

impl<'vm> Compiler<'vm> {
    fn new(
        vm: &'vm mut Vm,
        module: ModuleRef,
        source_path: &str,
        source: &str,
        print_errors: bool,
    ) -> Self {
        let placeholder = Token::new(TokenKind::Error, Span::default());
        Self {
            vm,
            module,
            source_path: source_path.to_string(),
            print_errors,
            scanner: Scanner::new(source),
            current: placeholder.clone(),
            previous: placeholder,
            has_error: false,
            diagnostics: Vec::new(),
            fns: vec![FnCompiler::module_level()],
        }
    }

    /// The diagnostics recorded so far, for embedders that want them
    /// programmatically rather than through the error sink.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    // ===== Token plumbing =====

    fn next_token(&mut self) {
        // Once we hit EOF, keep returning it; code that expects to consume
        // the EOF token still works.
        if self.current.kind == TokenKind::Eof {
            self.previous = self.current.clone();
            return;
        }

        self.previous = std::mem::replace(&mut self.current, Token::eof(0, 0, 0));
        self.current = self.scanner.next_token();

        for (error, span) in self.scanner.take_errors() {
            self.report(Diagnostic::new(error.to_string(), span, None));
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    /// Consume the current token if it matches. Returns true if consumed.
    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.next_token();
        true
    }

    /// Consume the current token, reporting an error if it does not match.
    fn consume(&mut self, kind: &TokenKind, message: &str) {
        self.next_token();
        if std::mem::discriminant(&self.previous.kind) != std::mem::discriminant(kind) {
            self.error(message);

            // If the next token is the one we want, assume the current one is
            // just spurious and discard it to minimize cascaded errors.
            if self.check(kind) {
                self.next_token();
            }
        }
    }

    /// Consume a name token and return its text, or an empty string after
    /// reporting an error.
    fn consume_name(&mut self, message: &str) -> String {
        self.consume(&TokenKind::Name(String::new()), message);
        match &self.previous.kind {
            TokenKind::Name(name) => name.clone(),
            _ => String::new(),
        }
    }

    /// Matches one or more newlines. Returns true if at least one was found.
    fn match_line(&mut self) -> bool {
        if !self.match_token(&TokenKind::Line) {
            return false;
        }
        while self.match_token(&TokenKind::Line) {}
        true
    }

    fn ignore_newlines(&mut self) {
        self.match_line();
    }

    /// Consume a newline, then discard any duplicates following it.
    fn consume_line(&mut self, message: &str) {
        self.consume(&TokenKind::Line, message);
        self.ignore_newlines();
    }

    // ===== Diagnostics =====

    fn error(&mut self, message: &str) {
        // If the parse error was caused by an error token, the lexer already
        // reported it.
        if self.previous.kind == TokenKind::Error {
            self.has_error = true;
            return;
        }
        let diagnostic = Diagnostic::new(message, self.previous.span, self.previous.error_text());
        self.report(diagnostic);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.has_error = true;
        if self.print_errors {
            let rendered = diagnostic.render(&self.source_path);
            (self.vm.config.error)(&rendered);
        }
        self.diagnostics.push(diagnostic);
    }

    // ===== Bytecode emission =====

    fn current_fn(&mut self) -> &mut FnCompiler {
        self.fns.last_mut().expect("compiler chain is never empty")
    }

    fn line(&self) -> u32 {
        self.previous.span.line as u32
    }

    /// Emit one byte and return its offset.
    fn emit_byte(&mut self, byte: u8) -> usize {
        let line = self.line();
        let func = self.current_fn();
        func.bytecode.push(byte);
        func.source_lines.push(line);
        func.bytecode.len() - 1
    }

    fn emit_op(&mut self, op: Op) -> usize {
        self.emit_byte(op as u8)
    }

    /// Emit a big-endian 16-bit argument.
    fn emit_short(&mut self, value: u16) {
        self.emit_byte((value >> 8) as u8);
        self.emit_byte((value & 0xff) as u8);
    }

    /// Emit an instruction with a one-byte argument. Returns the argument's
    /// offset.
    fn emit_byte_arg(&mut self, op: Op, arg: u8) -> usize {
        self.emit_op(op);
        self.emit_byte(arg)
    }

    /// Emit an instruction with a big-endian 16-bit argument.
    fn emit_short_arg(&mut self, op: Op, arg: u16) {
        self.emit_op(op);
        self.emit_short(arg);
    }

    /// Emit an instruction followed by a jump-offset placeholder. Returns the
    /// offset of the placeholder for later patching.
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit_op(op);
        let offset = self.emit_byte(0xff);
        self.emit_byte(0xff);
        offset
    }

    /// Patch a jump placeholder to land on the current end of bytecode.
    fn patch_jump(&mut self, offset: usize) {
        let func = self.current_fn();
        // -2 adjusts for the offset's own bytes.
        let jump = func.bytecode.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        let func = self.current_fn();
        func.bytecode[offset] = (jump >> 8) as u8;
        func.bytecode[offset + 1] = (jump & 0xff) as u8;
    }

    /// Add a constant to the current function's pool and return its index.
    fn add_constant(&mut self, constant: Value) -> u16 {
        let count = self.current_fn().constants.len();
        if count >= MAX_CONSTANTS {
            self.error(&format!(
                "A function may only contain {} unique constants.",
                MAX_CONSTANTS
            ));
            return 0;
        }
        self.current_fn().constants.push(constant);
        count as u16
    }

    fn string_constant(&mut self, text: &str) -> u16 {
        self.add_constant(Value::string(text))
    }

    // ===== Variables and scopes =====

    fn scope_depth(&self) -> i32 {
        self.fns.last().map(|f| f.scope_depth).unwrap_or(-1)
    }

    fn push_scope(&mut self) {
        self.current_fn().scope_depth += 1;
    }

    /// Close the last scope, discarding any locals declared in it.
    fn pop_scope(&mut self) {
        let depth = self.scope_depth();
        let discarded = self.discard_locals(depth);
        let func = self.current_fn();
        func.locals.truncate(func.locals.len() - discarded);
        func.scope_depth -= 1;
    }

    /// Emit code to discard locals at `depth` or deeper without actually
    /// undeclaring them. Used directly by `break`, which jumps out of scopes
    /// that remain open past it. Returns the number of locals discarded.
    fn discard_locals(&mut self, depth: i32) -> usize {
        let mut discarded = 0;
        loop {
            let func = self.fns.last().expect("compiler chain is never empty");
            let Some(index) = func.locals.len().checked_sub(1 + discarded) else {
                break;
            };
            let local = &func.locals[index];
            if local.depth < depth {
                break;
            }
            let op = if local.is_upvalue {
                Op::CloseUpvalue
            } else {
                Op::Pop
            };
            self.emit_op(op);
            discarded += 1;
        }
        discarded
    }

    /// Create a local with `name` in the current scope. Assumes uniqueness
    /// has already been checked.
    fn define_local(&mut self, name: impl Into<String>) -> usize {
        let depth = self.scope_depth();
        let func = self.current_fn();
        func.locals.push(Local {
            name: name.into(),
            depth,
            is_upvalue: false,
        });
        func.locals.len() - 1
    }

    /// Declare a variable named by `token` (or the previous token) in the
    /// current scope. Returns its slot or module symbol.
    fn declare_variable(&mut self, token: Option<Token>) -> usize {
        let token = token.unwrap_or_else(|| self.previous.clone());
        let name = match &token.kind {
            TokenKind::Name(name) => name.clone(),
            other => other.to_string(),
        };

        if name.len() > MAX_VARIABLE_NAME {
            self.error(&format!(
                "Variable name cannot be longer than {} characters.",
                MAX_VARIABLE_NAME
            ));
        }

        // Top-level module scope.
        if self.scope_depth() == -1 {
            let module = self.module.clone();
            return match self.vm.define_variable(&module, &name, Value::Null) {
                Ok(symbol) => symbol,
                Err(DefineError::AlreadyDefined) => {
                    self.error("Module variable is already defined.");
                    0
                }
                Err(DefineError::TooManyVariables) => {
                    self.error("Too many module variables defined.");
                    0
                }
            };
        }

        // A name may shadow outer scopes but not its own.
        let depth = self.scope_depth();
        let func = self.fns.last().expect("compiler chain is never empty");
        for local in func.locals.iter().rev() {
            if local.depth < depth {
                break;
            }
            if local.name == name {
                self.error(&format!(
                    "Variable '{}' is already declared in this scope.",
                    name
                ));
                return 0;
            }
        }

        if self.fns.last().map(|f| f.locals.len()).unwrap_or(0) > MAX_LOCALS {
            self.error(&format!(
                "Cannot declare more than {} variables in one scope.",
                MAX_LOCALS
            ));
            return 0;
        }

        self.define_local(name)
    }

    /// Parse a name token and declare a variable with it. Returns its slot.
    fn declare_named_variable(&mut self) -> usize {
        self.consume(&TokenKind::Name(String::new()), "Expect variable name.");
        self.declare_variable(None)
    }

    /// Store a declared variable. Locals already sit in their slot; module
    /// variables get a store plus a pop of the initializer temporary.
    fn define_variable(&mut self, symbol: usize) {
        if self.scope_depth() >= 0 {
            return;
        }
        self.emit_short_arg(Op::StoreModuleVar, symbol as u16);
        self.emit_op(Op::Pop);
    }

    /// Find `name` among the locals of the function compiler at `fn_index`.
    fn resolve_local(&self, fn_index: usize, name: &str) -> Option<usize> {
        // Reverse order so the most nested declaration shadows outer ones.
        self.fns[fn_index]
            .locals
            .iter()
            .rposition(|local| local.name == name)
    }

    /// Add an upvalue to the compiler at `fn_index`, reusing an existing
    /// entry for the same capture.
    fn add_upvalue(&mut self, fn_index: usize, is_local: bool, index: usize) -> usize {
        let upvalue = CompilerUpvalue { is_local, index };
        if let Some(existing) = self.fns[fn_index].upvalues.iter().position(|u| *u == upvalue) {
            return existing;
        }
        if self.fns[fn_index].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.fns[fn_index].upvalues.push(upvalue);
        self.fns[fn_index].upvalues.len() - 1
    }

    /// Look up `name` in the functions enclosing `fn_index`, adding upvalues
    /// to every intermediate function so multi-level closures flatten.
    ///
    /// Methods do not close over enclosing locals, so the walk stops at a
    /// class-body boundary. Hoisted static fields are the exception: their
    /// names begin with `_`, which an ordinary identifier never does.
    fn find_upvalue(&mut self, fn_index: usize, name: &str) -> Option<usize> {
        if fn_index == 0 {
            return None;
        }
        let parent = fn_index - 1;

        if !name.starts_with('_') && self.fns[parent].class_info.is_some() {
            return None;
        }

        if let Some(local) = self.resolve_local(parent, name) {
            // Mark it captured so scope exit closes the upvalue.
            self.fns[parent].locals[local].is_upvalue = true;
            return Some(self.add_upvalue(fn_index, true, local));
        }

        if let Some(upvalue) = self.find_upvalue(parent, name) {
            return Some(self.add_upvalue(fn_index, false, upvalue));
        }

        None
    }

    /// Resolve `name` in local scope or as an upvalue, but not module scope.
    fn resolve_non_module(&mut self, name: &str) -> Option<(usize, LoadKind)> {
        let current = self.fns.len() - 1;
        if let Some(local) = self.resolve_local(current, name) {
            return Some((local, LoadKind::Local));
        }
        self.find_upvalue(current, name)
            .map(|upvalue| (upvalue, LoadKind::Upvalue))
    }

    /// Resolve `name` anywhere: locals, upvalues, then module scope.
    fn resolve_name(&mut self, name: &str) -> Option<(usize, LoadKind)> {
        if let Some(found) = self.resolve_non_module(name) {
            return Some(found);
        }
        self.module
            .borrow()
            .find_variable(name)
            .map(|symbol| (symbol, LoadKind::ModuleVar))
    }

    fn load_local(&mut self, slot: usize) {
        if slot <= 8 {
            let op = Op::from_u8(Op::LoadLocal0 as u8 + slot as u8).unwrap_or(Op::LoadLocal0);
            self.emit_op(op);
            return;
        }
        self.emit_byte_arg(Op::LoadLocal, slot as u8);
    }

    /// Load the receiver of the enclosing method. Handles functions defined
    /// inside methods, where `this` is reached through an upvalue.
    fn load_this(&mut self) {
        match self.resolve_non_module("this") {
            Some((index, LoadKind::Local)) => self.load_local(index),
            Some((index, _)) => {
                self.emit_byte_arg(Op::LoadUpvalue, index as u8);
            }
            None => {
                // 'this' outside a method; an error has been reported.
                self.emit_op(Op::Null);
            }
        }
    }

    /// Load a module-level variable every module inherits from core.
    fn load_core_variable(&mut self, name: &str) {
        let symbol = self.module.borrow().find_variable(name);
        match symbol {
            Some(symbol) => self.emit_short_arg(Op::LoadModuleVar, symbol as u16),
            None => {
                self.error(&format!("Variable '{}' is used but not defined.", name));
                self.emit_op(Op::Null);
            }
        }
    }

    /// Compile a read or assignment to a resolved variable.
    fn variable(&mut self, allow_assignment: bool, index: usize, kind: LoadKind) {
        if self.match_token(&TokenKind::Eq) {
            if !allow_assignment {
                self.error("Invalid assignment.");
            }
            self.expression();
            match kind {
                LoadKind::Local => {
                    self.emit_byte_arg(Op::StoreLocal, index as u8);
                }
                LoadKind::Upvalue => {
                    self.emit_byte_arg(Op::StoreUpvalue, index as u8);
                }
                LoadKind::ModuleVar => self.emit_short_arg(Op::StoreModuleVar, index as u16),
            }
            return;
        }

        match kind {
            LoadKind::Local => self.load_local(index),
            LoadKind::Upvalue => {
                self.emit_byte_arg(Op::LoadUpvalue, index as u8);
            }
            LoadKind::ModuleVar => self.emit_short_arg(Op::LoadModuleVar, index as u16),
        }
    }

    // ===== Class context =====

    /// Index of the function compiler holding the nearest enclosing class
    /// body, or `None` outside any class definition.
    fn enclosing_class_index(&self) -> Option<usize> {
        self.fns.iter().rposition(|f| f.class_info.is_some())
    }

    // ===== Method symbols =====

    fn method_symbol(&mut self, name: &str) -> usize {
        self.vm.method_symbol(name)
    }

    fn signature_symbol(&mut self, signature: &Signature) -> usize {
        let name = signature.to_string();
        self.method_symbol(&name)
    }

    /// Initialize a signature from the previously consumed token.
    fn signature_from_token(&mut self, sig_type: SignatureType) -> Signature {
        let name = self.previous.kind.to_string();
        let mut signature = Signature::new(name, sig_type, 0);

        if signature.name.len() > MAX_METHOD_NAME {
            self.error(&format!(
                "Method names cannot be longer than {} characters.",
                MAX_METHOD_NAME
            ));
            signature.name.truncate(MAX_METHOD_NAME);
        }

        signature
    }

    // ===== Function compilation =====

    fn push_fn_compiler(&mut self, is_method: bool) {
        self.fns.push(FnCompiler::nested(is_method));
    }

    /// Finish the innermost function compiler. If a parent exists, emits
    /// code there to load the resulting function (or build its closure).
    /// Returns `None` if compilation recorded any error.
    fn end_compiler(&mut self, debug_name: impl Into<String>) -> Option<FnRef> {
        if self.has_error {
            self.fns.pop();
            return None;
        }

        // Mark the end of the bytecode. The body may contain early returns,
        // so Return alone cannot signal the end.
        self.emit_op(Op::End);

        let func = self.fns.pop().expect("compiler chain is never empty");
        let compiled = FnRef::new(ObjFn::new(
            self.module.clone(),
            func.constants,
            func.upvalues.len(),
            func.num_params,
            func.bytecode,
            self.source_path.clone(),
            debug_name.into(),
            func.source_lines,
        ));

        if !self.fns.is_empty() {
            let constant = self.add_constant(Value::Fn(compiled.clone()));

            if func.upvalues.is_empty() {
                // No captures, so the raw function can be loaded and invoked
                // directly.
                self.emit_short_arg(Op::Constant, constant);
            } else {
                self.emit_short_arg(Op::Closure, constant);
                for upvalue in &func.upvalues {
                    self.emit_byte(if upvalue.is_local { 1 } else { 0 });
                    self.emit_byte(upvalue.index as u8);
                }
            }
        }

        Some(compiled)
    }

    // ===== Loop bookkeeping =====

    fn start_loop(&mut self) {
        let start = self.current_fn().bytecode.len();
        let scope_depth = self.scope_depth();
        self.current_fn().loops.push(LoopInfo {
            start,
            exit_jump: 0,
            body: 0,
            scope_depth,
        });
    }

    /// Emit the exit jump that tests the loop condition.
    fn test_exit_loop(&mut self) {
        let exit_jump = self.emit_jump(Op::JumpIf);
        if let Some(l) = self.current_fn().loops.last_mut() {
            l.exit_jump = exit_jump;
        }
    }

    fn loop_body(&mut self) {
        let body = self.current_fn().bytecode.len();
        if let Some(l) = self.current_fn().loops.last_mut() {
            l.body = body;
        }
        self.block();
    }

    /// Finish the innermost loop: emit the back jump, patch the exit, and
    /// rewrite every `break` placeholder into a real jump. Breaks were
    /// emitted as the reserved `End` opcode, which cannot occur in the
    /// middle of valid bytecode.
    fn end_loop(&mut self) {
        let Some(l) = self.current_fn().loops.pop() else {
            return;
        };

        let offset = self.current_fn().bytecode.len() - l.start + 3;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
            return;
        }
        self.emit_short_arg(Op::Loop, offset as u16);
        self.patch_jump(l.exit_jump);

        let mut i = l.body;
        while i < self.current_fn().bytecode.len() {
            let func = self.fns.last().expect("compiler chain is never empty");
            if func.bytecode[i] == Op::End as u8 {
                self.current_fn().bytecode[i] = Op::Jump as u8;
                self.patch_jump(i + 1);
                i += 3;
            } else {
                let func = self.fns.last().expect("compiler chain is never empty");
                i += 1 + instruction_width(&func.bytecode, &func.constants, i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Vm;

    fn try_compile(source: &str) -> (Option<FnRef>, Vec<String>) {
        let mut vm = Vm::new();
        let module = vm.core_module();
        let mut compiler = Compiler::new(&mut vm, module.clone(), "test", source, false);

        compiler.next_token();
        compiler.ignore_newlines();
        while !compiler.match_token(&TokenKind::Eof) {
            compiler.definition();
            if !compiler.match_line() {
                compiler.consume(&TokenKind::Eof, "Expect end of file.");
                break;
            }
        }
        compiler.emit_op(Op::Null);
        compiler.emit_op(Op::Return);

        let undefined: Vec<String> = module
            .borrow()
            .variables
            .iter()
            .filter(|v| v.value.is_undefined())
            .map(|v| v.name.clone())
            .collect();
        for name in undefined {
            compiler.error(&format!("Variable '{}' is used but not defined.", name));
        }

        let messages = compiler
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect();
        (compiler.end_compiler("(test)"), messages)
    }

    fn assert_compiles(source: &str) {
        let (func, messages) = try_compile(source);
        assert!(func.is_some(), "compile errors: {:?}", messages);
    }

    fn assert_error(source: &str, needle: &str) {
        let (func, messages) = try_compile(source);
        assert!(func.is_none(), "expected a compile error");
        assert!(
            messages.iter().any(|m| m.contains(needle)),
            "no error containing {:?} in {:?}",
            needle,
            messages
        );
    }

    #[test]
    fn test_compile_expression_statement() {
        assert_compiles("1 + 2");
    }

    #[test]
    fn test_compile_variables() {
        assert_compiles("var a = 1\nvar b = 2\na + b");
    }

    #[test]
    fn test_compile_print_sum() {
        assert_compiles("var a = 1\nvar b = 2\nIO.print(a + b)");
    }

    #[test]
    fn test_compile_counter_class() {
        assert_compiles(
            "class Counter {\n  construct new() { _n = 0 }\n  inc() { _n = _n + 1 }\n  value { _n }\n}\nvar c = Counter.new()\nc.inc()\nc.inc()\nIO.print(c.value)",
        );
    }

    #[test]
    fn test_compile_three_level_closure() {
        assert_compiles(
            "var f = Fn.new {\n  var a = 1\n  var g = Fn.new {\n    var h = Fn.new {\n      a = a + 1\n    }\n    h.call()\n  }\n  g.call()\n  a\n}\nf.call()",
        );
    }

    #[test]
    fn test_duplicate_local_is_error() {
        assert_error("{\nvar a = 1\nvar a = 2\n}", "already declared");
    }

    #[test]
    fn test_duplicate_module_variable_is_error() {
        assert_error("var a = 1\nvar a = 2", "already defined");
    }

    #[test]
    fn test_undefined_lowercase_variable_is_error() {
        assert_error("missing", "Undefined variable");
    }

    #[test]
    fn test_undefined_capitalized_variable_reported_at_end() {
        assert_error("Missing.thing", "used but not defined");
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        assert_error("break", "Cannot use 'break' outside of a loop.");
    }

    #[test]
    fn test_this_outside_method_is_error() {
        assert_error("this", "Cannot use 'this' outside of a method.");
    }

    #[test]
    fn test_too_many_parameters_is_error() {
        // 17 parameters, one past the cap.
        let params: Vec<String> = (0..17).map(|i| format!("p{}", i)).collect();
        let source = format!(
            "class T {{\n  m({}) {{ null }}\n}}",
            params.join(", ")
        );
        assert_error(&source, "cannot have more than 16 parameters");
    }

    #[test]
    fn test_setter_and_operator_definitions_compile() {
        assert_compiles(
            "class Vec {\n  construct new(x) { _x = x }\n  x { _x }\n  x=(value) { _x = value }\n  +(other) { Vec.new(_x + other.x) }\n  [i] { _x }\n}",
        );
    }

    #[test]
    fn test_field_outside_class_is_error() {
        assert_error("_a", "outside of a class");
    }

    #[test]
    fn test_error_recovery_reports_multiple_errors() {
        let (func, messages) = try_compile("var a = \nvar b = 1\nvar a = 2");
        assert!(func.is_none());
        assert!(messages.len() >= 2, "messages: {:?}", messages);
    }
}
