//! The virtual machine: fiber trampoline, dynamic dispatch, module registry
//! and the embedding API.

pub mod core;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use colored::Colorize;

use crate::bytecode::{instruction_width, read_u16, Op};
use crate::compiler::{self, MAX_FIELDS};
use crate::value::object::MAX_MODULE_VARS;
use crate::value::{
    CallFrame, ClassRef, FiberRef, FnRef, Method, ModuleVariable, ObjClass, ObjClosure, ObjFiber,
    ObjFn, ObjInstance, ObjModule, Value,
};

/// Result of interpreting a source unit, mirroring `sysexits`-style codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Success,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    pub fn exit_code(self) -> i32 {
        match self {
            InterpretResult::Success => 0,
            InterpretResult::CompileError => 65,
            InterpretResult::RuntimeError => 70,
        }
    }

    /// Convert to a `Result` for embedders that prefer error types over
    /// result codes. The diagnostics themselves were already routed through
    /// the VM's error sink.
    pub fn into_result(self) -> Result<(), crate::error::WispError> {
        match self {
            InterpretResult::Success => Ok(()),
            InterpretResult::CompileError => Err(crate::error::CompileError::Failed.into()),
            InterpretResult::RuntimeError => {
                Err(crate::error::RuntimeError::Aborted("Uncaught runtime error.".to_string())
                    .into())
            }
        }
    }
}

/// What a primitive method asks the interpreter to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveResult {
    /// A value was produced in `args[0]`.
    Value,
    /// A runtime error occurred; the message value is in `args[0]`.
    Error,
    /// The receiver is a function; push a call frame for it.
    Call,
    /// Switch to the fiber in `args[0]`, or stop interpreting if it is null.
    RunFiber,
}

/// A host-provided method. `args[0]` holds the receiver on entry and the
/// result or error payload on exit.
pub type PrimitiveFn = fn(&mut Vm, &FiberRef, &mut [Value]) -> PrimitiveResult;

/// Why defining a module variable failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    AlreadyDefined,
    TooManyVariables,
}

/// Host hooks: script output, diagnostics, and module-source resolution.
pub struct VmConfig {
    /// Receives everything the script prints.
    pub write: Box<dyn FnMut(&str)>,
    /// Receives compile diagnostics and uncaught runtime errors.
    pub error: Box<dyn FnMut(&str)>,
    /// Resolves an imported module name to its source, if it can be found.
    pub load_module: Option<Box<dyn FnMut(&str) -> Option<String>>>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            write: Box::new(|text| print!("{}", text)),
            error: Box::new(|message| eprintln!("{}", message.red())),
            load_module: None,
        }
    }
}

/// The built-in classes, threaded through dispatch instead of living in
/// process-wide statics so several VMs can coexist.
pub struct CoreClasses {
    pub object: ClassRef,
    pub class: ClassRef,
    pub bool_: ClassRef,
    pub fiber: ClassRef,
    pub fn_: ClassRef,
    pub list: ClassRef,
    pub map: ClassRef,
    pub null: ClassRef,
    pub num: ClassRef,
    pub range: ClassRef,
    pub string: ClassRef,
}

impl CoreClasses {
    /// Placeholder shells, replaced by the core bootstrap before any user
    /// code can dispatch on them.
    fn placeholder() -> Self {
        Self {
            object: ObjClass::raw("", 0),
            class: ObjClass::raw("", 0),
            bool_: ObjClass::raw("", 0),
            fiber: ObjClass::raw("", 0),
            fn_: ObjClass::raw("", 0),
            list: ObjClass::raw("", 0),
            map: ObjClass::raw("", 0),
            null: ObjClass::raw("", 0),
            num: ObjClass::raw("", 0),
            range: ObjClass::raw("", 0),
            string: ObjClass::raw("", 0),
        }
    }
}

/// The global method-signature symbol table: canonical signature strings
/// mapped to dense integers shared across every class's method table.
#[derive(Default)]
pub struct SymbolTable {
    names: Vec<String>,
    indices: HashMap<String, usize, ahash::RandomState>,
}

impl SymbolTable {
    /// Intern `name`, returning its existing or freshly assigned symbol.
    pub fn ensure(&mut self, name: &str) -> usize {
        if let Some(&symbol) = self.indices.get(name) {
            return symbol;
        }
        let symbol = self.names.len();
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), symbol);
        symbol
    }

    pub fn name(&self, symbol: usize) -> Option<&str> {
        self.names.get(symbol).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A virtual machine instance.
pub struct Vm {
    method_names: SymbolTable,
    /// The implicit core module every other module inherits bindings from.
    core: crate::value::ModuleRef,
    /// Loaded modules by name.
    modules: HashMap<String, crate::value::ModuleRef, ahash::RandomState>,
    /// The fiber that currently owns the interpreter, if any.
    pub fiber: Option<FiberRef>,
    pub classes: CoreClasses,
    pub config: VmConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self {
            method_names: SymbolTable::default(),
            core: Rc::new(RefCell::new(ObjModule::new(None))),
            modules: HashMap::default(),
            fiber: None,
            classes: CoreClasses::placeholder(),
            config,
        };
        core::initialize(&mut vm);
        vm
    }

    // ===== Method symbols =====

    /// Intern a canonical signature string into the global symbol table.
    pub fn method_symbol(&mut self, name: &str) -> usize {
        self.method_names.ensure(name)
    }

    pub fn method_name(&self, symbol: usize) -> Option<&str> {
        self.method_names.name(symbol)
    }

    // ===== Modules and variables =====

    pub fn core_module(&self) -> crate::value::ModuleRef {
        self.core.clone()
    }

    fn get_module(&self, name: &str) -> Option<crate::value::ModuleRef> {
        self.modules.get(name).cloned()
    }

    /// Declare a module variable without a value yet, as happens when a
    /// top-level name is used before its definition.
    pub fn declare_variable(
        &mut self,
        module: &crate::value::ModuleRef,
        name: &str,
    ) -> Result<usize, DefineError> {
        let mut module = module.borrow_mut();
        if module.variables.len() >= MAX_MODULE_VARS {
            return Err(DefineError::TooManyVariables);
        }
        module.variables.push(ModuleVariable {
            name: name.to_string(),
            value: Value::Undefined,
        });
        Ok(module.variables.len() - 1)
    }

    /// Define a module variable, upgrading an implicit declaration if one
    /// exists.
    pub fn define_variable(
        &mut self,
        module: &crate::value::ModuleRef,
        name: &str,
        value: Value,
    ) -> Result<usize, DefineError> {
        let mut module = module.borrow_mut();
        if module.variables.len() >= MAX_MODULE_VARS {
            return Err(DefineError::TooManyVariables);
        }

        match module.find_variable(name) {
            None => {
                module.variables.push(ModuleVariable {
                    name: name.to_string(),
                    value,
                });
                Ok(module.variables.len() - 1)
            }
            Some(symbol) if module.variables[symbol].value.is_undefined() => {
                module.variables[symbol].value = value;
                Ok(symbol)
            }
            Some(_) => Err(DefineError::AlreadyDefined),
        }
    }

    /// Look up a variable in a loaded module, for embedders.
    pub fn find_variable_in(&self, module_name: &str, name: &str) -> Option<Value> {
        let module = self.get_module(module_name)?;
        let module = module.borrow();
        module
            .find_variable(name)
            .map(|symbol| module.variables[symbol].value.clone())
    }

    /// Look up a variable in the core module.
    pub fn find_variable(&self, name: &str) -> Value {
        let core = self.core.borrow();
        core.find_variable(name)
            .map(|symbol| core.variables[symbol].value.clone())
            .unwrap_or(Value::Null)
    }

    // ===== Primitive registration =====

    /// Bind a host-provided method on `class` under the canonical signature
    /// `signature`.
    pub fn primitive(&mut self, class: &ClassRef, signature: &str, func: PrimitiveFn) {
        let symbol = self.method_symbol(signature);
        class
            .borrow_mut()
            .bind_method(symbol, Method::Primitive(func));
    }

    // ===== Dispatch support =====

    /// The class a value dispatches through. Immediates map to the built-in
    /// classes; heap objects carry their own.
    pub fn class_of(&self, value: &Value) -> ClassRef {
        match value {
            Value::Null | Value::Undefined => self.classes.null.clone(),
            Value::Bool(_) => self.classes.bool_.clone(),
            Value::Num(_) => self.classes.num.clone(),
            Value::Str(_) => self.classes.string.clone(),
            Value::Range(_) => self.classes.range.clone(),
            Value::List(_) => self.classes.list.clone(),
            Value::Map(_) => self.classes.map.clone(),
            Value::Fn(_) | Value::Closure(_) => self.classes.fn_.clone(),
            Value::Fiber(_) => self.classes.fiber.clone(),
            Value::Module(_) => self.classes.object.clone(),
            Value::Instance(instance) => instance.borrow().class.clone(),
            Value::Class(class) => class
                .borrow()
                .class_obj
                .clone()
                .unwrap_or_else(|| self.classes.class.clone()),
        }
    }

    fn method_not_found(&self, class: &ClassRef, symbol: usize) -> Value {
        Value::string(format!(
            "{} does not implement '{}'.",
            class.borrow().name,
            self.method_name(symbol).unwrap_or("<unknown>")
        ))
    }

    // ===== Class and method binding =====

    /// Verify `superclass` can be inherited from: it must be a class and not
    /// a sealed built-in whose primitives assume a specific representation.
    fn validate_superclass(name: &Value, superclass: &Value) -> Option<Value> {
        let Value::Class(class) = superclass else {
            return Some(Value::string(format!(
                "Class '{}' cannot inherit from a non-class object.",
                name
            )));
        };

        if class.borrow().is_sealed {
            return Some(Value::string(format!(
                "Class '{}' cannot inherit from built-in class '{}'.",
                name,
                class.borrow().name
            )));
        }
        None
    }

    /// Attach a compiled method to `class` (or its metaclass for statics),
    /// rewriting the method's code for its position in the hierarchy first.
    fn bind_method(
        &mut self,
        is_static: bool,
        symbol: usize,
        class: &ClassRef,
        method_container: Value,
    ) -> Result<(), Value> {
        let func = match &method_container {
            Value::Fn(func) => func.clone(),
            Value::Closure(closure) => closure.function.clone(),
            _ => return Err(Value::string("Method must be a function.")),
        };

        let target = if is_static {
            // Static methods live on the metaclass; they have no instance
            // fields, so the metaclass is also what the code binds against.
            self.class_of(&Value::Class(class.clone()))
        } else {
            class.clone()
        };

        bind_method_code(&target, &func);
        target
            .borrow_mut()
            .bind_method(symbol, Method::Block(method_container));
        Ok(())
    }

    // ===== Module loading =====

    /// Create (or find) the module named `name`, compile `source` against
    /// it, and return a fresh fiber that runs the module body.
    fn load_module(&mut self, name: &str, source: &str) -> Option<FiberRef> {
        let module = match self.get_module(name) {
            Some(module) => module,
            None => {
                let module = Rc::new(RefCell::new(ObjModule::new(Some(name.to_string()))));
                self.modules.insert(name.to_string(), module.clone());

                // A new module implicitly inherits every core binding.
                let core_variables = self.core.borrow().variables.clone();
                for variable in core_variables {
                    let _ = self.define_variable(&module, &variable.name, variable.value);
                }
                module
            }
        };

        let func = compiler::compile(self, module, name, source, true)?;
        Some(ObjFiber::new(Value::Fn(func)))
    }

    /// Import the module named `name`. Returns null if already loaded, a
    /// fiber to run its body on first load, or an error message value.
    fn import_module(&mut self, name: &str) -> Result<Value, Value> {
        if self.modules.contains_key(name) {
            return Ok(Value::Null);
        }

        let source = self
            .config
            .load_module
            .as_mut()
            .and_then(|loader| loader(name));
        let Some(source) = source else {
            return Err(Value::string(format!("Could not find module '{}'.", name)));
        };

        match self.load_module(name, &source) {
            Some(fiber) => Ok(Value::Fiber(fiber)),
            None => Err(Value::string(format!(
                "Could not compile module '{}'.",
                name
            ))),
        }
    }

    /// Runtime-checked lookup of a variable in a previously loaded module.
    fn import_variable(&self, module_name: &str, variable_name: &str) -> Result<Value, Value> {
        let Some(module) = self.get_module(module_name) else {
            return Err(Value::string(format!(
                "Could not load module '{}'.",
                module_name
            )));
        };

        let module = module.borrow();
        match module.find_variable(variable_name) {
            Some(symbol) => Ok(module.variables[symbol].value.clone()),
            None => Err(Value::string(format!(
                "Could not find a variable named '{}' in module '{}'.",
                variable_name, module_name
            ))),
        }
    }

    // ===== Interpretation =====

    /// Interpret `source`. An empty `source_path` interprets directly into
    /// the core module (the standard-library bootstrap path); anything else
    /// loads as the module named "main".
    pub fn interpret(&mut self, source_path: &str, source: &str) -> InterpretResult {
        if source_path.is_empty() {
            return self.load_into_core(source);
        }

        let Some(fiber) = self.load_module("main", source) else {
            return InterpretResult::CompileError;
        };

        self.fiber = Some(fiber);
        if self.run_interpreter() {
            InterpretResult::Success
        } else {
            InterpretResult::RuntimeError
        }
    }

    /// Compile `source` as module `name` without running it. Used by tooling
    /// that wants the compiled function, like the disassembler.
    pub fn compile_module(&mut self, name: &str, source: &str) -> Option<FnRef> {
        let fiber = self.load_module(name, source)?;
        let frame_func = fiber.borrow().frames.first().map(|f| f.func.clone());
        match frame_func {
            Some(Value::Fn(func)) => Some(func),
            _ => None,
        }
    }

    /// Run an already-compiled module body in a fresh fiber.
    pub fn run_fn(&mut self, func: FnRef) -> InterpretResult {
        self.fiber = Some(ObjFiber::new(Value::Fn(func)));
        if self.run_interpreter() {
            InterpretResult::Success
        } else {
            InterpretResult::RuntimeError
        }
    }

    fn load_into_core(&mut self, source: &str) -> InterpretResult {
        let core = self.core.clone();
        let Some(func) = compiler::compile(self, core, "", source, true) else {
            return InterpretResult::CompileError;
        };

        self.fiber = Some(ObjFiber::new(Value::Fn(func)));
        if self.run_interpreter() {
            InterpretResult::Success
        } else {
            InterpretResult::RuntimeError
        }
    }

    /// Fail `fiber` with `error`. Returns the fiber to resume when an
    /// ancestor was trying, or `None` when interpretation must stop.
    fn runtime_error(&mut self, fiber: &FiberRef, error: Value) -> Option<FiberRef> {
        if fiber.borrow().has_error() {
            // A fiber can fail at most once; a second failure is a
            // host-level diagnostic, not a language-level condition.
            (self.config.error)("A fiber can only fail once.");
            self.fiber = None;
            return None;
        }

        fiber.borrow_mut().error = Some(error.clone());

        if fiber.borrow().caller_is_trying {
            let caller = fiber.borrow().caller.clone();
            if let Some(caller) = caller {
                // The caller's try() call completes with the error value.
                caller.borrow_mut().set_return_value(error);
                self.fiber = Some(caller.clone());
                return Some(caller);
            }
        }

        // Nothing caught the error; abandon interpretation and surface it.
        self.fiber = None;
        (self.config.error)(&error.to_string());
        None
    }

    /// The bytecode trampoline. Runs fibers until the current one completes
    /// (true) or fails uncaught (false). A fiber switch swaps which frame
    /// stack and operand stack the loop reads; the host stack never grows.
    fn run_interpreter(&mut self) -> bool {
        let Some(mut fiber) = self.fiber.clone() else {
            return false;
        };

        let (mut frame_func, mut func, mut ip, mut stack_start) = load_frame(&fiber);

        loop {
            let byte = fetch(&func, &mut ip);
            let Some(op) = Op::from_u8(byte) else {
                (self.config.error)(&format!("Unknown opcode {}.", byte));
                return false;
            };

            // The single-byte local loads.
            let op_byte = op as u8;
            if (Op::LoadLocal0 as u8..=Op::LoadLocal8 as u8).contains(&op_byte) {
                let slot = stack_start + (op_byte - Op::LoadLocal0 as u8) as usize;
                let value = fiber.borrow().stack[slot].clone();
                fiber.borrow_mut().push(value);
                continue;
            }

            // Method calls, split by arity.
            if let Some(arity) = op.call_arity() {
                let is_super = op.is_super_call();
                let num_args = arity + 1;
                let symbol = fetch_short(&func, &mut ip) as usize;

                let arg_start = fiber.borrow().stack.len() - num_args;
                let receiver = fiber.borrow().stack[arg_start].clone();

                let class = if is_super {
                    // The superclass was patched into a constant when the
                    // method was bound.
                    let constant = fetch_short(&func, &mut ip) as usize;
                    match constant_value(&func, constant) {
                        Value::Class(class) => class,
                        _ => {
                            save_ip(&fiber, ip);
                            match self.runtime_error(
                                &fiber,
                                Value::string("No superclass bound for 'super' call."),
                            ) {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                    continue;
                                }
                                None => return false,
                            }
                        }
                    }
                } else {
                    self.class_of(&receiver)
                };

                let method = class.borrow().lookup_method(symbol);
                match method {
                    Some(Method::Primitive(primitive)) => {
                        let mut args: Vec<Value> = fiber.borrow().stack[arg_start..].to_vec();
                        let result = primitive(self, &fiber, &mut args);

                        match result {
                            PrimitiveResult::Value => {
                                // The result replaces the whole argument
                                // list.
                                let mut fb = fiber.borrow_mut();
                                fb.stack.truncate(arg_start);
                                fb.stack.push(args[0].clone());
                            }
                            PrimitiveResult::Call => {
                                save_ip(&fiber, ip);
                                fiber.borrow_mut().call_function(receiver, num_args);
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                            PrimitiveResult::RunFiber => {
                                save_ip(&fiber, ip);
                                match args[0].clone() {
                                    Value::Fiber(next) => {
                                        self.fiber = Some(next.clone());
                                        fiber = next;
                                        (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                    }
                                    // No fiber to switch to; stop
                                    // interpreting.
                                    _ => return true,
                                }
                            }
                            PrimitiveResult::Error => {
                                save_ip(&fiber, ip);
                                match self.runtime_error(&fiber, args[0].clone()) {
                                    Some(next) => {
                                        fiber = next;
                                        (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                    }
                                    None => return false,
                                }
                            }
                        }
                    }

                    Some(Method::Block(block)) => {
                        save_ip(&fiber, ip);
                        fiber.borrow_mut().call_function(block, num_args);
                        (frame_func, func, ip, stack_start) = load_frame(&fiber);
                    }

                    None => {
                        save_ip(&fiber, ip);
                        let error = self.method_not_found(&class, symbol);
                        match self.runtime_error(&fiber, error) {
                            Some(next) => {
                                fiber = next;
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                            None => return false,
                        }
                    }
                }
                continue;
            }

            match op {
                Op::Constant => {
                    let index = fetch_short(&func, &mut ip) as usize;
                    let value = constant_value(&func, index);
                    fiber.borrow_mut().push(value);
                }

                Op::Null => fiber.borrow_mut().push(Value::Null),
                Op::False => fiber.borrow_mut().push(Value::Bool(false)),
                Op::True => fiber.borrow_mut().push(Value::Bool(true)),

                Op::LoadLocal => {
                    let slot = stack_start + fetch(&func, &mut ip) as usize;
                    let value = fiber.borrow().stack[slot].clone();
                    fiber.borrow_mut().push(value);
                }

                Op::StoreLocal => {
                    let slot = stack_start + fetch(&func, &mut ip) as usize;
                    let top = fiber.borrow().peek();
                    fiber.borrow_mut().stack[slot] = top;
                }

                Op::LoadUpvalue => {
                    let index = fetch(&func, &mut ip) as usize;
                    let value = match &frame_func {
                        Value::Closure(closure) => {
                            let upvalue = closure.upvalues.borrow()[index].clone();
                            let fb = fiber.borrow();
                            upvalue.load(&fb.stack)
                        }
                        _ => Value::Null,
                    };
                    fiber.borrow_mut().push(value);
                }

                Op::StoreUpvalue => {
                    let index = fetch(&func, &mut ip) as usize;
                    if let Value::Closure(closure) = &frame_func {
                        let upvalue = closure.upvalues.borrow()[index].clone();
                        let top = fiber.borrow().peek();
                        let mut fb = fiber.borrow_mut();
                        upvalue.store(&mut fb.stack, top);
                    }
                }

                Op::LoadModuleVar => {
                    let symbol = fetch_short(&func, &mut ip) as usize;
                    let value = func.module.borrow().variables[symbol].value.clone();
                    fiber.borrow_mut().push(value);
                }

                Op::StoreModuleVar => {
                    let symbol = fetch_short(&func, &mut ip) as usize;
                    let top = fiber.borrow().peek();
                    func.module.borrow_mut().variables[symbol].value = top;
                }

                Op::LoadFieldThis => {
                    let field = fetch(&func, &mut ip) as usize;
                    let receiver = fiber.borrow().stack[stack_start].clone();
                    match receiver {
                        Value::Instance(instance) => {
                            let value = instance.borrow().fields[field].clone();
                            fiber.borrow_mut().push(value);
                        }
                        _ => {
                            save_ip(&fiber, ip);
                            match self
                                .runtime_error(&fiber, Value::string("Only instances have fields."))
                            {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::StoreFieldThis => {
                    let field = fetch(&func, &mut ip) as usize;
                    let receiver = fiber.borrow().stack[stack_start].clone();
                    match receiver {
                        Value::Instance(instance) => {
                            let top = fiber.borrow().peek();
                            instance.borrow_mut().fields[field] = top;
                        }
                        _ => {
                            save_ip(&fiber, ip);
                            match self
                                .runtime_error(&fiber, Value::string("Only instances have fields."))
                            {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::LoadField => {
                    let field = fetch(&func, &mut ip) as usize;
                    let receiver = fiber.borrow_mut().pop();
                    match receiver {
                        Value::Instance(instance) => {
                            let value = instance.borrow().fields[field].clone();
                            fiber.borrow_mut().push(value);
                        }
                        _ => {
                            save_ip(&fiber, ip);
                            match self
                                .runtime_error(&fiber, Value::string("Only instances have fields."))
                            {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::StoreField => {
                    let field = fetch(&func, &mut ip) as usize;
                    let receiver = fiber.borrow_mut().pop();
                    match receiver {
                        Value::Instance(instance) => {
                            let top = fiber.borrow().peek();
                            instance.borrow_mut().fields[field] = top;
                        }
                        _ => {
                            save_ip(&fiber, ip);
                            match self
                                .runtime_error(&fiber, Value::string("Only instances have fields."))
                            {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::Pop => fiber.borrow_mut().drop_top(),
                Op::Dup => fiber.borrow_mut().dup(),

                Op::Jump => {
                    let offset = fetch_short(&func, &mut ip) as usize;
                    ip += offset;
                }

                Op::Loop => {
                    let offset = fetch_short(&func, &mut ip) as usize;
                    ip -= offset;
                }

                Op::JumpIf => {
                    let offset = fetch_short(&func, &mut ip) as usize;
                    let condition = fiber.borrow_mut().pop();
                    if condition.is_falsy() {
                        ip += offset;
                    }
                }

                Op::And => {
                    let offset = fetch_short(&func, &mut ip) as usize;
                    if fiber.borrow().peek().is_falsy() {
                        ip += offset;
                    } else {
                        fiber.borrow_mut().drop_top();
                    }
                }

                Op::Or => {
                    let offset = fetch_short(&func, &mut ip) as usize;
                    if fiber.borrow().peek().is_falsy() {
                        fiber.borrow_mut().drop_top();
                    } else {
                        ip += offset;
                    }
                }

                Op::CloseUpvalue => {
                    let mut fb = fiber.borrow_mut();
                    let top = fb.stack.len() - 1;
                    fb.close_upvalues(top);
                    fb.stack.pop();
                }

                Op::Return => {
                    let result = fiber.borrow_mut().pop();
                    fiber.borrow_mut().frames.pop();

                    // Close any upvalue still pointing into the returning
                    // frame before its slots disappear.
                    fiber.borrow_mut().close_upvalues(stack_start);

                    if fiber.borrow().is_done() {
                        let caller = fiber.borrow().caller.clone();
                        match caller {
                            None => return true,
                            Some(caller) => {
                                // Resume the calling fiber with the result.
                                caller.borrow_mut().set_return_value(result);
                                self.fiber = Some(caller.clone());
                                fiber = caller;
                            }
                        }
                    } else {
                        // Collapse the frame's slots down to one result slot
                        // where the caller expects it.
                        let mut fb = fiber.borrow_mut();
                        fb.stack.truncate(stack_start);
                        fb.stack.push(result);
                    }

                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                }

                Op::Closure => {
                    let constant = fetch_short(&func, &mut ip) as usize;
                    let prototype = match constant_value(&func, constant) {
                        Value::Fn(prototype) => prototype,
                        _ => {
                            (self.config.error)("Closure constant is not a function.");
                            return false;
                        }
                    };

                    // Push the closure before capturing so its upvalue list
                    // is visible while being filled.
                    let closure = Rc::new(ObjClosure::new(prototype.clone()));
                    fiber.borrow_mut().push(Value::Closure(closure.clone()));

                    for _ in 0..prototype.num_upvalues {
                        let is_local = fetch(&func, &mut ip);
                        let index = fetch(&func, &mut ip) as usize;

                        let upvalue = if is_local != 0 {
                            // Close over the enclosing frame's local.
                            fiber.borrow_mut().capture_upvalue(stack_start + index)
                        } else {
                            // Share the enclosing closure's upvalue.
                            match &frame_func {
                                Value::Closure(enclosing) => {
                                    enclosing.upvalues.borrow()[index].clone()
                                }
                                _ => Rc::new(crate::value::ObjUpvalue::open(stack_start)),
                            }
                        };
                        closure.upvalues.borrow_mut().push(upvalue);
                    }
                }

                Op::Construct => {
                    let receiver = fiber.borrow().stack[stack_start].clone();
                    match receiver {
                        Value::Class(class) => {
                            let instance =
                                Value::Instance(Rc::new(RefCell::new(ObjInstance::new(class))));
                            fiber.borrow_mut().stack[stack_start] = instance;
                        }
                        _ => {
                            save_ip(&fiber, ip);
                            match self
                                .runtime_error(&fiber, Value::string("'this' should be a class."))
                            {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::Class => {
                    let num_fields = fetch(&func, &mut ip) as usize;
                    let superclass_value = fiber.borrow().peek();
                    let name_value = fiber.borrow().peek2();

                    if let Some(error) = Self::validate_superclass(&name_value, &superclass_value) {
                        save_ip(&fiber, ip);
                        match self.runtime_error(&fiber, error) {
                            Some(next) => {
                                fiber = next;
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                            None => return false,
                        }
                        continue;
                    }

                    let Value::Class(superclass) = superclass_value else {
                        continue;
                    };

                    if superclass.borrow().num_fields + num_fields > MAX_FIELDS {
                        save_ip(&fiber, ip);
                        let error = Value::string(format!(
                            "Class '{}' may not have more than {} fields, including inherited ones.",
                            name_value, MAX_FIELDS
                        ));
                        match self.runtime_error(&fiber, error) {
                            Some(next) => {
                                fiber = next;
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                            None => return false,
                        }
                        continue;
                    }

                    let class = ObjClass::new(
                        &superclass,
                        num_fields,
                        name_value.to_string(),
                        &self.classes.class,
                    );

                    let mut fb = fiber.borrow_mut();
                    fb.drop_top();
                    fb.drop_top();
                    fb.push(Value::Class(class));
                }

                Op::MethodInstance | Op::MethodStatic => {
                    let symbol = fetch_short(&func, &mut ip) as usize;
                    let class_value = fiber.borrow().peek();
                    let method_value = fiber.borrow().peek2();

                    let bind_result = match &class_value {
                        Value::Class(class) => {
                            self.bind_method(op == Op::MethodStatic, symbol, class, method_value)
                        }
                        _ => Err(Value::string("Can only define methods on a class.")),
                    };

                    match bind_result {
                        Ok(()) => {
                            let mut fb = fiber.borrow_mut();
                            fb.drop_top();
                            fb.drop_top();
                        }
                        Err(error) => {
                            save_ip(&fiber, ip);
                            match self.runtime_error(&fiber, error) {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::LoadModule => {
                    let constant = fetch_short(&func, &mut ip) as usize;
                    let name = constant_value(&func, constant).to_string();

                    save_ip(&fiber, ip);
                    match self.import_module(&name) {
                        Err(error) => match self.runtime_error(&fiber, error) {
                            Some(next) => {
                                fiber = next;
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                            None => return false,
                        },
                        Ok(result) => {
                            // A slot for the module fiber's (discarded)
                            // result.
                            fiber.borrow_mut().push(Value::Null);

                            if let Value::Fiber(module_fiber) = result {
                                // Run the module body, then resume here.
                                module_fiber.borrow_mut().caller = Some(fiber.clone());
                                self.fiber = Some(module_fiber.clone());
                                fiber = module_fiber;
                                (frame_func, func, ip, stack_start) = load_frame(&fiber);
                            }
                        }
                    }
                }

                Op::ImportVariable => {
                    let module_constant = fetch_short(&func, &mut ip) as usize;
                    let variable_constant = fetch_short(&func, &mut ip) as usize;
                    let module_name = constant_value(&func, module_constant).to_string();
                    let variable_name = constant_value(&func, variable_constant).to_string();

                    match self.import_variable(&module_name, &variable_name) {
                        Ok(value) => fiber.borrow_mut().push(value),
                        Err(error) => {
                            save_ip(&fiber, ip);
                            match self.runtime_error(&fiber, error) {
                                Some(next) => {
                                    fiber = next;
                                    (frame_func, func, ip, stack_start) = load_frame(&fiber);
                                }
                                None => return false,
                            }
                        }
                    }
                }

                Op::End => {
                    // End is always preceded by Return; reaching it means
                    // the compiler generated bad code.
                    (self.config.error)("Executed End opcode.");
                    return false;
                }

                // Call and load-local ranges were handled above.
                _ => {}
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a method's code for the class it is being bound to: offset field
/// accesses past the inherited fields and patch super-call constant slots
/// with the statically-known superclass. Recurses into nested closures. Runs
/// exactly once per compiled function, at bind time.
pub fn bind_method_code(class: &ClassRef, func: &ObjFn) {
    let superclass = class.borrow().superclass.clone();
    let inherited_fields = superclass
        .as_ref()
        .map(|sc| sc.borrow().num_fields)
        .unwrap_or(0);

    let mut code = func.code.borrow_mut();
    let crate::value::FnCode {
        bytecode,
        constants,
    } = &mut *code;

    let mut ip = 0;
    loop {
        let Some(op) = Op::from_u8(bytecode[ip]) else {
            return;
        };
        ip += 1;

        match op {
            Op::LoadField | Op::StoreField | Op::LoadFieldThis | Op::StoreFieldThis => {
                // Shift this class's fields down past the inherited ones.
                bytecode[ip] = bytecode[ip].wrapping_add(inherited_fields as u8);
                ip += 1;
            }

            op if op.is_super_call() => {
                // Skip the symbol, then fill the reserved constant slot with
                // the superclass.
                ip += 2;
                let constant = read_u16(bytecode, ip) as usize;
                if let Some(superclass) = &superclass {
                    constants[constant] = Value::Class(superclass.clone());
                }
                ip += 2;
            }

            Op::Closure => {
                // Bind the nested closure too.
                let constant = read_u16(bytecode, ip) as usize;
                if let Some(Value::Fn(nested)) = constants.get(constant) {
                    let nested = nested.clone();
                    bind_method_code(class, &nested);
                }
                ip += instruction_width(bytecode, constants, ip - 1);
            }

            Op::End => return,

            _ => {
                ip += instruction_width(bytecode, constants, ip - 1);
            }
        }
    }
}

// ===== Frame-cache helpers for the interpreter loop =====

/// The `Fn` behind a frame's function value.
fn as_fn(value: &Value) -> FnRef {
    match value {
        Value::Fn(func) => func.clone(),
        Value::Closure(closure) => closure.function.clone(),
        _ => unreachable!("call frames always hold a function or closure"),
    }
}

/// Snapshot the current frame of `fiber` into the loop's cached state.
fn load_frame(fiber: &FiberRef) -> (Value, FnRef, usize, usize) {
    let fb = fiber.borrow();
    let frame: &CallFrame = fb.frames.last().expect("running fiber has a frame");
    let frame_func = frame.func.clone();
    let func = as_fn(&frame_func);
    (frame_func, func, frame.ip, frame.stack_start)
}

fn save_ip(fiber: &FiberRef, ip: usize) {
    if let Some(frame) = fiber.borrow_mut().frames.last_mut() {
        frame.ip = ip;
    }
}

fn fetch(func: &FnRef, ip: &mut usize) -> u8 {
    let byte = func.code.borrow().bytecode[*ip];
    *ip += 1;
    byte
}

fn fetch_short(func: &FnRef, ip: &mut usize) -> u16 {
    let code = func.code.borrow();
    let value = read_u16(&code.bytecode, *ip);
    *ip += 2;
    value
}

fn constant_value(func: &FnRef, index: usize) -> Value {
    func.code.borrow().constants[index].clone()
}

#[cfg(test)]
mod tests;
