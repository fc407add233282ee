//! Primitives on Fn: function objects and the call(_...) family.

use crate::value::{FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.fn_.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "new(_)", new);

    vm.primitive(&class, "arity", arity);
    vm.primitive(&class, "call()", call0);
    vm.primitive(&class, "call(_)", call1);
    vm.primitive(&class, "call(_,_)", call2);
    vm.primitive(&class, "call(_,_,_)", call3);
    vm.primitive(&class, "call(_,_,_,_)", call4);
    vm.primitive(&class, "call(_,_,_,_,_)", call5);
    vm.primitive(&class, "call(_,_,_,_,_,_)", call6);
    vm.primitive(&class, "call(_,_,_,_,_,_,_)", call7);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_)", call8);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_)", call9);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_)", call10);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_)", call11);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_,_)", call12);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_,_,_)", call13);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_,_,_,_)", call14);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_,_,_,_,_)", call15);
    vm.primitive(&class, "call(_,_,_,_,_,_,_,_,_,_,_,_,_,_,_,_)", call16);
    vm.primitive(&class, "toString", to_string);
}

/// `Fn.new(_)` simply validates that the block argument is a function.
fn new(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    match &args[1] {
        Value::Fn(_) | Value::Closure(_) => {
            args[0] = args[1].clone();
            PrimitiveResult::Value
        }
        _ => {
            args[0] = Value::string("Argument must be a function.");
            PrimitiveResult::Error
        }
    }
}

fn arity(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match &args[0] {
        Value::Fn(func) => Value::Num(func.arity as f64),
        Value::Closure(closure) => Value::Num(closure.function.arity as f64),
        _ => Value::Num(0.0),
    };
    PrimitiveResult::Value
}

/// `call` asks the interpreter to push a frame for the receiver, which stays
/// in the receiver slot so its parameters line up after it.
fn call_fn(args: &mut [Value], num_args: usize) -> PrimitiveResult {
    let arity = match &args[0] {
        Value::Fn(func) => func.arity,
        Value::Closure(closure) => closure.function.arity,
        _ => {
            args[0] = Value::string("Object should be a function or closure");
            return PrimitiveResult::Error;
        }
    };

    if num_args >= arity {
        PrimitiveResult::Call
    } else {
        args[0] = Value::string("Function expects more arguments.");
        PrimitiveResult::Error
    }
}

fn call0(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 0)
}
fn call1(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 1)
}
fn call2(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 2)
}
fn call3(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 3)
}
fn call4(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 4)
}
fn call5(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 5)
}
fn call6(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 6)
}
fn call7(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 7)
}
fn call8(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 8)
}
fn call9(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 9)
}
fn call10(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 10)
}
fn call11(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 11)
}
fn call12(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 12)
}
fn call13(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 13)
}
fn call14(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 14)
}
fn call15(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 15)
}
fn call16(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    call_fn(args, 16)
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::string("<fn>");
    PrimitiveResult::Value
}
