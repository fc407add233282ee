//! Primitives on Fiber: creation, transfer of control, and the try/abort
//! error protocol.

use crate::value::{FiberRef, ObjFiber, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.fiber.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "new(_)", new);
    vm.primitive(&metaclass, "abort(_)", abort);
    vm.primitive(&metaclass, "current", current);
    vm.primitive(&metaclass, "suspend()", suspend);
    vm.primitive(&metaclass, "yield()", yield0);
    vm.primitive(&metaclass, "yield(_)", yield1);

    vm.primitive(&class, "call()", call0);
    vm.primitive(&class, "call(_)", call1);
    vm.primitive(&class, "error", error);
    vm.primitive(&class, "isDone", is_done);
    vm.primitive(&class, "transfer()", transfer0);
    vm.primitive(&class, "transfer(_)", transfer1);
    vm.primitive(&class, "try()", try_);
}

fn new(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    match &args[1] {
        Value::Fn(_) | Value::Closure(_) => {
            let new_fiber = ObjFiber::new(args[1].clone());

            // The compiler expects the first slot of a function to hold the
            // receiver. A fiber's stack is invoked directly and has none, so
            // seed it here.
            new_fiber.borrow_mut().push(Value::Null);

            args[0] = Value::Fiber(new_fiber);
            PrimitiveResult::Value
        }
        _ => {
            args[0] = Value::string("Argument must be a function.");
            PrimitiveResult::Error
        }
    }
}

fn abort(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = args[1].clone();
    PrimitiveResult::Error
}

fn current(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Fiber(fiber.clone());
    PrimitiveResult::Value
}

/// Suspend the whole interpreter: there is no fiber to switch to.
fn suspend(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Null;
    PrimitiveResult::RunFiber
}

fn error(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    if let Value::Fiber(target) = args[0].clone() {
        args[0] = target.borrow().error.clone().unwrap_or(Value::Null);
    }
    PrimitiveResult::Value
}

fn is_done(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    if let Value::Fiber(target) = args[0].clone() {
        let target = target.borrow();
        args[0] = Value::Bool(target.is_done() || target.has_error());
    }
    PrimitiveResult::Value
}

/// Shared body of `call()` and `call(_)`: link the callee back to the
/// running fiber and switch to it.
fn run_fiber(
    fiber: &FiberRef,
    args: &mut [Value],
    resume_value: Value,
    is_trying: bool,
    has_value: bool,
) -> PrimitiveResult {
    let Value::Fiber(target) = args[0].clone() else {
        args[0] = Value::string("Trying to call a non-fiber");
        return PrimitiveResult::Error;
    };

    if target.borrow().is_done() {
        args[0] = Value::string("Cannot call a finished fiber.");
        return PrimitiveResult::Error;
    }
    if target.borrow().caller.is_some() {
        args[0] = Value::string("Fiber has already been called.");
        return PrimitiveResult::Error;
    }

    {
        let mut callee = target.borrow_mut();

        // Remember who ran it.
        callee.caller = Some(fiber.clone());
        callee.caller_is_trying = is_trying;

        // If the fiber was yielded, the pending yield call completes with
        // the value passed here.
        if !callee.stack.is_empty() {
            callee.set_return_value(resume_value);
        }
    }

    if has_value {
        // call(_) holds two slots but the eventual result needs only one;
        // discard the extra now so the resume value lands correctly.
        fiber.borrow_mut().drop_top();
    }

    PrimitiveResult::RunFiber
}

fn call0(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    run_fiber(fiber, args, Value::Null, false, false)
}

fn call1(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let value = args[1].clone();
    run_fiber(fiber, args, value, false, true)
}

fn try_(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    run_fiber(fiber, args, Value::Null, true, false)
}

/// Shared body of `transfer()` and `transfer(_)`. Unlike call, transfer does
/// not remember the running fiber: the target inherits the running fiber's
/// own caller, so the switched-from fiber drops out of the call chain.
fn transfer_fiber(fiber: &FiberRef, args: &mut [Value], resume_value: Value) -> PrimitiveResult {
    let Value::Fiber(target) = args[0].clone() else {
        args[0] = Value::string("Trying to transfer to a non-fiber");
        return PrimitiveResult::Error;
    };

    if target.borrow().is_done() {
        args[0] = Value::string("Cannot run a finished fiber.");
        return PrimitiveResult::Error;
    }

    let inherited_caller = fiber.borrow().caller.clone();

    let mut callee = target.borrow_mut();
    if callee.caller.is_none() && !callee.stack.is_empty() {
        callee.set_return_value(resume_value);
    }
    callee.caller = inherited_caller;

    PrimitiveResult::RunFiber
}

fn transfer0(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    transfer_fiber(fiber, args, Value::Null)
}

fn transfer1(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let value = args[1].clone();
    transfer_fiber(fiber, args, value)
}

fn yield0(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    // Unhook this fiber from the one that called it.
    let caller = {
        let mut current = fiber.borrow_mut();
        current.caller_is_trying = false;
        current.caller.take()
    };

    match caller {
        None => {
            // No pending fiber; jump all the way out of the interpreter.
            args[0] = Value::Null;
        }
        Some(caller) => {
            // The caller's call() completes with null.
            caller.borrow_mut().set_return_value(Value::Null);
            args[0] = Value::Fiber(caller);
        }
    }
    PrimitiveResult::RunFiber
}

fn yield1(_vm: &mut Vm, fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let caller = {
        let mut current = fiber.borrow_mut();
        current.caller_is_trying = false;
        current.caller.take()
    };

    match caller {
        None => {
            args[0] = Value::Null;
        }
        Some(caller) => {
            // The caller's call() completes with the yielded value.
            caller.borrow_mut().set_return_value(args[1].clone());

            // yield(_) holds two slots on this fiber's stack; the resume
            // value needs only one, so discard the other now.
            fiber.borrow_mut().drop_top();

            args[0] = Value::Fiber(caller);
        }
    }
    PrimitiveResult::RunFiber
}
