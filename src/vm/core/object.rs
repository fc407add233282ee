//! Primitives on Object, the root of the class hierarchy.

use crate::value::{ClassRef, FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm, object: &ClassRef) {
    vm.primitive(object, "!", not);
    vm.primitive(object, "==(_)", eqeq);
    vm.primitive(object, "!=(_)", bangeq);
    vm.primitive(object, "is(_)", is);
    vm.primitive(object, "toString", to_string);
    vm.primitive(object, "type", type_);
}

/// Any object is truthy, so `!` on one is false.
fn not(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(false);
    PrimitiveResult::Value
}

fn eqeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(args[0].equals(&args[1]));
    PrimitiveResult::Value
}

fn bangeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(!args[0].equals(&args[1]));
    PrimitiveResult::Value
}

/// `is` walks the receiver's class chain looking for the right operand.
fn is(vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Value::Class(expected) = args[1].clone() else {
        args[0] = Value::string("Right operand must be a class.");
        return PrimitiveResult::Error;
    };

    let mut class = Some(vm.class_of(&args[0]));
    while let Some(current) = class {
        if std::rc::Rc::ptr_eq(&current, &expected) {
            args[0] = Value::Bool(true);
            return PrimitiveResult::Value;
        }
        class = current.borrow().superclass.clone();
    }

    args[0] = Value::Bool(false);
    PrimitiveResult::Value
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let rendered = match &args[0] {
        Value::Instance(instance) => {
            format!("instance of {}", instance.borrow().class.borrow().name)
        }
        other => other.to_string(),
    };
    args[0] = Value::string(rendered);
    PrimitiveResult::Value
}

fn type_(vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Class(vm.class_of(&args[0]));
    PrimitiveResult::Value
}

/// `Object.same(_,_)`: built-in equality, ignoring any `==` override.
pub(super) fn same(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(args[1].equals(&args[2]));
    PrimitiveResult::Value
}
