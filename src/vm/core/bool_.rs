//! Primitives on Bool.

use crate::value::{FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.bool_.clone();
    vm.primitive(&class, "toString", to_string);
    vm.primitive(&class, "!", not);
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match args[0] {
        Value::Bool(true) => Value::string("true"),
        _ => Value::string("false"),
    };
    PrimitiveResult::Value
}

fn not(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(!matches!(args[0], Value::Bool(true)));
    PrimitiveResult::Value
}
