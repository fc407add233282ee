//! Primitives on Null.

use crate::value::{FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.null.clone();
    vm.primitive(&class, "!", not);
    vm.primitive(&class, "toString", to_string);
}

fn not(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(true);
    PrimitiveResult::Value
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::string("null");
    PrimitiveResult::Value
}
