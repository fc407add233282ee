//! Primitives on Class.

use crate::value::{ClassRef, FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm, class: &ClassRef) {
    vm.primitive(class, "name", name);
    vm.primitive(class, "supertype", supertype);
}

fn name(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    if let Value::Class(class) = &args[0] {
        let class_name = class.borrow().name.clone();
        args[0] = Value::string(class_name);
    }
    PrimitiveResult::Value
}

fn supertype(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    if let Value::Class(class) = args[0].clone() {
        // Object has no superclass.
        args[0] = match class.borrow().superclass.clone() {
            Some(superclass) => Value::Class(superclass),
            None => Value::Null,
        };
    }
    PrimitiveResult::Value
}
