//! Primitives behind the IO class: the host output hook and the clock.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::{FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

pub(super) fn register(vm: &mut Vm) {
    let class = super::fetch_class(vm, "IO");
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "writeString_(_)", write_string);
    vm.primitive(&metaclass, "clock", clock);

    metaclass.borrow_mut().is_sealed = true;
}

/// Everything IO prints funnels through here into the host's write hook.
fn write_string(vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    if let Value::Str(text) = &args[1] {
        (vm.config.write)(text);
    }
    args[0] = Value::Null;
    PrimitiveResult::Value
}

/// Seconds since the Unix epoch, with sub-second precision.
fn clock(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    args[0] = Value::Num(seconds);
    PrimitiveResult::Value
}
