//! Primitives on Range.

use std::rc::Rc;

use crate::value::{FiberRef, ObjRange, Value};
use crate::vm::{PrimitiveResult, Vm};

use super::validate_num;

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.range.clone();

    vm.primitive(&class, "from", from);
    vm.primitive(&class, "to", to);
    vm.primitive(&class, "min", min);
    vm.primitive(&class, "max", max);
    vm.primitive(&class, "isInclusive", is_inclusive);
    vm.primitive(&class, "iterate(_)", iterate);
    vm.primitive(&class, "iteratorValue(_)", iterator_value);
    vm.primitive(&class, "toString", to_string);
}

fn receiver(args: &[Value]) -> Rc<ObjRange> {
    match &args[0] {
        Value::Range(range) => range.clone(),
        _ => Rc::new(ObjRange::new(0.0, 0.0, false)),
    }
}

fn from(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).from);
    PrimitiveResult::Value
}

fn to(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).to);
    PrimitiveResult::Value
}

fn min(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).min());
    PrimitiveResult::Value
}

fn max(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).max());
    PrimitiveResult::Value
}

fn is_inclusive(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(receiver(args).is_inclusive);
    PrimitiveResult::Value
}

/// The iterator is the current value itself, stepped by one toward `to`.
fn iterate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let range = receiver(args);

    // An empty exclusive range.
    if range.from == range.to && !range.is_inclusive {
        args[0] = Value::Bool(false);
        return PrimitiveResult::Value;
    }

    if matches!(args[1], Value::Null) {
        args[0] = Value::Num(range.from);
        return PrimitiveResult::Value;
    }

    let Some(mut iterator) = validate_num(args, 1, "Iterator must be a number.") else {
        return PrimitiveResult::Error;
    };

    if range.from < range.to {
        iterator += 1.0;
        if iterator > range.to {
            args[0] = Value::Bool(false);
            return PrimitiveResult::Value;
        }
    } else {
        iterator -= 1.0;
        if iterator < range.to {
            args[0] = Value::Bool(false);
            return PrimitiveResult::Value;
        }
    }

    if !range.is_inclusive && iterator == range.to {
        args[0] = Value::Bool(false);
        return PrimitiveResult::Value;
    }

    args[0] = Value::Num(iterator);
    PrimitiveResult::Value
}

fn iterator_value(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = args[1].clone();
    PrimitiveResult::Value
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::string(receiver(args).to_string());
    PrimitiveResult::Value
}
