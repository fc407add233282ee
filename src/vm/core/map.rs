//! Primitives on Map, including the hidden iteration hooks the core
//! library's key/value sequences are built on.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{FiberRef, MapRef, ObjMap, Value};
use crate::vm::{PrimitiveResult, Vm};

use super::{validate_key, validate_num};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.map.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "new()", instantiate);

    vm.primitive(&class, "[_]", subscript);
    vm.primitive(&class, "[_]=(_)", subscript_setter);
    vm.primitive(&class, "clear()", clear);
    vm.primitive(&class, "containsKey(_)", contains_key);
    vm.primitive(&class, "count", count);
    vm.primitive(&class, "remove(_)", remove);
    vm.primitive(&class, "iterate_(_)", iterate);
    vm.primitive(&class, "keyIteratorValue_(_)", key_iterator_value);
    vm.primitive(&class, "valueIteratorValue_(_)", value_iterator_value);
}

fn receiver(args: &[Value]) -> MapRef {
    match &args[0] {
        Value::Map(map) => map.clone(),
        _ => Rc::new(RefCell::new(ObjMap::default())),
    }
}

fn instantiate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Map(Rc::new(RefCell::new(ObjMap::default())));
    PrimitiveResult::Value
}

fn subscript(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let Some(key) = validate_key(args, 1) else {
        return PrimitiveResult::Error;
    };

    let value = map.borrow().get(&key);
    // A missing key reads as null.
    args[0] = if value.is_undefined() {
        Value::Null
    } else {
        value
    };
    PrimitiveResult::Value
}

fn subscript_setter(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let Some(key) = validate_key(args, 1) else {
        return PrimitiveResult::Error;
    };

    map.borrow_mut().set(key, args[2].clone());
    args[0] = args[2].clone();
    PrimitiveResult::Value
}

fn clear(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    receiver(args).borrow_mut().clear();
    args[0] = Value::Null;
    PrimitiveResult::Value
}

fn contains_key(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let Some(key) = validate_key(args, 1) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(map.borrow().contains_key(&key));
    PrimitiveResult::Value
}

fn count(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).borrow().len() as f64);
    PrimitiveResult::Value
}

fn remove(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let Some(key) = validate_key(args, 1) else {
        return PrimitiveResult::Error;
    };
    args[0] = map.borrow_mut().remove(&key);
    PrimitiveResult::Value
}

/// Advance the entry iterator: null starts at entry 0, a number advances
/// past it, and false ends the iteration.
fn iterate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let length = receiver(args).borrow().len();

    if matches!(args[1], Value::Null) {
        args[0] = if length == 0 {
            Value::Bool(false)
        } else {
            Value::Num(0.0)
        };
        return PrimitiveResult::Value;
    }

    let Some(n) = validate_num(args, 1, "Iterator must be a number.") else {
        return PrimitiveResult::Error;
    };
    if n < 0.0 || n.trunc() != n {
        args[0] = Value::Bool(false);
        return PrimitiveResult::Value;
    }

    let next = n as usize + 1;
    args[0] = if next < length {
        Value::Num(next as f64)
    } else {
        Value::Bool(false)
    };
    PrimitiveResult::Value
}

fn key_iterator_value(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let length = map.borrow().len();
    let Some(index) = super::validate_index(args, 1, length, "Iterator out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = map.borrow().key_at(index).unwrap_or(Value::Null);
    PrimitiveResult::Value
}

fn value_iterator_value(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let map = receiver(args);
    let length = map.borrow().len();
    let Some(index) = super::validate_index(args, 1, length, "Iterator out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = map.borrow().value_at(index).unwrap_or(Value::Null);
    PrimitiveResult::Value
}
