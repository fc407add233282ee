//! Primitives on List.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{FiberRef, ListRef, ObjList, Value};
use crate::vm::{PrimitiveResult, Vm};

use super::{validate_int, validate_num};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.list.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "new()", instantiate);

    vm.primitive(&class, "[_]", subscript);
    vm.primitive(&class, "[_]=(_)", subscript_setter);
    vm.primitive(&class, "add(_)", add);
    vm.primitive(&class, "clear()", clear);
    vm.primitive(&class, "count", count);
    vm.primitive(&class, "insert(_,_)", insert);
    vm.primitive(&class, "iterate(_)", iterate);
    vm.primitive(&class, "iteratorValue(_)", iterator_value);
    vm.primitive(&class, "removeAt(_)", remove_at);
}

fn receiver(args: &[Value]) -> ListRef {
    match &args[0] {
        Value::List(list) => list.clone(),
        _ => Rc::new(RefCell::new(ObjList::default())),
    }
}

fn instantiate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::List(Rc::new(RefCell::new(ObjList::default())));
    PrimitiveResult::Value
}

fn subscript(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    let length = list.borrow().elements.len();

    match args[1].clone() {
        Value::Num(_) => {
            let Some(index) = super::validate_index(args, 1, length, "Subscript out of bounds.")
            else {
                return PrimitiveResult::Error;
            };
            args[0] = list.borrow().elements[index].clone();
            PrimitiveResult::Value
        }
        Value::Range(range) => {
            let Some((start, count, step)) = super::range_indices(args, &range, length) else {
                return PrimitiveResult::Error;
            };

            let mut result = ObjList::with_capacity(count.max(0) as usize);
            {
                let list = list.borrow();
                for i in 0..count {
                    result
                        .elements
                        .push(list.elements[(start + i * step) as usize].clone());
                }
            }
            args[0] = Value::List(Rc::new(RefCell::new(result)));
            PrimitiveResult::Value
        }
        _ => {
            args[0] = Value::string("Subscript must be a number or a range.");
            PrimitiveResult::Error
        }
    }
}

fn subscript_setter(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    let length = list.borrow().elements.len();

    let Some(index) = super::validate_index(args, 1, length, "Subscript out of bounds.") else {
        return PrimitiveResult::Error;
    };

    list.borrow_mut().elements[index] = args[2].clone();
    args[0] = args[2].clone();
    PrimitiveResult::Value
}

fn add(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    list.borrow_mut().elements.push(args[1].clone());
    args[0] = args[1].clone();
    PrimitiveResult::Value
}

fn clear(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    receiver(args).borrow_mut().elements.clear();
    args[0] = Value::Null;
    PrimitiveResult::Value
}

fn count(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let length = receiver(args).borrow().elements.len();
    args[0] = Value::Num(length as f64);
    PrimitiveResult::Value
}

/// Insert shifts later elements down; the index may equal the count to
/// append, and negative indices wrap one wider than usual so -1 appends.
fn insert(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    let length = list.borrow().elements.len() as i64;

    let Some(index) = validate_int(args, 1, "Index must be an integer.") else {
        return PrimitiveResult::Error;
    };
    let index = if index < 0 { index + length + 1 } else { index };

    if index < 0 || index > length {
        args[0] = Value::string("Index out of bounds.");
        return PrimitiveResult::Error;
    }

    list.borrow_mut()
        .elements
        .insert(index as usize, args[2].clone());
    args[0] = args[2].clone();
    PrimitiveResult::Value
}

fn iterate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let length = receiver(args).borrow().elements.len();

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

fn iterator_value(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    let length = list.borrow().elements.len();

    let Some(index) = super::validate_index(args, 1, length, "Iterator out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = list.borrow().elements[index].clone();
    PrimitiveResult::Value
}

fn remove_at(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let list = receiver(args);
    let length = list.borrow().elements.len();

    let Some(index) = super::validate_index(args, 1, length, "Index out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = list.borrow_mut().elements.remove(index);
    PrimitiveResult::Value
}
