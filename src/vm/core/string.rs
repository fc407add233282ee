//! Primitives on String. Strings are immutable; iteration walks code
//! points, with `bytes`-flavored hidden methods backing the byte sequence
//! view in the core library.

use std::rc::Rc;

use crate::value::{FiberRef, Value};
use crate::vm::{PrimitiveResult, Vm};

use super::{validate_int, validate_num, validate_string};

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.string.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "fromCodePoint(_)", from_code_point);

    vm.primitive(&class, "==(_)", eqeq);
    vm.primitive(&class, "!=(_)", bangeq);
    vm.primitive(&class, "+(_)", plus);
    vm.primitive(&class, "[_]", subscript);
    vm.primitive(&class, "byteAt_(_)", byte_at);
    vm.primitive(&class, "byteCount_", byte_count);
    vm.primitive(&class, "codePointAt_(_)", code_point_at);
    vm.primitive(&class, "contains(_)", contains);
    vm.primitive(&class, "count", count);
    vm.primitive(&class, "endsWith(_)", ends_with);
    vm.primitive(&class, "indexOf(_)", index_of);
    vm.primitive(&class, "iterate(_)", iterate);
    vm.primitive(&class, "iterateByte_(_)", iterate_byte);
    vm.primitive(&class, "iteratorValue(_)", iterator_value);
    vm.primitive(&class, "startsWith(_)", starts_with);
    vm.primitive(&class, "toString", to_string);
}

fn receiver(args: &[Value]) -> Rc<String> {
    match &args[0] {
        Value::Str(s) => s.clone(),
        _ => Rc::new(String::new()),
    }
}

fn from_code_point(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(code_point) = validate_int(args, 1, "Code point must be an integer.") else {
        return PrimitiveResult::Error;
    };
    if code_point < 0 {
        args[0] = Value::string("Code point cannot be negative.");
        return PrimitiveResult::Error;
    }

    match u32::try_from(code_point).ok().and_then(char::from_u32) {
        Some(c) => {
            args[0] = Value::string(c.to_string());
            PrimitiveResult::Value
        }
        None => {
            args[0] = Value::string("Code point must be a valid unicode scalar value.");
            PrimitiveResult::Error
        }
    }
}

fn eqeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match &args[1] {
        Value::Str(other) => Value::Bool(receiver(args).as_str() == other.as_str()),
        _ => Value::Bool(false),
    };
    PrimitiveResult::Value
}

fn bangeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match &args[1] {
        Value::Str(other) => Value::Bool(receiver(args).as_str() != other.as_str()),
        _ => Value::Bool(true),
    };
    PrimitiveResult::Value
}

fn plus(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(other) = validate_string(args, 1, "Right operand must be a string.") else {
        return PrimitiveResult::Error;
    };
    let mut result = receiver(args).as_str().to_string();
    result.push_str(&other);
    args[0] = Value::string(result);
    PrimitiveResult::Value
}

/// Subscripting with a number yields the code point at that index as a
/// one-character string; with a range, the selected slice.
fn subscript(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let text = receiver(args);
    let chars: Vec<char> = text.chars().collect();

    match args[1].clone() {
        Value::Num(_) => {
            let Some(index) =
                super::validate_index(args, 1, chars.len(), "Subscript out of bounds.")
            else {
                return PrimitiveResult::Error;
            };
            args[0] = Value::string(chars[index].to_string());
            PrimitiveResult::Value
        }
        Value::Range(range) => {
            let Some((start, count, step)) = super::range_indices(args, &range, chars.len())
            else {
                return PrimitiveResult::Error;
            };
            let mut result = String::new();
            for i in 0..count {
                result.push(chars[(start + i * step) as usize]);
            }
            args[0] = Value::string(result);
            PrimitiveResult::Value
        }
        _ => {
            args[0] = Value::string("Subscript must be a number or a range.");
            PrimitiveResult::Error
        }
    }
}

fn byte_at(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let text = receiver(args);
    let Some(index) = super::validate_index(args, 1, text.len(), "Index out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(text.as_bytes()[index] as f64);
    PrimitiveResult::Value
}

fn byte_count(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).len() as f64);
    PrimitiveResult::Value
}

fn code_point_at(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let text = receiver(args);
    let chars: Vec<char> = text.chars().collect();
    let Some(index) = super::validate_index(args, 1, chars.len(), "Index out of bounds.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(chars[index] as u32 as f64);
    PrimitiveResult::Value
}

fn contains(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(other) = validate_string(args, 1, "Argument must be a string.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args).contains(other.as_str()));
    PrimitiveResult::Value
}

fn count(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).chars().count() as f64);
    PrimitiveResult::Value
}

fn ends_with(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(other) = validate_string(args, 1, "Argument must be a string.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args).ends_with(other.as_str()));
    PrimitiveResult::Value
}

/// Index of the first occurrence of the argument, in code points, or -1.
fn index_of(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(needle) = validate_string(args, 1, "Argument must be a string.") else {
        return PrimitiveResult::Error;
    };
    let text = receiver(args);

    args[0] = match text.find(needle.as_str()) {
        Some(byte_index) => Value::Num(text[..byte_index].chars().count() as f64),
        None => Value::Num(-1.0),
    };
    PrimitiveResult::Value
}

fn iterate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let length = receiver(args).chars().count();

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

fn iterate_byte(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let length = receiver(args).len();

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
    let text = receiver(args);
    let chars: Vec<char> = text.chars().collect();
    let Some(index) = super::validate_index(args, 1, chars.len(), "Iterator out of bounds.")
    else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::string(chars[index].to_string());
    PrimitiveResult::Value
}

fn starts_with(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(other) = validate_string(args, 1, "Argument must be a string.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args).starts_with(other.as_str()));
    PrimitiveResult::Value
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, _args: &mut [Value]) -> PrimitiveResult {
    // Already a string.
    PrimitiveResult::Value
}
