//! Primitives on Num. Numbers are IEEE doubles; the bitwise operators work
//! on their 32-bit unsigned truncation.

use std::rc::Rc;

use crate::value::{num_to_string, FiberRef, ObjRange, Value};
use crate::vm::{PrimitiveResult, Vm};

use super::validate_num;

const RIGHT_OPERAND: &str = "Right operand must be a number.";

pub(super) fn register(vm: &mut Vm) {
    let class = vm.classes.num.clone();
    let metaclass = super::metaclass_of(vm, &class);

    vm.primitive(&metaclass, "fromString(_)", from_string);
    vm.primitive(&metaclass, "pi", pi);

    vm.primitive(&class, "-(_)", minus);
    vm.primitive(&class, "+(_)", plus);
    vm.primitive(&class, "*(_)", multiply);
    vm.primitive(&class, "/(_)", divide);
    vm.primitive(&class, "<(_)", lt);
    vm.primitive(&class, ">(_)", gt);
    vm.primitive(&class, "<=(_)", lte);
    vm.primitive(&class, ">=(_)", gte);
    vm.primitive(&class, "&(_)", bit_and);
    vm.primitive(&class, "|(_)", bit_or);
    vm.primitive(&class, "^(_)", bit_xor);
    vm.primitive(&class, "<<(_)", shift_left);
    vm.primitive(&class, ">>(_)", shift_right);
    vm.primitive(&class, "abs", abs);
    vm.primitive(&class, "acos", acos);
    vm.primitive(&class, "asin", asin);
    vm.primitive(&class, "atan", atan);
    vm.primitive(&class, "atan(_)", atan2);
    vm.primitive(&class, "ceil", ceil);
    vm.primitive(&class, "cos", cos);
    vm.primitive(&class, "floor", floor);
    vm.primitive(&class, "-", negate);
    vm.primitive(&class, "sin", sin);
    vm.primitive(&class, "sqrt", sqrt);
    vm.primitive(&class, "tan", tan);
    vm.primitive(&class, "%(_)", modulo);
    vm.primitive(&class, "~", bit_not);
    vm.primitive(&class, "..(_)", inclusive_range);
    vm.primitive(&class, "...(_)", exclusive_range);
    vm.primitive(&class, "fraction", fraction);
    vm.primitive(&class, "isNan", is_nan);
    vm.primitive(&class, "isInfinity", is_infinity);
    vm.primitive(&class, "isInteger", is_integer);
    vm.primitive(&class, "sign", sign);
    vm.primitive(&class, "toString", to_string);
    vm.primitive(&class, "truncate", truncate);

    // Defined so 0 and -0 compare equal, per IEEE 754, even though their bit
    // patterns differ.
    vm.primitive(&class, "==(_)", eqeq);
    vm.primitive(&class, "!=(_)", bangeq);
}

fn receiver(args: &[Value]) -> f64 {
    match args[0] {
        Value::Num(n) => n,
        _ => 0.0,
    }
}

fn from_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(text) = super::validate_string(args, 1, "Argument must be a string.") else {
        return PrimitiveResult::Error;
    };

    args[0] = match text.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Num(n),
        _ => Value::Null,
    };
    PrimitiveResult::Value
}

fn pi(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(std::f64::consts::PI);
    PrimitiveResult::Value
}

fn minus(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args) - rhs);
    PrimitiveResult::Value
}

fn plus(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args) + rhs);
    PrimitiveResult::Value
}

fn multiply(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args) * rhs);
    PrimitiveResult::Value
}

fn divide(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args) / rhs);
    PrimitiveResult::Value
}

fn lt(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args) < rhs);
    PrimitiveResult::Value
}

fn gt(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args) > rhs);
    PrimitiveResult::Value
}

fn lte(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args) <= rhs);
    PrimitiveResult::Value
}

fn gte(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Bool(receiver(args) >= rhs);
    PrimitiveResult::Value
}

fn bit_and(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(((receiver(args) as u32) & (rhs as u32)) as f64);
    PrimitiveResult::Value
}

fn bit_or(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(((receiver(args) as u32) | (rhs as u32)) as f64);
    PrimitiveResult::Value
}

fn bit_xor(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(((receiver(args) as u32) ^ (rhs as u32)) as f64);
    PrimitiveResult::Value
}

fn shift_left(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(((receiver(args) as u32) << (rhs as u32 & 31)) as f64);
    PrimitiveResult::Value
}

fn shift_right(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(((receiver(args) as u32) >> (rhs as u32 & 31)) as f64);
    PrimitiveResult::Value
}

fn abs(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).abs());
    PrimitiveResult::Value
}

fn acos(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).acos());
    PrimitiveResult::Value
}

fn asin(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).asin());
    PrimitiveResult::Value
}

fn atan(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).atan());
    PrimitiveResult::Value
}

fn atan2(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, "x value must be a number.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args).atan2(rhs));
    PrimitiveResult::Value
}

fn ceil(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).ceil());
    PrimitiveResult::Value
}

fn cos(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).cos());
    PrimitiveResult::Value
}

fn floor(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).floor());
    PrimitiveResult::Value
}

fn negate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(-receiver(args));
    PrimitiveResult::Value
}

fn sin(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).sin());
    PrimitiveResult::Value
}

fn sqrt(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).sqrt());
    PrimitiveResult::Value
}

fn tan(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).tan());
    PrimitiveResult::Value
}

fn modulo(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, RIGHT_OPERAND) else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Num(receiver(args) % rhs);
    PrimitiveResult::Value
}

fn bit_not(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(!(receiver(args) as u32) as f64);
    PrimitiveResult::Value
}

fn inclusive_range(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, "Right hand side of range must be a number.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Range(Rc::new(ObjRange::new(receiver(args), rhs, true)));
    PrimitiveResult::Value
}

fn exclusive_range(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let Some(rhs) = validate_num(args, 1, "Right hand side of range must be a number.") else {
        return PrimitiveResult::Error;
    };
    args[0] = Value::Range(Rc::new(ObjRange::new(receiver(args), rhs, false)));
    PrimitiveResult::Value
}

fn fraction(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).fract());
    PrimitiveResult::Value
}

fn is_nan(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(receiver(args).is_nan());
    PrimitiveResult::Value
}

fn is_infinity(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Bool(receiver(args).is_infinite());
    PrimitiveResult::Value
}

fn is_integer(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let n = receiver(args);
    args[0] = Value::Bool(n.is_finite() && n.trunc() == n);
    PrimitiveResult::Value
}

fn sign(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    let n = receiver(args);
    args[0] = Value::Num(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    });
    PrimitiveResult::Value
}

fn to_string(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::string(num_to_string(receiver(args)));
    PrimitiveResult::Value
}

fn truncate(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = Value::Num(receiver(args).trunc());
    PrimitiveResult::Value
}

fn eqeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match args[1] {
        Value::Num(rhs) => Value::Bool(receiver(args) == rhs),
        _ => Value::Bool(false),
    };
    PrimitiveResult::Value
}

fn bangeq(_vm: &mut Vm, _fiber: &FiberRef, args: &mut [Value]) -> PrimitiveResult {
    args[0] = match args[1] {
        Value::Num(rhs) => Value::Bool(receiver(args) != rhs),
        _ => Value::Bool(true),
    };
    PrimitiveResult::Value
}
