//! Core-module bootstrap: the built-in classes and their primitive methods.
//!
//! The class skeleton (iteration protocol, printing, sequences) is written
//! in the language itself and interpreted into the core module; primitives
//! are then attached to the resulting classes, one module per built-in
//! class.

mod bool_;
mod class_;
mod fiber;
mod fn_;
mod io;
mod list;
mod map;
mod null_;
mod num;
mod object;
mod range;
mod string;

use crate::value::{ClassRef, MapKey, ObjClass, ObjRange, Value};
use crate::vm::{InterpretResult, Vm};

/// The part of the core library written in the language: the iteration
/// protocol, sequence adapters, collection conveniences and the printing
/// surface.
const CORE_SOURCE: &str = r#"
class Bool {}
class Fiber {}
class Fn {}
class Null {}
class Num {}

class Sequence {
  all(f) {
    var result = true
    for (element in this) {
      result = f.call(element)
      if (!result) return result
    }
    return result
  }

  any(f) {
    var result = false
    for (element in this) {
      result = f.call(element)
      if (result) return result
    }
    return result
  }

  contains(element) {
    for (item in this) {
      if (element == item) return true
    }
    return false
  }

  count {
    var result = 0
    for (element in this) {
      result = result + 1
    }
    return result
  }

  count(f) {
    var result = 0
    for (element in this) {
      if (f.call(element)) result = result + 1
    }
    return result
  }

  each(f) {
    for (element in this) {
      f.call(element)
    }
  }

  isEmpty { iterate(null) ? false : true }

  map(transformation) { MapSequence.new(this, transformation) }

  where(predicate) { WhereSequence.new(this, predicate) }

  reduce(acc, f) {
    for (element in this) {
      acc = f.call(acc, element)
    }
    return acc
  }

  reduce(f) {
    var iter = iterate(null)
    if (!iter) Fiber.abort("Can't reduce an empty sequence.")

    // Seed with the first element.
    var result = iteratorValue(iter)
    while (iter = iterate(iter)) {
      result = f.call(result, iteratorValue(iter))
    }

    return result
  }

  join() { join("") }

  join(sep) {
    var first = true
    var result = ""

    for (element in this) {
      if (!first) result = result + sep
      first = false
      result = result + element.toString
    }

    return result
  }

  toList {
    var result = List.new()
    for (element in this) {
      result.add(element)
    }
    return result
  }
}

class MapSequence is Sequence {
  construct new(sequence, fn) {
    _sequence = sequence
    _fn = fn
  }

  iterate(iterator) { _sequence.iterate(iterator) }
  iteratorValue(iterator) { _fn.call(_sequence.iteratorValue(iterator)) }
}

class WhereSequence is Sequence {
  construct new(sequence, fn) {
    _sequence = sequence
    _fn = fn
  }

  iterate(iterator) {
    while (iterator = _sequence.iterate(iterator)) {
      if (_fn.call(_sequence.iteratorValue(iterator))) break
    }
    return iterator
  }

  iteratorValue(iterator) { _sequence.iteratorValue(iterator) }
}

class String is Sequence {
  bytes { StringByteSequence.new(this) }
  codePoints { StringCodePointSequence.new(this) }
}

class StringByteSequence is Sequence {
  construct new(string) {
    _string = string
  }

  [index] { _string.byteAt_(index) }
  iterate(iterator) { _string.iterateByte_(iterator) }
  iteratorValue(iterator) { _string.byteAt_(iterator) }

  count { _string.byteCount_ }
}

class StringCodePointSequence is Sequence {
  construct new(string) {
    _string = string
  }

  [index] { _string.codePointAt_(index) }
  iterate(iterator) { _string.iterate(iterator) }
  iteratorValue(iterator) { _string.codePointAt_(iterator) }

  count { _string.count }
}

class List is Sequence {
  addAll(other) {
    for (element in other) {
      add(element)
    }
    return other
  }

  toString { "[" + join(", ") + "]" }

  +(other) {
    var result = this[0..-1]
    for (element in other) {
      result.add(element)
    }
    return result
  }
}

class Map {
  keys { MapKeySequence.new(this) }
  values { MapValueSequence.new(this) }

  toString {
    var first = true
    var result = "{"

    for (key in keys) {
      if (!first) result = result + ", "
      first = false
      result = result + key.toString + ": " + this[key].toString
    }

    return result + "}"
  }
}

class MapKeySequence is Sequence {
  construct new(map) {
    _map = map
  }

  iterate(n) { _map.iterate_(n) }
  iteratorValue(iterator) { _map.keyIteratorValue_(iterator) }
}

class MapValueSequence is Sequence {
  construct new(map) {
    _map = map
  }

  iterate(n) { _map.iterate_(n) }
  iteratorValue(iterator) { _map.valueIteratorValue_(iterator) }
}

class Range is Sequence {}

class IO {
  static print() {
    writeString_("\n")
  }

  static print(obj) {
    writeObject_(obj)
    writeString_("\n")
    return obj
  }

  static printAll(sequence) {
    for (object in sequence) writeObject_(object)
    writeString_("\n")
  }

  static write(obj) {
    writeObject_(obj)
    return obj
  }

  static writeAll(sequence) {
    for (object in sequence) writeObject_(object)
  }

  static writeObject_(obj) {
    var string = obj.toString
    if (string is String) {
      writeString_(string)
    } else {
      writeString_("[invalid toString]")
    }
  }
}
"#;

/// Create a raw class (no metaclass) and define it as a core-module
/// variable. Only the bootstrap classes are built this way.
fn define_class(vm: &mut Vm, name: &str) -> ClassRef {
    let class = ObjClass::raw(name, 0);
    let core = vm.core_module();
    let _ = vm.define_variable(&core, name, Value::Class(class.clone()));
    class
}

/// Find the class a core-source definition produced.
fn fetch_class(vm: &mut Vm, name: &str) -> ClassRef {
    match vm.find_variable(name) {
        Value::Class(class) => class,
        _ => {
            (vm.config.error)(&format!("Core class '{}' is missing.", name));
            ObjClass::raw(name, 0)
        }
    }
}

/// The metaclass of a class, for registering static primitives.
fn metaclass_of(vm: &Vm, class: &ClassRef) -> ClassRef {
    vm.class_of(&Value::Class(class.clone()))
}

/// Build the core module: bootstrap Object/Class and their metaclass cycle,
/// interpret the core library source, then attach the primitives and seal
/// the built-in types.
pub(crate) fn initialize(vm: &mut Vm) {
    // The root Object class has no superclass, so it is built specially.
    let object_class = define_class(vm, "Object");
    object::register(vm, &object_class);

    // Class is a subclass of Object.
    let class_class = define_class(vm, "Class");
    class_class.borrow_mut().bind_superclass(&object_class);
    class_::register(vm, &class_class);

    // Finally Object's metaclass, a subclass of Class. All three exist now,
    // so the cross-references can be wired up.
    let object_metaclass = define_class(vm, "Object metaclass");
    object_class.borrow_mut().class_obj = Some(object_metaclass.clone());
    object_metaclass.borrow_mut().class_obj = Some(class_class.clone());
    class_class.borrow_mut().class_obj = Some(class_class.clone());
    object_metaclass.borrow_mut().bind_superclass(&class_class);

    vm.primitive(&object_metaclass, "same(_,_)", object::same);

    vm.classes.object = object_class;
    vm.classes.class = class_class;

    // The rest of the classes are defined normally by the core library
    // source.
    if vm.interpret("", CORE_SOURCE) != InterpretResult::Success {
        (vm.config.error)("Could not initialize the core module.");
        return;
    }

    vm.classes.bool_ = fetch_class(vm, "Bool");
    bool_::register(vm);

    vm.classes.fiber = fetch_class(vm, "Fiber");
    fiber::register(vm);

    vm.classes.fn_ = fetch_class(vm, "Fn");
    fn_::register(vm);

    vm.classes.null = fetch_class(vm, "Null");
    null_::register(vm);

    vm.classes.num = fetch_class(vm, "Num");
    num::register(vm);

    vm.classes.string = fetch_class(vm, "String");
    string::register(vm);

    vm.classes.list = fetch_class(vm, "List");
    list::register(vm);

    vm.classes.map = fetch_class(vm, "Map");
    map::register(vm);

    vm.classes.range = fetch_class(vm, "Range");
    range::register(vm);

    io::register(vm);

    // Primitives on the sealed classes assume their built-in
    // representation; inheriting from them would break those assumptions.
    vm.classes.class.borrow_mut().is_sealed = true;
    vm.classes.fiber.borrow_mut().is_sealed = true;
    vm.classes.fn_.borrow_mut().is_sealed = true;
    vm.classes.list.borrow_mut().is_sealed = true;
    vm.classes.map.borrow_mut().is_sealed = true;
    vm.classes.range.borrow_mut().is_sealed = true;
    vm.classes.string.borrow_mut().is_sealed = true;
}

// ===== Shared argument validators =====
//
// On failure these store the error message in `args[0]` and return `None`;
// the caller then returns `PrimitiveResult::Error`.

pub(super) fn validate_num(args: &mut [Value], index: usize, message: &str) -> Option<f64> {
    if let Value::Num(n) = args[index] {
        return Some(n);
    }
    args[0] = Value::string(message);
    None
}

pub(super) fn validate_int_value(args: &mut [Value], n: f64, message: &str) -> Option<i64> {
    if n.is_finite() && n.trunc() == n {
        return Some(n as i64);
    }
    args[0] = Value::string(message);
    None
}

pub(super) fn validate_int(args: &mut [Value], index: usize, message: &str) -> Option<i64> {
    let n = validate_num(args, index, message)?;
    validate_int_value(args, n, message)
}

pub(super) fn validate_string(
    args: &mut [Value],
    index: usize,
    message: &str,
) -> Option<std::rc::Rc<String>> {
    if let Value::Str(s) = &args[index] {
        return Some(s.clone());
    }
    args[0] = Value::string(message);
    None
}

pub(super) fn validate_key(args: &mut [Value], index: usize) -> Option<MapKey> {
    match MapKey::from_value(&args[index]) {
        Some(key) => Some(key),
        None => {
            args[0] = Value::string("Key must be a value type or fiber.");
            None
        }
    }
}

/// Resolve a subscript index against `length`, wrapping negatives. Stores an
/// error in `args[0]` when the index is not an integer or out of bounds.
pub(super) fn validate_index(
    args: &mut [Value],
    index: usize,
    length: usize,
    message: &str,
) -> Option<usize> {
    let n = validate_int(args, index, "Subscript must be an integer.")?;
    let n = if n < 0 { n + length as i64 } else { n };
    if n >= 0 && (n as usize) < length {
        return Some(n as usize);
    }
    args[0] = Value::string(message);
    None
}

/// The elements a range selects out of a sequence of `length` elements:
/// Python-like slicing with negative-index wraparound, an inclusive or
/// exclusive end, and clamping instead of out-of-range errors. Returns
/// `(start, count, step)`.
pub(super) fn range_indices(
    args: &mut [Value],
    range: &ObjRange,
    length: usize,
) -> Option<(i64, i64, i64)> {
    let from = validate_int_value(args, range.from, "Range start must be an integer.")?;
    let to = validate_int_value(args, range.to, "Range end must be an integer.")?;

    let len = length as i64;
    let from = if from < 0 { from + len } else { from };
    let to = if to < 0 { to + len } else { to };

    if to >= from {
        // Forward selection over [start, stop).
        let end = to + if range.is_inclusive { 1 } else { 0 };
        let start = from.clamp(0, len);
        let stop = end.clamp(0, len);
        Some((start, (stop - start).max(0), 1))
    } else {
        // Backward selection from start down to just above stop.
        let end = to - if range.is_inclusive { 1 } else { 0 };
        let start = from.clamp(-1, len - 1);
        let stop = end.clamp(-1, len - 1);
        Some((start, (start - stop).max(0), -1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(from: f64, to: f64, inclusive: bool) -> ObjRange {
        ObjRange::new(from, to, inclusive)
    }

    fn indices(range: &ObjRange, length: usize) -> (i64, i64, i64) {
        let mut args = vec![Value::Null];
        range_indices(&mut args, range, length).expect("valid range")
    }

    #[test]
    fn test_forward_inclusive_range() {
        assert_eq!(indices(&range_of(1.0, 2.0, true), 3), (1, 2, 1));
    }

    #[test]
    fn test_forward_exclusive_range() {
        assert_eq!(indices(&range_of(1.0, 1.0, false), 3), (1, 0, 1));
        assert_eq!(indices(&range_of(0.0, 3.0, false), 3), (0, 3, 1));
    }

    #[test]
    fn test_negative_wraparound() {
        // 0..-1 selects the whole list.
        assert_eq!(indices(&range_of(0.0, -1.0, true), 3), (0, 3, 1));
        // -2..-1 selects the last two elements.
        assert_eq!(indices(&range_of(-2.0, -1.0, true), 4), (2, 2, 1));
    }

    #[test]
    fn test_backward_range() {
        // 2..0 selects elements in reverse.
        assert_eq!(indices(&range_of(2.0, 0.0, true), 3), (2, 3, -1));
        assert_eq!(indices(&range_of(2.0, 0.0, false), 3), (2, 2, -1));
    }

    #[test]
    fn test_empty_list_whole_slice() {
        // The full-copy idiom works on an empty list.
        assert_eq!(indices(&range_of(0.0, -1.0, true), 0).1, 0);
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(indices(&range_of(0.0, 100.0, true), 3), (0, 3, 1));
    }

    #[test]
    fn test_non_integer_bound_is_error() {
        let mut args = vec![Value::Null];
        assert!(range_indices(&mut args, &range_of(0.5, 2.0, true), 3).is_none());
        assert!(args[0].equals(&Value::string("Range start must be an integer.")));
    }
}
