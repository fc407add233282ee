//! The runtime value model.
//!
//! A [`Value`] is either an immediate (null, boolean, number) or a
//! reference-counted heap object. Heap object kinds are a closed set of
//! variants rather than an open class hierarchy.

pub mod fiber;
pub mod object;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use fiber::{CallFrame, ObjFiber};
pub use object::{
    FnCode, MapKey, Method, ModuleVariable, ObjClass, ObjClosure, ObjFn, ObjInstance, ObjList,
    ObjMap, ObjModule, ObjRange, ObjUpvalue, UpvalueState,
};

pub type ClassRef = Rc<RefCell<ObjClass>>;
pub type ClosureRef = Rc<ObjClosure>;
pub type FiberRef = Rc<RefCell<ObjFiber>>;
pub type FnRef = Rc<ObjFn>;
pub type InstanceRef = Rc<RefCell<ObjInstance>>;
pub type ListRef = Rc<RefCell<ObjList>>;
pub type MapRef = Rc<RefCell<ObjMap>>;
pub type ModuleRef = Rc<RefCell<ObjModule>>;

/// Any runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// Placeholder for a declared-but-undefined module variable. Never
    /// observable from the language.
    Undefined,
    Bool(bool),
    Num(f64),
    Str(Rc<String>),
    Range(Rc<ObjRange>),
    List(ListRef),
    Map(MapRef),
    Fn(FnRef),
    Closure(ClosureRef),
    Class(ClassRef),
    Instance(InstanceRef),
    Fiber(FiberRef),
    Module(ModuleRef),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    /// Only `false` and `null` are falsy.
    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Undefined => "Undefined",
            Value::Bool(_) => "Bool",
            Value::Num(_) => "Num",
            Value::Str(_) => "String",
            Value::Range(_) => "Range",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Fn(_) | Value::Closure(_) => "Fn",
            Value::Class(_) => "Class",
            Value::Instance(_) => "Instance",
            Value::Fiber(_) => "Fiber",
            Value::Module(_) => "Module",
        }
    }

    /// Built-in equality. Immutable values (null, bools, numbers, strings,
    /// ranges) compare by content; everything else by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Range(a), Value::Range(b)) => {
                a.from == b.from && a.to == b.to && a.is_inclusive == b.is_inclusive
            }
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Fn(a), Value::Fn(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Fiber(a), Value::Fiber(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Format a number the way the language prints it: integer-valued doubles
/// have no fractional part, everything else is the shortest round-trip form.
pub fn num_to_string(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 {
            "infinity".to_string()
        } else {
            "-infinity".to_string()
        };
    }
    if n == n.trunc() && n.abs() < 9.007_199_254_740_992e15 {
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format(n).to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => write!(f, "{}", num_to_string(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Range(r) => write!(f, "{}", r),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, element) in list.borrow().elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => write!(f, "<map ({} entries)>", map.borrow().len()),
            Value::Fn(_) | Value::Closure(_) => write!(f, "<fn>"),
            Value::Class(class) => write!(f, "{}", class.borrow().name),
            Value::Instance(instance) => {
                write!(f, "instance of {}", instance.borrow().class.borrow().name)
            }
            Value::Fiber(_) => write!(f, "<fiber>"),
            Value::Module(_) => write!(f, "<module>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_to_string_integers() {
        assert_eq!(num_to_string(3.0), "3");
        assert_eq!(num_to_string(-14.0), "-14");
        assert_eq!(num_to_string(0.0), "0");
    }

    #[test]
    fn test_num_to_string_fractions() {
        assert_eq!(num_to_string(3.5), "3.5");
        assert_eq!(num_to_string(0.25), "0.25");
    }

    #[test]
    fn test_num_to_string_special() {
        assert_eq!(num_to_string(f64::NAN), "nan");
        assert_eq!(num_to_string(f64::INFINITY), "infinity");
        assert_eq!(num_to_string(f64::NEG_INFINITY), "-infinity");
    }

    #[test]
    fn test_falsiness() {
        assert!(Value::Null.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(!Value::Bool(true).is_falsy());
        assert!(!Value::Num(0.0).is_falsy());
        assert!(!Value::string("").is_falsy());
    }

    #[test]
    fn test_equality_by_content() {
        assert!(Value::Num(2.0).equals(&Value::Num(2.0)));
        assert!(Value::string("a").equals(&Value::string("a")));
        assert!(!Value::string("a").equals(&Value::string("b")));
        assert!(!Value::Num(1.0).equals(&Value::Bool(true)));
    }

    #[test]
    fn test_equality_by_identity() {
        let a = Rc::new(RefCell::new(ObjList::default()));
        let b = Rc::new(RefCell::new(ObjList::default()));
        assert!(Value::List(a.clone()).equals(&Value::List(a.clone())));
        assert!(!Value::List(a).equals(&Value::List(b)));
    }
}
