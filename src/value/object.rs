//! Heap object kinds.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{ClassRef, FnRef, ModuleRef, Value};
use crate::vm::PrimitiveFn;

/// Most module variables a single module can hold.
pub const MAX_MODULE_VARS: usize = 65536;

/// The executable body of a function: bytecode plus its constant pool.
///
/// Wrapped in a `RefCell` on [`ObjFn`] only so that method binding can
/// rewrite field offsets and patch super-call slots when the function is
/// attached to its class; the code is never mutated after that.
#[derive(Debug)]
pub struct FnCode {
    pub bytecode: Vec<u8>,
    pub constants: Vec<Value>,
}

/// A compiled function. A raw `ObjFn` can be invoked directly if it captures
/// no upvalues; otherwise the compiler wraps it in an [`ObjClosure`].
#[derive(Debug)]
pub struct ObjFn {
    pub code: RefCell<FnCode>,
    pub num_upvalues: usize,
    pub arity: usize,
    /// The module this function was compiled against.
    pub module: ModuleRef,

    // Debug information.
    pub name: String,
    pub source_path: String,
    /// Source line for each bytecode byte.
    pub source_lines: Vec<u32>,
}

impl ObjFn {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        module: ModuleRef,
        constants: Vec<Value>,
        num_upvalues: usize,
        arity: usize,
        bytecode: Vec<u8>,
        source_path: String,
        name: String,
        source_lines: Vec<u32>,
    ) -> Self {
        Self {
            code: RefCell::new(FnCode {
                bytecode,
                constants,
            }),
            num_upvalues,
            arity,
            module,
            name,
            source_path,
            source_lines,
        }
    }

    /// The source line of the bytecode at `ip`, if debug info covers it.
    pub fn line_at(&self, ip: usize) -> Option<u32> {
        self.source_lines.get(ip).copied()
    }
}

/// A function plus the environment it closed over.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: FnRef,
    /// Filled by the `Closure` instruction right after creation.
    pub upvalues: RefCell<Vec<Rc<ObjUpvalue>>>,
}

impl ObjClosure {
    pub fn new(function: FnRef) -> Self {
        let count = function.num_upvalues;
        Self {
            function,
            upvalues: RefCell::new(Vec::with_capacity(count)),
        }
    }
}

/// A captured variable, shared by every closure that closes over the same
/// local. While the local lives on its fiber's stack the upvalue is open and
/// addresses it by slot index; when the local's frame returns, the value is
/// hoisted into the upvalue itself.
#[derive(Debug)]
pub struct ObjUpvalue {
    pub state: RefCell<UpvalueState>,
}

#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

impl ObjUpvalue {
    pub fn open(slot: usize) -> Self {
        Self {
            state: RefCell::new(UpvalueState::Open(slot)),
        }
    }

    pub fn open_slot(&self) -> Option<usize> {
        match *self.state.borrow() {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }

    pub fn is_open_at(&self, slot: usize) -> bool {
        self.open_slot() == Some(slot)
    }

    /// Hoist `value` out of the stack into the upvalue.
    pub fn close(&self, value: Value) {
        *self.state.borrow_mut() = UpvalueState::Closed(value);
    }

    pub fn load(&self, stack: &[Value]) -> Value {
        match &*self.state.borrow() {
            UpvalueState::Open(slot) => stack[*slot].clone(),
            UpvalueState::Closed(value) => value.clone(),
        }
    }

    pub fn store(&self, stack: &mut [Value], value: Value) {
        match &mut *self.state.borrow_mut() {
            UpvalueState::Open(slot) => stack[*slot] = value,
            UpvalueState::Closed(closed) => *closed = value,
        }
    }
}

/// A method bound in a class's method table.
#[derive(Clone)]
pub enum Method {
    /// Host-provided method invoked directly by the interpreter loop.
    Primitive(PrimitiveFn),
    /// A user-defined method: an `Fn` or `Closure` value.
    Block(Value),
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Primitive(_) => write!(f, "Method::Primitive"),
            Method::Block(value) => write!(f, "Method::Block({})", value.type_name()),
        }
    }
}

/// A class or metaclass.
#[derive(Debug)]
pub struct ObjClass {
    pub name: String,
    pub superclass: Option<ClassRef>,
    /// The class of this class object: the metaclass for ordinary classes,
    /// `Class` itself for metaclasses. `None` only during bootstrap.
    pub class_obj: Option<ClassRef>,
    /// Total number of fields, including inherited ones.
    pub num_fields: usize,
    /// Method table indexed by global method symbol.
    pub methods: Vec<Option<Method>>,
    /// Sealed classes cannot be inherited from; set on the built-in types.
    pub is_sealed: bool,
}

impl ObjClass {
    /// Create a "raw" class with no metaclass or superclass. Only used while
    /// bootstrapping `Object` and `Class`, which are special.
    pub fn raw(name: impl Into<String>, num_fields: usize) -> ClassRef {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            superclass: None,
            class_obj: None,
            num_fields,
            methods: Vec::new(),
            is_sealed: false,
        }))
    }

    /// Create a class together with its metaclass, two-phase: both objects
    /// are allocated first, then the cross-references are wired.
    pub fn new(
        superclass: &ClassRef,
        num_fields: usize,
        name: impl Into<String>,
        class_class: &ClassRef,
    ) -> ClassRef {
        let name = name.into();

        let metaclass = ObjClass::raw(format!("{} metaclass", name), 0);
        metaclass.borrow_mut().class_obj = Some(class_class.clone());
        // Metaclasses always inherit Class and do not parallel the
        // non-metaclass hierarchy.
        metaclass.borrow_mut().bind_superclass(class_class);

        let class = ObjClass::raw(name, num_fields);
        class.borrow_mut().class_obj = Some(metaclass);
        class.borrow_mut().bind_superclass(superclass);
        class
    }

    /// Make `superclass` this class's superclass and inherit its methods.
    /// Must be called before any methods are defined on this class.
    pub fn bind_superclass(&mut self, superclass: &ClassRef) {
        self.superclass = Some(superclass.clone());

        let sc = superclass.borrow();
        // Include the superclass in the total number of fields.
        self.num_fields += sc.num_fields;
        // Copy down the inherited method table.
        self.methods = sc.methods.clone();
    }

    pub fn bind_method(&mut self, symbol: usize, method: Method) {
        if symbol >= self.methods.len() {
            self.methods.resize(symbol + 1, None);
        }
        self.methods[symbol] = Some(method);
    }

    pub fn lookup_method(&self, symbol: usize) -> Option<Method> {
        self.methods.get(symbol).and_then(|m| m.clone())
    }

    /// The number of fields this class itself declared, not counting
    /// inherited ones.
    pub fn own_fields(&self) -> usize {
        let inherited = self
            .superclass
            .as_ref()
            .map(|sc| sc.borrow().num_fields)
            .unwrap_or(0);
        self.num_fields - inherited
    }
}

/// An object instance: a class reference plus one value slot per field.
#[derive(Debug)]
pub struct ObjInstance {
    pub class: ClassRef,
    pub fields: Vec<Value>,
}

impl ObjInstance {
    pub fn new(class: ClassRef) -> Self {
        let num_fields = class.borrow().num_fields;
        Self {
            class,
            fields: vec![Value::Null; num_fields],
        }
    }
}

/// A growable list of values.
#[derive(Debug, Default)]
pub struct ObjList {
    pub elements: Vec<Value>,
}

impl ObjList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
        }
    }
}

/// A numeric range with an inclusive or exclusive end.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjRange {
    pub from: f64,
    pub to: f64,
    pub is_inclusive: bool,
}

impl ObjRange {
    pub fn new(from: f64, to: f64, is_inclusive: bool) -> Self {
        Self {
            from,
            to,
            is_inclusive,
        }
    }

    pub fn min(&self) -> f64 {
        self.from.min(self.to)
    }

    pub fn max(&self) -> f64 {
        self.from.max(self.to)
    }
}

impl fmt::Display for ObjRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            crate::value::num_to_string(self.from),
            if self.is_inclusive { ".." } else { "..." },
            crate::value::num_to_string(self.to)
        )
    }
}

/// A key in a map. Only immutable values and identity-keyed classes/fibers
/// are hashable.
#[derive(Debug, Clone)]
pub enum MapKey {
    Null,
    Bool(bool),
    /// The bit pattern of the number, with -0.0 canonicalized to 0.0.
    Num(u64),
    Str(Rc<String>),
    Range(u64, u64, bool),
    Class(ClassRef),
    Fiber(crate::value::FiberRef),
}

impl MapKey {
    /// Convert a value to a key, or `None` if the value is not hashable.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Null => Some(MapKey::Null),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Num(n) => Some(MapKey::Num(canonical_bits(*n))),
            Value::Str(s) => Some(MapKey::Str(s.clone())),
            Value::Range(r) => Some(MapKey::Range(
                canonical_bits(r.from),
                canonical_bits(r.to),
                r.is_inclusive,
            )),
            Value::Class(c) => Some(MapKey::Class(c.clone())),
            Value::Fiber(fb) => Some(MapKey::Fiber(fb.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Null => Value::Null,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Num(bits) => Value::Num(f64::from_bits(*bits)),
            MapKey::Str(s) => Value::Str(s.clone()),
            MapKey::Range(from, to, inclusive) => Value::Range(Rc::new(ObjRange::new(
                f64::from_bits(*from),
                f64::from_bits(*to),
                *inclusive,
            ))),
            MapKey::Class(c) => Value::Class(c.clone()),
            MapKey::Fiber(fb) => Value::Fiber(fb.clone()),
        }
    }
}

fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapKey::Null, MapKey::Null) => true,
            (MapKey::Bool(a), MapKey::Bool(b)) => a == b,
            (MapKey::Num(a), MapKey::Num(b)) => a == b,
            (MapKey::Str(a), MapKey::Str(b)) => a == b,
            (MapKey::Range(af, at, ai), MapKey::Range(bf, bt, bi)) => {
                af == bf && at == bt && ai == bi
            }
            (MapKey::Class(a), MapKey::Class(b)) => Rc::ptr_eq(a, b),
            (MapKey::Fiber(a), MapKey::Fiber(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            MapKey::Null => 0u8.hash(state),
            MapKey::Bool(b) => (1u8, b).hash(state),
            MapKey::Num(bits) => (2u8, bits).hash(state),
            MapKey::Str(s) => (3u8, s.as_str()).hash(state),
            MapKey::Range(from, to, inclusive) => (4u8, from, to, inclusive).hash(state),
            MapKey::Class(c) => (5u8, Rc::as_ptr(c) as usize).hash(state),
            MapKey::Fiber(fb) => (6u8, Rc::as_ptr(fb) as usize).hash(state),
        }
    }
}

/// An insertion-ordered hash table from hashable values to values.
#[derive(Debug, Default)]
pub struct ObjMap {
    entries: IndexMap<MapKey, Value, ahash::RandomState>,
}

impl ObjMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`. Returns `Undefined` when absent so callers can tell
    /// "missing" apart from a stored null.
    pub fn get(&self, key: &MapKey) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Undefined)
    }

    pub fn set(&mut self, key: MapKey, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &MapKey) -> Value {
        // shift_remove keeps insertion order stable for the iteration
        // protocol.
        self.entries.shift_remove(key).unwrap_or(Value::Null)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn key_at(&self, index: usize) -> Option<Value> {
        self.entries.get_index(index).map(|(k, _)| k.to_value())
    }

    pub fn value_at(&self, index: usize) -> Option<Value> {
        self.entries.get_index(index).map(|(_, v)| v.clone())
    }
}

/// A top-level variable defined in a module. `Undefined` marks a variable
/// that has been implicitly declared (used before its definition) but not
/// yet defined.
#[derive(Debug, Clone)]
pub struct ModuleVariable {
    pub name: String,
    pub value: Value,
}

/// A loaded module and the top-level variables it defines.
#[derive(Debug)]
pub struct ObjModule {
    /// `None` for the implicit core module.
    pub name: Option<String>,
    pub variables: Vec<ModuleVariable>,
}

impl ObjModule {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            variables: Vec::new(),
        }
    }

    pub fn find_variable(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_field_inheritance() {
        let object = ObjClass::raw("Object", 0);
        let class_class = ObjClass::raw("Class", 0);

        let a = ObjClass::new(&object, 1, "A", &class_class);
        assert_eq!(a.borrow().num_fields, 1);

        let b = ObjClass::new(&a, 1, "B", &class_class);
        assert_eq!(b.borrow().num_fields, 2);
        assert_eq!(b.borrow().own_fields(), 1);
    }

    #[test]
    fn test_method_table_copy_down() {
        let object = ObjClass::raw("Object", 0);
        let class_class = ObjClass::raw("Class", 0);

        let a = ObjClass::new(&object, 0, "A", &class_class);
        a.borrow_mut()
            .bind_method(3, Method::Block(Value::string("a method")));

        let b = ObjClass::new(&a, 0, "B", &class_class);
        assert!(b.borrow().lookup_method(3).is_some());
        assert!(b.borrow().lookup_method(2).is_none());

        // Overriding in the subclass leaves the superclass untouched.
        b.borrow_mut()
            .bind_method(3, Method::Block(Value::string("b method")));
        match a.borrow().lookup_method(3) {
            Some(Method::Block(Value::Str(s))) => assert_eq!(s.as_str(), "a method"),
            other => panic!("unexpected method: {:?}", other),
        };
    }

    #[test]
    fn test_metaclass_wiring() {
        let object = ObjClass::raw("Object", 0);
        let class_class = ObjClass::raw("Class", 0);

        let a = ObjClass::new(&object, 0, "A", &class_class);
        let metaclass = a.borrow().class_obj.clone().expect("metaclass");
        assert_eq!(metaclass.borrow().name, "A metaclass");
        let meta_class_obj = metaclass.borrow().class_obj.clone().expect("class of meta");
        assert!(Rc::ptr_eq(&meta_class_obj, &class_class));
    }

    #[test]
    fn test_map_keys() {
        let mut map = ObjMap::default();
        map.set(
            MapKey::from_value(&Value::Num(1.0)).expect("hashable"),
            Value::string("one"),
        );
        map.set(
            MapKey::from_value(&Value::string("k")).expect("hashable"),
            Value::Num(2.0),
        );

        assert_eq!(map.len(), 2);
        let got = map.get(&MapKey::from_value(&Value::Num(1.0)).expect("hashable"));
        assert!(got.equals(&Value::string("one")));

        // Negative zero and zero are one key.
        map.set(
            MapKey::from_value(&Value::Num(-0.0)).expect("hashable"),
            Value::Num(9.0),
        );
        let got = map.get(&MapKey::from_value(&Value::Num(0.0)).expect("hashable"));
        assert!(got.equals(&Value::Num(9.0)));

        // Lists are not hashable.
        assert!(MapKey::from_value(&Value::List(Rc::new(RefCell::new(ObjList::default())))).is_none());
    }

    #[test]
    fn test_map_insertion_order() {
        let mut map = ObjMap::default();
        for i in 0..4 {
            map.set(
                MapKey::from_value(&Value::Num(i as f64)).expect("hashable"),
                Value::Num((i * 10) as f64),
            );
        }
        assert!(map.key_at(2).expect("key").equals(&Value::Num(2.0)));
        assert!(map.value_at(3).expect("value").equals(&Value::Num(30.0)));
    }
}
