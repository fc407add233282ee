//! Fibers: cooperative coroutines with their own operand and call stacks.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::object::ObjUpvalue;
use crate::value::{FiberRef, Value};

/// One activation record on a fiber's call stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Offset of the next instruction to execute in the function's bytecode.
    pub ip: usize,
    /// The `Fn` or `Closure` being executed.
    pub func: Value,
    /// Index of the first stack slot used by this frame: the receiver,
    /// followed by parameters, then locals and temporaries.
    pub stack_start: usize,
}

/// A cooperative coroutine. A fiber owns its operand stack, call-frame stack
/// and open-upvalue list; no other fiber ever touches them.
#[derive(Debug)]
pub struct ObjFiber {
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,

    /// Open upvalues addressing this fiber's stack, sorted by ascending
    /// slot. Slots are indices, never pointers, so stack growth cannot
    /// invalidate them.
    pub open_upvalues: Vec<Rc<ObjUpvalue>>,

    /// The fiber that ran this one; control resumes there on yield or
    /// completion. May be `None`.
    pub caller: Option<FiberRef>,

    /// True if the caller invoked this fiber with `try()`, in which case an
    /// error transfers to the caller instead of aborting interpretation.
    pub caller_is_trying: bool,

    /// The error that failed this fiber, if it failed.
    pub error: Option<Value>,
}

impl ObjFiber {
    /// Create a fiber ready to invoke `func` (an `Fn` or `Closure`).
    pub fn new(func: Value) -> FiberRef {
        Rc::new(RefCell::new(Self {
            stack: Vec::new(),
            frames: vec![CallFrame {
                ip: 0,
                func,
                stack_start: 0,
            }],
            open_upvalues: Vec::new(),
            caller: None,
            caller_is_trying: false,
            error: None,
        }))
    }

    /// A fiber is done once its last frame has returned.
    pub fn is_done(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    pub fn drop_top(&mut self) {
        self.stack.pop();
    }

    pub fn peek(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Null)
    }

    pub fn peek2(&self) -> Value {
        if self.stack.len() < 2 {
            Value::Null
        } else {
            self.stack[self.stack.len() - 2].clone()
        }
    }

    pub fn dup(&mut self) {
        let top = self.peek();
        self.push(top);
    }

    /// Overwrite the top of the stack, where a suspended call expects its
    /// result to appear.
    pub fn set_return_value(&mut self, value: Value) {
        if let Some(top) = self.stack.last_mut() {
            *top = value;
        }
    }

    /// Push a frame invoking `func`, whose `num_args` arguments (receiver
    /// included) are already on top of the stack.
    pub fn call_function(&mut self, func: Value, num_args: usize) {
        let stack_start = self.stack.len() - num_args;
        self.frames.push(CallFrame {
            ip: 0,
            func,
            stack_start,
        });
    }

    /// Capture the local in `slot` as an upvalue. Reuses an existing open
    /// upvalue for the slot so every closure over one local shares one
    /// upvalue object.
    pub fn capture_upvalue(&mut self, slot: usize) -> Rc<ObjUpvalue> {
        for upvalue in &self.open_upvalues {
            if upvalue.is_open_at(slot) {
                return upvalue.clone();
            }
        }

        let created = Rc::new(ObjUpvalue::open(slot));
        let position = self
            .open_upvalues
            .iter()
            .position(|uv| uv.open_slot() > Some(slot))
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(position, created.clone());
        created
    }

    /// Close every open upvalue pointing at `from_slot` or above, hoisting
    /// the captured values out of the stack.
    pub fn close_upvalues(&mut self, from_slot: usize) {
        let stack = &self.stack;
        self.open_upvalues.retain(|upvalue| {
            if let Some(slot) = upvalue.open_slot() {
                if slot >= from_slot {
                    upvalue.close(stack.get(slot).cloned().unwrap_or(Value::Null));
                    return false;
                }
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_fiber() -> ObjFiber {
        ObjFiber {
            stack: Vec::new(),
            frames: Vec::new(),
            open_upvalues: Vec::new(),
            caller: None,
            caller_is_trying: false,
            error: None,
        }
    }

    #[test]
    fn test_capture_shares_upvalue_identity() {
        let mut fiber = dummy_fiber();
        fiber.push(Value::Num(1.0));

        let a = fiber.capture_upvalue(0);
        let b = fiber.capture_upvalue(0);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(fiber.open_upvalues.len(), 1);
    }

    #[test]
    fn test_open_upvalues_stay_sorted() {
        let mut fiber = dummy_fiber();
        for i in 0..4 {
            fiber.push(Value::Num(i as f64));
        }
        fiber.capture_upvalue(2);
        fiber.capture_upvalue(0);
        fiber.capture_upvalue(3);

        let slots: Vec<_> = fiber
            .open_upvalues
            .iter()
            .map(|uv| uv.open_slot())
            .collect();
        assert_eq!(slots, vec![Some(0), Some(2), Some(3)]);
    }

    #[test]
    fn test_close_upvalues_hoists_values() {
        let mut fiber = dummy_fiber();
        fiber.push(Value::Num(10.0));
        fiber.push(Value::Num(20.0));

        let low = fiber.capture_upvalue(0);
        let high = fiber.capture_upvalue(1);

        fiber.close_upvalues(1);
        assert!(low.open_slot().is_some());
        assert!(high.open_slot().is_none());
        assert!(high.load(&fiber.stack).equals(&Value::Num(20.0)));

        // A write to a closed upvalue hits the hoisted value, not the stack.
        high.store(&mut fiber.stack, Value::Num(21.0));
        assert!(high.load(&fiber.stack).equals(&Value::Num(21.0)));
        assert!(fiber.stack[1].equals(&Value::Num(20.0)));
    }

    #[test]
    fn test_call_function_sets_stack_start() {
        let mut fiber = dummy_fiber();
        fiber.push(Value::Null);
        fiber.push(Value::Num(1.0));
        fiber.push(Value::Num(2.0));

        fiber.call_function(Value::Null, 2);
        assert_eq!(fiber.frames.len(), 1);
        assert_eq!(fiber.frames[0].stack_start, 1);
    }
}
