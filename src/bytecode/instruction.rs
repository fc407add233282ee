//! Bytecode instruction set for the Wisplang VM.

/// Opcodes for the bytecode virtual machine.
///
/// The instruction stream is byte-oriented: an opcode followed by 0, 1, 2, or
/// 4 operand bytes. All 16-bit operands are big-endian. Call and super-call
/// opcodes are split by arity so the interpreter never decodes a separate
/// arity operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Load the constant at index [arg:u16].
    Constant = 0,
    /// Push null onto the stack.
    Null,
    /// Push false onto the stack.
    False,
    /// Push true onto the stack.
    True,

    // Push the value in the given local slot. The single-byte forms cover
    // the common low slots without an operand.
    LoadLocal0,
    LoadLocal1,
    LoadLocal2,
    LoadLocal3,
    LoadLocal4,
    LoadLocal5,
    LoadLocal6,
    LoadLocal7,
    LoadLocal8,

    /// Push the value in local slot [arg:u8].
    LoadLocal,
    /// Store the top of stack in local slot [arg:u8]. Does not pop.
    StoreLocal,
    /// Push the value in upvalue [arg:u8].
    LoadUpvalue,
    /// Store the top of stack in upvalue [arg:u8]. Does not pop.
    StoreUpvalue,
    /// Push the module-level variable in slot [arg:u16].
    LoadModuleVar,
    /// Store the top of stack in module-level variable slot [arg:u16].
    /// Does not pop.
    StoreModuleVar,
    /// Push the value of field [arg:u8] of the receiver in slot zero. Used
    /// for field accesses directly inside methods.
    LoadFieldThis,
    /// Store the top of stack in field [arg:u8] of the receiver in slot
    /// zero. Does not pop.
    StoreFieldThis,
    /// Pop an instance and push the value of its field [arg:u8].
    LoadField,
    /// Pop an instance and store the subsequent top of stack in its field
    /// [arg:u8]. Does not pop the value.
    StoreField,

    /// Pop and discard the top of stack.
    Pop,
    /// Push a copy of the top of stack.
    Dup,

    // Invoke the method with symbol [arg:u16]. The opcode encodes the number
    // of arguments (not counting the receiver).
    Call0,
    Call1,
    Call2,
    Call3,
    Call4,
    Call5,
    Call6,
    Call7,
    Call8,
    Call9,
    Call10,
    Call11,
    Call12,
    Call13,
    Call14,
    Call15,
    Call16,

    // Invoke a superclass method with symbol [arg1:u16]. [arg2:u16] is a
    // constant slot that method binding patches with the statically-known
    // superclass.
    Super0,
    Super1,
    Super2,
    Super3,
    Super4,
    Super5,
    Super6,
    Super7,
    Super8,
    Super9,
    Super10,
    Super11,
    Super12,
    Super13,
    Super14,
    Super15,
    Super16,

    /// Jump the instruction pointer [arg:u16] forward.
    Jump,
    /// Jump the instruction pointer [arg:u16] backward.
    Loop,
    /// Pop, and if not truthy jump [arg:u16] forward.
    JumpIf,
    /// If the top of stack is falsy, jump [arg:u16] forward; otherwise pop
    /// and continue.
    And,
    /// If the top of stack is truthy, jump [arg:u16] forward; otherwise pop
    /// and continue.
    Or,

    /// Close the upvalue for the local on the top of the stack, then pop it.
    CloseUpvalue,
    /// Exit the current function, returning the value on the top of stack.
    Return,
    /// Create a closure for the function at constant [arg:u16]. Followed by
    /// two bytes per upvalue: is-local flag, then local/upvalue index.
    Closure,
    /// Replace the class in the frame's receiver slot with a new,
    /// null-initialized instance of it. Only emitted inside synthesized
    /// metaclass constructors.
    Construct,
    /// Create a class. Top of stack is the superclass, below it the name
    /// string. [arg:u8] is the number of fields declared by this class.
    Class,
    /// Define a method for symbol [arg:u16]. The class is popped from the
    /// stack, then the function defining the body.
    MethodInstance,
    /// Define a static method for symbol [arg:u16] on the class's metaclass.
    MethodStatic,
    /// Import the module named by string constant [arg:u16], switching to a
    /// fiber that runs its body on first load.
    LoadModule,
    /// Push the variable [arg2:u16 constant] from module [arg1:u16 constant],
    /// or generate a runtime error if absent.
    ImportVariable,

    /// Marks the end of bytecode. Always preceded by `Return`, so it never
    /// executes; inside a loop body it doubles as the `break` placeholder
    /// until the loop end is known.
    End,
}

/// Highest parameter count a method call can have.
pub const MAX_PARAMETERS: usize = 16;

impl Op {
    /// Convert from a raw byte.
    pub fn from_u8(byte: u8) -> Option<Op> {
        if byte <= Op::End as u8 {
            // Safe: Op is repr(u8) with contiguous discriminants 0..=End.
            Some(unsafe { std::mem::transmute::<u8, Op>(byte) })
        } else {
            None
        }
    }

    /// The call opcode for `arity` arguments.
    pub fn call(arity: usize) -> Op {
        debug_assert!(arity <= MAX_PARAMETERS);
        // Safe: Call0..=Call16 are contiguous.
        unsafe { std::mem::transmute::<u8, Op>(Op::Call0 as u8 + arity as u8) }
    }

    /// The super-call opcode for `arity` arguments.
    pub fn super_call(arity: usize) -> Op {
        debug_assert!(arity <= MAX_PARAMETERS);
        unsafe { std::mem::transmute::<u8, Op>(Op::Super0 as u8 + arity as u8) }
    }

    /// For a call opcode, the number of arguments it passes (not counting the
    /// receiver).
    pub fn call_arity(self) -> Option<usize> {
        let byte = self as u8;
        if (Op::Call0 as u8..=Op::Call16 as u8).contains(&byte) {
            Some((byte - Op::Call0 as u8) as usize)
        } else if (Op::Super0 as u8..=Op::Super16 as u8).contains(&byte) {
            Some((byte - Op::Super0 as u8) as usize)
        } else {
            None
        }
    }

    pub fn is_super_call(self) -> bool {
        (Op::Super0 as u8..=Op::Super16 as u8).contains(&(self as u8))
    }

    /// The number of operand bytes following this opcode, for every
    /// fixed-width instruction. `Closure` is variable-width (two bytes for
    /// the function constant plus two per captured upvalue) and returns
    /// `None`; callers scanning bytecode must consult the function constant.
    pub fn operand_bytes(self) -> Option<usize> {
        let byte = self as u8;
        if (Op::Call0 as u8..=Op::Call16 as u8).contains(&byte) {
            return Some(2);
        }
        if (Op::Super0 as u8..=Op::Super16 as u8).contains(&byte) {
            return Some(4);
        }
        if (Op::LoadLocal0 as u8..=Op::LoadLocal8 as u8).contains(&byte) {
            return Some(0);
        }

        match self {
            Op::Null
            | Op::False
            | Op::True
            | Op::Pop
            | Op::Dup
            | Op::CloseUpvalue
            | Op::Return
            | Op::Construct
            | Op::End => Some(0),

            Op::LoadLocal
            | Op::StoreLocal
            | Op::LoadUpvalue
            | Op::StoreUpvalue
            | Op::LoadFieldThis
            | Op::StoreFieldThis
            | Op::LoadField
            | Op::StoreField
            | Op::Class => Some(1),

            Op::Constant
            | Op::LoadModuleVar
            | Op::StoreModuleVar
            | Op::Jump
            | Op::Loop
            | Op::JumpIf
            | Op::And
            | Op::Or
            | Op::MethodInstance
            | Op::MethodStatic
            | Op::LoadModule => Some(2),

            Op::ImportVariable => Some(4),

            Op::Closure => None,

            // Handled by the range checks above.
            _ => Some(0),
        }
    }
}

impl From<Op> for u8 {
    fn from(op: Op) -> u8 {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=Op::End as u8 {
            let op = Op::from_u8(byte).expect("valid opcode");
            assert_eq!(byte, op as u8);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert!(Op::from_u8(255).is_none());
    }

    #[test]
    fn test_call_arity() {
        assert_eq!(Op::call(0), Op::Call0);
        assert_eq!(Op::call(16), Op::Call16);
        assert_eq!(Op::Call3.call_arity(), Some(3));
        assert_eq!(Op::super_call(2), Op::Super2);
        assert_eq!(Op::Super2.call_arity(), Some(2));
        assert!(Op::Super2.is_super_call());
        assert!(!Op::Call2.is_super_call());
        assert_eq!(Op::Pop.call_arity(), None);
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(Op::Pop.operand_bytes(), Some(0));
        assert_eq!(Op::LoadLocal.operand_bytes(), Some(1));
        assert_eq!(Op::Constant.operand_bytes(), Some(2));
        assert_eq!(Op::Call7.operand_bytes(), Some(2));
        assert_eq!(Op::Super7.operand_bytes(), Some(4));
        assert_eq!(Op::ImportVariable.operand_bytes(), Some(4));
        assert_eq!(Op::Closure.operand_bytes(), None);
    }
}
