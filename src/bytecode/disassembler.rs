//! Bytecode disassembler for debugging.

use std::fmt::Write;

use crate::bytecode::instruction::Op;
use crate::bytecode::read_u16;
use crate::value::{ObjFn, Value};
use crate::vm::Vm;

/// Disassemble a compiled function, and recursively every function in its
/// constant pool, into human-readable text.
pub fn disassemble_fn(vm: &Vm, func: &ObjFn) -> String {
    let mut output = String::new();
    disassemble_into(vm, func, &mut output);
    output
}

fn disassemble_into(vm: &Vm, func: &ObjFn, output: &mut String) {
    let name = if func.name.is_empty() {
        "<fn>"
    } else {
        &func.name
    };
    let _ = writeln!(output, "== {} (arity: {}) ==", name, func.arity);

    let code = func.code.borrow();
    let mut offset = 0;
    while offset < code.bytecode.len() {
        offset = disassemble_instruction(vm, &code.bytecode, &code.constants, func, offset, output);
    }

    for constant in &code.constants {
        if let Value::Fn(nested) = constant {
            let _ = writeln!(output);
            disassemble_into(vm, nested, output);
        }
    }
}

fn disassemble_instruction(
    vm: &Vm,
    bytecode: &[u8],
    constants: &[Value],
    func: &ObjFn,
    offset: usize,
    output: &mut String,
) -> usize {
    let _ = write!(output, "{:04} ", offset);

    let line = func.line_at(offset).unwrap_or(0);
    if offset > 0 && Some(line) == func.line_at(offset - 1) {
        let _ = write!(output, "   | ");
    } else {
        let _ = write!(output, "{:4} ", line);
    }

    let byte = bytecode[offset];
    let Some(op) = Op::from_u8(byte) else {
        let _ = writeln!(output, "Unknown opcode {}", byte);
        return offset + 1;
    };

    if let Some(arity) = op.call_arity() {
        let symbol = read_u16(bytecode, offset + 1) as usize;
        let name = vm.method_name(symbol).unwrap_or("?");
        if op.is_super_call() {
            let constant = read_u16(bytecode, offset + 3);
            let _ = writeln!(
                output,
                "{:?} {} (super slot {})",
                op, name, constant
            );
            return offset + 5;
        }
        let _ = writeln!(output, "{:?} {} ({} args)", op, name, arity);
        return offset + 3;
    }

    match op {
        Op::Constant => {
            let index = read_u16(bytecode, offset + 1) as usize;
            let rendering = constants
                .get(index)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string());
            let _ = writeln!(output, "{:?} {} ({})", op, index, rendering);
            offset + 3
        }

        Op::Closure => {
            let index = read_u16(bytecode, offset + 1) as usize;
            let num_upvalues = match constants.get(index) {
                Some(Value::Fn(nested)) => nested.num_upvalues,
                _ => 0,
            };
            let _ = write!(output, "{:?} {}", op, index);
            let mut cursor = offset + 3;
            for _ in 0..num_upvalues {
                let is_local = bytecode[cursor];
                let slot = bytecode[cursor + 1];
                let _ = write!(
                    output,
                    " {}:{}",
                    if is_local != 0 { "local" } else { "upvalue" },
                    slot
                );
                cursor += 2;
            }
            let _ = writeln!(output);
            cursor
        }

        _ => match op.operand_bytes() {
            Some(0) => {
                let _ = writeln!(output, "{:?}", op);
                offset + 1
            }
            Some(1) => {
                let _ = writeln!(output, "{:?} {}", op, bytecode[offset + 1]);
                offset + 2
            }
            Some(2) => {
                let _ = writeln!(output, "{:?} {}", op, read_u16(bytecode, offset + 1));
                offset + 3
            }
            Some(4) => {
                let _ = writeln!(
                    output,
                    "{:?} {} {}",
                    op,
                    read_u16(bytecode, offset + 1),
                    read_u16(bytecode, offset + 3)
                );
                offset + 5
            }
            _ => {
                let _ = writeln!(output, "{:?}", op);
                offset + 1
            }
        },
    }
}
