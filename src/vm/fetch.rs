//! Module to isolate Lua VM value-retrieval functions
//!
//! Out-of-range operands indicate malformed bytecode, retrieval panics instead of returning an error

use std::rc::Rc;

use crate::constants::opcodes::OpCode;
use crate::constants::types::{index_k, is_k, LUA_INSTRUCTION};
use crate::error::ByteCodeError;
use crate::types::upvalue::Upvalue;
use crate::types::value::function::{LuaClosure, Prototype};
use crate::types::value::LuaValue;
use crate::vm::stack::{RegisterStack, StackIndex};

/// Aborts execution of malformed bytecode
#[cold]
#[inline(never)]
pub(crate) fn malformed(error: ByteCodeError) -> ! {
    tracing::error!(%error, "malformed bytecode");
    panic!("malformed bytecode: {}", error)
}

/// Retrieves instruction at `pc`
#[inline(always)]
pub(super) fn instruction(proto: &Prototype, pc: usize) -> LUA_INSTRUCTION {
    match proto.code.get(pc) {
        Some(instruction) => *instruction,
        None => malformed(ByteCodeError::ProgramCounterOutOfBounds { counter: pc, code_length: proto.code.len() }),
    }
}

/// Decodes the opcode of an instruction
#[inline(always)]
pub(super) fn opcode(instruction: LUA_INSTRUCTION) -> OpCode {
    match instruction.op() {
        Some(op) => op,
        None => malformed(ByteCodeError::UnknownOpcode { opcode: instruction.opcode() }),
    }
}

/// Retrieves the instruction at `pc`, which must have the `expected` opcode
pub(super) fn expect_instruction(proto: &Prototype, pc: usize, expected: OpCode) -> LUA_INSTRUCTION {
    let found = instruction(proto, pc);
    if found.opcode() != expected as u8 {
        malformed(ByteCodeError::ExpectedOpcode { expected: expected.name(), found: found.opcode_name() })
    }
    found
}

/// Retrieves constant
pub(super) fn constant(proto: &Prototype, index: usize) -> &LuaValue {
    match proto.constants.get(index) {
        Some(value) => value,
        None => malformed(ByteCodeError::ConstantIndexOutOfBounds { index, constants_length: proto.constants.len() }),
    }
}

/// Retrieves register or constant, used by instructions that can access either a register or constant
pub(super) fn rk(proto: &Prototype, stack: &RegisterStack, base: StackIndex, operand: usize) -> LuaValue {
    if is_k(operand) {
        constant(proto, index_k(operand)).clone()
    } else {
        stack[base + operand].clone()
    }
}

/// Retrieves upvalue of the running closure
pub(super) fn upvalue(closure: &LuaClosure, upvalue_index: usize) -> &Upvalue {
    let upvalues = closure.upvalues();
    match upvalues.get(upvalue_index) {
        Some(upvalue) => upvalue,
        None => malformed(ByteCodeError::UpvalueIndexOutOfBounds { upvalue_index, upvalues_length: upvalues.len() }),
    }
}

/// Retrieves nested prototype
pub(super) fn prototype(proto: &Prototype, prototype_index: usize) -> &Rc<Prototype> {
    match proto.functions.get(prototype_index) {
        Some(prototype) => prototype,
        None => malformed(ByteCodeError::PrototypeIndexOutOfBounds { prototype_index, prototype_len: proto.functions.len() }),
    }
}
