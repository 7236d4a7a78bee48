//! Module for the instruction dispatch loop
//!
//! See <http://www.lua.org/source/5.3/lopcodes.h.html> for the instruction set

use std::rc::Rc;

use crate::constants::{LFIELDS_PER_FLUSH, LUA_MAXINTEGER, LUA_MININTEGER};
use crate::constants::opcodes::OpCode;
use crate::constants::types::{LUA_FLOAT, LUA_INT, UnpackedInstruction};
use crate::error::{ArithmeticError, ByteCodeError, CannotIndexTypeError, InvalidConcatenationError, LengthError, LuaError};
use crate::types::{CoerceFrom, LuaType};
use crate::types::value::function::{InstructionDisplay, LuaFunction, Prototype};
use crate::types::value::LuaValue;
use crate::types::value::number::{FloatToInt, LuaNumber};
use crate::types::value::string::LuaString;
use crate::types::value::table::{size_hint, LuaTable};
use crate::vm::arith::ArithOp;
use crate::vm::callinfo::{CallInfo, CallStatus, ResultCount};
use crate::vm::fetch;
use crate::vm::fetch::malformed;
use crate::vm::LuaVM;
use crate::vm::stack::StackIndex;

/// Runs the current frame until a frame marked [`CallStatus::FRESH`] returns
///
/// Calls and returns between Lua functions switch frames inside this loop
pub(super) fn execute(vm: &mut LuaVM) -> Result<(), LuaError> {
    'newframe: loop {
        let frame = vm.frames.current();
        let closure = match &frame.closure {
            Some(closure) => closure.clone(),
            None => unreachable!("dispatch loop entered without a Lua frame"),
        };
        let proto = closure.clone_prototype();
        let base = frame.base;

        loop {
            let pc = vm.frames.current().pc;
            let instruction = fetch::instruction(&proto, pc);
            vm.frames.current_mut().pc = pc + 1;
            if let Some(log) = &mut vm.tracing_log {
                match log.last_mut() {
                    Some((last_proto, pcs)) if Rc::ptr_eq(last_proto, &proto) => pcs.push(pc),
                    _ => log.push((proto.clone(), vec![pc])),
                }
            }

            let op = fetch::opcode(instruction);
            let UnpackedInstruction { a, b, c, bx, sbx, .. } = instruction.unpack();
            let ra = base + a;
            tracing::trace!(pc, depth = vm.frames.depth(), instruction = %InstructionDisplay { proto: &proto, index: pc, instruction });

            match op {
                OpCode::MOVE => {
                    let value = vm.stack[base + b].clone();
                    vm.stack[ra] = value;
                }
                OpCode::LOADK => vm.stack[ra] = fetch::constant(&proto, bx).clone(),
                OpCode::LOADKX => {
                    let extra = fetch::expect_instruction(&proto, pc + 1, OpCode::EXTRAARG);
                    vm.frames.current_mut().pc += 1;
                    vm.stack[ra] = fetch::constant(&proto, extra.unpack().ax).clone();
                }
                OpCode::LOADBOOL => {
                    vm.stack[ra] = LuaValue::from(b != 0);
                    if c != 0 {
                        jump(vm, 1);
                    }
                }
                OpCode::LOADNIL => vm.stack.fill_nil(ra, b + 1),
                OpCode::GETUPVAL => {
                    let value = fetch::upvalue(&closure, b).read(vm.stack.as_slice());
                    vm.stack[ra] = value;
                }
                OpCode::GETTABUP => {
                    let table = fetch::upvalue(&closure, b).read(vm.stack.as_slice());
                    let key = fetch::rk(&proto, &vm.stack, base, c);
                    let value = vm.index(&table, &key)?;
                    vm.stack[ra] = value;
                }
                OpCode::GETTABLE => {
                    let table = vm.stack[base + b].clone();
                    let key = fetch::rk(&proto, &vm.stack, base, c);
                    let value = vm.index(&table, &key)?;
                    vm.stack[ra] = value;
                }
                OpCode::SETTABUP => {
                    let table = fetch::upvalue(&closure, a).read(vm.stack.as_slice());
                    let key = fetch::rk(&proto, &vm.stack, base, b);
                    let value = fetch::rk(&proto, &vm.stack, base, c);
                    vm.new_index(&table, key, value)?;
                }
                OpCode::SETUPVAL => {
                    let value = vm.stack[ra].clone();
                    fetch::upvalue(&closure, b).write(vm.stack.as_mut_slice(), value);
                }
                OpCode::SETTABLE => {
                    let table = vm.stack[ra].clone();
                    let key = fetch::rk(&proto, &vm.stack, base, b);
                    let value = fetch::rk(&proto, &vm.stack, base, c);
                    vm.new_index(&table, key, value)?;
                }
                OpCode::NEWTABLE => vm.stack[ra] = LuaValue::from(LuaTable::with_capacity(size_hint(b), size_hint(c))),
                OpCode::SELF => {
                    let object = vm.stack[base + b].clone();
                    vm.stack[ra + 1] = object.clone();
                    let key = fetch::rk(&proto, &vm.stack, base, c);
                    let method = vm.index(&object, &key)?;
                    vm.stack[ra] = method;
                }
                OpCode::ADD => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Add)?,
                OpCode::SUB => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Sub)?,
                OpCode::MUL => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Mul)?,
                OpCode::MOD => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Mod)?,
                OpCode::POW => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Pow)?,
                OpCode::DIV => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Div)?,
                OpCode::IDIV => arith_rk(vm, &proto, base, ra, b, c, ArithOp::IDiv)?,
                OpCode::BAND => arith_rk(vm, &proto, base, ra, b, c, ArithOp::BAnd)?,
                OpCode::BOR => arith_rk(vm, &proto, base, ra, b, c, ArithOp::BOr)?,
                OpCode::BXOR => arith_rk(vm, &proto, base, ra, b, c, ArithOp::BXor)?,
                OpCode::SHL => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Shl)?,
                OpCode::SHR => arith_rk(vm, &proto, base, ra, b, c, ArithOp::Shr)?,
                OpCode::UNM => {
                    let operand = vm.stack[base + b].clone();
                    let result = vm.arith(ArithOp::Unm, &operand, &operand)?;
                    vm.stack[ra] = result;
                }
                OpCode::BNOT => {
                    let operand = vm.stack[base + b].clone();
                    let result = vm.arith(ArithOp::BNot, &operand, &operand)?;
                    vm.stack[ra] = result;
                }
                OpCode::NOT => {
                    let result = vm.stack[base + b].is_falsy();
                    vm.stack[ra] = LuaValue::from(result);
                }
                OpCode::LEN => {
                    let operand = vm.stack[base + b].clone();
                    let length = vm.length(&operand)?;
                    vm.stack[ra] = length;
                }
                OpCode::CONCAT => {
                    let operands = vm.stack.to_vec(base + b, base + c + 1);
                    let result = vm.concat(operands)?;
                    vm.stack[ra] = result;
                }
                OpCode::JMP => {
                    if a != 0 {
                        vm.upvalues.close(base + (a - 1), vm.stack.as_slice());
                    }
                    jump(vm, sbx);
                }
                OpCode::EQ => {
                    let lhs = fetch::rk(&proto, &vm.stack, base, b);
                    let rhs = fetch::rk(&proto, &vm.stack, base, c);
                    let result = vm.equal(&lhs, &rhs)?;
                    conditional_jump(vm, &proto, base, result == (a != 0));
                }
                OpCode::LT => {
                    let lhs = fetch::rk(&proto, &vm.stack, base, b);
                    let rhs = fetch::rk(&proto, &vm.stack, base, c);
                    let result = vm.less_than(&lhs, &rhs)?;
                    conditional_jump(vm, &proto, base, result == (a != 0));
                }
                OpCode::LE => {
                    let lhs = fetch::rk(&proto, &vm.stack, base, b);
                    let rhs = fetch::rk(&proto, &vm.stack, base, c);
                    let result = vm.less_equal(&lhs, &rhs)?;
                    conditional_jump(vm, &proto, base, result == (a != 0));
                }
                OpCode::TEST => {
                    let truthy = vm.stack[ra].is_truthy();
                    conditional_jump(vm, &proto, base, truthy == (c != 0));
                }
                OpCode::TESTSET => {
                    let value = vm.stack[base + b].clone();
                    if value.is_truthy() == (c != 0) {
                        vm.stack[ra] = value;
                        conditional_jump(vm, &proto, base, true);
                    } else {
                        conditional_jump(vm, &proto, base, false);
                    }
                }
                OpCode::CALL => {
                    if b != 0 {
                        vm.top = ra + b;
                    }
                    let results = ResultCount::from_operand(c);
                    if !vm.precall(ra, results, false)? {
                        continue 'newframe;
                    }
                    if let ResultCount::Fixed(_) = results {
                        vm.top = vm.frames.current().top;
                    }
                }
                OpCode::TAILCALL => {
                    if b != 0 {
                        vm.top = ra + b;
                    }
                    if !vm.precall(ra, ResultCount::Multret, true)? {
                        splice_tail_call(vm);
                        continue 'newframe;
                    }
                }
                OpCode::RETURN => {
                    vm.upvalues.close(base, vm.stack.as_slice());
                    let result_count = if b != 0 { b - 1 } else { vm.top - ra };
                    let fresh = vm.frames.current().status.contains(CallStatus::FRESH);
                    let fixed_results = vm.postcall(ra, result_count)?;
                    if fresh {
                        return Ok(());
                    }
                    if fixed_results {
                        vm.top = vm.frames.current().top;
                    }
                    continue 'newframe;
                }
                OpCode::FORLOOP => for_loop(vm, ra, sbx),
                OpCode::FORPREP => {
                    for_prep(vm, ra)?;
                    jump(vm, sbx);
                }
                OpCode::TFORCALL => {
                    let callee = ra + 3;
                    vm.stack.copy_down(ra, callee, 3);
                    vm.top = callee + 3;
                    vm.call(callee, ResultCount::Fixed(c))?;
                    vm.top = vm.frames.current().top;

                    let loop_pc = vm.frames.current().pc;
                    let next = fetch::expect_instruction(&proto, loop_pc, OpCode::TFORLOOP);
                    vm.frames.current_mut().pc = loop_pc + 1;
                    let UnpackedInstruction { a, sbx, .. } = next.unpack();
                    generic_for_loop(vm, base + a, sbx);
                }
                OpCode::TFORLOOP => generic_for_loop(vm, ra, sbx),
                OpCode::SETLIST => {
                    let count = match b {
                        0 => match vm.top.get().checked_sub(ra.get() + 1) {
                            Some(count) => count,
                            None => malformed(ByteCodeError::SetlistUnderflow),
                        },
                        count => count,
                    };
                    let block = match c {
                        0 => {
                            let extra = fetch::expect_instruction(&proto, pc + 1, OpCode::EXTRAARG);
                            vm.frames.current_mut().pc += 1;
                            extra.unpack().ax
                        }
                        block => block,
                    };
                    let table = match &vm.stack[ra] {
                        LuaValue::TABLE(table) => table.clone(),
                        other => malformed(ByteCodeError::SetlistTarget { found: other.type_name() }),
                    };
                    let first = match block.checked_sub(1) {
                        Some(block) => block * LFIELDS_PER_FLUSH,
                        None => malformed(ByteCodeError::SetlistUnderflow),
                    };
                    for i in 1..=count {
                        table.raw_set(first + i, vm.stack[ra + i].clone());
                    }
                    vm.top = vm.frames.current().top;
                }
                OpCode::CLOSURE => {
                    let child = fetch::prototype(&proto, bx).clone();
                    let upvalues = child.upvalue_descriptors.iter()
                        .map(|desc| if desc.in_stack() {
                            vm.upvalues.find_or_create(base + desc.index())
                        } else {
                            fetch::upvalue(&closure, desc.index()).clone()
                        })
                        .collect();
                    vm.stack[ra] = LuaValue::from(LuaFunction::new_lua(child, upvalues));
                }
                OpCode::VARARG => {
                    let func = vm.frames.current().func;
                    let vararg_count = (base - func).saturating_sub(proto.param_count as usize + 1);
                    let first_vararg = base - vararg_count;
                    let wanted = match b {
                        0 => {
                            vm.stack.ensure(ra + vararg_count)?;
                            vm.top = ra + vararg_count;
                            vararg_count
                        }
                        b => b - 1,
                    };
                    for offset in 0..wanted {
                        vm.stack[ra + offset] = if offset < vararg_count {
                            vm.stack[first_vararg + offset].clone()
                        } else {
                            LuaValue::NIL
                        };
                    }
                }
                OpCode::EXTRAARG => malformed(ByteCodeError::AttemptToExecuteExtraArg),
            }
        }
    }
}

/// Offsets the program counter of the current frame
fn jump(vm: &mut LuaVM, offset: isize) {
    let frame = vm.frames.current_mut();
    frame.pc = (frame.pc as isize + offset) as usize;
}

/// Executes the JMP following a test instruction if `condition` holds, skips it otherwise
fn conditional_jump(vm: &mut LuaVM, proto: &Prototype, base: StackIndex, condition: bool) {
    if !condition {
        jump(vm, 1);
        return;
    }
    let pc = vm.frames.current().pc;
    let next = fetch::expect_instruction(proto, pc, OpCode::JMP);
    let UnpackedInstruction { a, sbx, .. } = next.unpack();
    if a != 0 {
        vm.upvalues.close(base + (a - 1), vm.stack.as_slice());
    }
    jump(vm, sbx + 1);
}

fn arith_rk(vm: &mut LuaVM, proto: &Prototype, base: StackIndex, ra: StackIndex, b: usize, c: usize, op: ArithOp) -> Result<(), LuaError> {
    let lhs = fetch::rk(proto, &vm.stack, base, b);
    let rhs = fetch::rk(proto, &vm.stack, base, c);
    let result = vm.arith(op, &lhs, &rhs)?;
    vm.stack[ra] = result;
    Ok(())
}

/// Replaces the calling frame with the frame just entered by a tail call
fn splice_tail_call(vm: &mut LuaVM) {
    let callee = vm.frames.current().clone();
    let caller = match vm.frames.previous_mut() {
        Some(caller) => caller.clone(),
        None => unreachable!("tail call without a calling frame"),
    };
    let (max_stack_size, param_count) = match &callee.closure {
        Some(closure) => (closure.prototype().max_stack_size as usize, closure.prototype().param_count as usize),
        None => unreachable!("tail call entered a host frame"),
    };

    vm.upvalues.close(caller.base, vm.stack.as_slice());
    // Function and fixed parameters; For vararg functions this includes the varargs below the base
    let moved = (callee.base + param_count) - callee.func;
    vm.stack.copy_down(callee.func, caller.func, moved);

    let base = caller.func + (callee.base - callee.func);
    vm.top = caller.func + (vm.top - callee.func);
    let mut status = caller.status;
    status.insert(CallStatus::TAIL);
    vm.frames.collapse_into_caller(CallInfo {
        closure: callee.closure,
        func: caller.func,
        base,
        top: vm.top,
        pc: callee.pc,
        results: caller.results,
        status,
    });
    assert_eq!(vm.top, base + max_stack_size, "tail call frame does not match callee's stack size");
    tracing::debug!(depth = vm.frames.depth(), %base, "tail call");
}

/// Converts a for loop limit to an integer; Limits beyond the integer range clamp, `stop_now` marks limits that cannot be reached
///
/// Returns None if the limit is not a number
fn for_limit(limit: &LuaValue, step: LUA_INT) -> Option<(LUA_INT, bool)> {
    let number = LuaNumber::coerce_opt(limit)?;
    let mode = if step < 0 { FloatToInt::Ceil } else { FloatToInt::Floor };
    match number.to_int(mode) {
        Some(limit) => Some((limit, false)),
        None if 0.0 < number.as_float() => Some((LUA_MAXINTEGER, step < 0)),
        None => Some((LUA_MININTEGER, step >= 0)),
    }
}

fn for_prep(vm: &mut LuaVM, ra: StackIndex) -> Result<(), LuaError> {
    let init = vm.stack[ra].clone();
    let limit = vm.stack[ra + 1].clone();
    let step = vm.stack[ra + 2].clone();

    if let (LuaValue::NUMBER(LuaNumber::INT(init)), LuaValue::NUMBER(LuaNumber::INT(step))) = (&init, &step) {
        if *step == 0 {
            return Err(ArithmeticError::ForLoop("'for' step is zero").into());
        }
        if let Some((limit, stop_now)) = for_limit(&limit, *step) {
            let init = if stop_now { 0 } else { *init };
            vm.stack[ra + 1] = LuaValue::from(limit);
            vm.stack[ra] = LuaValue::from(init.wrapping_sub(*step));
            return Ok(());
        }
    }

    let limit = LUA_FLOAT::coerce_opt(&limit).ok_or(ArithmeticError::ForLoop("'for' limit must be a number"))?;
    let step = LUA_FLOAT::coerce_opt(&step).ok_or(ArithmeticError::ForLoop("'for' step must be a number"))?;
    let init = LUA_FLOAT::coerce_opt(&init).ok_or(ArithmeticError::ForLoop("'for' initial value must be a number"))?;
    if step == 0.0 {
        return Err(ArithmeticError::ForLoop("'for' step is zero").into());
    }
    vm.stack[ra + 1] = LuaValue::from(limit);
    vm.stack[ra + 2] = LuaValue::from(step);
    vm.stack[ra] = LuaValue::from(init - step);
    Ok(())
}

fn for_loop(vm: &mut LuaVM, ra: StackIndex, sbx: isize) {
    let index = match (&vm.stack[ra], &vm.stack[ra + 1], &vm.stack[ra + 2]) {
        (LuaValue::NUMBER(LuaNumber::INT(index)), LuaValue::NUMBER(LuaNumber::INT(limit)), LuaValue::NUMBER(LuaNumber::INT(step))) => {
            let index = index.wrapping_add(*step);
            let continues = if 0 < *step { index <= *limit } else { *limit <= index };
            continues.then(|| LuaValue::from(index))
        }
        (index, limit, step) => {
            let float = |value: &LuaValue| LUA_FLOAT::coerce_opt(value).unwrap_or(LUA_FLOAT::NAN);
            let (limit, step) = (float(limit), float(step));
            let index = float(index) + step;
            let continues = if 0.0 < step { index <= limit } else { limit <= index };
            continues.then(|| LuaValue::from(index))
        }
    };
    if let Some(index) = index {
        jump(vm, sbx);
        vm.stack[ra + 3] = index.clone();
        vm.stack[ra] = index;
    }
}

fn generic_for_loop(vm: &mut LuaVM, ra: StackIndex, sbx: isize) {
    let control = vm.stack[ra + 1].clone();
    if !control.is_nil() {
        vm.stack[ra] = control;
        jump(vm, sbx);
    }
}

fn is_concatenable(value: &LuaValue) -> bool {
    value.is_string() || value.is_number()
}

impl LuaVM {
    /// `obj[key]`, consulting the `index` hook when the raw lookup has no result
    pub fn index(&mut self, obj: &LuaValue, key: &LuaValue) -> Result<LuaValue, LuaError> {
        if let LuaValue::TABLE(table) = obj {
            let value = table.raw_get_value(key);
            if !value.is_nil() {
                return Ok(value);
            }
        }
        let hooks = self.hooks.clone();
        match hooks.index(self, obj, key)? {
            Some(value) => Ok(value),
            None if obj.is_table() => Ok(LuaValue::NIL),
            None => Err(CannotIndexTypeError { indexed_type: obj.type_name() }.into()),
        }
    }

    /// `obj[key] = value`; Existing table entries are overwritten directly, other assignments go through the `new_index` hook first
    pub fn new_index(&mut self, obj: &LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError> {
        if let LuaValue::TABLE(table) = obj {
            if !table.raw_get_value(&key).is_nil() {
                table.raw_set(key.try_key()?, value);
                return Ok(());
            }
        }
        let hooks = self.hooks.clone();
        if hooks.new_index(self, obj, &key, &value)? {
            return Ok(());
        }
        match obj {
            LuaValue::TABLE(table) => {
                table.raw_set(key.try_key()?, value);
                Ok(())
            }
            _ => Err(CannotIndexTypeError { indexed_type: obj.type_name() }.into()),
        }
    }

    /// `#value`
    pub fn length(&mut self, value: &LuaValue) -> Result<LuaValue, LuaError> {
        if let LuaValue::STRING(string) = value {
            return Ok(LuaValue::from(string.len()));
        }
        let hooks = self.hooks.clone();
        if let Some(length) = hooks.length(self, value)? {
            return Ok(length);
        }
        match value.raw_len() {
            Some(length) => Ok(LuaValue::from(length)),
            None => Err(LengthError { measured_type: value.type_name() }.into()),
        }
    }

    /// Concatenates `values` right to left; Runs of strings and numbers are joined at once, any other pair goes through the `concat` hook
    pub fn concat(&mut self, mut values: Vec<LuaValue>) -> Result<LuaValue, LuaError> {
        while values.len() > 1 {
            let last = values.len() - 1;
            if is_concatenable(&values[last - 1]) && is_concatenable(&values[last]) {
                let mut first = last - 1;
                while first > 0 && is_concatenable(&values[first - 1]) {
                    first -= 1;
                }
                let pieces: Vec<LuaString> = values.drain(first..)
                    .filter_map(|value| LuaString::coerce_opt(&value))
                    .collect();
                values.push(LuaValue::from(LuaString::concat(pieces.iter().map(LuaString::as_bytes))));
            } else {
                let rhs = values.pop().unwrap_or_default();
                let lhs = values.pop().unwrap_or_default();
                let hooks = self.hooks.clone();
                match hooks.concat(self, &lhs, &rhs)? {
                    Some(result) => values.push(result),
                    None => {
                        let blamed = if is_concatenable(&lhs) { &rhs } else { &lhs };
                        return Err(InvalidConcatenationError { concatenated_type: blamed.type_name() }.into());
                    }
                }
            }
        }
        Ok(values.pop().unwrap_or_default())
    }
}
