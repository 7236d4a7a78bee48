//! Module for arithmetic on Lua values
//!
//! See <https://www.lua.org/manual/5.3/manual.html#3.4.1> for Lua's arithmetic rules

use crate::constants::opcodes::OpCode;
use crate::constants::types::{LUA_FLOAT, LUA_INT};
use crate::error::{ArithmeticError, LuaError};
use crate::types::{CoerceFrom, LuaType};
use crate::types::value::LuaValue;
use crate::types::value::number::{LuaNumber, shift_left};
use crate::vm::LuaVM;

/// Arithmetic and bitwise operators
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

impl ArithOp {
    /// Operator of an arithmetic opcode, None for other opcodes
    pub fn from_opcode(op: OpCode) -> Option<ArithOp> {
        Some(match op {
            OpCode::ADD => ArithOp::Add,
            OpCode::SUB => ArithOp::Sub,
            OpCode::MUL => ArithOp::Mul,
            OpCode::MOD => ArithOp::Mod,
            OpCode::POW => ArithOp::Pow,
            OpCode::DIV => ArithOp::Div,
            OpCode::IDIV => ArithOp::IDiv,
            OpCode::BAND => ArithOp::BAnd,
            OpCode::BOR => ArithOp::BOr,
            OpCode::BXOR => ArithOp::BXor,
            OpCode::SHL => ArithOp::Shl,
            OpCode::SHR => ArithOp::Shr,
            OpCode::UNM => ArithOp::Unm,
            OpCode::BNOT => ArithOp::BNot,
            _ => return None,
        })
    }

    /// Metamethod name for this operator
    pub fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
            ArithOp::Div => "__div",
            ArithOp::IDiv => "__idiv",
            ArithOp::BAnd => "__band",
            ArithOp::BOr => "__bor",
            ArithOp::BXor => "__bxor",
            ArithOp::Shl => "__shl",
            ArithOp::Shr => "__shr",
            ArithOp::Unm => "__unm",
            ArithOp::BNot => "__bnot",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr | ArithOp::BNot)
    }
}

/// Applies `op` without metamethods
///
/// Unary operators ignore `rhs`. Returns `Ok(None)` if an operand is not a number, or not convertible to one; These fall through to the `__add`.. metamethods
pub fn arith_raw(op: ArithOp, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, ArithmeticError> {
    if op.is_bitwise() {
        let (l, r) = match (LUA_INT::coerce_opt(lhs), LUA_INT::coerce_opt(rhs)) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(None),
        };
        let result = match op {
            ArithOp::BAnd => l & r,
            ArithOp::BOr => l | r,
            ArithOp::BXor => l ^ r,
            ArithOp::Shl => shift_left(l, r),
            ArithOp::Shr => shift_left(l, r.wrapping_neg()),
            _ => !l,
        };
        return Ok(Some(LuaValue::from(result)));
    }

    // Integer arithmetic only for operands that are integers without coercion, everything else is converted to float
    let (l, r) = match (lhs, rhs) {
        (LuaValue::NUMBER(l @ LuaNumber::INT(_)), LuaValue::NUMBER(r @ LuaNumber::INT(_))) => (*l, *r),
        _ => match (LUA_FLOAT::coerce_opt(lhs), LUA_FLOAT::coerce_opt(rhs)) {
            (Some(l), Some(r)) => (LuaNumber::FLOAT(l), LuaNumber::FLOAT(r)),
            _ => return Ok(None),
        }
    };
    let result = match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Mod => l.modulo(r).ok_or(ArithmeticError::ModuloByZero)?,
        ArithOp::Pow => l.pow(r),
        ArithOp::Div => l.div(r),
        ArithOp::IDiv => l.floor_div(r).ok_or(ArithmeticError::DivideByZero)?,
        ArithOp::Unm => -l,
        _ => unreachable!("bitwise operators are handled above"),
    };
    Ok(Some(LuaValue::from(result)))
}

fn is_numeric(value: &LuaValue) -> bool {
    LuaNumber::coerce_opt(value).is_some()
}

/// Error for operands that neither [`arith_raw`] nor a metamethod could handle
///
/// Blames the first operand that is not a number or numeric string
pub fn arith_error(op: ArithOp, lhs: &LuaValue, rhs: &LuaValue) -> ArithmeticError {
    let blamed = if is_numeric(lhs) { rhs } else { lhs };
    if op.is_bitwise() {
        if lhs.is_number() && rhs.is_number() {
            ArithmeticError::NoIntegerRepresentation
        } else {
            ArithmeticError::Bitwise { operand_type: blamed.type_name() }
        }
    } else {
        ArithmeticError::NonNumeric { operand_type: blamed.type_name() }
    }
}

impl LuaVM {
    /// Applies `op`, falling back to the `arith` hook for operands that are not numbers
    pub fn arith(&mut self, op: ArithOp, lhs: &LuaValue, rhs: &LuaValue) -> Result<LuaValue, LuaError> {
        if let Some(result) = arith_raw(op, lhs, rhs)? {
            return Ok(result);
        }
        let hooks = self.hooks.clone();
        match hooks.arith(self, op, lhs, rhs)? {
            Some(result) => Ok(result),
            None => Err(arith_error(op, lhs, rhs).into()),
        }
    }
}
