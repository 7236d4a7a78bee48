//! Module for metamethod dispatch
//!
//! The dispatch loop performs raw operations itself and consults a [`MetamethodHooks`] implementation only when the raw operation does not apply.
//! [`StandardMetamethods`] resolves the hooks through metatables; [`RawOperations`] declines every hook, leaving only raw semantics.
//!
//! See <https://www.lua.org/manual/5.3/manual.html#2.4> for details on metatables and metamethods

use crate::constants::MAX_TAG_LOOP;
use crate::error::{CannotIndexTypeError, IndexChainTooLongError, LuaError};
use crate::types::LuaType;
use crate::types::value::LuaValue;
use crate::vm::arith::ArithOp;
use crate::vm::LuaVM;

/// Fallbacks for operations that have no raw result
///
/// Every hook returns `None` (or `false`) to decline, after which the VM raises the matching error. Errors returned from a hook propagate unchanged.
pub trait MetamethodHooks {
    /// `obj[key]` where `obj` is not a table, or the table has no value for `key`
    fn index(&self, vm: &mut LuaVM, obj: &LuaValue, key: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        let _ = (vm, obj, key);
        Ok(None)
    }

    /// `obj[key] = value` where `obj` is not a table, or the table has no value for `key`; Returns true if the assignment was handled
    fn new_index(&self, vm: &mut LuaVM, obj: &LuaValue, key: &LuaValue, value: &LuaValue) -> Result<bool, LuaError> {
        let _ = (vm, obj, key, value);
        Ok(false)
    }

    /// `lhs == rhs` for two distinct tables, or two distinct userdata
    fn equal(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        let _ = (vm, lhs, rhs);
        Ok(None)
    }

    /// `lhs < rhs` for operands that are not two numbers or two strings
    fn less_than(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        let _ = (vm, lhs, rhs);
        Ok(None)
    }

    /// `lhs <= rhs` for operands that are not two numbers or two strings; When declined, the VM retries as `not (rhs < lhs)`
    fn less_equal(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        let _ = (vm, lhs, rhs);
        Ok(None)
    }

    /// Arithmetic or bitwise operation on operands without a raw result; Unary operators receive their operand twice
    fn arith(&self, vm: &mut LuaVM, op: ArithOp, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        let _ = (vm, op, lhs, rhs);
        Ok(None)
    }

    /// `#value`; Consulted for tables before the raw length, and for every type besides strings
    fn length(&self, vm: &mut LuaVM, value: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        let _ = (vm, value);
        Ok(None)
    }

    /// `lhs .. rhs` where either operand is not a string or number
    fn concat(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        let _ = (vm, lhs, rhs);
        Ok(None)
    }

    /// Handler to call in place of a value that is not a function; The value is passed as the handler's first argument
    fn call_handler(&self, vm: &mut LuaVM, value: &LuaValue) -> Option<LuaValue> {
        let _ = (vm, value);
        None
    }
}

/// Raw operations only; Every hook declines
#[derive(Debug, Copy, Clone, Default)]
pub struct RawOperations;

impl MetamethodHooks for RawOperations {}

/// Lua's metatable-driven metamethods
#[derive(Debug, Copy, Clone, Default)]
pub struct StandardMetamethods;

impl StandardMetamethods {
    /// Metamethod of the first operand, or else of the second operand
    fn binary_handler(vm: &LuaVM, event: &'static str, lhs: &LuaValue, rhs: &LuaValue) -> Option<LuaValue> {
        lhs.index_metatable(event, &vm.metatables).not_nil()
            .or_else(|| rhs.index_metatable(event, &vm.metatables).not_nil())
    }

    /// Calls `handler`, truncating it's results to one value
    fn call_once(vm: &mut LuaVM, handler: LuaValue, args: &[LuaValue]) -> Result<LuaValue, LuaError> {
        Ok(vm.call_function(handler, args)?.into_first())
    }

    fn binary(vm: &mut LuaVM, event: &'static str, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        match StandardMetamethods::binary_handler(vm, event, lhs, rhs) {
            Some(handler) => {
                tracing::trace!(event, "calling metamethod");
                Ok(Some(StandardMetamethods::call_once(vm, handler, &[lhs.clone(), rhs.clone()])?))
            }
            None => Ok(None),
        }
    }
}

impl MetamethodHooks for StandardMetamethods {
    fn index(&self, vm: &mut LuaVM, obj: &LuaValue, key: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        let mut current = obj.clone();
        for depth in 0..MAX_TAG_LOOP {
            if depth > 0 {
                if let LuaValue::TABLE(table) = &current {
                    let value = table.raw_get_value(key);
                    if !value.is_nil() {
                        return Ok(Some(value));
                    }
                }
            }
            let handler = current.index_metatable("__index", &vm.metatables);
            match handler {
                LuaValue::NIL if depth == 0 => return Ok(None),
                LuaValue::NIL => return match current {
                    LuaValue::TABLE(_) => Ok(Some(LuaValue::NIL)),
                    _ => Err(CannotIndexTypeError { indexed_type: current.type_name() }.into()),
                },
                LuaValue::FUNCTION(_) => {
                    return Ok(Some(StandardMetamethods::call_once(vm, handler, &[current, key.clone()])?));
                }
                _ => current = handler,
            }
        }
        Err(IndexChainTooLongError { event: "__index" }.into())
    }

    fn new_index(&self, vm: &mut LuaVM, obj: &LuaValue, key: &LuaValue, value: &LuaValue) -> Result<bool, LuaError> {
        let mut current = obj.clone();
        for depth in 0..MAX_TAG_LOOP {
            if depth > 0 {
                if let LuaValue::TABLE(table) = &current {
                    if !table.raw_get_value(key).is_nil() {
                        table.raw_set(key.clone().try_key()?, value.clone());
                        return Ok(true);
                    }
                }
            }
            let handler = current.index_metatable("__newindex", &vm.metatables);
            match handler {
                LuaValue::NIL if depth == 0 => return Ok(false),
                LuaValue::NIL => return match &current {
                    LuaValue::TABLE(table) => {
                        table.raw_set(key.clone().try_key()?, value.clone());
                        Ok(true)
                    }
                    _ => Err(CannotIndexTypeError { indexed_type: current.type_name() }.into()),
                },
                LuaValue::FUNCTION(_) => {
                    vm.call_function(handler, &[current, key.clone(), value.clone()])?;
                    return Ok(true);
                }
                _ => current = handler,
            }
        }
        Err(IndexChainTooLongError { event: "__newindex" }.into())
    }

    fn equal(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        Ok(StandardMetamethods::binary(vm, "__eq", lhs, rhs)?.map(|result| result.is_truthy()))
    }

    fn less_than(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        Ok(StandardMetamethods::binary(vm, "__lt", lhs, rhs)?.map(|result| result.is_truthy()))
    }

    fn less_equal(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<bool>, LuaError> {
        Ok(StandardMetamethods::binary(vm, "__le", lhs, rhs)?.map(|result| result.is_truthy()))
    }

    fn arith(&self, vm: &mut LuaVM, op: ArithOp, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        StandardMetamethods::binary(vm, op.event(), lhs, rhs)
    }

    fn length(&self, vm: &mut LuaVM, value: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        match value.index_metatable("__len", &vm.metatables).not_nil() {
            Some(handler) => Ok(Some(StandardMetamethods::call_once(vm, handler, &[value.clone(), value.clone()])?)),
            None => Ok(None),
        }
    }

    fn concat(&self, vm: &mut LuaVM, lhs: &LuaValue, rhs: &LuaValue) -> Result<Option<LuaValue>, LuaError> {
        StandardMetamethods::binary(vm, "__concat", lhs, rhs)
    }

    fn call_handler(&self, vm: &mut LuaVM, value: &LuaValue) -> Option<LuaValue> {
        value.index_metatable("__call", &vm.metatables).not_nil()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LuaErrorKind;
    use crate::types::value::LuaValue;
    use crate::types::value::table::LuaTable;
    use crate::vm::hooks::{MetamethodHooks, RawOperations, StandardMetamethods};
    use crate::vm::LuaVM;

    #[test]
    fn index_follows_table_chain() {
        let mut vm = LuaVM::new();
        let base = LuaTable::of_map([("answer", 42i64)]);
        let middle = LuaTable::empty();
        middle.set_metatable(Some(LuaTable::of_map([("__index", base)])));
        let object = LuaTable::empty();
        object.set_metatable(Some(LuaTable::of_map([("__index", middle)])));

        let found = StandardMetamethods.index(&mut vm, &object.clone().into(), &"answer".into()).unwrap();
        assert_eq!(found, Some(LuaValue::from(42i64)));
        let missing = StandardMetamethods.index(&mut vm, &object.into(), &"other".into()).unwrap();
        assert_eq!(missing, Some(LuaValue::NIL));
    }

    #[test]
    fn index_without_metatable_declines() {
        let mut vm = LuaVM::new();
        assert_eq!(StandardMetamethods.index(&mut vm, &LuaTable::empty().into(), &1i64.into()).unwrap(), None);
        assert_eq!(StandardMetamethods.index(&mut vm, &true.into(), &1i64.into()).unwrap(), None);
        assert_eq!(RawOperations.index(&mut vm, &LuaTable::empty().into(), &1i64.into()).unwrap(), None);
    }

    #[test]
    fn index_loop_is_detected() {
        let mut vm = LuaVM::new();
        let table = LuaTable::empty();
        let metatable = LuaTable::empty();
        metatable.raw_set("__index", table.clone());
        table.set_metatable(Some(metatable));

        let error = StandardMetamethods.index(&mut vm, &table.into(), &"key".into()).unwrap_err();
        assert!(matches!(error.kind(), LuaErrorKind::IndexChainTooLong(_)));
        assert_eq!(error.to_string(), "'__index' chain too long; possible loop");
    }

    #[test]
    fn new_index_redirects_to_table() {
        let mut vm = LuaVM::new();
        let storage = LuaTable::empty();
        let proxy = LuaTable::empty();
        proxy.set_metatable(Some(LuaTable::of_map([("__newindex", storage.clone())])));

        assert!(StandardMetamethods.new_index(&mut vm, &proxy.clone().into(), &"x".into(), &7i64.into()).unwrap());
        assert_eq!(storage.raw_get("x"), LuaValue::from(7i64));
        assert_eq!(proxy.raw_get("x"), LuaValue::NIL);

        let error = StandardMetamethods.new_index(&mut vm, &proxy.into(), &LuaValue::NIL, &1i64.into()).unwrap_err();
        assert_eq!(error.to_string(), "table index is nil");
    }
}
