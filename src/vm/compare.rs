//! Module for equality and order comparisons
//!
//! See <https://www.lua.org/manual/5.3/manual.html#3.4.4> for Lua's comparison rules

use std::cmp::Ordering;

use crate::constants::types::{LUA_FLOAT, LUA_INT};
use crate::error::{CannotCompareError, LuaError};
use crate::types::LuaType;
use crate::types::value::LuaValue;
use crate::types::value::number::{float_to_int, FloatToInt, LuaNumber};
use crate::vm::callinfo::CallStatus;
use crate::vm::LuaVM;

/// Largest magnitude below which every integer has an exact float representation
const FLOAT_EXACT_INT: LUA_INT = 1 << LUA_FLOAT::MANTISSA_DIGITS;

fn int_fits_float(int: LUA_INT) -> bool {
    (-FLOAT_EXACT_INT..=FLOAT_EXACT_INT).contains(&int)
}

/// `int < float`
fn lt_int_float(int: LUA_INT, float: LUA_FLOAT) -> bool {
    if int_fits_float(int) {
        (int as LUA_FLOAT) < float
    } else {
        // int < float  <=>  int < ceil(float)
        match float_to_int(float, FloatToInt::Ceil) {
            Some(ceil) => int < ceil,
            None => float > 0.0,
        }
    }
}

/// `int <= float`
fn le_int_float(int: LUA_INT, float: LUA_FLOAT) -> bool {
    if int_fits_float(int) {
        (int as LUA_FLOAT) <= float
    } else {
        match float_to_int(float, FloatToInt::Floor) {
            Some(floor) => int <= floor,
            None => float > 0.0,
        }
    }
}

/// `float < int`
fn lt_float_int(float: LUA_FLOAT, int: LUA_INT) -> bool {
    if int_fits_float(int) {
        float < (int as LUA_FLOAT)
    } else {
        match float_to_int(float, FloatToInt::Floor) {
            Some(floor) => floor < int,
            None => float < 0.0,
        }
    }
}

/// `float <= int`
fn le_float_int(float: LUA_FLOAT, int: LUA_INT) -> bool {
    if int_fits_float(int) {
        float <= (int as LUA_FLOAT)
    } else {
        match float_to_int(float, FloatToInt::Ceil) {
            Some(ceil) => ceil <= int,
            None => float < 0.0,
        }
    }
}

/// Exact `lhs < rhs` on numbers of mixed subtypes; Comparisons with NaN are false
pub fn number_less_than(lhs: LuaNumber, rhs: LuaNumber) -> bool {
    match (lhs, rhs) {
        (LuaNumber::INT(l), LuaNumber::INT(r)) => l < r,
        (LuaNumber::FLOAT(l), LuaNumber::FLOAT(r)) => l < r,
        (LuaNumber::INT(l), LuaNumber::FLOAT(r)) => lt_int_float(l, r),
        (LuaNumber::FLOAT(l), LuaNumber::INT(r)) => lt_float_int(l, r),
    }
}

/// Exact `lhs <= rhs` on numbers of mixed subtypes; Comparisons with NaN are false
pub fn number_less_equal(lhs: LuaNumber, rhs: LuaNumber) -> bool {
    match (lhs, rhs) {
        (LuaNumber::INT(l), LuaNumber::INT(r)) => l <= r,
        (LuaNumber::FLOAT(l), LuaNumber::FLOAT(r)) => l <= r,
        (LuaNumber::INT(l), LuaNumber::FLOAT(r)) => le_int_float(l, r),
        (LuaNumber::FLOAT(l), LuaNumber::INT(r)) => le_float_int(l, r),
    }
}

/// Raw order of two numbers or two strings, None for any other pair
fn raw_order(lhs: &LuaValue, rhs: &LuaValue, less_equal: bool) -> Option<bool> {
    match (lhs, rhs) {
        (LuaValue::NUMBER(l), LuaValue::NUMBER(r)) => Some(if less_equal { number_less_equal(*l, *r) } else { number_less_than(*l, *r) }),
        (LuaValue::STRING(l), LuaValue::STRING(r)) => {
            let ordering = l.cmp(r);
            Some(ordering == Ordering::Less || (less_equal && ordering == Ordering::Equal))
        }
        _ => None,
    }
}

impl LuaVM {
    /// `lhs == rhs`, consulting the `equal` hook for distinct tables and distinct userdata
    pub fn equal(&mut self, lhs: &LuaValue, rhs: &LuaValue) -> Result<bool, LuaError> {
        match (lhs, rhs) {
            (LuaValue::TABLE(l), LuaValue::TABLE(r)) if l != r => {}
            (LuaValue::USERDATA(l), LuaValue::USERDATA(r)) if l != r => {}
            _ => return Ok(lhs == rhs),
        }
        let hooks = self.hooks.clone();
        Ok(hooks.equal(self, lhs, rhs)?.unwrap_or(false))
    }

    /// `lhs < rhs`
    pub fn less_than(&mut self, lhs: &LuaValue, rhs: &LuaValue) -> Result<bool, LuaError> {
        if let Some(result) = raw_order(lhs, rhs, false) {
            return Ok(result);
        }
        let hooks = self.hooks.clone();
        match hooks.less_than(self, lhs, rhs)? {
            Some(result) => Ok(result),
            None => Err(CannotCompareError { lhs_type: lhs.type_name(), rhs_type: rhs.type_name() }.into()),
        }
    }

    /// `lhs <= rhs`; Without a `less_equal` hook result, evaluates `not (rhs < lhs)` through the `less_than` hook
    pub fn less_equal(&mut self, lhs: &LuaValue, rhs: &LuaValue) -> Result<bool, LuaError> {
        if let Some(result) = raw_order(lhs, rhs, true) {
            return Ok(result);
        }
        let hooks = self.hooks.clone();
        if let Some(result) = hooks.less_equal(self, lhs, rhs)? {
            return Ok(result);
        }

        self.frames.current_mut().status.insert(CallStatus::LEQ);
        let swapped = hooks.less_than(self, rhs, lhs);
        self.frames.current_mut().status.remove(CallStatus::LEQ);
        match swapped? {
            Some(result) => Ok(!result),
            None => Err(CannotCompareError { lhs_type: lhs.type_name(), rhs_type: rhs.type_name() }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::types::{LUA_FLOAT, LUA_INT};
    use crate::error::LuaErrorKind;
    use crate::types::value::LuaValue;
    use crate::types::value::number::LuaNumber;
    use crate::types::value::table::LuaTable;
    use crate::vm::compare::{number_less_equal, number_less_than};
    use crate::vm::LuaVM;

    #[test]
    fn mixed_number_order() {
        let big = LuaNumber::INT(LUA_INT::MAX);
        let two_63 = LuaNumber::FLOAT(9223372036854775808.0);
        assert!(number_less_than(big, two_63));
        assert!(!number_less_than(two_63, big));
        assert!(number_less_equal(LuaNumber::INT((1 << 53) + 1), LuaNumber::FLOAT(9007199254740994.0)));
        assert!(!number_less_than(LuaNumber::INT((1 << 53) + 1), LuaNumber::FLOAT(9007199254740992.0)));
        assert!(number_less_than(LuaNumber::FLOAT(-LUA_FLOAT::INFINITY), LuaNumber::INT(LUA_INT::MIN)));
        assert!(number_less_equal(LuaNumber::INT(1), LuaNumber::FLOAT(1.0)));
    }

    #[test]
    fn nan_is_unordered() {
        let nan = LuaNumber::FLOAT(LUA_FLOAT::NAN);
        for other in [LuaNumber::INT(0), LuaNumber::INT(LUA_INT::MAX), LuaNumber::FLOAT(0.0), nan] {
            assert!(!number_less_than(nan, other));
            assert!(!number_less_than(other, nan));
            assert!(!number_less_equal(nan, other));
            assert!(!number_less_equal(other, nan));
        }
    }

    #[test]
    fn string_order_is_bytewise() {
        let mut vm = LuaVM::new();
        assert!(vm.less_than(&"a".into(), &"b".into()).unwrap());
        assert!(vm.less_than(&"Z".into(), &"a".into()).unwrap());
        assert!(vm.less_than(&"ab".into(), &"abc".into()).unwrap());
        assert!(vm.less_equal(&"abc".into(), &"abc".into()).unwrap());
        assert!(!vm.less_than(&"b\u{0}".into(), &"b".into()).unwrap());
    }

    #[test]
    fn equality() {
        let mut vm = LuaVM::new();
        let table = LuaValue::from(LuaTable::empty());
        assert!(vm.equal(&1i64.into(), &(1.0 as LUA_FLOAT).into()).unwrap());
        assert!(!vm.equal(&3i64.into(), &(3.5 as LUA_FLOAT).into()).unwrap());
        assert!(!vm.equal(&"1".into(), &1i64.into()).unwrap());
        assert!(vm.equal(&table, &table.clone()).unwrap());
        assert!(!vm.equal(&table, &LuaTable::empty().into()).unwrap());
        assert!(!vm.equal(&LuaValue::from(LUA_FLOAT::NAN), &LuaValue::from(LUA_FLOAT::NAN)).unwrap());
    }

    #[test]
    fn mixed_types_cannot_be_ordered() {
        let mut vm = LuaVM::new();
        let error = vm.less_than(&1i64.into(), &"2".into()).unwrap_err();
        assert!(matches!(error.kind(), LuaErrorKind::CannotCompare(_)));
        assert_eq!(error.to_string(), "attempt to compare number with string");
        let error = vm.less_equal(&LuaTable::empty().into(), &LuaTable::empty().into()).unwrap_err();
        assert_eq!(error.to_string(), "attempt to compare two table values");
    }
}
