//! Top level module for the value types the VM operates on
//!
//! See [`value`] module (and submodules) for Lua value types

use crate::constants::types::{LUA_FLOAT, LUA_INT};
use crate::error::CannotCoerceError;
use crate::types::value::LuaValue;
use crate::types::value::number::{FloatToInt, LuaNumber};

pub mod varargs;
pub mod value;
pub mod upvalue;

/// Lua-visible name of a rust type, used in error messages
pub trait LuaType: 'static {
    /// Name of the implementing type; Types wrapping several Lua types, such as [`LuaValue`], use "value"
    const TYPE_NAME: &'static str;

    /// Name of this value's type as Lua's `type()` would report it
    ///
    /// Types wrapping several Lua types override this to name the wrapped type; E.g. a LuaValue::TABLE is a "table"
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

impl LuaType for bool {
    const TYPE_NAME: &'static str = "boolean";
}

impl LuaType for LUA_INT {
    const TYPE_NAME: &'static str = "integer";
}

impl LuaType for LUA_FLOAT {
    const TYPE_NAME: &'static str = "float";
}

/// Identity of reference values; Two values with the same "Lua pointer" are the same object
pub(crate) trait AsLuaPointer {
    fn as_lua_pointer(&self) -> usize;
}

#[inline(always)]
pub(self) fn ref_to_pointer<T: ?Sized>(rf: &T) -> usize {
    rf as *const T as *const () as usize
}

/// Lua's implicit conversions between value types
///
/// See <https://www.lua.org/manual/5.3/manual.html#3.4.3>
pub trait CoerceFrom<T: Into<LuaValue> + Clone>: LuaType + Sized {
    /// Converts `value`, or None if it has no representation as `Self`
    fn coerce_opt(value: &T) -> Option<Self>;

    /// As [`CoerceFrom::coerce_opt`], with an error naming both types
    fn coerce_from(value: &T) -> Result<Self, CannotCoerceError> {
        Self::coerce_opt(value).ok_or_else(|| CannotCoerceError { from: Into::<LuaValue>::into(value.clone()).type_name(), to: Self::TYPE_NAME })
    }
}

/// Exact conversion to integer; Floats must have an integral value, strings are parsed as numbers first
impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LUA_INT {
    fn coerce_opt(value: &T) -> Option<Self> {
        LuaNumber::coerce_opt(value).and_then(|number| number.to_int(FloatToInt::Exact))
    }
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LUA_FLOAT {
    fn coerce_opt(value: &T) -> Option<Self> {
        LuaNumber::coerce_opt(value).map(|number| number.as_float())
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::types::{LUA_FLOAT, LUA_INT};
    use crate::types::CoerceFrom;
    use crate::types::value::LuaValue;

    #[test]
    fn integer_coercion_is_exact() {
        assert_eq!(LUA_INT::coerce_opt(&LuaValue::from(3.0 as LUA_FLOAT)), Some(3));
        assert_eq!(LUA_INT::coerce_opt(&LuaValue::from(3.5 as LUA_FLOAT)), None);
        assert_eq!(LUA_INT::coerce_opt(&LuaValue::from("0x10")), Some(16));
        assert_eq!(LUA_FLOAT::coerce_opt(&LuaValue::from(" 2.5 ")), Some(2.5));

        let error = LUA_INT::coerce_from(&LuaValue::from(true)).unwrap_err();
        assert_eq!(error.to_string(), "cannot coerce 'boolean' to 'integer'");
    }
}
