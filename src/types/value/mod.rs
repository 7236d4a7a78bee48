//! Module for [`LuaValue`]
//!
//! See value type modules for details on each concrete Lua type
//!
//! See <https://www.lua.org/manual/5.3/manual.html#2.1> for details on Lua's value types

use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::constants::typetag;
use crate::constants::types::{LUA_FLOAT, LUA_INT};
use crate::error::InvalidKeyError;
use crate::types::{AsLuaPointer, CoerceFrom, LuaType};
use crate::types::value::function::LuaFunction;
use crate::types::value::number::{FloatToInt, LuaNumber};
use crate::types::value::string::LuaString;
use crate::types::value::table::LuaTable;
use crate::types::value::userdata::{LightUserData, UserData};

pub mod number;
pub mod string;
pub mod table;
pub mod userdata;
pub mod function;

/// Metatables for types without per-value metatables
#[derive(Debug, Clone, Default)]
pub struct TypeMetatables {
    pub boolean: Option<LuaTable>,
    pub number: Option<LuaTable>,
    pub string: Option<LuaTable>,
    pub function: Option<LuaTable>,
    pub light_userdata: Option<LuaTable>,
}

/// Top level type for singular Lua values
///
/// Should be treated as "nullable" via the [`LuaValue::NIL`] variant
///
/// [`PartialEq`] implements Lua's raw equality; Numbers compare by mathematical value and tables, userdata and closures by identity.
#[derive(Clone, PartialEq, Default)]
pub enum LuaValue {
    /// Lua 'nil' value & type
    #[default]
    NIL,
    /// Lua boolean type
    BOOLEAN(bool),
    /// Lua number type
    NUMBER(LuaNumber),
    /// Lua string type
    STRING(LuaString),
    /// Lua light userdata type
    LIGHTUSERDATA(LightUserData),
    /// Lua full userdata type
    USERDATA(UserData),
    /// Lua function type
    FUNCTION(LuaFunction),
    /// Lua table type
    TABLE(LuaTable),
}

impl LuaValue {
    /// Variant type tag of this value; See [`typetag`]
    pub fn type_tag(&self) -> u8 {
        match self {
            LuaValue::NIL => typetag::TNIL,
            LuaValue::BOOLEAN(_) => typetag::TBOOLEAN,
            LuaValue::NUMBER(LuaNumber::INT(_)) => typetag::TNUMINT,
            LuaValue::NUMBER(LuaNumber::FLOAT(_)) => typetag::TNUMFLT,
            LuaValue::STRING(s) => if s.is_short() { typetag::TSHRSTR } else { typetag::TLNGSTR },
            LuaValue::LIGHTUSERDATA(_) => typetag::TLIGHTUSERDATA,
            LuaValue::USERDATA(_) => typetag::TUSERDATA,
            LuaValue::FUNCTION(f) => f.type_tag(),
            LuaValue::TABLE(_) => typetag::TTABLE,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::NIL)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, LuaValue::NUMBER(LuaNumber::INT(_)))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LuaValue::NUMBER(LuaNumber::FLOAT(_)))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::NUMBER(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::STRING(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::TABLE(_))
    }

    /// Returns True if this is value is "truthy"; All values besides `NIL` and `false` are truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            LuaValue::NIL => false,
            LuaValue::BOOLEAN(boolean) => *boolean,
            _ => true
        }
    }

    /// Returns True if this value is `NIL` or `false`
    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    /// Returns this value if it is not NIL, or None if it is NIL
    pub fn not_nil(self) -> Option<Self> {
        match self {
            LuaValue::NIL => None,
            _ => Some(self)
        }
    }

    /// Returns the metatable of this value, if it has one
    pub fn metatable(&self, metatables: &TypeMetatables) -> Option<LuaTable> {
        match self {
            LuaValue::NIL => None,
            LuaValue::BOOLEAN(_) => metatables.boolean.clone(),
            LuaValue::NUMBER(_) => metatables.number.clone(),
            LuaValue::STRING(_) => metatables.string.clone(),
            LuaValue::LIGHTUSERDATA(_) => metatables.light_userdata.clone(),
            LuaValue::USERDATA(userdata) => userdata.metatable(),
            LuaValue::FUNCTION(_) => metatables.function.clone(),
            LuaValue::TABLE(table) => table.metatable(),
        }
    }

    /// Indexes metatable of this value, returning NIL if value has no metatable, or metatable has no field for key
    pub fn index_metatable<K: Into<LuaKey>>(&self, key: K, metatables: &TypeMetatables) -> LuaValue {
        match self {
            LuaValue::TABLE(table) => table.index_metatable(key),   // Skip cloning the metatable handle for the common case
            _ => self.metatable(metatables)
                .map(|table| table.raw_get(key))   // Metatable lookups are a raw get
                .unwrap_or(LuaValue::NIL),
        }
    }

    /// Raw length of strings and tables, without `__len`
    pub fn raw_len(&self) -> Option<LUA_INT> {
        match self {
            LuaValue::STRING(s) => Some(s.len() as LUA_INT),
            LuaValue::TABLE(t) => Some(t.len()),
            _ => None
        }
    }
}

impl LuaType for LuaValue {
    const TYPE_NAME: &'static str = "value";

    fn type_name(&self) -> &'static str {
        match self {
            LuaValue::NIL => "nil",
            LuaValue::BOOLEAN(b) => b.type_name(),
            LuaValue::NUMBER(n) => n.type_name(),
            LuaValue::STRING(s) => s.type_name(),
            LuaValue::LIGHTUSERDATA(u) => u.type_name(),
            LuaValue::USERDATA(u) => u.type_name(),
            LuaValue::FUNCTION(f) => f.type_name(),
            LuaValue::TABLE(t) => t.type_name(),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::BOOLEAN(b)
    }
}

impl From<LuaNumber> for LuaValue {
    fn from(n: LuaNumber) -> Self {
        LuaValue::NUMBER(n)
    }
}

impl From<LuaString> for LuaValue {
    fn from(s: LuaString) -> Self {
        LuaValue::STRING(s)
    }
}

impl From<LUA_INT> for LuaValue {
    fn from(i: LUA_INT) -> Self {
        LuaValue::NUMBER(LuaNumber::INT(i))
    }
}

impl From<LUA_FLOAT> for LuaValue {
    fn from(f: LUA_FLOAT) -> Self {
        LuaValue::NUMBER(LuaNumber::FLOAT(f))
    }
}

impl From<usize> for LuaValue {
    fn from(i: usize) -> Self {
        LuaValue::NUMBER(LuaNumber::from(i))
    }
}

impl From<&str> for LuaValue {
    fn from(string: &str) -> Self {
        LuaValue::STRING(LuaString::from(string))
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::STRING(LuaString::from(s))
    }
}

impl From<&[u8]> for LuaValue {
    fn from(string: &[u8]) -> Self {
        LuaValue::STRING(LuaString::from(string))
    }
}

impl From<Vec<u8>> for LuaValue {
    fn from(v: Vec<u8>) -> Self {
        LuaValue::STRING(LuaString::from(v))
    }
}

impl From<LightUserData> for LuaValue {
    fn from(u: LightUserData) -> Self {
        LuaValue::LIGHTUSERDATA(u)
    }
}

impl From<UserData> for LuaValue {
    fn from(u: UserData) -> Self {
        LuaValue::USERDATA(u)
    }
}

impl From<LuaFunction> for LuaValue {
    fn from(f: LuaFunction) -> Self {
        LuaValue::FUNCTION(f)
    }
}

impl From<LuaTable> for LuaValue {
    fn from(t: LuaTable) -> Self {
        LuaValue::TABLE(t)
    }
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaValue {
    fn coerce_opt(value: &T) -> Option<Self> {
        Some(T::clone(value).into())
    }
}

impl Debug for LuaValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::NIL => f.debug_tuple("LuaNil").finish(),
            LuaValue::BOOLEAN(bool) => f.debug_tuple("LuaBool").field(bool).finish(),
            LuaValue::NUMBER(number) => f.debug_tuple("LuaNumber").field(number).finish(),
            LuaValue::STRING(string) => f.debug_tuple("LuaString").field(string).finish(),
            LuaValue::LIGHTUSERDATA(userdata) => f.debug_tuple("LuaLightUserdata").field(userdata).finish(),
            LuaValue::USERDATA(userdata) => f.debug_tuple("LuaUserdata").field(userdata).finish(),
            LuaValue::FUNCTION(function) => f.debug_tuple("LuaFunction").field(function).finish(),
            LuaValue::TABLE(table) => f.debug_tuple("LuaTable").field(table).finish(),
        }
    }
}

impl Display for LuaValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            LuaValue::NIL => write!(f, "nil"),
            LuaValue::BOOLEAN(b) => write!(f, "{}", b),
            LuaValue::NUMBER(n) => write!(f, "{}", n),
            LuaValue::STRING(s) => write!(f, "{}", s),
            LuaValue::LIGHTUSERDATA(u) => write!(f, "{}", u),
            LuaValue::USERDATA(u) => write!(f, "{}", u),
            LuaValue::FUNCTION(function) => write!(f, "{}", function),
            LuaValue::TABLE(table) => write!(f, "{}", table),
        }
    }
}

/// Newtype for LuaValue that is a valid table key i.e. not NIL or NaN
///
/// Floats with an integral value are normalized to integers, so that `t[1]` and `t[1.0]` refer to the same entry.
/// Also implements [`Eq`] for full equality
#[derive(Debug, Clone)]
pub struct LuaKey {
    pub(crate) inner: LuaValue,
}

impl LuaKey {
    /// Normalizes number keys; Caller guarantees `value` is not NIL or NaN
    fn normalized(value: LuaValue) -> LuaKey {
        match value {
            LuaValue::NUMBER(LuaNumber::FLOAT(float)) => match number::float_to_int(float, FloatToInt::Exact) {
                Some(int) => LuaKey { inner: LuaValue::from(int) },
                None => LuaKey { inner: value },
            },
            _ => LuaKey { inner: value },
        }
    }

    pub fn value(&self) -> &LuaValue {
        &self.inner
    }

    pub fn into_value(self) -> LuaValue {
        self.inner
    }
}

impl LuaValue {
    /// Returns this value as a LuaKey if it is a valid key, Err otherwise
    pub fn try_key(self) -> Result<LuaKey, InvalidKeyError> {
        match self {
            LuaValue::NIL => Err(InvalidKeyError::KeyIsNil),
            LuaValue::NUMBER(LuaNumber::FLOAT(float)) if float.is_nan() => Err(InvalidKeyError::KeyIsNaN),
            _ => Ok(LuaKey::normalized(self)),
        }
    }
}

impl Eq for LuaKey {}

impl PartialEq for LuaKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Hash for LuaKey {
    fn hash<H: Hasher>(&self, state: &mut H) {  // Does not use Lua's hashing algorithm
        match &self.inner {
            LuaValue::NIL => {},    // NIL is an invalid key, and thus should never be hashed
            LuaValue::BOOLEAN(b) => state.write_u8(*b as u8),
            LuaValue::NUMBER(LuaNumber::INT(int)) => state.write_i64(*int),
            LuaValue::NUMBER(LuaNumber::FLOAT(float)) => state.write_u64(float.to_bits()),  // Integral floats are normalized to INT
            LuaValue::STRING(s) => s.hash(state),
            LuaValue::LIGHTUSERDATA(u) => u.hash(state),
            LuaValue::USERDATA(u) => state.write_usize(u.as_lua_pointer()),
            LuaValue::FUNCTION(f) => state.write_usize(f.as_lua_pointer()),
            LuaValue::TABLE(t) => state.write_usize(t.as_lua_pointer()),
        }
    }
}

impl From<bool> for LuaKey {
    fn from(b: bool) -> Self {
        LuaKey { inner: LuaValue::BOOLEAN(b) }
    }
}

impl From<LUA_INT> for LuaKey {
    fn from(i: LUA_INT) -> Self {
        LuaKey { inner: LuaValue::from(i) }
    }
}

impl From<usize> for LuaKey {
    fn from(i: usize) -> Self {
        LuaKey::normalized(LuaValue::from(i))
    }
}

impl From<LuaString> for LuaKey {
    fn from(s: LuaString) -> Self {
        LuaKey { inner: LuaValue::STRING(s) }
    }
}

impl From<&str> for LuaKey {
    fn from(string: &str) -> Self {
        LuaKey { inner: LuaValue::from(string) }
    }
}

impl From<String> for LuaKey {
    fn from(s: String) -> Self {
        LuaKey { inner: LuaValue::from(s) }
    }
}

impl From<LuaTable> for LuaKey {
    fn from(t: LuaTable) -> Self {
        LuaKey { inner: LuaValue::TABLE(t) }
    }
}

impl From<LuaFunction> for LuaKey {
    fn from(f: LuaFunction) -> Self {
        LuaKey { inner: LuaValue::FUNCTION(f) }
    }
}
