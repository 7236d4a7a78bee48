//! Module for Lua 'string' type

use std::cmp::Ordering;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::constants::SHORT_STRING_LENGTH;
use crate::types::{CoerceFrom, LuaType};
use crate::types::value::LuaValue;

/// Lua string type; Immutable byte string, not required to be valid utf-8
///
/// Short strings (up to [`SHORT_STRING_LENGTH`] bytes) and long strings share one representation, the distinction only affects the type tag.
#[derive(Clone)]
pub struct LuaString {
    inner: Rc<[u8]>,
}

impl LuaString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Length of this string in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_short(&self) -> bool {
        self.len() <= SHORT_STRING_LENGTH
    }

    /// Returns this string as a `&str` if it contains valid utf-8
    pub fn try_utf8(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.inner)
    }

    /// Concatenates multiple byte strings into a LuaString
    pub fn concat<'a, T: IntoIterator<Item=&'a [u8]>>(values: T) -> LuaString {
        let buffer: Vec<u8> = values.into_iter()
            .flat_map(<[u8]>::iter)
            .copied()
            .collect();
        LuaString::from(buffer)
    }
}

impl LuaType for LuaString {
    const TYPE_NAME: &'static str = "string";
}

/// Numbers convert to their string representation
impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaString {
    fn coerce_opt(value: &T) -> Option<Self> {
        match value.clone().into() {
            LuaValue::STRING(string) => Some(string),
            LuaValue::NUMBER(number) => Some(LuaString::from(number.to_string())),
            _ => None
        }
    }
}

impl From<&str> for LuaString {
    fn from(string: &str) -> Self {
        LuaString { inner: Rc::from(string.as_bytes()) }
    }
}

impl From<String> for LuaString {
    fn from(string: String) -> Self {
        LuaString { inner: Rc::from(string.into_bytes()) }
    }
}

impl From<&[u8]> for LuaString {
    fn from(string: &[u8]) -> Self {
        LuaString { inner: Rc::from(string) }
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(vec: Vec<u8>) -> Self {
        LuaString { inner: Rc::from(vec) }
    }
}

impl PartialEq for LuaString {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for LuaString {}

impl Hash for LuaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.inner)
    }
}

/// Bytewise ordering
impl PartialOrd for LuaString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LuaString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Debug for LuaString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LuaString").field(&self.len()).field(&String::from_utf8_lossy(&self.inner)).finish()
    }
}

impl Display for LuaString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use crate::types::CoerceFrom;
    use crate::types::value::LuaValue;
    use crate::types::value::string::LuaString;

    #[test]
    fn numbers_coerce_to_strings() {
        assert_eq!(LuaString::coerce_opt(&LuaValue::from(12i64)), Some(LuaString::from("12")));
        assert_eq!(LuaString::coerce_opt(&LuaValue::from(true)), None);
    }

    #[test]
    fn byte_strings() {
        let joined = LuaString::concat([&b"ab"[..], &b"\xFF"[..], &b"c"[..]]);
        assert_eq!(joined.len(), 4);
        assert!(joined.try_utf8().is_err());
        assert!(LuaString::from("a") < LuaString::from("b"));
        assert!(LuaString::from("").is_empty());
    }
}
