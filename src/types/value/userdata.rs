//! Module for Lua 'userdata' types

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::error::CannotCoerceError;
use crate::types::{AsLuaPointer, CoerceFrom, LuaType, ref_to_pointer};
use crate::types::value::LuaValue;
use crate::types::value::table::LuaTable;

/// Trait for values that can be stored in userdata
pub trait UserDataValue: Any {
    /// Name for implementer's type
    const TYPE_NAME: &'static str;
}

struct UserDataImpl {
    metatable: RefCell<Option<LuaTable>>,
    value: Box<dyn Any>,
    type_name: &'static str,
}

/// Lua Userdata, value that wraps arbitrary rust values into a Lua value
///
/// Wrapped values must implement [`UserDataValue`], existing types should be wrapped in a newtype
#[derive(Clone)]
pub struct UserData {
    inner: Rc<UserDataImpl>,
}

impl UserData {
    pub fn new<T: UserDataValue>(value: T, metatable: Option<LuaTable>) -> UserData {
        UserData {
            inner: Rc::new(UserDataImpl { metatable: RefCell::new(metatable), value: Box::new(value), type_name: T::TYPE_NAME })
        }
    }

    /// Returns a copy of this userdata's metatable, if one is set
    pub fn metatable(&self) -> Option<LuaTable> {
        self.inner.metatable.borrow().clone()
    }

    pub fn set_metatable(&self, metatable: Option<LuaTable>) {
        self.inner.metatable.replace(metatable);
    }

    /// Attempts to downcast rust value to specified type
    pub fn downcast<T: UserDataValue>(&self) -> Result<&T, CannotCoerceError> {
        self.inner.value.downcast_ref::<T>().ok_or(CannotCoerceError { from: self.inner.type_name, to: T::TYPE_NAME })
    }
}

impl LuaType for UserData {
    const TYPE_NAME: &'static str = "userdata";
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for UserData {
    fn coerce_opt(value: &T) -> Option<Self> {
        if let LuaValue::USERDATA(userdata) = value.clone().into() {
            Some(userdata)
        } else {
            None
        }
    }
}

impl AsLuaPointer for UserData {
    fn as_lua_pointer(&self) -> usize {
        ref_to_pointer(self.inner.as_ref())
    }
}

impl Debug for UserData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "USERDATA[{}]@{:X}", self.inner.type_name, self.as_lua_pointer())
    }
}

impl Display for UserData {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "userdata: 0x{:x}", self.as_lua_pointer())
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Light userdata; A bare pointer-sized value owned by the host, compared by value
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LightUserData(pub usize);

impl LuaType for LightUserData {
    const TYPE_NAME: &'static str = "userdata";
}

impl Display for LightUserData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "userdata: 0x{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::value::LuaValue;
    use crate::types::value::table::LuaTable;
    use crate::types::value::userdata::{UserData, UserDataValue};

    struct Handle(u32);

    impl UserDataValue for Handle {
        const TYPE_NAME: &'static str = "handle";
    }

    #[test]
    fn identity_and_downcast() {
        let userdata = UserData::new(Handle(7), None);
        assert_eq!(userdata.downcast::<Handle>().map(|handle| handle.0).ok(), Some(7));
        assert_eq!(userdata, userdata.clone());
        assert_ne!(userdata, UserData::new(Handle(7), None));

        let metatable = LuaTable::empty();
        userdata.set_metatable(Some(metatable.clone()));
        assert_eq!(userdata.metatable(), Some(metatable));
        assert_eq!(LuaValue::from(userdata).to_string().split(':').next(), Some("userdata"));
    }
}
