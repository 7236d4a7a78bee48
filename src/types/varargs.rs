//! Module for Lua varargs
//!
//! See <https://www.lua.org/manual/5.3/manual.html#3.4.11> for details on varargs

use crate::types::value::LuaValue;

/// Results of a call made by the host, zero or more values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Varargs {
    values: Vec<LuaValue>,
}

impl Varargs {
    pub fn empty() -> Varargs {
        Varargs { values: Vec::new() }
    }

    /// First value, nil if there are none; Lua's truncation of a call expression to one value
    pub fn into_first(self) -> LuaValue {
        self.values.into_iter().next().unwrap_or(LuaValue::NIL)
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Value at `index`, nil past the end
    pub fn get(&self, index: usize) -> &LuaValue {
        self.values.get(index).unwrap_or(&LuaValue::NIL)
    }

    pub fn as_slice(&self) -> &[LuaValue] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<LuaValue> {
        self.values
    }
}

impl From<Vec<LuaValue>> for Varargs {
    fn from(values: Vec<LuaValue>) -> Self {
        Varargs { values }
    }
}

#[cfg(test)]
mod tests {
    use crate::types::value::LuaValue;
    use crate::types::varargs::Varargs;

    #[test]
    fn missing_values_are_nil() {
        let varargs = Varargs::from(vec![LuaValue::from(1i64), LuaValue::from("two")]);
        assert_eq!(varargs.count(), 2);
        assert_eq!(varargs.get(1), &LuaValue::from("two"));
        assert_eq!(varargs.get(2), &LuaValue::NIL);
        assert_eq!(varargs.into_first(), LuaValue::from(1i64));
        assert_eq!(Varargs::empty().into_first(), LuaValue::NIL);
    }
}
