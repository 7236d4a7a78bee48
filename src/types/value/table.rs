//! Module for Lua 'table' type

use std::cell::RefCell;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::constants::MAX_SIZE_HINT;
use crate::constants::types::LUA_INT;
use crate::types::{AsLuaPointer, CoerceFrom, LuaType, ref_to_pointer};
use crate::types::value::{LuaKey, LuaValue};
use crate::types::value::table::table_impl::TableImpl;

/// Module containing table implementation
mod table_impl {
    use std::collections::HashMap;

    use crate::constants::types::LUA_INT;
    use crate::types::value::{LuaKey, LuaValue};
    use crate::types::value::number::LuaNumber;

    /// Lua table implementation
    ///
    /// 'array' contains the array-part of the LuaTable, where `array[i]` holds key `i + 1`
    /// 'entries' contains the hash-part in insertion order; Removed entries remain as NIL until the next compaction
    /// 'index' maps keys to their position in 'entries'
    #[derive(Debug, Default)]
    pub struct TableImpl {
        pub array: Vec<LuaValue>,
        entries: Vec<(LuaKey, LuaValue)>,
        index: HashMap<LuaKey, usize>,
        dead: usize,
    }

    /// Returns the array-part slot for `key`, if `key` is a positive integer
    fn array_slot(key: &LuaKey) -> Option<usize> {
        match key.inner {
            LuaValue::NUMBER(LuaNumber::INT(i)) if i > 0 => usize::try_from(i - 1).ok(),
            _ => None
        }
    }

    impl TableImpl {
        pub fn with_capacity(array_capacity: usize, hash_capacity: usize) -> TableImpl {
            TableImpl {
                array: Vec::with_capacity(array_capacity),
                entries: Vec::with_capacity(hash_capacity),
                index: HashMap::with_capacity(hash_capacity),
                dead: 0,
            }
        }

        pub fn get(&self, key: &LuaKey) -> LuaValue {
            if let Some(slot) = array_slot(key) {
                if let Some(value) = self.array.get(slot) {
                    return value.clone();
                }
            }
            self.index.get(key)
                .map(|position| self.entries[*position].1.clone())
                .unwrap_or(LuaValue::NIL)
        }

        fn hash_get(&self, key: &LuaKey) -> Option<&LuaValue> {
            self.index.get(key)
                .map(|position| &self.entries[*position].1)
                .filter(|value| !value.is_nil())
        }

        pub fn set(&mut self, key: LuaKey, value: LuaValue) {
            if let Some(slot) = array_slot(&key) {
                if slot < self.array.len() {
                    self.array[slot] = value;
                    return;
                }
                if slot == self.array.len() && !value.is_nil() {
                    self.hash_set(key, LuaValue::NIL);
                    self.array.push(value);
                    self.migrate_to_array();
                    return;
                }
            }
            self.hash_set(key, value);
        }

        fn hash_set(&mut self, key: LuaKey, value: LuaValue) {
            match self.index.get(&key) {
                Some(position) => {
                    let entry = &mut self.entries[*position].1;
                    match (entry.is_nil(), value.is_nil()) {
                        (false, true) => self.dead += 1,
                        (true, false) => self.dead -= 1,
                        _ => {}
                    }
                    *entry = value;
                }
                None if value.is_nil() => {}
                None => {
                    if self.dead > 0 && self.dead * 2 >= self.entries.len() {
                        self.compact();
                    }
                    self.index.insert(key.clone(), self.entries.len());
                    self.entries.push((key, value));
                }
            }
        }

        /// Moves keys directly following the array-part out of the hash-part
        fn migrate_to_array(&mut self) {
            loop {
                let next_key = LuaKey::from(self.array.len() + 1);
                match self.hash_get(&next_key).cloned() {
                    Some(value) => {
                        self.hash_set(next_key, LuaValue::NIL);
                        self.array.push(value);
                    }
                    None => break,
                }
            }
        }

        fn compact(&mut self) {
            self.entries.retain(|(_, value)| !value.is_nil());
            self.index = self.entries.iter()
                .enumerate()
                .map(|(position, (key, _))| (key.clone(), position))
                .collect();
            self.dead = 0;
        }

        /// Border of this table; Index `n` where `t[n]` is not nil and `t[n+1]` is nil, or 0 if `t[1]` is nil
        pub fn border(&self) -> LUA_INT {
            let len = self.array.len();
            if len > 0 && self.array[len - 1].is_nil() {
                // Binary search for a border within the array-part
                let (mut i, mut j) = (0usize, len);
                while j - i > 1 {
                    let m = (i + j) / 2;
                    if self.array[m - 1].is_nil() { j = m; } else { i = m; }
                }
                return i as LUA_INT;
            }
            let mut border = len as LUA_INT;
            while self.hash_get(&LuaKey::from(border.wrapping_add(1))).is_some() {
                border += 1;
            }
            border
        }

        pub fn hash_len(&self) -> usize {
            self.entries.len() - self.dead
        }
    }
}

/// Lua table
///
/// Contains both an array (keys 1..=N) part and a hash (all other keys) part.
///
/// Values must be written through the [`LuaKey`] type as not all LuaValues (NaN, NIL) are valid keys, which may be obtained from [`LuaValue::try_key`]
#[derive(Clone)]
pub struct LuaTable {
    inner: Rc<TableInner>,
}

struct TableInner {
    data: RefCell<TableImpl>,
    metatable: RefCell<Option<LuaTable>>,
}

impl LuaTable {
    /// Creates an empty LuaTable. This allocates on heap
    pub fn empty() -> LuaTable {
        LuaTable::with_capacity(0, 0)
    }

    /// Creates an empty LuaTable with specified capacities. This allocates on heap
    ///
    /// # Arguments
    ///
    /// * `array_capacity`: Size of array-part, resulting array-part will cover 1..=N
    /// * `hash_capacity`: Capacity of hash-part
    pub fn with_capacity(array_capacity: usize, hash_capacity: usize) -> LuaTable {
        LuaTable {
            inner: Rc::new(TableInner {
                data: RefCell::new(TableImpl::with_capacity(array_capacity, hash_capacity)),
                metatable: RefCell::new(None),
            })
        }
    }

    /// Creates LuaTable with specified values at indices 1..=N
    pub fn of_list<T: Into<LuaValue>, const N: usize>(values: [T; N]) -> LuaTable {
        let table = LuaTable::with_capacity(N, 0);
        for (index, value) in values.into_iter().enumerate() {
            table.raw_set(index + 1, value);
        }
        table
    }

    /// Creates LuaTable with specified keys and values
    pub fn of_map<K: Into<LuaKey>, V: Into<LuaValue>, const N: usize>(entries: [(K, V); N]) -> LuaTable {
        let table = LuaTable::with_capacity(0, N);
        for (key, value) in entries {
            table.raw_set(key, value);
        }
        table
    }

    /// Retrieves value from table, returning nil if no value was set for specified key
    ///
    /// Does not follow the `__index` metamethod
    pub fn raw_get<K: Into<LuaKey>>(&self, key: K) -> LuaValue {
        self.inner.data.borrow().get(&key.into())
    }

    /// Retrieves value from table for an arbitrary value; NIL and NaN are never present as keys, and yield nil
    pub fn raw_get_value(&self, key: &LuaValue) -> LuaValue {
        match key.clone().try_key() {
            Ok(key) => self.raw_get(key),
            Err(_) => LuaValue::NIL,
        }
    }

    /// Sets value in table, or removes mapping if value is nil
    ///
    /// Does not follow the `__newindex` metamethod
    pub fn raw_set<K: Into<LuaKey>, V: Into<LuaValue>>(&self, key: K, value: V) {
        self.inner.data.borrow_mut().set(key.into(), value.into());
    }

    /// Indexes metatable of this table, returning nil if value has no metatable, or metatable has no field for key
    pub fn index_metatable<K: Into<LuaKey>>(&self, key: K) -> LuaValue {
        self.inner.metatable.borrow().as_ref().map(|table| table.raw_get(key)).unwrap_or(LuaValue::NIL)  // Metatable lookups are a raw get
    }

    /// Returns a copy of this table's metatable
    pub fn metatable(&self) -> Option<LuaTable> {
        self.inner.metatable.borrow().clone()
    }

    /// Sets this table's metatable, does not respect __metatable metamethod
    pub fn set_metatable(&self, metatable: Option<LuaTable>) {
        self.inner.metatable.replace(metatable);
    }

    /// Length of this table, as per Lua's `#` operator (without `__len`); Any border of the table
    pub fn len(&self) -> LUA_INT {
        self.inner.data.borrow().border()
    }

    /// Amount of non-nil values in the hash-part, and total size of the array-part
    pub fn sizes(&self) -> (usize, usize) {
        let data = self.inner.data.borrow();
        (data.array.len(), data.hash_len())
    }
}

impl LuaType for LuaTable {
    const TYPE_NAME: &'static str = "table";
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaTable {
    fn coerce_opt(value: &T) -> Option<Self> {
        if let LuaValue::TABLE(table) = value.clone().into() {
            Some(table)
        } else {
            None
        }
    }
}

impl AsLuaPointer for LuaTable {
    fn as_lua_pointer(&self) -> usize {
        ref_to_pointer(self.inner.as_ref())
    }
}

impl Debug for LuaTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "table:{:X}", self.as_lua_pointer())
    }
}

impl Display for LuaTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "table: 0x{:x}", self.as_lua_pointer())
    }
}

impl PartialEq for LuaTable {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Converts a "floating point byte" `eeeeexxx` to an integer; Used for table size hints
pub fn fb2int(x: usize) -> usize {
    if x < 8 {
        x
    } else {
        ((x & 7) + 8) << ((x >> 3) - 1)
    }
}

/// Decodes a NEWTABLE size operand; Hints beyond [`MAX_SIZE_HINT`] are capped, tables grow past it on insertion
pub fn size_hint(x: usize) -> usize {
    usize::min(fb2int(x), MAX_SIZE_HINT)
}
