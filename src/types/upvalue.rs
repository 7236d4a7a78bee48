//! Module for Lua upvalues
//!
//! See <https://www.lua.org/manual/5.3/manual.html#3.5> for details on upvalues

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::types::value::LuaValue;
use crate::vm::stack::StackIndex;

/// Upvalue description
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UpvalueDesc {
    /// Denotes whether upvalue is in the enclosing function's registers, or one of it's upvalues
    instack: bool,
    /// Register or upvalue index of upvalue
    idx: u8,
}

impl UpvalueDesc {
    pub fn new(instack: bool, idx: u8) -> Self {
        UpvalueDesc { instack, idx }
    }

    /// Upvalue refers to register `idx` of the enclosing function
    pub fn register(idx: u8) -> Self {
        UpvalueDesc::new(true, idx)
    }

    /// Upvalue refers to upvalue `idx` of the enclosing function
    pub fn upvalue(idx: u8) -> Self {
        UpvalueDesc::new(false, idx)
    }

    pub fn index(&self) -> usize {
        self.idx as usize
    }

    pub fn in_stack(&self) -> bool {
        self.instack
    }
}

impl Display for UpvalueDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "instack: {}\tidx:{}", self.instack as u8, self.idx)
    }
}

#[derive(Debug, Clone)]
pub enum UpvalueImpl {
    /// Refers to a live register stack slot
    Open(StackIndex),
    Closed(LuaValue),
}

/// Lua upvalues; The non-local variables of a closure
///
/// Each upvalue may either be "open"; Referring to a slot in the register stack, or closed; containing the value directly
///
/// Upvalues are refcounted and may freely be copied, copies alias the same variable
#[derive(Clone)]
pub struct Upvalue { inner: Rc<RefCell<UpvalueImpl>> }

impl Upvalue {
    /// Creates a new "open" upvalue, referencing a slot in the register stack
    pub fn new_open(slot: StackIndex) -> Upvalue {
        Upvalue {
            inner: Rc::new(RefCell::new(UpvalueImpl::Open(slot)))
        }
    }

    /// Creates a new "closed" upvalue, directly containing value
    pub fn new_closed(value: LuaValue) -> Upvalue {
        Upvalue {
            inner: Rc::new(RefCell::new(UpvalueImpl::Closed(value)))
        }
    }

    /// Retrieve inner UpvalueImpl
    pub fn get(&self) -> UpvalueImpl {
        self.inner.borrow().clone()
    }

    /// Stack slot of this upvalue, if it is open
    pub fn open_slot(&self) -> Option<StackIndex> {
        match &*self.inner.borrow() {
            UpvalueImpl::Open(slot) => Some(*slot),
            UpvalueImpl::Closed(_) => None,
        }
    }

    /// Reads the value of this upvalue
    pub fn read(&self, stack: &[LuaValue]) -> LuaValue {
        match &*self.inner.borrow() {
            UpvalueImpl::Open(slot) => stack.get(slot.get()).cloned().unwrap_or(LuaValue::NIL),
            UpvalueImpl::Closed(value) => value.clone(),
        }
    }

    /// Writes the value of this upvalue
    pub fn write(&self, stack: &mut [LuaValue], value: LuaValue) {
        match &mut *self.inner.borrow_mut() {
            UpvalueImpl::Open(slot) => {
                if let Some(target) = stack.get_mut(slot.get()) {
                    *target = value;
                }
            }
            UpvalueImpl::Closed(inner) => *inner = value,
        }
    }

    /// Close this upvalue, replacing it's reference with specified value
    pub(crate) fn close(&self, value: LuaValue) {
        self.inner.replace(UpvalueImpl::Closed(value));
    }

    /// Returns true if both handles refer to the same upvalue
    pub fn ptr_eq(&self, other: &Upvalue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Upvalue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &*self.inner.borrow() {
            UpvalueImpl::Open(slot) => {
                f.debug_struct("Upvalue")
                    .field("slot", slot)
                    .finish()
            }
            UpvalueImpl::Closed(value) => {
                f.debug_tuple("Upvalue")
                    .field(value)
                    .finish()
            }
        }
    }
}

/// Table of open upvalues, ordered by stack slot
///
/// At most one open upvalue exists for each slot; Closures capturing the same slot share it
#[derive(Debug, Default)]
pub struct OpenUpvalues {
    open: BTreeMap<StackIndex, Upvalue>,
}

impl OpenUpvalues {
    pub fn new() -> Self {
        OpenUpvalues::default()
    }

    /// Returns the open upvalue for `slot`, creating it if none exists
    pub fn find_or_create(&mut self, slot: StackIndex) -> Upvalue {
        self.open.entry(slot)
            .or_insert_with(|| Upvalue::new_open(slot))
            .clone()
    }

    /// Closes all upvalues at or above `level`, copying the current stack values into them
    pub fn close(&mut self, level: StackIndex, stack: &[LuaValue]) {
        let closing = self.open.split_off(&level);
        for (slot, upvalue) in closing {
            tracing::trace!(slot = slot.get(), "closing upvalue");
            upvalue.close(stack.get(slot.get()).cloned().unwrap_or(LuaValue::NIL));
        }
    }

    /// Amount of currently open upvalues
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::upvalue::{OpenUpvalues, UpvalueImpl};
    use crate::types::value::LuaValue;
    use crate::vm::stack::StackIndex;

    #[test]
    fn one_open_upvalue_per_slot() {
        let mut table = OpenUpvalues::new();
        let first = table.find_or_create(StackIndex::new(3));
        let second = table.find_or_create(StackIndex::new(3));
        let other = table.find_or_create(StackIndex::new(4));
        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn close_detaches_from_stack() {
        let mut stack = vec![LuaValue::NIL, LuaValue::from(1i64), LuaValue::from(2i64)];
        let mut table = OpenUpvalues::new();
        let low = table.find_or_create(StackIndex::new(1));
        let high = table.find_or_create(StackIndex::new(2));

        table.close(StackIndex::new(2), &stack);
        assert_eq!(table.len(), 1);
        assert!(matches!(high.get(), UpvalueImpl::Closed(LuaValue::NUMBER(_))));
        assert_eq!(low.open_slot(), Some(StackIndex::new(1)));

        stack[2] = LuaValue::NIL;
        assert_eq!(high.read(&stack), LuaValue::from(2i64));
        low.write(&mut stack, LuaValue::from(true));
        assert_eq!(stack[1], LuaValue::from(true));
    }
}
