//! Module for the register stack
//!
//! All frames share one flat stack of values; A frame's registers are the slots from it's base upwards.
//! Slots are addressed by absolute [`StackIndex`] rather than bare integers.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Index, IndexMut, Sub};

use crate::error::{ByteCodeError, StackOverflowError};
use crate::types::value::LuaValue;
use crate::vm::fetch::malformed;

/// Absolute slot in the register stack
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct StackIndex(usize);

impl StackIndex {
    pub const fn new(index: usize) -> StackIndex {
        StackIndex(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl Add<usize> for StackIndex {
    type Output = StackIndex;

    fn add(self, rhs: usize) -> StackIndex {
        StackIndex(self.0 + rhs)
    }
}

impl AddAssign<usize> for StackIndex {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for StackIndex {
    type Output = StackIndex;

    fn sub(self, rhs: usize) -> StackIndex {
        StackIndex(self.0 - rhs)
    }
}

/// Distance between two slots; The left-hand side must not be below the right-hand side
impl Sub<StackIndex> for StackIndex {
    type Output = usize;

    fn sub(self, rhs: StackIndex) -> usize {
        self.0 - rhs.0
    }
}

impl Display for StackIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Growable stack of values
///
/// Every slot below [`RegisterStack::size`] holds a value (nil when unused); The VM's `top` is tracked separately
#[derive(Debug)]
pub struct RegisterStack {
    slots: Vec<LuaValue>,
    limit: usize,
}

impl RegisterStack {
    /// Creates a stack of `initial` nil slots, which may grow up to `limit` slots
    pub fn new(initial: usize, limit: usize) -> RegisterStack {
        let mut slots = Vec::with_capacity(initial);
        slots.resize(initial.min(limit), LuaValue::NIL);
        RegisterStack { slots, limit }
    }

    /// Amount of allocated slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Grows the stack so that all slots below `end` exist
    pub fn ensure(&mut self, end: StackIndex) -> Result<(), StackOverflowError> {
        if end.get() <= self.slots.len() {
            Ok(())
        } else if end.get() > self.limit {
            Err(StackOverflowError::Stack)
        } else {
            let new_size = usize::min(usize::max(end.get(), self.slots.len() * 2), self.limit);
            tracing::trace!(from = self.slots.len(), to = new_size, "growing register stack");
            self.slots.resize(new_size, LuaValue::NIL);
            Ok(())
        }
    }

    /// Replaces the value in `index`, returning the old value
    pub fn replace(&mut self, index: StackIndex, value: LuaValue) -> LuaValue {
        std::mem::replace(&mut self[index], value)
    }

    /// Takes the value out of `index`, leaving nil
    pub fn take(&mut self, index: StackIndex) -> LuaValue {
        std::mem::take(&mut self[index])
    }

    /// Copies `count` values from `from` to `to`; Ranges may overlap if `to` is below `from`
    pub fn copy_down(&mut self, from: StackIndex, to: StackIndex, count: usize) {
        for offset in 0..count {
            let value = self[from + offset].clone();
            self[to + offset] = value;
        }
    }

    /// Sets `count` slots starting at `from` to nil
    pub fn fill_nil(&mut self, from: StackIndex, count: usize) {
        for offset in 0..count {
            self[from + offset] = LuaValue::NIL;
        }
    }

    /// Shifts the values in `at..top` up one slot and stores `value` in `at`; The slot at `top` must exist
    pub fn insert(&mut self, at: StackIndex, top: StackIndex, value: LuaValue) {
        let mut slot = top;
        while slot > at {
            let shifted = self.take(slot - 1);
            self[slot] = shifted;
            slot = slot - 1;
        }
        self[at] = value;
    }

    /// Clones the values in the range `from..to`
    pub fn to_vec(&self, from: StackIndex, to: StackIndex) -> Vec<LuaValue> {
        self.slots[from.get()..to.get()].to_vec()
    }

    pub fn as_slice(&self) -> &[LuaValue] {
        &self.slots
    }

    pub fn as_mut_slice(&mut self) -> &mut [LuaValue] {
        &mut self.slots
    }
}

impl Index<StackIndex> for RegisterStack {
    type Output = LuaValue;

    fn index(&self, index: StackIndex) -> &LuaValue {
        match self.slots.get(index.get()) {
            Some(value) => value,
            None => malformed(ByteCodeError::RegisterIndexOutOfBounds { index: index.get(), stack_size: self.slots.len() }),
        }
    }
}

impl IndexMut<StackIndex> for RegisterStack {
    fn index_mut(&mut self, index: StackIndex) -> &mut LuaValue {
        let stack_size = self.slots.len();
        match self.slots.get_mut(index.get()) {
            Some(value) => value,
            None => malformed(ByteCodeError::RegisterIndexOutOfBounds { index: index.get(), stack_size }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StackOverflowError;
    use crate::types::value::LuaValue;
    use crate::vm::stack::{RegisterStack, StackIndex};

    #[test]
    fn index_arithmetic() {
        let base = StackIndex::new(4);
        assert_eq!(base + 3, StackIndex::new(7));
        assert_eq!((base + 3) - base, 3);
        assert_eq!(base - 1, StackIndex::new(3));
        let mut top = base;
        top += 2;
        assert!(top > base);
    }

    #[test]
    fn growth_is_bounded() {
        let mut stack = RegisterStack::new(4, 10);
        assert_eq!(stack.size(), 4);
        stack.ensure(StackIndex::new(6)).unwrap();
        assert_eq!(stack.size(), 8);
        assert_eq!(stack[StackIndex::new(7)], LuaValue::NIL);
        assert_eq!(stack.ensure(StackIndex::new(11)), Err(StackOverflowError::Stack));
        stack.ensure(StackIndex::new(10)).unwrap();
        assert_eq!(stack.size(), 10);
    }

    #[test]
    fn overlapping_copy() {
        let mut stack = RegisterStack::new(5, 5);
        for i in 0..5 {
            stack[StackIndex::new(i)] = LuaValue::from(i as i64);
        }
        stack.copy_down(StackIndex::new(2), StackIndex::new(1), 3);
        assert_eq!(stack.to_vec(StackIndex::new(0), StackIndex::new(5)), vec![0i64, 2, 3, 4, 4].into_iter().map(LuaValue::from).collect::<Vec<_>>());
    }

    #[test]
    fn insert_shifts_up() {
        let mut stack = RegisterStack::new(4, 4);
        stack[StackIndex::new(1)] = LuaValue::from(1i64);
        stack[StackIndex::new(2)] = LuaValue::from(2i64);
        stack.insert(StackIndex::new(1), StackIndex::new(3), LuaValue::from(true));
        assert_eq!(stack.to_vec(StackIndex::new(1), StackIndex::new(4)), vec![LuaValue::from(true), LuaValue::from(1i64), LuaValue::from(2i64)]);
    }

    #[test]
    #[should_panic(expected = "register index out of bounds")]
    fn out_of_range_register() {
        let stack = RegisterStack::new(2, 2);
        let _ = &stack[StackIndex::new(2)];
    }
}
