//! Module for call frames
//!
//! Frames live in an arena indexed by call depth. Slots are kept after a frame returns and are fully overwritten when the next call at that depth is made.

use crate::types::value::function::LuaClosure;
use crate::vm::stack::StackIndex;

/// Status bits of a call frame
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct CallStatus(u8);

impl CallStatus {
    /// Frame runs a Lua closure
    pub const LUA: CallStatus = CallStatus(1 << 1);
    /// Frame was entered from the host; It's RETURN leaves the dispatch loop
    pub const FRESH: CallStatus = CallStatus(1 << 3);
    /// Frame replaced it's caller through a tail call
    pub const TAIL: CallStatus = CallStatus(1 << 5);
    /// `a <= b` is being evaluated as `not (b < a)`
    pub const LEQ: CallStatus = CallStatus(1 << 7);

    pub const fn empty() -> CallStatus {
        CallStatus(0)
    }

    pub fn contains(self, other: CallStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CallStatus) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CallStatus) {
        self.0 &= !other.0;
    }
}

/// Amount of results requested from a call
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResultCount {
    Fixed(usize),
    /// All results; Count is known only when the callee returns
    Multret,
}

impl ResultCount {
    /// Decodes a result count operand, where 0 means multret and N means N - 1 results
    pub fn from_operand(operand: usize) -> ResultCount {
        match operand {
            0 => ResultCount::Multret,
            n => ResultCount::Fixed(n - 1),
        }
    }
}

/// Single call frame
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Running closure, None for the host frame at depth 0
    pub closure: Option<LuaClosure>,
    /// Slot of the called function; Results are moved here on return
    pub func: StackIndex,
    /// First register
    pub base: StackIndex,
    /// One past the last register
    pub top: StackIndex,
    /// Program counter for next instruction
    pub pc: usize,
    pub results: ResultCount,
    pub status: CallStatus,
}

impl CallInfo {
    fn host(top: StackIndex) -> CallInfo {
        CallInfo {
            closure: None,
            func: StackIndex::new(0),
            base: StackIndex::new(0),
            top,
            pc: 0,
            results: ResultCount::Multret,
            status: CallStatus::empty(),
        }
    }

    pub fn is_lua(&self) -> bool {
        self.status.contains(CallStatus::LUA)
    }
}

/// Arena of call frames; Depth 0 is the host frame and is never popped
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallInfo>,
    depth: usize,
}

impl CallStack {
    pub fn new(host_top: StackIndex) -> CallStack {
        CallStack {
            frames: vec![CallInfo::host(host_top)],
            depth: 0,
        }
    }

    /// Depth of the current frame, 0 when no Lua function is running
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Amount of frame slots allocated, including slots that are not in use
    pub fn pooled(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> &CallInfo {
        &self.frames[self.depth]
    }

    pub fn current_mut(&mut self) -> &mut CallInfo {
        &mut self.frames[self.depth]
    }

    /// Caller of the current frame
    pub fn previous_mut(&mut self) -> Option<&mut CallInfo> {
        match self.depth {
            0 => None,
            depth => Some(&mut self.frames[depth - 1]),
        }
    }

    /// Installs `frame` as the new current frame, reusing the slot at that depth if one exists
    pub fn push(&mut self, frame: CallInfo) {
        self.depth += 1;
        match self.frames.get_mut(self.depth) {
            Some(slot) => *slot = frame,
            None => self.frames.push(frame),
        }
    }

    /// Pops the current frame, returning a copy of it
    pub fn pop(&mut self) -> CallInfo {
        debug_assert!(self.depth > 0, "host frame cannot be popped");
        let frame = self.frames[self.depth].clone();
        self.depth -= 1;
        frame
    }

    /// Removes the caller of the current frame; The current frame takes the caller's slot
    pub fn collapse_into_caller(&mut self, frame: CallInfo) {
        debug_assert!(self.depth > 1, "tail call requires a Lua caller");
        self.depth -= 1;
        self.frames[self.depth] = frame;
    }

    /// Unwinds to `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.depth = usize::min(self.depth, depth);
    }

    /// Frames above `depth`, innermost first
    pub fn active_above(&self, depth: usize) -> impl Iterator<Item=&CallInfo> {
        self.frames[depth + 1..=self.depth].iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::callinfo::{CallInfo, CallStack, CallStatus, ResultCount};
    use crate::vm::stack::StackIndex;

    fn frame(base: usize) -> CallInfo {
        CallInfo {
            closure: None,
            func: StackIndex::new(base - 1),
            base: StackIndex::new(base),
            top: StackIndex::new(base + 4),
            pc: 0,
            results: ResultCount::Fixed(1),
            status: CallStatus::LUA,
        }
    }

    #[test]
    fn frames_are_pooled() {
        let mut frames = CallStack::new(StackIndex::new(0));
        frames.push(frame(1));
        frames.push(frame(5));
        assert_eq!(frames.depth(), 2);
        frames.current_mut().pc = 12;
        frames.pop();
        frames.push(frame(5));
        assert_eq!(frames.current().pc, 0);
        assert_eq!(frames.pooled(), 3);
        frames.truncate(0);
        assert_eq!(frames.depth(), 0);
        assert!(!frames.current().is_lua());
    }

    #[test]
    fn status_bits() {
        let mut status = CallStatus::LUA;
        status.insert(CallStatus::FRESH);
        assert!(status.contains(CallStatus::FRESH) && status.contains(CallStatus::LUA));
        status.remove(CallStatus::FRESH);
        assert!(!status.contains(CallStatus::FRESH));
        assert!(!status.contains(CallStatus::TAIL));
    }

    #[test]
    fn result_operand() {
        assert_eq!(ResultCount::from_operand(0), ResultCount::Multret);
        assert_eq!(ResultCount::from_operand(1), ResultCount::Fixed(0));
        assert_eq!(ResultCount::from_operand(3), ResultCount::Fixed(2));
    }
}
