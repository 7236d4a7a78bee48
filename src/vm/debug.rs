//! Module for LuaVM debug functions

use std::rc::Rc;

use crate::types::value::function::Prototype;
use crate::vm::callinfo::CallStatus;
use crate::vm::LuaVM;

/// Extension trait for [`LuaVM`] containing debug functions
pub trait VMDebug {
    /// Retrieves debug information for a specified stackframe
    ///
    /// # Arguments
    ///
    /// * `level`: Index of stackframe for which to retrieve debug info, starting from the running function (i.e. 0 is the running function, 1 is it's caller)
    ///
    /// returns: Option<DebugInfo>, None if no Lua function is running at that level
    fn get_debug_info(&self, level: usize) -> Option<DebugInfo>;

    /// Amount of active Lua frames
    fn call_depth(&self) -> usize;
}

impl VMDebug for LuaVM {
    fn get_debug_info(&self, level: usize) -> Option<DebugInfo> {
        let depth = self.frames.depth().checked_sub(level)?;
        let frame = self.frames.active_above(0).nth(level)?;
        let closure = frame.closure.as_ref()?;
        // pc already points past the running instruction
        let pc = frame.pc.saturating_sub(1);
        let prototype = closure.clone_prototype();
        Some(DebugInfo {
            current_line: prototype.get_line(pc),
            pc,
            depth,
            is_tailcall: frame.status.contains(CallStatus::TAIL),
            prototype,
        })
    }

    fn call_depth(&self) -> usize {
        self.frames.depth()
    }
}

/// Debug information for a stackframe
#[derive(Clone)]
pub struct DebugInfo {
    pub prototype: Rc<Prototype>,
    /// Program counter of the instruction being executed
    pub pc: usize,
    /// Source line of the instruction being executed, None without line info
    pub current_line: Option<u32>,
    /// Depth of the frame; The outermost Lua frame has depth 1
    pub depth: usize,
    /// Whether this frame replaced it's caller through a tail call
    pub is_tailcall: bool,
}

impl DebugInfo {
    pub fn source(&self) -> String {
        self.prototype.source_name()
    }

    pub fn first_line_defined(&self) -> u32 {
        self.prototype.first_line_defined
    }

    pub fn last_line_defined(&self) -> u32 {
        self.prototype.last_line_defined
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::types::value::function::{LuaClosure, Prototype};
    use crate::types::value::string::LuaString;
    use crate::vm::callinfo::{CallInfo, CallStatus, ResultCount};
    use crate::vm::debug::VMDebug;
    use crate::vm::LuaVM;
    use crate::vm::stack::StackIndex;

    fn frame(source: &str, pc: usize, status: CallStatus) -> CallInfo {
        let prototype = Prototype {
            source: Some(LuaString::from(source)),
            lineinfo: vec![10, 11, 12],
            ..Prototype::default()
        };
        CallInfo {
            closure: Some(LuaClosure::new(Rc::new(prototype), Vec::new())),
            func: StackIndex::new(0),
            base: StackIndex::new(1),
            top: StackIndex::new(1),
            pc,
            results: ResultCount::Multret,
            status,
        }
    }

    #[test]
    fn levels_count_from_running_function() {
        let mut vm = LuaVM::new();
        assert!(vm.get_debug_info(0).is_none());

        vm.frames.push(frame("outer", 1, CallStatus::LUA));
        let mut tail = CallStatus::LUA;
        tail.insert(CallStatus::TAIL);
        vm.frames.push(frame("inner", 3, tail));
        assert_eq!(vm.call_depth(), 2);

        let inner = vm.get_debug_info(0).unwrap();
        assert_eq!(inner.source(), "inner");
        assert_eq!(inner.pc, 2);
        assert_eq!(inner.current_line, Some(12));
        assert_eq!(inner.depth, 2);
        assert!(inner.is_tailcall);

        let outer = vm.get_debug_info(1).unwrap();
        assert_eq!(outer.source(), "outer");
        assert_eq!(outer.current_line, Some(10));
        assert_eq!(outer.depth, 1);
        assert!(!outer.is_tailcall);

        assert!(vm.get_debug_info(2).is_none());
    }
}
