//! Module for LuaVM settings

use crate::constants::{BASIC_STACK_SIZE, LUAI_MAXCCALLS, LUAI_MAXSTACK};

/// Resource limits and diagnostics of a [`LuaVM`](crate::vm::LuaVM)
///
/// ```
/// use lua_vm_core::vm::config::VmConfig;
///
/// let config = VmConfig::default()
///     .with_max_call_depth(1000)
///     .enable_trace();
/// assert_eq!(config.max_call_depth, 1000);
/// ```
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Slots allocated for the register stack on creation
    pub initial_stack_size: usize,
    /// Maximum amount of register stack slots
    pub max_stack_size: usize,
    /// Maximum depth of the call frame chain
    pub max_call_depth: usize,
    /// Maximum amount of nested host-level calls into the VM; Metamethod handlers and generic-for iterators each nest one call
    pub max_host_calls: usize,
    /// Record executed instructions, see [`LuaVM::get_trace`](crate::vm::LuaVM::get_trace)
    pub record_trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            initial_stack_size: BASIC_STACK_SIZE,
            max_stack_size: LUAI_MAXSTACK,
            max_call_depth: 200_000,
            max_host_calls: LUAI_MAXCCALLS,
            record_trace: false,
        }
    }
}

impl VmConfig {
    pub fn with_initial_stack_size(mut self, slots: usize) -> Self {
        self.initial_stack_size = slots;
        self
    }

    pub fn with_max_stack_size(mut self, slots: usize) -> Self {
        self.max_stack_size = slots;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_host_calls(mut self, calls: usize) -> Self {
        self.max_host_calls = calls;
        self
    }

    /// Enables recording of executed instructions
    pub fn enable_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }
}
