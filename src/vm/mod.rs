//! Module for LuaVM
//!
//! The VM owns a single register stack shared by all call frames, the frame arena and the table of open upvalues.
//! Lua-to-Lua calls and returns are handled inside the dispatch loop without growing the rust stack; Only host-level calls ([`LuaVM::call`]) nest.

use std::rc::Rc;

use crate::error::LuaError;
use crate::types::upvalue::{OpenUpvalues, Upvalue};
use crate::types::value::{LuaValue, TypeMetatables};
use crate::types::value::function::{LuaClosure, Prototype};
use crate::types::value::table::LuaTable;
use crate::vm::callinfo::CallStack;
use crate::vm::config::VmConfig;
use crate::vm::hooks::{MetamethodHooks, StandardMetamethods};
use crate::vm::stack::{RegisterStack, StackIndex};

pub mod stack;
pub mod callinfo;
pub mod config;
pub mod hooks;
pub mod arith;
pub mod compare;
pub mod debug;
pub(crate) mod fetch;
mod call;
mod execute;

/// Lua VM
///
/// This struct contains all the state of the Lua virtual machine
pub struct LuaVM {
    /// Metatables for lua types; Where tables and userdata have a metatable per value, other types have a static metatable per type
    pub metatables: TypeMetatables,
    stack: RegisterStack,
    /// First free slot of the register stack
    top: StackIndex,
    frames: CallStack,
    upvalues: OpenUpvalues,
    hooks: Rc<dyn MetamethodHooks>,
    config: VmConfig,
    /// Amount of nested [`LuaVM::call`] invocations
    host_calls: usize,
    /// Log of tracing info, or None if tracing is disabled
    tracing_log: Option<Vec<(Rc<Prototype>, Vec<usize>)>>,
}

impl LuaVM {
    /// Creates new Lua VM with default settings:
    ///
    /// * Metatable-driven metamethods ([`StandardMetamethods`])
    /// * No type metatables
    /// * Default resource limits, see [`VmConfig`]
    /// * Tracing disabled
    pub fn new() -> LuaVM {
        LuaVM::with_config(VmConfig::default())
    }

    /// Creates new Lua VM with the specified settings
    pub fn with_config(config: VmConfig) -> LuaVM {
        LuaVM {
            metatables: TypeMetatables::default(),
            stack: RegisterStack::new(config.initial_stack_size, config.max_stack_size),
            top: StackIndex::new(0),
            frames: CallStack::new(StackIndex::new(0)),
            upvalues: OpenUpvalues::new(),
            hooks: Rc::new(StandardMetamethods),
            tracing_log: if config.record_trace { Some(Vec::new()) } else { None },
            host_calls: 0,
            config,
        }
    }

    /// Replaces the metamethod hooks of this Lua VM
    pub fn with_hooks<H: MetamethodHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Rc::new(hooks);
        self
    }

    /// Enables tracing for this Lua VM
    ///
    /// No-op if tracing was already enabled
    pub fn enable_tracing(mut self) -> Self {
        if self.tracing_log.is_none() {
            self.tracing_log = Some(Vec::new())
        }
        self
    }

    /// Returns trace of this Lua VM; For each run of consecutive instructions in one prototype, the program counters executed
    pub fn get_trace(&self) -> &Option<Vec<(Rc<Prototype>, Vec<usize>)>> {
        &self.tracing_log
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Wraps a main chunk prototype into a closure, binding it's first upvalue to `env`
    ///
    /// Any further upvalues the prototype declares start out as nil
    pub fn load<P: Into<Rc<Prototype>>>(&self, prototype: P, env: LuaTable) -> LuaClosure {
        let prototype = prototype.into();
        let mut env = Some(LuaValue::from(env));
        let upvalues = prototype.upvalue_descriptors.iter()
            .map(|_| Upvalue::new_closed(env.take().unwrap_or(LuaValue::NIL)))
            .collect();
        LuaClosure::new(prototype, upvalues)
    }

    /// First free stack slot
    pub fn top(&self) -> StackIndex {
        self.top
    }

    /// Moves the top of the stack; Slots uncovered by raising the top are set to nil
    pub fn set_top(&mut self, top: StackIndex) -> Result<(), LuaError> {
        self.stack.ensure(top)?;
        if top > self.top {
            self.stack.fill_nil(self.top, top - self.top);
        }
        self.top = top;
        Ok(())
    }

    /// Pushes `value` on top of the stack
    pub fn push<T: Into<LuaValue>>(&mut self, value: T) -> Result<(), LuaError> {
        self.stack.ensure(self.top + 1)?;
        self.stack[self.top] = value.into();
        self.top += 1;
        Ok(())
    }

    /// Value in `index`, nil for slots that were never allocated
    pub fn get(&self, index: StackIndex) -> LuaValue {
        self.stack.as_slice().get(index.get()).cloned().unwrap_or(LuaValue::NIL)
    }

    /// Sets the value in `index`, growing the stack if needed
    pub fn set<T: Into<LuaValue>>(&mut self, index: StackIndex, value: T) -> Result<(), LuaError> {
        self.stack.ensure(index + 1)?;
        self.stack[index] = value.into();
        Ok(())
    }

    /// Amount of allocated stack slots
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// Amount of upvalues that still refer to a stack slot
    pub fn open_upvalue_count(&self) -> usize {
        self.upvalues.len()
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        LuaVM::new()
    }
}
