//! Module for the call protocol: Entering frames, returning from them, and moving results into the caller's registers
//!
//! See <https://www.lua.org/manual/5.3/manual.html#3.4.10> for details on function calls

use crate::error::{AttemptToCallNonFunctionError, LuaError, StackOverflowError, UnsupportedCallError};
use crate::types::LuaType;
use crate::types::value::function::LuaFunction;
use crate::types::value::LuaValue;
use crate::types::varargs::Varargs;
use crate::vm::callinfo::{CallInfo, CallStatus, ResultCount};
use crate::vm::execute::execute;
use crate::vm::LuaVM;
use crate::vm::stack::StackIndex;

impl LuaVM {
    /// Calls the function in `func`, with arguments in the slots from `func + 1` up to the top of the stack
    ///
    /// On success the results start at `func`; For [`ResultCount::Multret`] the top of the stack is set just past the last result.
    ///
    /// On error, frames entered by this call are discarded, upvalues above `func` are closed and the top of the stack is reset to `func`; The VM remains usable.
    pub fn call(&mut self, func: StackIndex, results: ResultCount) -> Result<(), LuaError> {
        if self.host_calls >= self.config.max_host_calls {
            return Err(StackOverflowError::HostCalls.into());
        }
        self.host_calls += 1;
        let depth = self.frames.depth();
        let result = self.call_fresh(func, results);
        self.host_calls -= 1;
        result.map_err(|error| self.unwind(error, depth, func))
    }

    fn call_fresh(&mut self, func: StackIndex, results: ResultCount) -> Result<(), LuaError> {
        if !self.precall(func, results, false)? {
            self.frames.current_mut().status.insert(CallStatus::FRESH);
            execute(self)?;
        }
        Ok(())
    }

    /// Records the frames above `depth` in `error`'s stack trace, then discards them
    fn unwind(&mut self, mut error: LuaError, depth: usize, func: StackIndex) -> LuaError {
        for frame in self.frames.active_above(depth) {
            if let Some(closure) = &frame.closure {
                error = error.trace_lua(frame.pc.saturating_sub(1), closure.clone_prototype());
            }
            if frame.status.contains(CallStatus::TAIL) {
                error = error.trace_tail_call();
            }
        }
        tracing::debug!(%error, from = self.frames.depth(), to = depth, "unwinding call frames");
        self.upvalues.close(func, self.stack.as_slice());
        self.frames.truncate(depth);
        self.top = func;
        error
    }

    /// Calls `function` with `args`, returning all of it's results
    ///
    /// Arguments are placed above the current top of the stack, which is restored once the call returns
    pub fn call_function(&mut self, function: LuaValue, args: &[LuaValue]) -> Result<Varargs, LuaError> {
        let func = self.top;
        self.push(function)?;
        for arg in args {
            self.push(arg.clone())?;
        }
        self.call(func, ResultCount::Multret)?;
        let results = self.stack.to_vec(func, self.top);
        self.top = func;
        Ok(Varargs::from(results))
    }

    /// Prepares a call to the value in `func`
    ///
    /// For Lua closures a new frame is entered and `Ok(false)` is returned; The dispatch loop continues in the new frame.
    /// `Ok(true)` would mean the call already completed, which only host functions do; Host functions are not dispatched by this VM.
    ///
    /// A `tail_call` frame is spliced into it's caller afterwards, so it may be entered one frame past `max_call_depth`
    pub(crate) fn precall(&mut self, func: StackIndex, results: ResultCount, tail_call: bool) -> Result<bool, LuaError> {
        loop {
            match self.stack[func].clone() {
                LuaValue::FUNCTION(LuaFunction::LUA_CLOSURE(closure)) => {
                    let proto = closure.prototype();
                    let frame_size = proto.max_stack_size as usize;
                    let param_count = proto.param_count as usize;
                    let is_vararg = proto.is_vararg;

                    let depth_limit = if tail_call { self.config.max_call_depth + 1 } else { self.config.max_call_depth };
                    if self.frames.depth() >= depth_limit {
                        return Err(StackOverflowError::Stack.into());
                    }
                    self.stack.ensure(self.top + frame_size)?;

                    let arg_count = self.top - func - 1;
                    let base = if is_vararg {
                        self.adjust_varargs(param_count, arg_count)
                    } else {
                        if arg_count < param_count {
                            self.stack.fill_nil(self.top, param_count - arg_count);
                        }
                        func + 1
                    };
                    let top = base + frame_size;
                    self.frames.push(CallInfo {
                        closure: Some(closure),
                        func,
                        base,
                        top,
                        pc: 0,
                        results,
                        status: CallStatus::LUA,
                    });
                    self.top = top;
                    tracing::debug!(depth = self.frames.depth(), %func, %base, args = arg_count, "entered frame");
                    return Ok(false);
                }
                LuaValue::FUNCTION(LuaFunction::RUST_FUNCTION(function)) => {
                    return Err(UnsupportedCallError { name: function.name() }.into());
                }
                value => {
                    let hooks = self.hooks.clone();
                    match hooks.call_handler(self, &value) {
                        Some(handler) => {
                            self.stack.ensure(self.top + 1)?;
                            self.stack.insert(func, self.top, handler);
                            self.top += 1;
                        }
                        None => return Err(AttemptToCallNonFunctionError { called_type: value.type_name() }.into()),
                    }
                }
            }
        }
    }

    /// Moves the fixed parameters of a vararg call above the arguments; The varargs stay below the returned base
    fn adjust_varargs(&mut self, param_count: usize, arg_count: usize) -> StackIndex {
        let fixed = self.top - arg_count;
        let base = self.top;
        let moved = usize::min(param_count, arg_count);
        for offset in 0..moved {
            let value = self.stack.take(fixed + offset);
            self.stack[base + offset] = value;
        }
        self.stack.fill_nil(base + moved, param_count - moved);
        self.top = base + param_count;
        base
    }

    /// Leaves the current frame, moving `result_count` results starting at `first_result` into the slots of the called function
    ///
    /// Returns false if the caller requested all results, in which case the top of the stack marks the end of the results
    pub(crate) fn postcall(&mut self, first_result: StackIndex, result_count: usize) -> Result<bool, LuaError> {
        let frame = self.frames.pop();
        tracing::debug!(depth = self.frames.depth(), results = result_count, "left frame");
        self.moveresults(first_result, frame.func, result_count, frame.results)
    }

    /// Copies results down to `res`; Missing results are nil, extra results are dropped
    fn moveresults(&mut self, first_result: StackIndex, res: StackIndex, result_count: usize, wanted: ResultCount) -> Result<bool, LuaError> {
        let wanted = match wanted {
            ResultCount::Fixed(0) => 0,
            ResultCount::Fixed(1) => {
                let value = if result_count == 0 { LuaValue::NIL } else { self.stack[first_result].clone() };
                self.stack[res] = value;
                1
            }
            ResultCount::Fixed(wanted) => {
                self.stack.ensure(res + wanted)?;
                let copied = usize::min(result_count, wanted);
                self.stack.copy_down(first_result, res, copied);
                self.stack.fill_nil(res + copied, wanted - copied);
                wanted
            }
            ResultCount::Multret => {
                self.stack.copy_down(first_result, res, result_count);
                self.top = res + result_count;
                return Ok(false);
            }
        };
        self.top = res + wanted;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::value::LuaValue;
    use crate::vm::callinfo::ResultCount;
    use crate::vm::LuaVM;
    use crate::vm::stack::StackIndex;

    fn vm_with(values: &[i64]) -> LuaVM {
        let mut vm = LuaVM::new();
        for value in values {
            vm.push(*value).unwrap();
        }
        vm
    }

    #[test]
    fn moveresults_pads_with_nil() {
        let mut vm = vm_with(&[0, 0, 10, 20]);
        assert!(vm.moveresults(StackIndex::new(2), StackIndex::new(0), 2, ResultCount::Fixed(4)).unwrap());
        assert_eq!(vm.top(), StackIndex::new(4));
        assert_eq!(vm.get(StackIndex::new(0)), LuaValue::from(10i64));
        assert_eq!(vm.get(StackIndex::new(1)), LuaValue::from(20i64));
        assert_eq!(vm.get(StackIndex::new(2)), LuaValue::NIL);
        assert_eq!(vm.get(StackIndex::new(3)), LuaValue::NIL);
    }

    #[test]
    fn moveresults_truncates() {
        let mut vm = vm_with(&[0, 1, 2, 3]);
        assert!(vm.moveresults(StackIndex::new(1), StackIndex::new(0), 3, ResultCount::Fixed(1)).unwrap());
        assert_eq!(vm.top(), StackIndex::new(1));
        assert_eq!(vm.get(StackIndex::new(0)), LuaValue::from(1i64));

        let mut vm = vm_with(&[0, 1]);
        assert!(vm.moveresults(StackIndex::new(1), StackIndex::new(0), 0, ResultCount::Fixed(1)).unwrap());
        assert_eq!(vm.get(StackIndex::new(0)), LuaValue::NIL);
    }

    #[test]
    fn moveresults_multret() {
        let mut vm = vm_with(&[0, 0, 7, 8, 9]);
        assert!(!vm.moveresults(StackIndex::new(2), StackIndex::new(0), 3, ResultCount::Multret).unwrap());
        assert_eq!(vm.top(), StackIndex::new(3));
        assert_eq!(vm.get(StackIndex::new(2)), LuaValue::from(9i64));

        let mut vm = vm_with(&[0, 0]);
        assert!(!vm.moveresults(StackIndex::new(1), StackIndex::new(0), 0, ResultCount::Multret).unwrap());
        assert_eq!(vm.top(), StackIndex::new(0));
    }

    #[test]
    fn adjust_varargs_moves_fixed_parameters() {
        // func, a, b, c with 2 fixed parameters
        let mut vm = vm_with(&[0, 1, 2, 3]);
        let base = vm.adjust_varargs(2, 3);
        assert_eq!(base, StackIndex::new(4));
        assert_eq!(vm.get(StackIndex::new(4)), LuaValue::from(1i64));
        assert_eq!(vm.get(StackIndex::new(5)), LuaValue::from(2i64));
        assert_eq!(vm.get(StackIndex::new(1)), LuaValue::NIL);
        assert_eq!(vm.get(StackIndex::new(3)), LuaValue::from(3i64));
        assert_eq!(vm.top(), StackIndex::new(6));

        // Missing fixed parameters are nil-filled
        let mut vm = vm_with(&[0, 1]);
        let base = vm.adjust_varargs(3, 1);
        assert_eq!(base, StackIndex::new(2));
        assert_eq!(vm.get(StackIndex::new(2)), LuaValue::from(1i64));
        assert_eq!(vm.get(StackIndex::new(4)), LuaValue::NIL);
        assert_eq!(vm.top(), StackIndex::new(5));
    }
}
