//! Module containing main Error types
//!
//! Script-level failures (arithmetic, comparison, indexing, calling) are returned as a [`LuaError`].
//! Malformed bytecode is not recoverable; the dispatch loop panics with a [`ByteCodeError`] payload instead.

use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use thiserror::Error;

use crate::types::value::function::Prototype;
use crate::types::value::LuaValue;
use crate::types::value::string::LuaString;

/// Stacktrace entry
pub enum TraceEntry {
    Lua { program_counter: usize, prototype: Rc<Prototype> },
    /// Tail call stacktrace entries keep track of the amount of tail calls made; One entry is made for multiple repeated tail calls to prevent stacktrace overflow with heavy tailcall recursion
    TailCall(usize),
}

impl Display for TraceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TraceEntry::Lua { program_counter, prototype } => {
                match (&prototype.source, prototype.get_line(*program_counter), prototype.first_line_defined) {
                    (Some(name), Some(line), 0) => write!(f, "{}:{}: in main chunk", name, line),
                    (Some(name), None, 0) => write!(f, "{}: in main chunk", name),
                    (Some(name), Some(line), defined) => write!(f, "{}:{}: in function <{}:{}>", name, line, name, defined),
                    (Some(name), None, defined) => write!(f, "{}: in function <{}:{}>", name, name, defined),
                    (None, Some(line), _) => write!(f, "?:{}: in anonymous function", line),
                    (None, None, _) => write!(f, "?: in anonymous function (pc {})", program_counter),
                }
            }
            TraceEntry::TailCall(amount) => write!(f, "(...tail calls: {}...)", amount),
        }
    }
}

impl Debug for TraceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TraceEntry::Lua { program_counter, prototype } => {
                let mut debug = f.debug_struct("TraceEntry::Lua");
                if let Some(line) = prototype.get_line(*program_counter) {
                    debug.field("line", &line);
                }
                debug.field("program_counter", program_counter);
                if let Some(instruction) = prototype.code.get(*program_counter) {
                    debug.field("opcode", &instruction.opcode_name());
                }
                debug.field("prototype", prototype)
                    .finish()
            }
            TraceEntry::TailCall(amount) => f.debug_tuple("TraceEntry::TailCall").field(amount).finish(),
        }
    }
}

/// Top level type for Lua Errors, wrapping an error and stack trace (built on stack-unwind)
///
/// Every error kind converts into a LuaError, so VM internals propagate with `?`
///
/// Copying this error is expensive with large stack traces, and should be avoided
#[derive(Debug, Error)]
#[error("{error}")]
pub struct LuaError {
    error: LuaErrorKind,
    stacktrace: Vec<TraceEntry>,
}

impl LuaError {
    /// Creates new LuaError wrapping a [`GenericError`] with a &'static str message
    ///
    /// # Arguments
    ///
    /// * `message`: Message of error
    ///
    /// returns: LuaError
    pub fn new(message: &'static str) -> Self {
        LuaError::from(GenericError::Str(message))
    }

    /// Creates new LuaError wrapping a [`GenericError`] with a String message
    pub fn with_string(message: String) -> LuaError {
        LuaError::from(GenericError::String(message))
    }

    /// Creates new LuaError wrapping a [`GenericError`] with a LuaValue message
    pub fn with_message<T: Into<LuaValue>>(message: T) -> Self {
        LuaError::from(GenericError::Value(message.into()))
    }

    /// Kind of this error
    pub fn kind(&self) -> &LuaErrorKind {
        &self.error
    }

    /// Entries of this error's stacktrace, innermost call first
    pub fn stacktrace(&self) -> &[TraceEntry] {
        &self.stacktrace
    }

    /// Returns message of this error, as LuaValue
    ///
    /// If message is not passed to Lua script, rust callers should use [`Display`] instead
    pub fn message(self) -> LuaValue {
        match self.error {
            LuaErrorKind::Generic(GenericError::Value(value)) => value,
            error => LuaValue::STRING(LuaString::from(error.to_string())),
        }
    }

    /// Appends a Lua function call to stack trace
    ///
    /// # Arguments
    ///
    /// * `program_counter`: Program counter at which Lua function errored
    /// * `prototype`: Lua function that errored
    ///
    /// returns: LuaError
    pub fn trace_lua(mut self, program_counter: usize, prototype: Rc<Prototype>) -> LuaError {
        self.stacktrace.push(TraceEntry::Lua { program_counter, prototype });
        self
    }

    /// Appends a lua tailcall to the stacktrace
    ///
    /// If the previous entry on the stacktrace was also a tailcall, increments it's call count
    pub fn trace_tail_call(mut self) -> LuaError {
        match self.stacktrace.last_mut() {
            Some(TraceEntry::TailCall(count)) => *count += 1,
            Some(_) | None => self.stacktrace.push(TraceEntry::TailCall(1)),
        }
        self
    }

    /// Returns a struct that implements Display for this error's stack trace
    pub fn display_stacktrace(&self) -> LuaErrorStackTraceDisplay {
        LuaErrorStackTraceDisplay {
            inner: self
        }
    }
}

/// Struct that implements display for a LuaError's stacktrace
pub struct LuaErrorStackTraceDisplay<'a> {
    inner: &'a LuaError,
}

impl<'a> Display for LuaErrorStackTraceDisplay<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.error)?;
        if !self.inner.stacktrace.is_empty() {
            write!(f, "\nstack traceback:")?;
        }
        for entry in &self.inner.stacktrace {
            write!(f, "\n\t{}", entry)?;
        }
        Ok(())
    }
}

impl<T: Into<LuaErrorKind>> From<T> for LuaError {
    fn from(error: T) -> Self {
        LuaError {
            error: error.into(),
            stacktrace: Vec::with_capacity(0),
        }
    }
}

/// Errorkind enum for LuaError, see documentation on [`LuaError`] and specific error types for details
#[derive(Debug, Error)]
pub enum LuaErrorKind {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    #[error(transparent)]
    CannotCompare(#[from] CannotCompareError),
    #[error(transparent)]
    CannotIndexType(#[from] CannotIndexTypeError),
    #[error(transparent)]
    InvalidTableKey(#[from] InvalidKeyError),
    #[error(transparent)]
    IndexChainTooLong(#[from] IndexChainTooLongError),
    #[error(transparent)]
    AttemptToCallNonFunction(#[from] AttemptToCallNonFunctionError),
    #[error(transparent)]
    UnsupportedCall(#[from] UnsupportedCallError),
    #[error(transparent)]
    InvalidConcatenation(#[from] InvalidConcatenationError),
    #[error(transparent)]
    Length(#[from] LengthError),
    #[error(transparent)]
    StackOverflow(#[from] StackOverflowError),
    #[error(transparent)]
    CannotCoerce(#[from] CannotCoerceError),
    #[error(transparent)]
    Generic(#[from] GenericError),
}

/// Generic error type, wrapping a text message or lua value
#[derive(Debug, Error)]
pub enum GenericError {
    #[error("{0}")]
    String(String),
    #[error("{0}")]
    Str(&'static str),
    #[error("{0}")]
    Value(LuaValue),
}

/// Arithmetic on values that are not numbers, or that have no valid result
///
/// See <https://www.lua.org/manual/5.3/manual.html#3.4.1> for details on Lua arithmetic
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ArithmeticError {
    #[error("attempt to perform arithmetic on a {operand_type} value")]
    NonNumeric { operand_type: &'static str },
    #[error("attempt to perform bitwise operation on a {operand_type} value")]
    Bitwise { operand_type: &'static str },
    #[error("number has no integer representation")]
    NoIntegerRepresentation,
    #[error("attempt to perform 'n%0'")]
    ModuloByZero,
    #[error("attempt to perform 'n//0'")]
    DivideByZero,
    /// Invalid numeric `for` loop parameter
    #[error("{0}")]
    ForLoop(&'static str),
}

/// Error denoting type coercion error
///
/// See <https://www.lua.org/manual/5.3/manual.html#3.4.3> for details on Lua coercion
#[derive(Debug, Error)]
#[error("cannot coerce '{from}' to '{to}'")]
pub struct CannotCoerceError {
    /// Original type of coerced value
    pub from: &'static str,
    /// Target type value could not be coerced to
    pub to: &'static str,
}

/// Error denoting types cannot be (order-)compared to each other
///
/// NOTE: Equality comparison (==, ~=) between all types is valid and will not throw this error
///
/// See: <https://www.lua.org/manual/5.3/manual.html#3.4.4> for details on Lua comparisons
#[derive(Debug, Error)]
#[error("{}", order_message(.lhs_type, .rhs_type))]
pub struct CannotCompareError {
    /// Type of left-hand-side value in comparison
    pub lhs_type: &'static str,
    /// Type of right-hand-side value in comparison
    pub rhs_type: &'static str,
}

fn order_message(lhs: &str, rhs: &str) -> String {
    if lhs == rhs {
        format!("attempt to compare two {} values", lhs)
    } else {
        format!("attempt to compare {} with {}", lhs, rhs)
    }
}

/// Error denoting key is invalid; nil or NaN
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum InvalidKeyError {
    #[error("table index is nil")]
    KeyIsNil,
    #[error("table index is NaN")]
    KeyIsNaN,
}

/// Error denoting type cannot be indexed
///
/// Only tables can be indexed without metamethods
#[derive(Debug, Error)]
#[error("attempt to index a {indexed_type} value")]
pub struct CannotIndexTypeError { pub indexed_type: &'static str }

/// `__index`/`__newindex` lookups followed too many metatables
#[derive(Debug, Error)]
#[error("'{event}' chain too long; possible loop")]
pub struct IndexChainTooLongError { pub event: &'static str }

/// Error denoting a non-callable value was called
///
/// Callable lua values are functions and values with a __call metamethod
#[derive(Debug, Error)]
#[error("attempt to call a {called_type} value")]
pub struct AttemptToCallNonFunctionError { pub called_type: &'static str }

/// The call target is a host function; Host function dispatch is not performed by the dispatch loop
#[derive(Debug, Error)]
#[error("cannot call host function '{name}': host calls are not supported by this VM")]
pub struct UnsupportedCallError { pub name: &'static str }

/// Error denoting an invalid concatenation
///
/// NOTE: Concatenation is overloadable via __concat metamethod
///
/// See <https://www.lua.org/manual/5.3/manual.html#3.4.6> for details on Lua concatenation
#[derive(Debug, Error)]
#[error("attempt to concatenate a {concatenated_type} value")]
pub struct InvalidConcatenationError { pub concatenated_type: &'static str }

/// Length of a value that is neither a string nor a table, without `__len` metamethod
#[derive(Debug, Error)]
#[error("attempt to get length of a {measured_type} value")]
pub struct LengthError { pub measured_type: &'static str }

/// Resource limits of the VM were exceeded
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StackOverflowError {
    /// Register stack or call frame limit
    #[error("stack overflow")]
    Stack,
    /// Nested host calls (re-entrant VM calls from metamethods, generic-for iterators or the host)
    #[error("C stack overflow")]
    HostCalls,
}

/// Error denoting malformed bytecode
///
/// This is never returned as a [`LuaError`]; Executing malformed bytecode panics with this error's message
#[derive(Debug, Error)]
pub enum ByteCodeError {
    /// Program counter was >= amount of opcodes in prototype
    ///
    /// Generally caused by missing return instruction or malformed jump
    #[error("program counter out of bounds at index {counter} with program length {code_length}")]
    ProgramCounterOutOfBounds { counter: usize, code_length: usize },
    /// Invalid register index instruction argument
    #[error("register index out of bounds at index {index} with stack size {stack_size}")]
    RegisterIndexOutOfBounds { index: usize, stack_size: usize },
    /// Invalid constant index instruction argument
    #[error("constant index out of bounds at index {index} with constant count {constants_length}")]
    ConstantIndexOutOfBounds { index: usize, constants_length: usize },
    /// Upvalue index instruction argument was out of bounds
    ///
    /// Generally caused by malformed instruction or running function expecting upvalues as main script
    #[error("upvalue index out of bounds at index {upvalue_index} with upvalue count {upvalues_length}")]
    UpvalueIndexOutOfBounds { upvalue_index: usize, upvalues_length: usize },
    /// Invalid inner-function index instruction argument
    ///
    /// Generally caused by malformed "CLOSURE" instruction
    #[error("prototype index out of bounds at index {prototype_index} with prototype count {prototype_len}")]
    PrototypeIndexOutOfBounds { prototype_index: usize, prototype_len: usize },
    /// Attempt to execute instruction with unknown opcode
    ///
    /// Generally caused by malformed instruction or running bytecode from different versions of Lua
    #[error("unknown opcode: {opcode:X}")]
    UnknownOpcode { opcode: u8 },
    /// Attempt to execute 'ExtraArg' instruction
    ///
    /// 'ExtraArg' is a data-instruction that cannot be executed
    #[error("attempt to execute EXTRAARG opcode")]
    AttemptToExecuteExtraArg,
    /// Setlist instruction was set to fill until register 'top', starting at a register index that is greater than 'top'
    #[error("underflow in SETLIST")]
    SetlistUnderflow,
    /// SETLIST target register did not hold a table
    #[error("SETLIST target is a {found} value")]
    SetlistTarget { found: &'static str },
    /// Expected a different instruction
    ///
    /// Generally caused by missing ExtraArg instruction
    #[error("expected opcode {expected}, found opcode {found}")]
    ExpectedOpcode { expected: &'static str, found: &'static str },
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::error::{ArithmeticError, CannotCompareError, LuaError, TraceEntry};
    use crate::types::value::function::Prototype;
    use crate::types::value::LuaValue;

    #[test]
    fn messages() {
        assert_eq!(LuaError::from(ArithmeticError::NonNumeric { operand_type: "nil" }).to_string(), "attempt to perform arithmetic on a nil value");
        assert_eq!(LuaError::from(ArithmeticError::ModuloByZero).to_string(), "attempt to perform 'n%0'");
        assert_eq!(CannotCompareError { lhs_type: "table", rhs_type: "table" }.to_string(), "attempt to compare two table values");
        assert_eq!(CannotCompareError { lhs_type: "number", rhs_type: "nil" }.to_string(), "attempt to compare number with nil");
    }

    #[test]
    fn error_values() {
        assert_eq!(LuaError::with_message(42i64).message(), LuaValue::from(42i64));
        let error = LuaError::with_string(format!("bad argument #{}", 1));
        assert_eq!(error.to_string(), "bad argument #1");
        assert_eq!(error.message(), LuaValue::from("bad argument #1"));
    }

    #[test]
    fn tail_calls_collapse() {
        let error = LuaError::new("boom")
            .trace_lua(0, Rc::new(Prototype::default()))
            .trace_tail_call()
            .trace_tail_call();
        assert_eq!(error.stacktrace().len(), 2);
        assert!(matches!(error.stacktrace()[1], TraceEntry::TailCall(2)));
        assert!(error.display_stacktrace().to_string().starts_with("boom\nstack traceback:"));
    }
}
