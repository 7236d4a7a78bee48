//! Module for various macros

/// Boilerplate reduction macro.
/// Converts a function reference to a [LuaFunction](crate::types::value::function::LuaFunction) type
///
/// Example
/// ```
/// use lua_vm_core::lua_func;
/// use lua_vm_core::error::LuaError;
/// use lua_vm_core::types::value::LuaValue;
/// use lua_vm_core::types::value::function::LuaFunction;
/// use lua_vm_core::types::varargs::Varargs;
/// use lua_vm_core::vm::LuaVM;
///
/// pub fn example_function(lua_vm: &mut LuaVM, params: &[LuaValue]) -> Result<Varargs, LuaError> { Ok(Varargs::empty()) }
///
/// let lua_function: LuaFunction = lua_func!(example_function);
/// ```
#[macro_export]
macro_rules! lua_func {
    ($func:ident) => {
        $crate::types::value::function::LuaFunction::new_rust(stringify!($func), $func)
    };
}

/// Boilerplate reduction macro.
/// Assembles a list of instructions, one `OPCODE operands..` entry per instruction; Operands follow the opcode's operand layout
///
/// Example
/// ```
/// use lua_vm_core::code;
///
/// let code = code![
///     LOADK 0, 0;
///     JMP 0, -2;
///     RETURN 0, 1;
/// ];
/// assert_eq!(code.len(), 3);
/// ```
#[macro_export]
macro_rules! code {
    ($($op:ident $($operand:expr),*);* $(;)?) => {
        vec![$(
            $crate::constants::types::LUA_INSTRUCTION::encode($crate::constants::opcodes::OpCode::$op, &[$($operand as isize),*])
        ),*]
    };
}
