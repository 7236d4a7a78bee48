//! Register-based virtual machine core for Lua 5.3 bytecode
//!
//! The [`vm::LuaVM`] executes hand-built or externally loaded [`Prototype`](types::value::function::Prototype)s;
//! Compilation, the standard library and garbage collection are outside of this crate.

#[macro_use]
mod macros;

pub mod constants;
pub mod error;
pub mod types;
pub mod vm;
