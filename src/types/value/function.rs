//! Module for Lua 'function' type
//!
//! The concrete type for all kinds of Lua function is [`LuaFunction`]
//!
//! Rust functions have the signature `fn(&mut LuaVM, &[LuaValue]) -> Result<Varargs, LuaError>`; The core VM does not dispatch them, calling one raises an [`UnsupportedCallError`](crate::error::UnsupportedCallError)

use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::constants::opcodes::OpCode;
use crate::constants::typetag;
use crate::constants::types::{index_k, is_k, LUA_INSTRUCTION, UnpackedInstruction};
use crate::error::LuaError;
use crate::types::{AsLuaPointer, CoerceFrom, LuaType, ref_to_pointer};
use crate::types::upvalue::{Upvalue, UpvalueDesc};
use crate::types::value::LuaValue;
use crate::types::value::string::LuaString;
use crate::types::varargs::Varargs;
use crate::vm::LuaVM;

/// Struct for Lua function prototype
#[derive(Default)]
pub struct Prototype {
    /// Origin of this prototype; An optional string describing where this prototype was loaded from.
    pub source: Option<LuaString>,
    pub first_line_defined: u32,
    pub last_line_defined: u32,
    pub param_count: u8,
    pub is_vararg: bool,
    /// Amount of registers used by this function
    pub max_stack_size: u8,
    pub code: Vec<LUA_INSTRUCTION>,
    pub constants: Vec<LuaValue>,
    pub upvalue_descriptors: Vec<UpvalueDesc>,
    pub functions: Vec<Rc<Prototype>>,
    /// Source line for each instruction
    pub lineinfo: Vec<u32>,
    pub upvalue_names: Vec<Option<LuaString>>,
}

impl Prototype {
    /// Returns line for a given program counter index, if available
    pub fn get_line(&self, pc: usize) -> Option<u32> {
        self.lineinfo.get(pc).copied()
    }

    /// Name of this prototype's source, or "?" if unknown
    pub fn source_name(&self) -> String {
        self.source.as_ref()
            .map(|source| source.to_string())
            .unwrap_or_else(|| String::from("?"))
    }
}

/// Displays a B/C operand as either register or constant
struct RK<'a>(&'a Prototype, usize);

impl<'a> Display for RK<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let RK(proto, operand) = *self;
        if is_k(operand) {
            write!(f, "`{}`", proto.constants.get(index_k(operand)).unwrap_or(&LuaValue::NIL))
        } else {
            write!(f, "R[{}]", operand)
        }
    }
}

/// Utility struct, packs all information needed to Display a LUA_INSTRUCTION
pub struct InstructionDisplay<'a> {
    pub(crate) proto: &'a Prototype,
    pub(crate) index: usize,
    pub(crate) instruction: LUA_INSTRUCTION,
}

impl<'a> Display for InstructionDisplay<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let InstructionDisplay { proto, index, instruction } = *self;
        let UnpackedInstruction { opcode, a, b, c, bx, sbx, ax } = instruction.unpack();
        let op = match OpCode::from_u8(opcode) {
            Some(op) => op,
            None => return write!(f, "[UNKNOWN OPCODE] {}", opcode),
        };
        let rk = |operand| RK(proto, operand);
        let constant = |idx: usize| proto.constants.get(idx).unwrap_or(&LuaValue::NIL);
        // Jump targets are displayed 1-based, relative to the instruction after this one
        let target = (index as isize) + sbx + 2;

        match op {
            OpCode::MOVE => write!(f, "MOVE\tR[{}] = R[{}]", a, b),
            OpCode::LOADK => write!(f, "LOADK\tR[{}] = `{}`", a, constant(bx)),
            OpCode::LOADKX => write!(f, "LOADKX\tR[{}] = K(EXTRAARG)", a),
            OpCode::LOADBOOL => {
                if c != 0 {
                    write!(f, "LOADBOOL\tR[{}] = {}; pc++", a, b != 0)
                } else {
                    write!(f, "LOADBOOL\tR[{}] = {}", a, b != 0)
                }
            }
            OpCode::LOADNIL => write!(f, "LOADNIL\tR[{}..={}] = nil", a, a + b),
            OpCode::GETUPVAL => write!(f, "GETUPVAL\tR[{}] = Upval[{}]", a, b),
            OpCode::GETTABUP => write!(f, "GETTABUP\tR[{}] = Upval[{}][{}]", a, b, rk(c)),
            OpCode::GETTABLE => write!(f, "GETTABLE\tR[{}] = R[{}][{}]", a, b, rk(c)),
            OpCode::SETTABUP => write!(f, "SETTABUP\tUpval[{}][{}] = {}", a, rk(b), rk(c)),
            OpCode::SETUPVAL => write!(f, "SETUPVAL\tUpval[{}] = R[{}]", b, a),
            OpCode::SETTABLE => write!(f, "SETTABLE\tR[{}][{}] = {}", a, rk(b), rk(c)),
            OpCode::NEWTABLE => write!(f, "NEWTABLE\tR[{}] = {{}}", a),
            OpCode::SELF => write!(f, "SELF\tR[{}] = R[{}]; R[{}] = R[{}][{}]", a + 1, b, a, b, rk(c)),
            OpCode::ADD => write!(f, "ADD\tR[{}] = {} + {}", a, rk(b), rk(c)),
            OpCode::SUB => write!(f, "SUB\tR[{}] = {} - {}", a, rk(b), rk(c)),
            OpCode::MUL => write!(f, "MUL\tR[{}] = {} * {}", a, rk(b), rk(c)),
            OpCode::MOD => write!(f, "MOD\tR[{}] = {} % {}", a, rk(b), rk(c)),
            OpCode::POW => write!(f, "POW\tR[{}] = {} ^ {}", a, rk(b), rk(c)),
            OpCode::DIV => write!(f, "DIV\tR[{}] = {} / {}", a, rk(b), rk(c)),
            OpCode::IDIV => write!(f, "IDIV\tR[{}] = {} // {}", a, rk(b), rk(c)),
            OpCode::BAND => write!(f, "BAND\tR[{}] = {} & {}", a, rk(b), rk(c)),
            OpCode::BOR => write!(f, "BOR\tR[{}] = {} | {}", a, rk(b), rk(c)),
            OpCode::BXOR => write!(f, "BXOR\tR[{}] = {} ~ {}", a, rk(b), rk(c)),
            OpCode::SHL => write!(f, "SHL\tR[{}] = {} << {}", a, rk(b), rk(c)),
            OpCode::SHR => write!(f, "SHR\tR[{}] = {} >> {}", a, rk(b), rk(c)),
            OpCode::UNM => write!(f, "UNM\tR[{}] = -R[{}]", a, b),
            OpCode::BNOT => write!(f, "BNOT\tR[{}] = ~R[{}]", a, b),
            OpCode::NOT => write!(f, "NOT\tR[{}] = not R[{}]", a, b),
            OpCode::LEN => write!(f, "LEN\tR[{}] = #R[{}]", a, b),
            OpCode::CONCAT => write!(f, "CONCAT\tR[{}] = R[{}] .. ... .. R[{}]", a, b, c),
            OpCode::JMP => {
                if a != 0 {
                    write!(f, "JMP\tto {} ({:+}); close R[{}..]", target, sbx, a - 1)
                } else {
                    write!(f, "JMP\tto {} ({:+})", target, sbx)
                }
            }
            OpCode::EQ => write!(f, "EQ\tif ({} == {}) ~= {} then pc++", rk(b), rk(c), a != 0),
            OpCode::LT => write!(f, "LT\tif ({} < {}) ~= {} then pc++", rk(b), rk(c), a != 0),
            OpCode::LE => write!(f, "LE\tif ({} <= {}) ~= {} then pc++", rk(b), rk(c), a != 0),
            OpCode::TEST => {
                if c == 0 {
                    write!(f, "TEST\tif not R[{}] then pc++", a)
                } else {
                    write!(f, "TEST\tif R[{}] then pc++", a)
                }
            }
            OpCode::TESTSET => write!(f, "TESTSET\tif R[{}] is {} then R[{}] = R[{}] else pc++", b, c != 0, a, b),
            OpCode::CALL => {
                let args = if b == 0 { format!("R[{}..top]", a + 1) } else { format!("R[{}..{}]", a + 1, a + b) };
                if c == 0 {
                    write!(f, "CALL\tR[{}..top] = R[{}]({})", a, a, args)
                } else {
                    write!(f, "CALL\tR[{}..{}] = R[{}]({})", a, a + c - 1, a, args)
                }
            }
            OpCode::TAILCALL => {
                if b == 0 {
                    write!(f, "TAILCALL\treturn R[{}](R[{}..top])", a, a + 1)
                } else {
                    write!(f, "TAILCALL\treturn R[{}](R[{}..{}])", a, a + 1, a + b)
                }
            }
            OpCode::RETURN => {
                if b == 0 {
                    write!(f, "RETURN\treturn R[{}..top]", a)
                } else {
                    write!(f, "RETURN\treturn R[{}..{}]", a, a + b - 1)
                }
            }
            OpCode::FORLOOP => write!(f, "FORLOOP\tR[{}] += R[{}]; if R[{}] <?= R[{}] then jump to {}", a, a + 2, a, a + 1, target),
            OpCode::FORPREP => write!(f, "FORPREP\tR[{}] -= R[{}]; jump to {}", a, a + 2, target),
            OpCode::TFORCALL => write!(f, "TFORCALL\tR[{}..{}] = R[{}](R[{}], R[{}])", a + 3, a + 2 + c, a, a + 1, a + 2),
            OpCode::TFORLOOP => write!(f, "TFORLOOP\tif R[{}] ~= nil then R[{}] = R[{}]; jump to {}", a + 1, a, a + 1, target),
            OpCode::SETLIST => {
                if b == 0 {
                    write!(f, "SETLIST\tR[{}][({}-1)*50+i] = R[{}+i], 1 <= i <= top", a, c, a)
                } else {
                    write!(f, "SETLIST\tR[{}][({}-1)*50+i] = R[{}+i], 1 <= i <= {}", a, c, a, b)
                }
            }
            OpCode::CLOSURE => write!(f, "CLOSURE\tR[{}] = closure({})", a, bx),
            OpCode::VARARG => {
                if b == 0 {
                    write!(f, "VARARG\tR[{}..top] = ...", a)
                } else {
                    write!(f, "VARARG\tR[{}..{}] = ...", a, (a + b).saturating_sub(2))
                }
            }
            OpCode::EXTRAARG => write!(f, "EXTRAARG\t{}", ax),
        }
    }
}

impl Display for Prototype {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.code.iter().enumerate() {
            let display = InstructionDisplay { proto: self, index, instruction: *instruction };
            match self.get_line(index) {
                Some(line) => writeln!(f, "{}\t[{}]\t{}", index + 1, line, display)?,
                None => writeln!(f, "{}\t{}", index + 1, display)?,
            }
        }
        writeln!(f, "CONSTANTS: {}", self.constants.len())?;
        for (index, constant) in self.constants.iter().enumerate() {
            writeln!(f, "{}\t{}", index, constant)?;
        }

        writeln!(f, "UPVALUES: {}", self.upvalue_descriptors.len())?;
        for (index, upvalue) in self.upvalue_descriptors.iter().enumerate() {
            match self.upvalue_names.get(index) {
                Some(Some(name)) => writeln!(f, "{}\t{}\t{}", index, name, upvalue)?,
                _ => writeln!(f, "{}\t-\t{}", index, upvalue)?,
            }
        }

        writeln!(f, "FUNCTIONS: {}", self.functions.len())?;
        for (index, function) in self.functions.iter().enumerate() {
            write!(f, "Function-{}\n{}", index, function)?;
        }
        Ok(())
    }
}

impl Debug for Prototype {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prototype")
            .field("source", &self.source_name())
            .field("lines", &(self.first_line_defined..=self.last_line_defined))
            .field("params", &self.param_count)
            .field("vararg", &self.is_vararg)
            .finish()
    }
}

/// Signature of host functions
pub type RustFunctionPointer = fn(&mut LuaVM, &[LuaValue]) -> Result<Varargs, LuaError>;

/// Struct wrapper for rust function pointers, attaches a name to function
#[derive(Copy, Clone)]
pub struct RustFunction {
    name: &'static str,
    function: RustFunctionPointer,
}

impl RustFunction {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl LuaType for RustFunction {
    const TYPE_NAME: &'static str = "rust function";
}

/// Wrapper struct for prototypes; Packaging prototype and it's upvalues
#[derive(Clone)]
pub struct LuaClosure {
    prototype: Rc<Prototype>,
    upvalues: Rc<[Upvalue]>, // Allocation doubles as "identity" pointer for this object
}

impl LuaType for LuaClosure {
    const TYPE_NAME: &'static str = "lua closure";
}

impl LuaClosure {
    /// Creates new LuaClosure, for proper execution upvalues must match those expected by prototype.
    ///
    /// Top-level scripts expect only the _ENV upvalue
    pub fn new(prototype: Rc<Prototype>, upvalues: Vec<Upvalue>) -> LuaClosure {
        LuaClosure {
            prototype,
            upvalues: Rc::from(upvalues),
        }
    }

    #[inline(always)]
    pub fn prototype(&self) -> &Prototype {
        &self.prototype
    }

    #[inline(always)]
    pub fn upvalues(&self) -> &[Upvalue] {
        &self.upvalues
    }

    #[inline(always)]
    pub fn clone_prototype(&self) -> Rc<Prototype> {
        self.prototype.clone()
    }
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaClosure {
    fn coerce_opt(value: &T) -> Option<Self> {
        if let LuaValue::FUNCTION(LuaFunction::LUA_CLOSURE(func)) = value.clone().into() {
            Some(func)
        } else {
            None
        }
    }
}

impl Debug for LuaClosure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaClosure")
            .field("prototype", &*self.prototype)
            .field("upvalues", &&*self.upvalues)
            .finish()
    }
}

/// Top level type for Lua functions
#[allow(non_camel_case_types)]
#[derive(Clone)]
pub enum LuaFunction {
    LUA_CLOSURE(LuaClosure),
    RUST_FUNCTION(RustFunction),
}

impl LuaFunction {
    pub fn new_rust(name: &'static str, function: RustFunctionPointer) -> LuaFunction {
        LuaFunction::RUST_FUNCTION(RustFunction { name, function })
    }

    pub fn new_lua(prototype: Rc<Prototype>, upvalues: Vec<Upvalue>) -> LuaFunction {
        LuaFunction::LUA_CLOSURE(LuaClosure::new(prototype, upvalues))
    }

    pub fn type_tag(&self) -> u8 {
        match self {
            LuaFunction::LUA_CLOSURE(_) => typetag::TLCL,
            LuaFunction::RUST_FUNCTION(_) => typetag::TLCF,
        }
    }
}

impl LuaType for LuaFunction {
    const TYPE_NAME: &'static str = "function";
}

impl<T: Into<LuaValue> + Clone> CoerceFrom<T> for LuaFunction {
    fn coerce_opt(value: &T) -> Option<Self> {
        if let LuaValue::FUNCTION(func) = value.clone().into() {
            Some(func)
        } else {
            None
        }
    }
}

impl Debug for LuaFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LuaFunction::LUA_CLOSURE(c) => f.debug_tuple("LuaFunction::LUA_CLOSURE").field(&*c.prototype).field(&&*c.upvalues).finish(),
            LuaFunction::RUST_FUNCTION(func) => f.debug_tuple("LuaFunction::RUST_FUNCTION").field(&func.name).field(&(func.function as *const ())).finish(),
        }
    }
}

impl Display for LuaFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LuaFunction::LUA_CLOSURE(_) => write!(f, "function: 0x{:x}", self.as_lua_pointer()),
            LuaFunction::RUST_FUNCTION(func) => write!(f, "function: builtin: {}", func.name),
        }
    }
}

impl AsLuaPointer for LuaFunction {
    fn as_lua_pointer(&self) -> usize {
        match self {
            LuaFunction::LUA_CLOSURE(c) => ref_to_pointer(&*c.upvalues),
            LuaFunction::RUST_FUNCTION(f) => f.function as *const () as usize,      // Deref function pointer into raw pointer
        }
    }
}

impl Eq for LuaFunction {}

impl PartialEq for LuaFunction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaFunction::LUA_CLOSURE(lhs), LuaFunction::LUA_CLOSURE(rhs)) => Rc::ptr_eq(&lhs.upvalues, &rhs.upvalues),
            (LuaFunction::RUST_FUNCTION(_), LuaFunction::RUST_FUNCTION(_)) => self.as_lua_pointer() == other.as_lua_pointer(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::constants::opcodes::OpCode;
    use crate::constants::types::{LUA_INSTRUCTION, rk_constant};
    use crate::types::value::function::{InstructionDisplay, LuaFunction, Prototype};
    use crate::types::value::LuaValue;

    #[test]
    fn disassembly() {
        let proto = Prototype {
            code: vec![
                LUA_INSTRUCTION::abc(OpCode::ADD, 0, 1, rk_constant(0)),
                LUA_INSTRUCTION::asbx(OpCode::JMP, 0, -2),
            ],
            constants: vec![LuaValue::from(5i64)],
            ..Prototype::default()
        };
        let add = InstructionDisplay { proto: &proto, index: 0, instruction: proto.code[0] }.to_string();
        assert_eq!(add, "ADD\tR[0] = R[1] + `5`");
        let jump = InstructionDisplay { proto: &proto, index: 1, instruction: proto.code[1] }.to_string();
        assert_eq!(jump, "JMP\tto 1 (-2)");

        let listing = proto.to_string();
        assert!(listing.starts_with("1\tADD\tR[0] = R[1] + `5`\n2\tJMP\tto 1 (-2)\nCONSTANTS: 1\n0\t5\n"));
        assert!(listing.ends_with("UPVALUES: 0\nFUNCTIONS: 0\n"));
    }

    #[test]
    fn closure_identity() {
        let proto = Rc::new(Prototype::default());
        let first = LuaFunction::new_lua(proto.clone(), vec![]);
        let second = LuaFunction::new_lua(proto, vec![]);
        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }
}
