//! Module for definition of most constants used in this VM
//!
//! Default values assume an x86 64bit architecture, and may need to be changed when compiling targeting a significantly different architecture

use types::LUA_INT;

/// Types used for numerical values and instructions
#[allow(non_camel_case_types)]
pub mod types {
    use std::fmt::{Debug, Formatter};

    use crate::constants::opcodes::{OpCode, OpMode};

    /// Representation of Lua integers
    pub type LUA_INT = i64;
    /// Unsigned equivalent of [`LUA_INT`], must have equal size as LUA_INT in memory
    pub type LUA_INT_UNSIGNED = u64;
    /// Representation of Lua floats, must have equal size as LUA_INT in memory
    pub type LUA_FLOAT = f64;

    pub const SIZE_OP: u32 = 6;
    pub const SIZE_A: u32 = 8;
    pub const SIZE_B: u32 = 9;
    pub const SIZE_C: u32 = 9;
    pub const SIZE_BX: u32 = SIZE_B + SIZE_C;
    pub const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C;

    pub const POS_OP: u32 = 0;
    pub const POS_A: u32 = POS_OP + SIZE_OP;
    pub const POS_C: u32 = POS_A + SIZE_A;
    pub const POS_B: u32 = POS_C + SIZE_C;
    pub const POS_BX: u32 = POS_C;
    pub const POS_AX: u32 = POS_A;

    pub const MAXARG_A: usize = (1 << SIZE_A) - 1;
    pub const MAXARG_B: usize = (1 << SIZE_B) - 1;
    pub const MAXARG_C: usize = (1 << SIZE_C) - 1;
    pub const MAXARG_BX: usize = (1 << SIZE_BX) - 1;
    pub const MAXARG_SBX: isize = (MAXARG_BX >> 1) as isize;
    pub const MAXARG_AX: usize = (1 << SIZE_AX) - 1;

    /// Bit marking a B/C operand as a constant index rather than a register
    pub const BITRK: usize = 1 << (SIZE_B - 1);
    /// Largest constant index addressable through an RK operand
    pub const MAXINDEXRK: usize = BITRK - 1;

    /// Returns true if the B/C operand `x` refers to the constant pool
    #[inline(always)]
    pub fn is_k(x: usize) -> bool {
        x & BITRK != 0
    }

    /// Constant pool index of RK operand `x`
    #[inline(always)]
    pub fn index_k(x: usize) -> usize {
        x & !BITRK
    }

    /// Encodes constant index `idx` as an RK operand
    pub fn rk_constant(idx: usize) -> usize {
        debug_assert!(idx <= MAXINDEXRK);
        idx | BITRK
    }

    #[inline(always)]
    const fn mask(size: u32) -> u32 {
        !((!0u32) << size)
    }

    /// Lua instruction type, newtype around u32
    #[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
    pub struct LUA_INSTRUCTION {
        pub(crate) inner: u32,
    }

    /// Unpacked instruction, each field of the instruction separated out
    ///
    /// NOTE: While each argument is determined for every opcode, their values may not be valid or applicable
    /// See: <http://www.lua.org/source/5.3/lopcodes.h.html> for which opcodes use which arguments
    pub struct UnpackedInstruction {
        pub opcode: u8,
        pub a: usize,
        pub b: usize,
        pub c: usize,
        pub bx: usize,
        pub sbx: isize,
        pub ax: usize,
    }

    impl LUA_INSTRUCTION {
        /// Returns a guaranteed-invalid instruction, the returned value is not guaranteed to remain invalid in future versions and accordingly should not be persisted
        pub fn invalid() -> Self {
            LUA_INSTRUCTION { inner: u32::MAX }
        }

        pub fn from_raw(raw: u32) -> Self {
            LUA_INSTRUCTION { inner: raw }
        }

        pub fn raw(self) -> u32 {
            self.inner
        }

        pub fn abc(op: OpCode, a: usize, b: usize, c: usize) -> Self {
            debug_assert!(op.mode() == OpMode::ABC);
            debug_assert!(a <= MAXARG_A && b <= MAXARG_B && c <= MAXARG_C);
            LUA_INSTRUCTION {
                inner: ((op as u32) << POS_OP) | ((a as u32) << POS_A) | ((b as u32) << POS_B) | ((c as u32) << POS_C)
            }
        }

        pub fn abx(op: OpCode, a: usize, bx: usize) -> Self {
            debug_assert!(a <= MAXARG_A && bx <= MAXARG_BX);
            LUA_INSTRUCTION {
                inner: ((op as u32) << POS_OP) | ((a as u32) << POS_A) | ((bx as u32) << POS_BX)
            }
        }

        pub fn asbx(op: OpCode, a: usize, sbx: isize) -> Self {
            debug_assert!(op.mode() == OpMode::AsBx);
            Self::abx(op, a, (sbx + MAXARG_SBX) as usize)
        }

        pub fn ax(op: OpCode, ax: usize) -> Self {
            debug_assert!(ax <= MAXARG_AX);
            LUA_INSTRUCTION {
                inner: ((op as u32) << POS_OP) | ((ax as u32) << POS_AX)
            }
        }

        /// Encodes `op` with operands in the order of it's [`OpMode`]; Missing operands are 0
        pub fn encode(op: OpCode, operands: &[isize]) -> Self {
            let operand = |i: usize| operands.get(i).copied().unwrap_or(0);
            match op.mode() {
                OpMode::ABC => Self::abc(op, operand(0) as usize, operand(1) as usize, operand(2) as usize),
                OpMode::ABx => Self::abx(op, operand(0) as usize, operand(1) as usize),
                OpMode::AsBx => Self::asbx(op, operand(0) as usize, operand(1)),
                OpMode::Ax => Self::ax(op, operand(0) as usize),
            }
        }

        /// Returns opcode number for this instruction
        pub fn opcode(self) -> u8 {
            ((self.inner >> POS_OP) & mask(SIZE_OP)) as u8
        }

        /// Returns the decoded opcode, or None if the opcode number is not known
        pub fn op(self) -> Option<OpCode> {
            OpCode::from_u8(self.opcode())
        }

        pub fn opcode_name(self) -> &'static str {
            crate::constants::opcodes::opcode_name(self.opcode())
        }

        /// Unpacks a [`LUA_INSTRUCTION`] into a [`UnpackedInstruction`]; Making it's fields directly accessible.
        #[inline(always)]   // Unused fields get optimized out when inlined
        pub fn unpack(self) -> UnpackedInstruction {
            let opcode = self.opcode();
            let a = ((self.inner >> POS_A) & mask(SIZE_A)) as usize;
            let b = ((self.inner >> POS_B) & mask(SIZE_B)) as usize;
            let c = ((self.inner >> POS_C) & mask(SIZE_C)) as usize;
            let bx = ((self.inner >> POS_BX) & mask(SIZE_BX)) as usize;
            let sbx = bx as isize - MAXARG_SBX;
            let ax = ((self.inner >> POS_AX) & mask(SIZE_AX)) as usize;

            UnpackedInstruction { opcode, a, b, c, bx, sbx, ax }
        }
    }

    impl Debug for LUA_INSTRUCTION {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("LuaInstruction").field(&self.opcode_name()).finish()
        }
    }

    // Compile-time assertions
    static _ASSERTIONS: () = {
        if std::mem::size_of::<LUA_INT>() != std::mem::size_of::<LUA_INT_UNSIGNED>() {
            panic!("Signed and Unsigned LUA_INT must have equal size in memory!")
        };
        if std::mem::size_of::<LUA_FLOAT>() != std::mem::size_of::<LUA_INT>() {
            panic!("LUA_FLOAT and LUA_INT must have equal size in memory!")
        };
        if SIZE_OP + SIZE_A + SIZE_B + SIZE_C != 32 {
            panic!("Instruction fields must fill exactly 32 bits")
        };
    };
}

/// Lua type tags
///
/// The low nibble is the basic type, bits 4-5 select the variant.
#[allow(unused)]
pub mod typetag {
    pub const TNIL: u8 = 0;
    pub const TBOOLEAN: u8 = 1;
    pub const TLIGHTUSERDATA: u8 = 2;
    pub const TNUMBER: u8 = 3;
    pub const TSTRING: u8 = 4;
    pub const TTABLE: u8 = 5;
    pub const TFUNCTION: u8 = 6;
    pub const TUSERDATA: u8 = 7;

    pub const TNUMFLT: u8 = TNUMBER | (0 << 4);
    pub const TNUMINT: u8 = TNUMBER | (1 << 4);

    pub const TSHRSTR: u8 = TSTRING | (0 << 4);
    pub const TLNGSTR: u8 = TSTRING | (1 << 4);

    /// Lua closure
    pub const TLCL: u8 = TFUNCTION | (0 << 4);
    /// Light Rust function
    pub const TLCF: u8 = TFUNCTION | (1 << 4);
}

/// Lua short string length limit; Strings up to this length are considered "short"
pub const SHORT_STRING_LENGTH: usize = 40;

/// Number of list items accumulated before a SETLIST instruction
pub const LFIELDS_PER_FLUSH: usize = 50;

/// Largest table part preallocated from a NEWTABLE size hint
pub const MAX_SIZE_HINT: usize = 1 << 16;

/// Limit for `__index`/`__newindex` chains, to detect loops
pub const MAX_TAG_LOOP: usize = 2000;

/// Minimum number of free stack slots available to a function
pub const LUA_MINSTACK: usize = 20;

/// Initial size of the register stack
pub const BASIC_STACK_SIZE: usize = 2 * LUA_MINSTACK;

/// Default limit on the size of the register stack
pub const LUAI_MAXSTACK: usize = 1_000_000;

/// Default limit on nested host invocations of the VM
pub const LUAI_MAXCCALLS: usize = 200;

pub const LUA_MAXINTEGER: LUA_INT = LUA_INT::MAX;
pub const LUA_MININTEGER: LUA_INT = LUA_INT::MIN;

macro_rules! def_opcodes {
    ($($name:ident = $id:expr, $mode:ident);+;) => {
        /// Lua opcodes
        ///
        /// See: <http://www.lua.org/source/5.3/lopcodes.h.html>
        pub mod opcodes {
            /// Operand layout of an instruction
            #[derive(Copy, Clone, Debug, Eq, PartialEq)]
            pub enum OpMode {
                ABC,
                ABx,
                AsBx,
                Ax,
            }

            /// Closed set of opcodes understood by the dispatch loop
            #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
            #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
            #[repr(u8)]
            pub enum OpCode {
                $($name = $id,)+
            }

            impl OpCode {
                pub fn from_u8(code: u8) -> Option<OpCode> {
                    match code {
                        $($id => Some(OpCode::$name),)+
                        _ => None
                    }
                }

                pub fn name(self) -> &'static str {
                    match self {
                        $(OpCode::$name => stringify!($name),)+
                    }
                }

                pub fn mode(self) -> OpMode {
                    match self {
                        $(OpCode::$name => OpMode::$mode,)+
                    }
                }
            }

            pub fn opcode_name(code: u8) -> &'static str {
                match OpCode::from_u8(code) {
                    Some(op) => op.name(),
                    None => "[UNKNOWN OPCODE]"
                }
            }
        }
    };
}

def_opcodes!(
    MOVE = 0, ABC;
    LOADK = 1, ABx;
    LOADKX = 2, ABx;
    LOADBOOL = 3, ABC;
    LOADNIL = 4, ABC;
    GETUPVAL = 5, ABC;

    GETTABUP = 6, ABC;
    GETTABLE = 7, ABC;

    SETTABUP = 8, ABC;
    SETUPVAL = 9, ABC;
    SETTABLE = 10, ABC;

    NEWTABLE = 11, ABC;

    SELF = 12, ABC;

    ADD = 13, ABC;
    SUB = 14, ABC;
    MUL = 15, ABC;
    MOD = 16, ABC;
    POW = 17, ABC;
    DIV = 18, ABC;
    IDIV = 19, ABC;
    BAND = 20, ABC;
    BOR = 21, ABC;
    BXOR = 22, ABC;
    SHL = 23, ABC;
    SHR = 24, ABC;
    UNM = 25, ABC;
    BNOT = 26, ABC;
    NOT = 27, ABC;
    LEN = 28, ABC;

    CONCAT = 29, ABC;

    JMP = 30, AsBx;
    EQ = 31, ABC;
    LT = 32, ABC;
    LE = 33, ABC;

    TEST = 34, ABC;
    TESTSET = 35, ABC;

    CALL = 36, ABC;
    TAILCALL = 37, ABC;
    RETURN = 38, ABC;

    FORLOOP = 39, AsBx;
    FORPREP = 40, AsBx;

    TFORCALL = 41, ABC;
    TFORLOOP = 42, AsBx;

    SETLIST = 43, ABC;

    CLOSURE = 44, ABx;

    VARARG = 45, ABC;

    EXTRAARG = 46, Ax;
);

#[cfg(test)]
mod tests {
    use crate::constants::opcodes::OpCode;
    use crate::constants::types::{index_k, is_k, rk_constant, LUA_INSTRUCTION, MAXARG_SBX};

    #[test]
    fn instruction_fields() {
        let i = LUA_INSTRUCTION::abc(OpCode::ADD, 3, rk_constant(7), 200);
        let unpacked = i.unpack();
        assert_eq!(i.op(), Some(OpCode::ADD));
        assert_eq!(unpacked.a, 3);
        assert!(is_k(unpacked.b));
        assert_eq!(index_k(unpacked.b), 7);
        assert!(!is_k(unpacked.c));
        assert_eq!(unpacked.c, 200);
    }

    #[test]
    fn signed_jumps() {
        for offset in [-MAXARG_SBX, -1, 0, 1, 12345, MAXARG_SBX] {
            let i = LUA_INSTRUCTION::asbx(OpCode::JMP, 0, offset);
            assert_eq!(i.unpack().sbx, offset);
        }
    }

    #[test]
    fn unknown_opcode() {
        assert_eq!(LUA_INSTRUCTION::invalid().op(), None);
        assert_eq!(LUA_INSTRUCTION::invalid().opcode_name(), "[UNKNOWN OPCODE]");
        assert_eq!(LUA_INSTRUCTION::ax(OpCode::EXTRAARG, 99).opcode_name(), "EXTRAARG");
        assert_eq!(LUA_INSTRUCTION::from_raw(63).op(), None);
    }

    #[test]
    fn raw_words() {
        // `RETURN 0 1` as emitted by luac 5.3
        let i = LUA_INSTRUCTION::from_raw(0x0080_0026);
        assert_eq!(i.op(), Some(OpCode::RETURN));
        assert_eq!(i.unpack().a, 0);
        assert_eq!(i.unpack().b, 1);
        assert_eq!(LUA_INSTRUCTION::abc(OpCode::RETURN, 0, 1, 0).raw(), 0x0080_0026);
    }
}
