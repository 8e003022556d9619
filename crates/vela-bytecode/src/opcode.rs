//! Opcode set and the per-opcode argument-mode metadata.
//!
//! Instruction shape is not uniform: the layout and the meaning of the
//! B/C arguments vary per opcode. Decoders (loader checks, disassembler)
//! must consult [`OpCode::info`] instead of assuming a shape.
//!
//! In the operation summaries, `R(x)` is register x, `Kst(x)` constant x,
//! `RK(x)` either (picked by the RK bit, see [`crate::instr::is_k`]),
//! `Gbl[k]` the global table and `Up[x]` upvalue x.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of opcodes.
pub const NUM_OPCODES: usize = 38;

/// List items accumulated per `SETLIST` flush.
pub const FIELDS_PER_FLUSH: u32 = 50;

/* ─────────────────────────── Modes ─────────────────────────── */

/// Basic instruction layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OpMode {
    /// opcode, A, B, C.
    Abc,
    /// opcode, A, Bx.
    Abx,
    /// opcode, A, sBx (excess-K signed).
    AsBx,
}

/// How an opcode uses its B or C argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArgMode {
    /// Argument not used.
    Unused,
    /// Argument used as a plain value (count, immediate, upvalue index).
    Used,
    /// Argument is a register or a jump offset.
    Reg,
    /// Argument is a constant index, or an RK register-or-constant.
    RegK,
}

/* ─────────────────────────── Opcodes ─────────────────────────── */

/// The Vela VM opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum OpCode {
    /// A B — `R(A) := R(B)`
    Move = 0,
    /// A Bx — `R(A) := Kst(Bx)`
    LoadK,
    /// A B C — `R(A) := (Bool)B; if C then pc++`
    LoadBool,
    /// A B — `R(A) := ... := R(B) := nil`
    LoadNil,
    /// A B — `R(A) := Up[B]`
    GetUpval,
    /// A Bx — `R(A) := Gbl[Kst(Bx)]`
    GetGlobal,
    /// A B C — `R(A) := R(B)[RK(C)]`
    GetTable,
    /// A Bx — `Gbl[Kst(Bx)] := R(A)`
    SetGlobal,
    /// A B — `Up[B] := R(A)`
    SetUpval,
    /// A B C — `R(A)[RK(B)] := RK(C)`
    SetTable,
    /// A B C — `R(A) := {}` (array/hash sizes B, C)
    NewTable,
    /// A B C — `R(A+1) := R(B); R(A) := R(B)[RK(C)]` (mnemonic `SELF`)
    SelfOp,
    /// A B C — `R(A) := RK(B) + RK(C)`
    Add,
    /// A B C — `R(A) := RK(B) - RK(C)`
    Sub,
    /// A B C — `R(A) := RK(B) * RK(C)`
    Mul,
    /// A B C — `R(A) := RK(B) / RK(C)`
    Div,
    /// A B C — `R(A) := RK(B) % RK(C)`
    Mod,
    /// A B C — `R(A) := RK(B) ^ RK(C)`
    Pow,
    /// A B — `R(A) := -R(B)`
    Unm,
    /// A B — `R(A) := not R(B)`
    Not,
    /// A B — `R(A) := length of R(B)`
    Len,
    /// A B C — `R(A) := R(B) .. ... .. R(C)`
    Concat,
    /// sBx — `pc += sBx`
    Jmp,
    /// A B C — `if (RK(B) == RK(C)) != A then pc++`
    Eq,
    /// A B C — `if (RK(B) < RK(C)) != A then pc++`
    Lt,
    /// A B C — `if (RK(B) <= RK(C)) != A then pc++`
    Le,
    /// A C — `if not (R(A) <=> C) then pc++`
    Test,
    /// A B C — `if (R(B) <=> C) then R(A) := R(B) else pc++`
    TestSet,
    /// A B C — `R(A), ..., R(A+C-2) := R(A)(R(A+1), ..., R(A+B-1))`
    Call,
    /// A B C — `return R(A)(R(A+1), ..., R(A+B-1))`
    TailCall,
    /// A B — `return R(A), ..., R(A+B-2)`
    Return,
    /// A sBx — `R(A) += R(A+2); if R(A) <?= R(A+1) then { pc += sBx; R(A+3) := R(A) }`
    ForLoop,
    /// A sBx — `R(A) -= R(A+2); pc += sBx`
    ForPrep,
    /// A C — `R(A+3), ..., R(A+2+C) := R(A)(R(A+1), R(A+2)); if R(A+3) != nil then R(A+2) := R(A+3) else pc++`
    TForLoop,
    /// A B C — `R(A)[(C-1)*FPF + i] := R(A+i), 1 <= i <= B` (C == 0 takes the real C from the next word)
    SetList,
    /// A — close all upvalues at or above `R(A)`
    Close,
    /// A Bx — `R(A) := closure(proto[Bx], R(A), ..., R(A+n))`
    Closure,
    /// A B — `R(A), R(A+1), ..., R(A+B-1) := vararg`
    Vararg,
}

const OPCODES: [OpCode; NUM_OPCODES] = [
    OpCode::Move,
    OpCode::LoadK,
    OpCode::LoadBool,
    OpCode::LoadNil,
    OpCode::GetUpval,
    OpCode::GetGlobal,
    OpCode::GetTable,
    OpCode::SetGlobal,
    OpCode::SetUpval,
    OpCode::SetTable,
    OpCode::NewTable,
    OpCode::SelfOp,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Pow,
    OpCode::Unm,
    OpCode::Not,
    OpCode::Len,
    OpCode::Concat,
    OpCode::Jmp,
    OpCode::Eq,
    OpCode::Lt,
    OpCode::Le,
    OpCode::Test,
    OpCode::TestSet,
    OpCode::Call,
    OpCode::TailCall,
    OpCode::Return,
    OpCode::ForLoop,
    OpCode::ForPrep,
    OpCode::TForLoop,
    OpCode::SetList,
    OpCode::Close,
    OpCode::Closure,
    OpCode::Vararg,
];

const OP_NAMES: [&str; NUM_OPCODES] = [
    "MOVE", "LOADK", "LOADBOOL", "LOADNIL", "GETUPVAL", "GETGLOBAL", "GETTABLE", "SETGLOBAL",
    "SETUPVAL", "SETTABLE", "NEWTABLE", "SELF", "ADD", "SUB", "MUL", "DIV", "MOD", "POW", "UNM",
    "NOT", "LEN", "CONCAT", "JMP", "EQ", "LT", "LE", "TEST", "TESTSET", "CALL", "TAILCALL",
    "RETURN", "FORLOOP", "FORPREP", "TFORLOOP", "SETLIST", "CLOSE", "CLOSURE", "VARARG",
];

/* ─────────────────────────── Metadata table ─────────────────────────── */

/// Per-opcode decode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Instruction layout.
    pub mode: OpMode,
    /// How B is used.
    pub b: ArgMode,
    /// How C is used.
    pub c: ArgMode,
    /// Whether the instruction writes register A.
    pub sets_a: bool,
    /// Whether this is a test (the next instruction must be a jump).
    pub is_test: bool,
}

const fn opmode(is_test: bool, sets_a: bool, b: ArgMode, c: ArgMode, mode: OpMode) -> OpInfo {
    OpInfo { mode, b, c, sets_a, is_test }
}

#[rustfmt::skip]
const OP_INFO: [OpInfo; NUM_OPCODES] = [
    /*                T      A      B               C               mode        */
    /* Move      */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::Abc),
    /* LoadK     */ opmode(false, true,  ArgMode::RegK,   ArgMode::Unused, OpMode::Abx),
    /* LoadBool  */ opmode(false, true,  ArgMode::Used,   ArgMode::Used,   OpMode::Abc),
    /* LoadNil   */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::Abc),
    /* GetUpval  */ opmode(false, true,  ArgMode::Used,   ArgMode::Unused, OpMode::Abc),
    /* GetGlobal */ opmode(false, true,  ArgMode::RegK,   ArgMode::Unused, OpMode::Abx),
    /* GetTable  */ opmode(false, true,  ArgMode::Reg,    ArgMode::RegK,   OpMode::Abc),
    /* SetGlobal */ opmode(false, false, ArgMode::RegK,   ArgMode::Unused, OpMode::Abx),
    /* SetUpval  */ opmode(false, false, ArgMode::Used,   ArgMode::Unused, OpMode::Abc),
    /* SetTable  */ opmode(false, false, ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* NewTable  */ opmode(false, true,  ArgMode::Used,   ArgMode::Used,   OpMode::Abc),
    /* SelfOp    */ opmode(false, true,  ArgMode::Reg,    ArgMode::RegK,   OpMode::Abc),
    /* Add       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Sub       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Mul       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Div       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Mod       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Pow       */ opmode(false, true,  ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Unm       */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::Abc),
    /* Not       */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::Abc),
    /* Len       */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::Abc),
    /* Concat    */ opmode(false, true,  ArgMode::Reg,    ArgMode::Reg,    OpMode::Abc),
    /* Jmp       */ opmode(false, false, ArgMode::Reg,    ArgMode::Unused, OpMode::AsBx),
    /* Eq        */ opmode(true,  false, ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Lt        */ opmode(true,  false, ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Le        */ opmode(true,  false, ArgMode::RegK,   ArgMode::RegK,   OpMode::Abc),
    /* Test      */ opmode(true,  true,  ArgMode::Reg,    ArgMode::Used,   OpMode::Abc),
    /* TestSet   */ opmode(true,  true,  ArgMode::Reg,    ArgMode::Used,   OpMode::Abc),
    /* Call      */ opmode(false, true,  ArgMode::Used,   ArgMode::Used,   OpMode::Abc),
    /* TailCall  */ opmode(false, true,  ArgMode::Used,   ArgMode::Used,   OpMode::Abc),
    /* Return    */ opmode(false, false, ArgMode::Used,   ArgMode::Unused, OpMode::Abc),
    /* ForLoop   */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::AsBx),
    /* ForPrep   */ opmode(false, true,  ArgMode::Reg,    ArgMode::Unused, OpMode::AsBx),
    /* TForLoop  */ opmode(true,  false, ArgMode::Unused, ArgMode::Used,   OpMode::Abc),
    /* SetList   */ opmode(false, false, ArgMode::Used,   ArgMode::Used,   OpMode::Abc),
    /* Close     */ opmode(false, false, ArgMode::Unused, ArgMode::Unused, OpMode::Abc),
    /* Closure   */ opmode(false, true,  ArgMode::Used,   ArgMode::Unused, OpMode::Abx),
    /* Vararg    */ opmode(false, true,  ArgMode::Used,   ArgMode::Unused, OpMode::Abc),
];

impl OpCode {
    /// Decodes an opcode from its wire value.
    pub fn from_u32(v: u32) -> Option<Self> {
        OPCODES.get(v as usize).copied()
    }

    /// Listing mnemonic.
    pub const fn name(self) -> &'static str {
        OP_NAMES[self as usize]
    }

    /// Decode metadata for this opcode.
    pub const fn info(self) -> OpInfo {
        OP_INFO[self as usize]
    }

    /// Layout shortcut.
    pub const fn mode(self) -> OpMode {
        self.info().mode
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
