//! Function prototypes: the unit a precompiled chunk serializes.
//!
//! A chunk is one top-level [`Proto`] owning its nested prototypes as a
//! tree. Everything here is plain data; execution state (upvalue cells,
//! call frames) lives elsewhere.

use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use vela_core::{StrRef, Value};

use crate::instr::Instruction;

/// Vararg behaviour of a function, as stored in its prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct VarargFlags(u8);

bitflags! {
    impl VarargFlags: u8 {
        /// Declares `...` and also materializes the legacy `arg` table.
        const HAS_ARG = 1;
        /// Declares `...`.
        const IS_VARARG = 2;
        /// Body actually reads `arg`, so the table must be built.
        const NEEDS_ARG = 4;
    }
}

/// Debug record for one local variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocalVar {
    /// Variable name.
    pub name: StrRef,
    /// First instruction (0-based pc) where the variable is live.
    pub start_pc: u32,
    /// First instruction where the variable is dead.
    pub end_pc: u32,
}

/// One compiled function.
///
/// Counts that the wire format stores as bytes (`num_upvalues`,
/// `num_params`, `max_stack_size`) stay `u8` here so a prototype can
/// always be re-serialized losslessly.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Proto {
    /// Origin label ("@file", "=name", or the source text itself).
    /// `None` means "inherit from the enclosing function" on the wire.
    pub source: Option<StrRef>,
    /// Line of the `function` keyword, 0 for a main chunk.
    pub line_defined: u32,
    /// Line of the matching `end`, 0 for a main chunk.
    pub last_line_defined: u32,
    /// Number of upvalues.
    pub num_upvalues: u8,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Vararg behaviour.
    pub vararg: VarargFlags,
    /// Registers the function needs.
    pub max_stack_size: u8,
    /// Instruction stream.
    pub code: Vec<Instruction>,
    /// Constant pool, indexed by `Kst`/`RK` operands.
    pub constants: Vec<Value>,
    /// Nested function prototypes, indexed by `CLOSURE`.
    pub protos: Vec<Proto>,
    /// Source line per instruction (parallel to `code`; may be empty
    /// when debug info was stripped).
    pub lines: Vec<u32>,
    /// Local variable records, in declaration order.
    pub locals: Vec<LocalVar>,
    /// Upvalue names, parallel to the upvalue indices.
    pub upvalue_names: Vec<StrRef>,
}

impl Proto {
    /// An empty prototype (no code, no constants).
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the function accepts `...`.
    pub fn is_vararg(&self) -> bool {
        self.vararg.contains(VarargFlags::IS_VARARG)
    }

    /// Source line for instruction `pc`, when debug info is present.
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.lines.get(pc).copied()
    }

    /// Total prototypes in this tree, this one included.
    pub fn tree_size(&self) -> usize {
        1 + self.protos.iter().map(Proto::tree_size).sum::<usize>()
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
