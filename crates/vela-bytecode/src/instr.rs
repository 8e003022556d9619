//! Fixed-width instruction words and their bit-level codec.
//!
//! Every instruction is one unsigned 32-bit word. The low 6 bits hold the
//! opcode; the remaining bits hold the arguments in one of three layouts:
//!
//! ```text
//!  31      23 22      14 13       6 5      0
//! +----------+----------+----------+--------+
//! |   B:9    |   C:9    |   A:8    |  OP:6  |   iABC
//! +----------+----------+----------+--------+
//! |        Bx:18        |   A:8    |  OP:6  |   iABx
//! +---------------------+----------+--------+
//! |       sBx:18        |   A:8    |  OP:6  |   iAsBx
//! +---------------------+----------+--------+
//! ```
//!
//! `sBx` is stored in excess-K form (`stored = value + MAXARG_SBX`), so
//! signed jump offsets order monotonically as unsigned words. A `B`/`C`
//! argument with [`BITRK`] set addresses the constant table instead of a
//! register (an "RK" argument).
//!
//! The codec is pure bit manipulation: no opcode or field range is
//! validated here. Encoders (the compiler) and decoders of untrusted
//! input (the loader plus the bytecode check) own range safety.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::opcode::OpCode;

/* ─────────────────────────── Field layout ─────────────────────────── */

/// Bits for the opcode field.
pub const SIZE_OP: u32 = 6;
/// Bits for argument A.
pub const SIZE_A: u32 = 8;
/// Bits for argument B.
pub const SIZE_B: u32 = 9;
/// Bits for argument C.
pub const SIZE_C: u32 = 9;
/// Bits for argument Bx (B and C combined).
pub const SIZE_BX: u32 = SIZE_B + SIZE_C;

/// Bit position of the opcode.
pub const POS_OP: u32 = 0;
/// Bit position of argument A.
pub const POS_A: u32 = POS_OP + SIZE_OP;
/// Bit position of argument C.
pub const POS_C: u32 = POS_A + SIZE_A;
/// Bit position of argument B.
pub const POS_B: u32 = POS_C + SIZE_C;
/// Bit position of argument Bx.
pub const POS_BX: u32 = POS_C;

/// Largest value argument A can carry.
pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
/// Largest value argument B can carry.
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
/// Largest value argument C can carry.
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
/// Largest value argument Bx can carry.
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
/// Largest magnitude of the signed argument sBx; also the excess-K bias.
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;

/// RK flag: set in a B/C argument to address the constant table.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index an RK argument can encode.
pub const MAXINDEXRK: u32 = BITRK - 1;
/// Register sentinel meaning "no register" (fits argument A).
pub const NO_REG: u32 = MAXARG_A;

/// Mask with `n` one bits at position `p`.
const fn mask1(n: u32, p: u32) -> u32 {
    (!(!0u32 << n)) << p
}

/// Mask with `n` zero bits at position `p`.
const fn mask0(n: u32, p: u32) -> u32 {
    !mask1(n, p)
}

/* ─────────────────────────── RK arguments ─────────────────────────── */

/// Whether an RK argument addresses the constant table.
pub const fn is_k(x: u32) -> bool {
    x & BITRK != 0
}

/// Strips the RK flag, leaving the constant index.
pub const fn index_k(x: u32) -> u32 {
    x & !BITRK
}

/// Encodes constant index `x` as an RK argument.
pub const fn rk_as_k(x: u32) -> u32 {
    x | BITRK
}

/* ─────────────────────────── Instruction ─────────────────────────── */

/// One encoded instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Instruction(pub u32);

impl Instruction {
    /// Builds an iABC instruction.
    pub const fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Self(((op as u32) << POS_OP) | (a << POS_A) | (b << POS_B) | (c << POS_C))
    }

    /// Builds an iABx instruction.
    pub const fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        Self(((op as u32) << POS_OP) | (a << POS_A) | (bx << POS_BX))
    }

    /// Builds an iAsBx instruction (`sbx` goes through the excess-K bias).
    pub const fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    /// Raw opcode bits (may be out of range on untrusted input).
    pub const fn opcode_raw(self) -> u32 {
        (self.0 >> POS_OP) & mask1(SIZE_OP, 0)
    }

    /// Decoded opcode, `None` when the bits exceed the opcode count.
    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u32(self.opcode_raw())
    }

    /// Argument A.
    pub const fn a(self) -> u32 {
        (self.0 >> POS_A) & mask1(SIZE_A, 0)
    }

    /// Argument B.
    pub const fn b(self) -> u32 {
        (self.0 >> POS_B) & mask1(SIZE_B, 0)
    }

    /// Argument C.
    pub const fn c(self) -> u32 {
        (self.0 >> POS_C) & mask1(SIZE_C, 0)
    }

    /// Argument Bx.
    pub const fn bx(self) -> u32 {
        (self.0 >> POS_BX) & mask1(SIZE_BX, 0)
    }

    /// Argument sBx, decoded from excess-K.
    pub const fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    /// Replaces the opcode bits.
    pub fn set_opcode(&mut self, op: OpCode) {
        self.0 = (self.0 & mask0(SIZE_OP, POS_OP)) | (((op as u32) << POS_OP) & mask1(SIZE_OP, POS_OP));
    }

    /// Replaces argument A.
    pub fn set_a(&mut self, a: u32) {
        self.0 = (self.0 & mask0(SIZE_A, POS_A)) | ((a << POS_A) & mask1(SIZE_A, POS_A));
    }

    /// Replaces argument B.
    pub fn set_b(&mut self, b: u32) {
        self.0 = (self.0 & mask0(SIZE_B, POS_B)) | ((b << POS_B) & mask1(SIZE_B, POS_B));
    }

    /// Replaces argument C.
    pub fn set_c(&mut self, c: u32) {
        self.0 = (self.0 & mask0(SIZE_C, POS_C)) | ((c << POS_C) & mask1(SIZE_C, POS_C));
    }

    /// Replaces argument Bx.
    pub fn set_bx(&mut self, bx: u32) {
        self.0 = (self.0 & mask0(SIZE_BX, POS_BX)) | ((bx << POS_BX) & mask1(SIZE_BX, POS_BX));
    }

    /// Replaces argument sBx (excess-K encoded).
    pub fn set_sbx(&mut self, sbx: i32) {
        self.set_bx((sbx + MAXARG_SBX) as u32);
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "Instruction({:#010x} {})", self.0, op.name()),
            None => write!(f, "Instruction({:#010x})", self.0),
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn abc_fields_decode_back() {
        let i = Instruction::abc(OpCode::Add, 17, MAXARG_B, 3);
        assert_eq!(i.opcode(), Some(OpCode::Add));
        assert_eq!(i.a(), 17);
        assert_eq!(i.b(), MAXARG_B);
        assert_eq!(i.c(), 3);
    }

    #[test]
    fn abx_spans_b_and_c() {
        let i = Instruction::abx(OpCode::LoadK, 0, MAXARG_BX);
        assert_eq!(i.bx(), MAXARG_BX);
        assert_eq!(i.b(), MAXARG_B);
        assert_eq!(i.c(), MAXARG_C);
    }

    #[test]
    fn sbx_extremes_round_trip() {
        for x in [-MAXARG_SBX, -1, 0, 1, MAXARG_SBX] {
            let i = Instruction::asbx(OpCode::Jmp, 0, x);
            assert_eq!(i.sbx(), x);
        }
        // excess-K, not two's complement: -MAXARG_SBX is stored as 0
        assert_eq!(Instruction::asbx(OpCode::Jmp, 0, -MAXARG_SBX).bx(), 0);
    }

    #[test]
    fn setters_leave_other_fields_alone() {
        let mut i = Instruction::abc(OpCode::Move, 1, 2, 3);
        i.set_b(400);
        assert_eq!(i.opcode(), Some(OpCode::Move));
        assert_eq!((i.a(), i.b(), i.c()), (1, 400, 3));
        i.set_a(99);
        assert_eq!((i.a(), i.b(), i.c()), (99, 400, 3));
        i.set_opcode(OpCode::Return);
        assert_eq!(i.opcode(), Some(OpCode::Return));
        assert_eq!((i.a(), i.b(), i.c()), (99, 400, 3));
    }

    #[test]
    fn rk_constants() {
        assert_eq!(BITRK, 256);
        assert_eq!(MAXINDEXRK, 255);
        assert_eq!(NO_REG, 255);
    }

    proptest! {
        #[test]
        fn sbx_round_trips(x in -MAXARG_SBX..=MAXARG_SBX) {
            prop_assert_eq!(Instruction::asbx(OpCode::Jmp, 0, x).sbx(), x);
        }

        #[test]
        fn rk_identities(k in 0u32..=MAXINDEXRK) {
            prop_assert!(is_k(rk_as_k(k)));
            prop_assert_eq!(index_k(rk_as_k(k)), k);
        }

        #[test]
        fn registers_are_never_constants(r in 0u32..BITRK) {
            prop_assert!(!is_k(r));
        }

        #[test]
        fn abc_fields_are_independent(a in 0..=MAXARG_A, b in 0..=MAXARG_B, c in 0..=MAXARG_C) {
            let i = Instruction::abc(OpCode::SetTable, a, b, c);
            prop_assert_eq!((i.a(), i.b(), i.c()), (a, b, c));
            prop_assert_eq!(i.opcode(), Some(OpCode::SetTable));
        }
    }
}
