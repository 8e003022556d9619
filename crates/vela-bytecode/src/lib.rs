//! Vela bytecode layer.
//!
//! Everything between the compiler and the VM lives here:
//!
//! - [`instr`] — the 32-bit instruction word codec (iABC/iABx/iAsBx
//!   layouts, RK operands, excess-K signed offsets).
//! - [`opcode`] — the opcode set and its per-opcode argument metadata.
//! - [`proto`] — function prototypes, the unit a chunk serializes.
//! - [`header`] / [`undump`] / [`dump`] — the precompiled chunk format:
//!   a 12-byte header pinning the build parameters, then the prototype
//!   tree. Loading is fail-fast and, by default, verified.
//! - [`check`] — the bytecode verifier run on untrusted chunks.
//! - [`disasm`] — deterministic listings in the classic
//!   one-line-per-instruction shape.
//!
//! ```
//! use vela_bytecode::prelude::*;
//! use vela_core::Interner;
//!
//! let mut pool = Interner::new();
//! let mut main = Proto::new();
//! main.source = Some(pool.intern(b"@demo.vela"));
//! main.max_stack_size = 2;
//! main.code = vec![Instruction::abc(OpCode::Return, 0, 1, 0)];
//!
//! let bytes = dump_chunk_to_vec(&main, false);
//! let back = load_chunk(&bytes, b"@demo.vela", &mut pool, &LoadOptions::default())?;
//! assert_eq!(back, main);
//! # Ok::<(), vela_bytecode::LoadError>(())
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod check;
pub mod disasm;
pub mod dump;
pub mod error;
pub mod header;
pub mod instr;
pub mod opcode;
pub mod proto;
pub mod undump;

pub use check::{BytecodeCheck, StructuralCheck, MAX_STACK};
pub use disasm::{disassemble, DisasmOptions};
pub use dump::{dump_chunk, dump_chunk_to_vec};
pub use error::{chunk_label, LoadError};
pub use header::{Header, FORMAT, HEADER_SIZE, SIGNATURE, VERSION};
pub use instr::Instruction;
pub use opcode::{ArgMode, OpCode, OpInfo, OpMode, NUM_OPCODES};
pub use proto::{LocalVar, Proto, VarargFlags};
pub use undump::{load_chunk, load_chunk_with, LoadOptions};

/// One-stop imports for chunk producers and consumers.
pub mod prelude {
    pub use crate::check::{BytecodeCheck, StructuralCheck};
    pub use crate::disasm::{disassemble, DisasmOptions};
    pub use crate::dump::{dump_chunk, dump_chunk_to_vec};
    pub use crate::error::LoadError;
    pub use crate::instr::Instruction;
    pub use crate::opcode::{OpCode, OpMode};
    pub use crate::proto::{Proto, VarargFlags};
    pub use crate::undump::{load_chunk, LoadOptions};
}
