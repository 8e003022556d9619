//! Bytecode verification.
//!
//! The loader accepts bytes from anywhere, so before a prototype is
//! handed to the VM every instruction is vetted against the opcode
//! metadata: register operands must fit the declared stack frame,
//! constant operands must index the pool, jump targets must land inside
//! the code array. The VM itself performs none of these checks.
//!
//! [`BytecodeCheck`] is the seam: the loader takes any implementation,
//! and [`StructuralCheck`] is the stock one.

use crate::instr::{index_k, is_k};
use crate::opcode::{ArgMode, OpCode, OpMode};
use crate::proto::{Proto, VarargFlags};

use vela_core::Value;

/// Hard ceiling on a function's register frame.
pub const MAX_STACK: u8 = 250;

/// A bytecode verifier, run on every prototype of a strict load.
pub trait BytecodeCheck {
    /// Returns a human-readable objection when `proto` must not run.
    fn check(&self, proto: &Proto) -> Result<(), String>;
}

/// The stock verifier: structural checks on every instruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralCheck;

impl BytecodeCheck for StructuralCheck {
    fn check(&self, proto: &Proto) -> Result<(), String> {
        verify(proto)
    }
}

fn fail(pc: usize, what: impl Into<String>) -> String {
    format!("{} at pc {pc}", what.into())
}

fn check_reg(proto: &Proto, r: u32, pc: usize) -> Result<(), String> {
    if r < u32::from(proto.max_stack_size) {
        Ok(())
    } else {
        Err(fail(pc, format!("register {r} out of frame")))
    }
}

fn check_const(proto: &Proto, k: u32, pc: usize) -> Result<(), String> {
    if (k as usize) < proto.constants.len() {
        Ok(())
    } else {
        Err(fail(pc, format!("constant {k} out of pool")))
    }
}

fn check_arg(proto: &Proto, mode: ArgMode, arg: u32, pc: usize) -> Result<(), String> {
    match mode {
        ArgMode::Unused => {
            if arg == 0 {
                Ok(())
            } else {
                Err(fail(pc, "unused argument not zero"))
            }
        }
        ArgMode::Used => Ok(()),
        ArgMode::Reg => check_reg(proto, arg, pc),
        ArgMode::RegK => {
            if is_k(arg) {
                check_const(proto, index_k(arg), pc)
            } else {
                check_reg(proto, arg, pc)
            }
        }
    }
}

fn check_jump(code_len: usize, pc: usize, sbx: i32) -> Result<(), String> {
    let dest = pc as i64 + 1 + i64::from(sbx);
    if dest >= 0 && (dest as usize) < code_len {
        Ok(())
    } else {
        Err(fail(pc, format!("jump to {dest} out of code")))
    }
}

/// Verifies one prototype (not its children; the loader walks the tree).
pub fn verify(proto: &Proto) -> Result<(), String> {
    let len = proto.code.len();

    if u32::from(proto.max_stack_size) > u32::from(MAX_STACK) {
        return Err(format!("stack frame {} too large", proto.max_stack_size));
    }
    let has_arg = proto.vararg.contains(VarargFlags::HAS_ARG);
    if u32::from(proto.num_params) + u32::from(has_arg) > u32::from(proto.max_stack_size) {
        return Err("parameters exceed stack frame".to_owned());
    }
    if proto.vararg.contains(VarargFlags::NEEDS_ARG) && !has_arg {
        return Err("NEEDS_ARG without HAS_ARG".to_owned());
    }
    if proto.upvalue_names.len() > usize::from(proto.num_upvalues) {
        return Err("more upvalue names than upvalues".to_owned());
    }
    if !proto.lines.is_empty() && proto.lines.len() != len {
        return Err("line info does not match code".to_owned());
    }
    if len == 0 {
        return Err("empty code".to_owned());
    }
    if proto.code[len - 1].opcode() != Some(OpCode::Return) {
        return Err("code does not end in RETURN".to_owned());
    }

    let mut pc = 0;
    while pc < len {
        let i = proto.code[pc];
        let op = i
            .opcode()
            .ok_or_else(|| fail(pc, format!("invalid opcode {}", i.opcode_raw())))?;
        let info = op.info();
        let (a, b, c) = (i.a(), i.b(), i.c());

        if info.sets_a {
            check_reg(proto, a, pc)?;
        }
        match info.mode {
            OpMode::Abc => {
                check_arg(proto, info.b, b, pc)?;
                check_arg(proto, info.c, c, pc)?;
            }
            OpMode::Abx => {
                if info.b == ArgMode::RegK {
                    check_const(proto, i.bx(), pc)?;
                }
            }
            OpMode::AsBx => check_jump(len, pc, i.sbx())?,
        }
        // the conditional skip executes instruction pc + 2
        if info.is_test && pc + 2 >= len {
            return Err(fail(pc, "test skip out of code"));
        }

        match op {
            OpCode::LoadBool => {
                // C requests a skip over the next instruction
                if c != 0 && pc + 2 >= len {
                    return Err(fail(pc, "LOADBOOL skip out of code"));
                }
            }
            OpCode::GetUpval | OpCode::SetUpval => {
                if b >= u32::from(proto.num_upvalues) {
                    return Err(fail(pc, format!("upvalue {b} out of range")));
                }
            }
            OpCode::GetGlobal | OpCode::SetGlobal => {
                if !matches!(proto.constants.get(i.bx() as usize), Some(Value::Str(_))) {
                    return Err(fail(pc, "global name is not a string constant"));
                }
            }
            OpCode::SelfOp => check_reg(proto, a + 1, pc)?,
            OpCode::Concat => {
                if b >= c {
                    return Err(fail(pc, "CONCAT range is empty"));
                }
            }
            OpCode::Call | OpCode::TailCall => {
                if b != 0 {
                    check_reg(proto, a + b - 1, pc)?;
                }
                if c >= 2 {
                    check_reg(proto, a + c - 2, pc)?;
                }
            }
            OpCode::Return => {
                if b >= 2 {
                    check_reg(proto, a + b - 2, pc)?;
                }
            }
            OpCode::ForLoop => check_reg(proto, a + 3, pc)?,
            OpCode::ForPrep => check_reg(proto, a + 2, pc)?,
            OpCode::TForLoop => {
                if c == 0 {
                    return Err(fail(pc, "TFORLOOP expects at least one result"));
                }
                // results land in R(A+3)..R(A+2+C)
                check_reg(proto, a + 2 + c, pc)?;
            }
            OpCode::SetList => {
                if b != 0 {
                    check_reg(proto, a + b, pc)?;
                }
                if c == 0 {
                    // the real C lives in the next word, as raw data
                    pc += 1;
                    if pc + 1 >= len {
                        return Err(fail(pc - 1, "SETLIST is missing its count word"));
                    }
                }
            }
            OpCode::Closure => {
                let bx = i.bx() as usize;
                let Some(child) = proto.protos.get(bx) else {
                    return Err(fail(pc, format!("closure prototype {bx} out of range")));
                };
                let nup = usize::from(child.num_upvalues);
                if pc + nup >= len {
                    return Err(fail(pc, "closure upvalue list out of code"));
                }
                for j in 1..=nup {
                    let pseudo = proto.code[pc + j].opcode();
                    if !matches!(pseudo, Some(OpCode::Move | OpCode::GetUpval)) {
                        return Err(fail(pc + j, "closure upvalue is not MOVE or GETUPVAL"));
                    }
                }
            }
            OpCode::Vararg => {
                if !proto.vararg.contains(VarargFlags::IS_VARARG)
                    || proto.vararg.contains(VarargFlags::NEEDS_ARG)
                {
                    return Err(fail(pc, "VARARG in a non-vararg function"));
                }
                if b != 0 {
                    check_reg(proto, a + b - 1, pc)?;
                }
            }
            _ => {}
        }
        pc += 1;
    }
    Ok(())
}

/* ─────────────────────────── Tests ─────────────────────────── */
