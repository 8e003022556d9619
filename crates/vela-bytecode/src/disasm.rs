//! Human-readable chunk listings.
//!
//! One line per instruction: pc, source line, mnemonic, operands, and a
//! `; comment` resolving whatever the operands reference (constants,
//! upvalue names, jump targets). Operand rendering is driven entirely by
//! the opcode metadata table; constant references print as negative
//! numbers (`-1` is constant 0) so they never collide with registers.
//!
//! Output is deterministic for a given prototype, so listings diff
//! cleanly across runs and make good golden-test material.

use std::fmt::{self, Write};

use vela_core::{VStr, Value};

use crate::header::SIGNATURE;
use crate::instr::{index_k, is_k};
use crate::opcode::{ArgMode, OpCode, OpMode};
use crate::proto::Proto;

/// Listing controls.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisasmOptions {
    /// Also list the constant, local and upvalue tables per function.
    pub full: bool,
}

/// Renders a prototype tree as a listing.
pub fn disassemble(proto: &Proto, options: &DisasmOptions) -> String {
    let mut out = String::new();
    // writes to a String cannot fail
    let _ = print_function(&mut out, proto, options.full);
    out
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Header label for a source name: markers stripped, raw source text and
/// binary chunks summarized.
fn source_label(source: Option<&VStr>) -> String {
    let Some(s) = source else { return "?".to_owned() };
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b'@' | b'=') => String::from_utf8_lossy(&bytes[1..]).into_owned(),
        Some(&b) if b == SIGNATURE[0] => "(bstring)".to_owned(),
        _ => "(string)".to_owned(),
    }
}

/// Quoted, escaped rendering of a string constant.
fn quote_str(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\v"),
            b if b.is_ascii_graphic() || b == b' ' => out.push(b as char),
            b => {
                let _ = write!(out, "\\{b}");
            }
        }
    }
    out.push('"');
    out
}

/// Listing form of one constant.
fn constant_repr(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Bool(true) => "true".to_owned(),
        Value::Bool(false) => "false".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Str(s) => quote_str(s.as_bytes()),
    }
}

/// Constant operand as printed in the operand column (`-1` is constant 0).
fn k_operand(k: u32) -> i64 {
    -1 - i64::from(k)
}

/// RK operand: plain register, or negative constant reference.
fn rk_operand(arg: u32) -> i64 {
    if is_k(arg) {
        k_operand(index_k(arg))
    } else {
        i64::from(arg)
    }
}

fn constant_at(proto: &Proto, k: u32) -> String {
    proto
        .constants
        .get(k as usize)
        .map_or_else(|| "?".to_owned(), constant_repr)
}

fn upvalue_at(proto: &Proto, b: u32) -> String {
    proto
        .upvalue_names
        .get(b as usize)
        .map_or_else(|| "-".to_owned(), |name| name.to_string())
}

fn print_function(out: &mut String, proto: &Proto, full: bool) -> fmt::Result {
    print_header(out, proto)?;
    print_code(out, proto)?;
    if full {
        print_constants(out, proto)?;
        print_locals(out, proto)?;
        print_upvalues(out, proto)?;
    }
    for child in &proto.protos {
        print_function(out, child, full)?;
    }
    Ok(())
}

fn print_header(out: &mut String, proto: &Proto) -> fmt::Result {
    let kind = if proto.line_defined == 0 { "main" } else { "function" };
    let n = proto.code.len();
    writeln!(
        out,
        "\n{kind} <{}:{},{}> ({n} instruction{}, {} bytes)",
        source_label(proto.source.as_deref()),
        proto.line_defined,
        proto.last_line_defined,
        plural(n),
        n * 4,
    )?;
    let vararg = if proto.is_vararg() { "+" } else { "" };
    writeln!(
        out,
        "{}{vararg} param{}, {} slot{}, {} upvalue{}, {} local{}, {} constant{}, {} function{}",
        proto.num_params,
        plural(proto.num_params as usize),
        proto.max_stack_size,
        plural(proto.max_stack_size as usize),
        proto.num_upvalues,
        plural(proto.num_upvalues as usize),
        proto.locals.len(),
        plural(proto.locals.len()),
        proto.constants.len(),
        plural(proto.constants.len()),
        proto.protos.len(),
        plural(proto.protos.len()),
    )
}

fn print_code(out: &mut String, proto: &Proto) -> fmt::Result {
    let mut pc = 0;
    while pc < proto.code.len() {
        let i = proto.code[pc];
        write!(out, "\t{}\t", pc + 1)?;
        match proto.line_at(pc) {
            Some(line) if line > 0 => write!(out, "[{line}]\t")?,
            _ => write!(out, "[-]\t")?,
        }

        let Some(op) = i.opcode() else {
            // a trusted load can carry anything; show the raw word
            writeln!(out, "{:<9}\t{:#010x}", "?", i.0)?;
            pc += 1;
            continue;
        };
        let info = op.info();
        let (a, b, c) = (i.a(), i.b(), i.c());

        write!(out, "{:<9}\t", op.name())?;
        match info.mode {
            OpMode::Abc => {
                write!(out, "{a}")?;
                if info.b != ArgMode::Unused {
                    write!(out, " {}", rk_operand(b))?;
                }
                if info.c != ArgMode::Unused {
                    write!(out, " {}", rk_operand(c))?;
                }
            }
            OpMode::Abx => {
                if info.b == ArgMode::RegK {
                    write!(out, "{a} {}", k_operand(i.bx()))?;
                } else {
                    write!(out, "{a} {}", i.bx())?;
                }
            }
            OpMode::AsBx => {
                if op == OpCode::Jmp {
                    write!(out, "{}", i.sbx())?;
                } else {
                    write!(out, "{a} {}", i.sbx())?;
                }
            }
        }

        match op {
            OpCode::LoadK => write!(out, "\t; {}", constant_at(proto, i.bx()))?,
            OpCode::GetUpval | OpCode::SetUpval => {
                write!(out, "\t; {}", upvalue_at(proto, b))?;
            }
            OpCode::GetGlobal | OpCode::SetGlobal => {
                let name = match proto.constants.get(i.bx() as usize) {
                    Some(Value::Str(s)) => s.to_string(),
                    Some(other) => constant_repr(other),
                    None => "?".to_owned(),
                };
                write!(out, "\t; {name}")?;
            }
            OpCode::GetTable | OpCode::SelfOp if is_k(c) => {
                write!(out, "\t; {}", constant_at(proto, index_k(c)))?;
            }
            OpCode::SetTable
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Pow
            | OpCode::Eq
            | OpCode::Lt
            | OpCode::Le
                if is_k(b) || is_k(c) =>
            {
                let left = if is_k(b) {
                    constant_at(proto, index_k(b))
                } else {
                    "-".to_owned()
                };
                let right = if is_k(c) {
                    constant_at(proto, index_k(c))
                } else {
                    "-".to_owned()
                };
                write!(out, "\t; {left} {right}")?;
            }
            OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep => {
                write!(out, "\t; to {}", i.sbx() + pc as i32 + 2)?;
            }
            OpCode::Closure => {
                let target = match proto.protos.get(i.bx() as usize) {
                    Some(child) => format!(
                        "<{}:{},{}>",
                        source_label(child.source.as_deref()),
                        child.line_defined,
                        child.last_line_defined
                    ),
                    None => "?".to_owned(),
                };
                write!(out, "\t; {target}")?;
            }
            OpCode::SetList => {
                // an open count lives in the next word
                if c == 0 {
                    pc += 1;
                    let real = proto.code.get(pc).map_or(0, |w| w.0);
                    write!(out, "\t; {real}")?;
                } else {
                    write!(out, "\t; {c}")?;
                }
            }
            _ => {}
        }
        writeln!(out)?;
        pc += 1;
    }
    Ok(())
}

fn print_constants(out: &mut String, proto: &Proto) -> fmt::Result {
    writeln!(out, "constants ({}):", proto.constants.len())?;
    for (i, k) in proto.constants.iter().enumerate() {
        writeln!(out, "\t{}\t{}", i + 1, constant_repr(k))?;
    }
    Ok(())
}

fn print_locals(out: &mut String, proto: &Proto) -> fmt::Result {
    writeln!(out, "locals ({}):", proto.locals.len())?;
    for (i, local) in proto.locals.iter().enumerate() {
        writeln!(
            out,
            "\t{i}\t{}\t{}\t{}",
            local.name,
            local.start_pc + 1,
            local.end_pc + 1
        )?;
    }
    Ok(())
}

fn print_upvalues(out: &mut String, proto: &Proto) -> fmt::Result {
    writeln!(out, "upvalues ({}):", proto.upvalue_names.len())?;
    for (i, name) in proto.upvalue_names.iter().enumerate() {
        writeln!(out, "\t{i}\t{name}")?;
    }
    Ok(())
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{rk_as_k, Instruction};
    use crate::proto::{LocalVar, VarargFlags};
    use pretty_assertions::assert_eq;
    use vela_core::Interner;

    fn hello_proto(pool: &mut Interner) -> Proto {
        let mut p = Proto::new();
        p.source = Some(pool.intern(b"@demo.vela"));
        p.vararg = VarargFlags::IS_VARARG;
        p.max_stack_size = 2;
        p.code = vec![
            Instruction::abx(OpCode::GetGlobal, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 1),
            Instruction::abc(OpCode::Call, 0, 2, 1),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ];
        p.constants = vec![Value::Str(pool.intern(b"print")), Value::Str(pool.intern(b"hi"))];
        p.lines = vec![1, 1, 1, 2];
        p
    }

    #[test]
    fn listing_matches_exactly() {
        let mut pool = Interner::new();
        let listing = disassemble(&hello_proto(&mut pool), &DisasmOptions::default());
        let want = "\nmain <demo.vela:0,0> (4 instructions, 16 bytes)\n\
                    0+ params, 2 slots, 0 upvalues, 0 locals, 2 constants, 0 functions\n\
                    \t1\t[1]\tGETGLOBAL\t0 -1\t; print\n\
                    \t2\t[1]\tLOADK    \t1 -2\t; \"hi\"\n\
                    \t3\t[1]\tCALL     \t0 2 1\n\
                    \t4\t[2]\tRETURN   \t0 1\n";
        assert_eq!(listing, want);
    }

    #[test]
    fn listings_are_deterministic() {
        let mut pool = Interner::new();
        let p = hello_proto(&mut pool);
        let a = disassemble(&p, &DisasmOptions { full: true });
        let b = disassemble(&p, &DisasmOptions { full: true });
        assert_eq!(a, b);
    }

    #[test]
    fn jumps_annotate_their_target() {
        let mut p = Proto::new();
        p.max_stack_size = 4;
        p.code = vec![
            Instruction::asbx(OpCode::Jmp, 0, 1),
            Instruction::asbx(OpCode::ForPrep, 0, -2),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ];
        let listing = disassemble(&p, &DisasmOptions::default());
        assert!(listing.contains("\tJMP      \t1\t; to 3\n"), "{listing}");
        assert!(listing.contains("\tFORPREP  \t0 -2\t; to 1\n"), "{listing}");
        // no line info: the line column is a dash
        assert!(listing.contains("\t1\t[-]\t"), "{listing}");
    }

    #[test]
    fn rk_operands_print_as_negative_constants() {
        let mut p = Proto::new();
        p.max_stack_size = 4;
        p.code = vec![
            Instruction::abc(OpCode::Add, 0, rk_as_k(0), 1),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ];
        p.constants = vec![Value::Number(7.0)];
        let listing = disassemble(&p, &DisasmOptions::default());
        assert!(listing.contains("\tADD      \t0 -1 1\t; 7 -\n"), "{listing}");
    }

    #[test]
    fn open_setlist_count_comes_from_the_next_word() {
        let mut p = Proto::new();
        p.max_stack_size = 4;
        p.code = vec![
            Instruction::abc(OpCode::SetList, 0, 1, 0),
            Instruction(600),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ];
        let listing = disassemble(&p, &DisasmOptions::default());
        assert!(listing.contains("\tSETLIST  \t0 1 0\t; 600\n"), "{listing}");
        // the count word itself is not listed as an instruction
        assert!(!listing.contains("\t2\t"), "{listing}");
        assert!(listing.contains("\t3\t[-]\tRETURN"), "{listing}");
    }

    #[test]
    fn full_listings_include_the_tables() {
        let mut pool = Interner::new();
        let mut p = hello_proto(&mut pool);
        p.num_upvalues = 1;
        p.upvalue_names = vec![pool.intern(b"env")];
        p.locals = vec![LocalVar { name: pool.intern(b"x"), start_pc: 1, end_pc: 3 }];
        let listing = disassemble(&p, &DisasmOptions { full: true });
        assert!(listing.contains("constants (2):\n\t1\t\"print\"\n\t2\t\"hi\"\n"), "{listing}");
        assert!(listing.contains("locals (1):\n\t0\tx\t2\t4\n"), "{listing}");
        assert!(listing.contains("upvalues (1):\n\t0\tenv\n"), "{listing}");
    }

    #[test]
    fn nested_functions_are_listed_after_the_parent() {
        let mut pool = Interner::new();
        let mut child = Proto::new();
        child.source = Some(pool.intern(b"@demo.vela"));
        child.line_defined = 3;
        child.last_line_defined = 5;
        child.num_params = 1;
        child.max_stack_size = 2;
        child.code = vec![Instruction::abc(OpCode::Return, 0, 1, 0)];

        let mut p = Proto::new();
        p.source = Some(pool.intern(b"@demo.vela"));
        p.max_stack_size = 2;
        p.code = vec![
            Instruction::abx(OpCode::Closure, 0, 0),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ];
        p.protos = vec![child];

        let listing = disassemble(&p, &DisasmOptions::default());
        assert!(listing.contains("\tCLOSURE  \t0 0\t; <demo.vela:3,5>\n"), "{listing}");
        assert!(listing.contains("\nfunction <demo.vela:3,5> (1 instruction, 4 bytes)\n"), "{listing}");
        assert!(listing.contains("1 param, 2 slots"), "{listing}");
    }

    #[test]
    fn string_constants_are_escaped() {
        assert_eq!(quote_str(b"a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_str(b"back\\slash"), "\"back\\\\slash\"");
        assert_eq!(quote_str(b"line\nfeed\t"), "\"line\\nfeed\\t\"");
        assert_eq!(quote_str(b"\x01\x7f"), "\"\\1\\127\"");
        assert_eq!(quote_str(b"plain text"), "\"plain text\"");
    }

    #[test]
    fn source_labels_mirror_the_loader() {
        let mut pool = Interner::new();
        let mut label = |bytes: &[u8]| source_label(Some(&*pool.intern(bytes)));
        assert_eq!(source_label(None), "?");
        assert_eq!(label(b"@a.vela"), "a.vela");
        assert_eq!(label(b"=stdin"), "stdin");
        assert_eq!(label(b"return 1"), "(string)");
        assert_eq!(label(b"\x1bVel"), "(bstring)");
    }
}
