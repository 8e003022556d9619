//! Writer for precompiled chunks.
//!
//! Produces exactly the stream [`crate::undump`] consumes: current
//! header, then the prototype tree. A nested prototype that shares its
//! parent's source writes a zero-length string so the loader re-inherits
//! it; stripping debug info writes empty line, local and upvalue tables.

use std::io::{self, Write};

use byteorder::{NativeEndian, WriteBytesExt};

use vela_core::Value;

use crate::header::Header;
use crate::proto::Proto;
use crate::undump::{TAG_BOOL, TAG_NIL, TAG_NUMBER, TAG_STRING};

/// Serializes a prototype tree as a precompiled chunk.
pub fn dump_chunk<W: Write>(proto: &Proto, strip_debug: bool, w: &mut W) -> io::Result<()> {
    w.write_all(&Header::current().to_bytes())?;
    let mut d = DumpState { w, strip_debug };
    d.dump_function(proto, None)
}

/// [`dump_chunk`] into a fresh buffer.
pub fn dump_chunk_to_vec(proto: &Proto, strip_debug: bool) -> Vec<u8> {
    let mut out = Vec::new();
    dump_chunk(proto, strip_debug, &mut out).expect("Vec<u8> writes are infallible");
    out
}

struct DumpState<'a, W: Write> {
    w: &'a mut W,
    strip_debug: bool,
}

impl<W: Write> DumpState<'_, W> {
    fn dump_count(&mut self, n: usize) -> io::Result<()> {
        let n = i32::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "count exceeds i32"))?;
        self.w.write_i32::<NativeEndian>(n)
    }

    fn dump_string(&mut self, s: Option<&[u8]>) -> io::Result<()> {
        match s {
            None => self.w.write_u64::<NativeEndian>(0),
            Some(bytes) => {
                self.w.write_u64::<NativeEndian>(bytes.len() as u64 + 1)?;
                self.w.write_all(bytes)?;
                self.w.write_u8(0)
            }
        }
    }

    fn dump_function(&mut self, proto: &Proto, parent_source: Option<&[u8]>) -> io::Result<()> {
        let source = proto.source.as_deref().map(|s| s.as_bytes());
        // inherited sources are elided on the wire
        self.dump_string(if source == parent_source { None } else { source })?;
        self.w.write_i32::<NativeEndian>(proto.line_defined as i32)?;
        self.w.write_i32::<NativeEndian>(proto.last_line_defined as i32)?;
        self.w.write_u8(proto.num_upvalues)?;
        self.w.write_u8(proto.num_params)?;
        self.w.write_u8(proto.vararg.bits())?;
        self.w.write_u8(proto.max_stack_size)?;

        self.dump_count(proto.code.len())?;
        for i in &proto.code {
            self.w.write_u32::<NativeEndian>(i.0)?;
        }

        self.dump_count(proto.constants.len())?;
        for k in &proto.constants {
            match k {
                Value::Nil => self.w.write_u8(TAG_NIL)?,
                Value::Bool(b) => {
                    self.w.write_u8(TAG_BOOL)?;
                    self.w.write_u8(u8::from(*b))?;
                }
                Value::Number(n) => {
                    self.w.write_u8(TAG_NUMBER)?;
                    self.w.write_f64::<NativeEndian>(*n)?;
                }
                Value::Str(s) => {
                    self.w.write_u8(TAG_STRING)?;
                    self.dump_string(Some(s.as_bytes()))?;
                }
            }
        }

        self.dump_count(proto.protos.len())?;
        for child in &proto.protos {
            self.dump_function(child, source)?;
        }

        self.dump_debug(proto)
    }

    fn dump_debug(&mut self, proto: &Proto) -> io::Result<()> {
        if self.strip_debug {
            self.dump_count(0)?;
            self.dump_count(0)?;
            return self.dump_count(0);
        }
        self.dump_count(proto.lines.len())?;
        for line in &proto.lines {
            self.w.write_i32::<NativeEndian>(*line as i32)?;
        }
        self.dump_count(proto.locals.len())?;
        for local in &proto.locals {
            self.dump_string(Some(local.name.as_bytes()))?;
            self.w.write_i32::<NativeEndian>(local.start_pc as i32)?;
            self.w.write_i32::<NativeEndian>(local.end_pc as i32)?;
        }
        self.dump_count(proto.upvalue_names.len())?;
        for name in &proto.upvalue_names {
            self.dump_string(Some(name.as_bytes()))?;
        }
        Ok(())
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
