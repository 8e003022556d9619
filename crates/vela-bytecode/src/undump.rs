//! Loader for precompiled chunks.
//!
//! The stream is consumed strictly left to right: a 12-byte header, then
//! the main prototype, which recursively contains its nested prototypes.
//! Multi-byte scalars use the byte order the header declares, which a
//! conforming chunk pins to the host order.
//!
//! Loading is fail-fast. The first malformed byte aborts with a
//! [`LoadError`] naming the chunk; nothing is ever resynchronized or
//! skipped. By default every prototype is also run through the bytecode
//! verifier so a hostile chunk cannot smuggle out-of-range operands past
//! the loader; [`LoadOptions::trusted`] skips that pass for chunks this
//! process produced itself.

use byteorder::{ByteOrder, NativeEndian};

use vela_core::{Interner, StrRef, Value, MAX_LOAD_DEPTH};

use crate::check::{BytecodeCheck, StructuralCheck};
use crate::error::{chunk_label, LoadError};
use crate::header::{Header, HEADER_SIZE};
use crate::instr::Instruction;
use crate::proto::{LocalVar, Proto, VarargFlags};

/// Constant pool tag: nil.
pub const TAG_NIL: u8 = 0;
/// Constant pool tag: boolean.
pub const TAG_BOOL: u8 = 1;
/// Constant pool tag: number.
pub const TAG_NUMBER: u8 = 3;
/// Constant pool tag: string.
pub const TAG_STRING: u8 = 4;

/// Knobs for a load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Run the bytecode verifier on every prototype. On by default;
    /// turn off only for chunks produced by this process.
    pub strict: bool,
    /// Maximum prototype nesting the loader will follow.
    pub max_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { strict: true, max_depth: MAX_LOAD_DEPTH }
    }
}

impl LoadOptions {
    /// Options for chunks from a trusted source: no verification pass.
    pub fn trusted() -> Self {
        Self { strict: false, ..Self::default() }
    }
}

/// Loads a precompiled chunk with the default verifier.
///
/// `name` is the raw chunk name as the host supplied it (`@file`,
/// `=label`, or source text); it only feeds diagnostics.
pub fn load_chunk(
    bytes: &[u8],
    name: &[u8],
    interner: &mut Interner,
    options: &LoadOptions,
) -> Result<Proto, LoadError> {
    load_chunk_with(bytes, name, interner, options, &StructuralCheck)
}

/// Loads a precompiled chunk through a caller-supplied verifier.
pub fn load_chunk_with(
    bytes: &[u8],
    name: &[u8],
    interner: &mut Interner,
    options: &LoadOptions,
    checker: &dyn BytecodeCheck,
) -> Result<Proto, LoadError> {
    let chunk = if name.is_empty() { "?".to_owned() } else { chunk_label(name) };
    tracing::debug!(
        chunk = %chunk,
        len = bytes.len(),
        strict = options.strict,
        "loading precompiled chunk"
    );
    let mut s = LoadState {
        input: bytes,
        pos: 0,
        chunk,
        strict: options.strict,
        max_depth: options.max_depth,
        interner,
        checker,
    };
    s.load_header()?;
    let top_source = s.interner.intern(b"=?");
    s.load_function(Some(top_source), 1)
}

struct LoadState<'a> {
    input: &'a [u8],
    pos: usize,
    chunk: String,
    strict: bool,
    max_depth: usize,
    interner: &'a mut Interner,
    checker: &'a dyn BytecodeCheck,
}

impl<'a> LoadState<'a> {
    fn truncated(&self) -> LoadError {
        LoadError::Truncated { chunk: self.chunk.clone() }
    }

    fn bad_integer(&self) -> LoadError {
        LoadError::BadInteger { chunk: self.chunk.clone() }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        let input: &'a [u8] = self.input;
        let end = self.pos.checked_add(n).ok_or_else(|| self.truncated())?;
        let slice = input.get(self.pos..end).ok_or_else(|| self.truncated())?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, LoadError> {
        Ok(NativeEndian::read_u32(self.read_bytes(4)?))
    }

    fn read_i32(&mut self) -> Result<i32, LoadError> {
        Ok(NativeEndian::read_i32(self.read_bytes(4)?))
    }

    fn read_u64(&mut self) -> Result<u64, LoadError> {
        Ok(NativeEndian::read_u64(self.read_bytes(8)?))
    }

    fn read_f64(&mut self) -> Result<f64, LoadError> {
        Ok(NativeEndian::read_f64(self.read_bytes(8)?))
    }

    /// A count field: a non-negative `int` that fits the host.
    fn read_count(&mut self) -> Result<usize, LoadError> {
        let n = self.read_i32()?;
        usize::try_from(n).map_err(|_| self.bad_integer())
    }

    /// A line number: non-negative `int`.
    fn read_line(&mut self) -> Result<u32, LoadError> {
        let n = self.read_i32()?;
        u32::try_from(n).map_err(|_| self.bad_integer())
    }

    /// A length-prefixed string. Length zero stands for "no string";
    /// otherwise the payload includes a trailing NUL that is not part
    /// of the string value.
    fn load_string(&mut self) -> Result<Option<StrRef>, LoadError> {
        let len = self.read_u64()?;
        if len == 0 {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| self.bad_integer())?;
        let bytes = self.read_bytes(len)?;
        Ok(Some(self.interner.intern(&bytes[..len - 1])))
    }

    fn load_header(&mut self) -> Result<(), LoadError> {
        let bytes = self.read_bytes(HEADER_SIZE)?;
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(bytes);
        Header::from_bytes(&raw, &self.chunk)?.check(&self.chunk)
    }

    fn load_code(&mut self) -> Result<Vec<Instruction>, LoadError> {
        let n = self.read_count()?;
        // no pre-reserve: a lying count must hit Truncated, not the allocator
        let mut code = Vec::new();
        for _ in 0..n {
            code.push(Instruction(self.read_u32()?));
        }
        Ok(code)
    }

    fn load_constants(&mut self, proto: &mut Proto, depth: usize) -> Result<(), LoadError> {
        let n = self.read_count()?;
        for _ in 0..n {
            let tag = self.read_u8()?;
            let value = match tag {
                TAG_NIL => Value::Nil,
                TAG_BOOL => Value::Bool(self.read_u8()? != 0),
                TAG_NUMBER => Value::Number(self.read_f64()?),
                TAG_STRING => match self.load_string()? {
                    Some(s) => Value::Str(s),
                    // zero-length on the wire decodes as the empty string
                    None => Value::Str(self.interner.intern(b"")),
                },
                tag => {
                    return Err(LoadError::BadConstantTag { chunk: self.chunk.clone(), tag });
                }
            };
            proto.constants.push(value);
        }
        let n = self.read_count()?;
        for _ in 0..n {
            let child = self.load_function(proto.source.clone(), depth + 1)?;
            proto.protos.push(child);
        }
        Ok(())
    }

    fn load_debug(&mut self, proto: &mut Proto) -> Result<(), LoadError> {
        let n = self.read_count()?;
        for _ in 0..n {
            proto.lines.push(self.read_line()?);
        }
        let n = self.read_count()?;
        for _ in 0..n {
            let name = match self.load_string()? {
                Some(s) => s,
                None => self.interner.intern(b""),
            };
            let start_pc = self.read_line()?;
            let end_pc = self.read_line()?;
            proto.locals.push(LocalVar { name, start_pc, end_pc });
        }
        let n = self.read_count()?;
        for _ in 0..n {
            let name = match self.load_string()? {
                Some(s) => s,
                None => self.interner.intern(b""),
            };
            proto.upvalue_names.push(name);
        }
        Ok(())
    }

    fn load_function(&mut self, parent_source: Option<StrRef>, depth: usize) -> Result<Proto, LoadError> {
        if depth > self.max_depth {
            return Err(LoadError::TooDeep { chunk: self.chunk.clone() });
        }
        let mut proto = Proto::new();
        proto.source = match self.load_string()? {
            Some(s) => Some(s),
            None => parent_source,
        };
        proto.line_defined = self.read_line()?;
        proto.last_line_defined = self.read_line()?;
        proto.num_upvalues = self.read_u8()?;
        proto.num_params = self.read_u8()?;
        let vararg = self.read_u8()?;
        proto.vararg = match VarargFlags::from_bits(vararg) {
            Some(flags) => flags,
            None if self.strict => {
                return Err(LoadError::BadCode {
                    chunk: self.chunk.clone(),
                    reason: format!("bad vararg flags {vararg:#04x}"),
                });
            }
            None => VarargFlags::from_bits_truncate(vararg),
        };
        proto.max_stack_size = self.read_u8()?;
        proto.code = self.load_code()?;
        self.load_constants(&mut proto, depth)?;
        self.load_debug(&mut proto)?;
        if self.strict {
            self.checker.check(&proto).map_err(|reason| LoadError::BadCode {
                chunk: self.chunk.clone(),
                reason,
            })?;
        }
        Ok(proto)
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FORMAT, SIGNATURE, VERSION};
    use crate::opcode::OpCode;
    use pretty_assertions::assert_eq;

    fn put_i32(out: &mut Vec<u8>, x: i32) {
        out.extend_from_slice(&x.to_ne_bytes());
    }

    fn put_u32(out: &mut Vec<u8>, x: u32) {
        out.extend_from_slice(&x.to_ne_bytes());
    }

    fn put_u64(out: &mut Vec<u8>, x: u64) {
        out.extend_from_slice(&x.to_ne_bytes());
    }

    fn put_f64(out: &mut Vec<u8>, x: f64) {
        out.extend_from_slice(&x.to_ne_bytes());
    }

    fn put_str(out: &mut Vec<u8>, s: &[u8]) {
        put_u64(out, (s.len() + 1) as u64);
        out.extend_from_slice(s);
        out.push(0);
    }

    fn put_header(out: &mut Vec<u8>) {
        out.extend_from_slice(&Header::current().to_bytes());
    }

    /// Main function: one number constant, `LOADK 0 0; RETURN 0 1`,
    /// line info for both instructions, no locals or upvalues.
    fn minimal_chunk() -> Vec<u8> {
        let mut out = Vec::new();
        put_header(&mut out);
        put_str(&mut out, b"@test.vela"); // source
        put_i32(&mut out, 0); // line_defined
        put_i32(&mut out, 0); // last_line_defined
        out.push(0); // num_upvalues
        out.push(0); // num_params
        out.push(2); // vararg (main chunks are vararg)
        out.push(2); // max_stack_size
        put_i32(&mut out, 2); // code
        put_u32(&mut out, Instruction::abx(OpCode::LoadK, 0, 0).0);
        put_u32(&mut out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
        put_i32(&mut out, 1); // constants
        out.push(TAG_NUMBER);
        put_f64(&mut out, 42.5);
        put_i32(&mut out, 0); // nested protos
        put_i32(&mut out, 2); // line info
        put_i32(&mut out, 1);
        put_i32(&mut out, 1);
        put_i32(&mut out, 0); // locals
        put_i32(&mut out, 0); // upvalue names
        out
    }

    // byte offsets into minimal_chunk(), in stream order
    const OFF_SOURCE: usize = HEADER_SIZE;
    const OFF_CODE_COUNT: usize = OFF_SOURCE + 8 + 11 + 4 + 4 + 4;
    const OFF_CONST_COUNT: usize = OFF_CODE_COUNT + 4 + 8;
    const OFF_CONST_TAG: usize = OFF_CONST_COUNT + 4;

    fn load(bytes: &[u8]) -> Result<Proto, LoadError> {
        let mut pool = Interner::new();
        load_chunk(bytes, b"@test.vela", &mut pool, &LoadOptions::default())
    }

    #[test]
    fn minimal_chunk_loads() {
        let proto = load(&minimal_chunk()).unwrap();
        assert_eq!(proto.source.as_deref().map(|s| s.as_bytes()), Some(&b"@test.vela"[..]));
        assert_eq!(proto.vararg, VarargFlags::IS_VARARG);
        assert_eq!(proto.max_stack_size, 2);
        assert_eq!(proto.code.len(), 2);
        assert_eq!(proto.code[0].opcode(), Some(OpCode::LoadK));
        assert_eq!(proto.constants, vec![Value::Number(42.5)]);
        assert_eq!(proto.lines, vec![1, 1]);
        assert!(proto.protos.is_empty());
    }

    #[test]
    fn every_proper_prefix_is_truncated() {
        let full = minimal_chunk();
        for len in 0..full.len() {
            let err = load(&full[..len]).unwrap_err();
            assert!(
                matches!(err, LoadError::Truncated { .. }),
                "prefix of {len} bytes: {err:?}"
            );
        }
    }

    #[test]
    fn header_fields_are_validated() {
        for pos in 0..HEADER_SIZE {
            let mut bytes = minimal_chunk();
            bytes[pos] ^= 0x80;
            let err = load(&bytes).unwrap_err();
            assert!(
                matches!(err, LoadError::HeaderMismatch { .. }),
                "byte {pos}: {err:?}"
            );
        }
        // sanity: the header this loader accepts is the one the build writes
        assert_eq!(&Header::current().to_bytes()[..4], &SIGNATURE);
        assert_eq!(Header::current().version, VERSION);
        assert_eq!(Header::current().format, FORMAT);
    }

    #[test]
    fn unknown_constant_tag_is_rejected() {
        let mut bytes = minimal_chunk();
        assert_eq!(bytes[OFF_CONST_TAG], TAG_NUMBER);
        bytes[OFF_CONST_TAG] = 9;
        let err = load(&bytes).unwrap_err();
        match err {
            LoadError::BadConstantTag { tag, chunk } => {
                assert_eq!(tag, 9);
                assert_eq!(chunk, "test.vela");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_counts_are_bad_integers() {
        let mut bytes = minimal_chunk();
        bytes[OFF_CODE_COUNT..OFF_CODE_COUNT + 4].copy_from_slice(&(-1i32).to_ne_bytes());
        assert!(matches!(load(&bytes).unwrap_err(), LoadError::BadInteger { .. }));
    }

    #[test]
    fn invalid_opcode_fails_verification_unless_trusted() {
        let mut bytes = minimal_chunk();
        let patch = OFF_CODE_COUNT + 4;
        bytes[patch..patch + 4].copy_from_slice(&Instruction(63).0.to_ne_bytes());

        let err = load(&bytes).unwrap_err();
        assert!(matches!(err, LoadError::BadCode { .. }), "{err:?}");

        let mut pool = Interner::new();
        let proto =
            load_chunk(&bytes, b"@test.vela", &mut pool, &LoadOptions::trusted()).unwrap();
        assert_eq!(proto.code[0].opcode(), None);
    }

    #[test]
    fn nested_sources_inherit_from_the_parent() {
        // parent with explicit source, child with none
        let mut out = Vec::new();
        put_header(&mut out);
        put_str(&mut out, b"@outer.vela");
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        out.extend_from_slice(&[0, 0, 2, 2]);
        put_i32(&mut out, 2);
        put_u32(&mut out, Instruction::abx(OpCode::Closure, 0, 0).0);
        put_u32(&mut out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
        put_i32(&mut out, 0); // constants
        put_i32(&mut out, 1); // one nested proto
        {
            put_u64(&mut out, 0); // source: inherit
            put_i32(&mut out, 3);
            put_i32(&mut out, 5);
            out.extend_from_slice(&[0, 0, 0, 2]);
            put_i32(&mut out, 1);
            put_u32(&mut out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
            put_i32(&mut out, 0);
            put_i32(&mut out, 0);
            put_i32(&mut out, 0);
            put_i32(&mut out, 0);
            put_i32(&mut out, 0);
        }
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);

        let proto = load(&out).unwrap();
        let child = &proto.protos[0];
        assert_eq!(child.source.as_deref().map(|s| s.as_bytes()), Some(&b"@outer.vela"[..]));
        assert_eq!((child.line_defined, child.last_line_defined), (3, 5));
    }

    #[test]
    fn main_chunk_without_source_reads_as_question_mark() {
        let mut out = Vec::new();
        put_header(&mut out);
        put_u64(&mut out, 0); // no source even at top level
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        out.extend_from_slice(&[0, 0, 2, 2]);
        put_i32(&mut out, 1);
        put_u32(&mut out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);

        let proto = load(&out).unwrap();
        assert_eq!(proto.source.as_deref().map(|s| s.as_bytes()), Some(&b"=?"[..]));
    }

    #[test]
    fn runaway_nesting_hits_the_depth_limit() {
        fn put_nested(out: &mut Vec<u8>, levels: usize) {
            put_u64(out, 0); // source
            put_i32(out, 0);
            put_i32(out, 0);
            out.extend_from_slice(&[0, 0, 0, 2]);
            if levels > 0 {
                put_i32(out, 2);
                put_u32(out, Instruction::abx(OpCode::Closure, 0, 0).0);
                put_u32(out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
                put_i32(out, 0);
                put_i32(out, 1);
                put_nested(out, levels - 1);
            } else {
                put_i32(out, 1);
                put_u32(out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
                put_i32(out, 0);
                put_i32(out, 0);
            }
            put_i32(out, 0);
            put_i32(out, 0);
            put_i32(out, 0);
        }

        let mut out = Vec::new();
        put_header(&mut out);
        put_nested(&mut out, 300);

        let mut pool = Interner::new();
        let err = load_chunk(&out, b"=deep", &mut pool, &LoadOptions::trusted()).unwrap_err();
        assert!(matches!(err, LoadError::TooDeep { .. }), "{err:?}");

        // a custom ceiling is honored
        let opts = LoadOptions { max_depth: 400, ..LoadOptions::trusted() };
        let proto = load_chunk(&out, b"=deep", &mut pool, &opts).unwrap();
        assert_eq!(proto.tree_size(), 301);
    }

    #[test]
    fn bad_vararg_flags_depend_on_strictness() {
        let mut bytes = minimal_chunk();
        let off_vararg = OFF_SOURCE + 8 + 11 + 4 + 4 + 2;
        assert_eq!(bytes[off_vararg], 2);
        bytes[off_vararg] = 0xff;

        assert!(matches!(load(&bytes).unwrap_err(), LoadError::BadCode { .. }));

        let mut pool = Interner::new();
        let proto =
            load_chunk(&bytes, b"@test.vela", &mut pool, &LoadOptions::trusted()).unwrap();
        assert_eq!(
            proto.vararg,
            VarargFlags::HAS_ARG | VarargFlags::IS_VARARG | VarargFlags::NEEDS_ARG
        );
    }

    #[test]
    fn zero_length_string_constant_is_empty() {
        let mut out = Vec::new();
        put_header(&mut out);
        put_str(&mut out, b"@k.vela");
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        out.extend_from_slice(&[0, 0, 2, 2]);
        put_i32(&mut out, 2);
        put_u32(&mut out, Instruction::abx(OpCode::LoadK, 0, 0).0);
        put_u32(&mut out, Instruction::abc(OpCode::Return, 0, 1, 0).0);
        put_i32(&mut out, 1);
        out.push(TAG_STRING);
        put_u64(&mut out, 0); // "absent" string in constant position
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);
        put_i32(&mut out, 0);

        let proto = load(&out).unwrap();
        match &proto.constants[0] {
            Value::Str(s) => assert!(s.is_empty()),
            other => panic!("unexpected constant: {other:?}"),
        }
    }
}
