//! The 12-byte chunk header.
//!
//! The header pins every parameter the rest of the stream depends on:
//! format version, byte order, and the widths of the scalar types. A
//! chunk whose header disagrees with the current build in any byte is
//! rejected before a single prototype is read; there is no conversion
//! path for foreign layouts.

use crate::error::LoadError;

/// First bytes of every precompiled chunk (`ESC` + "Vel").
pub const SIGNATURE: [u8; 4] = *b"\x1bVel";

/// Bytecode format version (`0x10` = 1.0).
pub const VERSION: u8 = 0x10;

/// Format variant; 0 is the official format.
pub const FORMAT: u8 = 0;

/// Total header length in bytes.
pub const HEADER_SIZE: usize = 12;

/// Decoded header fields, in stream order after the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version byte.
    pub version: u8,
    /// Format variant byte.
    pub format: u8,
    /// 1 when multi-byte scalars are little-endian, 0 when big-endian.
    pub little_endian: u8,
    /// Width of count and line-number fields.
    pub sizeof_int: u8,
    /// Width of string length prefixes.
    pub sizeof_len: u8,
    /// Width of one instruction word.
    pub sizeof_instr: u8,
    /// Width of a number constant.
    pub sizeof_number: u8,
    /// 1 when numbers are an integral type, 0 for floating point.
    pub integral: u8,
}

impl Header {
    /// The header this build writes and accepts.
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            format: FORMAT,
            little_endian: cfg!(target_endian = "little") as u8,
            sizeof_int: 4,
            sizeof_len: 8,
            sizeof_instr: 4,
            sizeof_number: 8,
            integral: 0,
        }
    }

    /// Parses header bytes. Only the shape is checked here; call
    /// [`Header::check`] to compare against the current build.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE], chunk: &str) -> Result<Self, LoadError> {
        if bytes[..4] != SIGNATURE {
            return Err(LoadError::HeaderMismatch { chunk: chunk.to_owned(), field: "signature" });
        }
        Ok(Self {
            version: bytes[4],
            format: bytes[5],
            little_endian: bytes[6],
            sizeof_int: bytes[7],
            sizeof_len: bytes[8],
            sizeof_instr: bytes[9],
            sizeof_number: bytes[10],
            integral: bytes[11],
        })
    }

    /// Serializes the header.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&SIGNATURE);
        out[4] = self.version;
        out[5] = self.format;
        out[6] = self.little_endian;
        out[7] = self.sizeof_int;
        out[8] = self.sizeof_len;
        out[9] = self.sizeof_instr;
        out[10] = self.sizeof_number;
        out[11] = self.integral;
        out
    }

    /// Rejects any field that differs from the current build, naming the
    /// first disagreement in stream order.
    pub fn check(&self, chunk: &str) -> Result<(), LoadError> {
        let want = Self::current();
        let fields = [
            (self.version, want.version, "version"),
            (self.format, want.format, "format"),
            (self.little_endian, want.little_endian, "endianness"),
            (self.sizeof_int, want.sizeof_int, "int size"),
            (self.sizeof_len, want.sizeof_len, "length size"),
            (self.sizeof_instr, want.sizeof_instr, "instruction size"),
            (self.sizeof_number, want.sizeof_number, "number size"),
            (self.integral, want.integral, "number format"),
        ];
        for (got, want, field) in fields {
            if got != want {
                return Err(LoadError::HeaderMismatch { chunk: chunk.to_owned(), field });
            }
        }
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::current()
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
