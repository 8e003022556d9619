//! Immutable byte strings and the de-duplicating interner.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shared handle to an interned string.
pub type StrRef = Rc<VStr>;

/// Immutable byte string.
///
/// Vela strings are byte-clean: they may embed NULs or non-UTF-8 data,
/// so this wraps raw bytes rather than `str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VStr {
    bytes: Box<[u8]>,
}

impl VStr {
    /// Copies `bytes` into a new string.
    pub fn new(bytes: &[u8]) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for VStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // lossy view, for diagnostics and listings
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl From<&str> for VStr {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

/// De-duplicating string pool.
///
/// `intern` is idempotent: equal byte sequences always come back as the
/// same shared handle. Handles are `Rc`, so a pool belongs to a single
/// thread; concurrent loads each get their own pool.
#[derive(Debug, Default)]
pub struct Interner {
    pool: HashMap<Box<[u8]>, StrRef>,
}

impl Interner {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Interns `bytes`, returning the shared handle.
    pub fn intern(&mut self, bytes: &[u8]) -> StrRef {
        if let Some(s) = self.pool.get(bytes) {
            return Rc::clone(s);
        }
        let handle: StrRef = Rc::new(VStr::new(bytes));
        self.pool.insert(bytes.into(), Rc::clone(&handle));
        handle
    }

    /// Interns a UTF-8 literal.
    pub fn intern_str(&mut self, s: &str) -> StrRef {
        self.intern(s.as_bytes())
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
