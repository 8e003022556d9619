//! Tagged constant values as they appear in a prototype's constant pool.

use core::hash::{Hash, Hasher};
use core::mem;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::intern::StrRef;

/// A constant loaded from (or dumped into) a precompiled chunk.
///
/// Only the variants a chunk can carry exist here; of these, only `Str`
/// is backed by a garbage-collectable object at runtime.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// The nil value.
    Nil,
    /// Boolean.
    Bool(bool),
    /// Vela number (64-bit float).
    Number(f64),
    /// Interned string (raw bytes, not necessarily UTF-8).
    Str(StrRef),
}

impl Value {
    /// Type name as surfaced in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // bit-pattern equality keeps chunk round-trips exact (NaN included)
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
