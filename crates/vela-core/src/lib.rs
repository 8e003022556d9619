//! vela-core — shared primitives for the Vela runtime crates.
//!
//! Provides:
//! - [`Value`]: the tagged constant value precompiled chunks carry
//! - [`VStr`] + [`Interner`]: immutable byte strings behind a
//!   de-duplicating pool, shared by handle
//! - [`MAX_LOAD_DEPTH`]: the default nesting budget for chunk loading
//!
//! Features:
//! - `serde` (default): derive (de)serialization on the plain data carriers

#![deny(missing_docs)]

/* ─────────────────────────── Modules ─────────────────────────── */

pub mod intern;
pub mod value;

pub use intern::{Interner, StrRef, VStr};
pub use value::Value;

/* ─────────────────────────── Limits ─────────────────────────── */

/// Default bound on nested-prototype recursion while loading a chunk.
///
/// This guard is loader-local; hosts with a tighter native stack budget
/// pass their own maximum through the loader's options.
pub const MAX_LOAD_DEPTH: usize = 200;

/* ─────────────────────────── Prelude ─────────────────────────── */

/// Convenience re-exports for quick importing.
pub mod prelude {
    pub use super::{Interner, StrRef, VStr, Value, MAX_LOAD_DEPTH};
}
