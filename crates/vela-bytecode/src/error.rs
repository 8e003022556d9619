//! Loader diagnostics.
//!
//! Every failure carries the chunk label so the message reads like a
//! runtime error: `label: reason in precompiled chunk`.

use thiserror::Error;

use crate::header::SIGNATURE;

/// Why a precompiled chunk was rejected.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input ended before the structure it announced.
    #[error("{chunk}: unexpected end in precompiled chunk")]
    Truncated {
        /// Chunk label.
        chunk: String,
    },

    /// A header byte does not match this build.
    #[error("{chunk}: bad header in precompiled chunk ({field})")]
    HeaderMismatch {
        /// Chunk label.
        chunk: String,
        /// Header field that disagreed.
        field: &'static str,
    },

    /// A constant carried a tag no constant type uses.
    #[error("{chunk}: bad constant tag {tag} in precompiled chunk")]
    BadConstantTag {
        /// Chunk label.
        chunk: String,
        /// Offending tag byte.
        tag: u8,
    },

    /// A count or length field is negative or does not fit the host.
    #[error("{chunk}: bad integer in precompiled chunk")]
    BadInteger {
        /// Chunk label.
        chunk: String,
    },

    /// The bytecode failed verification.
    #[error("{chunk}: bad code in precompiled chunk ({reason})")]
    BadCode {
        /// Chunk label.
        chunk: String,
        /// What the verifier objected to.
        reason: String,
    },

    /// Prototype nesting exceeded the load limit.
    #[error("{chunk}: code too deep in precompiled chunk")]
    TooDeep {
        /// Chunk label.
        chunk: String,
    },
}

impl LoadError {
    /// Label of the chunk that failed to load.
    pub fn chunk(&self) -> &str {
        match self {
            LoadError::Truncated { chunk }
            | LoadError::HeaderMismatch { chunk, .. }
            | LoadError::BadConstantTag { chunk, .. }
            | LoadError::BadInteger { chunk }
            | LoadError::BadCode { chunk, .. }
            | LoadError::TooDeep { chunk } => chunk,
        }
    }
}

/// Turns a raw chunk name into the label used in messages.
///
/// `@file` and `=name` markers are stripped; a name that starts with the
/// binary signature byte stands for the chunk itself and is reported as
/// `binary string`.
pub fn chunk_label(name: &[u8]) -> String {
    match name.first() {
        Some(b'@' | b'=') => String::from_utf8_lossy(&name[1..]).into_owned(),
        Some(&b) if b == SIGNATURE[0] => "binary string".to_owned(),
        _ => String::from_utf8_lossy(name).into_owned(),
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
