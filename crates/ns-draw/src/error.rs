//! Error types for expression compilation and drawing.

use thiserror::Error;

/// Errors that can occur compiling or drawing an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
    /// Malformed expression text.
    #[error("syntax error in '{expr}' at line {line}, col {col}: {msg}")]
    Syntax {
        /// Expression text as given by the caller.
        expr: String,
        /// 1-based line of the offending token.
        line: usize,
        /// 1-based column of the offending token.
        col: usize,
        /// What went wrong.
        msg: String,
    },

    /// Valid syntax that the array compiler or runtime does not support
    /// (bad reduction arity, negative index other than `-1`, slice steps, ...).
    #[error("unsupported operation in '{expr}': {msg}")]
    Unsupported {
        /// Expression text as given by the caller.
        expr: String,
        /// What is unsupported, with position where known.
        msg: String,
    },

    /// A name that is neither a bound column, a reserved word, nor an extra symbol.
    #[error("missing column '{name}' referenced by '{expr}'")]
    MissingColumn {
        /// Unresolved name.
        name: String,
        /// Expression text that referenced it.
        expr: String,
    },

    /// Arrays that must align in length do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid binning, incompatible histogram addition, or a weight policy violation.
    #[error("histogram error: {0}")]
    Histogram(String),
}

/// Result alias for draw operations.
pub type Result<T> = std::result::Result<T, DrawError>;
