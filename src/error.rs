// src/error.rs
//
// Typed error taxonomy for the pipeline engine and the replay driver.
// Non-OK call outcomes are not errors in this sense; they travel as
// `Status` values through the handler chain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed trace line, bad argument arity, or an unparseable number.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Use of a consumed operation or pipeline. Most such misuse is a
    /// compile error in this crate; the variant covers what remains
    /// representable at runtime.
    #[error("invalid composition: {0}")]
    InvalidComposition(&'static str),

    /// The pipeline deadline passed before an operation could be submitted.
    #[error("operation expired before submission")]
    OperationExpired,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
