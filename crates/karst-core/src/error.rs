//! Error types for Karst primitives.
use thiserror::Error;

/// Failures while decoding consensus-encoded bytes.
///
/// Malformed input never panics; an object that fails to decode simply does
/// not come into existence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated input: need {needed} more byte(s), {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("{0} trailing byte(s) after decoded value")]
    TrailingBytes(usize),
    #[error("count {count} too large for {remaining} remaining byte(s)")]
    OversizedCount { count: usize, remaining: usize },
    #[error("field length {len} exceeds maximum {max}")]
    OversizedField { len: usize, max: usize },
}
