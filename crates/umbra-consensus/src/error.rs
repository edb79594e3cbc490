//! Error types for consensus arithmetic.

use thiserror::Error;

/// Consensus arithmetic errors.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Compact target that decodes to a negative or overflowing 256-bit value.
    #[error("Invalid compact target: {0:#010x}")]
    InvalidCompact(u32),

    /// Header buffer of the wrong length.
    #[error("Invalid header length: {0} bytes, expected 80")]
    InvalidHeaderLength(usize),

    /// Key-derivation failure in the legacy identity hash.
    #[error("Scrypt hashing failed: {0}")]
    Scrypt(String),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
