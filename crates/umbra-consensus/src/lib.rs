//! # umbra-consensus
//!
//! Consensus arithmetic for the Umbra blockchain.
//!
//! This crate provides:
//! - Compact difficulty target encoding/decoding
//! - Block header wire format and version-keyed identity hashing
//! - The Proof-of-Stake kernel predicate
//! - Stake-modifier evolution
//!
//! ## Identity hashing
//!
//! Umbra kept the scrypt identity hash of its early ancestors for legacy
//! block versions and switched to double-SHA-256 at version 7:
//! - `version < 7`: `scrypt(header, header, N=1024, r=1, p=1, dkLen=32)`
//! - `version >= 7`: `sha256d(header)`
//!
//! ## The kernel
//!
//! A coin may mint a block when the double-SHA-256 of the kernel data,
//! divided by the coin's value, does not exceed the difficulty target.
//! Acceptance probability is therefore proportional to the staked value.

mod compact;
mod error;
mod header;
mod kernel;

pub use compact::{compact_to_target, target_to_compact};
pub use error::{ConsensusError, ConsensusResult};
pub use header::{pow_hash_raw, sha256d, BlockHeader, Hash256, HEADER_SIZE, NONCE_OFFSET};
pub use kernel::{check_stake_kernel, next_stake_modifier, stake_kernel_hash};

/// Umbra network parameters.
pub mod params {
    /// Depth a coin must be buried at before it may stake.
    pub const STAKE_MIN_CONFIRMATIONS: u32 = 500;

    /// Stake timestamps are truncated to a 16-second grid.
    pub const STAKE_TIMESTAMP_MASK: u32 = 15;

    /// First block version hashed with double-SHA-256 instead of scrypt.
    pub const POW_HASH_VERSION: u32 = 7;

    /// Nonce slice width for the CPU proof-of-work scan.
    pub const POW_SCAN_INTERVAL: u32 = 0xffff_ffff / 1500;

    /// Size of the 32-bit header nonce space.
    pub const NONCE_SPACE: u64 = 1 << 32;

    /// Maximum block size in bytes.
    pub const MAX_BLOCK_SIZE: usize = 1_048_576;

    /// Initial block subsidy in base units (50 UMB).
    pub const INITIAL_SUBSIDY: u64 = 50 * 100_000_000;

    /// Subsidy halves every this many blocks.
    pub const SUBSIDY_HALVING_INTERVAL: u32 = 210_000;

    /// Block subsidy at the given height.
    pub fn block_subsidy(height: u32) -> u64 {
        let halvings = height / SUBSIDY_HALVING_INTERVAL;
        if halvings >= 64 {
            0
        } else {
            INITIAL_SUBSIDY >> halvings
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_subsidy_halves() {
            assert_eq!(block_subsidy(0), INITIAL_SUBSIDY);
            assert_eq!(block_subsidy(SUBSIDY_HALVING_INTERVAL - 1), INITIAL_SUBSIDY);
            assert_eq!(block_subsidy(SUBSIDY_HALVING_INTERVAL), INITIAL_SUBSIDY / 2);
            assert_eq!(block_subsidy(SUBSIDY_HALVING_INTERVAL * 2), INITIAL_SUBSIDY / 4);
        }

        #[test]
        fn test_subsidy_runs_out() {
            assert_eq!(block_subsidy(SUBSIDY_HALVING_INTERVAL.saturating_mul(64)), 0);
        }
    }
}
