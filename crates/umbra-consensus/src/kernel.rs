//! The Proof-of-Stake kernel predicate.
//!
//! A (coin, time) pair authorizes a block when
//!
//! ```text
//! sha256d(modifier ‖ coin_time ‖ prev_txid ‖ prev_index ‖ time_tx) / value <= target(bits)
//! ```
//!
//! with all integers serialized little-endian and hashes in wire order.
//! The division is 256-bit integer division with truncation, which ties
//! acceptance probability proportionally to the staked value.
//!
//! Everything here is pure and synchronous so the predicate is safe to
//! evaluate from worker threads.

use crate::params::STAKE_MIN_CONFIRMATIONS;
use crate::{compact_to_target, sha256d, ConsensusResult, Hash256};
use num_bigint::BigUint;
use tracing::trace;

/// Kernel hash over the stake-search inputs.
pub fn stake_kernel_hash(
    stake_modifier: &Hash256,
    coin_time: u32,
    prev_txid: &Hash256,
    prev_index: u32,
    time_tx: u32,
) -> Hash256 {
    let mut data = Vec::with_capacity(32 + 4 + 32 + 4 + 4);
    data.extend_from_slice(stake_modifier.as_bytes());
    data.extend_from_slice(&coin_time.to_le_bytes());
    data.extend_from_slice(prev_txid.as_bytes());
    data.extend_from_slice(&prev_index.to_le_bytes());
    data.extend_from_slice(&time_tx.to_le_bytes());
    sha256d(&data)
}

/// Evaluate the kernel predicate for one coin at one candidate timestamp.
///
/// Preconditions checked before the hash test:
/// - the coin must be buried at least [`STAKE_MIN_CONFIRMATIONS`] deep in
///   the chain the next block extends (`tip_height + 1 - coin_height`),
/// - the coin's value must be positive.
///
/// Returns the kernel hash on success (the caller needs it to evolve the
/// stake modifier), `None` when a precondition fails or the hash test
/// misses. The existence of the coin is the caller's burden.
#[allow(clippy::too_many_arguments)]
pub fn check_stake_kernel(
    stake_modifier: &Hash256,
    tip_height: u32,
    bits: u32,
    coin_height: u32,
    coin_value: u64,
    coin_time: u32,
    prev_txid: &Hash256,
    prev_index: u32,
    time_tx: u32,
) -> ConsensusResult<Option<Hash256>> {
    let depth = (tip_height + 1).saturating_sub(coin_height);
    if depth < STAKE_MIN_CONFIRMATIONS {
        return Ok(None);
    }

    if coin_value == 0 {
        return Ok(None);
    }

    let target = compact_to_target(bits)?;
    let hash = stake_kernel_hash(stake_modifier, coin_time, prev_txid, prev_index, time_tx);
    let weighted = hash.to_biguint() / BigUint::from(coin_value);

    if weighted <= target {
        trace!(kernel = %hash, value = coin_value, "Kernel hit");
        Ok(Some(hash))
    } else {
        Ok(None)
    }
}

/// Stake modifier for the block after a successful kernel.
///
/// `sha256d(kernel_hash ‖ prev_modifier)`, in that byte order. Pure and
/// deterministic; no wall-clock input.
pub fn next_stake_modifier(kernel_hash: &Hash256, prev_modifier: &Hash256) -> Hash256 {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(kernel_hash.as_bytes());
    data.extend_from_slice(prev_modifier.as_bytes());
    sha256d(&data)
}
