//! The Proof-of-Stake search.
//!
//! The stake search is time-quantized rather than nonce-enumerated: per
//! 16-second grid slot it walks the staking account's coins in
//! deterministic order and evaluates the kernel predicate for each. A
//! grid slot is attempted once; between slots the searcher yields and
//! re-reads the clock.
//!
//! The compact target handed to the kernel is derived from the coin's
//! value. That is atypical among PoS chains but matches the network's
//! deployed behavior; [`StakeSearcher::with_target_from_bits`] opts into
//! the conventional block-bits target instead.

use crate::chain::Chain;
use crate::clock::Clock;
use crate::job::StakingJob;
use crate::template::Block;
use crate::tx::Coin;
use crate::wallet::{StakingWallet, WalletError};
use crate::StakingResult;
use num_bigint::BigUint;
use secp256k1::{Message, Secp256k1};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use umbra_consensus::params::STAKE_TIMESTAMP_MASK;
use umbra_consensus::{check_stake_kernel, target_to_compact, Hash256};

/// Time-quantized stake searcher.
pub struct StakeSearcher {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    target_from_bits: bool,
}

impl StakeSearcher {
    /// Create a searcher with the default 250ms clock poll.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            poll_interval: Duration::from_millis(250),
            target_from_bits: false,
        }
    }

    /// Override how often the searcher re-reads the clock while waiting
    /// for the next grid slot.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Derive the kernel target from the block's bits instead of the
    /// coin's value.
    pub fn with_target_from_bits(mut self, target_from_bits: bool) -> Self {
        self.target_from_bits = target_from_bits;
        self
    }

    /// Search until a kernel is found or the job is destroyed.
    ///
    /// On success the returned block carries a signed coinstake at slot
    /// 1 and a canonical block signature.
    pub async fn search(
        &self,
        job: &StakingJob,
        chain: &dyn Chain,
        wallet: &dyn StakingWallet,
    ) -> StakingResult<Option<Block>> {
        let tip = job.tip().clone();
        let mut last_slot: Option<u32> = None;

        loop {
            if job.is_destroyed() {
                return Ok(None);
            }

            let now = self.clock.now() as u32;
            let n_time = now & !STAKE_TIMESTAMP_MASK;

            // One attempt per grid slot; wait out the remainder.
            if last_slot == Some(n_time) {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            last_slot = Some(n_time);

            let mut coins = wallet.staking_coins();
            coins.sort_by_key(|coin| coin.out_point);
            trace!(slot = n_time, coins = coins.len(), "Scanning stake slot");

            for coin in &coins {
                if job.is_destroyed() {
                    return Ok(None);
                }

                // The coin must still exist in the chain's view.
                if chain.get_coins(&coin.out_point.txid).is_none() {
                    continue;
                }

                let bits = if self.target_from_bits {
                    job.bits()
                } else {
                    target_to_compact(&BigUint::from(coin.value))
                };

                let kernel = check_stake_kernel(
                    &tip.stake_modifier,
                    tip.height,
                    bits,
                    coin.height,
                    coin.value,
                    coin.time,
                    &coin.out_point.txid,
                    coin.out_point.index,
                    n_time,
                )?;

                if let Some(kernel_hash) = kernel {
                    info!(
                        height = job.height(),
                        kernel = %kernel_hash,
                        value = coin.value,
                        slot = n_time,
                        "Stake kernel found"
                    );
                    return self.finish(job, wallet, coin, n_time);
                }
            }

            debug!(slot = n_time, "No kernel this slot");
        }
    }

    /// Commit the coinstake, sign it, and sign the block.
    fn finish(
        &self,
        job: &StakingJob,
        wallet: &dyn StakingWallet,
        coin: &Coin,
        n_time: u32,
    ) -> StakingResult<Option<Block>> {
        let Some(mut block) = job.commit_coinstake(n_time, coin)? else {
            return Ok(None);
        };

        wallet.sign_coinstake(&mut block.txs[1], coin)?;
        // The root is a pure function of the transactions; the signed
        // coinstake changed them.
        block.update_merkle_root();

        let signature = sign_block_hash(block.hash()?, wallet, coin)?;
        block.set_signature(signature);

        Ok(Some(block))
    }
}

/// Canonical (low-S) ECDSA signature over a block's identity hash with
/// the key authoritative for the kernel coin's locking script.
fn sign_block_hash(
    hash: Hash256,
    wallet: &dyn StakingWallet,
    coin: &Coin,
) -> Result<Vec<u8>, WalletError> {
    let key = wallet
        .private_key(&coin.script_pubkey)
        .ok_or_else(|| WalletError::KeyNotFound(hex::encode(&coin.script_pubkey)))?;

    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(hash.0);
    let signature = secp.sign_ecdsa(&message, &key);
    Ok(signature.serialize_der().to_vec())
}
