//! Chain collaborator interface.
//!
//! The engine never owns the chain; it reads tip snapshots and a coin
//! view, and submits finished blocks. Implementations live with the
//! embedding node.

use crate::template::Block;
use crate::tx::Transaction;
use thiserror::Error;
use umbra_consensus::Hash256;

/// Errors surfaced by the chain collaborator.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The block failed consensus verification.
    #[error("Block verification failed: {0}")]
    Verify(String),

    /// Other chain failure.
    #[error("{0}")]
    Other(String),
}

/// Read-only snapshot of the chain tip. One job operates against one
/// snapshot; a new tip invalidates the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipSnapshot {
    /// Tip height.
    pub height: u32,
    /// Tip block hash.
    pub hash: Hash256,
    /// Hash of the tip's parent.
    pub prev_block: Hash256,
    /// Tip timestamp.
    pub time: u32,
    /// Compact difficulty target for the next block.
    pub bits: u32,
    /// Stake modifier carried by the tip.
    pub stake_modifier: Hash256,
}

/// Chain entry returned for an accepted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// Height of the accepted block.
    pub height: u32,
    /// Identity hash of the accepted block.
    pub hash: Hash256,
}

/// A funding transaction as seen by the coin view.
#[derive(Debug, Clone)]
pub struct PrevTx {
    /// The funding transaction.
    pub tx: Transaction,
    /// Height of the block that confirmed it.
    pub height: u32,
    /// Timestamp of the funding transaction.
    pub time: u32,
}

/// Read access to confirmed funding transactions.
pub trait CoinView {
    /// Look up the funding transaction for the given txid, if it is
    /// known to the view.
    fn get_coins(&self, txid: &Hash256) -> Option<PrevTx>;
}

/// The chain collaborator.
///
/// Each call is treated as atomic at the chain boundary; `add_block`
/// returning `Ok(None)` means a sibling block won the race for this
/// height.
pub trait Chain: CoinView + Send + Sync {
    /// Current tip snapshot.
    fn tip(&self) -> TipSnapshot;

    /// Submit a block for acceptance.
    fn add_block(&self, block: Block) -> Result<Option<ChainEntry>, ChainError>;
}
