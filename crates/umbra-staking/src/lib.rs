//! # umbra-staking
//!
//! Block production for the Umbra blockchain.
//!
//! This crate provides:
//! - Block templates with coinbase/coinstake assembly and extra-nonce
//!   threading
//! - Mining jobs with one-shot commit and destruction semantics
//! - The time-quantized Proof-of-Stake search
//! - A CPU Proof-of-Work path with an optional worker-thread pool
//! - The staker supervisor driving the whole loop
//!
//! The chain, mempool and wallet are collaborators behind the [`Chain`],
//! [`MempoolSource`] and [`StakingWallet`] traits; the engine owns none
//! of them. Embedders wire chain tip and mempool events into
//! [`Staker::notify_tip`] and [`Staker::notify_entry`].
//!
//! ## Cancellation
//!
//! A [`StakingJob`] is destroyed at most once and committed at most
//! once. Destruction is the sole cancellation channel: the searchers
//! observe it at every suspension point, and a destroyed job never
//! produces a block.

mod chain;
mod clock;
mod error;
mod job;
mod nonce;
mod stake;
mod staker;
mod template;
mod tx;
mod wallet;

pub use chain::{Chain, ChainEntry, ChainError, CoinView, PrevTx, TipSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StakingError, StakingResult};
pub use job::StakingJob;
pub use nonce::{mine, MineOutcome, MineTask, NonceSearcher, WorkerPool};
pub use stake::StakeSearcher;
pub use staker::{Staker, StakerConfig, StakerEvent};
pub use template::{
    BasicTemplateBuilder, Block, BlockProof, BlockTemplate, HeaderProof, MempoolSource,
    TemplateBuilder, MAX_TEMPLATE_TXS,
};
pub use tx::{merkle_root, Coin, OutPoint, Transaction, TxInput, TxOutput};
pub use wallet::{StakingWallet, WalletError};
