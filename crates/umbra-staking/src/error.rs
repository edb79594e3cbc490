//! Staking error types.

use crate::chain::ChainError;
use crate::wallet::WalletError;
use thiserror::Error;
use umbra_consensus::ConsensusError;

/// Staking errors.
#[derive(Error, Debug)]
pub enum StakingError {
    /// The staker loop is already running.
    #[error("Staker already running")]
    AlreadyRunning,

    /// The staker loop is not running.
    #[error("Staker not running")]
    NotRunning,

    /// A stop is already in flight.
    #[error("Stop already in progress")]
    AlreadyStopping,

    /// A job may commit at most once.
    #[error("Job already committed")]
    AlreadyCommitted,

    /// The job was destroyed before it could finish.
    #[error("Job destroyed")]
    JobDestroyed,

    /// A transaction failed template policy checks.
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Consensus arithmetic error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Chain error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Wallet error.
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for staking operations.
pub type StakingResult<T> = Result<T, StakingError>;
