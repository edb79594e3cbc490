//! Wallet collaborator interface.
//!
//! The hot path is read-mostly: enumerate the staking account's coins,
//! look up keys, sign. Coin selection policy beyond "enumerate the
//! staking account" belongs to the wallet.

use crate::tx::{Coin, Transaction};
use secp256k1::SecretKey;
use thiserror::Error;

/// Errors surfaced by the wallet collaborator.
#[derive(Error, Debug)]
pub enum WalletError {
    /// No key is known for the given locking script.
    #[error("No key for script {0}")]
    KeyNotFound(String),

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// The wallet collaborator.
pub trait StakingWallet: Send + Sync {
    /// Spendable coins of the staking account. The searcher applies the
    /// maturity and value gates; the wallet only enumerates.
    fn staking_coins(&self) -> Vec<Coin>;

    /// Private key authoritative for the given locking script.
    fn private_key(&self, script_pubkey: &[u8]) -> Option<SecretKey>;

    /// Sign a coinstake transaction spending the given coin. Mutates the
    /// input scripts in place.
    fn sign_coinstake(&self, tx: &mut Transaction, coin: &Coin) -> Result<(), WalletError>;
}
