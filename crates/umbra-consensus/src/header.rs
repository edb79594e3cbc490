//! Block header wire format and identity hashing.
//!
//! The header is 80 bytes: `u32 version ‖ 32B prev ‖ 32B merkle root ‖
//! u32 time ‖ u32 bits ‖ u32 nonce`, little-endian integers, hashes in
//! wire order. Identity hashing is keyed off the version: legacy versions
//! hash with scrypt (the header doubling as its own salt), version 7 and
//! later with double-SHA-256.

use crate::params::POW_HASH_VERSION;
use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use std::fmt;

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 80;

/// Byte offset of the nonce field within a serialized header.
pub const NONCE_OFFSET: usize = 76;

/// A 32-byte hash in wire order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Wire-order bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interpret the hash as an unsigned 256-bit integer.
    ///
    /// Wire order is little-endian, so the last byte is the most
    /// significant.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

/// Double-SHA-256.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

/// Identity hash of a serialized header, keyed off its version field.
pub fn pow_hash_raw(header: &[u8; HEADER_SIZE]) -> ConsensusResult<Hash256> {
    let version = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if version < POW_HASH_VERSION {
        let params = scrypt::Params::new(10, 1, 1, 32)
            .map_err(|e| ConsensusError::Scrypt(e.to_string()))?;
        let mut out = [0u8; 32];
        scrypt::scrypt(header, header, &params, &mut out)
            .map_err(|e| ConsensusError::Scrypt(e.to_string()))?;
        Ok(Hash256(out))
    } else {
        Ok(sha256d(header))
    }
}

/// A block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version.
    pub version: u32,
    /// Hash of the previous block.
    pub prev_block: Hash256,
    /// Merkle root over the block's transactions.
    pub merkle_root: Hash256,
    /// Block timestamp (unix seconds).
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Canonical 80-byte serialization.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Parse a header from its 80-byte wire form.
    pub fn parse(data: &[u8]) -> ConsensusResult<Self> {
        if data.len() != HEADER_SIZE {
            return Err(ConsensusError::InvalidHeaderLength(data.len()));
        }

        let mut prev = [0u8; 32];
        prev.copy_from_slice(&data[4..36]);
        let mut root = [0u8; 32];
        root.copy_from_slice(&data[36..68]);

        Ok(Self {
            version: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            prev_block: Hash256(prev),
            merkle_root: Hash256(root),
            time: u32::from_le_bytes(data[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(data[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(data[76..80].try_into().unwrap()),
        })
    }

    /// Version-keyed identity hash.
    pub fn pow_hash(&self) -> ConsensusResult<Hash256> {
        pow_hash_raw(&self.serialize())
    }
}
