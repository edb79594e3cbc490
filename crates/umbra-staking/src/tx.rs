//! Minimal transaction model.
//!
//! Enough structure to assemble coinbase and coinstake transactions,
//! compute txids and merkle roots, and hand coins to the kernel. Full
//! transaction consensus validation belongs to the chain.
//!
//! Umbra transactions carry the PoS-family `time` field between the
//! version and the inputs; everything else follows the Bitcoin wire
//! conventions (little-endian integers, varint counts).

use umbra_consensus::{sha256d, Hash256};

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    /// Funding transaction id.
    pub txid: Hash256,
    /// Output index within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub const NULL: OutPoint = OutPoint {
        txid: Hash256::ZERO,
        index: u32::MAX,
    };

    /// Whether this is the null (coinbase) outpoint.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Output being spent.
    pub prev_out: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in base units.
    pub value: u64,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// The empty marker output that opens a coinstake.
    pub fn coinstake_marker() -> Self {
        Self {
            value: 0,
            script_pubkey: Vec::new(),
        }
    }

    /// Whether this is an empty marker output.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction version.
    pub version: u32,
    /// Transaction timestamp (unix seconds). The kernel hashes the
    /// funding transaction's timestamp, so it is part of consensus.
    pub time: u32,
    /// Inputs.
    pub inputs: Vec<TxInput>,
    /// Outputs.
    pub outputs: Vec<TxOutput>,
    /// Lock time.
    pub lock_time: u32,
}

impl Transaction {
    /// Canonical serialization.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());

        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.prev_out.txid.as_bytes());
            out.extend_from_slice(&input.prev_out.index.to_le_bytes());
            write_varint(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        // version + time + lock_time
        let mut size = 12;
        size += varint_size(self.inputs.len() as u64);
        for input in &self.inputs {
            size += 36 + varint_size(input.script_sig.len() as u64) + input.script_sig.len() + 4;
        }
        size += varint_size(self.outputs.len() as u64);
        for output in &self.outputs {
            size += 8 + varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        size
    }

    /// Transaction id: double-SHA-256 of the canonical serialization.
    pub fn txid(&self) -> Hash256 {
        sha256d(&self.serialize())
    }

    /// Whether this transaction is a coinbase.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_out.is_null()
    }

    /// Whether this transaction is a coinstake: it spends a real output
    /// and its first output is the empty marker.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prev_out.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    /// Sum of output values.
    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// Merkle root over a transaction list: sha256d pairwise, the odd node
/// duplicated. An empty list yields the zero hash.
pub fn merkle_root(txs: &[Transaction]) -> Hash256 {
    let ids: Vec<Hash256> = txs.iter().map(Transaction::txid).collect();
    merkle_root_hashes(ids)
}

/// Merkle root over precomputed transaction ids.
pub fn merkle_root_hashes(ids: Vec<Hash256>) -> Hash256 {
    let mut layer = ids;
    if layer.is_empty() {
        return Hash256::ZERO;
    }

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);
            let mut data = [0u8; 64];
            data[..32].copy_from_slice(left.as_bytes());
            data[32..].copy_from_slice(right.as_bytes());
            next.push(sha256d(&data));
        }
        layer = next;
    }

    layer[0]
}

/// A spendable output reference, as enumerated by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    /// The output this coin refers to.
    pub out_point: OutPoint,
    /// Value in base units.
    pub value: u64,
    /// Height of the confirming block.
    pub height: u32,
    /// Timestamp of the funding transaction.
    pub time: u32,
    /// Locking script of the output.
    pub script_pubkey: Vec<u8>,
}

pub(crate) fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn varint_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}
