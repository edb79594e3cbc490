//! Block templates and finished blocks.
//!
//! A template is the mutable draft of the next block: header fields, the
//! transaction list with the coinbase at slot 0 (and the coinstake at
//! slot 1 on the PoS path), and the extra-nonce pair threaded into the
//! coinbase script. The merkle root and the coinbase are derived lazily
//! and cached; any mutation drops the cache.
//!
//! Committing freezes the draft into a [`Block`] carrying a tagged
//! [`BlockProof`].

use crate::chain::{Chain, CoinView, TipSnapshot};
use crate::tx::{self, Coin, OutPoint, Transaction, TxInput, TxOutput};
use crate::{StakingError, StakingResult};
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::debug;
use umbra_consensus::params::{block_subsidy, MAX_BLOCK_SIZE, STAKE_TIMESTAMP_MASK};
use umbra_consensus::{compact_to_target, BlockHeader, ConsensusResult, Hash256, HEADER_SIZE};

/// Maximum transactions per template.
pub const MAX_TEMPLATE_TXS: usize = 1000;

/// Proof carried by a finished block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockProof {
    /// Proof-of-work: the winning header nonce.
    Pow {
        /// Winning nonce.
        nonce: u32,
    },
    /// Proof-of-stake: the kernel coin, the quantized stake time and the
    /// block signature.
    Stake {
        /// Quantized stake timestamp.
        time: u32,
        /// Output whose kernel authorized the block.
        kernel: OutPoint,
        /// Canonical ECDSA signature over the block's identity hash.
        signature: Vec<u8>,
    },
}

/// A finished block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions; coinbase at 0, coinstake at 1 on the PoS path.
    pub txs: Vec<Transaction>,
    /// The proof variant.
    pub proof: BlockProof,
}

impl Block {
    /// Version-keyed identity hash.
    pub fn hash(&self) -> ConsensusResult<Hash256> {
        self.header.pow_hash()
    }

    /// Whether this block carries a stake proof.
    pub fn is_stake(&self) -> bool {
        matches!(self.proof, BlockProof::Stake { .. })
    }

    /// The coinstake transaction, if present.
    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_stake() {
            self.txs.get(1)
        } else {
            None
        }
    }

    /// The block signature, if this is a stake block.
    pub fn signature(&self) -> Option<&[u8]> {
        match &self.proof {
            BlockProof::Stake { signature, .. } if !signature.is_empty() => Some(signature),
            _ => None,
        }
    }

    /// Attach the block signature to a stake proof. Returns false for
    /// PoW blocks.
    pub fn set_signature(&mut self, sig: Vec<u8>) -> bool {
        match &mut self.proof {
            BlockProof::Stake { signature, .. } => {
                *signature = sig;
                true
            }
            BlockProof::Pow { .. } => false,
        }
    }

    /// Recompute the header merkle root from the current transactions.
    ///
    /// The root is a pure function of the transactions, so it must be
    /// refreshed after the coinstake is signed.
    pub fn update_merkle_root(&mut self) {
        self.header.merkle_root = tx::merkle_root(&self.txs);
    }

    /// Raw serialization: header, transaction list, and the block
    /// signature on the stake path. Used for logging a block before it
    /// is discarded.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + 256 * self.txs.len());
        out.extend_from_slice(&self.header.serialize());
        tx::write_varint(&mut out, self.txs.len() as u64);
        for tx in &self.txs {
            out.extend_from_slice(&tx.serialize());
        }
        if let BlockProof::Stake { signature, .. } = &self.proof {
            tx::write_varint(&mut out, signature.len() as u64);
            out.extend_from_slice(signature);
        }
        out
    }
}

/// Finished header-space proof: the extra-nonce pair, timestamp and
/// nonce that solved the template, with the coinbase they imply.
#[derive(Debug, Clone)]
pub struct HeaderProof {
    /// Extra-nonce high counter.
    pub n1: u32,
    /// Extra-nonce low counter.
    pub n2: u32,
    /// Header timestamp.
    pub time: u32,
    /// Winning nonce.
    pub nonce: u32,
    /// Merkle root over the extra-nonce-bearing transaction list.
    pub merkle_root: Hash256,
    /// The final coinbase.
    pub coinbase: Transaction,
}

/// Mutable draft of the next block.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Block version.
    pub version: u32,
    /// Hash of the tip this template extends.
    pub prev_block: Hash256,
    /// Height of the block under construction.
    pub height: u32,
    /// Current header timestamp.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Decoded difficulty target.
    pub target: BigUint,
    /// Stake modifier of the tip snapshot.
    pub stake_modifier: Hash256,
    /// Whether this template carries a coinstake slot.
    pub pos: bool,
    /// Arbitrary coinbase flag bytes.
    pub coinbase_flags: Vec<u8>,
    /// Locking script receiving the reward.
    pub reward_script: Vec<u8>,
    /// Block subsidy for this height.
    pub reward: u64,
    /// Coinbase timestamp, fixed at creation so the merkle root is
    /// independent of per-attempt header timestamps.
    coinbase_time: u32,
    /// Accumulated fees of the included transactions.
    fees: u64,
    /// Transactions; slot 0 is the coinbase, rebuilt lazily.
    txs: Vec<Transaction>,
    /// Extra-nonce pair.
    n1: u32,
    n2: u32,
    /// Cached merkle root.
    cached_root: Option<Hash256>,
}

impl BlockTemplate {
    /// Create a template on top of the given tip.
    pub fn new(
        version: u32,
        tip: &TipSnapshot,
        pos: bool,
        coinbase_flags: Vec<u8>,
        reward_script: Vec<u8>,
        reward: u64,
    ) -> StakingResult<Self> {
        let target = compact_to_target(tip.bits)?;
        let time = tip.time.saturating_add(1);

        let mut template = Self {
            version,
            prev_block: tip.hash,
            height: tip.height + 1,
            time,
            bits: tip.bits,
            target,
            stake_modifier: tip.stake_modifier,
            pos,
            coinbase_flags,
            reward_script,
            reward,
            coinbase_time: time,
            fees: 0,
            txs: Vec::with_capacity(8),
            n1: 0,
            n2: 0,
            cached_root: None,
        };
        let coinbase = template.build_coinbase(0, 0);
        template.txs.push(coinbase);
        Ok(template)
    }

    /// Current extra-nonce pair.
    pub fn extra_nonce(&self) -> (u32, u32) {
        (self.n1, self.n2)
    }

    /// Transactions currently in the template.
    pub fn txs(&self) -> &[Transaction] {
        &self.txs
    }

    /// Accumulated fees.
    pub fn fees(&self) -> u64 {
        self.fees
    }

    /// Validate a transaction against the view and append it.
    ///
    /// Policy checks: inputs must resolve in the view, input scripts must
    /// be present, the fee must be non-negative and the block must stay
    /// under the size limit.
    pub fn add_tx<V>(&mut self, tx: Transaction, view: &V) -> StakingResult<()>
    where
        V: CoinView + ?Sized,
    {
        if tx.is_coinbase() {
            return Err(StakingError::Policy("coinbase cannot be added".into()));
        }
        if self.txs.len() >= MAX_TEMPLATE_TXS {
            return Err(StakingError::Policy("template is full".into()));
        }

        let mut input_value: u64 = 0;
        for input in &tx.inputs {
            if input.script_sig.is_empty() {
                return Err(StakingError::Policy(format!(
                    "unsigned input {}:{}",
                    input.prev_out.txid, input.prev_out.index
                )));
            }
            let prev = view.get_coins(&input.prev_out.txid).ok_or_else(|| {
                StakingError::Policy(format!("orphan input {}", input.prev_out.txid))
            })?;
            let out = prev
                .tx
                .outputs
                .get(input.prev_out.index as usize)
                .ok_or_else(|| {
                    StakingError::Policy(format!(
                        "missing output {}:{}",
                        input.prev_out.txid, input.prev_out.index
                    ))
                })?;
            input_value = input_value.saturating_add(out.value);
        }

        let output_value = tx.output_value();
        if output_value > input_value {
            return Err(StakingError::Policy(format!(
                "fee below zero: in {input_value}, out {output_value}"
            )));
        }

        if self.block_size() + tx.serialized_size() > MAX_BLOCK_SIZE {
            return Err(StakingError::Policy("block size exceeded".into()));
        }

        self.fees += input_value - output_value;
        self.txs.push(tx);
        self.cached_root = None;
        Ok(())
    }

    /// Append a transaction without validation. Used by the stake path.
    pub fn push_tx(&mut self, tx: Transaction) {
        self.txs.push(tx);
        self.cached_root = None;
    }

    /// Drop the derived caches.
    pub fn refresh(&mut self) {
        self.cached_root = None;
    }

    /// Advance the extra-nonce pair: `n2` increments and carries into
    /// `n1` on overflow.
    pub fn update_nonce(&mut self) {
        let (n2, carried) = self.n2.overflowing_add(1);
        self.n2 = n2;
        if carried {
            self.n1 = self.n1.wrapping_add(1);
        }
        self.cached_root = None;
    }

    /// Merkle root over the current transactions, with the coinbase
    /// rebuilt for the current extra-nonce pair. Cached until the next
    /// mutation.
    pub fn merkle_root(&mut self) -> Hash256 {
        if let Some(root) = self.cached_root {
            return root;
        }
        self.txs[0] = self.build_coinbase(self.n1, self.n2);
        let root = tx::merkle_root(&self.txs);
        self.cached_root = Some(root);
        root
    }

    /// Canonical 80-byte header for the given root, timestamp and nonce.
    pub fn get_header(&self, merkle_root: Hash256, time: u32, nonce: u32) -> [u8; HEADER_SIZE] {
        BlockHeader {
            version: self.version,
            prev_block: self.prev_block,
            merkle_root,
            time,
            bits: self.bits,
            nonce,
        }
        .serialize()
    }

    /// Build the final extra-nonce-bearing coinbase and the header-space
    /// proof for a solved attempt.
    pub fn get_proof(&self, n1: u32, n2: u32, time: u32, nonce: u32) -> HeaderProof {
        let coinbase = self.build_coinbase(n1, n2);
        let mut ids: Vec<Hash256> = Vec::with_capacity(self.txs.len());
        ids.push(coinbase.txid());
        ids.extend(self.txs[1..].iter().map(Transaction::txid));
        let merkle_root = tx::merkle_root_hashes(ids);

        HeaderProof {
            n1,
            n2,
            time,
            nonce,
            merkle_root,
            coinbase,
        }
    }

    /// Freeze the template into a PoW block.
    pub fn commit(&mut self, proof: HeaderProof) -> Block {
        self.n1 = proof.n1;
        self.n2 = proof.n2;
        self.time = proof.time;
        self.txs[0] = proof.coinbase;
        self.cached_root = Some(proof.merkle_root);

        Block {
            header: BlockHeader {
                version: self.version,
                prev_block: self.prev_block,
                merkle_root: proof.merkle_root,
                time: proof.time,
                bits: self.bits,
                nonce: proof.nonce,
            },
            txs: self.txs.clone(),
            proof: BlockProof::Pow { nonce: proof.nonce },
        }
    }

    /// Freeze the template into an unsigned PoS block: install the
    /// coinstake at slot 1, move the header to the quantized stake time
    /// and recompute the root. The caller signs the coinstake and the
    /// block.
    pub fn commit_coinstake(&mut self, n_time: u32, coin: &Coin) -> Block {
        debug_assert_eq!(n_time & STAKE_TIMESTAMP_MASK, 0);

        let coinstake = Transaction {
            version: 1,
            time: n_time,
            inputs: vec![TxInput {
                prev_out: coin.out_point,
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            outputs: vec![
                TxOutput::coinstake_marker(),
                TxOutput {
                    value: coin.value + self.reward + self.fees,
                    script_pubkey: coin.script_pubkey.clone(),
                },
            ],
            lock_time: 0,
        };

        if self.txs.len() > 1 && self.txs[1].is_coinstake() {
            self.txs[1] = coinstake;
        } else {
            self.txs.insert(1, coinstake);
        }
        self.time = n_time;
        self.cached_root = None;
        let merkle_root = self.merkle_root();

        Block {
            header: BlockHeader {
                version: self.version,
                prev_block: self.prev_block,
                merkle_root,
                time: n_time,
                bits: self.bits,
                nonce: 0,
            },
            txs: self.txs.clone(),
            proof: BlockProof::Stake {
                time: n_time,
                kernel: coin.out_point,
                signature: Vec::new(),
            },
        }
    }

    /// Current serialized block size.
    fn block_size(&self) -> usize {
        HEADER_SIZE + 1 + self.txs.iter().map(Transaction::serialized_size).sum::<usize>()
    }

    fn build_coinbase(&self, n1: u32, n2: u32) -> Transaction {
        let mut script_sig =
            Vec::with_capacity(4 + self.coinbase_flags.len() + 8);
        script_sig.extend_from_slice(&self.height.to_le_bytes());
        script_sig.extend_from_slice(&self.coinbase_flags);
        script_sig.extend_from_slice(&n1.to_le_bytes());
        script_sig.extend_from_slice(&n2.to_le_bytes());

        // On the PoS path the coinbase is an empty marker; the coinstake
        // mints the reward.
        let outputs = if self.pos {
            vec![TxOutput {
                value: 0,
                script_pubkey: Vec::new(),
            }]
        } else {
            vec![TxOutput {
                value: self.reward + self.fees,
                script_pubkey: self.reward_script.clone(),
            }]
        };

        Transaction {
            version: 1,
            time: self.coinbase_time,
            inputs: vec![TxInput {
                prev_out: OutPoint::NULL,
                script_sig,
                sequence: u32::MAX,
            }],
            outputs,
            lock_time: 0,
        }
    }
}

/// Produces fresh templates on top of a tip. External to the engine
/// core; the provided [`BasicTemplateBuilder`] covers embedders without
/// bespoke assembly policy.
pub trait TemplateBuilder: Send + Sync {
    /// Build a fresh template extending the tip, paying the reward to
    /// the given locking script.
    fn create_block(&self, tip: &TipSnapshot, reward_script: &[u8]) -> StakingResult<BlockTemplate>;
}

/// Pending-transaction source for template assembly.
pub trait MempoolSource: Send + Sync {
    /// Up to `max` pending transactions, best first.
    fn pending(&self, max: usize) -> Vec<Transaction>;
}

/// Straightforward template builder: subsidy from the emission schedule,
/// pending transactions validated against the chain's coin view,
/// policy rejects skipped with a debug log.
pub struct BasicTemplateBuilder {
    chain: Arc<dyn Chain>,
    mempool: Option<Arc<dyn MempoolSource>>,
    version: u32,
    pos: bool,
    coinbase_flags: Vec<u8>,
}

impl BasicTemplateBuilder {
    /// Create a builder for the given block version.
    pub fn new(chain: Arc<dyn Chain>, version: u32, pos: bool) -> Self {
        Self {
            chain,
            mempool: None,
            version,
            pos,
            coinbase_flags: Vec::new(),
        }
    }

    /// Include pending transactions from the given source.
    pub fn with_mempool(mut self, mempool: Arc<dyn MempoolSource>) -> Self {
        self.mempool = Some(mempool);
        self
    }

    /// Set the coinbase flag bytes.
    pub fn with_coinbase_flags(mut self, flags: Vec<u8>) -> Self {
        self.coinbase_flags = flags;
        self
    }
}

impl TemplateBuilder for BasicTemplateBuilder {
    fn create_block(&self, tip: &TipSnapshot, reward_script: &[u8]) -> StakingResult<BlockTemplate> {
        let reward = block_subsidy(tip.height + 1);
        let mut template = BlockTemplate::new(
            self.version,
            tip,
            self.pos,
            self.coinbase_flags.clone(),
            reward_script.to_vec(),
            reward,
        )?;

        if let Some(mempool) = &self.mempool {
            for tx in mempool.pending(MAX_TEMPLATE_TXS) {
                let txid = tx.txid();
                match template.add_tx(tx, self.chain.as_ref()) {
                    Ok(()) => {}
                    Err(StakingError::Policy(reason)) => {
                        debug!(%txid, reason, "Skipping pending transaction");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PrevTx;
    use std::collections::HashMap;

    struct MapView {
        txs: HashMap<Hash256, PrevTx>,
    }

    impl MapView {
        fn new() -> Self {
            Self {
                txs: HashMap::new(),
            }
        }

        fn insert(&mut self, tx: Transaction, height: u32) {
            let time = tx.time;
            self.txs.insert(tx.txid(), PrevTx { tx, height, time });
        }
    }

    impl CoinView for MapView {
        fn get_coins(&self, txid: &Hash256) -> Option<PrevTx> {
            self.txs.get(txid).cloned()
        }
    }

    fn tip() -> TipSnapshot {
        TipSnapshot {
            height: 1000,
            hash: Hash256([0x10; 32]),
            prev_block: Hash256([0x09; 32]),
            time: 0x6000_0000,
            bits: 0x2100ffff,
            stake_modifier: Hash256([0xAA; 32]),
        }
    }

    fn template(pos: bool) -> BlockTemplate {
        BlockTemplate::new(7, &tip(), pos, b"umbra".to_vec(), vec![0x51], 5000).unwrap()
    }

    fn funding_tx(value: u64) -> Transaction {
        Transaction {
            version: 1,
            time: 100,
            inputs: vec![TxInput {
                prev_out: OutPoint {
                    txid: Hash256([0x77; 32]),
                    index: 0,
                },
                script_sig: vec![0x01],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput {
                value,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn spending_tx(funding: &Transaction, value: u64) -> Transaction {
        Transaction {
            version: 1,
            time: 200,
            inputs: vec![TxInput {
                prev_out: OutPoint {
                    txid: funding.txid(),
                    index: 0,
                },
                script_sig: vec![0x02, 0x03],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput {
                value,
                script_pubkey: vec![0x52],
            }],
            lock_time: 0,
        }
    }

    fn coin(value: u64) -> Coin {
        Coin {
            out_point: OutPoint {
                txid: Hash256([0x55; 32]),
                index: 1,
            },
            value,
            height: 100,
            time: 900,
            script_pubkey: vec![0x53],
        }
    }

    #[test]
    fn test_new_template_has_coinbase() {
        let mut tpl = template(false);
        assert_eq!(tpl.txs().len(), 1);
        assert!(tpl.txs()[0].is_coinbase());
        assert_eq!(tpl.txs()[0].outputs[0].value, 5000);
        assert_eq!(tpl.prev_block, tip().hash);
        assert_eq!(tpl.height, 1001);

        // Root covers exactly the coinbase.
        let root = tpl.merkle_root();
        assert_eq!(root, tpl.txs()[0].txid());
    }

    #[test]
    fn test_pos_coinbase_is_empty() {
        let mut tpl = template(true);
        assert_eq!(tpl.merkle_root(), tpl.txs()[0].txid());
        assert_eq!(tpl.txs()[0].outputs.len(), 1);
        assert_eq!(tpl.txs()[0].outputs[0].value, 0);
        assert!(tpl.txs()[0].outputs[0].script_pubkey.is_empty());
    }

    #[test]
    fn test_add_tx_accepts_and_collects_fee() {
        let mut view = MapView::new();
        let funding = funding_tx(10_000);
        view.insert(funding.clone(), 500);

        let mut tpl = template(false);
        tpl.add_tx(spending_tx(&funding, 9_000), &view).unwrap();
        assert_eq!(tpl.fees(), 1_000);
        assert_eq!(tpl.txs().len(), 2);

        // The fee flows into the coinbase output.
        tpl.refresh();
        let _ = tpl.merkle_root();
        assert_eq!(tpl.txs()[0].outputs[0].value, 5000 + 1_000);
    }

    #[test]
    fn test_add_tx_rejects_orphan() {
        let view = MapView::new();
        let funding = funding_tx(10_000);
        let mut tpl = template(false);

        let err = tpl.add_tx(spending_tx(&funding, 9_000), &view).unwrap_err();
        assert!(matches!(err, StakingError::Policy(_)));
        assert_eq!(tpl.txs().len(), 1);
    }

    #[test]
    fn test_add_tx_rejects_unsigned() {
        let mut view = MapView::new();
        let funding = funding_tx(10_000);
        view.insert(funding.clone(), 500);

        let mut spend = spending_tx(&funding, 9_000);
        spend.inputs[0].script_sig.clear();

        let mut tpl = template(false);
        let err = tpl.add_tx(spend, &view).unwrap_err();
        assert!(matches!(err, StakingError::Policy(_)));
    }

    #[test]
    fn test_add_tx_rejects_negative_fee() {
        let mut view = MapView::new();
        let funding = funding_tx(10_000);
        view.insert(funding.clone(), 500);

        let mut tpl = template(false);
        let err = tpl
            .add_tx(spending_tx(&funding, 10_001), &view)
            .unwrap_err();
        assert!(matches!(err, StakingError::Policy(_)));
    }

    #[test]
    fn test_add_tx_rejects_oversize() {
        let mut view = MapView::new();
        let funding = funding_tx(10_000);
        view.insert(funding.clone(), 500);

        let mut spend = spending_tx(&funding, 9_000);
        spend.outputs[0].script_pubkey = vec![0u8; MAX_BLOCK_SIZE];

        let mut tpl = template(false);
        let err = tpl.add_tx(spend, &view).unwrap_err();
        assert!(matches!(err, StakingError::Policy(_)));
    }

    #[test]
    fn test_extra_nonce_changes_root() {
        let mut tpl = template(false);
        let before = tpl.merkle_root();
        tpl.update_nonce();
        let after = tpl.merkle_root();
        assert_ne!(before, after);
        assert_eq!(tpl.extra_nonce(), (0, 1));
    }

    #[test]
    fn test_extra_nonce_carry() {
        let mut tpl = template(false);
        tpl.n2 = u32::MAX;
        tpl.update_nonce();
        assert_eq!(tpl.extra_nonce(), (1, 0));
    }

    #[test]
    fn test_commit_pow() {
        let mut tpl = template(false);
        let proof = tpl.get_proof(3, 4, 0x6000_0100, 77);
        let block = tpl.commit(proof.clone());

        assert_eq!(block.header.nonce, 77);
        assert_eq!(block.header.time, 0x6000_0100);
        assert_eq!(block.header.merkle_root, proof.merkle_root);
        assert_eq!(block.proof, BlockProof::Pow { nonce: 77 });
        assert_eq!(block.txs[0], proof.coinbase);
        assert!(block.coinstake().is_none());

        // The proof's root covers the extra-nonce-bearing coinbase.
        assert_eq!(block.header.merkle_root, tx::merkle_root(&block.txs));
    }

    #[test]
    fn test_commit_coinstake() {
        let mut tpl = template(true);
        let stake = coin(100);
        let block = tpl.commit_coinstake(0x6000_0000, &stake);

        assert_eq!(block.header.time, 0x6000_0000);
        assert_eq!(block.header.time & STAKE_TIMESTAMP_MASK, 0);
        assert!(block.is_stake());

        let coinstake = block.coinstake().unwrap();
        assert!(coinstake.is_coinstake());
        assert_eq!(coinstake.inputs[0].prev_out, stake.out_point);
        assert_eq!(coinstake.outputs[1].value, 100 + 5000);
        assert_eq!(block.header.merkle_root, tx::merkle_root(&block.txs));
    }

    #[test]
    fn test_commit_coinstake_replaces_previous() {
        let mut tpl = template(true);
        let first = tpl.commit_coinstake(0x6000_0000, &coin(100));
        let second = tpl.commit_coinstake(0x6000_0010, &coin(200));

        assert_eq!(first.txs.len(), second.txs.len());
        assert_eq!(second.coinstake().unwrap().outputs[1].value, 200 + 5000);
    }

    #[test]
    fn test_signature_roundtrip() {
        let mut tpl = template(true);
        let mut block = tpl.commit_coinstake(0x6000_0000, &coin(100));
        assert!(block.signature().is_none());

        assert!(block.set_signature(vec![0xde, 0xad]));
        assert_eq!(block.signature(), Some(&[0xde, 0xad][..]));

        let mut pow = template(false);
        let proof = pow.get_proof(0, 0, 1, 1);
        let mut pow_block = pow.commit(proof);
        assert!(!pow_block.set_signature(vec![0x01]));
    }

    #[test]
    fn test_basic_builder_skips_policy_rejects() {
        use crate::chain::{ChainEntry, ChainError};
        use parking_lot::Mutex;

        struct FakeChain {
            view: Mutex<MapView>,
            tip: TipSnapshot,
        }

        impl CoinView for FakeChain {
            fn get_coins(&self, txid: &Hash256) -> Option<PrevTx> {
                self.view.lock().get_coins(txid)
            }
        }

        impl Chain for FakeChain {
            fn tip(&self) -> TipSnapshot {
                self.tip.clone()
            }
            fn add_block(&self, _block: Block) -> Result<Option<ChainEntry>, ChainError> {
                Ok(None)
            }
        }

        struct FixedMempool {
            txs: Vec<Transaction>,
        }

        impl MempoolSource for FixedMempool {
            fn pending(&self, _max: usize) -> Vec<Transaction> {
                self.txs.clone()
            }
        }

        let mut view = MapView::new();
        let funding = funding_tx(10_000);
        view.insert(funding.clone(), 500);

        let good = spending_tx(&funding, 9_000);
        let orphan = spending_tx(&funding_tx(123), 100);

        let chain = Arc::new(FakeChain {
            view: Mutex::new(view),
            tip: tip(),
        });
        let mempool = Arc::new(FixedMempool {
            txs: vec![good.clone(), orphan],
        });

        let builder = BasicTemplateBuilder::new(chain, 7, false).with_mempool(mempool);
        let tpl = builder.create_block(&tip(), &[0x51]).unwrap();

        assert_eq!(tpl.txs().len(), 2);
        assert_eq!(tpl.txs()[1], good);
        assert_eq!(tpl.fees(), 1_000);
    }
}
