//! Mining jobs.
//!
//! A job is one live attempt at solving a template: it owns the nonce
//! counters, carries the one-shot `destroyed` and `committed` flags, and
//! produces the finished block on commit. Destruction is the engine's
//! only cancellation channel; every suspension point observes it.

use crate::chain::TipSnapshot;
use crate::template::{Block, BlockTemplate};
use crate::tx::Coin;
use crate::{StakingError, StakingResult};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use umbra_consensus::{Hash256, HEADER_SIZE};

/// One attempt at producing a block.
pub struct StakingJob {
    /// Tip snapshot the template was built from.
    tip: TipSnapshot,
    /// The template under search.
    template: Mutex<BlockTemplate>,
    /// Creation time (unix seconds, from the injected clock).
    start: u64,
    /// One-shot destruction flag.
    destroyed: AtomicBool,
    /// One-shot commit flag.
    committed: AtomicBool,
}

impl StakingJob {
    /// Wrap a template into a job. `start` is the clock reading at
    /// creation.
    pub fn new(template: BlockTemplate, tip: TipSnapshot, start: u64) -> Self {
        Self {
            tip,
            template: Mutex::new(template),
            start,
            destroyed: AtomicBool::new(false),
            committed: AtomicBool::new(false),
        }
    }

    /// The tip snapshot this job operates against.
    pub fn tip(&self) -> &TipSnapshot {
        &self.tip
    }

    /// Creation timestamp.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Hash of the block this job's template extends.
    pub fn prev_block(&self) -> Hash256 {
        self.template.lock().prev_block
    }

    /// Compact target of the attempt.
    pub fn bits(&self) -> u32 {
        self.template.lock().bits
    }

    /// Decoded target of the attempt.
    pub fn target(&self) -> BigUint {
        self.template.lock().target.clone()
    }

    /// Height of the block under construction.
    pub fn height(&self) -> u32 {
        self.template.lock().height
    }

    /// Whether the job has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Whether the job has committed.
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    /// Destroy the job if it is still live. Safe against racing
    /// invalidation paths; returns whether this call destroyed it.
    pub fn invalidate(&self) -> bool {
        !self.destroyed.swap(true, Ordering::SeqCst)
    }

    /// Destroy the job. Destroying twice is a programming error.
    pub fn destroy(&self) {
        assert!(self.invalidate(), "job destroyed twice");
    }

    /// Move the attempt's header timestamp.
    pub fn update_time(&self, time: u32) {
        self.template.lock().time = time;
    }

    /// Current attempt timestamp.
    pub fn time(&self) -> u32 {
        self.template.lock().time
    }

    /// Serialized header for the current attempt at the given timestamp
    /// and nonce.
    pub fn get_header(&self, time: u32, nonce: u32) -> [u8; HEADER_SIZE] {
        let mut template = self.template.lock();
        let root = template.merkle_root();
        template.get_header(root, time, nonce)
    }

    /// Advance the extra-nonce pair after an exhausted nonce sweep.
    pub fn update_nonce(&self) {
        self.template.lock().update_nonce();
    }

    /// Total hashes represented by the current counters and the given
    /// nonce: `(n1 * 2^32 + n2) * 2^32 + nonce`.
    pub fn hashes(&self, nonce: u32) -> u128 {
        let (n1, n2) = self.template.lock().extra_nonce();
        ((u128::from(n1) << 32) | u128::from(n2)) << 32 | u128::from(nonce)
    }

    /// Hashes per second since the job started, given the current clock
    /// reading.
    pub fn rate(&self, nonce: u32, now: u64) -> f64 {
        let elapsed = now.saturating_sub(self.start).max(1);
        self.hashes(nonce) as f64 / elapsed as f64
    }

    /// Commit the PoW attempt at the winning nonce.
    ///
    /// Returns `Ok(None)` when the job was destroyed first; errors when
    /// the job already committed.
    pub fn commit(&self, nonce: u32) -> StakingResult<Option<Block>> {
        if self.is_destroyed() {
            return Ok(None);
        }
        if self.committed.swap(true, Ordering::SeqCst) {
            return Err(StakingError::AlreadyCommitted);
        }

        let mut template = self.template.lock();
        let (n1, n2) = template.extra_nonce();
        let time = template.time;
        let proof = template.get_proof(n1, n2, time, nonce);
        Ok(Some(template.commit(proof)))
    }

    /// Commit the PoS attempt with the successful kernel coin.
    ///
    /// Returns the unsigned block; the stake searcher signs the
    /// coinstake and the block. `Ok(None)` when destroyed first.
    pub fn commit_coinstake(&self, n_time: u32, coin: &Coin) -> StakingResult<Option<Block>> {
        if self.is_destroyed() {
            return Ok(None);
        }
        if self.committed.swap(true, Ordering::SeqCst) {
            return Err(StakingError::AlreadyCommitted);
        }

        Ok(Some(self.template.lock().commit_coinstake(n_time, coin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::OutPoint;

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

    fn job(pos: bool) -> StakingJob {
        let template =
            BlockTemplate::new(7, &tip(), pos, Vec::new(), vec![0x51], 5000).unwrap();
        StakingJob::new(template, tip(), 1_700_000_000)
    }

    fn coin() -> Coin {
        Coin {
            out_point: OutPoint {
                txid: Hash256([0x55; 32]),
                index: 0,
            },
            value: 100,
            height: 100,
            time: 900,
            script_pubkey: vec![0x53],
        }
    }

    #[test]
    fn test_single_commit() {
        let job = job(false);
        let block = job.commit(42).unwrap();
        assert!(block.is_some());
        assert!(job.is_committed());

        // A second commit raises.
        assert!(matches!(
            job.commit(43),
            Err(StakingError::AlreadyCommitted)
        ));
    }

    #[test]
    fn test_destroyed_commit_yields_no_block() {
        let job = job(false);
        job.destroy();
        assert!(job.commit(42).unwrap().is_none());
        assert!(!job.is_committed());
    }

    #[test]
    fn test_destroyed_coinstake_commit_yields_no_block() {
        let job = job(true);
        job.destroy();
        assert!(job.commit_coinstake(0x6000_0000, &coin()).unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = "job destroyed twice")]
    fn test_double_destroy_panics() {
        let job = job(false);
        job.destroy();
        job.destroy();
    }

    #[test]
    fn test_hashes_formula() {
        let job = job(false);
        assert_eq!(job.hashes(5), 5);

        job.update_nonce();
        assert_eq!(job.hashes(0), 1u128 << 32);
        assert_eq!(job.hashes(7), (1u128 << 32) + 7);
    }

    #[test]
    fn test_rate_is_finite() {
        let job = job(false);
        job.update_nonce();
        // Zero elapsed time is clamped, never a division by zero.
        let rate = job.rate(100, job.start());
        assert!(rate.is_finite());
        assert!(rate > 0.0);
    }

    #[test]
    fn test_header_varies_with_nonce_and_time() {
        let job = job(false);
        let a = job.get_header(100, 1);
        let b = job.get_header(100, 2);
        let c = job.get_header(116, 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        // Only the nonce field differs between a and b.
        assert_eq!(a[..76], b[..76]);
    }

    #[test]
    fn test_commit_uses_current_time() {
        let job = job(false);
        job.update_time(0x6000_1234);
        let block = job.commit(9).unwrap().unwrap();
        assert_eq!(block.header.time, 0x6000_1234);
        assert_eq!(block.header.nonce, 9);
    }
}
