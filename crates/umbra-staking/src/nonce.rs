//! CPU proof-of-work nonce search.
//!
//! The 32-bit nonce space is searched in fixed-width slices, ascending.
//! Within a slice the lowest winning nonce is returned. Hashing runs
//! either inline (yielding between slices) or on a pool of worker
//! threads; workers communicate with the searcher via channels.

use crate::clock::Clock;
use crate::job::StakingJob;
use crate::staker::StakerEvent;
use crate::template::Block;
use crate::{StakingError, StakingResult};
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};
use umbra_consensus::params::{NONCE_SPACE, POW_SCAN_INTERVAL};
use umbra_consensus::{pow_hash_raw, HEADER_SIZE, NONCE_OFFSET};

/// Search one nonce slice `[min, max)` for a header whose version-keyed
/// hash meets the target.
///
/// Returns the lowest winning nonce. Pure and synchronous; safe to call
/// from a worker thread. Bounds are `u64` so `max == 2^32` terminates
/// the final slice without overflowing.
pub fn mine(header: &[u8; HEADER_SIZE], target: &BigUint, min: u64, max: u64) -> Option<u32> {
    let mut buf = *header;
    let mut nonce = min;
    while nonce < max {
        buf[NONCE_OFFSET..].copy_from_slice(&(nonce as u32).to_le_bytes());
        // The scrypt parameters are fixed and valid; a hashing error
        // aborts the slice as a miss.
        match pow_hash_raw(&buf) {
            Ok(hash) if hash.to_biguint() <= *target => return Some(nonce as u32),
            Ok(_) => {}
            Err(_) => return None,
        }
        nonce += 1;
    }
    None
}

/// One slice of work for the pool.
#[derive(Clone, Debug)]
pub struct MineTask {
    /// Serialized header; the nonce field is overwritten per attempt.
    pub header: [u8; HEADER_SIZE],
    /// Decoded difficulty target.
    pub target: BigUint,
    /// Slice start, inclusive.
    pub min: u64,
    /// Slice end, exclusive.
    pub max: u64,
}

/// Result of one slice.
#[derive(Debug)]
pub struct MineOutcome {
    /// Slice start this outcome belongs to.
    pub min: u64,
    /// Winning nonce, if any.
    pub found: Option<u32>,
    /// Hashes computed in the slice.
    pub hashes: u64,
}

/// A mining worker running in its own thread.
struct MiningWorker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    hash_count: Arc<AtomicU64>,
}

impl MiningWorker {
    fn spawn(
        id: usize,
        task_rx: Arc<Mutex<std_mpsc::Receiver<MineTask>>>,
        outcome_tx: mpsc::Sender<MineOutcome>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let hash_count = Arc::new(AtomicU64::new(0));

        let running_clone = Arc::clone(&running);
        let hash_count_clone = Arc::clone(&hash_count);

        let handle = thread::Builder::new()
            .name(format!("umbra-pow-{id}"))
            .spawn(move || {
                Self::worker_loop(id, task_rx, outcome_tx, running_clone, hash_count_clone);
            })
            .expect("Failed to spawn mining worker thread");

        debug!(worker_id = id, "Mining worker spawned");

        Self {
            id,
            handle: Some(handle),
            running,
            hash_count,
        }
    }

    fn worker_loop(
        id: usize,
        task_rx: Arc<Mutex<std_mpsc::Receiver<MineTask>>>,
        outcome_tx: mpsc::Sender<MineOutcome>,
        running: Arc<AtomicBool>,
        hash_count: Arc<AtomicU64>,
    ) {
        while running.load(Ordering::Relaxed) {
            // Hold the lock only for the receive so idle workers share
            // the queue fairly.
            let task = {
                let rx = task_rx.lock();
                rx.recv_timeout(Duration::from_millis(100))
            };

            match task {
                Ok(task) => {
                    let found = mine(&task.header, &task.target, task.min, task.max);
                    let hashes = match found {
                        Some(nonce) => u64::from(nonce) - task.min + 1,
                        None => task.max - task.min,
                    };
                    hash_count.fetch_add(hashes, Ordering::Relaxed);

                    if let Some(nonce) = found {
                        trace!(worker_id = id, nonce, "Slice hit");
                    }

                    let outcome = MineOutcome {
                        min: task.min,
                        found,
                        hashes,
                    };
                    if outcome_tx.blocking_send(outcome).is_err() {
                        warn!(worker_id = id, "Outcome channel closed, worker exiting");
                        return;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        trace!(worker_id = id, "Worker shutting down");
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn join(mut self) -> thread::Result<()> {
        self.stop();
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A pool of mining workers consuming slices from a shared queue.
pub struct WorkerPool {
    workers: Vec<MiningWorker>,
    task_tx: std_mpsc::Sender<MineTask>,
    outcome_rx: mpsc::Receiver<MineOutcome>,
}

impl WorkerPool {
    /// Create a pool with the given number of workers (0 auto-detects
    /// from the CPU count).
    pub fn new(num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            num_cpus::get().max(1)
        } else {
            num_workers
        };

        let (task_tx, task_rx) = std_mpsc::channel();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (outcome_tx, outcome_rx) = mpsc::channel(num_workers * 2);

        let workers = (0..num_workers)
            .map(|id| MiningWorker::spawn(id, Arc::clone(&task_rx), outcome_tx.clone()))
            .collect();

        debug!(num_workers, "Worker pool created");

        Self {
            workers,
            task_tx,
            outcome_rx,
        }
    }

    /// Offload one slice and await its outcome.
    pub async fn mine(&mut self, task: MineTask) -> StakingResult<MineOutcome> {
        self.task_tx
            .send(task)
            .map_err(|_| StakingError::Other("worker pool task channel closed".into()))?;
        self.outcome_rx
            .recv()
            .await
            .ok_or_else(|| StakingError::Other("worker pool stopped".into()))
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Total hashes computed across all workers.
    pub fn total_hash_count(&self) -> u64 {
        self.workers.iter().map(|w| w.hash_count.load(Ordering::Relaxed)).sum()
    }

    /// Shut the pool down and join all workers.
    pub fn shutdown(self) {
        for worker in &self.workers {
            worker.stop();
        }
        for worker in self.workers {
            let id = worker.id;
            if worker.join().is_err() {
                warn!(worker_id = id, "Worker thread panicked");
            }
        }
        debug!("Worker pool shutdown complete");
    }
}

/// Slice-driven nonce searcher.
pub struct NonceSearcher {
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<StakerEvent>,
    interval: u64,
    space: u64,
}

impl NonceSearcher {
    /// Create a searcher over the full 32-bit nonce space.
    pub fn new(clock: Arc<dyn Clock>, events: broadcast::Sender<StakerEvent>) -> Self {
        Self {
            clock,
            events,
            interval: u64::from(POW_SCAN_INTERVAL),
            space: NONCE_SPACE,
        }
    }

    /// Override the slice width.
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.clamp(1, NONCE_SPACE);
        self
    }

    /// Search until a block is found or the job is destroyed.
    ///
    /// Each exhausted sweep of the nonce space advances the extra-nonce
    /// pair and restarts with a fresh timestamp.
    pub async fn search(
        &self,
        job: &StakingJob,
        mut pool: Option<&mut WorkerPool>,
    ) -> StakingResult<Option<Block>> {
        let target = job.target();

        loop {
            if job.is_destroyed() {
                return Ok(None);
            }

            job.update_time(self.clock.now() as u32);

            match self.sweep(job, &target, pool.as_deref_mut()).await? {
                Some(nonce) => {
                    info!(
                        height = job.height(),
                        nonce,
                        hashes = %job.hashes(nonce),
                        "Found proof-of-work nonce"
                    );
                    return job.commit(nonce);
                }
                None => {
                    if job.is_destroyed() {
                        return Ok(None);
                    }
                    debug!(height = job.height(), "Nonce space exhausted, rolling extra-nonce");
                    job.update_nonce();
                }
            }
        }
    }

    /// One full pass over the nonce space. Returns the winning nonce or
    /// `None` when every slice missed or the job was destroyed.
    async fn sweep(
        &self,
        job: &StakingJob,
        target: &BigUint,
        mut pool: Option<&mut WorkerPool>,
    ) -> StakingResult<Option<u32>> {
        let time = job.time();
        let mut min = 0u64;

        while min < self.space {
            if job.is_destroyed() {
                return Ok(None);
            }

            let max = (min + self.interval).min(self.space);
            let header = job.get_header(time, 0);

            let found = match pool.as_deref_mut() {
                Some(pool) => {
                    pool.mine(MineTask {
                        header,
                        target: target.clone(),
                        min,
                        max,
                    })
                    .await?
                    .found
                }
                None => {
                    let found = mine(&header, target, min, max);
                    tokio::task::yield_now().await;
                    found
                }
            };

            if let Some(nonce) = found {
                return Ok(Some(nonce));
            }

            let last = (max - 1) as u32;
            let _ = self.events.send(StakerEvent::Status {
                height: job.height(),
                nonce: last,
                hashes: job.hashes(last),
                rate: job.rate(last, self.clock.now()),
            });
            min = max;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TipSnapshot;
    use crate::clock::ManualClock;
    use crate::template::BlockTemplate;
    use num_bigint::BigUint;
    use num_traits::Zero;
    use umbra_consensus::Hash256;

    fn tip(bits: u32) -> TipSnapshot {
        TipSnapshot {
            height: 1000,
            hash: Hash256([0x10; 32]),
            prev_block: Hash256([0x09; 32]),
            time: 0x6000_0000,
            bits,
            stake_modifier: Hash256([0xAA; 32]),
        }
    }

    fn job(bits: u32) -> Arc<StakingJob> {
        let template =
            BlockTemplate::new(7, &tip(bits), false, Vec::new(), vec![0x51], 5000).unwrap();
        Arc::new(StakingJob::new(template, tip(bits), 1_700_000_000))
    }

    fn searcher(interval: u64, space: u64) -> NonceSearcher {
        let (events, _) = broadcast::channel(16);
        NonceSearcher {
            clock: Arc::new(ManualClock::new(1_700_000_000)),
            events,
            interval,
            space,
        }
    }

    fn easy_target() -> BigUint {
        // Every sha256d output passes.
        (BigUint::from(1u32) << 256) - 1u32
    }

    #[test]
    fn test_mine_returns_lowest_nonce() {
        let job = job(0x2100ffff);
        let header = job.get_header(0x6000_0001, 0);
        assert_eq!(mine(&header, &easy_target(), 0, 16), Some(0));
        assert_eq!(mine(&header, &easy_target(), 5, 16), Some(5));
    }

    #[test]
    fn test_mine_impossible_target_misses() {
        let job = job(0x2100ffff);
        let header = job.get_header(0x6000_0001, 0);
        assert_eq!(mine(&header, &BigUint::zero(), 0, 64), None);
    }

    #[test]
    fn test_mine_terminates_at_nonce_space_end() {
        // The final slice reaches nonce 2^32 - 1 and stops without
        // overflowing.
        let job = job(0x2100ffff);
        let header = job.get_header(0x6000_0001, 0);
        assert_eq!(mine(&header, &BigUint::zero(), NONCE_SPACE - 16, NONCE_SPACE), None);
    }

    #[tokio::test]
    async fn test_sweep_finds_in_first_slice() {
        let job = job(0x2100ffff);
        let searcher = searcher(16, 64);
        let found = searcher
            .sweep(&job, &easy_target(), None)
            .await
            .unwrap();
        assert_eq!(found, Some(0));
    }

    #[tokio::test]
    async fn test_sweep_exhausts_and_misses() {
        let job = job(0x2100ffff);
        let searcher = searcher(16, 64);
        let found = searcher.sweep(&job, &BigUint::zero(), None).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_search_commits_found_block() {
        let job = job(0x2100ffff);
        let searcher = searcher(16, 64);
        let block = searcher.search(&job, None).await.unwrap().unwrap();
        assert!(job.is_committed());
        assert!(block.hash().unwrap().to_biguint() <= job.target());
    }

    #[tokio::test]
    async fn test_search_updates_nonce_on_exhaustion_until_destroyed() {
        // A target of zero misses every slice: each sweep must roll the
        // extra-nonce and the search must stop once the job is destroyed.
        let job = {
            let mut template =
                BlockTemplate::new(7, &tip(0x2100ffff), false, Vec::new(), vec![0x51], 5000)
                    .unwrap();
            template.target = BigUint::zero();
            Arc::new(StakingJob::new(template, tip(0x2100ffff), 1_700_000_000))
        };
        let searcher = searcher(16, 64);

        let job_clone = Arc::clone(&job);
        let handle = tokio::spawn(async move { searcher.search(&job_clone, None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        job.destroy();

        let result = handle.await.unwrap().unwrap();
        assert!(result.is_none());
        assert!(!job.is_committed());
        // At least one full sweep completed, so the extra-nonce moved.
        assert!(job.hashes(0) > 0);
    }

    #[tokio::test]
    async fn test_worker_pool_mines_slice() {
        let job = job(0x2100ffff);
        let header = job.get_header(0x6000_0001, 0);
        let mut pool = WorkerPool::new(2);
        assert_eq!(pool.num_workers(), 2);

        let outcome = pool
            .mine(MineTask {
                header,
                target: easy_target(),
                min: 0,
                max: 16,
            })
            .await
            .unwrap();
        assert_eq!(outcome.found, Some(0));
        assert_eq!(outcome.hashes, 1);
        assert!(pool.total_hash_count() >= 1);

        pool.shutdown();
    }

    #[tokio::test]
    async fn test_worker_pool_all_miss_terminates() {
        let job = job(0x2100ffff);
        let searcher = searcher(16, 64);
        let mut pool = WorkerPool::new(1);

        let found = searcher
            .sweep(&job, &BigUint::zero(), Some(&mut pool))
            .await
            .unwrap();
        assert_eq!(found, None);
        // Four slices of sixteen nonces each were ground through.
        assert_eq!(pool.total_hash_count(), 64);

        pool.shutdown();
    }

    #[tokio::test]
    async fn test_search_with_pool_finds_block() {
        let job = job(0x2100ffff);
        let searcher = searcher(16, 64);
        let mut pool = WorkerPool::new(2);

        let block = searcher
            .search(&job, Some(&mut pool))
            .await
            .unwrap()
            .unwrap();
        assert!(job.is_committed());
        assert!(block.hash().unwrap().to_biguint() <= job.target());

        pool.shutdown();
    }
}
