//! The staker supervisor.
//!
//! A long-running loop that builds a job on top of the current tip,
//! drives the stake (or nonce) searcher, submits the result to the
//! chain, and reacts to tip and mempool events by destroying the active
//! job. The loop is single-threaded cooperative; the optional worker
//! pool for PoW slices is the only parallelism.
//!
//! Embedders call [`Staker::notify_tip`] and [`Staker::notify_entry`]
//! from their chain and mempool event handlers; the supervisor observes
//! the resulting job destruction at its next suspension point.

use crate::chain::{Chain, ChainError, TipSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::job::StakingJob;
use crate::nonce::{NonceSearcher, WorkerPool};
use crate::stake::StakeSearcher;
use crate::template::{Block, TemplateBuilder};
use crate::wallet::StakingWallet;
use crate::{StakingError, StakingResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use umbra_consensus::params::POW_SCAN_INTERVAL;

/// Jobs older than this are destroyed when a new mempool entry arrives,
/// so fresh transactions get picked up.
const JOB_REFRESH_SECS: u64 = 10;

/// Event channel capacity.
const EVENT_CAPACITY: usize = 64;

/// Staker configuration.
#[derive(Debug, Clone)]
pub struct StakerConfig {
    /// Locking script receiving block rewards.
    pub reward_script: Vec<u8>,
    /// Drive the stake searcher; false selects the PoW nonce searcher.
    pub stake: bool,
    /// Worker threads for the PoW pool (0 = auto-detect).
    pub threads: usize,
    /// Offload PoW slices to a worker pool.
    pub use_worker_pool: bool,
    /// Derive the kernel target from the block's bits instead of the
    /// coin's value.
    pub kernel_target_from_bits: bool,
    /// Clock poll interval while waiting for the next stake grid slot.
    pub poll_interval: Duration,
    /// Nonce slice width for the PoW scan.
    pub pow_scan_interval: u64,
}

impl Default for StakerConfig {
    fn default() -> Self {
        Self {
            reward_script: Vec::new(),
            stake: true,
            threads: 0,
            use_worker_pool: false,
            kernel_target_from_bits: false,
            poll_interval: Duration::from_millis(250),
            pow_scan_interval: u64::from(POW_SCAN_INTERVAL),
        }
    }
}

/// Events emitted by the supervisor.
#[derive(Debug, Clone)]
pub enum StakerEvent {
    /// A block was accepted by the chain.
    Block {
        /// The accepted block.
        block: Arc<Block>,
        /// Height it was accepted at.
        height: u32,
    },
    /// Periodic PoW search progress.
    Status {
        /// Height under search.
        height: u32,
        /// Last nonce tried.
        nonce: u32,
        /// Total hashes represented by the attempt counters.
        hashes: u128,
        /// Hashes per second since the job started.
        rate: f64,
    },
    /// The loop hit an unexpected error and stopped.
    Error {
        /// Error description.
        message: String,
    },
}

/// The staker supervisor.
pub struct Staker {
    config: StakerConfig,
    chain: Arc<dyn Chain>,
    wallet: Arc<dyn StakingWallet>,
    builder: Arc<dyn TemplateBuilder>,
    clock: Arc<dyn Clock>,
    opened: AtomicBool,
    running: AtomicBool,
    stopping: AtomicBool,
    current_job: RwLock<Option<Arc<StakingJob>>>,
    stop_lock: tokio::sync::Mutex<()>,
    stopped_tx: Mutex<Option<oneshot::Sender<()>>>,
    stopped_rx: Mutex<Option<oneshot::Receiver<()>>>,
    events: broadcast::Sender<StakerEvent>,
}

impl Staker {
    /// Create a staker over the given collaborators, using the system
    /// clock.
    pub fn new(
        config: StakerConfig,
        chain: Arc<dyn Chain>,
        wallet: Arc<dyn StakingWallet>,
        builder: Arc<dyn TemplateBuilder>,
    ) -> Self {
        Self::with_clock(config, chain, wallet, builder, Arc::new(SystemClock))
    }

    /// Create a staker with an injected clock.
    pub fn with_clock(
        config: StakerConfig,
        chain: Arc<dyn Chain>,
        wallet: Arc<dyn StakingWallet>,
        builder: Arc<dyn TemplateBuilder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            chain,
            wallet,
            builder,
            clock,
            opened: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            current_job: RwLock::new(None),
            stop_lock: tokio::sync::Mutex::new(()),
            stopped_tx: Mutex::new(None),
            stopped_rx: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to supervisor events.
    pub fn subscribe(&self) -> broadcast::Receiver<StakerEvent> {
        self.events.subscribe()
    }

    /// Mark the staker open. Lifecycle bookkeeping for embedders; the
    /// loop itself is controlled by `start`/`stop`.
    pub fn open(&self) {
        self.opened.store(true, Ordering::SeqCst);
        debug!("Staker opened");
    }

    /// Stop the loop if running and mark the staker closed.
    pub async fn close(&self) -> StakingResult<()> {
        if self.is_running() {
            self.stop().await?;
        }
        self.opened.store(false, Ordering::SeqCst);
        debug!("Staker closed");
        Ok(())
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a stop is in flight.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// The currently active job, if any.
    pub fn current_job(&self) -> Option<Arc<StakingJob>> {
        self.current_job.read().clone()
    }

    /// Start the supervisor loop.
    pub fn start(self: &Arc<Self>) -> StakingResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StakingError::AlreadyRunning);
        }
        self.stopping.store(false, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        *self.stopped_tx.lock() = Some(tx);
        *self.stopped_rx.lock() = Some(rx);

        let staker = Arc::clone(self);
        tokio::spawn(async move { staker.run().await });

        info!(stake = self.config.stake, "Staker started");
        Ok(())
    }

    /// Stop the supervisor loop. At most one stop may be in flight.
    pub async fn stop(&self) -> StakingResult<()> {
        if !self.is_running() {
            return Err(StakingError::NotRunning);
        }
        let _guard = self
            .stop_lock
            .try_lock()
            .map_err(|_| StakingError::AlreadyStopping)?;

        self.stopping.store(true, Ordering::SeqCst);
        if let Some(job) = self.current_job.write().take() {
            job.invalidate();
        }

        let rx = self.stopped_rx.lock().take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }

        self.stopping.store(false, Ordering::SeqCst);
        info!("Staker stopped");
        Ok(())
    }

    /// Build a job on top of the given tip (or the chain's current tip)
    /// and make it the active job.
    pub fn create_job(
        &self,
        tip: Option<TipSnapshot>,
        reward_script: Option<&[u8]>,
    ) -> StakingResult<Arc<StakingJob>> {
        let job = self.make_job(tip, reward_script)?;
        *self.current_job.write() = Some(Arc::clone(&job));
        Ok(job)
    }

    /// One-shot convenience: mine a PoW block on top of the given tip
    /// and return it without submitting.
    pub async fn mine_block(
        &self,
        tip: Option<TipSnapshot>,
        reward_script: Option<&[u8]>,
    ) -> StakingResult<Block> {
        let job = self.make_job(tip, reward_script)?;
        let searcher =
            NonceSearcher::new(Arc::clone(&self.clock), self.events.clone())
                .with_interval(self.config.pow_scan_interval);

        match searcher.search(&job, None).await? {
            Some(block) => Ok(block),
            None => Err(StakingError::JobDestroyed),
        }
    }

    /// Chain tip handler. Destroys the active job when the new tip is a
    /// sibling of the block under construction, i.e. its parent equals
    /// the job's parent.
    pub fn notify_tip(&self, tip: &TipSnapshot) {
        let guard = self.current_job.read();
        if let Some(job) = guard.as_ref() {
            if !job.is_destroyed() && job.prev_block() == tip.prev_block {
                debug!(prev = %tip.prev_block, "Sibling tip, destroying job");
                job.invalidate();
            }
        }
    }

    /// Mempool entry handler. Destroys jobs old enough to be missing
    /// fresh transactions.
    pub fn notify_entry(&self) {
        let guard = self.current_job.read();
        if let Some(job) = guard.as_ref() {
            let age = self.clock.now().saturating_sub(job.start());
            if !job.is_destroyed() && age > JOB_REFRESH_SECS {
                debug!(age, "Stale job on mempool entry, destroying");
                job.invalidate();
            }
        }
    }

    fn make_job(
        &self,
        tip: Option<TipSnapshot>,
        reward_script: Option<&[u8]>,
    ) -> StakingResult<Arc<StakingJob>> {
        let tip = tip.unwrap_or_else(|| self.chain.tip());
        let script = reward_script.unwrap_or(&self.config.reward_script);
        let template = self.builder.create_block(&tip, script)?;
        Ok(Arc::new(StakingJob::new(
            template,
            tip,
            self.clock.now(),
        )))
    }

    /// The supervisor loop.
    async fn run(self: Arc<Self>) {
        let mut pool = if !self.config.stake && self.config.use_worker_pool {
            Some(WorkerPool::new(self.config.threads))
        } else {
            None
        };

        let nonce_searcher =
            NonceSearcher::new(Arc::clone(&self.clock), self.events.clone())
                .with_interval(self.config.pow_scan_interval);
        let stake_searcher = StakeSearcher::new(Arc::clone(&self.clock))
            .with_poll_interval(self.config.poll_interval)
            .with_target_from_bits(self.config.kernel_target_from_bits);

        loop {
            if self.is_stopping() {
                break;
            }

            let job = match self.create_job(None, None) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "Failed to create job");
                    let _ = self.events.send(StakerEvent::Error {
                        message: e.to_string(),
                    });
                    break;
                }
            };

            // A stop may have raced job creation; never start searching
            // a doomed attempt.
            if self.is_stopping() {
                break;
            }

            let searched = if self.config.stake {
                stake_searcher
                    .search(&job, self.chain.as_ref(), self.wallet.as_ref())
                    .await
            } else {
                nonce_searcher.search(&job, pool.as_mut()).await
            };

            let block = match searched {
                Ok(Some(block)) => block,
                Ok(None) => {
                    debug!("Job destroyed mid-search");
                    continue;
                }
                Err(e) => {
                    if !self.is_stopping() {
                        error!(error = %e, "Search failed");
                        let _ = self.events.send(StakerEvent::Error {
                            message: e.to_string(),
                        });
                    }
                    break;
                }
            };

            // Keep the raw form around: a mined block is never dropped
            // silently.
            let raw = hex::encode(block.serialize());
            let block = Arc::new(block);

            match self.chain.add_block((*block).clone()) {
                Ok(Some(entry)) => {
                    info!(height = entry.height, hash = %entry.hash, "Block accepted");
                    let _ = self.events.send(StakerEvent::Block {
                        block,
                        height: entry.height,
                    });
                }
                Ok(None) => {
                    warn!(raw = %raw, "bad-prevblk (race)");
                    continue;
                }
                Err(ChainError::Verify(reason)) => {
                    warn!(reason = %reason, raw = %raw, "Mined block failed verification");
                    continue;
                }
                Err(e) => {
                    if !self.is_stopping() {
                        error!(error = %e, "Chain submission failed");
                        let _ = self.events.send(StakerEvent::Error {
                            message: e.to_string(),
                        });
                    }
                    break;
                }
            }
        }

        if let Some(pool) = pool.take() {
            pool.shutdown();
        }
        *self.current_job.write() = None;
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.stopped_tx.lock().take() {
            let _ = tx.send(());
        }
        debug!("Staker loop exited");
    }
}
