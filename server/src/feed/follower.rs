use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ChainSource;
use crate::chain::{self, Hash32, HeaderIds};
use crate::contracts::ContractFormationCache;
use crate::error::Result;
use crate::tracker::HeaderTracker;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BATCH: u32 = 100;

/// Walks the node's best chain, delivering new headers to the tracker and
/// new transactions to the contract-formation cache.
pub struct ChainFollower {
    source: Arc<dyn ChainSource>,
    tracker: Arc<HeaderTracker>,
    contracts: Arc<ContractFormationCache>,
    poll_interval: Duration,
    max_batch: u32,
    start_height: Option<u32>,
    next_height: Option<u32>,
    last_delivered: Option<(u32, Hash32)>,
    in_sync: bool,
}

impl ChainFollower {
    pub fn new(
        source: Arc<dyn ChainSource>,
        tracker: Arc<HeaderTracker>,
        contracts: Arc<ContractFormationCache>,
    ) -> Self {
        Self {
            source,
            tracker,
            contracts,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
            start_height: None,
            next_height: None,
            last_delivered: None,
            in_sync: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_batch(mut self, max_batch: u32) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// First height to scan when the tracker has nothing to resume from.
    pub fn with_start_height(mut self, start_height: Option<u32>) -> Self {
        self.start_height = start_height;
        self
    }

    pub fn is_in_sync(&self) -> bool {
        self.in_sync
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_batch = self.max_batch,
            "chain follower started"
        );

        loop {
            if let Err(err) = self.poll_once(&shutdown).await {
                if shutdown.is_cancelled() {
                    break;
                }
                if err.is_transient() {
                    warn!(error = %err, "chain follower poll failed; retrying");
                } else {
                    error!(error = %err, "chain follower poll failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("chain follower stopped");
        Ok(())
    }

    /// Delivers at most one batch. Returns the number of headers delivered.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<usize> {
        let tip = self.source.tip_height().await?;
        let mut next = match self.next_height {
            Some(next) => next,
            None => self.resume_height(tip).await,
        };

        if let Some((height, hash)) = self.last_delivered {
            if height <= tip && self.source.hash_at(height).await? != hash {
                let rewind = (self.tracker.offset() as u32).saturating_sub(1);
                next = height.saturating_sub(rewind);
                warn!(height, rewind_to = next, "node chain changed; rewinding");
                self.in_sync = false;
            }
        }

        if next > tip {
            self.next_height = Some(next);
            self.mark_in_sync().await;
            return Ok(0);
        }

        let end = tip.min(next.saturating_add(self.max_batch - 1));
        let batch = self.source.headers(next, end).await?;
        let hashes: Vec<Hash32> = batch.headers.iter().map(|h| h.id()).collect();
        let delivered = hashes.len();

        self.tracker.handle_header_batch(cancel, batch).await;
        for hash in &hashes {
            self.observe_block(cancel, hash).await?;
        }

        if let Some(last) = hashes.last() {
            self.last_delivered = Some((end, *last));
        }
        self.next_height = Some(end + 1);
        debug!(from = next, to = end, tip, "delivered headers");

        if end == tip {
            self.mark_in_sync().await;
        }
        Ok(delivered)
    }

    async fn resume_height(&mut self, tip: u32) -> u32 {
        if let Some((hash, height)) = self.tracker.tip().await {
            self.last_delivered = Some((height, hash));
            return height + 1;
        }
        if let Some(start) = self.start_height {
            return start;
        }
        (tip + 1).saturating_sub(self.tracker.offset() as u32)
    }

    async fn observe_block(&self, cancel: &CancellationToken, hash: &Hash32) -> Result<()> {
        let block = self.source.block(hash).await?;
        for tx in &block.txdata {
            match self.contracts.observe(cancel, tx).await {
                Ok(0) => {}
                Ok(saved) => debug!(txid = %chain::txid(tx), saved, "stored contract formations"),
                Err(err) if cancel.is_cancelled() => return Err(err),
                Err(err) => {
                    error!(error = %err, txid = %chain::txid(tx), "failed to observe transaction")
                }
            }
        }
        Ok(())
    }

    async fn mark_in_sync(&mut self) {
        if !self.in_sync {
            self.in_sync = true;
            self.tracker.handle_in_sync().await;
        }
    }
}
