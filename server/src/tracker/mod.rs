//! Header tracker.
//!
//! Keeps the last `offset` block hashes of the best chain and answers one
//! question: which block hash is deep enough behind the tip to sign against.
//! Batches either extend the window, reorganize it from an earlier hash, or
//! fail to link at all, in which case the window is rebuilt from the feed.
//! A reorg deeper than `offset` blocks cannot be followed and always ends in
//! a rebuild.

pub mod snapshot;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{BlockHeader, Hash32, HeaderIds};
use crate::error::{with_cancel, OracleError, Result};
use crate::feed::{HeaderBatch, HeaderFeed};

pub const DEFAULT_OFFSET: usize = 5;

/// Read side of the tracker, as the attestation engine sees it.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// A block hash `offset - 1` blocks behind the tip, and its height.
    async fn recent_sig_hash(&self) -> Result<(Hash32, u32)>;
}

/// Consecutive block hashes, oldest first; `height` is the height of the
/// newest one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderWindow {
    hashes: Vec<Hash32>,
    height: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Applied {
    linked: usize,
    dropped: usize,
}

impl HeaderWindow {
    /// Builds a window from a contiguous run of headers.
    pub fn from_batch(batch: &HeaderBatch) -> Result<Self> {
        let mut hashes = Vec::with_capacity(batch.headers.len());
        for header in &batch.headers {
            if let Some(prev) = hashes.last() {
                if header.parent_id() != *prev {
                    return Err(OracleError::Malformed {
                        what: "header batch",
                        reason: format!("{} does not follow {prev}", header.id()),
                    });
                }
            }
            hashes.push(header.id());
        }

        Ok(Self {
            height: batch.end_height().unwrap_or(0),
            hashes,
        })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tip(&self) -> Option<(Hash32, u32)> {
        self.hashes.last().map(|hash| (*hash, self.height))
    }

    fn apply(&mut self, headers: &[BlockHeader]) -> Applied {
        let mut applied = Applied::default();

        for header in headers {
            let hash = header.id();

            if self.hashes.last() == Some(&header.parent_id()) {
                self.hashes.push(hash);
                self.height += 1;
                applied.linked += 1;
                continue;
            }

            let Some(position) = self.hashes.iter().position(|h| *h == header.parent_id()) else {
                debug!(hash = %hash, "header does not link to window");
                continue;
            };

            let dropped = self.hashes.len() - (position + 1);
            info!(dropped, fork = %header.parent_id(), "reorganizing header window");
            self.hashes.truncate(position + 1);
            self.height = self.height.saturating_sub(dropped as u32);
            self.hashes.push(hash);
            self.height += 1;
            applied.linked += 1;
            applied.dropped += dropped;
        }

        applied
    }

    fn trim(&mut self, offset: usize) {
        if self.hashes.len() > offset {
            let excess = self.hashes.len() - offset;
            self.hashes.drain(..excess);
        }
    }

    fn clear(&mut self) {
        self.hashes.clear();
        self.height = 0;
    }
}

pub struct HeaderTracker {
    offset: usize,
    feed: Arc<dyn HeaderFeed>,
    window: Mutex<HeaderWindow>,
}

impl HeaderTracker {
    pub fn new(offset: usize, feed: Arc<dyn HeaderFeed>) -> Self {
        Self {
            offset: offset.max(1),
            feed,
            window: Mutex::new(HeaderWindow::default()),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Newest tracked hash and its height.
    pub async fn tip(&self) -> Option<(Hash32, u32)> {
        self.window.lock().await.tip()
    }

    pub async fn len(&self) -> usize {
        self.window.lock().await.len()
    }

    /// Applies a batch of headers from the feed, oldest first.
    pub async fn handle_header_batch(&self, cancel: &CancellationToken, batch: HeaderBatch) {
        let Some(end_height) = batch.end_height() else {
            return;
        };
        if let Some(last) = batch.headers.last() {
            info!(
                count = batch.headers.len(),
                height = end_height,
                hash = %last.id(),
                "new headers"
            );
        }

        let reinitialize = {
            let mut window = self.window.lock().await;
            let applied = window.apply(&batch.headers);

            if applied.linked == 0 {
                warn!(
                    start_height = batch.start_height,
                    "headers do not link to the window; reinitializing"
                );
                window.clear();
                true
            } else {
                window.trim(self.offset);
                debug!(
                    linked = applied.linked,
                    dropped = applied.dropped,
                    height = window.height,
                    "applied headers"
                );
                if window.len() < self.offset {
                    info!(have = window.len(), need = self.offset, "header window short; reinitializing");
                    window.clear();
                    true
                } else {
                    false
                }
            }
        };

        if reinitialize {
            if let Err(err) = self.reinitialize(cancel).await {
                error!(error = %err, "failed to reinitialize header window");
            }
        }
    }

    /// Replaces the window with the feed's most recent `offset` headers. On
    /// failure the window is left empty.
    pub async fn reinitialize(&self, cancel: &CancellationToken) -> Result<()> {
        let batch = with_cancel(cancel, "request recent headers", async {
            Ok(self.feed.request_recent_headers(self.offset).await?)
        })
        .await?;

        let mut fresh = HeaderWindow::from_batch(&batch)?;
        fresh.trim(self.offset);

        let mut window = self.window.lock().await;
        *window = fresh;
        match window.tip() {
            Some((hash, height)) => info!(count = window.len(), height, hash = %hash, "header window initialized"),
            None => warn!("feed returned no headers"),
        }
        Ok(())
    }

    /// Called once the feed has caught up with the node.
    pub async fn handle_in_sync(&self) {
        let window = self.window.lock().await;
        if window.is_empty() {
            error!("header feed in sync but no headers tracked");
            return;
        }

        info!(count = window.len(), height = window.height, "header feed in sync");
        for (depth, hash) in window.hashes.iter().rev().enumerate() {
            info!(
                height = window.height.saturating_sub(depth as u32),
                hash = %hash,
                "tracked header"
            );
        }
    }

    pub async fn recent_sig_hash(&self) -> Result<(Hash32, u32)> {
        let window = self.window.lock().await;
        if window.len() < self.offset {
            return Err(OracleError::InsufficientHeaders {
                have: window.len(),
                need: self.offset,
            });
        }

        let index = window.len() - self.offset;
        Ok((
            window.hashes[index],
            window.height.saturating_sub(self.offset as u32 - 1),
        ))
    }

    pub async fn load_snapshot(&self, path: &Path) -> Result<()> {
        let Some(mut loaded) = snapshot::read(path).await? else {
            info!(path = %path.display(), "no header snapshot; starting empty");
            return Ok(());
        };
        loaded.trim(self.offset);

        let mut window = self.window.lock().await;
        *window = loaded;
        info!(count = window.len(), height = window.height, "loaded header snapshot");
        Ok(())
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let window = self.window.lock().await.clone();
        snapshot::write(path, &window).await?;
        info!(count = window.len(), height = window.height, "saved header snapshot");
        Ok(())
    }
}

#[async_trait]
impl HeaderSource for HeaderTracker {
    async fn recent_sig_hash(&self) -> Result<(Hash32, u32)> {
        HeaderTracker::recent_sig_hash(self).await
    }
}
