//! Sources of chain data: the header feed the tracker reinitializes from,
//! the node RPC client, and the follower loop that turns the node's chain
//! into header batches and observed transactions.

mod follower;
mod memory;
mod rpc;

use async_trait::async_trait;

use crate::chain::{Block, BlockHeader, ChainError, Hash32};

pub use follower::{ChainFollower, DEFAULT_MAX_BATCH, DEFAULT_POLL_INTERVAL};
pub use memory::MemoryFeed;
pub use rpc::RpcFeed;

/// Errors raised by a header feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc {method} failed ({code}): {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("rpc {0} returned no result")]
    EmptyResult(&'static str),

    #[error("invalid chain data: {0}")]
    Chain(#[from] ChainError),

    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Consecutive headers starting at `start_height`, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderBatch {
    pub start_height: u32,
    pub headers: Vec<BlockHeader>,
}

impl HeaderBatch {
    pub fn new(start_height: u32, headers: Vec<BlockHeader>) -> Self {
        Self {
            start_height,
            headers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Height of the newest header, if any.
    pub fn end_height(&self) -> Option<u32> {
        let len = u32::try_from(self.headers.len()).ok()?;
        len.checked_sub(1).map(|last| self.start_height + last)
    }
}

#[async_trait]
pub trait HeaderFeed: Send + Sync {
    /// The most recent `count` headers of the feed's best chain.
    async fn request_recent_headers(&self, count: usize) -> Result<HeaderBatch, FeedError>;
}

/// Random access to a node's best chain, as the follower walks it.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn tip_height(&self) -> Result<u32, FeedError>;
    async fn hash_at(&self, height: u32) -> Result<Hash32, FeedError>;
    /// Headers for heights `start..=end`, oldest first.
    async fn headers(&self, start: u32, end: u32) -> Result<HeaderBatch, FeedError>;
    async fn block(&self, hash: &Hash32) -> Result<Block, FeedError>;
}
