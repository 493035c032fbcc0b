use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChainSource, FeedError, HeaderBatch, HeaderFeed};
use crate::chain::{Block, BlockHeader, Hash32, HeaderIds, Transaction};

/// A feed over an in-memory chain, for tests and local runs. Heights start
/// at zero.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    inner: Mutex<MemoryChain>,
}

#[derive(Debug, Default)]
struct MemoryChain {
    headers: Vec<BlockHeader>,
    transactions: HashMap<Hash32, Vec<Transaction>>,
    unavailable: bool,
}

impl MemoryFeed {
    pub fn new(headers: Vec<BlockHeader>) -> Self {
        Self {
            inner: Mutex::new(MemoryChain {
                headers,
                ..Default::default()
            }),
        }
    }

    /// Replaces the feed's best chain.
    pub fn set_chain(&self, headers: Vec<BlockHeader>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.headers = headers;
        }
    }

    /// Transactions returned for the block with `hash`.
    pub fn set_transactions(&self, hash: Hash32, transactions: Vec<Transaction>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.transactions.insert(hash, transactions);
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    fn with_chain<T>(
        &self,
        f: impl FnOnce(&MemoryChain) -> Result<T, FeedError>,
    ) -> Result<T, FeedError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| FeedError::Unavailable("memory feed lock poisoned".to_string()))?;
        if inner.unavailable {
            return Err(FeedError::Unavailable("memory feed offline".to_string()));
        }
        f(&inner)
    }
}

fn out_of_range(height: u32) -> FeedError {
    FeedError::Unavailable(format!("no block at height {height}"))
}

#[async_trait]
impl HeaderFeed for MemoryFeed {
    async fn request_recent_headers(&self, count: usize) -> Result<HeaderBatch, FeedError> {
        self.with_chain(|chain| {
            let start = chain.headers.len().saturating_sub(count);
            Ok(HeaderBatch::new(start as u32, chain.headers[start..].to_vec()))
        })
    }
}

#[async_trait]
impl ChainSource for MemoryFeed {
    async fn tip_height(&self) -> Result<u32, FeedError> {
        self.with_chain(|chain| {
            (chain.headers.len() as u32)
                .checked_sub(1)
                .ok_or(FeedError::EmptyResult("tip_height"))
        })
    }

    async fn hash_at(&self, height: u32) -> Result<Hash32, FeedError> {
        self.with_chain(|chain| {
            chain
                .headers
                .get(height as usize)
                .map(HeaderIds::id)
                .ok_or_else(|| out_of_range(height))
        })
    }

    async fn headers(&self, start: u32, end: u32) -> Result<HeaderBatch, FeedError> {
        self.with_chain(|chain| {
            let headers = chain
                .headers
                .get(start as usize..=end as usize)
                .ok_or_else(|| out_of_range(end))?;
            Ok(HeaderBatch::new(start, headers.to_vec()))
        })
    }

    async fn block(&self, hash: &Hash32) -> Result<Block, FeedError> {
        self.with_chain(|chain| {
            let header = chain
                .headers
                .iter()
                .find(|header| header.id() == *hash)
                .cloned()
                .ok_or_else(|| FeedError::Unavailable(format!("unknown block {hash}")))?;
            Ok(Block {
                header,
                txdata: chain.transactions.get(hash).cloned().unwrap_or_default(),
            })
        })
    }
}
