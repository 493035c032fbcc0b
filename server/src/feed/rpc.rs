use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChainSource, FeedError, HeaderBatch, HeaderFeed};
use crate::chain::{self, Block, BlockHeader, ChainError, Hash32, HeaderIds};

/// Attempts at reading a header range before giving up on a chain that keeps
/// changing underneath the reads.
const RANGE_ATTEMPTS: usize = 3;

/// JSON-RPC client for a full node.
#[derive(Clone)]
pub struct RpcFeed {
    url: String,
    user: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcFeed {
    pub fn new(url: impl Into<String>, user: Option<String>, password: Option<String>) -> Self {
        Self {
            url: url.into(),
            user,
            password,
            http: reqwest::Client::new(),
        }
    }

    /// Height of the node's best block.
    pub async fn block_count(&self) -> Result<u32, FeedError> {
        self.call("getblockcount", json!([])).await
    }

    pub async fn block_hash(&self, height: u32) -> Result<Hash32, FeedError> {
        let hash: String = self.call("getblockhash", json!([height])).await?;
        Ok(hash.parse()?)
    }

    pub async fn block(&self, hash: &Hash32) -> Result<Block, FeedError> {
        let raw: String = self.call("getblock", json!([hash.to_string(), 0])).await?;
        let bytes = hex::decode(raw).map_err(ChainError::from)?;
        Ok(chain::decode_block(&bytes)?)
    }

    /// Headers for heights `start..=end`, oldest first.
    ///
    /// Hashes and headers are each fetched in one batched request. A range
    /// that does not link, because the node reorganized between the two
    /// requests, is read again.
    pub async fn headers_range(&self, start: u32, end: u32) -> Result<HeaderBatch, FeedError> {
        let heights: Vec<Value> = (start..=end).map(|height| json!([height])).collect();
        let mut attempt = 1;
        loop {
            let hashes: Vec<String> = self.batch("getblockhash", heights.clone()).await?;
            let hashes = hashes
                .iter()
                .map(|hash| hash.parse())
                .collect::<Result<Vec<Hash32>, _>>()?;

            let params = hashes
                .iter()
                .map(|hash| json!([hash.to_string(), false]))
                .collect();
            let raw: Vec<String> = self.batch("getblockheader", params).await?;
            let headers = raw
                .iter()
                .map(|raw| {
                    let bytes = hex::decode(raw).map_err(ChainError::from)?;
                    chain::decode_header(&bytes)
                })
                .collect::<Result<Vec<BlockHeader>, _>>()?;

            if is_linked(&headers, &hashes) {
                return Ok(HeaderBatch::new(start, headers));
            }
            if attempt == RANGE_ATTEMPTS {
                return Err(FeedError::Unavailable(format!(
                    "chain kept changing while reading heights {start}..={end}"
                )));
            }
            warn!(start, end, attempt, "header range changed while reading; retrying");
            attempt += 1;
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, FeedError> {
        debug!(method, "rpc call");
        let body = json!({
            "jsonrpc": "1.0",
            "id": "identity-oracle",
            "method": method,
            "params": params,
        });

        // Node errors come back in the body, often with a non-2xx status.
        let response: RpcResponse<T> = self.post(&body).await?.json().await?;
        response.into_result(method)
    }

    /// Sends one request per entry of `params` in a single JSON-RPC batch and
    /// returns the results in the same order.
    async fn batch<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Vec<T>, FeedError> {
        if params.is_empty() {
            return Ok(Vec::new());
        }
        debug!(method, count = params.len(), "rpc batch");
        let count = params.len();
        let body: Vec<Value> = params
            .into_iter()
            .enumerate()
            .map(|(id, params)| {
                json!({
                    "jsonrpc": "1.0",
                    "id": id,
                    "method": method,
                    "params": params,
                })
            })
            .collect();

        let responses: Vec<RpcResponse<T>> = self.post(&body).await?.json().await?;
        collect_batch(method, count, responses)
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, FeedError> {
        let mut request = self.http.post(&self.url).json(body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }
        Ok(request.send().await?)
    }
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, FeedError> {
        if let Some(error) = self.error {
            return Err(FeedError::Rpc {
                method,
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or(FeedError::EmptyResult(method))
    }
}

/// Orders batch responses by request id. Nodes may answer a batch in any
/// order; a missing or failed entry fails the whole batch.
fn collect_batch<T>(
    method: &'static str,
    count: usize,
    responses: Vec<RpcResponse<T>>,
) -> Result<Vec<T>, FeedError> {
    let mut by_id: HashMap<u64, RpcResponse<T>> = responses
        .into_iter()
        .filter_map(|response| response.id.as_u64().map(|id| (id, response)))
        .collect();

    (0..count as u64)
        .map(|id| {
            by_id
                .remove(&id)
                .ok_or(FeedError::EmptyResult(method))?
                .into_result(method)
        })
        .collect()
}

/// Whether `headers` hash to `hashes` and each follows the one before it.
fn is_linked(headers: &[BlockHeader], hashes: &[Hash32]) -> bool {
    headers.len() == hashes.len()
        && headers
            .iter()
            .zip(hashes)
            .all(|(header, hash)| header.id() == *hash)
        && headers
            .windows(2)
            .all(|pair| pair[1].parent_id() == pair[0].id())
}

#[async_trait]
impl HeaderFeed for RpcFeed {
    async fn request_recent_headers(&self, count: usize) -> Result<HeaderBatch, FeedError> {
        if count == 0 {
            return Ok(HeaderBatch::default());
        }
        let tip = self.block_count().await?;
        let span = u32::try_from(count - 1).unwrap_or(u32::MAX);
        self.headers_range(tip.saturating_sub(span), tip).await
    }
}

#[async_trait]
impl ChainSource for RpcFeed {
    async fn tip_height(&self) -> Result<u32, FeedError> {
        self.block_count().await
    }

    async fn hash_at(&self, height: u32) -> Result<Hash32, FeedError> {
        self.block_hash(height).await
    }

    async fn headers(&self, start: u32, end: u32) -> Result<HeaderBatch, FeedError> {
        self.headers_range(start, end).await
    }

    async fn block(&self, hash: &Hash32) -> Result<Block, FeedError> {
        RpcFeed::block(self, hash).await
    }
}
