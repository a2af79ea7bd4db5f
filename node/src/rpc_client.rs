// node/src/rpc_client.rs
//
// Bitcoin Core JSON-RPC client used by the scanning pipeline: chain tip,
// per-height block fetch, and batched previous-transaction lookups.

use crate::types::{RawBlock, RawTx};
use async_trait::async_trait;
use config::BitcoinConfig;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use transport::{Transport, TransportError};

/// Errors a `NodeClient` can return. Transient errors are retried by the
/// client itself (see `BitcoinCoreClient::call_with_retry`); only errors
/// that exhaust retries, or that are never retried (auth failures,
/// malformed responses), reach the caller.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("RPC request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("authentication rejected by node: {0}")]
    Auth(TransportError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed response from node for {method}: {detail}")]
    Malformed { method: &'static str, detail: String },
}

/// The operations the scanning pipeline needs from a Bitcoin node. A
/// trait so tests can substitute an in-memory fake instead of a live
/// `bitcoind`.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Current chain height (`getblockcount`).
    async fn get_chain_tip(&self) -> Result<u64, NodeError>;

    /// Fetch a full block (embedded transactions) at `height`.
    async fn get_block_at(&self, height: u64) -> Result<RawBlock, NodeError>;

    /// Fetch a single transaction by id.
    async fn get_tx(&self, txid: &str) -> Result<RawTx, NodeError>;

    /// Fetch multiple transactions in as few round trips as possible.
    /// The result vector is positionally aligned with `txids`; an entry
    /// is `None` if that particular transaction could not be fetched
    /// (e.g. pruned, or not found), which must not fail the whole call.
    async fn get_txs_batch(&self, txids: &[String]) -> Result<Vec<Option<RawTx>>, NodeError>;
}

/// A `NodeClient` backed by a real `bitcoind` over HTTP JSON-RPC.
pub struct BitcoinCoreClient {
    transport: Transport,
    max_retries: u32,
    retry_delay: Duration,
    rpc_batch_size: usize,
}

impl BitcoinCoreClient {
    /// Build a client from Bitcoin RPC connection settings. Prefers cookie
    /// authentication when `cookie_path` is set, falling back to the
    /// configured username/password otherwise.
    pub fn new(
        bitcoin: &BitcoinConfig,
        max_retries: u32,
        retry_delay: Duration,
        timeout: Duration,
        rpc_batch_size: usize,
    ) -> Result<Self, NodeError> {
        let url = format!("http://{}:{}", bitcoin.host, bitcoin.port);
        let transport = match &bitcoin.cookie_path {
            Some(cookie_path) => Transport::new_with_cookie(&url, cookie_path)?,
            None => Transport::new_with_auth(&url, &bitcoin.username, &bitcoin.password),
        }
        .with_timeout(timeout)?;

        Ok(Self {
            transport,
            max_retries,
            retry_delay,
            rpc_batch_size,
        })
    }

    /// Call `method` with `params`, retrying transient failures up to
    /// `max_retries` times with a fixed delay between attempts.
    /// Authentication failures (HTTP 401/403) are never retried.
    async fn call_with_retry<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[serde_json::Value],
    ) -> Result<R, NodeError> {
        let mut last_err = None;
        for attempt in 1..=self.max_retries {
            match self.transport.call::<serde_json::Value, R>(method, params).await {
                Ok(result) => return Ok(result),
                Err(TransportError::Http(401, e)) => return Err(NodeError::Auth(TransportError::Http(401, e))),
                Err(TransportError::Http(403, e)) => return Err(NodeError::Auth(TransportError::Http(403, e))),
                Err(e) => {
                    warn!(
                        method,
                        attempt, max_retries = self.max_retries, error = %e, "rpc call failed"
                    );
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(NodeError::Exhausted {
            attempts: self.max_retries,
            source: last_err.expect("loop runs at least once"),
        })
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, NodeError> {
        self.call_with_retry("getblockhash", &[json!(height)]).await
    }
}

#[async_trait]
impl NodeClient for BitcoinCoreClient {
    async fn get_chain_tip(&self) -> Result<u64, NodeError> {
        self.call_with_retry("getblockcount", &[]).await
    }

    async fn get_block_at(&self, height: u64) -> Result<RawBlock, NodeError> {
        let hash = self.get_block_hash(height).await?;
        let block: RawBlock = self
            .call_with_retry("getblock", &[json!(hash), json!(2)])
            .await?;
        if block.height != height {
            return Err(NodeError::Malformed {
                method: "getblock",
                detail: format!("expected height {height}, got {}", block.height),
            });
        }
        Ok(block)
    }

    async fn get_tx(&self, txid: &str) -> Result<RawTx, NodeError> {
        self.call_with_retry("getrawtransaction", &[json!(txid), json!(true)])
            .await
    }

    async fn get_txs_batch(&self, txids: &[String]) -> Result<Vec<Option<RawTx>>, NodeError> {
        if txids.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(txids.len());
        for chunk in txids.chunks(self.rpc_batch_size.max(1)) {
            let calls: Vec<(&str, serde_json::Value)> = chunk
                .iter()
                .map(|txid| ("getrawtransaction", json!([txid, true])))
                .collect();

            let raw_results = self.transport.send_batch(&calls).await?;
            for value in raw_results {
                let tx = value.and_then(|v| serde_json::from_value::<RawTx>(v).ok());
                results.push(tx);
            }
        }
        Ok(results)
    }
}
