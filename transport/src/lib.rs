#![warn(missing_docs)]

//! **`Transport`**
//! A thin, configurable JSON‑RPC over HTTP transport layer for communicating with Bitcoin Core nodes.
//!
//! Features:
//! - HTTP client setup with optional basic authentication via `new_with_auth`
//! - Low‑level `send_request` returning raw `serde_json::Value` for maximum flexibility
//! - High‑level `call` with automatic serialization/deserialization to Rust types
//! - Unified error handling through the `TransportError` enum, covering HTTP, RPC, and JSON errors

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Encapsulates an HTTP client and endpoint URL for sending JSON‑RPC requests.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    url: String,
    auth_header: Option<HeaderValue>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.url)
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

/// Errors that can occur while sending or receiving JSON‑RPC requests.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP transport error, includes status code and underlying transport error.
    #[error("HTTP error (status {0}): {1}")]
    Http(u16, #[source] reqwest::Error),

    /// The JSON‑RPC response contained an error object.
    #[error("RPC error: {0}")]
    Rpc(Value),

    /// Failed to parse JSON response.
    #[error("Invalid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The JSON‑RPC response did not include a `result` field.
    #[error("Missing result field in response")]
    MissingResult,

    /// The cookie file used for authentication could not be read or was
    /// not in `user:password` form.
    #[error("Invalid cookie file at {0}: {1}")]
    Cookie(std::path::PathBuf, String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            TransportError::Http(status.as_u16(), e)
        } else {
            // Use 0 as a sentinel value for network errors (timeouts, connection refused, etc.)
            // where no HTTP status code is available
            TransportError::Http(0, e)
        }
    }
}

impl Transport {
    /// Create a new transport pointing at `url` (e.g. "http://127.0.0.1:18443").
    ///
    /// # Parameters
    /// - `url`: The HTTP endpoint of the Bitcoin Core JSON‑RPC server.
    pub fn new<U: Into<String>>(url: U) -> Self {
        Transport {
            client: Client::new(),
            url: url.into(),
            auth_header: None,
        }
    }

    /// Create a new transport with HTTP basic authentication.
    ///
    /// # Parameters
    /// - `url`: The HTTP endpoint of the Bitcoin Core JSON‑RPC server.
    /// - `rpcuser`: RPC username.
    /// - `rpcpass`: RPC password.
    ///
    /// # Panics
    /// Panics if default headers cannot be constructed.
    pub fn new_with_auth<U: Into<String>>(url: U, rpcuser: &str, rpcpass: &str) -> Self {
        let auth =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", rpcuser, rpcpass));
        let auth_header = HeaderValue::from_str(&format!("Basic {}", auth)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_header.clone());
        let client = Client::builder().default_headers(headers).build().unwrap();

        Transport {
            client,
            url: url.into(),
            auth_header: Some(auth_header),
        }
    }

    /// Create a new transport authenticated from a Bitcoin Core `.cookie`
    /// file, whose contents are a single `username:password` line written
    /// by `bitcoind` at startup.
    ///
    /// # Errors
    /// Returns `TransportError::Cookie` if the file cannot be read or does
    /// not contain a `:` separator.
    pub fn new_with_cookie<U: Into<String>>(
        url: U,
        cookie_path: &Path,
    ) -> Result<Self, TransportError> {
        let contents = std::fs::read_to_string(cookie_path).map_err(|e| {
            TransportError::Cookie(cookie_path.to_path_buf(), e.to_string())
        })?;
        let contents = contents.trim();
        let (user, pass) = contents.split_once(':').ok_or_else(|| {
            TransportError::Cookie(
                cookie_path.to_path_buf(),
                "expected `user:password` contents".to_string(),
            )
        })?;
        Ok(Self::new_with_auth(url, user, pass))
    }

    /// Set a request timeout on this transport, rebuilding the underlying
    /// HTTP client. Preserves any authentication header already set.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, TransportError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(auth_header) = &self.auth_header {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, auth_header.clone());
            builder = builder.default_headers(headers);
        }
        self.client = builder.build()?;
        Ok(self)
    }

    /// Send a JSON‑RPC request with given `method` and `params`, returning the raw `result` field.
    ///
    /// # Type Parameters
    /// - `P`: The type of the parameters, must implement `Serialize`.
    ///
    /// # Parameters
    /// - `method`: The RPC method name.
    /// - `params`: The parameters to pass to the RPC call.
    ///
    /// # Errors
    /// Returns `TransportError` if the HTTP request fails, the server returns an error object,
    /// or the response cannot be parsed or is missing the `result`.
    pub async fn send_request<P: Serialize>(
        &self,
        method: &str,
        params: &[P],
    ) -> Result<Value, TransportError> {
        let req_body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let resp: Value = self
            .client
            .post(&self.url)
            .json(&req_body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            Err(TransportError::Rpc(err.clone()))
        } else if !resp.is_object() || resp.get("result").is_none() {
            Err(TransportError::MissingResult)
        } else {
            Ok(resp["result"].clone())
        }
    }

    /// Send a batch of JSON‑RPC 1.0 requests as a single HTTP POST carrying
    /// a JSON array, the form Bitcoin Core accepts for batched calls.
    ///
    /// Results are returned positionally aligned with `calls`: an entry is
    /// `None` if its corresponding response object in the batch could not
    /// be decoded or reported an RPC error, so one bad call does not fail
    /// the rest of the batch. Returns an error only if the HTTP request
    /// itself fails or the response is not a JSON array of the expected
    /// length.
    pub async fn send_batch(
        &self,
        calls: &[(&str, Value)],
    ) -> Result<Vec<Option<Value>>, TransportError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let body: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(i, (method, params))| {
                json!({
                    "jsonrpc": "1.0",
                    "id": format!("batch-{}", i),
                    "method": method,
                    "params": params,
                })
            })
            .collect();

        let resp: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        let entries = resp.as_array().ok_or(TransportError::MissingResult)?;
        let mut by_id: std::collections::HashMap<String, Value> = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| (id.to_string(), entry.clone()))
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for i in 0..calls.len() {
            let id = format!("batch-{}", i);
            let result = by_id.remove(&id).and_then(|entry| {
                if entry.get("error").map(|e| !e.is_null()).unwrap_or(false) {
                    None
                } else {
                    entry.get("result").cloned()
                }
            });
            results.push(result);
        }
        Ok(results)
    }

    /// Send a JSON‑RPC request with given `method` and `params`, deserializing the `result` into `R`.
    ///
    /// # Type Parameters
    /// - `T`: The type of the parameters, must implement `Serialize`.
    /// - `R`: The expected return type, must implement `DeserializeOwned`.
    ///
    /// # Parameters
    /// - `method`: The RPC method name.
    /// - `params`: The parameters to pass to the RPC call.
    ///
    /// # Errors
    /// Returns `TransportError` if the HTTP request fails or deserialization fails.
    pub async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &[T],
    ) -> Result<R, TransportError> {
        let response = self.send_request(method, params).await?;
        Ok(serde_json::from_value(response)?)
    }
}
