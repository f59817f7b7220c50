//! JSON-RPC 2.0 client for plugin notifications.
//!
//! One request per delivery attempt, `Content-Type: application/json`, with a
//! monotonically increasing request id (a debugging aid, not a correctness
//! requirement). A call succeeds when the endpoint answers HTTP 200 with a
//! well-formed JSON-RPC response — whether or not that response carries an
//! `error` object; a JSON-RPC error is the plugin's reply, not a transport
//! failure, and is never retried.
//!
//! Retry classification:
//!
//! | outcome                       | classification |
//! |-------------------------------|----------------|
//! | connect/transport error       | retry          |
//! | 5xx                           | retry          |
//! | other non-200 (1xx, 3xx)      | retry          |
//! | malformed body on 200         | retry          |
//! | 4xx                           | final          |
//! | 200 + JSON-RPC error object   | success        |
//!
//! Between attempts the client sleeps `base_delay · 2^attempt`. At most
//! `max_retries + 1` attempts are made.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tessera_core::{Cell, ShardId};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: i64,
}

/// A JSON-RPC 2.0 error object, as returned by a plugin.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("jsonrpc error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Payload of the `cell.written` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellWrittenParams {
    pub added_id: i64,
    pub row_key: String,
    pub column_name: String,
    pub ref_key: i64,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub shard_id: ShardId,
}

impl CellWrittenParams {
    pub fn from_cell(shard_id: ShardId, cell: &Cell) -> Self {
        CellWrittenParams {
            added_id: cell.added_id,
            row_key: cell.row_key.to_string(),
            column_name: cell.column_name.clone(),
            ref_key: cell.ref_key,
            body: cell.body.clone(),
            created_at: cell.created_at,
            shard_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 4xx — the endpoint rejected the request; retrying cannot help.
    #[error("endpoint rejected request with status {0}")]
    Rejected(u16),

    /// Any other non-200 status; retried.
    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed json-rpc response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("call failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<RpcError>,
    },
}

impl RpcError {
    fn is_final(&self) -> bool {
        matches!(self, RpcError::Rejected(_))
    }
}

/// Sends JSON-RPC 2.0 requests over HTTP with bounded retry.
pub struct RpcClient {
    http: reqwest::Client,
    next_id: AtomicI64,
    max_retries: u32,
    base_delay: Duration,
}

impl RpcClient {
    /// `timeout` bounds each individual HTTP attempt.
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        timeout: Duration,
    ) -> std::result::Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RpcClient {
            http,
            next_id: AtomicI64::new(0),
            max_retries,
            base_delay,
        })
    }

    /// Sends one JSON-RPC call, retrying retryable failures with exponential
    /// backoff. Returns the parsed response; a response with an `error`
    /// object is a successful call.
    pub async fn call<P: Serialize>(
        &self,
        endpoint: &str,
        method: &str,
        params: &P,
    ) -> std::result::Result<JsonRpcResponse, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
        };

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.attempt(endpoint, &request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_final() => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        endpoint,
                        attempt,
                        error = %err,
                        "rpc attempt failed"
                    );
                    last_err = Some(err);
                }
            }
            if attempt < self.max_retries {
                let delay = self.base_delay * 2u32.saturating_pow(attempt);
                tokio::time::sleep(delay).await;
            }
        }

        Err(RpcError::Exhausted {
            attempts: self.max_retries + 1,
            source: Box::new(last_err.unwrap_or(RpcError::Status(0))),
        })
    }

    async fn attempt(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
    ) -> std::result::Result<JsonRpcResponse, RpcError> {
        let response = self.http.post(endpoint).json(request).send().await?;
        let status = response.status();

        if status.is_client_error() {
            return Err(RpcError::Rejected(status.as_u16()));
        }
        if status != StatusCode::OK {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
