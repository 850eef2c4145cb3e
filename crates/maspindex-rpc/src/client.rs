//! HTTP client for the CometBFT JSON-RPC interface.
//!
//! Owns bounded retry with escalating delay for transport-level failures, so
//! callers only observe the three [`ReadError`] outcomes. Each request has
//! its own timeout; a timeout counts as `Unavailable`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use maspindex_core::reader::{ChainReader, ReadError};
use maspindex_core::types::{Block, BlockResults};

use crate::wire::{BlockResult, BlockResultsResult, RpcEnvelope, StatusResult};

/// Chain reader over a CometBFT node's JSON-RPC endpoint.
pub struct CometClient {
    http: reqwest::Client,
    base: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl CometClient {
    /// Create a client with default timeouts (15s per request, 3 retries).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_options(base_url, Duration::from_secs(15), 3, Duration::from_millis(500))
    }

    pub fn with_options(
        base_url: impl Into<String>,
        request_timeout: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("maspindex/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }

        Self { http, base, max_retries, retry_delay }
    }

    /// Issue one GET and classify the response.
    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        height: u64,
    ) -> Result<T, ReadError> {
        let url = format!("{}/{path}", self.base);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ReadError::Unavailable(format!("{path}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReadError::Unavailable(format!("{path}: reading body: {e}")))?;

        // CometBFT returns RPC errors in the envelope, sometimes with a
        // non-200 status; parse the body before trusting the status code.
        let envelope: RpcEnvelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(ReadError::Malformed {
                    height,
                    reason: format!("{path}: undecodable response: {e}"),
                });
            }
            Err(_) => {
                return Err(ReadError::Unavailable(format!("{path}: HTTP {status}")));
            }
        };

        if let Some(error) = &envelope.error {
            if error.is_height_not_found() {
                return Err(ReadError::NotFound { height });
            }
            return Err(ReadError::Unavailable(format!(
                "{path}: RPC error {}: {}",
                error.code, error.message
            )));
        }

        envelope.result.ok_or_else(|| ReadError::Malformed {
            height,
            reason: format!("{path}: response carries neither result nor error"),
        })
    }

    /// GET with bounded retry on `Unavailable`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        height: u64,
    ) -> Result<T, ReadError> {
        let mut attempt = 0u32;
        loop {
            match self.get_once(path, query, height).await {
                Err(ReadError::Unavailable(reason)) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay.saturating_mul(attempt);
                    tracing::debug!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason,
                        "retrying chain RPC call"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ChainReader for CometClient {
    async fn latest_height(&self) -> Result<u64, ReadError> {
        let status: StatusResult = self.get_json("status", &[], 0).await?;
        status
            .sync_info
            .latest_block_height
            .parse::<u64>()
            .map_err(|_| ReadError::Malformed {
                height: 0,
                reason: format!(
                    "unparseable latest height '{}'",
                    status.sync_info.latest_block_height
                ),
            })
    }

    async fn block(&self, height: u64) -> Result<Block, ReadError> {
        let result: BlockResult = self
            .get_json("block", &[("height", height.to_string())], height)
            .await?;
        result.into_block(height)
    }

    async fn block_results(&self, height: u64) -> Result<BlockResults, ReadError> {
        let result: BlockResultsResult = self
            .get_json("block_results", &[("height", height.to_string())], height)
            .await?;
        result.into_block_results(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes() {
        let client = CometClient::new("http://localhost:26657///");
        assert_eq!(client.base, "http://localhost:26657");
    }

    #[tokio::test]
    async fn unreachable_node_is_unavailable() {
        // reserved TEST-NET-1 address; nothing listens there
        let client = CometClient::with_options(
            "http://192.0.2.1:26657",
            Duration::from_millis(50),
            0,
            Duration::from_millis(1),
        );
        let err = client.latest_height().await.unwrap_err();
        assert!(matches!(err, ReadError::Unavailable(_)));
    }
}
