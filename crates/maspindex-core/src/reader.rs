//! Chain reader abstraction — a thin, read-through view of the remote node.
//!
//! Implementations own bounded retry/backoff for transient transport
//! failures, so callers only ever see the three outcomes below: the node is
//! unavailable, the height is beyond the chain tip, or the response failed
//! structural validation.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::IndexerError;
use crate::types::{Block, BlockResults};

/// Failure modes of a chain read.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Network/RPC failure — retryable.
    #[error("chain RPC unavailable: {0}")]
    Unavailable(String),

    /// The requested height is beyond the chain tip — wait and retry.
    #[error("block {height} not found (beyond chain tip)")]
    NotFound { height: u64 },

    /// The response failed structural validation — fatal for this height.
    #[error("malformed response for height {height}: {reason}")]
    Malformed { height: u64, reason: String },
}

impl From<ReadError> for IndexerError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Unavailable(reason) => IndexerError::Rpc(reason),
            // NotFound leaking out of the fetch path means a height the
            // caller believed committed vanished mid-cycle; retryable.
            ReadError::NotFound { height } => {
                IndexerError::Rpc(format!("block {height} disappeared from the chain view"))
            }
            ReadError::Malformed { height, reason } => {
                IndexerError::Malformed { height, reason }
            }
        }
    }
}

/// Read-only client for the remote chain. No side effects.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest height known to the remote node.
    async fn latest_height(&self) -> Result<u64, ReadError>;

    /// Fetch the block header summary at `height`.
    async fn block(&self, height: u64) -> Result<Block, ReadError>;

    /// Fetch the execution results (per-tx events) at `height`.
    async fn block_results(&self, height: u64) -> Result<BlockResults, ReadError>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for std::sync::Arc<T> {
    async fn latest_height(&self) -> Result<u64, ReadError> {
        (**self).latest_height().await
    }

    async fn block(&self, height: u64) -> Result<Block, ReadError> {
        (**self).block(height).await
    }

    async fn block_results(&self, height: u64) -> Result<BlockResults, ReadError> {
        (**self).block_results(height).await
    }
}
