//! Error taxonomy for the ingestion pipeline.
//!
//! Transient errors (RPC or store unavailability) are retried with backoff
//! and never surface as failures. Stale-checkpoint losses are handled inside
//! the crawler loop. Everything else is fatal for the affected lane: the loop
//! halts with the checkpoint untouched, safe to resume after operator fix.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(
        "stale checkpoint for lane '{lane}': expected height {expected:?}, found {found:?}"
    )]
    StaleCheckpoint {
        lane: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("extraction failed at height {height}: {reason}")]
    Extraction { height: u64, reason: String },

    #[error("malformed chain data at height {height}: {reason}")]
    Malformed { height: u64, reason: String },

    #[error("reorg at height {height} deeper than the configured ceiling of {max_depth} blocks")]
    ReorgTooDeep { height: u64, max_depth: u64 },
}

impl IndexerError {
    /// Returns `true` if the error should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }

    /// Returns `true` if the error must halt the lane and be loudly reported.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::Malformed { .. } | Self::ReorgTooDeep { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(IndexerError::Rpc("connection refused".into()).is_transient());
        assert!(IndexerError::Storage("pool timed out".into()).is_transient());
        assert!(IndexerError::ReorgTooDeep { height: 10, max_depth: 5 }.is_fatal());
        assert!(IndexerError::Malformed { height: 3, reason: "bad header".into() }.is_fatal());

        let stale = IndexerError::StaleCheckpoint {
            lane: "crawler".into(),
            expected: Some(300),
            found: Some(301),
        };
        assert!(!stale.is_transient());
        assert!(!stale.is_fatal());
    }
}
