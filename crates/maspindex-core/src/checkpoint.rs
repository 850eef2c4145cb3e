//! Per-lane ingestion checkpoints.
//!
//! A checkpoint records the last successfully indexed height and the hash of
//! the block stored at that height. It is the correctness anchor of the
//! pipeline: it advances only in the same transaction as the rows it guards,
//! and its hash must always equal the stored block's hash. On restart, the
//! crawler resumes from it; on a parent-hash mismatch, it is the starting
//! point of backward reconciliation.

use serde::{Deserialize, Serialize};

/// Lane owning shielded-event extraction.
pub const CRAWLER_LANE: &str = "crawler";
/// Lane owning the raw block-metadata index.
pub const BLOCK_INDEX_LANE: &str = "block-index";

/// Durable marker of ingestion progress for one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Lane name (checkpoint rows are never shared between lanes).
    pub lane: String,
    /// Last successfully indexed height.
    pub height: u64,
    /// Hash of the block stored at `height`.
    pub hash: String,
    /// Unix timestamp of the last advance or rewind.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(lane: impl Into<String>, height: u64, hash: impl Into<String>) -> Self {
        Self {
            lane: lane.into(),
            height,
            hash: hash.into(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The next height this lane should ingest.
    pub fn next_height(&self) -> u64 {
        self.height + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_height() {
        let cp = Checkpoint::new(CRAWLER_LANE, 200, "hashA");
        assert_eq!(cp.next_height(), 201);
        assert_eq!(cp.lane, "crawler");
    }
}
