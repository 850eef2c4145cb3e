//! Durable store abstraction: blocks, shielded events, per-lane checkpoints.
//!
//! `advance` is the single write path of the pipeline. It persists a block,
//! its events, and the lane checkpoint as one atomic unit, guarded by an
//! optimistic-concurrency check: the caller supplies the lane height it
//! believes is current, and a mismatch means a peer process progressed the
//! lane — the caller aborts and re-reads, no duplicate writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::checkpoint::Checkpoint;
use crate::error::IndexerError;
use crate::types::{Block, ShieldedEvent};

/// Transactional, key-addressable store shared by crawler lanes and readers.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Read a lane's checkpoint. `None` means the lane is uninitialized.
    async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, IndexerError>;

    /// Atomically persist `block`, its `events`, and the lane checkpoint
    /// `(block.height, block.hash)`.
    ///
    /// `expected` is the lane height the caller read before building this
    /// commit (`None` = the lane has no checkpoint yet). If the stored
    /// height differs, fails with [`IndexerError::StaleCheckpoint`] and
    /// writes nothing.
    async fn advance(
        &self,
        lane: &str,
        expected: Option<u64>,
        block: &Block,
        events: &[ShieldedEvent],
    ) -> Result<(), IndexerError>;

    /// Atomically delete all blocks and events above `to_height` and reset
    /// the lane checkpoint to the stored block at `to_height`.
    ///
    /// Returns the number of events purged.
    async fn rewind(&self, lane: &str, to_height: u64) -> Result<u64, IndexerError>;

    /// Read the stored block at `height`, if any.
    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError>;

    /// Read events with `from <= height <= to`, ordered by height then
    /// position. The caller is responsible for clipping `to` to a committed
    /// checkpoint.
    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldedEvent>, IndexerError>;
}

#[async_trait]
impl<T: IndexStore + ?Sized> IndexStore for std::sync::Arc<T> {
    async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, IndexerError> {
        (**self).checkpoint(lane).await
    }

    async fn advance(
        &self,
        lane: &str,
        expected: Option<u64>,
        block: &Block,
        events: &[ShieldedEvent],
    ) -> Result<(), IndexerError> {
        (**self).advance(lane, expected, block, events).await
    }

    async fn rewind(&self, lane: &str, to_height: u64) -> Result<u64, IndexerError> {
        (**self).rewind(lane, to_height).await
    }

    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        (**self).block_at(height).await
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldedEvent>, IndexerError> {
        (**self).events_in_range(from, to).await
    }
}

// ─── In-memory store (tests / ephemeral runs) ────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    blocks: BTreeMap<u64, Block>,
    /// Keyed by `(height, position)` so range scans come out ordered.
    events: BTreeMap<(u64, u32), ShieldedEvent>,
    checkpoints: HashMap<String, Checkpoint>,
}

/// In-memory store. All data is lost when the process exits.
///
/// A single mutex gives the same atomicity guarantees the SQL backend gets
/// from transactions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events (test helper).
    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    /// Total number of stored blocks (test helper).
    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.inner.lock().unwrap().checkpoints.get(lane).cloned())
    }

    async fn advance(
        &self,
        lane: &str,
        expected: Option<u64>,
        block: &Block,
        events: &[ShieldedEvent],
    ) -> Result<(), IndexerError> {
        let mut inner = self.inner.lock().unwrap();

        let found = inner.checkpoints.get(lane).map(|cp| cp.height);
        if found != expected {
            return Err(IndexerError::StaleCheckpoint {
                lane: lane.to_string(),
                expected,
                found,
            });
        }

        inner.blocks.insert(block.height, block.clone());
        for event in events {
            inner
                .events
                .insert((event.height, event.position), event.clone());
        }
        inner.checkpoints.insert(
            lane.to_string(),
            Checkpoint::new(lane, block.height, block.hash.clone()),
        );
        Ok(())
    }

    async fn rewind(&self, lane: &str, to_height: u64) -> Result<u64, IndexerError> {
        let mut inner = self.inner.lock().unwrap();

        let anchor = inner.blocks.get(&to_height).cloned().ok_or_else(|| {
            IndexerError::Storage(format!("no stored block at rewind target {to_height}"))
        })?;

        let before = inner.events.len();
        inner.events.retain(|(height, _), _| *height <= to_height);
        let purged = (before - inner.events.len()) as u64;
        inner.blocks.retain(|height, _| *height <= to_height);

        inner.checkpoints.insert(
            lane.to_string(),
            Checkpoint::new(lane, to_height, anchor.hash),
        );
        Ok(purged)
    }

    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        Ok(self.inner.lock().unwrap().blocks.get(&height).cloned())
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldedEvent>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .range((from, 0)..=(to, u32::MAX))
            .map(|(_, event)| event.clone())
            .collect())
    }
}
