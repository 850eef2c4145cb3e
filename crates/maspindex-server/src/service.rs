//! Checkpoint-consistent read layer over an [`IndexStore`].
//!
//! Readers never observe rows beyond a committed checkpoint: every range
//! query is clipped to the lowest checkpoint across the configured lanes,
//! so a half-ingested block (or one about to be rewound) is invisible.

use std::collections::BTreeMap;

use maspindex_core::checkpoint::Checkpoint;
use maspindex_core::error::IndexerError;
use maspindex_core::store::IndexStore;
use maspindex_core::types::ShieldedEvent;

/// Errors surfaced by the query layer.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The requested range starts below the indexer's bootstrap floor.
    #[error("range starts at {from} but indexing begins at {floor}")]
    OutOfRange { from: u64, floor: u64 },

    /// The named lane is not part of this deployment.
    #[error("unknown lane '{0}'")]
    UnknownLane(String),

    /// The store failed; the caller should retry later.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<IndexerError> for QueryError {
    fn from(e: IndexerError) -> Self {
        QueryError::Unavailable(e.to_string())
    }
}

/// Read-side facade shared by the HTTP handlers.
pub struct QueryService<S> {
    store: S,
    lanes: Vec<String>,
    /// Lowest queryable height. Requests below it are rejected rather than
    /// silently answered with an empty (and misleading) result.
    floor: u64,
}

impl<S: IndexStore> QueryService<S> {
    pub fn new(store: S, lanes: Vec<String>, floor: u64) -> Self {
        Self { store, lanes, floor }
    }

    pub fn lanes(&self) -> &[String] {
        &self.lanes
    }

    fn check_lane(&self, lane: &str) -> Result<(), QueryError> {
        if self.lanes.iter().any(|l| l == lane) {
            Ok(())
        } else {
            Err(QueryError::UnknownLane(lane.to_string()))
        }
    }

    /// A lane's checkpoint, if it has committed anything yet.
    pub async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, QueryError> {
        self.check_lane(lane)?;
        Ok(self.store.checkpoint(lane).await?)
    }

    /// A lane's committed height, if any.
    pub async fn latest_height(&self, lane: &str) -> Result<Option<u64>, QueryError> {
        Ok(self.checkpoint(lane).await?.map(|cp| cp.height))
    }

    /// Committed height per configured lane.
    pub async fn heights(&self) -> Result<BTreeMap<String, Option<u64>>, QueryError> {
        let mut out = BTreeMap::new();
        for lane in &self.lanes {
            let height = self.store.checkpoint(lane).await?.map(|cp| cp.height);
            out.insert(lane.clone(), height);
        }
        Ok(out)
    }

    /// The highest height every configured lane has committed, or `None`
    /// while any lane is still uninitialized.
    async fn visible_tip(&self) -> Result<Option<u64>, QueryError> {
        let mut tip: Option<u64> = None;
        for lane in &self.lanes {
            match self.store.checkpoint(lane).await? {
                Some(cp) => tip = Some(tip.map_or(cp.height, |t| t.min(cp.height))),
                None => return Ok(None),
            }
        }
        Ok(tip)
    }

    /// Events in `[from, to]`, clipped to the visible tip.
    ///
    /// Returns the events together with the effective upper bound actually
    /// served, so callers can resume from there.
    pub async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<(Vec<ShieldedEvent>, Option<u64>), QueryError> {
        if from < self.floor {
            return Err(QueryError::OutOfRange { from, floor: self.floor });
        }

        let tip = match self.visible_tip().await? {
            Some(tip) => tip,
            None => return Ok((vec![], None)),
        };

        let clipped = to.min(tip);
        if clipped < from {
            return Ok((vec![], Some(clipped)));
        }

        let events = self.store.events_in_range(from, clipped).await?;
        Ok((events, Some(clipped)))
    }
}
