//! The crawler loop — the core ingestion state machine.
//!
//! Per cycle, starting from the lane's checkpoint `(H, Hc)`:
//!
//! 1. **Fetching** — request block `H+1`. Not found = not yet at tip; back
//!    off for the poll interval (normal, not an error).
//! 2. **Validating** — the fetched block's `parent_hash` must equal `Hc`.
//!    A mismatch enters **Reconciling**: walk backward from `H` comparing
//!    stored hashes against the chain's current view until the fork point,
//!    rewind the lane there, then resume from `fork_point + 1`. The walk is
//!    bounded by `max_reorg_depth`; exceeding it is fatal.
//! 3. **Extracting** — pure extraction of shielded events; any extraction
//!    failure is fatal for the height, never skipped.
//! 4. **Committing** — one atomic `advance` of block + events + checkpoint.
//!    Losing the optimistic-concurrency race just means a peer advanced the
//!    lane first: re-read and restart the cycle.
//!
//! Transient failures back off exponentially with unlimited retries; fatal
//! errors halt the lane with the checkpoint untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::checkpoint::{Checkpoint, CRAWLER_LANE};
use crate::error::IndexerError;
use crate::extract::extract_events;
use crate::reader::{ChainReader, ReadError};
use crate::store::IndexStore;

/// Runtime state of the crawler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerState {
    Idle,
    Fetching,
    Validating,
    Extracting,
    Committing,
    /// Walking backward to find the fork point after a reorg.
    Reconciling,
    /// Sleeping after a transient failure or while waiting at the tip.
    Backoff,
}

impl std::fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Committing => "committing",
            Self::Reconciling => "reconciling",
            Self::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// Configuration for one crawler lane.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Lane whose checkpoint this crawler owns.
    pub lane: String,
    /// Height below which nothing is indexed; ingestion starts at
    /// `bootstrap_height + 1`.
    pub bootstrap_height: u64,
    /// Maximum reconciliation depth before a reorg is considered fatal.
    pub max_reorg_depth: u64,
    /// Sleep between polls while waiting at the chain tip.
    pub poll_interval: Duration,
    /// Initial delay for transient-failure backoff.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            lane: CRAWLER_LANE.into(),
            bootstrap_height: 0,
            max_reorg_depth: 64,
            poll_interval: Duration::from_millis(2000),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Outcome of one crawl cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new block was committed at this height.
    Advanced(u64),
    /// The chain has no block above the checkpoint yet.
    AtTip,
    /// A reorg was detected; the lane was rewound to the fork point.
    Reorged { fork_point: u64 },
    /// A peer process advanced the lane first; re-read and retry.
    Stale,
}

/// Crawls the chain height by height, committing each block atomically.
pub struct Crawler<R, S> {
    config: CrawlerConfig,
    reader: R,
    store: S,
    state: CrawlerState,
    backoff: Backoff,
    shutdown: Arc<AtomicBool>,
}

impl<R: ChainReader, S: IndexStore> Crawler<R, S> {
    pub fn new(config: CrawlerConfig, reader: R, store: S) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        Self {
            config,
            reader,
            store,
            state: CrawlerState::Idle,
            backoff,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting graceful shutdown; checked between cycles, so
    /// the in-flight commit either completes or fully aborts.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> CrawlerState {
        self.state
    }

    /// Run until shutdown or a fatal error.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        tracing::info!(lane = %self.config.lane, "starting crawler");
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!(lane = %self.config.lane, "shutdown requested, stopping");
                self.state = CrawlerState::Idle;
                return Ok(());
            }

            match self.cycle().await {
                Ok(CycleOutcome::Advanced(_)) | Ok(CycleOutcome::Reorged { .. }) => {
                    self.backoff.reset();
                }
                Ok(CycleOutcome::Stale) => {
                    // A peer progressed the lane; loop re-reads immediately.
                }
                Ok(CycleOutcome::AtTip) => {
                    self.state = CrawlerState::Backoff;
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) if e.is_transient() => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        lane = %self.config.lane,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    self.state = CrawlerState::Backoff;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(lane = %self.config.lane, error = %e, "fatal ingestion error");
                    self.state = CrawlerState::Idle;
                    return Err(e);
                }
            }
            self.state = CrawlerState::Idle;
        }
    }

    /// Run exactly one fetch/validate/extract/commit cycle.
    pub async fn cycle(&mut self) -> Result<CycleOutcome, IndexerError> {
        let checkpoint = self.store.checkpoint(&self.config.lane).await?;
        let next_height = checkpoint
            .as_ref()
            .map(Checkpoint::next_height)
            .unwrap_or(self.config.bootstrap_height + 1);

        self.state = CrawlerState::Fetching;
        let block = match self.reader.block(next_height).await {
            Ok(block) => block,
            Err(ReadError::NotFound { .. }) => return Ok(CycleOutcome::AtTip),
            Err(e) => return Err(e.into()),
        };

        self.state = CrawlerState::Validating;
        if let Some(cp) = &checkpoint {
            if block.parent_hash != cp.hash {
                self.state = CrawlerState::Reconciling;
                tracing::warn!(
                    lane = %self.config.lane,
                    height = block.height,
                    expected_parent = %cp.hash,
                    actual_parent = %block.parent_hash,
                    "parent hash mismatch, chain reorganized"
                );
                let fork_point = self.find_fork_point(cp).await?;
                let purged = self.store.rewind(&self.config.lane, fork_point).await?;
                tracing::warn!(
                    lane = %self.config.lane,
                    fork_point,
                    purged_events = purged,
                    "rewound lane to fork point"
                );
                return Ok(CycleOutcome::Reorged { fork_point });
            }
        }

        self.state = CrawlerState::Extracting;
        let results = self
            .reader
            .block_results(next_height)
            .await
            .map_err(IndexerError::from)?;
        let events = extract_events(&block, &results)?;

        self.state = CrawlerState::Committing;
        let expected = checkpoint.as_ref().map(|cp| cp.height);
        match self
            .store
            .advance(&self.config.lane, expected, &block, &events)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    lane = %self.config.lane,
                    height = block.height,
                    hash = %block.hash,
                    events = events.len(),
                    "committed block"
                );
                Ok(CycleOutcome::Advanced(block.height))
            }
            Err(IndexerError::StaleCheckpoint { .. }) => {
                tracing::debug!(
                    lane = %self.config.lane,
                    height = block.height,
                    "lost the advance race to a peer, re-reading checkpoint"
                );
                Ok(CycleOutcome::Stale)
            }
            Err(e) => Err(e),
        }
    }

    /// Walk backward from the checkpoint comparing stored hashes against the
    /// chain's current view; the highest matching height is the fork point.
    async fn find_fork_point(&self, cp: &Checkpoint) -> Result<u64, IndexerError> {
        // Stored blocks exist from bootstrap_height + 1 upward; the walk
        // never descends past that floor or the depth ceiling.
        let lowest = cp
            .height
            .saturating_sub(self.config.max_reorg_depth)
            .max(self.config.bootstrap_height + 1);

        let mut height = cp.height;
        loop {
            let stored = self.store.block_at(height).await?.ok_or_else(|| {
                IndexerError::Storage(format!(
                    "no stored block at height {height} during reconciliation"
                ))
            })?;

            let matches = match self.reader.block(height).await {
                Ok(chain_block) => chain_block.hash == stored.hash,
                // The reorganized chain may be shorter than our index.
                Err(ReadError::NotFound { .. }) => false,
                Err(e) => return Err(e.into()),
            };
            if matches {
                return Ok(height);
            }
            if height == lowest {
                return Err(IndexerError::ReorgTooDeep {
                    height: cp.height,
                    max_depth: self.config.max_reorg_depth,
                });
            }
            height -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{COMMITMENT_EVENT, NULLIFIER_EVENT};
    use crate::store::MemoryStore;
    use crate::types::{AbciEvent, Block, BlockResults, EventKind, ShieldedEvent, TxResults};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// A scripted in-memory chain the tests mutate to simulate growth and
    /// reorgs.
    #[derive(Default)]
    struct ScriptedChain {
        inner: Mutex<ChainInner>,
    }

    #[derive(Default)]
    struct ChainInner {
        blocks: BTreeMap<u64, Block>,
        results: BTreeMap<u64, BlockResults>,
    }

    impl ScriptedChain {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn put(&self, block: Block, results: BlockResults) {
            let mut inner = self.inner.lock().unwrap();
            inner.results.insert(block.height, results);
            inner.blocks.insert(block.height, block);
        }

        fn put_empty(&self, block: Block) {
            let results = BlockResults { height: block.height, txs: vec![] };
            self.put(block, results);
        }

        /// Drop every block at or above `height` (pre-reorg truncation).
        fn truncate_from(&self, height: u64) {
            let mut inner = self.inner.lock().unwrap();
            inner.blocks.retain(|h, _| *h < height);
            inner.results.retain(|h, _| *h < height);
        }
    }

    #[async_trait]
    impl ChainReader for ScriptedChain {
        async fn latest_height(&self) -> Result<u64, ReadError> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .blocks
                .keys()
                .next_back()
                .copied()
                .unwrap_or(0))
        }

        async fn block(&self, height: u64) -> Result<Block, ReadError> {
            self.inner
                .lock()
                .unwrap()
                .blocks
                .get(&height)
                .cloned()
                .ok_or(ReadError::NotFound { height })
        }

        async fn block_results(&self, height: u64) -> Result<BlockResults, ReadError> {
            self.inner
                .lock()
                .unwrap()
                .results
                .get(&height)
                .cloned()
                .ok_or(ReadError::NotFound { height })
        }
    }

    fn blk(height: u64, hash: &str, parent: &str) -> Block {
        Block {
            height,
            hash: hash.into(),
            parent_hash: parent.into(),
            time: height as i64 * 6,
            tx_count: 0,
        }
    }

    fn masp_tx(index: u32, payloads: &[(&str, &str)]) -> TxResults {
        TxResults {
            index,
            events: payloads
                .iter()
                .map(|(kind, data)| AbciEvent {
                    kind: kind.to_string(),
                    attributes: vec![("data".into(), data.to_string())],
                })
                .collect(),
        }
    }

    fn config(bootstrap: u64) -> CrawlerConfig {
        CrawlerConfig {
            bootstrap_height: bootstrap,
            max_reorg_depth: 8,
            poll_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
            ..CrawlerConfig::default()
        }
    }

    /// Extend the chain with a linear run of empty blocks `[from..=to]`.
    fn extend_linear(chain: &ScriptedChain, from: u64, to: u64) {
        for h in from..=to {
            chain.put_empty(blk(h, &format!("hash{h}"), &format!("hash{}", h - 1)));
        }
    }

    // Scenario A: bootstrap at 100 with empty checkpoint; chain tip at 100;
    // block 101 appears with no shielded txs; checkpoint advances to 101.
    #[tokio::test]
    async fn bootstrap_waits_at_tip_then_advances() {
        let chain = ScriptedChain::new();
        chain.put_empty(blk(100, "hash100", "hash99"));
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(100), Arc::clone(&chain), Arc::clone(&store));

        // tip is at 100, block 101 does not exist yet
        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::AtTip);
        assert!(store.checkpoint(CRAWLER_LANE).await.unwrap().is_none());

        chain.put_empty(blk(101, "hash101", "hash100"));
        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::Advanced(101));

        let cp = store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap();
        assert_eq!((cp.height, cp.hash.as_str()), (101, "hash101"));
        assert_eq!(store.event_count(), 0);
    }

    // Scenario B: block 105 carries two shielded txs, each with one
    // commitment and one nullifier; the committed range query returns all
    // four in transaction/position order.
    #[tokio::test]
    async fn extracts_events_in_order() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 101, 104);
        chain.put(
            blk(105, "hash105", "hash104"),
            BlockResults {
                height: 105,
                txs: vec![
                    masp_tx(0, &[(COMMITMENT_EVENT, "c0"), (NULLIFIER_EVENT, "f0")]),
                    masp_tx(1, &[(COMMITMENT_EVENT, "c1"), (NULLIFIER_EVENT, "f1")]),
                ],
            },
        );

        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(100), Arc::clone(&chain), Arc::clone(&store));
        for expected in 101..=105 {
            assert_eq!(
                crawler.cycle().await.unwrap(),
                CycleOutcome::Advanced(expected)
            );
        }

        let events = store.events_in_range(105, 105).await.unwrap();
        assert_eq!(events.len(), 4);
        let shape: Vec<_> = events
            .iter()
            .map(|e| (e.tx_index, e.position, e.kind))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, 0, EventKind::Commitment),
                (0, 1, EventKind::Nullifier),
                (1, 2, EventKind::Commitment),
                (1, 3, EventKind::Nullifier),
            ]
        );
    }

    // Continuity: every committed block's parent_hash equals the stored
    // hash at the previous height.
    #[tokio::test]
    async fn continuity_holds_over_a_run() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 1, 20);
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}

        for h in 2..=20 {
            let block = store.block_at(h).await.unwrap().unwrap();
            let parent = store.block_at(h - 1).await.unwrap().unwrap();
            assert!(block.extends(&parent), "continuity broken at {h}");
        }
    }

    // Idempotence: cycling against an unchanged tip produces no new rows
    // and no checkpoint movement.
    #[tokio::test]
    async fn replay_at_tip_changes_nothing() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 1, 5);
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}

        let cp_before = store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap();
        let blocks_before = store.block_count();

        for _ in 0..3 {
            assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::AtTip);
        }

        let cp_after = store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap();
        assert_eq!(cp_before.height, cp_after.height);
        assert_eq!(cp_before.hash, cp_after.hash);
        assert_eq!(store.block_count(), blocks_before);
    }

    // Scenario C: checkpoint at (200, hashA); the chain now reports block
    // 200 with hashB and block 199 still matching. Rewind to 199, re-ingest
    // 200; final stored 200 has hashB.
    #[tokio::test]
    async fn reorg_rewinds_to_fork_point_and_reingests() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 196, 199);
        chain.put(
            blk(200, "hashA", "hash199"),
            BlockResults {
                height: 200,
                txs: vec![masp_tx(0, &[(COMMITMENT_EVENT, "aa")])],
            },
        );

        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(195), Arc::clone(&chain), Arc::clone(&store));
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}
        assert_eq!(
            store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap().hash,
            "hashA"
        );
        assert_eq!(store.event_count(), 1);

        // Reorg below 200: the chain replaces block 200 and extends on top.
        chain.truncate_from(200);
        chain.put(
            blk(200, "hashB", "hash199"),
            BlockResults {
                height: 200,
                txs: vec![masp_tx(0, &[(NULLIFIER_EVENT, "bb")])],
            },
        );
        chain.put_empty(blk(201, "hash201b", "hashB"));

        // next fetch is 201; its parent hashB mismatches stored hashA
        assert_eq!(
            crawler.cycle().await.unwrap(),
            CycleOutcome::Reorged { fork_point: 199 }
        );
        // discarded fork's events are gone
        assert_eq!(store.event_count(), 0);

        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::Advanced(200));
        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::Advanced(201));

        let stored = store.block_at(200).await.unwrap().unwrap();
        assert_eq!(stored.hash, "hashB");
        let events = store.events_in_range(200, 200).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Nullifier);
    }

    // Reorg correctness: nothing from the discarded fork survives, and the
    // post-reorg chain is stored from the fork point onward.
    #[tokio::test]
    async fn deep_fork_replaces_all_divergent_blocks() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 1, 10);
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}

        // Divergent fork from height 7
        chain.truncate_from(7);
        let mut parent = "hash6".to_string();
        for h in 7..=11 {
            let hash = format!("fork{h}");
            chain.put_empty(blk(h, &hash, &parent));
            parent = hash;
        }

        assert_eq!(
            crawler.cycle().await.unwrap(),
            CycleOutcome::Reorged { fork_point: 6 }
        );
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}

        for h in 7..=11 {
            let stored = store.block_at(h).await.unwrap().unwrap();
            assert_eq!(stored.hash, format!("fork{h}"), "stale fork block at {h}");
        }
        assert_eq!(store.block_count(), 11);
    }

    #[tokio::test]
    async fn reorg_deeper_than_ceiling_is_fatal() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 1, 20);
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));
        while crawler.cycle().await.unwrap() != CycleOutcome::AtTip {}
        let cp_before = store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap();

        // Replace everything: no stored hash within max_reorg_depth matches.
        chain.truncate_from(1);
        let mut parent = "hash0".to_string();
        for h in 1..=21 {
            let hash = format!("fork{h}");
            chain.put_empty(blk(h, &hash, &parent));
            parent = hash;
        }

        let err = crawler.cycle().await.unwrap_err();
        assert!(matches!(err, IndexerError::ReorgTooDeep { max_depth: 8, .. }));

        // checkpoint untouched, safe to resume after operator intervention
        let cp_after = store.checkpoint(CRAWLER_LANE).await.unwrap().unwrap();
        assert_eq!(cp_before.height, cp_after.height);
        assert_eq!(cp_before.hash, cp_after.hash);
    }

    #[tokio::test]
    async fn extraction_error_is_fatal_and_commits_nothing() {
        let chain = ScriptedChain::new();
        chain.put(
            blk(1, "hash1", "hash0"),
            BlockResults {
                height: 1,
                txs: vec![masp_tx(0, &[(COMMITMENT_EVENT, "zz-not-hex")])],
            },
        );
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));

        let err = crawler.cycle().await.unwrap_err();
        assert!(matches!(err, IndexerError::Extraction { height: 1, .. }));
        assert!(store.checkpoint(CRAWLER_LANE).await.unwrap().is_none());
        assert_eq!(store.block_count(), 0);
    }

    /// Store wrapper that lets a simulated peer win the advance race once.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        fired: AtomicBool,
    }

    #[async_trait]
    impl IndexStore for RacingStore {
        async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, IndexerError> {
            self.inner.checkpoint(lane).await
        }

        async fn advance(
            &self,
            lane: &str,
            expected: Option<u64>,
            block: &Block,
            events: &[ShieldedEvent],
        ) -> Result<(), IndexerError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                // The peer commits the identical block first.
                self.inner.advance(lane, expected, block, events).await?;
            }
            self.inner.advance(lane, expected, block, events).await
        }

        async fn rewind(&self, lane: &str, to_height: u64) -> Result<u64, IndexerError> {
            self.inner.rewind(lane, to_height).await
        }

        async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
            self.inner.block_at(height).await
        }

        async fn events_in_range(
            &self,
            from: u64,
            to: u64,
        ) -> Result<Vec<ShieldedEvent>, IndexerError> {
            self.inner.events_in_range(from, to).await
        }
    }

    // Scenario D: two instances race to advance the same lane 300 -> 301;
    // exactly one commit wins, the loser observes the stale checkpoint and
    // retries without duplicating rows.
    #[tokio::test]
    async fn losing_the_advance_race_retries_cleanly() {
        let chain = ScriptedChain::new();
        chain.put_empty(blk(300, "hash300", "hash299"));
        chain.put(
            blk(301, "hash301", "hash300"),
            BlockResults {
                height: 301,
                txs: vec![masp_tx(0, &[(COMMITMENT_EVENT, "ee")])],
            },
        );
        chain.put_empty(blk(302, "hash302", "hash301"));

        let memory = Arc::new(MemoryStore::new());
        memory
            .advance(CRAWLER_LANE, None, &blk(300, "hash300", "hash299"), &[])
            .await
            .unwrap();

        let store = RacingStore {
            inner: Arc::clone(&memory),
            fired: AtomicBool::new(false),
        };
        let mut crawler = Crawler::new(config(299), Arc::clone(&chain), store);

        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::Stale);
        // the peer's commit is the only one that landed
        assert_eq!(memory.event_count(), 1);
        assert_eq!(
            memory.checkpoint(CRAWLER_LANE).await.unwrap().unwrap().height,
            301
        );

        assert_eq!(crawler.cycle().await.unwrap(), CycleOutcome::Advanced(302));
        assert_eq!(memory.event_count(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let chain = ScriptedChain::new();
        extend_linear(&chain, 1, 3);
        let store = Arc::new(MemoryStore::new());
        let mut crawler = Crawler::new(config(0), Arc::clone(&chain), Arc::clone(&store));

        let shutdown = crawler.shutdown_handle();
        shutdown.store(true, Ordering::Relaxed);
        crawler.run().await.unwrap();
        assert_eq!(crawler.state(), CrawlerState::Idle);
    }
}
