//! maspindex-core — foundation of the reorg-safe shielded-pool indexer.
//!
//! # Architecture
//!
//! ```text
//! Crawler (state machine)
//!     ├── ChainReader   (remote node view: block / block_results / tip)
//!     ├── extract       (pure block + results → ShieldedEvent sequence)
//!     ├── IndexStore    (atomic block + events + checkpoint commits)
//!     └── Backoff       (unlimited transient-failure retry)
//! ```
//!
//! Every committed height satisfies hash continuity with its predecessor;
//! reorgs are repaired by a bounded backward walk to the fork point followed
//! by an atomic rewind.

pub mod backoff;
pub mod checkpoint;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod reader;
pub mod store;
pub mod types;

pub use backoff::Backoff;
pub use checkpoint::{Checkpoint, BLOCK_INDEX_LANE, CRAWLER_LANE};
pub use crawler::{Crawler, CrawlerConfig, CrawlerState, CycleOutcome};
pub use error::IndexerError;
pub use extract::extract_events;
pub use reader::{ChainReader, ReadError};
pub use store::{IndexStore, MemoryStore};
pub use types::{AbciEvent, Block, BlockResults, EventKind, ShieldedEvent, TxResults};
