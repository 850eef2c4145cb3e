//! maspindex-storage — durable PostgreSQL backend for MaspIndex.
//!
//! Implements the core [`IndexStore`](maspindex_core::store::IndexStore)
//! contract over `sqlx` with connection pooling. The in-memory backend used
//! for tests and ephemeral runs lives in `maspindex-core`.

pub mod postgres;

pub use postgres::{PostgresOptions, PostgresStore};
