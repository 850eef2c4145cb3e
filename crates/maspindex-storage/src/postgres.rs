//! PostgreSQL storage backend for MaspIndex.
//!
//! Persists blocks, shielded events, and per-lane checkpoints. Uses `sqlx`
//! with connection pooling for production deployments.
//!
//! # Schema
//! Created automatically on first connect:
//! - `masp_blocks` — one row per indexed block (height is the primary key)
//! - `masp_events` — shielded events, keyed by `(height, position)`
//! - `masp_checkpoints` — lane progress (lane → height + hash)
//!
//! `advance` runs as a single transaction. The checkpoint row is updated
//! with a `WHERE height = $expected` guard; zero rows affected means a peer
//! process moved the lane first, and the whole transaction rolls back.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use maspindex_core::checkpoint::Checkpoint;
use maspindex_core::error::IndexerError;
use maspindex_core::store::IndexStore;
use maspindex_core::types::{Block, EventKind, ShieldedEvent};

// ─── Connection options ──────────────────────────────────────────────────────

/// Connection options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresStore ───────────────────────────────────────────────────────────

/// PostgreSQL-backed [`IndexStore`].
///
/// Thread-safe and cheaply cloneable — wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to a PostgreSQL database and initialize the schema.
    ///
    /// The URL format follows libpq convention:
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, IndexerError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("PostgresStore connected and schema initialized");
        Ok(store)
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, IndexerError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("postgres connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they don't already exist.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS masp_blocks (
                height      BIGINT  PRIMARY KEY,
                hash        TEXT    NOT NULL,
                parent_hash TEXT    NOT NULL,
                time        BIGINT  NOT NULL,
                tx_count    INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS masp_events (
                height   BIGINT  NOT NULL,
                kind     TEXT    NOT NULL,
                position INTEGER NOT NULL,
                tx_index INTEGER NOT NULL,
                payload  BYTEA   NOT NULL,
                PRIMARY KEY (height, position)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS masp_checkpoints (
                lane       TEXT   PRIMARY KEY,
                height     BIGINT NOT NULL,
                hash       TEXT   NOT NULL,
                updated_at BIGINT NOT NULL DEFAULT EXTRACT(EPOCH FROM NOW())::BIGINT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_masp_events_kind
             ON masp_events(kind, height)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!("PostgresStore schema initialized");
        Ok(())
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_block(row: &sqlx::postgres::PgRow) -> Result<Block, IndexerError> {
    Ok(Block {
        height: row
            .try_get::<i64, _>("height")
            .map_err(|e| IndexerError::Storage(e.to_string()))? as u64,
        hash: row
            .try_get::<String, _>("hash")
            .map_err(|e| IndexerError::Storage(e.to_string()))?,
        parent_hash: row
            .try_get::<String, _>("parent_hash")
            .map_err(|e| IndexerError::Storage(e.to_string()))?,
        time: row
            .try_get::<i64, _>("time")
            .map_err(|e| IndexerError::Storage(e.to_string()))?,
        tx_count: row
            .try_get::<i32, _>("tx_count")
            .map_err(|e| IndexerError::Storage(e.to_string()))? as u32,
    })
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<ShieldedEvent, IndexerError> {
    let kind_text = row
        .try_get::<String, _>("kind")
        .map_err(|e| IndexerError::Storage(e.to_string()))?;
    let kind = EventKind::parse(&kind_text)
        .ok_or_else(|| IndexerError::Storage(format!("unknown stored event kind '{kind_text}'")))?;

    Ok(ShieldedEvent {
        height: row
            .try_get::<i64, _>("height")
            .map_err(|e| IndexerError::Storage(e.to_string()))? as u64,
        kind,
        position: row
            .try_get::<i32, _>("position")
            .map_err(|e| IndexerError::Storage(e.to_string()))? as u32,
        tx_index: row
            .try_get::<i32, _>("tx_index")
            .map_err(|e| IndexerError::Storage(e.to_string()))? as u32,
        payload: row
            .try_get::<Vec<u8>, _>("payload")
            .map_err(|e| IndexerError::Storage(e.to_string()))?,
    })
}

// ─── IndexStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for PostgresStore {
    async fn checkpoint(&self, lane: &str) -> Result<Option<Checkpoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT lane, height, hash, updated_at
             FROM masp_checkpoints
             WHERE lane = $1",
        )
        .bind(lane)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| {
            Ok(Checkpoint {
                lane: r
                    .try_get::<String, _>("lane")
                    .map_err(|e| IndexerError::Storage(e.to_string()))?,
                height: r
                    .try_get::<i64, _>("height")
                    .map_err(|e| IndexerError::Storage(e.to_string()))? as u64,
                hash: r
                    .try_get::<String, _>("hash")
                    .map_err(|e| IndexerError::Storage(e.to_string()))?,
                updated_at: r
                    .try_get::<i64, _>("updated_at")
                    .map_err(|e| IndexerError::Storage(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn advance(
        &self,
        lane: &str,
        expected: Option<u64>,
        block: &Block,
        events: &[ShieldedEvent],
    ) -> Result<(), IndexerError> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // Move the checkpoint first: its optimistic guard decides whether
        // the rest of the transaction is allowed to happen at all.
        let moved = match expected {
            Some(height) => sqlx::query(
                "UPDATE masp_checkpoints
                 SET height = $2, hash = $3, updated_at = $4
                 WHERE lane = $1 AND height = $5",
            )
            .bind(lane)
            .bind(block.height as i64)
            .bind(&block.hash)
            .bind(now)
            .bind(height as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?
            .rows_affected(),
            None => sqlx::query(
                "INSERT INTO masp_checkpoints (lane, height, hash, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (lane) DO NOTHING",
            )
            .bind(lane)
            .bind(block.height as i64)
            .bind(&block.hash)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?
            .rows_affected(),
        };

        if moved != 1 {
            drop(tx);
            let found = self.checkpoint(lane).await?.map(|cp| cp.height);
            return Err(IndexerError::StaleCheckpoint {
                lane: lane.to_string(),
                expected,
                found,
            });
        }

        // Block rows may be written by more than one lane; last write wins.
        sqlx::query(
            "INSERT INTO masp_blocks (height, hash, parent_hash, time, tx_count)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (height) DO UPDATE SET
                hash        = EXCLUDED.hash,
                parent_hash = EXCLUDED.parent_hash,
                time        = EXCLUDED.time,
                tx_count    = EXCLUDED.tx_count",
        )
        .bind(block.height as i64)
        .bind(&block.hash)
        .bind(&block.parent_hash)
        .bind(block.time)
        .bind(block.tx_count as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        for event in events {
            sqlx::query(
                "INSERT INTO masp_events (height, kind, position, tx_index, payload)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (height, position) DO NOTHING",
            )
            .bind(event.height as i64)
            .bind(event.kind.as_str())
            .bind(event.position as i32)
            .bind(event.tx_index as i32)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(format!("commit advance: {e}")))?;

        debug!(
            lane,
            height = block.height,
            events = events.len(),
            "checkpoint advanced"
        );
        Ok(())
    }

    async fn rewind(&self, lane: &str, to_height: u64) -> Result<u64, IndexerError> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let anchor = sqlx::query("SELECT hash FROM masp_blocks WHERE height = $1")
            .bind(to_height as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?
            .ok_or_else(|| {
                IndexerError::Storage(format!("no stored block at rewind target {to_height}"))
            })?;
        let anchor_hash = anchor
            .try_get::<String, _>("hash")
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let purged = sqlx::query("DELETE FROM masp_events WHERE height > $1")
            .bind(to_height as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?
            .rows_affected();

        sqlx::query("DELETE FROM masp_blocks WHERE height > $1")
            .bind(to_height as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO masp_checkpoints (lane, height, hash, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (lane) DO UPDATE SET
                height     = EXCLUDED.height,
                hash       = EXCLUDED.hash,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(lane)
        .bind(to_height as i64)
        .bind(&anchor_hash)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(format!("commit rewind: {e}")))?;

        info!(lane, to_height, purged, "rewound lane");
        Ok(purged)
    }

    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        let row = sqlx::query(
            "SELECT height, hash, parent_hash, time, tx_count
             FROM masp_blocks
             WHERE height = $1",
        )
        .bind(height as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        row.map(|r| row_to_block(&r)).transpose()
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ShieldedEvent>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            "SELECT height, kind, position, tx_index, payload
             FROM masp_events
             WHERE height >= $1 AND height <= $2
             ORDER BY height ASC, position ASC",
        )
        .bind(from as i64)
        .bind(to as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }
}
