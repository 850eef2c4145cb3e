//! maspindexd — crawl a chain's shielded-pool events into Postgres and
//! serve them over HTTP.
//!
//! # Commands
//! ```bash
//! maspindexd crawl --rpc-url http://localhost:26657 \
//!                  --database-url postgresql://localhost/maspindex \
//!                  --bootstrap-height 100000
//! maspindexd serve --database-url postgresql://localhost/maspindex \
//!                  --listen 0.0.0.0:5000
//! ```

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use maspindex_core::crawler::{Crawler, CrawlerConfig};
use maspindex_rpc::CometClient;
use maspindex_server::{ApiContext, QueryService};
use maspindex_storage::PostgresStore;

#[derive(Parser)]
#[command(
    name = "maspindexd",
    about = "Shielded-pool event indexer for Tendermint-family chains",
    long_about = "
maspindexd ingests MASP events (note commitments, nullifiers, allowed
conversions, pool balance changes) from a CometBFT node into PostgreSQL,
tracking progress with per-lane checkpoints that survive restarts and
chain reorganizations.

ENVIRONMENT VARIABLES:
  MASPINDEX_RPC_URL        CometBFT JSON-RPC endpoint
  MASPINDEX_DATABASE_URL   PostgreSQL connection URL
  RUST_LOG                 Log filter (default: info)
",
    version
)]
struct Cli {
    /// Log filter, e.g. "info" or "debug,sqlx=warn" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the crawler: ingest blocks and shielded events from the chain
    Crawl {
        /// CometBFT JSON-RPC endpoint
        #[arg(long, env = "MASPINDEX_RPC_URL")]
        rpc_url: String,

        /// PostgreSQL connection URL
        #[arg(long, env = "MASPINDEX_DATABASE_URL")]
        database_url: String,

        /// Checkpoint lane this crawler owns
        #[arg(long, default_value = "crawler")]
        lane: String,

        /// Height indexing starts above (the first indexed block is
        /// bootstrap-height + 1)
        #[arg(long, default_value_t = 0)]
        bootstrap_height: u64,

        /// Deepest reorg the crawler will reconcile before halting
        #[arg(long, default_value_t = 64)]
        max_reorg_depth: u64,

        /// Delay between polls while caught up with the tip (milliseconds)
        #[arg(long, default_value_t = 2000)]
        poll_interval_ms: u64,

        /// Initial backoff after a transient failure (milliseconds)
        #[arg(long, default_value_t = 500)]
        backoff_base_ms: u64,

        /// Backoff ceiling (milliseconds)
        #[arg(long, default_value_t = 30_000)]
        backoff_max_ms: u64,
    },

    /// Serve indexed events over HTTP
    Serve {
        /// PostgreSQL connection URL
        #[arg(long, env = "MASPINDEX_DATABASE_URL")]
        database_url: String,

        /// Listen address
        #[arg(long, default_value = "0.0.0.0:5000")]
        listen: SocketAddr,

        /// Lanes whose checkpoints bound the visible tip
        #[arg(long, default_value = "crawler", value_delimiter = ',')]
        lanes: Vec<String>,

        /// Lane whose checkpoint freshness decides /health
        #[arg(long, default_value = "crawler")]
        health_lane: String,

        /// Lowest queryable height (matches the crawler's bootstrap height)
        #[arg(long, default_value_t = 0)]
        bootstrap_height: u64,

        /// /health reports stale once the checkpoint is older than this
        /// (seconds)
        #[arg(long, default_value_t = 60)]
        stale_after_secs: u64,
    },
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());
    info!(version = env!("CARGO_PKG_VERSION"), "maspindexd starting");

    match cli.command {
        Commands::Crawl {
            rpc_url,
            database_url,
            lane,
            bootstrap_height,
            max_reorg_depth,
            poll_interval_ms,
            backoff_base_ms,
            backoff_max_ms,
        } => {
            let store = PostgresStore::connect(&database_url)
                .await
                .context("connecting to PostgreSQL")?;
            let reader = CometClient::new(rpc_url);

            let config = CrawlerConfig {
                lane,
                bootstrap_height,
                max_reorg_depth,
                poll_interval: Duration::from_millis(poll_interval_ms),
                backoff_base: Duration::from_millis(backoff_base_ms),
                backoff_max: Duration::from_millis(backoff_max_ms),
            };
            let mut crawler = Crawler::new(config, reader, store);

            let shutdown = crawler.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    shutdown.store(true, Ordering::SeqCst);
                }
            });

            crawler.run().await.context("crawler halted")?;
            info!("crawler stopped");
            Ok(())
        }

        Commands::Serve {
            database_url,
            listen,
            lanes,
            health_lane,
            bootstrap_height,
            stale_after_secs,
        } => {
            let store = PostgresStore::connect(&database_url)
                .await
                .context("connecting to PostgreSQL")?;

            let floor = bootstrap_height.saturating_add(1);
            let service = QueryService::new(store, lanes, floor);
            let router = maspindex_server::router(ApiContext {
                service: Arc::new(service),
                health_lane,
                stale_after: Duration::from_secs(stale_after_secs),
            });

            maspindex_server::serve(router, listen)
                .await
                .context("query API server failed")?;
            Ok(())
        }
    }
}
