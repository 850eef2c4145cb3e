//! CometBFT JSON-RPC response shapes and their mapping onto core types.
//!
//! Attribute keys and values are plain UTF-8 strings (CometBFT >= 0.37).

use maspindex_core::reader::ReadError;
use maspindex_core::types::{AbciEvent, Block, BlockResults, TxResults};
use serde::Deserialize;

// ─── Envelope ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl RpcError {
    /// CometBFT reports heights beyond the tip as internal errors with a
    /// recognizable message rather than a dedicated code.
    pub fn is_height_not_found(&self) -> bool {
        let text = match &self.data {
            Some(data) => format!("{} {}", self.message, data),
            None => self.message.clone(),
        };
        text.contains("must be less than or equal to")
            || text.contains("could not find results")
            || text.contains("height is not available")
    }
}

// ─── /status ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncInfo {
    pub latest_block_height: String,
}

// ─── /block ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResult {
    pub block_id: BlockId,
    pub block: BlockBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockId {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockBody {
    pub header: Header,
    pub data: BlockData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub height: String,
    pub time: String,
    pub last_block_id: Option<BlockId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockData {
    #[serde(default)]
    pub txs: Vec<String>,
}

// ─── /block_results ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResultsResult {
    pub height: String,
    #[serde(default)]
    pub txs_results: Option<Vec<WireTxResult>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTxResult {
    #[serde(default)]
    pub events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

// ─── Conversions ─────────────────────────────────────────────────────────────

fn parse_height(s: &str, requested: u64) -> Result<u64, ReadError> {
    s.parse::<u64>().map_err(|_| ReadError::Malformed {
        height: requested,
        reason: format!("unparseable height string '{s}'"),
    })
}

impl BlockResult {
    pub fn into_block(self, requested: u64) -> Result<Block, ReadError> {
        let height = parse_height(&self.block.header.height, requested)?;
        if height != requested {
            return Err(ReadError::Malformed {
                height: requested,
                reason: format!("node answered with block at height {height}"),
            });
        }

        let time = chrono::DateTime::parse_from_rfc3339(&self.block.header.time)
            .map_err(|e| ReadError::Malformed {
                height: requested,
                reason: format!("unparseable block time: {e}"),
            })?
            .timestamp();

        Ok(Block {
            height,
            hash: self.block_id.hash,
            parent_hash: self
                .block
                .header
                .last_block_id
                .map(|id| id.hash)
                .unwrap_or_default(),
            time,
            tx_count: self.block.data.txs.len() as u32,
        })
    }
}

impl BlockResultsResult {
    pub fn into_block_results(self, requested: u64) -> Result<BlockResults, ReadError> {
        let height = parse_height(&self.height, requested)?;
        if height != requested {
            return Err(ReadError::Malformed {
                height: requested,
                reason: format!("node answered with results for height {height}"),
            });
        }

        let txs = self
            .txs_results
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, tx)| TxResults {
                index: index as u32,
                events: tx
                    .events
                    .into_iter()
                    .map(|event| AbciEvent {
                        kind: event.kind,
                        attributes: event
                            .attributes
                            .into_iter()
                            .map(|attr| (attr.key, attr.value.unwrap_or_default()))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(BlockResults { height, txs })
    }
}
