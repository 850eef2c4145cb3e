//! Shared types for the shielded-pool indexing pipeline.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block header summary — enough for the crawler to track hash continuity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: u64,
    /// Block hash (opaque, as reported by the chain).
    pub hash: String,
    /// Parent block hash.
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub time: i64,
    /// Number of transactions in the block.
    pub tx_count: u32,
}

impl Block {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &Block) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

// ─── ShieldedEvent ───────────────────────────────────────────────────────────

/// Kind of shielded-pool artifact carried by an indexed event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A note commitment appended to the commitment tree.
    Commitment,
    /// A revealed nullifier.
    Nullifier,
    /// An asset conversion entry.
    Conversion,
    /// A shielded-pool balance delta.
    PoolBalance,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commitment => "commitment",
            Self::Nullifier => "nullifier",
            Self::Conversion => "conversion",
            Self::PoolBalance => "pool_balance",
        }
    }

    /// Parse a stored kind string back into an `EventKind`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "commitment" => Some(Self::Commitment),
            "nullifier" => Some(Self::Nullifier),
            "conversion" => Some(Self::Conversion),
            "pool_balance" => Some(Self::PoolBalance),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single shielded-pool record extracted from a block.
///
/// Owned by its block: rolled back together with it on reorg.
/// `(height, position)` is unique; `position` increases monotonically
/// across the whole block, preserving transaction and intra-transaction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedEvent {
    pub height: u64,
    pub kind: EventKind,
    /// Position within the block (block-wide ordering).
    pub position: u32,
    /// Index of the source transaction within the block.
    pub tx_index: u32,
    /// Opaque payload bytes (hex-encoded on the wire).
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ─── Execution results ───────────────────────────────────────────────────────

/// A single ABCI event emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    /// Event type string (e.g. `"masp/commitment"`).
    pub kind: String,
    /// Key/value attribute pairs, in emission order.
    pub attributes: Vec<(String, String)>,
}

impl AbciEvent {
    /// Look up an attribute value by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Execution results of one transaction, in block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResults {
    /// Transaction index within the block.
    pub index: u32,
    /// ABCI events emitted by this transaction, in emission order.
    pub events: Vec<AbciEvent>,
}

/// Execution results of a whole block, as reported by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResults {
    pub height: u64,
    pub txs: Vec<TxResults>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
