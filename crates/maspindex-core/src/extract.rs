//! Event extraction — maps a block plus its execution results into an
//! ordered sequence of shielded-pool records.
//!
//! Pure and deterministic: no I/O, no clock. Transaction order within the
//! block and event order within a transaction are preserved through a single
//! block-wide `position` counter. Transactions without shielded-pool events
//! yield nothing; a recognized event with an undecodable payload is fatal for
//! the height — the crawler never guesses at corrupt data.

use crate::error::IndexerError;
use crate::types::{Block, BlockResults, EventKind, ShieldedEvent};

/// ABCI event type emitted for a note commitment.
pub const COMMITMENT_EVENT: &str = "masp/commitment";
/// ABCI event type emitted for a revealed nullifier.
pub const NULLIFIER_EVENT: &str = "masp/nullifier";
/// ABCI event type emitted for an asset conversion.
pub const CONVERSION_EVENT: &str = "masp/conversion";
/// ABCI event type emitted for a pool balance delta.
pub const POOL_BALANCE_EVENT: &str = "masp/pool_balance";

/// Attribute key carrying the hex-encoded payload.
const DATA_ATTRIBUTE: &str = "data";

fn kind_of(abci_type: &str) -> Option<EventKind> {
    match abci_type {
        COMMITMENT_EVENT => Some(EventKind::Commitment),
        NULLIFIER_EVENT => Some(EventKind::Nullifier),
        CONVERSION_EVENT => Some(EventKind::Conversion),
        POOL_BALANCE_EVENT => Some(EventKind::PoolBalance),
        _ => None,
    }
}

/// Extract all shielded-pool events from a block's execution results.
///
/// Returns events ordered by `(tx_index, position)`; `position` is unique
/// across the whole block.
pub fn extract_events(
    block: &Block,
    results: &BlockResults,
) -> Result<Vec<ShieldedEvent>, IndexerError> {
    if results.height != block.height {
        return Err(IndexerError::Extraction {
            height: block.height,
            reason: format!(
                "execution results are for height {}, block is at height {}",
                results.height, block.height
            ),
        });
    }

    let mut events = Vec::new();
    let mut position: u32 = 0;

    for tx in &results.txs {
        for abci_event in &tx.events {
            let Some(kind) = kind_of(&abci_event.kind) else {
                continue;
            };

            let data = abci_event.attribute(DATA_ATTRIBUTE).ok_or_else(|| {
                IndexerError::Extraction {
                    height: block.height,
                    reason: format!(
                        "{} event in tx {} is missing its '{DATA_ATTRIBUTE}' attribute",
                        abci_event.kind, tx.index
                    ),
                }
            })?;

            let payload = hex::decode(data).map_err(|e| IndexerError::Extraction {
                height: block.height,
                reason: format!(
                    "{} event in tx {} has a non-hex payload: {e}",
                    abci_event.kind, tx.index
                ),
            })?;

            events.push(ShieldedEvent {
                height: block.height,
                kind,
                position,
                tx_index: tx.index,
                payload,
            });
            position += 1;
        }
    }

    Ok(events)
}
