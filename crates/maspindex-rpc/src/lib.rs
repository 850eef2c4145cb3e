//! maspindex-rpc — CometBFT JSON-RPC implementation of the core
//! [`ChainReader`](maspindex_core::reader::ChainReader) contract.

mod client;
mod wire;

pub use client::CometClient;
