//! maspindex-server — checkpoint-consistent query layer and HTTP API.
//!
//! [`QueryService`] clips every read to the lowest committed checkpoint
//! across the configured lanes; [`router`] exposes it over axum.

pub mod http;
pub mod service;

pub use http::{router, serve, ApiContext};
pub use service::{QueryError, QueryService};
