//! HTTP client for an Arweave-compatible gateway.
//!
//! Implements the read-only collaborators of the upload pipeline
//! ([`PriceQuote`](weavedrop_uploader::PriceQuote),
//! [`BalanceQuery`](weavedrop_uploader::BalanceQuery) and
//! [`StatusQuery`](weavedrop_uploader::StatusQuery)) on top of a shared
//! `reqwest::Client`.

mod client;
mod error;

pub use client::{GatewayClient, TxStatus, build_http_client};
pub use error::GatewayError;
