//! Upload pipeline: moves a payload to permanent storage.
//!
//! This crate implements the **business logic** of an upload. It performs
//! no I/O of its own; the caller provides a [`RemoteEndpoint`] whose
//! collaborators talk to the storage network (see `weavedrop-gateway`).
//!
//! # Pipeline
//!
//! 1. **Pre-flight**: payload, credential structure and tags are checked
//! 2. **Quote**: the fee is estimated and compared with the wallet balance
//! 3. **Create / sign**: a transfer record is created and signed per attempt
//! 4. **Transfer**: the payload is sent in chunks with bounded concurrency
//! 5. **Confirm**: the transfer status is polled; a missing confirmation
//!    is logged, not failed
//!
//! Recoverable failures in steps 3-5 are retried with linear backoff.

pub mod config;
pub mod cost;
mod engine;
pub mod error;
#[cfg(test)]
mod mock;
pub mod orchestrator;
pub mod remote;
pub mod session;
pub mod types;
pub mod wallet;

// Re-export primary types for convenience.
pub use config::UploaderConfig;
pub use cost::CostEstimator;
pub use error::{
    CANCELLED_MESSAGE, ConfigError, ErrorKind, RemoteError, UploadError, classify, should_retry,
};
pub use orchestrator::UploadOrchestrator;
pub use remote::{
    BalanceQuery, BoxFuture, ChunkAck, ChunkTransport, PriceQuote, RemoteEndpoint, StatusQuery,
    TransferFactory, TransferSigner,
};
pub use session::UploadSession;
pub use types::{ProgressCallback, StatusCallback, UploadOptions};
pub use wallet::{Credential, CredentialValidator};
