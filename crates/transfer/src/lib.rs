//! Chunked payload transfer primitives: chunk planning with checksums,
//! transfer records, the per-attempt phase machine, and progress tracking.
//!
//! Nothing in this crate performs I/O; the uploader drives it.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkPlan, checksum_bytes};
pub use progress::{ProgressMeter, SpeedCalculator, transfer_percentage};
pub use types::{Chunk, Payload, Phase, SignatureState, TransferRecord};
pub use validation::{MAX_TAG_BYTES, resolve_tags, validate_tag};

pub use weavedrop_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("duplicate reserved tag: {0}")]
    DuplicateReservedTag(String),

    #[error("tags too large: {0} bytes")]
    TagsTooLarge(usize),

    #[error("transfer id already assigned: {0}")]
    IdAlreadyAssigned(String),

    #[error("invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },
}
