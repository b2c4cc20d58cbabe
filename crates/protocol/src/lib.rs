//! Data types shared between the upload pipeline and its callers.
//!
//! Everything here serializes with camelCase field names so a UI layer can
//! forward progress, status and result payloads without reshaping them.

pub mod constants;
pub mod types;

// Re-export primary types for convenience.
pub use types::{
    Confidence, CostEstimate, ParseWinstonError, StatusChange, Tag, TransactionResult,
    UploadProgress, UploadStatus, WalletInfo, Winston,
};
