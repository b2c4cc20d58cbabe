//! Upload error taxonomy and the error classifier.
//!
//! Collaborators fail with [`RemoteError`]. Before a failure crosses a
//! component boundary it is turned into an [`UploadError`], either by
//! [`classify`] on its message or by a call site that knows better (a failed
//! balance query is always a network problem, whatever its message says).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weavedrop_transfer::TransferError;

/// Message carried by the error returned for a cancelled upload.
pub const CANCELLED_MESSAGE: &str = "Upload was cancelled";

const NETWORK_ACTION: &str = "Check your internet connection and try again.";
const BALANCE_ACTION: &str =
    "Add more AR, the storage network's native token, to your wallet and try again.";
const VALIDATION_ACTION: &str = "Check that your wallet key file is valid and try again.";
const UPLOAD_ACTION: &str = "Try the upload again.";
const CANCELLED_ACTION: &str = "Start a new upload when you are ready.";
const UNKNOWN_ACTION: &str = "Try again later. If the problem persists, report it with the error message.";

// Checked in this order; the first group with a matching pattern wins.
const NETWORK_PATTERNS: &[&str] = &["network", "timeout", "timed out", "connection"];
const BALANCE_PATTERNS: &[&str] = &["balance", "insufficient", "funds"];
const VALIDATION_PATTERNS: &[&str] = &["invalid", "format", "malformed", "key", "wallet"];

/// Category of an upload failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or credential. Never retried.
    Validation,
    /// Transient transport failure or timeout.
    Network,
    /// Not enough funds for the fee. Never retried.
    Balance,
    /// Cancellation or a transfer-layer failure mid-upload.
    Upload,
    /// Anything unrecognized. Not retried.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Balance => "balance",
            ErrorKind::Upload => "upload",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified upload failure, the only error type an upload caller sees.
///
/// `Balance` and `Validation` errors are never recoverable; the constructors
/// and [`with_recoverable`](Self::with_recoverable) enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct UploadError {
    kind: ErrorKind,
    message: String,
    recoverable: bool,
    suggested_action: String,
}

impl UploadError {
    fn build(kind: ErrorKind, message: String, recoverable: bool, action: &str) -> Self {
        let recoverable = recoverable && !matches!(kind, ErrorKind::Balance | ErrorKind::Validation);
        Self {
            kind,
            message,
            recoverable,
            suggested_action: action.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Validation, message.into(), false, VALIDATION_ACTION)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Network, message.into(), true, NETWORK_ACTION)
    }

    pub fn balance(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Balance, message.into(), false, BALANCE_ACTION)
    }

    /// A transfer-layer failure. Retried like a network error.
    pub fn upload(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Upload, message.into(), true, UPLOAD_ACTION)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Unknown, message.into(), false, UNKNOWN_ACTION)
    }

    /// The terminal error for a cancelled upload.
    pub fn cancelled() -> Self {
        Self::build(ErrorKind::Upload, CANCELLED_MESSAGE.into(), false, CANCELLED_ACTION)
    }

    /// Overrides recoverability. Has no effect on `Balance` and `Validation`.
    pub fn with_recoverable(self, recoverable: bool) -> Self {
        let recoverable = recoverable && !matches!(self.kind, ErrorKind::Balance | ErrorKind::Validation);
        Self {
            recoverable,
            ..self
        }
    }

    /// Marks the error final once the attempt budget is spent.
    pub fn exhausted(self) -> Self {
        self.with_recoverable(false)
    }

    /// Prefixes the message with context, keeping kind and recoverability.
    pub fn context(self, context: &str) -> Self {
        Self {
            message: format!("{context}: {}", self.message),
            ..self
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn suggested_action(&self) -> &str {
        &self.suggested_action
    }

    /// Returns `true` for the error produced by [`cancelled`](Self::cancelled).
    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::Upload && self.message == CANCELLED_MESSAGE
    }

    /// Classifies a collaborator failure.
    ///
    /// Timeouts and retryable HTTP statuses are network errors regardless of
    /// wording; everything else goes through [`classify`].
    pub fn from_remote(err: &RemoteError) -> Self {
        match err {
            RemoteError::Timeout(_) => Self::network(err.to_string()),
            RemoteError::Status { code, .. } if *code == 408 || *code == 429 || *code >= 500 => {
                Self::network(err.to_string())
            }
            _ => classify(&err.to_string()),
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        UploadError::validation(err.to_string())
    }
}

/// Maps a raw failure message to a typed [`UploadError`].
///
/// Pure and total. Network wording is checked first, then balance, then
/// validation; unmatched messages are `Unknown` and not recoverable.
pub fn classify(raw: &str) -> UploadError {
    let lower = raw.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(NETWORK_PATTERNS) {
        UploadError::network(raw)
    } else if matches(BALANCE_PATTERNS) {
        UploadError::balance(raw)
    } else if matches(VALIDATION_PATTERNS) {
        UploadError::validation(raw)
    } else {
        UploadError::unknown(raw)
    }
}

/// Retry policy: only recoverable errors other than `Balance` and `Validation`.
pub fn should_retry(err: &UploadError) -> bool {
    err.is_recoverable() && !matches!(err.kind(), ErrorKind::Balance | ErrorKind::Validation)
}

/// Raw failure reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timeout after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn other(message: impl Into<String>) -> Self {
        RemoteError::Other(message.into())
    }
}

/// Errors loading or validating [`UploaderConfig`](crate::UploaderConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
