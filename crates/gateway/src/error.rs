//! Gateway client errors.

use weavedrop_uploader::RemoteError;

/// Errors from the gateway client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid gateway response: {0}")]
    Parse(String),

    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
}

impl From<GatewayError> for RemoteError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Http(e) if e.is_timeout() => {
                RemoteError::other(format!("request timed out: {e}"))
            }
            GatewayError::Http(e) if e.is_connect() => {
                RemoteError::other(format!("connection failed: {e}"))
            }
            GatewayError::Api { status, body } => RemoteError::Status { code: status, body },
            other => RemoteError::other(other.to_string()),
        }
    }
}
