//! Uploader configuration.
//!
//! Stored as a camelCase JSON file; every field is optional and falls back
//! to its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weavedrop_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_GATEWAY_URL, MAX_CONCURRENT_CHUNKS};

use crate::error::ConfigError;

/// Tunables for the upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploaderConfig {
    /// Gateway base URL, used to build storage URLs.
    pub gateway_url: String,
    /// Bytes per chunk.
    pub chunk_size: usize,
    /// Chunk sends in flight per upload (clamped to 1..=4).
    pub max_concurrent_chunks: usize,
    /// Upper bound for each collaborator call.
    pub request_timeout_ms: u64,
    /// Status polls before an upload is accepted as unconfirmed (0 skips polling).
    pub confirm_attempts: u32,
    /// Delay between status polls.
    pub confirm_interval_ms: u64,
    /// Default attempt budget for an upload.
    pub max_retries: u32,
    /// Default retry delay base.
    pub retry_delay_ms: u64,
    /// Value of the `App-Name` tag; empty disables it.
    pub app_name: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: MAX_CONCURRENT_CHUNKS,
            request_timeout_ms: 60_000,
            confirm_attempts: 5,
            confirm_interval_ms: 2_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
            app_name: "weavedrop".into(),
        }
    }
}

impl UploaderConfig {
    /// Loads configuration from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunkSize must be greater than zero".into()));
        }
        if self.gateway_url.trim().is_empty() {
            return Err(ConfigError::Invalid("gatewayUrl must not be empty".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Effective number of concurrent chunk sends.
    pub fn chunk_concurrency(&self) -> usize {
        self.max_concurrent_chunks.clamp(1, MAX_CONCURRENT_CHUNKS)
    }

    /// Public URL of a stored transfer.
    pub fn storage_url(&self, transfer_id: &str) -> String {
        format!("{}/{transfer_id}", self.gateway_url.trim_end_matches('/'))
    }
}
