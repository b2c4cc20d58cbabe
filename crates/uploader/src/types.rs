//! Upload options and event callbacks.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use weavedrop_protocol::{StatusChange, Tag, UploadProgress, UploadStatus};

/// Callback invoked with transfer progress.
pub type ProgressCallback = Box<dyn Fn(UploadProgress) + Send + Sync>;

/// Callback invoked on status changes.
pub type StatusCallback = Box<dyn Fn(StatusChange) + Send + Sync>;

/// Per-call options for [`UploadOrchestrator::upload`](crate::UploadOrchestrator::upload).
///
/// Unset numeric options fall back to the orchestrator's
/// [`UploaderConfig`](crate::UploaderConfig).
#[derive(Default)]
pub struct UploadOptions {
    /// MIME type; overrides any `Content-Type` tag and the payload's own type.
    pub content_type: Option<String>,
    /// Caller tags in order.
    pub tags: Vec<Tag>,
    /// Attempt budget (`0` behaves like `1`).
    pub max_retries: Option<u32>,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_delay: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    pub on_status_change: Option<StatusCallback>,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancellationToken>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("content_type", &self.content_type)
            .field("tags", &self.tags)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn on_progress(mut self, f: impl Fn(UploadProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_status_change(mut self, f: impl Fn(StatusChange) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Box::new(f));
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Borrowed view of the callbacks, passed down to the engine.
#[derive(Clone, Copy)]
pub(crate) struct EventSink<'a> {
    progress: Option<&'a ProgressCallback>,
    status: Option<&'a StatusCallback>,
}

impl<'a> EventSink<'a> {
    pub(crate) fn new(options: &'a UploadOptions) -> Self {
        Self {
            progress: options.on_progress.as_ref(),
            status: options.on_status_change.as_ref(),
        }
    }

    pub(crate) fn progress(&self, progress: UploadProgress) {
        if let Some(cb) = self.progress {
            cb(progress);
        }
    }

    pub(crate) fn status(&self, status: UploadStatus, attempt: u32) {
        if let Some(cb) = self.status {
            cb(StatusChange { status, attempt });
        }
    }
}
