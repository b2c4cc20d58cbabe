//! Chunked upload engine: runs one attempt of an upload end to end.
//!
//! An attempt creates and signs a transfer record, streams the payload in
//! chunks with bounded concurrency, then polls for confirmation. Every
//! attempt ends in exactly one of `Completed`, `Failed` or `Cancelled`.

use std::pin::pin;

use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weavedrop_protocol::constants::STATUS_CONFIRMED;
use weavedrop_protocol::{Tag, UploadStatus};
use weavedrop_transfer::{ChunkPlan, Payload, Phase, TransferRecord};

use crate::config::UploaderConfig;
use crate::error::{ErrorKind, RemoteError, UploadError};
use crate::remote::{ChunkAck, RemoteEndpoint, with_timeout};
use crate::session::UploadSession;
use crate::types::EventSink;
use crate::wallet::Credential;

/// Outcome of a single chunk send.
enum ChunkOutcome {
    Sent { offset: u64, size: u64, ack: ChunkAck },
    /// Not dispatched because the attempt was stopping.
    Skipped,
    Failed { offset: u64, error: RemoteError },
}

/// Drives upload attempts against a [`RemoteEndpoint`].
pub(crate) struct UploadEngine<'a> {
    remote: &'a RemoteEndpoint,
    config: &'a UploaderConfig,
    cancel: CancellationToken,
}

impl<'a> UploadEngine<'a> {
    pub(crate) fn new(
        remote: &'a RemoteEndpoint,
        config: &'a UploaderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            remote,
            config,
            cancel,
        }
    }

    /// Runs one attempt and returns the signed transfer on success.
    ///
    /// The session's phase ends in `Completed`, `Failed` or `Cancelled`.
    pub(crate) async fn run_attempt(
        &self,
        payload: &Payload,
        credential: &Credential,
        tags: &[Tag],
        session: &mut UploadSession,
        events: EventSink<'_>,
    ) -> Result<TransferRecord, UploadError> {
        match self.drive(payload, credential, tags, session, events).await {
            Ok(record) => Ok(record),
            Err(err) if err.is_cancellation() => {
                session.enter(Phase::Cancelled)?;
                Err(err)
            }
            Err(err) => {
                session.enter(Phase::Failed)?;
                session.set_error(err.clone());
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        payload: &Payload,
        credential: &Credential,
        tags: &[Tag],
        session: &mut UploadSession,
        events: EventSink<'_>,
    ) -> Result<TransferRecord, UploadError> {
        let attempt = session.attempt();

        // 1. Prepare
        self.check_cancelled()?;
        session.enter(Phase::Preparing)?;
        let plan = ChunkPlan::new(payload, self.config.chunk_size)?;

        // 2. Create transfer
        self.check_cancelled()?;
        session.enter(Phase::CreatingTransfer)?;
        let record = with_timeout(
            self.config.request_timeout(),
            self.remote.transfers.create_transfer(payload.size(), tags),
        )
        .await
        .map_err(|e| UploadError::from_remote(&e).context("transfer creation failed"))?;
        debug!(attempt, reward = %record.reward, "transfer created");
        session.set_transfer(record.clone());

        // 3. Sign
        self.check_cancelled()?;
        session.enter(Phase::Signing)?;
        events.status(UploadStatus::Signing, attempt);
        let signed = self.sign(record, credential).await?;
        let transfer_id = signed
            .id()
            .ok_or_else(|| UploadError::upload("signed transfer has no identifier"))?
            .to_string();
        session.set_transfer(signed.clone());

        // 4. Transfer chunks
        self.check_cancelled()?;
        session.enter(Phase::Transferring)?;
        events.status(UploadStatus::Uploading, attempt);
        debug!(
            attempt,
            transfer_id = %transfer_id,
            chunks = plan.chunk_count(),
            chunk_size = plan.chunk_size(),
            "transferring"
        );
        self.transfer_chunks(&transfer_id, plan, session, events)
            .await?;

        // 5. Confirm
        session.enter(Phase::Confirming)?;
        events.status(UploadStatus::Confirming, attempt);
        let confirmed = self.confirm(&transfer_id).await?;
        if !confirmed {
            warn!(
                transfer_id = %transfer_id,
                polls = self.config.confirm_attempts,
                "transfer not confirmed yet, accepting as uploaded"
            );
        }
        session.set_confirmed(confirmed);

        session.enter(Phase::Completed)?;
        events.progress(session.complete_progress());
        Ok(signed)
    }

    async fn sign(
        &self,
        record: TransferRecord,
        credential: &Credential,
    ) -> Result<TransferRecord, UploadError> {
        let signed = with_timeout(
            self.config.request_timeout(),
            self.remote.signer.sign(record, credential),
        )
        .await
        .map_err(|e| match e {
            RemoteError::Timeout(_) => UploadError::network(e.to_string()),
            _ => UploadError::validation(format!("signing failed: {e}")),
        })?;

        if !signed.is_signed() {
            return Err(UploadError::validation("signer returned an unsigned transfer"));
        }
        Ok(signed)
    }

    /// Sends every chunk of `plan`, at most `chunk_concurrency` at a time.
    ///
    /// Sends start in byte order. Acks are accounted in that same order by
    /// this task alone, so reported progress is monotonic. After the first
    /// failure or a cancellation no further chunk is dispatched; sends
    /// already in flight finish but are not reported.
    async fn transfer_chunks(
        &self,
        transfer_id: &str,
        plan: ChunkPlan<'_>,
        session: &mut UploadSession,
        events: EventSink<'_>,
    ) -> Result<(), UploadError> {
        let stop = self.cancel.child_token();
        let timeout = self.config.request_timeout();
        let transport = &self.remote.chunks;

        let sends = stream::iter(plan)
            .map(|chunk| {
                let stop = &stop;
                async move {
                    if stop.is_cancelled() {
                        return ChunkOutcome::Skipped;
                    }
                    let offset = chunk.offset;
                    let size = chunk.size();
                    match with_timeout(timeout, transport.send_chunk(transfer_id, &chunk)).await {
                        Ok(ack) => ChunkOutcome::Sent { offset, size, ack },
                        Err(error) => ChunkOutcome::Failed { offset, error },
                    }
                }
            })
            .buffered(self.config.chunk_concurrency());
        let mut sends = pin!(sends);

        let mut attempt_bytes = 0u64;
        let mut failure: Option<UploadError> = None;

        while let Some(outcome) = sends.next().await {
            match outcome {
                ChunkOutcome::Sent { offset, size, ack } => {
                    if failure.is_some() || self.cancel.is_cancelled() {
                        continue;
                    }
                    if ack.offset != offset {
                        failure = Some(UploadError::upload(format!(
                            "chunk sent at offset {offset} was acknowledged at offset {}",
                            ack.offset
                        )));
                        stop.cancel();
                        continue;
                    }
                    attempt_bytes += size;
                    if let Some(progress) = session.record_chunk(size, attempt_bytes) {
                        events.progress(progress);
                    }
                }
                ChunkOutcome::Skipped => {}
                ChunkOutcome::Failed { offset, error } => {
                    debug!(offset, error = %error, "chunk send failed");
                    if failure.is_none() {
                        failure = Some(chunk_error(offset, &error));
                        stop.cancel();
                    }
                }
            }
        }

        // A cancel that raced a failing send still wins.
        self.check_cancelled()?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Polls the transfer status. Returns `false` when the poll budget runs
    /// out without a confirmed status.
    async fn confirm(&self, transfer_id: &str) -> Result<bool, UploadError> {
        let polls = self.config.confirm_attempts;

        for poll in 1..=polls {
            self.check_cancelled()?;

            match with_timeout(
                self.config.request_timeout(),
                self.remote.status.get_status(transfer_id),
            )
            .await
            {
                Ok(STATUS_CONFIRMED) => return Ok(true),
                Ok(code) => debug!(transfer_id, poll, code, "not confirmed"),
                Err(e) => debug!(transfer_id, poll, error = %e, "status poll failed"),
            }

            if poll < polls {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(UploadError::cancelled()),
                    _ = tokio::time::sleep(self.config.confirm_interval()) => {}
                }
            }
        }

        Ok(false)
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// Classifies a failed chunk send. Unrecognized failures mid-transfer are
/// upload errors and retried.
fn chunk_error(offset: u64, error: &RemoteError) -> UploadError {
    let err = UploadError::from_remote(error);
    let err = if err.kind() == ErrorKind::Unknown {
        UploadError::upload(err.message())
    } else {
        err
    };
    err.context(&format!("chunk at offset {offset}"))
}
