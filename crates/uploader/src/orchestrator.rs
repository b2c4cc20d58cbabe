//! Upload orchestrator: pre-flight checks, the attempt loop and retry policy.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use weavedrop_protocol::{CostEstimate, TransactionResult, UploadStatus, WalletInfo};
use weavedrop_transfer::{Payload, resolve_tags};

use crate::config::UploaderConfig;
use crate::cost::CostEstimator;
use crate::engine::UploadEngine;
use crate::error::{UploadError, should_retry};
use crate::remote::RemoteEndpoint;
use crate::session::UploadSession;
use crate::types::{EventSink, UploadOptions};
use crate::wallet::{Credential, CredentialValidator};

/// Entry point for uploads and their pre-flight checks.
///
/// Holds only the shared endpoint and configuration, so one orchestrator
/// serves any number of concurrent uploads.
#[derive(Clone)]
pub struct UploadOrchestrator {
    remote: RemoteEndpoint,
    config: UploaderConfig,
    estimator: CostEstimator,
    validator: CredentialValidator,
}

impl UploadOrchestrator {
    pub fn new(remote: RemoteEndpoint, config: UploaderConfig) -> Self {
        let timeout = config.request_timeout();
        Self {
            estimator: CostEstimator::new(remote.prices.clone(), timeout),
            validator: CredentialValidator::new(remote.balances.clone(), timeout),
            remote,
            config,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Quotes the fee for `size_bytes` without uploading anything.
    pub async fn estimate_upload_cost(&self, size_bytes: u64) -> Result<CostEstimate, UploadError> {
        self.estimator.estimate(size_bytes).await
    }

    /// Checks a credential and reports its address and balance.
    pub async fn validate_credential(
        &self,
        credential: &Credential,
    ) -> Result<WalletInfo, UploadError> {
        self.validator.validate(credential).await
    }

    /// Uploads `payload`, retrying recoverable failures.
    ///
    /// Returns a result only once the data has been transferred. Intermediate
    /// failures surface through `on_status_change` as `retrying` events; the
    /// caller sees either the result or a single final error.
    pub async fn upload(
        &self,
        payload: &Payload,
        credential: &Credential,
        options: UploadOptions,
    ) -> Result<TransactionResult, UploadError> {
        let mut session = UploadSession::new(payload.size());
        let span = info_span!("upload", session = %session.id(), size = payload.size());
        self.run(payload, credential, &options, &mut session)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        payload: &Payload,
        credential: &Credential,
        options: &UploadOptions,
        session: &mut UploadSession,
    ) -> Result<TransactionResult, UploadError> {
        let cancel = options.cancel.clone().unwrap_or_default();
        let events = EventSink::new(options);

        // Pre-flight checks are terminal on failure.
        if payload.is_empty() {
            return Err(UploadError::validation("payload is empty"));
        }
        // The credential is checked here once; the balance lookup reuses the address.
        credential.check_structure()?;
        let address = credential.address()?;
        let app_name = Some(self.config.app_name.as_str()).filter(|name| !name.is_empty());
        let tags = resolve_tags(
            options.content_type.as_deref(),
            &options.tags,
            payload.content_type(),
            app_name,
        )?;

        check_cancelled(&cancel)?;
        let estimate = self.estimator.estimate(payload.size()).await?;
        let wallet = self.validator.wallet_info(address).await?;
        if wallet.balance < estimate.fee_base_unit {
            warn!(
                balance = %wallet.balance,
                fee = %estimate.fee_base_unit,
                "insufficient balance"
            );
            return Err(UploadError::balance(format!(
                "Insufficient balance: upload needs {} but wallet holds {}",
                estimate.formatted, wallet.formatted_balance
            )));
        }

        let max_attempts = options
            .max_retries
            .unwrap_or(self.config.max_retries)
            .max(1);
        let retry_delay = options.retry_delay.unwrap_or(self.config.retry_delay());
        let engine = UploadEngine::new(&self.remote, &self.config, cancel.clone());

        loop {
            let attempt = session.begin_attempt();
            events.status(UploadStatus::CreatingTransaction, attempt);

            let err = match engine
                .run_attempt(payload, credential, &tags, session, events)
                .await
            {
                Ok(record) => {
                    // Signed records always carry an id.
                    let transaction_id = record.id().unwrap_or_default().to_string();
                    info!(
                        transaction_id = %transaction_id,
                        attempt,
                        confirmed = session.is_confirmed(),
                        "upload completed"
                    );
                    events.status(UploadStatus::Completed, attempt);
                    return Ok(TransactionResult {
                        storage_url: self.config.storage_url(&transaction_id),
                        transaction_id,
                        file_size: payload.size(),
                        upload_timestamp: chrono::Utc::now(),
                    });
                }
                Err(err) => err,
            };

            if err.is_cancellation() {
                info!(attempt, "upload cancelled");
                return Err(err);
            }

            if cancel.is_cancelled() {
                info!(attempt, error = %err, "upload cancelled after a failed attempt");
                return Err(UploadError::cancelled());
            }

            if !should_retry(&err) || attempt >= max_attempts {
                error!(attempt, kind = %err.kind(), error = %err.message(), "upload failed");
                return Err(if err.is_recoverable() {
                    err.exhausted()
                } else {
                    err
                });
            }

            let delay = backoff_delay(retry_delay, attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            events.status(UploadStatus::Retrying, attempt);

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(attempt, "upload cancelled during retry delay");
                    return Err(UploadError::cancelled());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Linear backoff: `base * attempt`, saturating at `Duration::MAX`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        Err(UploadError::cancelled())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::FakeRemote;
    use crate::wallet::tests::test_credential;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use weavedrop_protocol::{StatusChange, Tag, UploadProgress, Winston};

    const CHUNK: usize = 256 * 1024;

    fn orchestrator(remote: &Arc<FakeRemote>) -> UploadOrchestrator {
        let config = UploaderConfig {
            gateway_url: "https://gw.test".into(),
            confirm_interval_ms: 10,
            retry_delay_ms: 10,
            ..UploaderConfig::default()
        };
        UploadOrchestrator::new(remote.endpoint(), config)
    }

    fn payload(len: usize) -> Payload {
        Payload::new((0..len).map(|i| (i % 251) as u8).collect(), "video/mp4")
    }

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn recorded() -> (UploadOptions, Log<UploadProgress>, Log<StatusChange>) {
        let progress: Log<UploadProgress> = Arc::default();
        let statuses: Log<StatusChange> = Arc::default();
        let (p, s) = (progress.clone(), statuses.clone());
        let opts = UploadOptions::new()
            .on_progress(move |ev| p.lock().unwrap().push(ev))
            .on_status_change(move |ev| s.lock().unwrap().push(ev));
        (opts, progress, statuses)
    }

    fn status_kinds(log: &Log<StatusChange>) -> Vec<(UploadStatus, u32)> {
        log.lock()
            .unwrap()
            .iter()
            .map(|s| (s.status, s.attempt))
            .collect()
    }

    #[tokio::test]
    async fn one_mebibyte_upload() {
        let remote = FakeRemote::new();
        let orch = orchestrator(&remote);
        let data = payload(1_048_576);
        let (opts, progress, statuses) = recorded();

        let result = orch.upload(&data, &test_credential(), opts).await.unwrap();

        assert_eq!(result.transaction_id, "tx-1");
        assert_eq!(result.storage_url, "https://gw.test/tx-1");
        assert_eq!(result.file_size, 1_048_576);
        assert_eq!(remote.chunk_sends(), 4);
        let mut offsets = remote.sent_offsets();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 262_144, 524_288, 786_432]);

        let progress = progress.lock().unwrap();
        let last = progress.last().unwrap();
        assert_eq!(last.percentage, 100);
        assert_eq!(last.bytes_uploaded, 1_048_576);
        assert!(progress[..progress.len() - 1].iter().all(|p| p.percentage <= 99));

        assert_eq!(
            status_kinds(&statuses),
            vec![
                (UploadStatus::CreatingTransaction, 1),
                (UploadStatus::Signing, 1),
                (UploadStatus::Uploading, 1),
                (UploadStatus::Confirming, 1),
                (UploadStatus::Completed, 1),
            ]
        );
    }

    #[tokio::test]
    async fn byte_exact_round_trip() {
        for len in [1, CHUNK - 1, CHUNK, CHUNK + 1, 10 * CHUNK] {
            let remote = FakeRemote::new();
            let orch = orchestrator(&remote);
            let data = payload(len);
            let result = orch
                .upload(&data, &test_credential(), UploadOptions::new())
                .await
                .unwrap();
            assert_eq!(
                remote.reassemble(&result.transaction_id),
                data.bytes(),
                "len {len}"
            );
            assert_eq!(remote.chunk_sends(), len.div_ceil(CHUNK), "len {len}");
        }
    }

    #[tokio::test]
    async fn empty_payload_is_validation() {
        let remote = FakeRemote::new();
        let err = orchestrator(&remote)
            .upload(&payload(0), &test_credential(), UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(remote.price_calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_credential_fails_before_network() {
        let remote = FakeRemote::new();
        let mut cred = test_credential();
        cred.qi.clear();
        let err = orchestrator(&remote)
            .upload(&payload(10), &cred, UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(remote.price_calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.balance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_key_modulus_fails_before_network() {
        let remote = FakeRemote::new();
        let mut cred = test_credential();
        cred.n = "not*base64!".into();
        let err = orchestrator(&remote)
            .upload(&payload(10), &cred, UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(remote.price_calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.balance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_balance_never_creates_transfer() {
        let remote = FakeRemote::new();
        *remote.balance.lock().unwrap() = Winston(500_000);
        *remote.fee.lock().unwrap() = Winston(600_000);

        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Balance);
        assert!(!err.is_recoverable());
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn exact_balance_is_enough() {
        let remote = FakeRemote::new();
        *remote.balance.lock().unwrap() = Winston(600_000);
        *remote.fee.lock().unwrap() = Winston(600_000);
        assert!(
            orchestrator(&remote)
                .upload(&payload(10), &test_credential(), UploadOptions::new())
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn balance_error_is_not_retried() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("Insufficient funds for reward".into());
        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new().max_retries(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Balance);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_error_is_not_retried() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("malformed tag set".into());
        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new().max_retries(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_error_is_not_retried() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("teapot".into());
        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_exhaust_retry_budget() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("network unreachable".into());
        let (opts, _, statuses) = recorded();

        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), opts.max_retries(3))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!err.is_recoverable());
        assert_eq!(remote.create_calls(), 3);
        assert_eq!(
            status_kinds(&statuses),
            vec![
                (UploadStatus::CreatingTransaction, 1),
                (UploadStatus::Retrying, 1),
                (UploadStatus::CreatingTransaction, 2),
                (UploadStatus::Retrying, 2),
                (UploadStatus::CreatingTransaction, 3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("connection reset".into());
        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new().max_retries(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_delay_grows_linearly() {
        let remote = FakeRemote::new();
        *remote.create_always_fails.lock().unwrap() = Some("timeout".into());
        let started = tokio::time::Instant::now();
        orchestrator(&remote)
            .upload(
                &payload(10),
                &test_credential(),
                UploadOptions::new()
                    .max_retries(3)
                    .retry_delay(Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        // 1s after attempt 1, 2s after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_with_monotonic_progress() {
        let remote = FakeRemote::new();
        remote
            .chunk_failures
            .lock()
            .unwrap()
            .push((3 * CHUNK as u64, "connection dropped".into()));
        let mut config = orchestrator(&remote).config().clone();
        config.max_concurrent_chunks = 1;
        let orch = UploadOrchestrator::new(remote.endpoint(), config);
        let data = payload(4 * CHUNK);
        let (opts, progress, statuses) = recorded();

        let result = orch.upload(&data, &test_credential(), opts).await.unwrap();
        assert_eq!(result.transaction_id, "tx-2");
        assert_eq!(remote.create_calls(), 2);
        assert_eq!(remote.reassemble("tx-2"), data.bytes());

        let bytes: Vec<u64> = progress
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.bytes_uploaded)
            .collect();
        assert!(bytes.windows(2).all(|w| w[0] <= w[1]), "{bytes:?}");
        assert_eq!(*bytes.last().unwrap(), data.size());
        assert!(
            status_kinds(&statuses).contains(&(UploadStatus::Retrying, 1)),
            "{:?}",
            status_kinds(&statuses)
        );
    }

    #[tokio::test]
    async fn failed_upload_never_reports_full_progress() {
        let remote = FakeRemote::new();
        remote
            .chunk_failures
            .lock()
            .unwrap()
            .push((CHUNK as u64, "wallet signature rejected".into()));
        let (opts, progress, _) = recorded();
        let err = orchestrator(&remote)
            .upload(&payload(2 * CHUNK), &test_credential(), opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let progress = progress.lock().unwrap();
        assert!(progress.iter().all(|p| p.bytes_uploaded < 2 * CHUNK as u64));
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let remote = FakeRemote::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator(&remote)
            .upload(
                &payload(CHUNK * 2),
                &test_credential(),
                UploadOptions::new().cancel_token(cancel),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert_eq!(err.message(), "Upload was cancelled");
        assert!(!err.is_recoverable());
        assert_eq!(remote.chunk_sends(), 0);
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_upload_is_terminal() {
        let remote = FakeRemote::new();
        let cancel = CancellationToken::new();
        *remote.cancel_after_chunks.lock().unwrap() = Some((1, cancel.clone()));
        let (opts, progress, statuses) = recorded();

        let err = orchestrator(&remote)
            .upload(
                &payload(10 * CHUNK),
                &test_credential(),
                opts.cancel_token(cancel).max_retries(5),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(remote.create_calls(), 1);
        assert!(remote.chunk_sends() < 10);
        assert!(progress.lock().unwrap().iter().all(|p| p.percentage < 100));
        assert!(
            !status_kinds(&statuses)
                .iter()
                .any(|(s, _)| matches!(s, UploadStatus::Retrying | UploadStatus::Completed))
        );
    }

    #[tokio::test]
    async fn cancel_racing_chunk_failure_is_not_retried() {
        let remote = FakeRemote::new();
        let cancel = CancellationToken::new();
        *remote.cancel_after_chunks.lock().unwrap() = Some((1, cancel.clone()));
        remote.chunk_failures.lock().unwrap().push((4, "connection reset".into()));
        let mut config = orchestrator(&remote).config().clone();
        config.chunk_size = 4;
        config.max_concurrent_chunks = 4;
        let orch = UploadOrchestrator::new(remote.endpoint(), config);
        let (opts, _, statuses) = recorded();

        let err = orch
            .upload(
                &payload(16),
                &test_credential(),
                opts.cancel_token(cancel).max_retries(3),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(remote.create_calls(), 1);
        assert_eq!(
            status_kinds(&statuses),
            vec![
                (UploadStatus::CreatingTransaction, 1),
                (UploadStatus::Signing, 1),
                (UploadStatus::Uploading, 1),
            ]
        );
    }

    #[test]
    fn backoff_is_linear_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(1500));
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
        assert_eq!(backoff_delay(Duration::from_secs(u64::MAX / 2 + 1), 2), Duration::MAX);
    }

    #[tokio::test]
    async fn explicit_content_type_wins_over_tag() {
        let remote = FakeRemote::new();
        orchestrator(&remote)
            .upload(
                &payload(10),
                &test_credential(),
                UploadOptions::new()
                    .content_type("video/webm")
                    .tag("Content-Type", "video/mp4")
                    .tag("Title", "Falls"),
            )
            .await
            .unwrap();

        let created = remote.created.lock().unwrap();
        let tags = &created[0];
        let content_types: Vec<&Tag> = tags
            .iter()
            .filter(|t| t.name.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types, vec![&Tag::new("Content-Type", "video/webm")]);
        assert_eq!(
            tags.as_slice(),
            &[
                Tag::new("Content-Type", "video/webm"),
                Tag::new("App-Name", "weavedrop"),
                Tag::new("Title", "Falls"),
            ]
        );
    }

    #[tokio::test]
    async fn payload_content_type_is_default() {
        let remote = FakeRemote::new();
        orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new())
            .await
            .unwrap();
        assert_eq!(
            remote.created.lock().unwrap()[0][0],
            Tag::new("Content-Type", "video/mp4")
        );
    }

    #[tokio::test]
    async fn duplicate_reserved_tag_is_rejected() {
        let remote = FakeRemote::new();
        let err = orchestrator(&remote)
            .upload(
                &payload(10),
                &test_credential(),
                UploadOptions::new()
                    .tag("Content-Type", "video/mp4")
                    .tag("content-type", "video/webm"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn price_failure_is_network() {
        let remote = FakeRemote::new();
        remote
            .price_failures
            .lock()
            .unwrap()
            .push_back("gateway returned garbage".into());
        let err = orchestrator(&remote)
            .upload(&payload(10), &test_credential(), UploadOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_uploads_are_independent() {
        let remote = FakeRemote::new();
        let orch = orchestrator(&remote);
        let (a, b) = (payload(CHUNK + 5), payload(3));
        let cred = test_credential();
        let (ra, rb) = tokio::join!(
            orch.upload(&a, &cred, UploadOptions::new()),
            orch.upload(&b, &cred, UploadOptions::new())
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert_ne!(ra.transaction_id, rb.transaction_id);
        assert_eq!(remote.reassemble(&ra.transaction_id), a.bytes());
        assert_eq!(remote.reassemble(&rb.transaction_id), b.bytes());
    }

    #[tokio::test]
    async fn preflight_entry_points() {
        let remote = FakeRemote::new();
        *remote.fee.lock().unwrap() = Winston(600_000);
        let orch = orchestrator(&remote);

        let est = orch.estimate_upload_cost(1024).await.unwrap();
        assert_eq!(est.fee_base_unit, Winston(600_000));
        assert_eq!(est.formatted, "0.0000006 AR");

        let info = orch.validate_credential(&test_credential()).await.unwrap();
        assert_eq!(info.address, test_credential().address().unwrap());
        assert_eq!(info.balance, Winston(1_000_000_000_000));
    }
}
