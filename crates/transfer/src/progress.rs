use std::time::{Duration, Instant};

use weavedrop_protocol::UploadProgress;

/// Transfer percentage for `bytes` of `total`, floored and held at 99.
///
/// 100 is reserved for a completed upload; see [`ProgressMeter::complete`].
pub fn transfer_percentage(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (bytes as u128 * 100) / total as u128;
    pct.min(99) as u8
}

// ---------------------------------------------------------------------------
// ProgressMeter
// ---------------------------------------------------------------------------

/// Single accounting point for the bytes of one upload call.
///
/// Reported byte counts are a high-water mark across attempts, so the
/// sequence handed to a progress callback never decreases even when a retry
/// starts sending from offset zero again.
#[derive(Debug)]
pub struct ProgressMeter {
    total_bytes: u64,
    reported: u64,
    speed: SpeedCalculator,
}

impl ProgressMeter {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            reported: 0,
            speed: SpeedCalculator::new(None, None),
        }
    }

    /// Records an acknowledged chunk of `chunk_bytes`, bringing the current
    /// attempt to `attempt_bytes`, and returns the progress to report.
    ///
    /// Returns `None` when the attempt covers the whole payload: full bytes
    /// are only reported by [`complete`](Self::complete).
    pub fn record(&mut self, chunk_bytes: u64, attempt_bytes: u64) -> Option<UploadProgress> {
        self.record_at(chunk_bytes, attempt_bytes, Instant::now())
    }

    /// Same as [`record`](Self::record) with an explicit sample instant.
    pub fn record_at(
        &mut self,
        chunk_bytes: u64,
        attempt_bytes: u64,
        at: Instant,
    ) -> Option<UploadProgress> {
        self.speed.add_sample_at(chunk_bytes, at);
        if attempt_bytes >= self.total_bytes {
            return None;
        }
        self.reported = self.reported.max(attempt_bytes);
        let remaining = self.total_bytes - attempt_bytes;
        Some(UploadProgress {
            percentage: transfer_percentage(self.reported, self.total_bytes),
            bytes_uploaded: self.reported,
            total_bytes: self.total_bytes,
            estimated_time_remaining: self.speed.eta(remaining),
        })
    }

    /// Clears throughput samples at the start of a new attempt.
    pub fn restart_attempt(&mut self) {
        self.speed.reset();
    }

    /// Final progress for a completed upload.
    pub fn complete(&mut self) -> UploadProgress {
        self.reported = self.total_bytes;
        UploadProgress {
            percentage: 100,
            bytes_uploaded: self.total_bytes,
            total_bytes: self.total_bytes,
            estimated_time_remaining: Some(Duration::ZERO),
        }
    }

    /// Highest byte count reported so far.
    pub fn reported_bytes(&self) -> u64 {
        self.reported
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
#[derive(Debug)]
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(100),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    /// Records a sample of `bytes` transferred at `now`.
    pub fn add_sample_at(&mut self, bytes: u64, now: Instant) {
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(self.window_size) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the window start; its bytes precede it.
        let total_bytes: u64 = self.samples[1..].iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero or the estimate does not fit a `Duration`.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }

    /// Clears all recorded samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
