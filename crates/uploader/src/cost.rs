//! Storage fee estimation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use weavedrop_protocol::{Confidence, CostEstimate};

use crate::error::UploadError;
use crate::remote::{PriceQuote, with_timeout};

/// Quotes storage fees through a [`PriceQuote`] collaborator.
///
/// Holds no mutable state; one instance can serve concurrent callers.
#[derive(Clone)]
pub struct CostEstimator {
    prices: Arc<dyn PriceQuote>,
    timeout: Duration,
}

impl CostEstimator {
    pub fn new(prices: Arc<dyn PriceQuote>, timeout: Duration) -> Self {
        Self { prices, timeout }
    }

    /// Estimates the fee for storing `size_bytes`.
    ///
    /// Every estimate is quoted live. A failed quote is a network error;
    /// there is no fallback to a cached or zero fee.
    pub async fn estimate(&self, size_bytes: u64) -> Result<CostEstimate, UploadError> {
        let fee = with_timeout(self.timeout, self.prices.quote_price(size_bytes))
            .await
            .map_err(|e| UploadError::network(format!("price quote failed: {e}")))?;

        debug!(size_bytes, fee = %fee, "price quoted");

        Ok(CostEstimate {
            size_bytes,
            fee_base_unit: fee,
            fee_display_unit: fee.to_ar(),
            formatted: fee.formatted(),
            confidence: Confidence::High,
            as_of: Utc::now(),
        })
    }
}
