use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{TOKEN_SYMBOL, WINSTON_PER_AR};

/// An amount in winston, the smallest indivisible unit of AR.
///
/// Serialized as a decimal string, matching how gateways report balances
/// and prices (amounts routinely exceed what a JSON number holds exactly).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Winston(pub u128);

/// Error returned when a winston amount cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid winston amount: {0:?}")]
pub struct ParseWinstonError(pub String);

impl Winston {
    pub const ZERO: Winston = Winston(0);

    /// Returns the raw amount.
    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// Approximate value in AR, for display only.
    pub fn to_ar(&self) -> f64 {
        self.0 as f64 / WINSTON_PER_AR as f64
    }

    /// Exact decimal rendering in AR with trailing zeros trimmed.
    ///
    /// `600_000` winston renders as `"0.0000006"`, one AR as `"1.0"`.
    pub fn to_ar_string(&self) -> String {
        let whole = self.0 / WINSTON_PER_AR;
        let frac = self.0 % WINSTON_PER_AR;
        let digits = format!("{frac:012}");
        let trimmed = digits.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{whole}.0")
        } else {
            format!("{whole}.{trimmed}")
        }
    }

    /// Human-readable amount with the token symbol, e.g. `"0.25 AR"`.
    pub fn formatted(&self) -> String {
        format!("{} {TOKEN_SYMBOL}", self.to_ar_string())
    }
}

impl fmt::Display for Winston {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Winston {
    type Err = ParseWinstonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Winston)
            .map_err(|_| ParseWinstonError(s.to_string()))
    }
}

impl TryFrom<String> for Winston {
    type Error = ParseWinstonError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Winston> for String {
    fn from(w: Winston) -> Self {
        w.0.to_string()
    }
}

impl From<u128> for Winston {
    fn from(v: u128) -> Self {
        Winston(v)
    }
}

/// A key/value pair attached to a transfer for discoverability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if the tag's name equals `key`, ignoring ASCII case.
    pub fn is_named(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key)
    }
}

/// Status reported through the status-change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "creating_transaction")]
    CreatingTransaction,
    #[serde(rename = "signing")]
    Signing,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "confirming")]
    Confirming,
    #[serde(rename = "retrying")]
    Retrying,
    #[serde(rename = "completed")]
    Completed,
}

/// A status change event for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: UploadStatus,
    pub attempt: u32,
}

/// Byte-level progress of the transfer phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// `floor(bytes_uploaded * 100 / total_bytes)`, held at 99 until completion.
    pub percentage: u8,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    #[serde(default, with = "opt_duration_secs")]
    pub estimated_time_remaining: Option<Duration>,
}

/// Final result of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub transaction_id: String,
    pub storage_url: String,
    pub file_size: u64,
    pub upload_timestamp: DateTime<Utc>,
}

/// How the fee in a [`CostEstimate`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Quoted live during this call.
    High,
    /// Served from a recent cache.
    Medium,
    /// Served from a stale cache or a fallback formula.
    Low,
}

/// Estimated fee for storing a payload of a given size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub size_bytes: u64,
    pub fee_base_unit: Winston,
    pub fee_display_unit: f64,
    pub formatted: String,
    pub confidence: Confidence,
    pub as_of: DateTime<Utc>,
}

/// A validated wallet and its spendable balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: String,
    pub balance: Winston,
    pub formatted_balance: String,
}

mod opt_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        // Negative, non-finite and out-of-range values read as unknown.
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s).ok()))
    }
}
