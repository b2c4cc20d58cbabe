//! Gateway HTTP client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use weavedrop_protocol::Winston;
use weavedrop_protocol::constants::STATUS_CONFIRMED;
use weavedrop_uploader::{BalanceQuery, BoxFuture, PriceQuote, RemoteError, StatusQuery};

use crate::error::GatewayError;

/// Builds the HTTP client shared by every gateway call.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("weavedrop/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Status of a transfer as reported by `GET /tx/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatus {
    /// HTTP status code (200 confirmed, 202 pending, 404 unknown).
    pub code: u16,
    /// Confirmation depth, when the gateway reports it.
    pub confirmations: Option<u64>,
}

impl TxStatus {
    pub fn is_confirmed(&self) -> bool {
        self.code == STATUS_CONFIRMED
    }
}

#[derive(Deserialize)]
struct StatusBody {
    number_of_confirmations: Option<u64>,
}

/// Client for one gateway.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    /// Creates a client for `base_url` using the given HTTP client.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Quotes the fee for storing `size_bytes`.
    pub async fn price(&self, size_bytes: u64) -> Result<Winston, GatewayError> {
        let body = self.get_text(&format!("/price/{size_bytes}")).await?;
        parse_winston(&body)
    }

    /// Returns the balance of `address`.
    pub async fn balance(&self, address: &str) -> Result<Winston, GatewayError> {
        check_id(address)?;
        let body = self.get_text(&format!("/wallet/{address}/balance")).await?;
        parse_winston(&body)
    }

    /// Returns the status of transfer `id`. Non-success codes are reported,
    /// not treated as errors.
    pub async fn tx_status(&self, id: &str) -> Result<TxStatus, GatewayError> {
        check_id(id)?;
        let url = self.url(&format!("/tx/{id}/status"));
        let resp = self.http.get(&url).send().await?;
        let code = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(id, code, "transfer status");

        let confirmations = if code == STATUS_CONFIRMED {
            serde_json::from_str::<StatusBody>(&body)
                .ok()
                .and_then(|b| b.number_of_confirmations)
        } else {
            None
        };
        Ok(TxStatus {
            code,
            confirmations,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str) -> Result<String, GatewayError> {
        let url = self.url(path);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.text().await?)
    }
}

/// Parses a plain-text winston amount.
fn parse_winston(body: &str) -> Result<Winston, GatewayError> {
    body.trim()
        .parse()
        .map_err(|_| GatewayError::Parse(format!("expected a winston amount, got {body:?}")))
}

/// Addresses and transfer ids are base64url; anything else would change the path.
fn check_id(id: &str) -> Result<(), GatewayError> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidId(id.to_string()))
    }
}

impl PriceQuote for GatewayClient {
    fn quote_price(&self, size_bytes: u64) -> BoxFuture<'_, Result<Winston, RemoteError>> {
        Box::pin(async move { self.price(size_bytes).await.map_err(RemoteError::from) })
    }
}

impl BalanceQuery for GatewayClient {
    fn get_balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Winston, RemoteError>> {
        Box::pin(async move { self.balance(address).await.map_err(RemoteError::from) })
    }
}

impl StatusQuery for GatewayClient {
    fn get_status<'a>(&'a self, transfer_id: &'a str) -> BoxFuture<'a, Result<u16, RemoteError>> {
        Box::pin(async move {
            self.tx_status(transfer_id)
                .await
                .map(|s| s.code)
                .map_err(RemoteError::from)
        })
    }
}
