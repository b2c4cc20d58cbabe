//! Signing credential model and the credential validator.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use weavedrop_protocol::{WalletInfo, Winston};

use crate::error::UploadError;
use crate::remote::{BalanceQuery, with_timeout};

/// Base64url that accepts input with or without padding, as JWK exporters vary.
const JWK_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An RSA signing key in JWK form.
///
/// Fields absent from the source document deserialize as empty strings so
/// that [`check_structure`](Self::check_structure) can name what is missing.
/// The value is supplied per call and never stored by the pipeline.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub n: String,
    #[serde(default)]
    pub e: String,
    #[serde(default)]
    pub d: String,
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub dp: String,
    #[serde(default)]
    pub dq: String,
    #[serde(default)]
    pub qi: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kty", &self.kty)
            .field("n", &format_args!("<{} chars>", self.n.len()))
            .field("e", &self.e)
            .field("private", &"<redacted>")
            .finish()
    }
}

impl Credential {
    /// Names of the fields every credential must carry.
    pub const REQUIRED_FIELDS: [&'static str; 9] =
        ["kty", "n", "e", "d", "p", "q", "dp", "dq", "qi"];

    /// Parses a JWK JSON document.
    pub fn from_jwk_str(json: &str) -> Result<Self, UploadError> {
        serde_json::from_str(json)
            .map_err(|e| UploadError::validation(format!("invalid key format: {e}")))
    }

    /// Reads and parses a JWK file.
    pub fn from_jwk_file(path: &Path) -> Result<Self, UploadError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploadError::validation(format!(
                "could not read wallet key file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_jwk_str(&content)
    }

    fn fields(&self) -> [(&'static str, &str); 9] {
        [
            ("kty", &self.kty),
            ("n", &self.n),
            ("e", &self.e),
            ("d", &self.d),
            ("p", &self.p),
            ("q", &self.q),
            ("dp", &self.dp),
            ("dq", &self.dq),
            ("qi", &self.qi),
        ]
    }

    /// Checks that every required field is present and that the key is RSA.
    pub fn check_structure(&self) -> Result<(), UploadError> {
        let missing: Vec<&str> = self
            .fields()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(UploadError::validation(format!(
                "invalid wallet key: missing {}",
                missing.join(", ")
            )));
        }
        if self.kty != "RSA" {
            return Err(UploadError::validation(format!(
                "invalid wallet key: unsupported key type {:?}",
                self.kty
            )));
        }
        Ok(())
    }

    /// Derives the public address: base64url(SHA-256(modulus bytes)).
    pub fn address(&self) -> Result<String, UploadError> {
        let modulus = JWK_BASE64
            .decode(self.n.trim())
            .map_err(|e| UploadError::validation(format!("invalid key format: modulus: {e}")))?;
        if modulus.is_empty() {
            return Err(UploadError::validation("invalid wallet key: empty modulus"));
        }
        let digest = Sha256::digest(&modulus);
        Ok(JWK_BASE64.encode(digest))
    }
}

/// Verifies credentials and reports their spendable balance.
#[derive(Clone)]
pub struct CredentialValidator {
    balances: Arc<dyn BalanceQuery>,
    timeout: Duration,
}

impl CredentialValidator {
    pub fn new(balances: Arc<dyn BalanceQuery>, timeout: Duration) -> Self {
        Self { balances, timeout }
    }

    /// Validates structure, derives the address, and queries its balance.
    ///
    /// Structural problems fail before any network call. A failed balance
    /// lookup is a network error.
    pub async fn validate(&self, credential: &Credential) -> Result<WalletInfo, UploadError> {
        credential.check_structure()?;
        let address = credential.address()?;
        self.wallet_info(address).await
    }

    /// Queries the balance of an address derived from an already checked
    /// credential.
    pub(crate) async fn wallet_info(&self, address: String) -> Result<WalletInfo, UploadError> {
        let balance = self.balance_of(&address).await?;
        debug!(address = %address, balance = %balance, "wallet validated");
        Ok(WalletInfo {
            formatted_balance: balance.formatted(),
            address,
            balance,
        })
    }

    /// Returns whether the credential's balance covers `required`.
    pub async fn check_sufficient_balance(
        &self,
        credential: &Credential,
        required: Winston,
    ) -> Result<bool, UploadError> {
        let info = self.validate(credential).await?;
        Ok(info.balance >= required)
    }

    async fn balance_of(&self, address: &str) -> Result<Winston, UploadError> {
        with_timeout(self.timeout, self.balances.get_balance(address))
            .await
            .map_err(|e| UploadError::network(format!("balance query failed: {e}")))
    }
}
