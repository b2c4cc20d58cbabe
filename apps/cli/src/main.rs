//! weavedrop CLI
//!
//! Pre-flight checks against a storage gateway.
//!
//! # Commands
//! - `estimate` - Quote the storage fee for a size or a file
//! - `wallet` - Validate a JWK wallet key and show its balance
//! - `status` - Show the confirmation status of a transaction
//!
//! Output is JSON on stdout; logs go to stderr (`RUST_LOG`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use weavedrop_gateway::{GatewayClient, build_http_client};
use weavedrop_uploader::{
    CostEstimator, Credential, CredentialValidator, UploadError, UploaderConfig,
};

#[derive(Parser, Debug)]
#[command(name = "weavedrop")]
#[command(about = "Permanent storage upload pre-flight checks")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true, env = "WEAVEDROP_CONFIG", default_value = "weavedrop.json")]
    config: PathBuf,

    /// Gateway URL (overrides config file)
    #[arg(long, global = true)]
    gateway: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Quote the storage fee
    #[command(group(ArgGroup::new("input").required(true).args(["size", "file"])))]
    Estimate {
        /// Payload size in bytes
        #[arg(long)]
        size: Option<u64>,

        /// File whose size is quoted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Validate a wallet key and show address and balance
    Wallet {
        /// Path to the JWK key file
        #[arg(short, long)]
        key: PathBuf,
    },

    /// Show transaction status
    Status {
        /// Transaction id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,weavedrop=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config, cli.gateway.as_deref())?;
    debug!(gateway = %config.gateway_url, "config loaded");

    let http = build_http_client(config.request_timeout())?;
    let gateway = Arc::new(GatewayClient::new(http, config.gateway_url.clone()));

    match cli.command {
        Commands::Estimate { size, file } => {
            let size = match (size, file) {
                (Some(size), _) => size,
                (None, Some(path)) => file_size(&path).await?,
                (None, None) => anyhow::bail!("either --size or --file is required"),
            };
            let estimator = CostEstimator::new(gateway, config.request_timeout());
            let estimate = estimator.estimate(size).await.map_err(with_hint)?;
            print_json(&estimate)?;
        }

        Commands::Wallet { key } => {
            let credential = Credential::from_jwk_file(&key).map_err(with_hint)?;
            let validator = CredentialValidator::new(gateway, config.request_timeout());
            let info = validator.validate(&credential).await.map_err(with_hint)?;
            print_json(&info)?;
        }

        Commands::Status { id } => {
            let status = gateway
                .tx_status(&id)
                .await
                .with_context(|| format!("status query for {id} failed"))?;
            print_json(&StatusOutput {
                transaction_id: &id,
                storage_url: config.storage_url(&id),
                confirmed: status.is_confirmed(),
                status,
            })?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput<'a> {
    transaction_id: &'a str,
    storage_url: String,
    confirmed: bool,
    #[serde(flatten)]
    status: weavedrop_gateway::TxStatus,
}

/// Loads the config file (defaults if absent) and applies the gateway override.
fn load_config(path: &Path, gateway: Option<&str>) -> Result<UploaderConfig> {
    let mut config = UploaderConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Some(url) = gateway {
        config.gateway_url = url.to_string();
    }
    config.validate()?;
    Ok(config)
}

async fn file_size(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    anyhow::ensure!(meta.is_file(), "{} is not a file", path.display());
    Ok(meta.len())
}

fn with_hint(err: UploadError) -> anyhow::Error {
    let hint = err.suggested_action().to_string();
    anyhow::Error::new(err).context(hint)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
