//! Network and pipeline constants.

/// Default size of a transfer chunk (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Upper bound on chunk sends in flight for a single upload.
pub const MAX_CONCURRENT_CHUNKS: usize = 4;

/// Winston per AR (the network's base unit is 10^-12 AR).
pub const WINSTON_PER_AR: u128 = 1_000_000_000_000;

/// Display symbol of the network's native token.
pub const TOKEN_SYMBOL: &str = "AR";

/// Default public gateway.
pub const DEFAULT_GATEWAY_URL: &str = "https://arweave.net";

/// Content type used when neither the caller nor the payload declares one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Reserved tag carrying the payload's MIME type.
pub const CONTENT_TYPE_TAG: &str = "Content-Type";

/// Reserved tag naming the uploading application.
pub const APP_NAME_TAG: &str = "App-Name";

/// Status code reported by the gateway for a confirmed transfer.
pub const STATUS_CONFIRMED: u16 = 200;
