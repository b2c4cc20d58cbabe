//! Collaborator traits for the remote storage network.
//!
//! The pipeline never talks to the network directly. Callers implement
//! these traits on top of their transport and hand the pipeline a
//! [`RemoteEndpoint`]; tests implement them with in-memory fakes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use weavedrop_protocol::{Tag, Winston};
use weavedrop_transfer::{Chunk, TransferRecord};

use crate::error::RemoteError;
use crate::wallet::Credential;

/// Boxed, sendable future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Quotes the storage fee for a payload size.
pub trait PriceQuote: Send + Sync {
    fn quote_price(&self, size_bytes: u64) -> BoxFuture<'_, Result<Winston, RemoteError>>;
}

/// Looks up the spendable balance of an address.
pub trait BalanceQuery: Send + Sync {
    fn get_balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Winston, RemoteError>>;
}

/// Creates an unsigned transfer record priced for `data_size` bytes.
pub trait TransferFactory: Send + Sync {
    fn create_transfer<'a>(
        &'a self,
        data_size: u64,
        tags: &'a [Tag],
    ) -> BoxFuture<'a, Result<TransferRecord, RemoteError>>;
}

/// Signs a transfer record. The signed record must carry its identifier.
pub trait TransferSigner: Send + Sync {
    fn sign<'a>(
        &'a self,
        record: TransferRecord,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<TransferRecord, RemoteError>>;
}

/// Acknowledgment of a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    /// Offset of the acknowledged chunk.
    pub offset: u64,
}

/// Sends one chunk of a signed transfer.
pub trait ChunkTransport: Send + Sync {
    fn send_chunk<'a>(
        &'a self,
        transfer_id: &'a str,
        chunk: &'a Chunk<'a>,
    ) -> BoxFuture<'a, Result<ChunkAck, RemoteError>>;
}

/// Reports an HTTP-like status code for a transfer.
pub trait StatusQuery: Send + Sync {
    fn get_status<'a>(&'a self, transfer_id: &'a str) -> BoxFuture<'a, Result<u16, RemoteError>>;
}

/// Handle to every collaborator the pipeline needs.
///
/// Built once by the caller and shared read-only by any number of
/// concurrent uploads; implementations must be safe for concurrent use.
#[derive(Clone)]
pub struct RemoteEndpoint {
    pub prices: Arc<dyn PriceQuote>,
    pub balances: Arc<dyn BalanceQuery>,
    pub transfers: Arc<dyn TransferFactory>,
    pub signer: Arc<dyn TransferSigner>,
    pub chunks: Arc<dyn ChunkTransport>,
    pub status: Arc<dyn StatusQuery>,
}

/// Bounds a collaborator call by `timeout`.
pub(crate) async fn with_timeout<T>(
    timeout: std::time::Duration,
    fut: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}
