//! In-memory storage network used by the pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use weavedrop_protocol::{Tag, Winston};
use weavedrop_transfer::{Chunk, TransferRecord};

use crate::error::RemoteError;
use crate::remote::{
    BalanceQuery, BoxFuture, ChunkAck, ChunkTransport, PriceQuote, RemoteEndpoint, StatusQuery,
    TransferFactory, TransferSigner,
};
use crate::wallet::Credential;

/// A chunk as received by the fake.
#[derive(Debug, Clone)]
pub(crate) struct SentChunk {
    pub transfer_id: String,
    pub offset: u64,
    pub data: Vec<u8>,
    pub checksum: String,
}

/// Implements every collaborator trait and records each call.
///
/// Failures are queued: each call pops at most one entry, and an empty
/// queue means success.
pub(crate) struct FakeRemote {
    pub fee: Mutex<Winston>,
    pub balance: Mutex<Winston>,
    pub price_failures: Mutex<VecDeque<String>>,
    pub create_failures: Mutex<VecDeque<String>>,
    /// When set, every create call fails with this message.
    pub create_always_fails: Mutex<Option<String>>,
    pub sign_failures: Mutex<VecDeque<String>>,
    /// Fails the first send at each listed offset.
    pub chunk_failures: Mutex<Vec<(u64, String)>>,
    /// Status codes returned in order; `200` once exhausted.
    pub statuses: Mutex<VecDeque<u16>>,
    /// Cancels the token once this many chunks have been received.
    pub cancel_after_chunks: Mutex<Option<(usize, CancellationToken)>>,
    /// Returns a wrong offset in the ack for this offset.
    pub misack_offset: Mutex<Option<u64>>,

    pub price_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub created: Mutex<Vec<Vec<Tag>>>,
    pub chunks: Mutex<Vec<SentChunk>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeRemote {
    /// A network where a fee of 1,000 and a balance of 1 AR always succeed.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            fee: Mutex::new(Winston(1_000)),
            balance: Mutex::new(Winston(1_000_000_000_000)),
            price_failures: Mutex::default(),
            create_failures: Mutex::default(),
            create_always_fails: Mutex::default(),
            sign_failures: Mutex::default(),
            chunk_failures: Mutex::default(),
            statuses: Mutex::default(),
            cancel_after_chunks: Mutex::default(),
            misack_offset: Mutex::default(),
            price_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            created: Mutex::default(),
            chunks: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        })
    }

    pub(crate) fn endpoint(self: &Arc<Self>) -> RemoteEndpoint {
        RemoteEndpoint {
            prices: self.clone(),
            balances: self.clone(),
            transfers: self.clone(),
            signer: self.clone(),
            chunks: self.clone(),
            status: self.clone(),
        }
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub(crate) fn chunk_sends(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub(crate) fn sent_offsets(&self) -> Vec<u64> {
        self.chunks.lock().unwrap().iter().map(|c| c.offset).collect()
    }

    /// Reassembles the bytes received for `transfer_id` in offset order.
    pub(crate) fn reassemble(&self, transfer_id: &str) -> Vec<u8> {
        let mut chunks: Vec<SentChunk> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.transfer_id == transfer_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.offset);
        chunks.into_iter().flat_map(|c| c.data).collect()
    }
}

impl PriceQuote for FakeRemote {
    fn quote_price(&self, _size_bytes: u64) -> BoxFuture<'_, Result<Winston, RemoteError>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(msg) = self.price_failures.lock().unwrap().pop_front() {
                return Err(RemoteError::other(msg));
            }
            Ok(*self.fee.lock().unwrap())
        })
    }
}

impl BalanceQuery for FakeRemote {
    fn get_balance<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<Winston, RemoteError>> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(*self.balance.lock().unwrap()) })
    }
}

impl TransferFactory for FakeRemote {
    fn create_transfer<'a>(
        &'a self,
        data_size: u64,
        tags: &'a [Tag],
    ) -> BoxFuture<'a, Result<TransferRecord, RemoteError>> {
        self.created.lock().unwrap().push(tags.to_vec());
        Box::pin(async move {
            if let Some(msg) = self.create_always_fails.lock().unwrap().clone() {
                return Err(RemoteError::other(msg));
            }
            if let Some(msg) = self.create_failures.lock().unwrap().pop_front() {
                return Err(RemoteError::other(msg));
            }
            let fee = *self.fee.lock().unwrap();
            Ok(TransferRecord::unsigned(data_size, tags.to_vec(), fee))
        })
    }
}

impl TransferSigner for FakeRemote {
    fn sign<'a>(
        &'a self,
        mut record: TransferRecord,
        _credential: &'a Credential,
    ) -> BoxFuture<'a, Result<TransferRecord, RemoteError>> {
        Box::pin(async move {
            if let Some(msg) = self.sign_failures.lock().unwrap().pop_front() {
                return Err(RemoteError::other(msg));
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            record
                .assign_id(format!("tx-{n}"))
                .map_err(|e| RemoteError::other(e.to_string()))?;
            record.mark_signed(format!("sig-{n}"));
            Ok(record)
        })
    }
}

impl ChunkTransport for FakeRemote {
    fn send_chunk<'a>(
        &'a self,
        transfer_id: &'a str,
        chunk: &'a Chunk<'a>,
    ) -> BoxFuture<'a, Result<ChunkAck, RemoteError>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            // Let other sends start before this one completes.
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            {
                let mut failures = self.chunk_failures.lock().unwrap();
                if let Some(pos) = failures.iter().position(|(off, _)| *off == chunk.offset) {
                    let (_, msg) = failures.remove(pos);
                    return Err(RemoteError::other(msg));
                }
            }

            let received = {
                let mut chunks = self.chunks.lock().unwrap();
                chunks.push(SentChunk {
                    transfer_id: transfer_id.to_string(),
                    offset: chunk.offset,
                    data: chunk.data.to_vec(),
                    checksum: chunk.checksum.clone(),
                });
                chunks.len()
            };
            if let Some((after, token)) = self.cancel_after_chunks.lock().unwrap().as_ref()
                && received >= *after
            {
                token.cancel();
            }

            let offset = match *self.misack_offset.lock().unwrap() {
                Some(bad) if bad == chunk.offset => chunk.offset + 1,
                _ => chunk.offset,
            };
            Ok(ChunkAck { offset })
        })
    }
}

impl StatusQuery for FakeRemote {
    fn get_status<'a>(&'a self, _transfer_id: &'a str) -> BoxFuture<'a, Result<u16, RemoteError>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(self.statuses.lock().unwrap().pop_front().unwrap_or(200)) })
    }
}
