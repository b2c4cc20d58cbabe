use serde::{Deserialize, Serialize};
use weavedrop_protocol::{Tag, Winston};

use crate::TransferError;

/// An immutable byte payload with its declared content type.
///
/// The pipeline only ever reads slices of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    content_type: Option<String>,
}

impl Payload {
    /// Creates a payload with a declared MIME type.
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        Self {
            data,
            content_type: (!content_type.trim().is_empty()).then_some(content_type),
        }
    }

    /// Creates a payload without a declared content type.
    pub fn untyped(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: None,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// A contiguous byte range of a payload, the unit of network transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of this chunk in payload order.
    pub index: usize,
    /// Byte offset within the payload.
    pub offset: u64,
    /// Borrowed chunk bytes.
    pub data: &'a [u8],
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk<'_> {
    /// Size of this chunk in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.size()
    }
}

/// Per-attempt lifecycle of an upload.
///
/// Variants are declared in pipeline order; non-terminal phases only move
/// forward, and every attempt ends in exactly one terminal phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    CreatingTransfer,
    Signing,
    Transferring,
    Confirming,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Phase::Idle => false,
            Phase::Failed | Phase::Cancelled => true,
            Phase::Completed => self == Phase::Confirming,
            _ => next > self,
        }
    }

    /// Validates and returns the transition `self -> next`.
    pub fn transition(self, next: Phase) -> Result<Phase, TransferError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransferError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Signature state of a transfer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SignatureState {
    #[default]
    Unsigned,
    Signed { signature: String },
}

/// The signed unit of work for one upload attempt.
///
/// The identifier is absent until the remote side assigns it and can be
/// assigned only once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    id: Option<String>,
    pub data_size: u64,
    pub tags: Vec<Tag>,
    pub reward: Winston,
    pub signature: SignatureState,
}

impl TransferRecord {
    /// Creates an unsigned record with no identifier.
    pub fn unsigned(data_size: u64, tags: Vec<Tag>, reward: Winston) -> Self {
        Self {
            id: None,
            data_size,
            tags,
            reward,
            signature: SignatureState::Unsigned,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigns the identifier. Fails if one is already present.
    pub fn assign_id(&mut self, id: impl Into<String>) -> Result<(), TransferError> {
        if let Some(existing) = &self.id {
            return Err(TransferError::IdAlreadyAssigned(existing.clone()));
        }
        self.id = Some(id.into());
        Ok(())
    }

    pub fn mark_signed(&mut self, signature: impl Into<String>) {
        self.signature = SignatureState::Signed {
            signature: signature.into(),
        };
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.signature, SignatureState::Signed { .. })
    }
}
