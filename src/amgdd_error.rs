//! AmgDdError: unified error type for composite-grid setup.
//!
//! Protocol-invariant violations, transport failures and malformed buffers all
//! surface through this enum. None of them is recoverable: a failure anywhere
//! aborts the whole composite-grid setup.

use std::fmt;
use thiserror::Error;

/// Leaf error carried inside [`AmgDdError::CommError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommError(pub String);

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CommError {}

/// Unified error type for AMG-DD composite-grid operations.
#[derive(Debug, Error)]
pub enum AmgDdError {
    /// A message-passing operation with `neighbor` failed.
    #[error("communication with rank {neighbor} failed: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A received message did not have the byte length announced by the size handshake.
    #[error("buffer from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A wire buffer could not be decoded.
    #[error("malformed buffer: {0}")]
    MalformedBuffer(String),
    /// Setup parameters are out of range.
    #[error("invalid composite-grid parameters: {0}")]
    InvalidParams(String),
    /// The supplied AMG hierarchy is inconsistent.
    #[error("invalid hierarchy on level {level}: {reason}")]
    InvalidHierarchy { level: usize, reason: String },
    /// The one-hop pattern of the input matrix sends to and receives from different ranks.
    #[error("level {level}: one-hop communication pattern is not symmetric (rank {peer})")]
    AsymmetricCommPattern { level: usize, peer: usize },
    /// The non-owned block of a composite grid is not strictly ascending.
    #[error("level {level}: non-owned block not strictly ascending at position {position}")]
    UnsortedNonOwned { level: usize, position: usize },
    /// A global index appears twice in a composite grid.
    #[error("level {level}: global index {global} stored twice")]
    DuplicateNode { level: usize, global: usize },
    /// An incoming node list was not sorted by global index.
    #[error("level {level}: incoming node list from rank {neighbor} is not sorted")]
    UnsortedIncoming { level: usize, neighbor: usize },
    /// A local index points outside the composite grid.
    #[error("level {level}: local index {index} out of range ({num_nodes} nodes)")]
    UnresolvedIndex {
        level: usize,
        index: usize,
        num_nodes: usize,
    },
    /// The structural self-check found a composite grid of the wrong shape.
    #[error("self-check failed on level {level}: {reason}")]
    SelfCheckFailed { level: usize, reason: String },
    /// A non-owned copy of a row disagrees with the owner's data.
    #[error("level {level}: rank {holder} holds stale data for global index {global}: {what}")]
    DataMismatch {
        level: usize,
        holder: usize,
        global: usize,
        what: &'static str,
    },
    /// Final send and receive rank sets are not reciprocal.
    #[error("level {level}: rank {rank} sends to {peer} but {peer} does not send back")]
    AsymmetricSendRecv {
        level: usize,
        rank: usize,
        peer: usize,
    },
}

impl AmgDdError {
    /// Shorthand for a [`AmgDdError::CommError`] carrying a plain message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        AmgDdError::CommError {
            neighbor,
            source: Box::new(CommError(msg.into())),
        }
    }
}
