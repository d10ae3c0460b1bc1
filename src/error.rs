use thiserror::Error;

use crate::pack::ObjectId;

/// Everything that can abort a shallow clone.
///
/// None of these are retried internally; a failure anywhere discards the
/// objects decoded so far.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A pkt-line length prefix was not valid hex or pointed past the buffer.
    #[error("malformed pkt-line: {0}")]
    ProtocolFraming(String),

    #[error("invalid pack header: {0}")]
    InvalidPackHeader(String),

    /// Input ended in the middle of a structure.
    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),

    /// A variable-length size does not fit in a native integer.
    #[error("variable-length size exceeds {} bits", usize::BITS)]
    SizeOverflow,

    #[error("unsupported pack object type: {0}")]
    UnsupportedObjectType(String),

    #[error("ref_delta refers to {0}, which does not precede it in the pack")]
    UnresolvedDeltaBase(ObjectId),

    #[error("delta opcode 0x00 is reserved")]
    ReservedDeltaOpcode,

    #[error("delta size mismatch: expected {expected} bytes, got {actual}")]
    DeltaSizeMismatch { expected: usize, actual: usize },

    #[error("delta copy of {size} bytes at offset {offset} exceeds base of {base_len} bytes")]
    DeltaCopyOutOfRange {
        offset: usize,
        size: usize,
        base_len: usize,
    },

    #[error("zlib stream inflated to {actual} bytes, header declared {expected}")]
    InflatedSizeMismatch { expected: usize, actual: usize },

    #[error("failed to inflate pack entry")]
    Decompress(#[source] std::io::Error),

    #[error("malformed {kind} object: {reason}")]
    MalformedObject { kind: &'static str, reason: String },

    /// The server left out something it promised at the requested filter level.
    #[error("bogus response from server: {0}")]
    ProtocolInconsistency(String),

    #[error("bogus response from server: extraneous object {0} included in pack")]
    UnexpectedObject(ObjectId),

    /// An id that is not full-length lowercase hex for the configured format.
    #[error("invalid object id {0:?}")]
    InvalidObjectId(String),

    #[error("could not find ref {0:?}")]
    RefNotFound(String),

    /// Message the server sent on the sideband error channel.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("transport request failed: {0:#}")]
    Transport(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedObject {
            kind,
            reason: reason.into(),
        }
    }
}
