//! Git object handling using gitoxide's object kinds

use gix_object::Kind;

use crate::hash::HashAlgorithm;

/// Git object identifier (lowercase hex digest)
pub type ObjectId = String;

/// A fully materialized Git object.
///
/// `id` is always computed from `kind` and `data`, never taken from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitObject {
    pub id: ObjectId,
    pub kind: Kind,
    pub data: Vec<u8>,
}

impl GitObject {
    /// Create a GitObject from raw object data (without header), hashed with SHA-1
    pub fn from_raw(kind: Kind, data: Vec<u8>) -> Self {
        Self::with_algorithm(kind, data, HashAlgorithm::Sha1)
    }

    pub fn with_algorithm(kind: Kind, data: Vec<u8>, algorithm: HashAlgorithm) -> Self {
        let id = algorithm.object_id(kind, &data);
        Self { id, kind, data }
    }

    /// Get the object data without header
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Decoded packfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitPack {
    /// Format tag, always `PACK` once decoding succeeds.
    pub signature: [u8; 4],
    pub version: u32,
    /// Objects in pack order; length equals the declared object count.
    pub objects: Vec<GitObject>,
}

/// Type name used in the canonical object header.
pub fn kind_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Commit => "commit",
        Kind::Tree => "tree",
        Kind::Blob => "blob",
        Kind::Tag => "tag",
    }
}
