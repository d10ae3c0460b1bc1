//! Git object id computation.
//!
//! An object id is the digest of `"<type> <decimal length>\0<content>"`.
//! Ids are always recomputed from decoded content; ids announced by the
//! server are never trusted.

use gix_object::Kind;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::pack::{kind_name, ObjectId};

/// Digest used for content addressing (`extensions.objectFormat`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Length of a raw digest in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    /// Length of a digest rendered as hex.
    pub fn hex_len(self) -> usize {
        self.digest_len() * 2
    }

    /// Raw digest of the canonical object encoding.
    pub fn digest(self, kind: Kind, content: &[u8]) -> Vec<u8> {
        let header = format!("{} {}\0", kind_name(kind), content.len());
        match self {
            HashAlgorithm::Sha1 => digest_with::<Sha1>(header.as_bytes(), content),
            HashAlgorithm::Sha256 => digest_with::<Sha256>(header.as_bytes(), content),
        }
    }

    /// Digest of raw bytes, as used for pack trailers.
    pub fn checksum(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// Lowercase hex object id.
    pub fn object_id(self, kind: Kind, content: &[u8]) -> ObjectId {
        hex::encode(self.digest(kind, content))
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(format!("unknown object format: {}", other)),
        }
    }
}

fn digest_with<D: Digest>(header: &[u8], content: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(header);
    hasher.update(content);
    hasher.finalize().to_vec()
}

/// SHA-1 object id, the format every hosted Git server speaks today.
pub fn compute_object_id(kind: Kind, content: &[u8]) -> ObjectId {
    HashAlgorithm::Sha1.object_id(kind, content)
}
