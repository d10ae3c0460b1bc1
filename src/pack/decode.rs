//! Decode a packfile into content-addressed objects.

use std::collections::HashMap;
use std::io::Read;

use flate2::bufread::ZlibDecoder;

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;

use super::delta::decode_delta;
use super::entry::{read_entry_header, PackEntryType};
use super::objects::{GitObject, GitPack, ObjectId};

const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_HEADER_LEN: usize = 12;
/// Upper bound on buffer space reserved from sizes the server declares.
const MAX_PREALLOCATION: usize = 1 << 20;

/// Decode a SHA-1 pack.
pub fn decode_pack(pack: &[u8]) -> Result<GitPack> {
    decode_pack_with(pack, HashAlgorithm::Sha1)
}

/// Decode a pack whose object ids use `algorithm`.
///
/// Consumes exactly the declared number of entries; the trailing checksum is
/// not verified. `ref_delta` bases must appear earlier in the same pack.
pub fn decode_pack_with(pack: &[u8], algorithm: HashAlgorithm) -> Result<GitPack> {
    let header = pack
        .get(..PACK_HEADER_LEN)
        .ok_or(Error::Truncated("pack header"))?;
    let signature = [header[0], header[1], header[2], header[3]];
    if &signature != PACK_SIGNATURE {
        return Err(Error::InvalidPackHeader(format!(
            "expected signature PACK, found {:?}",
            String::from_utf8_lossy(&signature)
        )));
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != 2 && version != 3 {
        return Err(Error::InvalidPackHeader(format!(
            "unsupported pack version {}",
            version
        )));
    }
    let count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    tracing::debug!("decoding pack v{} with {} objects", version, count);

    let mut objects: Vec<GitObject> = Vec::with_capacity(count.min(4096) as usize);
    let mut by_id: HashMap<ObjectId, usize> = HashMap::new();
    let mut offset = PACK_HEADER_LEN;

    for _ in 0..count {
        let entry = read_entry_header(&pack[offset..])?;
        offset += entry.header_len;

        let object = match entry.entry_type {
            PackEntryType::Object(kind) => {
                let (content, consumed) = inflate(&pack[offset..], entry.inflated_size)?;
                offset += consumed;
                GitObject::with_algorithm(kind, content, algorithm)
            }
            PackEntryType::RefDelta => {
                let id_len = algorithm.digest_len();
                let base_id = pack
                    .get(offset..offset + id_len)
                    .map(hex::encode)
                    .ok_or(Error::Truncated("ref_delta base id"))?;
                offset += id_len;

                let base = by_id
                    .get(&base_id)
                    .map(|&index| &objects[index])
                    .ok_or(Error::UnresolvedDeltaBase(base_id))?;

                let (payload, consumed) = inflate(&pack[offset..], entry.inflated_size)?;
                offset += consumed;

                let content = decode_delta(&payload)?.apply(&base.data)?;
                tracing::trace!("resolved ref_delta against {}", base.id);
                GitObject::with_algorithm(base.kind, content, algorithm)
            }
            PackEntryType::OfsDelta => {
                return Err(Error::UnsupportedObjectType("ofs_delta".to_string()));
            }
        };

        by_id.insert(object.id.clone(), objects.len());
        objects.push(object);
    }

    Ok(GitPack {
        signature,
        version,
        objects,
    })
}

/// Inflate one zlib stream that must produce exactly `expected` bytes.
/// Returns the content and the number of compressed bytes consumed.
fn inflate(data: &[u8], expected: usize) -> Result<(Vec<u8>, usize)> {
    let mut decoder = ZlibDecoder::new(data);
    let mut content = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
    // One byte past the declared size is enough to detect an overlong stream.
    let limit = u64::try_from(expected).unwrap_or(u64::MAX).saturating_add(1);
    (&mut decoder)
        .take(limit)
        .read_to_end(&mut content)
        .map_err(Error::Decompress)?;

    if content.len() != expected {
        return Err(Error::InflatedSizeMismatch {
            expected,
            actual: content.len(),
        });
    }
    let consumed = usize::try_from(decoder.total_in()).map_err(|_| Error::SizeOverflow)?;
    Ok((content, consumed))
}
