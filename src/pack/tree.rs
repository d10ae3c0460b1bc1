//! Tree object entries: `<mode> <filename>\0<raw object id>` repeated.

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;

use super::objects::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTreeEntry {
    /// Octal mode as written in the tree, e.g. `100644` or `40000`.
    pub mode: String,
    pub filename: String,
    pub id: ObjectId,
}

impl GitTreeEntry {
    pub fn is_directory(&self) -> bool {
        is_directory_mode(&self.mode)
    }
}

/// Directory entries are the only modes starting with `4`.
pub fn is_directory_mode(mode: &str) -> bool {
    mode.starts_with('4')
}

pub fn parse_tree(content: &[u8], algorithm: HashAlgorithm) -> Result<Vec<GitTreeEntry>> {
    let id_len = algorithm.digest_len();
    let mut entries = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::malformed("tree", "entry has no mode separator"))?;
        let mode = &rest[..space];
        if mode.is_empty() || !mode.iter().all(|b| (b'0'..=b'7').contains(b)) {
            return Err(Error::malformed(
                "tree",
                format!("invalid mode {:?}", String::from_utf8_lossy(mode)),
            ));
        }
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::malformed("tree", "filename is not terminated"))?;
        let filename = std::str::from_utf8(&rest[..nul])
            .map_err(|_| Error::malformed("tree", "filename is not valid UTF-8"))?;
        if filename.is_empty() || filename.contains('/') {
            return Err(Error::malformed(
                "tree",
                format!("invalid filename {:?}", filename),
            ));
        }
        rest = &rest[nul + 1..];

        let raw_id = rest
            .get(..id_len)
            .ok_or_else(|| Error::malformed("tree", "object id is truncated"))?;
        rest = &rest[id_len..];

        entries.push(GitTreeEntry {
            // checked above to be octal digits
            mode: String::from_utf8_lossy(mode).into_owned(),
            filename: filename.to_string(),
            id: hex::encode(raw_id),
        });
    }

    Ok(entries)
}

/// Serialize entries in the given order.
pub fn encode_tree(entries: &[GitTreeEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        let raw_id = hex::decode(&entry.id)
            .map_err(|e| Error::malformed("tree", format!("object id {}: {}", entry.id, e)))?;
        out.extend_from_slice(entry.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.filename.as_bytes());
        out.push(0);
        out.extend_from_slice(&raw_id);
    }
    Ok(out)
}
