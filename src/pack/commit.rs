//! Commit links (tree and parents) read from the fixed header layout:
//! `tree <id>\n` followed by zero or more `parent <id>\n` lines.

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;

use super::objects::ObjectId;

const TREE_TAG: &[u8] = b"tree ";
const PARENT_TAG: &[u8] = b"parent ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommitLinks {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
}

pub fn parse_commit_links(content: &[u8], algorithm: HashAlgorithm) -> Result<GitCommitLinks> {
    let hex_len = algorithm.hex_len();
    let tree = read_field(content, 0, TREE_TAG, hex_len)?
        .ok_or_else(|| Error::malformed("commit", "does not start with a tree line"))?;

    let mut offset = TREE_TAG.len() + hex_len + 1;
    let mut parents = Vec::new();
    while let Some(parent) = read_field(content, offset, PARENT_TAG, hex_len)? {
        parents.push(parent);
        offset += PARENT_TAG.len() + hex_len + 1;
    }

    Ok(GitCommitLinks { tree, parents })
}

/// `Ok(None)` when the line at `offset` does not start with `tag`.
fn read_field(
    content: &[u8],
    offset: usize,
    tag: &[u8],
    hex_len: usize,
) -> Result<Option<ObjectId>> {
    let Some(line) = content.get(offset..) else {
        return Ok(None);
    };
    if !line.starts_with(tag) {
        return Ok(None);
    }

    let value = line
        .get(tag.len()..tag.len() + hex_len)
        .filter(|value| value.iter().all(u8::is_ascii_hexdigit))
        .ok_or_else(|| Error::malformed("commit", "object id is truncated or not hex"))?;
    if line.get(tag.len() + hex_len) != Some(&b'\n') {
        return Err(Error::malformed("commit", "object id is not followed by a newline"));
    }

    Ok(Some(String::from_utf8_lossy(value).to_ascii_lowercase()))
}
