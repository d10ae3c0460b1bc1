//! Resolve a ref name to a commit id from an `info/refs` advertisement.
//!
//! The advertisement is a service announcement block ending in a flush,
//! then one `<id> <refname>` line per ref, then a closing flush. The first
//! ref line carries the server capabilities after a NUL byte.

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::pack::ObjectId;
use crate::pkt_line::{decode_lines, PacketLine};
use crate::transport::{GitRequest, Transport};

/// Find the id advertised for `ref_name`, compared byte for byte.
///
/// Absence is `Ok(None)`; only framing problems are errors.
pub fn find_commit_of_ref_in_advertisement(
    buffer: &[u8],
    ref_name: &str,
) -> Result<Option<ObjectId>> {
    let wanted = ref_name.as_bytes();
    let mut seen_flush = false;
    let mut is_first = true;

    for line in decode_lines(buffer)? {
        let payload = match line {
            PacketLine::Flush if seen_flush => break,
            PacketLine::Flush => {
                seen_flush = true;
                continue;
            }
            PacketLine::Data(_) if !seen_flush => continue,
            PacketLine::Data(payload) => payload,
        };

        let payload = if is_first {
            is_first = false;
            strip_capabilities(payload)
        } else {
            payload
        };

        let Some((id, name)) = split_ref_line(payload) else {
            tracing::warn!(
                "skipping malformed ref advertisement line: {}",
                String::from_utf8_lossy(payload).trim_end()
            );
            continue;
        };
        if name == wanted {
            return Ok(Some(id));
        }
    }

    Ok(None)
}

fn strip_capabilities(payload: &[u8]) -> &[u8] {
    match payload.iter().position(|&b| b == 0) {
        Some(nul) => &payload[..nul],
        None => payload,
    }
}

/// Split `<hex id> <name>[\n]`. The id must be a full SHA-1 or SHA-256 id.
fn split_ref_line(payload: &[u8]) -> Option<(ObjectId, &[u8])> {
    let payload = payload.strip_suffix(b"\n").unwrap_or(payload);
    let space = payload.iter().position(|&b| b == b' ')?;
    let (id, name) = (&payload[..space], &payload[space + 1..]);
    let full_length = [HashAlgorithm::Sha1, HashAlgorithm::Sha256]
        .iter()
        .any(|algorithm| algorithm.hex_len() == id.len());
    if !full_length || !id.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    Some((String::from_utf8_lossy(id).to_ascii_lowercase(), name))
}

/// Fetch the advertisement and look `ref_name` up in it.
pub async fn maybe_find_commit_of_ref<T: Transport>(
    ref_name: &str,
    transport: &T,
) -> Result<Option<ObjectId>> {
    let advertisement = transport
        .request(GitRequest::InfoRefs)
        .await
        .map_err(Error::Transport)?;
    find_commit_of_ref_in_advertisement(&advertisement, ref_name)
}

/// Like [`maybe_find_commit_of_ref`], but a missing ref is an error.
pub async fn find_commit_of_ref<T: Transport>(ref_name: &str, transport: &T) -> Result<ObjectId> {
    let commit = maybe_find_commit_of_ref(ref_name, transport)
        .await?
        .ok_or_else(|| Error::RefNotFound(ref_name.to_string()))?;
    tracing::info!("resolved {} to {}", ref_name, commit);
    Ok(commit)
}
