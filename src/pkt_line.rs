//! pkt-line framing used by every smart-HTTP exchange.
//!
//! Each line starts with four hex digits giving the total line length,
//! header included. `0000` is a flush marker with no payload.

use crate::error::{Error, Result};

/// Flush marker.
pub const FLUSH: &str = "0000";

/// Sideband channel carrying packfile bytes.
pub const BAND_PACK: u8 = 1;
/// Sideband channel carrying human-readable progress.
pub const BAND_PROGRESS: u8 = 2;
/// Sideband channel carrying a fatal error message.
pub const BAND_ERROR: u8 = 3;

/// Largest payload of a `side-band-64k` data line, band byte excluded.
pub const MAX_SIDEBAND_PAYLOAD: usize = 65520 - 4 - 1;

const HEADER_LEN: usize = 4;
const PACK_SIGNATURE: &[u8] = b"PACK";

/// One framed line. Payloads borrow from the decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLine<'a> {
    Flush,
    Data(&'a [u8]),
}

/// Split a buffer into pkt-lines, preserving order.
pub fn decode_lines(buffer: &[u8]) -> Result<Vec<PacketLine<'_>>> {
    let mut lines = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        let header = buffer.get(offset..offset + HEADER_LEN).ok_or_else(|| {
            Error::ProtocolFraming(format!("truncated length prefix at offset {}", offset))
        })?;
        let len = parse_length(header).ok_or_else(|| {
            Error::ProtocolFraming(format!(
                "invalid length prefix {:?} at offset {}",
                String::from_utf8_lossy(header),
                offset
            ))
        })?;

        if len == 0 {
            lines.push(PacketLine::Flush);
            offset += HEADER_LEN;
            continue;
        }
        if len < HEADER_LEN {
            return Err(Error::ProtocolFraming(format!(
                "length {} at offset {} is shorter than its own header",
                len, offset
            )));
        }

        let payload = buffer.get(offset + HEADER_LEN..offset + len).ok_or_else(|| {
            Error::ProtocolFraming(format!(
                "line of {} bytes at offset {} runs past end of buffer ({} bytes)",
                len,
                offset,
                buffer.len()
            ))
        })?;
        lines.push(PacketLine::Data(payload));
        offset += len;
    }

    Ok(lines)
}

fn parse_length(header: &[u8]) -> Option<usize> {
    if !header.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(header).ok()?;
    usize::from_str_radix(text, 16).ok()
}

/// Frame one text line.
pub fn format_line(line: &str) -> String {
    format!("{:04x}{}", line.len() + HEADER_LEN, line)
}

/// Frame `data` as a run of sideband lines on `band`.
pub fn encode_sideband(band: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_SIDEBAND_PAYLOAD * 5 + 5);
    for chunk in data.chunks(MAX_SIDEBAND_PAYLOAD) {
        out.extend_from_slice(format!("{:04x}", chunk.len() + HEADER_LEN + 1).as_bytes());
        out.push(band);
        out.extend_from_slice(chunk);
    }
    out
}

/// Reassemble the packfile carried on band 1 of an upload-pack response.
///
/// Text lines before the pack (`NAK`, `shallow ...`) are skipped. Collection
/// starts at the band-1 line beginning with `PACK` and stops at the next
/// flush. Progress text is logged; an error band or `ERR` line aborts.
pub fn extract_pack(lines: &[PacketLine<'_>]) -> Result<Vec<u8>> {
    let mut pack = Vec::new();
    let mut in_pack = false;

    for line in lines {
        let payload = match line {
            PacketLine::Flush if in_pack => break,
            PacketLine::Flush => continue,
            PacketLine::Data(payload) => *payload,
        };

        if !in_pack && payload.starts_with(b"ERR ") {
            return Err(Error::Remote(lossy_text(&payload[4..])));
        }

        let Some((&band, data)) = payload.split_first() else {
            continue;
        };
        match band {
            BAND_PACK => {
                if in_pack || data.starts_with(PACK_SIGNATURE) {
                    in_pack = true;
                    pack.extend_from_slice(data);
                }
            }
            BAND_PROGRESS => {
                tracing::debug!("remote: {}", lossy_text(data));
            }
            BAND_ERROR => return Err(Error::Remote(lossy_text(data))),
            _ => {
                tracing::trace!("skipping line: {}", lossy_text(payload));
            }
        }
    }

    if !in_pack {
        return Err(Error::ProtocolInconsistency(
            "response did not contain a packfile".to_string(),
        ));
    }
    Ok(pack)
}

/// Frame, demultiplex and reassemble in one step.
pub fn read_pack_response(buffer: &[u8]) -> Result<Vec<u8>> {
    extract_pack(&decode_lines(buffer)?)
}

fn lossy_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_only() {
        let lines = decode_lines(b"0000").unwrap();
        assert_eq!(lines, vec![PacketLine::Flush]);
    }

    #[test]
    fn test_data_and_flush() {
        let buffer = b"0009hello0000000aworld\n";
        let lines = decode_lines(buffer).unwrap();
        assert_eq!(
            lines,
            vec![
                PacketLine::Data(b"hello"),
                PacketLine::Flush,
                PacketLine::Data(b"world\n"),
            ]
        );
    }

    #[test]
    fn test_empty_data_line() {
        let lines = decode_lines(b"0004").unwrap();
        assert_eq!(lines, vec![PacketLine::Data(b"")]);
    }

    #[test]
    fn test_uppercase_hex_length() {
        let mut buffer = b"001A".to_vec();
        buffer.extend_from_slice(&[b'x'; 0x1a - 4]);
        let lines = decode_lines(&buffer).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_decoding_is_repeatable() {
        let buffer = b"000eversion 1\n0000";
        assert_eq!(decode_lines(buffer).unwrap(), decode_lines(buffer).unwrap());
    }

    #[test]
    fn test_malformed_length() {
        assert!(matches!(
            decode_lines(b"00zzabc"),
            Err(Error::ProtocolFraming(_))
        ));
        assert!(matches!(
            decode_lines(b"+00a123456"),
            Err(Error::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_short_and_overlong_lines() {
        assert!(matches!(decode_lines(b"0002"), Err(Error::ProtocolFraming(_))));
        assert!(matches!(decode_lines(b"00ffabc"), Err(Error::ProtocolFraming(_))));
        assert!(matches!(decode_lines(b"00"), Err(Error::ProtocolFraming(_))));
    }

    #[test]
    fn test_format_line() {
        assert_eq!(format_line("deepen 1"), "000cdeepen 1");
        assert_eq!(format_line("done"), "0008done");
        assert_eq!(format!("{}{}", FLUSH, format_line("done")), "00000008done");
    }

    #[test]
    fn test_extract_pack_skips_preamble_and_progress() {
        let mut response = format_line("NAK\n").into_bytes();
        response.extend(encode_sideband(BAND_PROGRESS, b"Counting objects: 1\n"));
        response.extend(encode_sideband(BAND_PACK, b"PACK\x00\x00"));
        response.extend(encode_sideband(BAND_PROGRESS, b"Total 1\n"));
        response.extend(encode_sideband(BAND_PACK, b"\x00\x02rest"));
        response.extend(FLUSH.as_bytes());
        response.extend(encode_sideband(BAND_PACK, b"ignored"));

        let pack = read_pack_response(&response).unwrap();
        assert_eq!(pack, b"PACK\x00\x00\x00\x02rest");
    }

    #[test]
    fn test_extract_pack_splits_large_payloads() {
        let data: Vec<u8> = b"PACK"
            .iter()
            .copied()
            .chain((0..MAX_SIDEBAND_PAYLOAD * 2).map(|i| i as u8))
            .collect();
        let mut response = encode_sideband(BAND_PACK, &data);
        response.extend(FLUSH.as_bytes());

        let lines = decode_lines(&response).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(extract_pack(&lines).unwrap(), data);
    }

    #[test]
    fn test_extract_pack_surfaces_remote_error() {
        let mut response = encode_sideband(BAND_ERROR, b"upload-pack: not our ref\n");
        response.extend(FLUSH.as_bytes());
        match read_pack_response(&response) {
            Err(Error::Remote(message)) => assert_eq!(message, "upload-pack: not our ref"),
            other => panic!("expected remote error, got {:?}", other),
        }

        let response = format_line("ERR access denied");
        assert!(matches!(
            read_pack_response(response.as_bytes()),
            Err(Error::Remote(_))
        ));
    }

    #[test]
    fn test_extract_pack_without_pack() {
        let mut response = format_line("NAK\n").into_bytes();
        response.extend(FLUSH.as_bytes());
        assert!(matches!(
            read_pack_response(&response),
            Err(Error::ProtocolInconsistency(_))
        ));
    }
}
