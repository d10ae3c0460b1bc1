//! Pack entry headers and the variable-length sizes shared with deltas.

use gix_object::Kind;

use crate::error::{Error, Result};

const VARINT_CONTINUE_FLAG: u8 = 1 << 7;
const VARINT_VALUE_MASK: u8 = VARINT_CONTINUE_FLAG - 1;
const VARINT_ENCODING_BITS: u32 = 7;
const TYPE_SHIFT: u32 = 4;
const TYPE_MASK: u8 = 0b111;
const FIRST_BYTE_SIZE_MASK: u8 = 0x0f;
const FIRST_BYTE_SIZE_BITS: u32 = 4;

/// Type of a pack entry. Delta markers never reach a final [`GitObject`].
///
/// [`GitObject`]: super::GitObject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    Object(Kind),
    OfsDelta,
    RefDelta,
}

impl PackEntryType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(PackEntryType::Object(Kind::Commit)),
            2 => Ok(PackEntryType::Object(Kind::Tree)),
            3 => Ok(PackEntryType::Object(Kind::Blob)),
            4 => Ok(PackEntryType::Object(Kind::Tag)),
            6 => Ok(PackEntryType::OfsDelta),
            7 => Ok(PackEntryType::RefDelta),
            other => Err(Error::UnsupportedObjectType(format!("type code {}", other))),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PackEntryType::Object(Kind::Commit) => 1,
            PackEntryType::Object(Kind::Tree) => 2,
            PackEntryType::Object(Kind::Blob) => 3,
            PackEntryType::Object(Kind::Tag) => 4,
            PackEntryType::OfsDelta => 6,
            PackEntryType::RefDelta => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub entry_type: PackEntryType,
    /// Size of the entry once inflated (the delta payload for delta entries).
    pub inflated_size: usize,
    /// Bytes taken by the header itself.
    pub header_len: usize,
}

/// Read the type-and-size header at the start of `buf`.
///
/// The first byte holds the type in bits 4-6 and the low four size bits;
/// each continuation byte adds seven more size bits.
pub fn read_entry_header(buf: &[u8]) -> Result<EntryHeader> {
    let first = *buf.first().ok_or(Error::Truncated("pack entry header"))?;
    let entry_type = PackEntryType::from_code((first >> TYPE_SHIFT) & TYPE_MASK)?;

    let mut size = usize::from(first & FIRST_BYTE_SIZE_MASK);
    let mut shift = FIRST_BYTE_SIZE_BITS;
    let mut header_len = 1;
    let mut byte = first;
    while byte & VARINT_CONTINUE_FLAG != 0 {
        byte = *buf
            .get(header_len)
            .ok_or(Error::Truncated("pack entry header"))?;
        header_len += 1;
        size = accumulate(size, byte & VARINT_VALUE_MASK, shift)?;
        shift = shift.saturating_add(VARINT_ENCODING_BITS);
    }

    Ok(EntryHeader {
        entry_type,
        inflated_size: size,
        header_len,
    })
}

/// Little-endian base-128 integer, as used for delta base and target sizes.
/// Returns the value and the number of bytes read.
pub(crate) fn read_varint(buf: &[u8], what: &'static str) -> Result<(usize, usize)> {
    let mut value = 0;
    let mut shift = 0u32;
    let mut len = 0;
    loop {
        let byte = *buf.get(len).ok_or(Error::Truncated(what))?;
        len += 1;
        value = accumulate(value, byte & VARINT_VALUE_MASK, shift)?;
        shift = shift.saturating_add(VARINT_ENCODING_BITS);
        if byte & VARINT_CONTINUE_FLAG == 0 {
            return Ok((value, len));
        }
    }
}

/// OR `bits` in at `shift`, refusing to drop any set bit.
fn accumulate(value: usize, bits: u8, shift: u32) -> Result<usize> {
    let bits = usize::from(bits);
    if bits == 0 {
        return Ok(value);
    }
    if shift >= usize::BITS {
        return Err(Error::SizeOverflow);
    }
    let shifted = bits << shift;
    if shifted >> shift != bits {
        return Err(Error::SizeOverflow);
    }
    Ok(value | shifted)
}

pub(crate) fn write_entry_header(out: &mut Vec<u8>, entry_type: PackEntryType, size: usize) {
    let mut byte = (entry_type.code() << TYPE_SHIFT) | (size as u8 & FIRST_BYTE_SIZE_MASK);
    let mut rest = size >> FIRST_BYTE_SIZE_BITS;
    while rest != 0 {
        out.push(byte | VARINT_CONTINUE_FLAG);
        byte = rest as u8 & VARINT_VALUE_MASK;
        rest >>= VARINT_ENCODING_BITS;
    }
    out.push(byte);
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: usize) {
    while value > usize::from(VARINT_VALUE_MASK) {
        out.push(value as u8 & VARINT_VALUE_MASK | VARINT_CONTINUE_FLAG);
        value >>= VARINT_ENCODING_BITS;
    }
    out.push(value as u8);
}
