//! Delta instruction streams (`ref_delta` payloads).
//!
//! A payload is two base-128 sizes (base, target) followed by opcodes. An
//! opcode with the high bit set copies a slice of the base; its low four
//! bits select which offset bytes follow and the next three which size bytes
//! follow. Any other nonzero opcode inserts that many literal bytes.

use crate::error::{Error, Result};

use super::entry::{read_varint, write_varint};

const COPY_INSTRUCTION_FLAG: u8 = 1 << 7;
const COPY_OFFSET_BYTES: u8 = 4;
const COPY_SIZE_BYTES: u8 = 3;
/// Size of a copy whose encoded size is zero.
const COPY_ZERO_SIZE: usize = 0x10000;
const MAX_INSERT_LEN: usize = 0x7f;
/// Upper bound on output space reserved from a declared target size.
const MAX_PREALLOCATION: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaInstruction<'a> {
    /// Copy `size` bytes of the base starting at `offset`.
    Copy { offset: usize, size: usize },
    /// Append literal bytes.
    Insert(&'a [u8]),
}

impl DeltaInstruction<'_> {
    /// Number of bytes this instruction contributes to the output.
    pub fn len(&self) -> usize {
        match self {
            DeltaInstruction::Copy { size, .. } => *size,
            DeltaInstruction::Insert(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded delta payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<'a> {
    /// Base size announced by the payload.
    pub base_size: usize,
    pub instructions: Vec<DeltaInstruction<'a>>,
    /// Sum of instruction lengths; checked against the announced target size.
    pub reconstructed_size: usize,
}

impl Delta<'_> {
    /// Rebuild the target object from `base`.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        if base.len() != self.base_size {
            return Err(Error::DeltaSizeMismatch {
                expected: self.base_size,
                actual: base.len(),
            });
        }
        apply_delta(base, &self.instructions, self.reconstructed_size)
    }
}

pub fn decode_delta(payload: &[u8]) -> Result<Delta<'_>> {
    let (base_size, base_len) = read_varint(payload, "delta base size")?;
    let (target_size, target_len) = read_varint(&payload[base_len..], "delta target size")?;

    let mut cursor = base_len + target_len;
    let mut instructions = Vec::new();
    let mut reconstructed_size: usize = 0;
    while let Some(&opcode) = payload.get(cursor) {
        cursor += 1;
        let instruction = if opcode & COPY_INSTRUCTION_FLAG != 0 {
            let mut present = opcode;
            let offset = read_partial_int(payload, &mut cursor, COPY_OFFSET_BYTES, &mut present)?;
            let size = read_partial_int(payload, &mut cursor, COPY_SIZE_BYTES, &mut present)?;
            let size = if size == 0 { COPY_ZERO_SIZE } else { size };
            if offset.checked_add(size).map_or(true, |end| end > base_size) {
                return Err(Error::DeltaCopyOutOfRange {
                    offset,
                    size,
                    base_len: base_size,
                });
            }
            DeltaInstruction::Copy { offset, size }
        } else if opcode == 0 {
            return Err(Error::ReservedDeltaOpcode);
        } else {
            let len = usize::from(opcode);
            let data = payload
                .get(cursor..cursor + len)
                .ok_or(Error::Truncated("delta insert data"))?;
            cursor += len;
            DeltaInstruction::Insert(data)
        };
        reconstructed_size = reconstructed_size
            .checked_add(instruction.len())
            .ok_or(Error::SizeOverflow)?;
        instructions.push(instruction);
    }

    if reconstructed_size != target_size {
        return Err(Error::DeltaSizeMismatch {
            expected: target_size,
            actual: reconstructed_size,
        });
    }

    Ok(Delta {
        base_size,
        instructions,
        reconstructed_size,
    })
}

/// Read up to `bytes` little-endian bytes, one per low bit of `present_bytes`.
fn read_partial_int(
    payload: &[u8],
    cursor: &mut usize,
    bytes: u8,
    present_bytes: &mut u8,
) -> Result<usize> {
    let mut value = 0;
    for byte_index in 0..bytes {
        if *present_bytes & 1 != 0 {
            let byte = *payload
                .get(*cursor)
                .ok_or(Error::Truncated("delta copy operand"))?;
            *cursor += 1;
            value |= usize::from(byte) << (byte_index * 8);
        }
        *present_bytes >>= 1;
    }
    Ok(value)
}

/// Concatenate the selected base slices and literal inserts.
///
/// The output must come out at exactly `size` bytes. Copies are checked
/// against `base` as they are applied, so the declared size only bounds the
/// initial reservation.
pub fn apply_delta(
    base: &[u8],
    instructions: &[DeltaInstruction<'_>],
    size: usize,
) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(size.min(MAX_PREALLOCATION));
    for instruction in instructions {
        match *instruction {
            DeltaInstruction::Copy { offset, size: len } => {
                let slice = offset
                    .checked_add(len)
                    .and_then(|end| base.get(offset..end))
                    .ok_or(Error::DeltaCopyOutOfRange {
                        offset,
                        size: len,
                        base_len: base.len(),
                    })?;
                output.extend_from_slice(slice);
            }
            DeltaInstruction::Insert(data) => output.extend_from_slice(data),
        }
        if output.len() > size {
            break;
        }
    }

    if output.len() != size {
        return Err(Error::DeltaSizeMismatch {
            expected: size,
            actual: output.len(),
        });
    }
    Ok(output)
}

/// Encode a delta payload against a base of `base_size` bytes.
///
/// Long inserts and copies are split; copy offsets must fit in 32 bits.
pub fn encode_delta(base_size: usize, instructions: &[DeltaInstruction<'_>]) -> Result<Vec<u8>> {
    let target_size = instructions
        .iter()
        .try_fold(0usize, |total, instruction| total.checked_add(instruction.len()))
        .ok_or(Error::SizeOverflow)?;

    let mut out = Vec::new();
    write_varint(&mut out, base_size);
    write_varint(&mut out, target_size);

    for instruction in instructions {
        match *instruction {
            DeltaInstruction::Copy { mut offset, size } => {
                let mut remaining = size;
                while remaining > 0 {
                    let chunk = remaining.min(COPY_ZERO_SIZE);
                    let offset32 = u32::try_from(offset).map_err(|_| Error::SizeOverflow)?;
                    write_copy(&mut out, offset32, chunk);
                    offset += chunk;
                    remaining -= chunk;
                }
            }
            DeltaInstruction::Insert(data) => {
                for chunk in data.chunks(MAX_INSERT_LEN) {
                    out.push(chunk.len() as u8);
                    out.extend_from_slice(chunk);
                }
            }
        }
    }
    Ok(out)
}

fn write_copy(out: &mut Vec<u8>, offset: u32, size: usize) {
    let opcode_index = out.len();
    let mut opcode = COPY_INSTRUCTION_FLAG;
    out.push(opcode);

    for (bit, byte) in offset.to_le_bytes().into_iter().enumerate() {
        if byte != 0 {
            opcode |= 1 << bit;
            out.push(byte);
        }
    }
    // A zero-size encoding stands for COPY_ZERO_SIZE.
    if size != COPY_ZERO_SIZE {
        for (bit, byte) in (size as u32).to_le_bytes().into_iter().take(3).enumerate() {
            if byte != 0 {
                opcode |= 1 << (bit + 4);
                out.push(byte);
            }
        }
    }
    out[opcode_index] = opcode;
}
