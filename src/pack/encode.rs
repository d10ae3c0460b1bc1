//! Build version 2 packfiles in memory.

use std::io::{self, Write};

use flate2::{write::ZlibEncoder, Compression};
use gix_object::Kind;

use crate::hash::HashAlgorithm;

use super::entry::{write_entry_header, PackEntryType};

/// Accumulates pack entries and produces a complete pack with its trailer.
#[derive(Debug, Clone, Default)]
pub struct PackBuilder {
    algorithm: HashAlgorithm,
    entries: Vec<u8>,
    count: u32,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    /// Append a whole object.
    pub fn add_object(&mut self, kind: Kind, data: &[u8]) -> io::Result<()> {
        write_entry_header(&mut self.entries, PackEntryType::Object(kind), data.len());
        self.write_compressed(data)?;
        self.count += 1;
        Ok(())
    }

    /// Append a `ref_delta` entry whose base is the object `base_id` (hex).
    pub fn add_ref_delta(&mut self, base_id: &str, delta: &[u8]) -> io::Result<()> {
        let base = hex::decode(base_id)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if base.len() != self.algorithm.digest_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("base id {} has the wrong length", base_id),
            ));
        }
        write_entry_header(&mut self.entries, PackEntryType::RefDelta, delta.len());
        self.entries.extend_from_slice(&base);
        self.write_compressed(delta)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Header, entries and trailing checksum of everything before it.
    pub fn finish(&self) -> Vec<u8> {
        let mut pack = Vec::with_capacity(12 + self.entries.len() + self.algorithm.digest_len());
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&self.count.to_be_bytes());
        pack.extend_from_slice(&self.entries);
        let checksum = self.algorithm.checksum(&pack);
        pack.extend_from_slice(&checksum);
        pack
    }

    fn write_compressed(&mut self, data: &[u8]) -> io::Result<()> {
        let mut encoder = ZlibEncoder::new(&mut self.entries, Compression::default());
        encoder.write_all(data)?;
        encoder.finish()?;
        Ok(())
    }
}
