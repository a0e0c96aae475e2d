//! Integrity table (spec.md §3, §4.7): a resource holding one SHA-1 per
//! fixed-size chunk of the byte range `[header_end, lookup_table_end)`, so
//! a reader can detect corruption in the header-adjacent structures
//! without decoding every resource in the file.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::digest::{hash, Sha1Digest, DIGEST_LEN};

/// Default integrity chunk size: 10 MiB, matching the granularity large
/// enough to keep the table itself small while still localizing corruption
/// to a useful range.
pub const DEFAULT_INTEGRITY_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("integrity table is truncated")]
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Every covered chunk matched.
    Ok,
    /// The chunk at this index did not match.
    NotOk { chunk_index: usize },
    /// No integrity table is present to check against.
    Nonexistent,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityTable {
    pub chunk_size: u64,
    pub digests: Vec<Sha1Digest>,
}

impl IntegrityTable {
    /// Compute a table over `[start, end)` of `r`, at `chunk_size`-byte
    /// granularity. `r`'s position is restored on return.
    pub fn compute<R: Read + Seek>(
        r: &mut R,
        start: u64,
        end: u64,
        chunk_size: u64,
    ) -> Result<Self, IntegrityError> {
        let saved = r.stream_position()?;
        r.seek(SeekFrom::Start(start))?;

        let mut digests = Vec::new();
        let mut remaining = end.saturating_sub(start);
        let mut buf = vec![0u8; chunk_size as usize];
        while remaining > 0 {
            let take = remaining.min(chunk_size) as usize;
            r.read_exact(&mut buf[..take])?;
            digests.push(hash(&buf[..take]));
            remaining -= take as u64;
        }

        r.seek(SeekFrom::Start(saved))?;
        Ok(Self { chunk_size, digests })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), IntegrityError> {
        w.write_all(&(self.digests.len() as u32).to_le_bytes())?;
        w.write_all(&self.chunk_size.to_le_bytes())?;
        for d in &self.digests {
            w.write_all(d.as_bytes())?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self, IntegrityError> {
        let mut count_buf = [0u8; 4];
        r.read_exact(&mut count_buf).map_err(|_| IntegrityError::Truncated)?;
        let count = u32::from_le_bytes(count_buf) as usize;
        let mut size_buf = [0u8; 8];
        r.read_exact(&mut size_buf).map_err(|_| IntegrityError::Truncated)?;
        let chunk_size = u64::from_le_bytes(size_buf);

        let mut digests = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buf = [0u8; DIGEST_LEN];
            r.read_exact(&mut buf).map_err(|_| IntegrityError::Truncated)?;
            digests.push(Sha1Digest::from_bytes(buf));
        }
        Ok(Self { chunk_size, digests })
    }

    /// Re-hash `[start, end)` of `r` and compare against this table.
    pub fn check<R: Read + Seek>(
        &self,
        r: &mut R,
        start: u64,
        end: u64,
    ) -> Result<CheckResult, IntegrityError> {
        if self.digests.is_empty() {
            return Ok(CheckResult::Nonexistent);
        }
        let recomputed = Self::compute(r, start, end, self.chunk_size)?;
        if recomputed.digests.len() != self.digests.len() {
            return Ok(CheckResult::NotOk { chunk_index: 0 });
        }
        for (i, (a, b)) in self.digests.iter().zip(recomputed.digests.iter()).enumerate() {
            if a != b {
                return Ok(CheckResult::NotOk { chunk_index: i });
            }
        }
        Ok(CheckResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn compute_and_check_matches() {
        let data: Vec<u8> = (0..1_000_000u32).map(|i| (i % 253) as u8).collect();
        let mut cur = Cursor::new(data);
        let table = IntegrityTable::compute(&mut cur, 0, 1_000_000, 100_000).unwrap();
        assert_eq!(table.digests.len(), 10);

        let result = table.check(&mut cur, 0, 1_000_000).unwrap();
        assert_eq!(result, CheckResult::Ok);
    }

    #[test]
    fn detects_corruption() {
        let mut data: Vec<u8> = (0..500_000u32).map(|i| (i % 200) as u8).collect();
        let mut cur = Cursor::new(data.clone());
        let table = IntegrityTable::compute(&mut cur, 0, 500_000, 50_000).unwrap();

        data[260_000] ^= 0xff;
        let mut corrupted = Cursor::new(data);
        let result = table.check(&mut corrupted, 0, 500_000).unwrap();
        assert_eq!(result, CheckResult::NotOk { chunk_index: 5 });
    }

    #[test]
    fn roundtrip_serialization() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 199) as u8).collect();
        let mut cur = Cursor::new(data);
        let table = IntegrityTable::compute(&mut cur, 0, 300_000, 100_000).unwrap();

        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let back = IntegrityTable::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back.digests, table.digests);
        assert_eq!(back.chunk_size, table.chunk_size);
    }
}
