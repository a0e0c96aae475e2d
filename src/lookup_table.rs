//! Stream store and deduplication (spec.md §3, §4.5).
//!
//! Every distinct stream (a file's data, an image's metadata blob, the
//! header's XML info copy) is identified by its SHA-1 digest. The lookup
//! table maps that digest to where the stream's bytes actually live and how
//! many directory entries currently reference it; a stream with a refcount
//! of zero is garbage on the next rebuild.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::digest::{Sha1Digest, DIGEST_LEN};
use crate::reshdr::{ResourceHeader, RESHDR_SIZE};

pub const LTE_SIZE: usize = RESHDR_SIZE + 2 + 2 + 4 + DIGEST_LEN;

#[derive(Error, Debug)]
pub enum LookupTableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("lookup table entry is truncated")]
    Truncated,
    #[error("stream for hash {0} has no entry in the lookup table")]
    NotFound(Sha1Digest),
    #[error("part {part} referenced but this WIM is part {own_part}")]
    ForeignPart { part: u16, own_part: u16 },
}

/// Where an LTE's bytes actually live (spec.md §3 "ownership & lifecycles").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    /// Inside this WIM file, at the given resource header.
    InWim(ResourceHeader),
    /// Held entirely in memory, not yet flushed to any file.
    AttachedBuffer(Vec<u8>),
    /// Spilled to a staging file on disk (large stream, write-time only).
    StagingFile(std::path::PathBuf),
    /// In a different part of a split WIM, or a delta base.
    ExternalWim { part_number: u16 },
}

/// One lookup-table entry: a stream's identity, location, and reference
/// count (spec.md §3).
#[derive(Debug, Clone)]
pub struct Lte {
    pub hash: Sha1Digest,
    pub reshdr: ResourceHeader,
    pub part_number: u16,
    pub ref_count: u32,
    pub location: ResourceLocation,
}

impl Lte {
    pub fn new(hash: Sha1Digest, reshdr: ResourceHeader, part_number: u16) -> Self {
        Self {
            hash,
            reshdr,
            part_number,
            ref_count: 0,
            location: ResourceLocation::InWim(reshdr),
        }
    }

    /// Fixed 50-byte on-disk form: `reshdr` (24) + part_number (2) +
    /// ref_count as u32 (4) + hash (20).
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), LookupTableError> {
        self.reshdr.write(w)?;
        w.write_all(&self.part_number.to_le_bytes())?;
        w.write_all(&[0u8; 2])?;
        w.write_all(&self.ref_count.to_le_bytes())?;
        w.write_all(self.hash.as_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self, LookupTableError> {
        let reshdr = ResourceHeader::read(r).map_err(|_| LookupTableError::Truncated)?;
        let mut part_buf = [0u8; 2];
        r.read_exact(&mut part_buf).map_err(|_| LookupTableError::Truncated)?;
        let part_number = u16::from_le_bytes(part_buf);
        let mut pad = [0u8; 2];
        r.read_exact(&mut pad).map_err(|_| LookupTableError::Truncated)?;
        let mut ref_buf = [0u8; 4];
        r.read_exact(&mut ref_buf).map_err(|_| LookupTableError::Truncated)?;
        let ref_count = u32::from_le_bytes(ref_buf);
        let mut hash_buf = [0u8; DIGEST_LEN];
        r.read_exact(&mut hash_buf).map_err(|_| LookupTableError::Truncated)?;
        Ok(Self {
            hash: Sha1Digest::from_bytes(hash_buf),
            reshdr,
            part_number,
            ref_count,
            location: ResourceLocation::InWim(reshdr),
        })
    }
}

/// In-memory stream store keyed by content hash, the single source of
/// truth for dedup and refcounting during a write session.
#[derive(Default)]
pub struct LookupTable {
    entries: HashMap<Sha1Digest, Lte>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, hash: &Sha1Digest) -> Option<&Lte> {
        self.entries.get(hash)
    }

    pub fn lookup_mut(&mut self, hash: &Sha1Digest) -> Option<&mut Lte> {
        self.entries.get_mut(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a freshly-written stream, or bump the refcount of an existing
    /// one with the same hash and drop the caller's newly-written bytes —
    /// this is the dedup point (spec.md §3: identical content never stored
    /// twice).
    pub fn insert_or_coalesce(&mut self, lte: Lte) -> &Lte {
        let hash = lte.hash;
        let entry = self.entries.entry(hash).or_insert(lte);
        entry.ref_count += 1;
        entry
    }

    /// Decrement a stream's refcount; returns the new count. A stream that
    /// reaches zero stays in the table (marked collectible) until the next
    /// full rebuild reclaims its space.
    pub fn decrement(&mut self, hash: &Sha1Digest) -> Option<u32> {
        let entry = self.entries.get_mut(hash)?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        Some(entry.ref_count)
    }

    /// Recompute every entry's refcount from scratch given the full set of
    /// hashes referenced by image metadata trees, discarding any prior
    /// counts. Used after a metadata rewrite where stale references may
    /// have been dropped.
    pub fn recalculate_refcounts<'a>(&mut self, referenced: impl Iterator<Item = &'a Sha1Digest>) {
        for lte in self.entries.values_mut() {
            lte.ref_count = 0;
        }
        for hash in referenced {
            if let Some(lte) = self.entries.get_mut(hash) {
                lte.ref_count += 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lte> {
        self.entries.values()
    }

    pub fn remove_zero_refcount(&mut self) -> Vec<Lte> {
        let dead: Vec<Sha1Digest> = self
            .entries
            .iter()
            .filter(|(_, lte)| lte.ref_count == 0)
            .map(|(h, _)| *h)
            .collect();
        dead.into_iter()
            .filter_map(|h| self.entries.remove(&h))
            .collect()
    }

    /// Write every entry in offset-ascending order (spec.md §9 open
    /// question, resolved in favor of offset order: it keeps the integrity
    /// table's chunking of the lookup table stable across rebuilds that
    /// don't move streams around).
    pub fn write_sorted<W: Write>(&self, w: &mut W) -> Result<(), LookupTableError> {
        let mut sorted: Vec<&Lte> = self.entries.values().collect();
        sorted.sort_by_key(|lte| lte.reshdr.offset_in_wim);
        for lte in sorted {
            lte.write(w)?;
        }
        Ok(())
    }

    pub fn read_all<R: Read>(r: &mut R, count: usize) -> Result<Self, LookupTableError> {
        let mut table = LookupTable::new();
        for _ in 0..count {
            let lte = Lte::read(r)?;
            table.entries.insert(lte.hash, lte);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reshdr::ReshdrFlags;

    fn sample_reshdr(offset: u64) -> ResourceHeader {
        ResourceHeader {
            offset_in_wim: offset,
            size_in_wim: 100,
            uncompressed_size: 200,
            flags: ReshdrFlags::COMPRESSED,
        }
    }

    #[test]
    fn lte_roundtrip() {
        let lte = Lte::new(Sha1Digest::from_bytes([7u8; DIGEST_LEN]), sample_reshdr(4096), 1);
        let mut buf = Vec::new();
        lte.write(&mut buf).unwrap();
        assert_eq!(buf.len(), LTE_SIZE);
        let back = Lte::read(&mut std::io::Cursor::new(&buf)).unwrap();
        assert_eq!(back.hash, lte.hash);
        assert_eq!(back.reshdr, lte.reshdr);
        assert_eq!(back.part_number, lte.part_number);
    }

    #[test]
    fn dedup_coalesces_identical_hash() {
        let mut table = LookupTable::new();
        let h = Sha1Digest::from_bytes([1u8; DIGEST_LEN]);
        table.insert_or_coalesce(Lte::new(h, sample_reshdr(0), 1));
        table.insert_or_coalesce(Lte::new(h, sample_reshdr(0), 1));
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(&h).unwrap().ref_count, 2);
    }

    #[test]
    fn decrement_to_zero_keeps_entry_until_reclaimed() {
        let mut table = LookupTable::new();
        let h = Sha1Digest::from_bytes([2u8; DIGEST_LEN]);
        table.insert_or_coalesce(Lte::new(h, sample_reshdr(0), 1));
        assert_eq!(table.decrement(&h), Some(0));
        assert!(table.lookup(&h).is_some());
        let dead = table.remove_zero_refcount();
        assert_eq!(dead.len(), 1);
        assert!(table.lookup(&h).is_none());
    }

    #[test]
    fn write_sorted_is_offset_ascending() {
        let mut table = LookupTable::new();
        let h1 = Sha1Digest::from_bytes([1u8; DIGEST_LEN]);
        let h2 = Sha1Digest::from_bytes([2u8; DIGEST_LEN]);
        table.insert_or_coalesce(Lte::new(h1, sample_reshdr(9000), 1));
        table.insert_or_coalesce(Lte::new(h2, sample_reshdr(100), 1));

        let mut buf = Vec::new();
        table.write_sorted(&mut buf).unwrap();
        let back = LookupTable::read_all(&mut std::io::Cursor::new(&buf), 2).unwrap();
        assert_eq!(back.len(), 2);

        let mut cur = std::io::Cursor::new(&buf);
        let first = Lte::read(&mut cur).unwrap();
        assert_eq!(first.hash, h2);
    }
}
