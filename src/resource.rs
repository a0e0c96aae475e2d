//! Resource I/O (spec.md §4.4): chunking a stream's bytes into a compressed
//! resource on write, and decoding/seeking within one on read.
//!
//! # On-disk layout
//!
//! A compressed resource whose uncompressed size exceeds one chunk is laid
//! out offset-table-first, data-second — the offset table must be read
//! before any chunk can be located, so it comes first:
//!
//! ```text
//! [ (num_chunks - 1) × u64 LE cumulative offsets, relative to start of chunk data ]
//! [ chunk 0 bytes ][ chunk 1 bytes ] ... [ chunk N-1 bytes ]
//! ```
//!
//! Chunk `i`'s start is `0` for `i == 0`, else `offsets[i - 1]`; its length
//! is the next cumulative offset (or the body's total length, for the last
//! chunk) minus its start. A resource whose uncompressed size fits in a
//! single chunk carries no offset table — the body is just that one
//! chunk's bytes.
//!
//! A packed resource (spec.md §3, `ReshdrFlags::PACKED`) is several
//! streams' worth of chunks concatenated under one `reshdr`, prefixed by a
//! sub-header giving each stream's uncompressed length so a reader can
//! locate any one of them without decompressing its neighbours.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::chunk_pipeline::ChunkPipeline;
use crate::codec::{get_codec, CodecError, CodecId};
use crate::reshdr::{ResourceHeader, ReshdrFlags};

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("resource offset table is truncated or inconsistent")]
    OffsetTableCorrupt,
    #[error("chunk {index} decoded to {actual} bytes, expected {expected}")]
    ChunkLengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("packed resource sub-header is truncated or inconsistent")]
    PackedSubHeaderCorrupt,
    #[error("chunk index {0} out of range for this resource")]
    ChunkIndexOutOfRange(usize),
}

fn chunk_count(uncompressed_size: u64, chunk_size: u32) -> usize {
    if uncompressed_size == 0 {
        return 0;
    }
    ((uncompressed_size + chunk_size as u64 - 1) / chunk_size as u64) as usize
}

/// Compress `data` into a resource body and write it at the writer's
/// current position, returning the populated [`ResourceHeader`]. The
/// header's `offset_in_wim` is the position the body actually started at.
pub fn write_resource<W: Write + Seek>(
    w: &mut W,
    data: &[u8],
    codec_id: CodecId,
    chunk_size: u32,
    level: i32,
    pipeline: &mut dyn ChunkPipeline,
    extra_flags: ReshdrFlags,
) -> Result<ResourceHeader, ResourceError> {
    let offset_in_wim = w.stream_position()?;
    let uncompressed_size = data.len() as u64;
    let n_chunks = chunk_count(uncompressed_size, chunk_size);

    if n_chunks <= 1 {
        let body = if n_chunks == 0 {
            Vec::new()
        } else {
            let codec = get_codec(codec_id);
            match codec.compress(data, level)? {
                Some(c) => c,
                None => data.to_vec(),
            }
        };
        let size_in_wim = body.len() as u64;
        w.write_all(&body)?;
        let flags = if n_chunks == 1 {
            ReshdrFlags::COMPRESSED | extra_flags
        } else {
            extra_flags
        };
        return Ok(ResourceHeader {
            offset_in_wim,
            size_in_wim,
            uncompressed_size,
            flags,
        });
    }

    for i in 0..n_chunks {
        let start = i * chunk_size as usize;
        let end = ((i + 1) * chunk_size as usize).min(data.len());
        pipeline.submit(i, data[start..end].to_vec())?;
    }

    let mut chunks = vec![None; n_chunks];
    while let Some(c) = pipeline.next()? {
        let idx = c.index;
        chunks[idx] = Some(c);
    }
    let chunks: Vec<_> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.unwrap_or_else(|| panic!("chunk pipeline dropped chunk {i}")))
        .collect();

    let mut offsets = Vec::with_capacity(n_chunks - 1);
    let mut cumulative = 0u64;
    for c in &chunks[..n_chunks - 1] {
        cumulative += c.stored_len() as u64;
        offsets.push(cumulative);
    }

    for off in &offsets {
        w.write_all(&off.to_le_bytes())?;
    }
    let table_len = offsets.len() as u64 * 8;

    let mut body_len = 0u64;
    for c in &chunks {
        match &c.payload {
            Some(p) => w.write_all(p)?,
            None => w.write_all(&data[body_offset_of(&chunks, c.index)..][..c.uncompressed_len])?,
        }
        body_len += c.stored_len() as u64;
    }

    Ok(ResourceHeader {
        offset_in_wim,
        size_in_wim: table_len + body_len,
        uncompressed_size,
        flags: ReshdrFlags::COMPRESSED | extra_flags,
    })
}

fn body_offset_of(chunks: &[crate::chunk_pipeline::CompressedChunk], index: usize) -> usize {
    chunks[..index].iter().map(|c| c.uncompressed_len).sum()
}

/// Reads a single resource: sequential decode of the whole body, or
/// random access to one chunk's worth of uncompressed bytes at a time.
pub struct ResourceReader {
    header: ResourceHeader,
    chunk_size: u32,
    codec_id: CodecId,
    /// Cumulative offsets into the chunk-data region, `n_chunks - 1` long.
    offsets: Vec<u64>,
    chunk_data_start: u64,
}

impl ResourceReader {
    /// Parse a resource's offset table (if any) given its header; `r` must
    /// be positioned so that reading from `header.offset_in_wim` works,
    /// i.e. typically this seeks internally.
    pub fn open<R: Read + Seek>(
        r: &mut R,
        header: ResourceHeader,
        chunk_size: u32,
        codec_id: CodecId,
    ) -> Result<Self, ResourceError> {
        let n_chunks = chunk_count(header.uncompressed_size, chunk_size);
        r.seek(SeekFrom::Start(header.offset_in_wim))?;

        let offsets = if n_chunks > 1 {
            let mut offsets = Vec::with_capacity(n_chunks - 1);
            for _ in 0..n_chunks - 1 {
                let mut buf = [0u8; 8];
                r.read_exact(&mut buf).map_err(|_| ResourceError::OffsetTableCorrupt)?;
                offsets.push(u64::from_le_bytes(buf));
            }
            offsets
        } else {
            Vec::new()
        };

        let table_bytes = offsets.len() as u64 * 8;
        let chunk_data_start = header.offset_in_wim + table_bytes;

        Ok(Self {
            header,
            chunk_size,
            codec_id,
            offsets,
            chunk_data_start,
        })
    }

    pub fn n_chunks(&self) -> usize {
        chunk_count(self.header.uncompressed_size, self.chunk_size)
    }

    fn chunk_bounds(&self, index: usize) -> Result<(u64, u64), ResourceError> {
        let n = self.n_chunks();
        if index >= n {
            return Err(ResourceError::ChunkIndexOutOfRange(index));
        }
        let start = if index == 0 { 0 } else { self.offsets[index - 1] };
        let end = if index + 1 < n {
            self.offsets[index]
        } else {
            self.header.size_in_wim - self.offsets.len() as u64 * 8
        };
        Ok((start, end))
    }

    fn chunk_uncompressed_len(&self, index: usize) -> usize {
        let n = self.n_chunks();
        if index + 1 < n {
            self.chunk_size as usize
        } else {
            let full = (n - 1) as u64 * self.chunk_size as u64;
            (self.header.uncompressed_size - full) as usize
        }
    }

    /// Decode one chunk by index, returning its uncompressed bytes.
    pub fn read_chunk<R: Read + Seek>(
        &self,
        r: &mut R,
        index: usize,
    ) -> Result<Vec<u8>, ResourceError> {
        if self.header.uncompressed_size == 0 {
            return Ok(Vec::new());
        }
        let (start, end) = self.chunk_bounds(index)?;
        if end < start {
            return Err(ResourceError::OffsetTableCorrupt);
        }
        let expected_len = self.chunk_uncompressed_len(index);

        r.seek(SeekFrom::Start(self.chunk_data_start + start))?;
        let mut raw = vec![0u8; (end - start) as usize];
        r.read_exact(&mut raw)?;

        // A stored chunk whose length equals its expected uncompressed
        // length is raw by construction — `Codec::compress` only ever
        // returns a payload strictly shorter than its input, so length
        // equality is enough to tell raw and compressed chunks apart
        // without a per-chunk flag.
        let decoded = if self.header.is_compressed() && (end - start) as usize != expected_len {
            let codec = get_codec(self.codec_id);
            codec.decompress(&raw, expected_len)?
        } else {
            raw
        };

        if decoded.len() != expected_len {
            return Err(ResourceError::ChunkLengthMismatch {
                index,
                expected: expected_len,
                actual: decoded.len(),
            });
        }
        Ok(decoded)
    }

    /// Decode the entire resource sequentially.
    pub fn read_all<R: Read + Seek>(&self, r: &mut R) -> Result<Vec<u8>, ResourceError> {
        let mut out = Vec::with_capacity(self.header.uncompressed_size as usize);
        for i in 0..self.n_chunks() {
            out.extend(self.read_chunk(r, i)?);
        }
        Ok(out)
    }

    /// Random-access read of `len` bytes starting at uncompressed offset
    /// `offset`, spanning as many chunks as needed.
    pub fn read_at<R: Read + Seek>(
        &self,
        r: &mut R,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, ResourceError> {
        if len == 0 || self.header.uncompressed_size == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        let end = offset + len as u64;
        while pos < end {
            let chunk_index = (pos / self.chunk_size as u64) as usize;
            let chunk = self.read_chunk(r, chunk_index)?;
            let chunk_start = chunk_index as u64 * self.chunk_size as u64;
            let intra = (pos - chunk_start) as usize;
            let take = (chunk.len() - intra).min((end - pos) as usize);
            out.extend_from_slice(&chunk[intra..intra + take]);
            pos += take as u64;
        }
        Ok(out)
    }
}

/// Sub-header for a packed resource: one entry per stream packed into the
/// resource, giving each stream's uncompressed length so a reader can
/// compute which chunks belong to it without decompressing its neighbours.
#[derive(Debug, Clone, Default)]
pub struct PackedResourceHeader {
    pub stream_uncompressed_sizes: Vec<u64>,
}

impl PackedResourceHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), ResourceError> {
        w.write_all(&(self.stream_uncompressed_sizes.len() as u64).to_le_bytes())?;
        for size in &self.stream_uncompressed_sizes {
            w.write_all(&size.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self, ResourceError> {
        let mut count_buf = [0u8; 8];
        r.read_exact(&mut count_buf)
            .map_err(|_| ResourceError::PackedSubHeaderCorrupt)?;
        let count = u64::from_le_bytes(count_buf) as usize;
        let mut sizes = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)
                .map_err(|_| ResourceError::PackedSubHeaderCorrupt)?;
            sizes.push(u64::from_le_bytes(buf));
        }
        Ok(Self {
            stream_uncompressed_sizes: sizes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_pipeline::SerialPipeline;
    use std::io::Cursor;

    fn roundtrip(data: &[u8], chunk_size: u32) {
        let mut buf = Cursor::new(Vec::new());
        let mut pipeline = SerialPipeline::new(CodecId::Xpress, 6);
        let header = write_resource(
            &mut buf,
            data,
            CodecId::Xpress,
            chunk_size,
            6,
            &mut pipeline,
            ReshdrFlags::empty(),
        )
        .unwrap();

        let reader = ResourceReader::open(&mut buf, header, chunk_size, CodecId::Xpress).unwrap();
        let out = reader.read_all(&mut buf).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn single_chunk_roundtrip() {
        roundtrip(b"hello, wim resource", 32768);
    }

    #[test]
    fn empty_resource_roundtrip() {
        roundtrip(b"", 32768);
    }

    #[test]
    fn multi_chunk_roundtrip() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        roundtrip(&data, 32768);
    }

    #[test]
    fn random_access_matches_sequential() {
        let data: Vec<u8> = (0..500_000u32).map(|i| ((i * 7) % 251) as u8).collect();
        let mut buf = Cursor::new(Vec::new());
        let mut pipeline = SerialPipeline::new(CodecId::Xpress, 6);
        let header = write_resource(
            &mut buf,
            &data,
            CodecId::Xpress,
            65536,
            6,
            &mut pipeline,
            ReshdrFlags::empty(),
        )
        .unwrap();
        let reader = ResourceReader::open(&mut buf, header, 65536, CodecId::Xpress).unwrap();

        let whole = reader.read_all(&mut buf).unwrap();
        let slice = reader.read_at(&mut buf, 70000, 10000).unwrap();
        assert_eq!(slice, whole[70000..80000]);
    }

    #[test]
    fn packed_sub_header_roundtrip() {
        let hdr = PackedResourceHeader {
            stream_uncompressed_sizes: vec![100, 200, 300],
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let back = PackedResourceHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back.stream_uncompressed_sizes, hdr.stream_uncompressed_sizes);
    }
}
