//! Chunk compression pipeline (spec.md §4.3).
//!
//! A resource's uncompressed bytes are split into fixed-size chunks (the
//! header's `chunk_size`, except possibly the last) and each chunk is
//! compressed independently. [`ChunkPipeline`] abstracts over how many
//! chunks are in flight at once: [`SerialPipeline`] does one at a time in
//! the calling thread; [`ParallelPipeline`] (feature `parallel`) keeps up to
//! N workers busy but still emits results in submission order, since the
//! on-disk chunk table is positional and cannot reorder entries.

mod serial;

#[cfg(feature = "parallel")]
mod parallel;

pub use serial::SerialPipeline;

#[cfg(feature = "parallel")]
pub use parallel::ParallelPipeline;

use crate::codec::CodecError;

/// One chunk's compression result. `None` payload means the chunk was
/// stored raw because compression did not shrink it.
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    pub index: usize,
    pub uncompressed_len: usize,
    pub payload: Option<Vec<u8>>,
}

impl CompressedChunk {
    /// Bytes actually written to the resource body for this chunk.
    pub fn stored_len(&self) -> usize {
        self.payload.as_ref().map_or(self.uncompressed_len, |p| p.len())
    }
}

/// Drives chunk compression, submitting chunks and draining results in
/// the same order they were submitted regardless of completion order.
pub trait ChunkPipeline {
    /// Queue one chunk for compression. May block if the pipeline has no
    /// free capacity.
    fn submit(&mut self, index: usize, data: Vec<u8>) -> Result<(), CodecError>;

    /// Retrieve the next completed chunk in submission order, blocking
    /// until it is ready. Returns `None` once every submitted chunk has
    /// been drained.
    fn next(&mut self) -> Result<Option<CompressedChunk>, CodecError>;
}
