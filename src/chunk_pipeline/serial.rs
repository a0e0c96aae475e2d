use std::collections::VecDeque;

use crate::codec::{get_codec, Codec, CodecError, CodecId};

use super::{ChunkPipeline, CompressedChunk};

/// Single-threaded chunk pipeline: each `submit` compresses immediately and
/// buffers the result for `next` to hand back. No concurrency, no
/// reordering possible by construction.
pub struct SerialPipeline {
    codec: Box<dyn Codec>,
    level: i32,
    ready: VecDeque<CompressedChunk>,
}

impl SerialPipeline {
    pub fn new(codec_id: CodecId, level: i32) -> Self {
        Self {
            codec: get_codec(codec_id),
            level,
            ready: VecDeque::new(),
        }
    }
}

impl ChunkPipeline for SerialPipeline {
    fn submit(&mut self, index: usize, data: Vec<u8>) -> Result<(), CodecError> {
        let uncompressed_len = data.len();
        let payload = self.codec.compress(&data, self.level)?;
        self.ready.push_back(CompressedChunk {
            index,
            uncompressed_len,
            payload,
        });
        Ok(())
    }

    fn next(&mut self) -> Result<Option<CompressedChunk>, CodecError> {
        Ok(self.ready.pop_front())
    }
}
