//! Bounded-slot parallel chunk pipeline.
//!
//! Grounded on the LZ4 thread-pool port's `TPool`: a `rayon::ThreadPool`
//! gated by a `crossbeam_channel::bounded` semaphore so at most
//! `queue_size + nb_threads` chunks are in flight, rather than rayon's own
//! unbounded `par_iter` batch the teacher uses for its one-shot compression
//! path. Unlike `TPool`, results must come back out in submission order —
//! the on-disk chunk table is positional — so completed chunks that finish
//! out of order wait in a side table until `next()` reaches their index.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::codec::{get_codec, CodecError, CodecId};

use super::{ChunkPipeline, CompressedChunk};

struct Shared {
    results: Mutex<HashMap<usize, CompressedChunk>>,
    error: Mutex<Option<CodecError>>,
    cvar: Condvar,
}

pub struct ParallelPipeline {
    pool: rayon::ThreadPool,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
    shared: Arc<Shared>,
    codec_id: CodecId,
    level: i32,
    next_index: usize,
    submitted: usize,
}

impl ParallelPipeline {
    /// `workers` threads, each allowed one extra chunk queued ahead of it.
    pub fn new(codec_id: CodecId, level: i32, workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .expect("failed to build chunk pipeline thread pool");

        let capacity = workers * 2;
        let (slot_tx, slot_rx) = bounded(capacity);
        for _ in 0..capacity {
            slot_tx.send(()).expect("slot channel just created");
        }

        Self {
            pool,
            slot_tx,
            slot_rx,
            shared: Arc::new(Shared {
                results: Mutex::new(HashMap::new()),
                error: Mutex::new(None),
                cvar: Condvar::new(),
            }),
            codec_id,
            level,
            next_index: 0,
            submitted: 0,
        }
    }

    fn take_error(&self) -> Option<CodecError> {
        self.shared.error.lock().unwrap().take()
    }
}

impl ChunkPipeline for ParallelPipeline {
    fn submit(&mut self, index: usize, data: Vec<u8>) -> Result<(), CodecError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }

        // Block until a slot is free, mirroring TPool::submit_job.
        self.slot_rx.recv().expect("chunk pipeline slot channel closed");

        let shared = Arc::clone(&self.shared);
        let slot_tx = self.slot_tx.clone();
        let codec_id = self.codec_id;
        let level = self.level;
        self.submitted += 1;

        self.pool.spawn(move || {
            let uncompressed_len = data.len();
            let codec = get_codec(codec_id);
            let outcome = codec.compress(&data, level);

            match outcome {
                Ok(payload) => {
                    let mut results = shared.results.lock().unwrap();
                    results.insert(
                        index,
                        CompressedChunk {
                            index,
                            uncompressed_len,
                            payload,
                        },
                    );
                    shared.cvar.notify_all();
                }
                Err(e) => {
                    let mut err = shared.error.lock().unwrap();
                    if err.is_none() {
                        *err = Some(e);
                    }
                    shared.cvar.notify_all();
                }
            }

            let _ = slot_tx.send(());
        });

        Ok(())
    }

    fn next(&mut self) -> Result<Option<CompressedChunk>, CodecError> {
        if self.next_index >= self.submitted {
            if let Some(e) = self.take_error() {
                return Err(e);
            }
            return Ok(None);
        }

        let mut results = self.shared.results.lock().unwrap();
        loop {
            if let Some(chunk) = results.remove(&self.next_index) {
                self.next_index += 1;
                return Ok(Some(chunk));
            }
            if let Some(e) = self.shared.error.lock().unwrap().take() {
                return Err(e);
            }
            results = self.shared.cvar.wait(results).unwrap();
        }
    }
}
