//! Property tests for resource chunking (spec.md §8 invariants 1 and 7):
//! any byte sequence round-trips through `write_resource`/`ResourceReader`
//! bit-for-bit, and every computed chunk bound stays inside the resource's
//! stored body regardless of how the input is split.

use proptest::prelude::*;
use std::io::Cursor;
use wimrs::chunk_pipeline::SerialPipeline;
use wimrs::codec::CodecId;
use wimrs::reshdr::ReshdrFlags;
use wimrs::resource::{write_resource, ResourceReader};

fn roundtrip_with(data: &[u8], chunk_size: u32, codec: CodecId) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    let mut pipeline = SerialPipeline::new(codec, 6);
    let header = write_resource(
        &mut buf,
        data,
        codec,
        chunk_size,
        6,
        &mut pipeline,
        ReshdrFlags::empty(),
    )
    .unwrap();
    let reader = ResourceReader::open(&mut buf, header, chunk_size, codec).unwrap();
    reader.read_all(&mut buf).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip_is_bit_exact(
        data in prop::collection::vec(any::<u8>(), 0..200_000),
        chunk_exp in 15u32..18,
    ) {
        let chunk_size = 1u32 << chunk_exp;
        let out = roundtrip_with(&data, chunk_size, CodecId::Xpress);
        prop_assert_eq!(out, data);
    }

    #[test]
    fn chunk_bounds_never_exceed_stored_body(
        data in prop::collection::vec(any::<u8>(), 1..200_000),
        chunk_exp in 15u32..18,
        probe_fraction in 0.0f64..1.0,
    ) {
        let chunk_size = 1u32 << chunk_exp;
        let mut buf = Cursor::new(Vec::new());
        let mut pipeline = SerialPipeline::new(CodecId::Lzx, 6);
        let header = write_resource(
            &mut buf,
            &data,
            CodecId::Lzx,
            chunk_size,
            6,
            &mut pipeline,
            ReshdrFlags::empty(),
        )
        .unwrap();
        let reader = ResourceReader::open(&mut buf, header, chunk_size, CodecId::Lzx).unwrap();

        let n = reader.n_chunks();
        prop_assert!(n >= 1);
        let probe = ((n - 1) as f64 * probe_fraction).round() as usize;
        let chunk_bytes = reader.read_chunk(&mut buf, probe).unwrap();
        prop_assert!(!chunk_bytes.is_empty() || data.is_empty());

        let offset = probe as u64 * chunk_size as u64;
        let expected_len = chunk_bytes.len();
        let direct = reader.read_at(&mut buf, offset, expected_len).unwrap();
        prop_assert_eq!(direct, chunk_bytes);
    }
}
