use keeper_storage::CodecPool;
use proptest::prelude::*;
use std::sync::Arc;

fn round_trip(data: &[u8], write_step: usize, read_step: usize) -> Vec<u8> {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let pool = Arc::new(CodecPool::default());
        let mut compressor = pool.compressor(Vec::new());
        for chunk in data.chunks(write_step) {
            compressor.write(chunk).await.unwrap();
        }
        assert_eq!(compressor.consumed(), data.len() as u64);
        let stream = compressor.finish().await.unwrap();

        let mut decompressor = pool.decompressor(stream.as_slice());
        let mut out = Vec::with_capacity(data.len());
        while let Some(chunk) = decompressor.read_chunk(read_step).await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_chunking_restores_the_input(
        data in proptest::collection::vec(any::<u8>(), 0..200_000),
        write_step in 1usize..70_000,
        read_step in 1usize..4096,
    ) {
        prop_assert_eq!(round_trip(&data, write_step, read_step), data);
    }
}
