use proptest::prelude::*;
use vba2py_extract::compression::{
    compress_container, decompress_container, decompress_container_with_limit, CompressionError,
};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        max_shrink_iters: 0,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn decompressing_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decompress_container(&bytes);
        let mut container = vec![0x01];
        container.extend_from_slice(&bytes);
        let _ = decompress_container(&container);
    }

    #[test]
    fn compressed_text_decompresses_to_itself(text in "(Sub |End Sub\r\n|Dim x As Long\r\n|[a-z ]{1,12}|\r\n){0,400}") {
        let compressed = compress_container(text.as_bytes());
        prop_assert_eq!(decompress_container(&compressed).unwrap(), text.as_bytes());
    }

    #[test]
    fn output_never_exceeds_the_limit(len in 0usize..20_000, limit in 0usize..20_000) {
        let compressed = compress_container(&vec![b'x'; len]);
        match decompress_container_with_limit(&compressed, limit) {
            Ok(out) => prop_assert!(out.len() <= limit),
            Err(err) => prop_assert_eq!(err, CompressionError::OutputLimitExceeded { limit }),
        }
    }
}
