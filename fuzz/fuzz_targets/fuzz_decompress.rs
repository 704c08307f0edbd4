#![no_main]

use libfuzzer_sys::fuzz_target;
use vba2py_extract::compression::{decompress_container_with_limit, output_limit, DEFAULT_EXPANSION_RATIO};

fuzz_target!(|data: &[u8]| {
    let limit = output_limit(data.len(), DEFAULT_EXPANSION_RATIO);
    if let Ok(out) = decompress_container_with_limit(data, limit) {
        assert!(out.len() <= limit);
    }
    // Whole-container extraction must not panic either.
    let _ = vba2py_extract::extract(data);
});
