#![no_main]

use libfuzzer_sys::fuzz_target;
use logrelay_pipeline::LineDecoder;

fuzz_target!(|data: &[u8]| {
    let mut decoder = LineDecoder::new();
    decoder.observe_sample(&data[..data.len().min(4096)]);

    // every chunk must shrink the input; decoding never panics
    let mut rest = data;
    while !rest.is_empty() {
        let end = decoder.find_line_end(rest).unwrap_or(rest.len());
        assert!(end > 0 && end <= rest.len());
        let line = decoder.decode_line(&rest[..end]);
        assert!(!line.contains('\n'));
        rest = &rest[end..];
    }
});
