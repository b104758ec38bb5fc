#![no_main]

use libfuzzer_sys::fuzz_target;
use logrelay_pipeline::Grammar;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        if let Ok(grammar) = Grammar::from_yaml(yaml, "fuzz-input.yaml") {
            let _ = grammar.match_line(yaml);
        }
    }
});
