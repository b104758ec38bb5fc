#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logrelay_pipeline::classifier::presets;
use logrelay_pipeline::{Grammar, LineClassifier};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    preset: u8,
    lines: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let names = presets::preset_names();
    let name = names[input.preset as usize % names.len()];
    let Ok(grammar) = Grammar::preset(name) else {
        return;
    };

    let mut classifier = LineClassifier::new(Arc::new(grammar));
    for line in input.lines.iter().take(64) {
        let event = classifier.classify(line);
        let _ = event.to_string();
    }
});
