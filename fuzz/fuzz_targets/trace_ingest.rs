#![no_main]

use libfuzzer_sys::fuzz_target;
use tyrecon_core::Trace;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Malformed records must be rejected with an error, never a panic
    if let Ok(trace) = Trace::from_json(text) {
        for op in trace.operations() {
            let _ = op.to_string();
        }
    }
});
