#![no_main]

use libfuzzer_sys::fuzz_target;
use ringwal::block::{encode, Blocks};

fuzz_target!(|data: &[u8]| {
    // Every block the walker accepts must re-encode to the exact bytes it came from.
    for item in Blocks::new(data) {
        let Ok((range, payload)) = item else { break };
        assert_eq!(encode(payload), &data[range]);
    }
});
