#![no_main]

use bitcoin::Script;
use libfuzzer_sys::fuzz_target;
use tapquorum_policy::leaf::{compile_checksigadd, decode_checksigadd};

fuzz_target!(|data: &[u8]| {
    // decode_checksigadd must never panic on arbitrary script bytes.
    let script = Script::from_bytes(data);

    // Anything it accepts must recompile to the exact same bytes.
    if let Ok((keys, _threshold)) = decode_checksigadd(script) {
        let recompiled = compile_checksigadd(&keys).expect("decoded keys recompile");
        assert_eq!(recompiled.as_bytes(), data);
    }
});
