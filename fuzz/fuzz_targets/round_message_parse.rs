#![no_main]

use libfuzzer_sys::fuzz_target;
use tapquorum_musig::wire::{
    deserialize_message, partial_sig_from_bytes, pubnonce_from_bytes, serialize_message,
};

fuzz_target!(|data: &[u8]| {
    // Must return Ok or Err, never panic.
    let _ = pubnonce_from_bytes(data);
    let _ = partial_sig_from_bytes(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = deserialize_message(s) {
            let _ = msg.decode_nonce();
            let _ = msg.decode_partial();
            // Re-serializing a parsed envelope should also never panic
            let _ = serialize_message(&msg);
        }
    }
});
