#![no_main]

use libfuzzer_sys::fuzz_target;
use poker_p2p::Handshake;

fuzz_target!(|data: &[u8]| {
    // Bodies and complete frames both arrive from untrusted peers.
    if let Ok(hs) = Handshake::decode(data) {
        if let Ok(frame) = hs.encode() {
            let _ = Handshake::from_frame(&frame);
        }
    }
    let _ = Handshake::from_frame(data);
});
