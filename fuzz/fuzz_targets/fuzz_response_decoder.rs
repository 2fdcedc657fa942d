//! Fuzz target: `ResponseDecoder::feed`
//!
//! Drives arbitrary byte sequences into the Modbus response decoder, both
//! in one piece and byte by byte, and asserts that it never panics and
//! that chunking does not change the result.
//!
//! cargo fuzz run fuzz_response_decoder

#![no_main]

use catwindow::transport::codec::ResponseDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut whole = ResponseDecoder::new();
    let at_once = whole.feed(data);

    let mut split = ResponseDecoder::new();
    let mut byte_wise = None;
    for chunk in data.chunks(1) {
        if let Some(r) = split.feed(chunk) {
            byte_wise = Some(r);
            break;
        }
    }
    assert_eq!(at_once, byte_wise, "chunking changed the decode result");

    // After a reset the decoder must accept bytes cleanly again.
    whole.reset();
    let _ = whole.feed(data);
});
