#![no_main]

use libfuzzer_sys::fuzz_target;
use vcp_core::event::canonical::canonicalize_str;

// Whatever parses must canonicalize to a fixed point.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(once) = canonicalize_str(text) {
        let twice = canonicalize_str(&once).expect("canonical output must re-canonicalize");
        assert_eq!(once, twice);
    }
});
