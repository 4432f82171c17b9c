#![no_main]

use libfuzzer_sys::fuzz_target;
use vcp_core::merkle::{AuditPath, verify};
use vcp_core::{Digest, HashAlgorithm};

// Arbitrary proof JSON must never panic the verifier.
fuzz_target!(|data: &[u8]| {
    if data.len() < 64 {
        return;
    }
    let (head, rest) = data.split_at(64);
    let mut leaf = [0u8; 32];
    let mut root = [0u8; 32];
    leaf.copy_from_slice(&head[..32]);
    root.copy_from_slice(&head[32..]);
    if let Ok(path) = serde_json::from_slice::<AuditPath>(rest) {
        for alg in HashAlgorithm::ALL {
            let _ = verify(&Digest(leaf), &path, &Digest(root), &alg);
        }
    }
});
