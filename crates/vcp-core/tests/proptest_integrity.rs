use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use vcp_core::event::canonical::{canonicalize, canonicalize_str};
use vcp_core::hash::{GENESIS, hash_canonical_parts};
use vcp_core::merkle::{OpenBatch, verify};
use vcp_core::{Digest, HashAlgorithm};

use generators::*;

fn close(hashes: &[Digest], alg: HashAlgorithm) -> vcp_core::ClosedBatch {
    let mut batch = OpenBatch::new(1, Arc::new(alg), Utc::now());
    for h in hashes {
        batch.append(h);
    }
    batch.close(Utc::now())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn canonical_form_ignores_key_order_and_whitespace(value in arb_json()) {
        let direct = String::from_utf8(canonicalize(&value).expect("canonical")).expect("utf8");
        let reordered = canonicalize_str(&render_reversed(&value)).expect("reordered");
        prop_assert_eq!(&direct, &reordered);
    }

    #[test]
    fn canonical_form_is_a_fixed_point(value in arb_json()) {
        let once = canonicalize_str(&serde_json::to_string(&value).expect("json")).expect("once");
        let twice = canonicalize_str(&once).expect("twice");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn event_hash_is_deterministic(
        header in arb_json(),
        payload in arb_json(),
        prev in arb_digest(),
    ) {
        let h = canonicalize(&header).expect("header");
        let p = canonicalize(&payload).expect("payload");
        for alg in HashAlgorithm::ALL {
            prop_assert_eq!(
                hash_canonical_parts(&h, &p, &prev, &alg),
                hash_canonical_parts(&h, &p, &prev, &alg)
            );
        }
    }

    #[test]
    fn previous_hash_is_bound(header in arb_json(), prev in arb_digest(), bit in 0usize..256) {
        let h = canonicalize(&header).expect("header");
        let alg = HashAlgorithm::Sha256;
        let base = hash_canonical_parts(&h, b"{}", &prev, &alg);
        prop_assert_ne!(base, hash_canonical_parts(&h, b"{}", &prev.with_flipped_bit(bit), &alg));
        if prev != GENESIS {
            prop_assert_ne!(base, hash_canonical_parts(&h, b"{}", &GENESIS, &alg));
        }
    }

    #[test]
    fn every_leaf_has_a_valid_audit_path(hashes in arb_digests(40)) {
        let alg = HashAlgorithm::Blake3;
        let batch = close(&hashes, alg);
        for (i, h) in hashes.iter().enumerate() {
            let path = batch.audit_path(i as u64).expect("path");
            prop_assert!(verify(h, &path, &batch.root().root, &alg));
        }
    }

    #[test]
    fn tampered_leaf_never_verifies(
        hashes in arb_digests(40),
        pick in any::<prop::sample::Index>(),
        bit in 0usize..256,
    ) {
        let alg = HashAlgorithm::Sha256;
        let batch = close(&hashes, alg);
        let i = pick.index(hashes.len());
        let path = batch.audit_path(i as u64).expect("path");
        let forged = hashes[i].with_flipped_bit(bit);
        prop_assert!(!verify(&forged, &path, &batch.root().root, &alg));
    }

    #[test]
    fn any_leaf_change_changes_root(
        hashes in arb_digests(40),
        pick in any::<prop::sample::Index>(),
        bit in 0usize..256,
    ) {
        let alg = HashAlgorithm::Sha256;
        let original = close(&hashes, alg).root().root;
        let mut altered = hashes.clone();
        let i = pick.index(altered.len());
        altered[i] = altered[i].with_flipped_bit(bit);
        prop_assert_ne!(original, close(&altered, alg).root().root);
    }

    #[test]
    fn root_depends_on_leaf_order(hashes in arb_digests(20)) {
        prop_assume!(hashes.len() >= 2 && hashes[0] != hashes[1]);
        let alg = HashAlgorithm::Sha256;
        let mut swapped = hashes.clone();
        swapped.swap(0, 1);
        prop_assert_ne!(close(&hashes, alg).root().root, close(&swapped, alg).root().root);
    }
}
