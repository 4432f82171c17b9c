use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use serde_json::json;
use vcp_core::chain::{ChainError, verify_chain};
use vcp_core::event::payload::Payload;
use vcp_core::event::types::EventType;
use vcp_core::merkle::{OpenBatch, verify};
use vcp_core::{
    Digest, Event, EventHeader, HashAlgorithm, HashChainState, HashFunction, HashRegistry,
    IntegrityPipeline, MerkleAccumulator, SealedEvent,
};

fn trade(seq: i64, qty: &str) -> Event {
    let at = Utc
        .timestamp_opt(1_732_000_000 + seq, 250_000_000)
        .single()
        .expect("ts");
    Event::new(
        EventHeader::new(format!("ord-{seq}"), EventType::Order, at, "XNAS", "AAPL", "ACC-7"),
        Payload::from_value(json!({
            "trade_data": {
                "order_id": format!("ORD-{seq}"),
                "side": "BUY",
                "order_type": "LIMIT",
                "price": "189.50",
                "quantity": qty,
                "currency": "USD"
            }
        }))
        .expect("trade payload"),
    )
}

fn pipeline(alg: HashAlgorithm) -> IntegrityPipeline {
    let acc = Arc::new(MerkleAccumulator::new(Arc::new(alg), 1, Utc::now()));
    IntegrityPipeline::new(acc, HashChainState::genesis())
}

#[test]
fn five_events_prove_and_single_bit_changes_root() {
    let alg = HashAlgorithm::Sha256;
    let hashes: Vec<Digest> = (1u8..=5).map(|i| alg.digest(&[b'h', i])).collect();

    let build = |hs: &[Digest]| {
        let mut batch = OpenBatch::new(1, Arc::new(alg), Utc::now());
        for h in hs {
            batch.append(h);
        }
        batch.close(Utc::now())
    };

    let batch = build(&hashes);
    for (i, h) in hashes.iter().enumerate() {
        let path = batch.audit_path(i as u64).expect("path");
        assert!(verify(h, &path, &batch.root().root, &alg), "h{} failed", i + 1);
    }

    let mut tampered = hashes.clone();
    tampered[2] = tampered[2].with_flipped_bit(17);
    assert_ne!(build(&tampered).root().root, batch.root().root);
}

#[test]
fn sealed_stream_survives_json_roundtrip_and_verifies() {
    let p = pipeline(HashAlgorithm::Blake3);
    let sealed: Vec<SealedEvent> = (0..6)
        .map(|i| p.submit(trade(i, "100")).expect("submit"))
        .collect();

    let lines: Vec<String> = sealed
        .iter()
        .map(|s| serde_json::to_string(s).expect("encode"))
        .collect();
    let decoded: Vec<SealedEvent> = lines
        .iter()
        .map(|l| serde_json::from_str(l).expect("decode"))
        .collect();
    assert_eq!(decoded, sealed);
    assert!(matches!(decoded[0].payload, Payload::Trade(_)));
    verify_chain(&decoded, None, &HashRegistry::with_builtins()).expect("chain");

    let batch = p.accumulator().close(Utc::now());
    let registry = HashRegistry::with_builtins();
    let hasher = registry.resolve(&batch.root().hash_algo).expect("algo");
    for s in &decoded {
        let path = batch
            .audit_path(s.security.merkle_index.expect("index"))
            .expect("path");
        assert!(verify(s.event_hash(), &path, &batch.root().root, hasher.as_ref()));
    }
}

#[test]
fn edited_quantity_breaks_verification() {
    let p = pipeline(HashAlgorithm::Sha256);
    let mut sealed: Vec<SealedEvent> = (0..3)
        .map(|i| p.submit(trade(i, "100")).expect("submit"))
        .collect();

    let mut json = serde_json::to_value(&sealed[1]).expect("encode");
    json["payload"]["trade_data"]["quantity"] = json!("1000");
    sealed[1] = serde_json::from_value(json).expect("decode");

    let err = verify_chain(&sealed, None, &HashRegistry::with_builtins()).expect_err("tampered");
    assert!(matches!(err, ChainError::Event { index: 1, .. }), "{err}");
}

#[test]
fn producer_keeps_appending_while_batches_close() {
    let p = Arc::new(pipeline(HashAlgorithm::Sha256));
    let producer = {
        let p = Arc::clone(&p);
        thread::spawn(move || {
            (0..300)
                .map(|i| p.submit(trade(i, "1")).expect("submit"))
                .collect::<Vec<_>>()
        })
    };

    let mut batches = Vec::new();
    for _ in 0..5 {
        batches.push(p.accumulator().close(Utc::now()));
        thread::yield_now();
    }
    let sealed = producer.join().expect("producer");
    batches.push(p.accumulator().close(Utc::now()));

    verify_chain(&sealed, None, &HashRegistry::with_builtins()).expect("chain unaffected");
    let total: u64 = batches.iter().map(|b| b.root().leaf_count).sum();
    assert_eq!(total, 300);

    for s in &sealed {
        let batch = batches
            .iter()
            .find(|b| Some(b.root().batch_id) == s.security.batch_id)
            .expect("batch");
        let path = batch
            .audit_path(s.security.merkle_index.expect("index"))
            .expect("path");
        assert!(verify(s.event_hash(), &path, &batch.root().root, batch.hasher()));
    }
}
