//! E2E CLI tests covering the auditor workflow:
//! - `vcp seal` → `vcp verify-chain` (clean and tampered)
//! - `vcp hash` agreeing with the sealed stream
//! - `vcp proof` → `vcp verify-proof`
//!
//! Each test runs the `vcp` binary as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn vcp_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vcp"));
    cmd.current_dir(dir);
    cmd.env("VCP_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd.env_remove("FORMAT");
    cmd
}

fn draft(seq: i64, qty: &str) -> Value {
    let ns = 1_732_000_000_000_000_000_i64 + seq * 1_000_000;
    json!({
        "header": {
            "event_id": format!("ord-{seq}"),
            "trace_id": "trace-1",
            "timestamp_int": ns,
            "timestamp_iso": "2024-11-19T07:06:40Z",
            "event_type": "ORD",
            "event_type_code": 2,
            "venue_id": "XNAS",
            "symbol": "AAPL",
            "account_id": "ACC-7"
        },
        "payload": {
            "trade_data": {
                "order_id": format!("ORD-{seq}"),
                "side": "BUY",
                "order_type": "LIMIT",
                "price": "189.50",
                "quantity": qty,
                "currency": "USD"
            }
        }
    })
}

fn write_drafts(dir: &Path, n: i64) {
    let lines: Vec<String> = (0..n).map(|i| draft(i, "100").to_string()).collect();
    fs::write(dir.join("drafts.jsonl"), lines.join("\n") + "\n").expect("write drafts");
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = vcp_cmd(dir)
        .args(args)
        .args(["--format", "json"])
        .output()
        .expect("vcp should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn seal(dir: &Path) -> Value {
    run_json(
        dir,
        &["seal", "drafts.jsonl", "--out", "sealed.jsonl", "--batch", "batch.json"],
    )
}

fn sealed_lines(dir: &Path) -> Vec<Value> {
    fs::read_to_string(dir.join("sealed.jsonl"))
        .expect("sealed file")
        .lines()
        .map(|l| serde_json::from_str(l).expect("sealed line"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn seal_then_verify_chain_succeeds() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 5);

    let summary = seal(dir.path());
    assert_eq!(summary["events"], 5);
    assert_eq!(summary["batch_id"], 1);
    assert_eq!(summary["hash_algo"], "sha256");
    assert_eq!(summary["merkle_root"].as_str().expect("root").len(), 64);

    let sealed = sealed_lines(dir.path());
    assert_eq!(sealed.len(), 5);
    assert_eq!(sealed[0]["security"]["prev_hash"], "0".repeat(64));
    assert_eq!(
        sealed[1]["security"]["prev_hash"],
        sealed[0]["security"]["event_hash"]
    );
    assert_eq!(sealed[4]["security"]["merkle_index"], 4);

    let report = run_json(dir.path(), &["verify-chain", "sealed.jsonl"]);
    assert_eq!(report["ok"], true);
    assert_eq!(report["events"], 5);
    assert_eq!(report["head"], summary["last_event_hash"]);
}

#[test]
fn edited_quantity_is_reported_as_hash_mismatch() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 3);
    seal(dir.path());

    let mut sealed = sealed_lines(dir.path());
    sealed[1]["payload"]["trade_data"]["quantity"] = json!("1000");
    let lines: Vec<String> = sealed.iter().map(Value::to_string).collect();
    fs::write(dir.path().join("sealed.jsonl"), lines.join("\n")).expect("rewrite");

    let output = vcp_cmd(dir.path())
        .args(["verify-chain", "sealed.jsonl", "--format", "json"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("error JSON on stderr");
    assert_eq!(err["error"]["error_code"], "E2002");
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("index 1")
    );
}

#[test]
fn reordered_stream_is_reported_as_broken_chain() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 3);
    seal(dir.path());

    let mut sealed = sealed_lines(dir.path());
    sealed.swap(1, 2);
    let lines: Vec<String> = sealed.iter().map(Value::to_string).collect();
    fs::write(dir.path().join("sealed.jsonl"), lines.join("\n")).expect("rewrite");

    vcp_cmd(dir.path())
        .args(["verify-chain", "sealed.jsonl", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2001]"));
}

#[test]
fn hash_command_matches_sealed_event() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 2);
    seal(dir.path());
    let sealed = sealed_lines(dir.path());

    fs::write(dir.path().join("first.json"), draft(0, "100").to_string()).expect("write");
    fs::write(dir.path().join("second.json"), draft(1, "100").to_string()).expect("write");

    let first = sealed[0]["security"]["event_hash"].as_str().expect("hash");
    vcp_cmd(dir.path())
        .args(["hash", "first.json", "--format", "text"])
        .assert()
        .success()
        .stdout(format!("{first}\n"));

    let second = run_json(dir.path(), &["hash", "second.json", "--prev", first]);
    assert_eq!(second["event_hash"], sealed[1]["security"]["event_hash"]);

    let blake = run_json(dir.path(), &["hash", "first.json", "--algorithm", "blake3"]);
    assert_eq!(blake["hash_algo"], "blake3");
    assert_ne!(blake["event_hash"].as_str(), Some(first));
}

#[test]
fn unknown_algorithm_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("e.json"), draft(0, "1").to_string()).expect("write");
    vcp_cmd(dir.path())
        .args(["hash", "e.json", "--algorithm", "md5", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn proof_roundtrip_verifies_every_leaf() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 5);
    let summary = seal(dir.path());
    let root = summary["merkle_root"].as_str().expect("root").to_string();
    let sealed = sealed_lines(dir.path());

    for (i, event) in sealed.iter().enumerate() {
        let index = i.to_string();
        let proof_file = format!("proof-{i}.json");
        let path = run_json(
            dir.path(),
            &["proof", "batch.json", "--index", &index, "--out", &proof_file],
        );
        assert_eq!(path["leaf_index"], i);
        assert_eq!(path["leaf_count"], 5);

        let hash = event["security"]["event_hash"].as_str().expect("hash");
        let report = run_json(
            dir.path(),
            &["verify-proof", "--event-hash", hash, "--proof", &proof_file, "--root", &root],
        );
        assert_eq!(report["valid"], true);
    }
}

#[test]
fn proof_against_wrong_root_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 4);
    seal(dir.path());
    let sealed = sealed_lines(dir.path());
    let hash = sealed[2]["security"]["event_hash"].as_str().expect("hash");

    vcp_cmd(dir.path())
        .args(["proof", "batch.json", "--index", "2", "--out", "p.json", "--format", "text"])
        .assert()
        .success();

    vcp_cmd(dir.path())
        .args([
            "verify-proof",
            "--event-hash",
            hash,
            "--proof",
            "p.json",
            "--root",
            &"ab".repeat(32),
            "--format",
            "text",
        ])
        .assert()
        .failure()
        .stdout("invalid\n");
}

#[test]
fn proof_index_out_of_range_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 3);
    seal(dir.path());

    vcp_cmd(dir.path())
        .args(["proof", "batch.json", "--index", "3", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

#[test]
fn tampered_batch_file_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    write_drafts(dir.path(), 3);
    seal(dir.path());

    let mut batch: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("batch.json")).expect("read"))
            .expect("batch json");
    batch["leaves"][0] = json!("11".repeat(32));
    fs::write(dir.path().join("batch.json"), batch.to_string()).expect("write");

    vcp_cmd(dir.path())
        .args(["proof", "batch.json", "--index", "0", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root mismatch"));
}
