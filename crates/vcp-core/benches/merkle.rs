use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vcp_core::merkle::{OpenBatch, verify};
use vcp_core::{ClosedBatch, Digest, HashAlgorithm, HashFunction, MerkleAccumulator};

const SIZES: [u64; 4] = [16, 256, 4_096, 65_536];

fn leaves(n: u64, alg: HashAlgorithm) -> Vec<Digest> {
    (0..n).map(|i| alg.digest(&i.to_be_bytes())).collect()
}

fn closed(hashes: &[Digest], alg: HashAlgorithm) -> ClosedBatch {
    let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    let mut batch = OpenBatch::new(1, Arc::new(alg), at);
    for h in hashes {
        batch.append(h);
    }
    batch.close(at)
}

fn bench_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle.close");
    for alg in HashAlgorithm::ALL {
        for n in SIZES {
            let hashes = leaves(n, alg);
            group.throughput(Throughput::Elements(n));
            group.bench_with_input(
                BenchmarkId::new(alg.as_str(), n),
                &hashes,
                |b, hashes| b.iter(|| black_box(closed(hashes, alg).root().root)),
            );
        }
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle.append");
    let alg = HashAlgorithm::Sha256;
    let hashes = leaves(4_096, alg);
    group.throughput(Throughput::Elements(hashes.len() as u64));
    group.bench_function("accumulator", |b| {
        b.iter(|| {
            let acc = MerkleAccumulator::new(Arc::new(alg), 1, Utc::now());
            for h in &hashes {
                black_box(acc.append(h));
            }
            acc.pending_leaves()
        });
    });
    group.finish();
}

fn bench_audit_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle.audit_path");
    let alg = HashAlgorithm::Sha256;
    for n in SIZES {
        let batch = closed(&leaves(n, alg), alg);
        let root = batch.root().root;
        let leaf = alg.digest(&(n / 2).to_be_bytes());
        group.bench_with_input(BenchmarkId::new("build", n), &batch, |b, batch| {
            b.iter(|| black_box(batch.audit_path(n / 2)));
        });
        if let Ok(path) = batch.audit_path(n / 2) {
            group.bench_with_input(BenchmarkId::new("verify", n), &path, |b, path| {
                b.iter(|| black_box(verify(&leaf, path, &root, &alg)));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_close, bench_append, bench_audit_path);
criterion_main!(benches);
