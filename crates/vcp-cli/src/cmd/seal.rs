use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tracing::info;
use vcp_core::chain::HashChainState;
use vcp_core::{Digest, Event, IntegrityPipeline, MerkleAccumulator, SealedEvent};

use super::{Context, read_jsonl, write_json, write_jsonl};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SealArgs {
    /// JSONL file of draft events, one per line, in stream order.
    pub drafts: PathBuf,

    /// Where to write the sealed events (JSONL).
    #[arg(long)]
    pub out: PathBuf,

    /// Where to write the closed batch (root plus leaves).
    #[arg(long)]
    pub batch: PathBuf,

    /// Id for the batch being sealed.
    #[arg(long, default_value_t = 1)]
    pub batch_id: u64,

    /// Resume a chain after this event hash instead of starting at genesis.
    #[arg(long, value_name = "HEX")]
    pub prev: Option<Digest>,

    /// Hash algorithm (defaults to the configured one).
    #[arg(long)]
    pub algorithm: Option<String>,
}

#[derive(Debug, Serialize)]
struct SealOutput {
    events: usize,
    batch_id: u64,
    merkle_root: Digest,
    hash_algo: String,
    last_event_hash: Option<Digest>,
    sealed_path: PathBuf,
    batch_path: PathBuf,
}

pub fn run_seal(args: &SealArgs, ctx: &Context) -> Result<()> {
    let hasher = ctx.hasher(args.algorithm.as_deref())?;
    let chain = match (args.prev, ctx.config.hashing.chain) {
        (None, _) => ctx.config.chain_state(),
        (Some(prev), true) => HashChainState::resume(prev),
        (Some(_), false) => bail!("--prev given but chaining is disabled in [hashing]"),
    };

    let drafts: Vec<Event> = read_jsonl(&ctx.path(&args.drafts))?;
    let accumulator = Arc::new(MerkleAccumulator::new(hasher, args.batch_id, Utc::now()));
    let pipeline = IntegrityPipeline::new(Arc::clone(&accumulator), chain);

    let sealed = drafts
        .into_iter()
        .enumerate()
        .map(|(i, event)| {
            pipeline
                .submit(event)
                .with_context(|| format!("sealing draft #{}", i + 1))
        })
        .collect::<Result<Vec<SealedEvent>>>()?;

    let batch = accumulator.close(Utc::now());
    let sealed_path = ctx.path(&args.out);
    let batch_path = ctx.path(&args.batch);
    write_jsonl(&sealed_path, &sealed)?;
    write_json(&batch_path, &batch.to_record())?;

    let root = batch.root();
    info!(
        batch_id = root.batch_id,
        leaf_count = root.leaf_count,
        merkle_root = %root.root,
        "batch sealed"
    );

    let out = SealOutput {
        events: sealed.len(),
        batch_id: root.batch_id,
        merkle_root: root.root,
        hash_algo: root.hash_algo.clone(),
        last_event_hash: sealed.last().map(|s| *s.event_hash()),
        sealed_path,
        batch_path,
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| {
            writeln!(w, "events {}", o.events)?;
            writeln!(w, "batch_id {}", o.batch_id)?;
            writeln!(w, "merkle_root {}", o.merkle_root)
        },
        |o, w| {
            pretty_section(w, &format!("Sealed batch {}", o.batch_id))?;
            pretty_kv(w, "events", o.events.to_string())?;
            pretty_kv(w, "merkle root", o.merkle_root.to_hex())?;
            pretty_kv(w, "algorithm", &o.hash_algo)?;
            if let Some(last) = o.last_event_hash {
                pretty_kv(w, "chain head", last.to_hex())?;
            }
            pretty_kv(w, "sealed", o.sealed_path.display().to_string())?;
            pretty_kv(w, "batch", o.batch_path.display().to_string())
        },
    )
}
