use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use vcp_core::ClosedBatch;
use vcp_core::merkle::{BatchRecord, Side};

use super::{Context, read_json, write_json};
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ProofArgs {
    /// Closed batch JSON as written by `vcp seal`.
    pub batch: PathBuf,

    /// Leaf index (the event's `merkle_index`).
    #[arg(long)]
    pub index: u64,

    /// Also write the path to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Load a batch file and rebuild its tree, rejecting a tampered record.
pub fn load_batch(path: &std::path::Path, ctx: &Context) -> Result<ClosedBatch> {
    let record: BatchRecord = read_json(path)?;
    ClosedBatch::from_record(record, &ctx.registry)
        .with_context(|| format!("rebuilding {}", path.display()))
}

pub fn run_proof(args: &ProofArgs, ctx: &Context) -> Result<()> {
    let batch = load_batch(&ctx.path(&args.batch), ctx)?;
    let path = batch.audit_path(args.index)?;
    if let Some(out) = &args.out {
        write_json(&ctx.path(out), &path)?;
    }

    let root = batch.root().root;
    render_mode(
        ctx.output,
        &path,
        |p, w| {
            for step in &p.siblings {
                let side = match step.side {
                    Side::Left => "left",
                    Side::Right => "right",
                };
                writeln!(w, "{side} {}", step.hash)?;
            }
            Ok(())
        },
        |p, w| {
            pretty_section(w, &format!("Audit path: batch {} leaf {}", p.batch_id, p.leaf_index))?;
            pretty_kv(w, "leaves", p.leaf_count.to_string())?;
            pretty_kv(w, "root", root.to_hex())?;
            for (level, step) in p.siblings.iter().enumerate() {
                pretty_kv(w, &format!("level {level}"), format!("{:?} {}", step.side, step.hash))?;
            }
            Ok(())
        },
    )
}
