use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde::Serialize;
use vcp_core::chain::{verify_chain, verify_unchained};
use vcp_core::merkle::verify;
use vcp_core::{AuditPath, Digest, SealedEvent};

use super::{Context, read_json, read_jsonl};
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct VerifyChainArgs {
    /// Sealed events (JSONL) in stream order.
    pub sealed: PathBuf,

    /// Expected `prev_hash` of the first event when the file continues an
    /// earlier stream.
    #[arg(long, value_name = "HEX", conflicts_with = "unchained")]
    pub from: Option<Digest>,

    /// The stream was produced with chaining disabled.
    #[arg(long)]
    pub unchained: bool,
}

#[derive(Debug, Serialize)]
struct ChainReport {
    events: usize,
    head: Option<Digest>,
    ok: bool,
}

pub fn run_verify_chain(args: &VerifyChainArgs, ctx: &Context) -> Result<()> {
    let path = ctx.path(&args.sealed);
    let events: Vec<SealedEvent> = read_jsonl(&path)?;

    let checked = if args.unchained {
        verify_unchained(&events, &ctx.registry)
    } else {
        verify_chain(&events, args.from, &ctx.registry)
    };
    checked.with_context(|| format!("verifying {}", path.display()))?;

    let report = ChainReport {
        events: events.len(),
        head: events.last().map(|e| *e.event_hash()),
        ok: true,
    };
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "ok {}", r.events),
        |r, w| {
            pretty_kv(w, "verified", format!("{} events", r.events))?;
            if let Some(head) = r.head {
                pretty_kv(w, "chain head", head.to_hex())?;
            }
            Ok(())
        },
    )
}

#[derive(Args, Debug)]
pub struct VerifyProofArgs {
    /// Hash of the event being proven.
    #[arg(long, value_name = "HEX")]
    pub event_hash: Digest,

    /// Audit path JSON as written by `vcp proof`.
    #[arg(long)]
    pub proof: PathBuf,

    /// Trusted Merkle root (from an anchor record).
    #[arg(long, value_name = "HEX")]
    pub root: Digest,

    /// Hash algorithm the batch was built with (defaults to the configured one).
    #[arg(long)]
    pub algorithm: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProofReport {
    valid: bool,
    batch_id: u64,
    leaf_index: u64,
    merkle_root: Digest,
}

pub fn run_verify_proof(args: &VerifyProofArgs, ctx: &Context) -> Result<()> {
    let hasher = ctx.hasher(args.algorithm.as_deref())?;
    let path: AuditPath = read_json(&ctx.path(&args.proof))?;
    let valid = verify(&args.event_hash, &path, &args.root, hasher.as_ref());

    let report = ProofReport {
        valid,
        batch_id: path.batch_id,
        leaf_index: path.leaf_index,
        merkle_root: args.root,
    };
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}", if r.valid { "valid" } else { "invalid" }),
        |r, w| {
            pretty_kv(w, "proof", if r.valid { "VALID" } else { "INVALID" })?;
            pretty_kv(w, "batch", r.batch_id.to_string())?;
            pretty_kv(w, "leaf", r.leaf_index.to_string())
        },
    )?;

    if !valid {
        bail!("audit path does not lead to root {}", args.root);
    }
    Ok(())
}
