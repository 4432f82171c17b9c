use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use vcp_core::hash::{GENESIS, compute_event_hash};
use vcp_core::{Digest, Event};

use super::{Context, read_json};
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON file holding one event (`header` + `payload`).
    pub event: PathBuf,

    /// Hash of the preceding event (defaults to the genesis sentinel).
    #[arg(long, value_name = "HEX")]
    pub prev: Option<Digest>,

    /// Hash algorithm (defaults to the configured one).
    #[arg(long)]
    pub algorithm: Option<String>,
}

#[derive(Debug, Serialize)]
struct HashOutput {
    event_id: String,
    event_hash: Digest,
    prev_hash: Digest,
    hash_algo: String,
}

pub fn run_hash(args: &HashArgs, ctx: &Context) -> Result<()> {
    let hasher = ctx.hasher(args.algorithm.as_deref())?;
    let event: Event = read_json(&ctx.path(&args.event))?;
    let prev_hash = args.prev.unwrap_or(GENESIS);
    let event_hash =
        compute_event_hash(&event.header, &event.payload, &prev_hash, hasher.as_ref())?;

    let out = HashOutput {
        event_id: event.header.event_id,
        event_hash,
        prev_hash,
        hash_algo: hasher.name().to_owned(),
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| writeln!(w, "{}", o.event_hash),
        |o, w| {
            pretty_kv(w, "event", &o.event_id)?;
            pretty_kv(w, "hash", o.event_hash.to_hex())?;
            pretty_kv(w, "prev", o.prev_hash.to_hex())?;
            pretty_kv(w, "algorithm", &o.hash_algo)
        },
    )
}
