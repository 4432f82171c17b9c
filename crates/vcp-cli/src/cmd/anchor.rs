use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tracing::{error, info};
use vcp_core::anchor::{AbandonedAnchor, AnchorManager, AnchorRecord, AnchorState, PendingAnchor};
use vcp_core::lock::StateLock;

use super::Context;
use super::proof::load_batch;
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode};

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct AnchorArgs {
    /// Closed batch JSON as written by `vcp seal`.
    pub batch: PathBuf,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// Anchor state file (defaults to `[anchor] state_path`).
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AcknowledgeArgs {
    /// Batch id of the abandoned root.
    pub batch_id: u64,

    #[command(flatten)]
    pub state: StateArgs,
}

/// Holds the state lock for the lifetime of one command.
struct LockedState {
    path: PathBuf,
    state: AnchorState,
    _lock: StateLock,
}

impl LockedState {
    fn open(path: PathBuf) -> Result<Self> {
        let lock = StateLock::acquire(&StateLock::path_for(&path), LOCK_TIMEOUT)?;
        let state = AnchorState::load(&path)?;
        Ok(Self {
            path,
            state,
            _lock: lock,
        })
    }

    fn save(&self, state: &AnchorState) -> Result<()> {
        state.save(&self.path)?;
        Ok(())
    }
}

fn build_manager(ctx: &Context, state: AnchorState) -> Result<AnchorManager> {
    let targets = ctx.config.build_targets(&ctx.cwd);
    Ok(AnchorManager::new(targets, ctx.config.anchor_policy(), state)?)
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AnchorOutput {
    Anchored { record: AnchorRecord },
    Queued { batch_id: u64, pending: usize },
}

pub fn run_anchor(args: &AnchorArgs, ctx: &Context) -> Result<()> {
    let batch = load_batch(&ctx.path(&args.batch), ctx)?;
    let root = batch.root();
    if root.is_empty() {
        bail!("batch {} is empty; nothing to anchor", root.batch_id);
    }

    let locked = LockedState::open(ctx.state_path(args.state.state.as_deref()))?;
    if locked.state.is_pending(&root.root) {
        bail!(
            "batch {} root {} is already queued; run `vcp retry`",
            root.batch_id,
            root.root
        );
    }

    let mut manager = build_manager(ctx, locked.state.clone())?;
    let result = manager.anchor(root, Utc::now());
    let state = manager.into_state();
    locked.save(&state)?;

    let (out, failure) = match result {
        Ok(record) => (AnchorOutput::Anchored { record }, None),
        Err(err) => (
            AnchorOutput::Queued {
                batch_id: root.batch_id,
                pending: state.pending.len(),
            },
            Some(err),
        ),
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| match o {
            AnchorOutput::Anchored { record } => {
                writeln!(w, "anchored {} {}", record.target_identifier, record.merkle_root)
            }
            AnchorOutput::Queued { batch_id, .. } => writeln!(w, "queued {batch_id}"),
        },
        |o, w| match o {
            AnchorOutput::Anchored { record } => {
                pretty_section(w, &format!("Anchored batch {}", record.batch_id))?;
                pretty_kv(w, "target", &record.target_identifier)?;
                pretty_kv(w, "type", format!("{:?}", record.anchor_type))?;
                pretty_kv(w, "root", record.merkle_root.to_hex())?;
                pretty_kv(w, "at", record.anchored_at.to_rfc3339())?;
                pretty_kv(w, "proof", &record.proof)
            }
            AnchorOutput::Queued { batch_id, pending } => {
                pretty_kv(w, "queued", format!("batch {batch_id} ({pending} pending)"))
            }
        },
    )?;

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[derive(Debug, Serialize)]
struct RetryOutput {
    anchored: Vec<AnchorRecord>,
    still_pending: usize,
    abandoned: Vec<AbandonedAnchor>,
}

pub fn run_retry(args: &StateArgs, ctx: &Context) -> Result<()> {
    let locked = LockedState::open(ctx.state_path(args.state.as_deref()))?;
    if locked.state.pending.is_empty() {
        info!("nothing pending");
    }

    let mut manager = build_manager(ctx, locked.state.clone())?;
    let report = manager.retry_pending(Utc::now());
    locked.save(manager.state())?;

    for exhausted in report.exhausted() {
        error!(code = %exhausted.code(), "{exhausted}");
    }

    let out = RetryOutput {
        anchored: report.anchored.clone(),
        still_pending: report.still_pending,
        abandoned: report.abandoned.clone(),
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| {
            writeln!(w, "anchored {}", o.anchored.len())?;
            writeln!(w, "pending {}", o.still_pending)?;
            writeln!(w, "abandoned {}", o.abandoned.len())
        },
        |o, w| {
            pretty_section(w, "Retry round")?;
            for record in &o.anchored {
                pretty_kv(
                    w,
                    "anchored",
                    format!("batch {} via {}", record.batch_id, record.target_identifier),
                )?;
            }
            pretty_kv(w, "pending", o.still_pending.to_string())?;
            for gone in &o.abandoned {
                pretty_kv(
                    w,
                    "ABANDONED",
                    format!("batch {} root {}", gone.merkle_root.batch_id, gone.merkle_root.root),
                )?;
            }
            Ok(())
        },
    )?;

    match report.exhausted().into_iter().next() {
        Some(first) => Err(first.into()),
        None => Ok(()),
    }
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    state_path: PathBuf,
    interval_secs: u64,
    last_anchor_at: Option<DateTime<Utc>>,
    next_due: Option<DateTime<Utc>>,
    pending: Vec<PendingAnchor>,
    abandoned: Vec<AbandonedAnchor>,
}

fn read_state(path: &Path) -> Result<AnchorState> {
    Ok(AnchorState::load(path)?)
}

pub fn run_status(args: &StateArgs, ctx: &Context) -> Result<()> {
    let state_path = ctx.state_path(args.state.as_deref());
    let state = read_state(&state_path)?;
    let policy = ctx.config.anchor_policy();

    let out = StatusOutput {
        next_due: state.last_anchor_at.map(|at| policy.due_after(at)),
        interval_secs: ctx.config.interval_secs(),
        last_anchor_at: state.last_anchor_at,
        pending: state.pending,
        abandoned: state.abandoned,
        state_path,
    };
    render_mode(
        ctx.output,
        &out,
        |o, w| {
            let when =
                |t: Option<DateTime<Utc>>| t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
            writeln!(w, "last_anchor_at {}", when(o.last_anchor_at))?;
            writeln!(w, "next_due {}", when(o.next_due))?;
            writeln!(w, "pending {}", o.pending.len())?;
            writeln!(w, "abandoned {}", o.abandoned.len())
        },
        |o, w| {
            pretty_section(w, "Anchor status")?;
            pretty_kv(w, "state", o.state_path.display().to_string())?;
            pretty_kv(w, "interval", format!("{}s", o.interval_secs))?;
            pretty_kv(
                w,
                "last anchor",
                o.last_anchor_at.map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
            )?;
            pretty_kv(
                w,
                "next due",
                o.next_due.map_or_else(|| "now".to_string(), |t| t.to_rfc3339()),
            )?;
            if !o.pending.is_empty() {
                pretty_rule(w)?;
                for p in &o.pending {
                    pretty_kv(
                        w,
                        "pending",
                        format!(
                            "batch {} retries {} queued {}",
                            p.merkle_root.batch_id,
                            p.retry_count,
                            p.queued_at.to_rfc3339()
                        ),
                    )?;
                }
            }
            if !o.abandoned.is_empty() {
                pretty_rule(w)?;
                for a in &o.abandoned {
                    pretty_kv(
                        w,
                        "ABANDONED",
                        format!(
                            "batch {} root {} at {}",
                            a.merkle_root.batch_id,
                            a.merkle_root.root,
                            a.abandoned_at.to_rfc3339()
                        ),
                    )?;
                }
            }
            Ok(())
        },
    )
}

#[derive(Debug, Serialize)]
struct AcknowledgeOutput {
    batch_id: u64,
    removed: usize,
}

pub fn run_acknowledge(args: &AcknowledgeArgs, ctx: &Context) -> Result<()> {
    let mut locked = LockedState::open(ctx.state_path(args.state.state.as_deref()))?;
    let removed = locked.state.acknowledge(args.batch_id);
    if removed == 0 {
        bail!("batch {} is not in the abandoned list", args.batch_id);
    }
    locked.save(&locked.state)?;
    info!(batch_id = args.batch_id, "abandoned root acknowledged");

    render_mode(
        ctx.output,
        &AcknowledgeOutput {
            batch_id: args.batch_id,
            removed,
        },
        |o, w| writeln!(w, "acknowledged {}", o.batch_id),
        |o, w| pretty_kv(w, "acknowledged", format!("batch {}", o.batch_id)),
    )
}
