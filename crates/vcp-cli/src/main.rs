#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "vcp: tamper-evident hashing, Merkle proofs and anchoring for trading audit trails",
    long_about = None
)]
struct Cli {
    /// Output format (defaults to pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Alias for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Integrity",
        about = "Compute the hash of one event",
        long_about = "Canonicalize an event's header and payload and compute its hash against a previous hash.",
        after_help = "EXAMPLES:\n    # Hash the first event of a stream\n    vcp hash order.json\n\n    # Hash against a predecessor with BLAKE3\n    vcp hash order.json --prev 3f0c... --algorithm blake3"
    )]
    Hash(cmd::hash::HashArgs),

    #[command(
        next_help_heading = "Integrity",
        about = "Seal a stream of draft events into one batch",
        long_about = "Hash and chain every event in a JSONL file, append each to a Merkle batch, and write the sealed events plus the closed batch.",
        after_help = "EXAMPLES:\n    # Seal a day of events\n    vcp seal drafts.jsonl --out sealed.jsonl --batch batch.json\n\n    # Continue a stream from an earlier batch\n    vcp seal more.jsonl --out sealed-2.jsonl --batch batch-2.json --batch-id 2 --prev 9ab1..."
    )]
    Seal(cmd::seal::SealArgs),

    #[command(
        next_help_heading = "Audit",
        about = "Verify hashes and links of a sealed stream",
        after_help = "EXAMPLES:\n    # Verify a stream that starts at genesis\n    vcp verify-chain sealed.jsonl\n\n    # Verify a continuation\n    vcp verify-chain sealed-2.jsonl --from 9ab1..."
    )]
    VerifyChain(cmd::verify::VerifyChainArgs),

    #[command(
        next_help_heading = "Audit",
        about = "Produce the audit path for one leaf of a batch",
        after_help = "EXAMPLES:\n    # Print the path for leaf 3\n    vcp proof batch.json --index 3\n\n    # Save it for an auditor\n    vcp proof batch.json --index 3 --out proof-3.json"
    )]
    Proof(cmd::proof::ProofArgs),

    #[command(
        next_help_heading = "Audit",
        about = "Check an audit path against a Merkle root",
        after_help = "EXAMPLES:\n    vcp verify-proof --event-hash 5e2d... --proof proof-3.json --root c41a..."
    )]
    VerifyProof(cmd::verify::VerifyProofArgs),

    #[command(
        next_help_heading = "Anchoring",
        about = "Anchor a closed batch's root to the configured targets",
        long_about = "Try each configured anchor target in order. If all fail, the root is queued in the anchor state for `vcp retry`.",
        after_help = "EXAMPLES:\n    vcp anchor batch.json\n\n    # Use a specific state file\n    vcp anchor batch.json --state /var/lib/vcp/anchor-state.json"
    )]
    Anchor(cmd::anchor::AnchorArgs),

    #[command(
        next_help_heading = "Anchoring",
        about = "Retry every queued root once",
        after_help = "EXAMPLES:\n    vcp retry\n\n    # From cron, machine-readable\n    vcp retry --format json"
    )]
    Retry(cmd::anchor::StateArgs),

    #[command(
        next_help_heading = "Anchoring",
        about = "Show anchor schedule, pending and abandoned roots",
        after_help = "EXAMPLES:\n    vcp status"
    )]
    Status(cmd::anchor::StateArgs),

    #[command(
        next_help_heading = "Anchoring",
        about = "Acknowledge an abandoned root after manual handling",
        after_help = "EXAMPLES:\n    vcp acknowledge 42"
    )]
    Acknowledge(cmd::anchor::AcknowledgeArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show the effective configuration and where it came from",
        after_help = "EXAMPLES:\n    vcp config\n\n    vcp config --format json"
    )]
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VCP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "vcp=debug,info"
        } else {
            "vcp=info,warn"
        })
    });

    let format = env::var("VCP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(command: &Commands, ctx: &cmd::Context) -> anyhow::Result<()> {
    match command {
        Commands::Hash(args) => cmd::hash::run_hash(args, ctx),
        Commands::Seal(args) => cmd::seal::run_seal(args, ctx),
        Commands::VerifyChain(args) => cmd::verify::run_verify_chain(args, ctx),
        Commands::Proof(args) => cmd::proof::run_proof(args, ctx),
        Commands::VerifyProof(args) => cmd::verify::run_verify_proof(args, ctx),
        Commands::Anchor(args) => cmd::anchor::run_anchor(args, ctx),
        Commands::Retry(args) => cmd::anchor::run_retry(args, ctx),
        Commands::Status(args) => cmd::anchor::run_status(args, ctx),
        Commands::Acknowledge(args) => cmd::anchor::run_acknowledge(args, ctx),
        Commands::Config => cmd::config::run_config(ctx),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cwd = env::current_dir()?;
    let output = cli.output_mode();

    let result = cmd::Context::load(cli.config.as_deref(), cwd, output).and_then(|ctx| {
        debug!(source = ?ctx.source, "config resolved");
        dispatch(&cli.command, &ctx)
    });

    if let Err(err) = result {
        output::render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
