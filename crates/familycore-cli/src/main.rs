//! `familycore` — the operator CLI for the cognitive event & decision core
//! (spec §6 "Operator CLI"). Wraps the durable per-space substrate and bus
//! for inspection (`bus tail`, `bus groups`, `bus offsets`, `bus dlq
//! list|replay`, `space snapshot`, `space verify`) and drives the Pipeline
//! Orchestrator (C10) as a long-running process (`pipelines run`) wiring
//! the no-op capability facades (C12) when no external policy, redaction,
//! keystore, or embedding provider is configured.
//!
//! Exit codes follow spec §6 exactly: `0` ok, `2` invariant violation, `3`
//! substrate error, `4` policy denied, `5` not found.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use familycore_core::CoreConfig;
use tracing_subscriber::EnvFilter;

/// The cognitive event & decision core: bus inspection, space maintenance,
/// and the pipeline orchestrator runtime.
#[derive(Parser)]
#[command(name = "familycore")]
#[command(author = "Family Core Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the family-memory cognitive core")]
struct Cli {
    /// Root data directory (defaults to $FAMILY_CORE_DATA_DIR, else the
    /// platform data directory).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Event bus inspection and replay.
    Bus(BusArgs),
    /// Space-level maintenance (snapshot, consistency verification).
    Space(SpaceArgs),
    /// Run the pipeline orchestrator (C10) as a long-lived process.
    Pipelines(PipelinesArgs),
}

#[derive(Args)]
struct BusArgs {
    #[command(subcommand)]
    command: BusCommands,
}

#[derive(Subcommand)]
pub enum BusCommands {
    /// Stream events from a topic's durable log, starting at an offset.
    Tail {
        /// Space to read from.
        #[arg(long)]
        space: String,
        /// Topic to tail.
        topic: String,
        /// Offset to start from (defaults to the beginning of the log).
        #[arg(long)]
        from: Option<u64>,
        /// If set, print only records still in-flight/unacked for this
        /// consumer group rather than every record in the log.
        #[arg(long)]
        group: Option<String>,
        /// Emit one JSON object per line instead of the human-readable table.
        #[arg(long)]
        json: bool,
    },

    /// List the known consumer groups (the fixed pipeline catalogue) and
    /// their per-topic committed offset.
    Groups {
        #[arg(long)]
        space: String,
    },

    /// Show committed offset and WAL length (lag) for a topic across every
    /// known consumer group.
    Offsets {
        #[arg(long)]
        space: String,
        topic: String,
    },

    /// Dead-letter queue inspection and replay.
    Dlq(DlqArgs),
}

#[derive(Args)]
pub struct DlqArgs {
    #[command(subcommand)]
    pub command: DlqCommands,
}

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List dead-lettered records, optionally filtered by topic/group.
    List {
        #[arg(long)]
        space: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Re-publish a dead-lettered record under a new offset
    /// (`replayed_from` breaks the retry cycle; handlers still dedupe on
    /// the original `event_id`).
    Replay {
        #[arg(long)]
        space: String,
        dlq_id: String,
    },
}

#[derive(Args)]
struct SpaceArgs {
    #[command(subcommand)]
    command: SpaceCommands,
}

#[derive(Subcommand)]
pub enum SpaceCommands {
    /// Take a point-in-time consistent snapshot of a space's KV tables and
    /// WAL logs.
    Snapshot { space_id: String, path: PathBuf },
    /// Cross-check every watched topic's WAL against its consumer offsets.
    Verify { space_id: String },
}

#[derive(Args)]
struct PipelinesArgs {
    #[command(subcommand)]
    command: PipelinesCommands,
}

#[derive(Subcommand)]
enum PipelinesCommands {
    /// Run the fixed twenty-pipeline catalogue against one space until
    /// interrupted, polling each handler's topic in round-robin order.
    Run {
        #[arg(long)]
        space: String,
        /// Sleep between empty poll rounds (milliseconds).
        #[arg(long, default_value_t = 50)]
        idle_sleep_ms: u64,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = CoreConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let storage = Arc::new(familycore_core::Storage::new(config.data_dir.clone()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime");

    let outcome = match cli.command {
        Commands::Bus(args) => commands::bus::run(storage.as_ref(), &config, args.command),
        Commands::Space(args) => commands::space::run(storage.as_ref(), args.command),
        Commands::Pipelines(args) => {
            let PipelinesCommands::Run { space, idle_sleep_ms } = args.command;
            runtime.block_on(commands::pipelines::run(storage.clone(), config, space, idle_sleep_ms))
        }
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            err.exit_code()
        }
    }
}
