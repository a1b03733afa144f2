use clap::{Args, Parser, Subcommand};

/// Global configuration overrides shared by the administrative CLI and the
/// three hook binaries. Flattened into each binary's own argument struct so
/// `Config::load` has one code path regardless of which entry point parsed
/// the command line.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to the TOML config file (defaults to .governance/config.toml if present)
    #[arg(long)]
    pub config: Option<String>,

    /// Task list namespace for this project
    #[arg(long)]
    pub task_list_id: Option<String>,

    /// Settle-check debounce window in milliseconds
    #[arg(long)]
    pub settle_interval_ms: Option<u64>,

    /// Minimum session task count that triggers a holistic review
    #[arg(long)]
    pub min_tasks_for_review: Option<u32>,

    /// Age (ms) after which a holistic-review flag is treated as cleared
    #[arg(long)]
    pub review_flag_staleness_ms: Option<u64>,

    /// External reviewer binary to invoke
    #[arg(long)]
    pub reviewer_binary: Option<String>,

    /// Path to the memory graph JSONL file
    #[arg(long)]
    pub memory_path: Option<String>,

    /// Path to the governance sqlite database
    #[arg(long)]
    pub governance_db_path: Option<String>,

    /// Path to the trust sqlite database
    #[arg(long)]
    pub trust_db_path: Option<String>,

    /// Directory holding per-task JSON files
    #[arg(long)]
    pub task_dir: Option<String>,
}

/// Administrative CLI over the memory, trust/quality, and governance services.
///
/// This binary is a manual-operation and diagnostic surface; the hook
/// binaries under `src/bin/` are the actual integration points invoked by
/// the host runtime.
#[derive(Parser, Debug)]
#[command(name = "govcore", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Argument surface for the hook binaries: the same global overrides, no
/// subcommand — hooks are invoked with a fixed stdin contract, not a verb.
#[derive(Parser, Debug)]
pub struct HookCli {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest standards documents into the memory graph
    MemoryIngest {
        /// Directory of markdown documents
        folder: String,
        /// Protection tier to stamp on every ingested entity
        #[arg(long, default_value = "quality")]
        tier: String,
    },
    /// Search the memory graph
    MemorySearch {
        query: String,
    },
    /// Run all quality gates against a path
    QualityCheckAll {
        path: String,
        #[arg(long, default_value = "rust")]
        language: String,
    },
    /// Show the governance status of an implementation task
    GovernanceStatus {
        task_id: String,
    },
    /// List pending, unblocked tasks
    TaskListPending,
}
