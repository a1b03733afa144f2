use clap::Parser;
use tracing::info;

use govcore::cli::{Cli, Command};
use govcore::config::Config;
use govcore::memory::{MemoryService, Tier};
use govcore::quality::QualityService;
use govcore::tasks::TaskRegistry;
use govcore::trust::TrustEngine;

fn main() {
    govcore::init_logging();
    let cli = Cli::parse();

    let config = match Config::load(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(task_list_id = %config.task_list_id, "govcore admin CLI starting");

    if let Err(e) = run(&config, cli.command) {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
}

fn run(config: &Config, command: Command) -> govcore::error::Result<()> {
    match command {
        Command::MemoryIngest { folder, tier } => {
            let tier = Tier::parse(&tier).unwrap_or(Tier::Untiered);
            let memory = MemoryService::open(&config.memory_path)?;
            let report = memory.ingest_documents(std::path::Path::new(&folder), tier)?;
            println!(
                "ingested {} entities: {}",
                report.ingested,
                report.entities.join(", ")
            );
            if !report.errors.is_empty() {
                eprintln!("{} documents skipped with errors", report.errors.len());
            }
        }
        Command::MemorySearch { query } => {
            let memory = MemoryService::open(&config.memory_path)?;
            for entity in memory.search_nodes(&query) {
                println!("{} [{:?}]", entity.name, entity.entity_type);
            }
        }
        Command::QualityCheckAll { path, language } => {
            let trust = TrustEngine::open(&config.trust_db_path)?;
            let quality = QualityService::new(config.project_config.clone(), trust);
            let report = tokio_run(quality.check_all_gates(&language, std::path::Path::new(&path)));
            println!("build:    {}", report.build.detail);
            println!("lint:     {}", report.lint.detail);
            println!("tests:    {}", report.tests.detail);
            println!("coverage: {}", report.coverage.detail);
            println!("findings: {}", report.findings.detail);
            if !report.all_passed {
                std::process::exit(1);
            }
        }
        Command::GovernanceStatus { task_id } => {
            use rusqlite::Connection;
            let conn = Connection::open(&config.governance_db_path)?;
            let status: Option<String> = conn
                .query_row(
                    "SELECT current_status FROM governed_tasks WHERE implementation_task_id = ?1",
                    [&task_id],
                    |r| r.get(0),
                )
                .ok();
            match status {
                Some(s) => println!("{task_id}: {s}"),
                None => println!("{task_id}: not a governed task"),
            }
        }
        Command::TaskListPending => {
            let registry = TaskRegistry::new(&config.task_dir)?;
            for task in registry.get_pending_unblocked_tasks()? {
                println!("{} — {}", task.id, task.subject);
            }
        }
    }
    Ok(())
}

fn tokio_run<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(fut)
}
