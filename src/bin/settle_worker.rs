//! Settle-check worker (C10). Spawned detached by the interception hook for
//! one agent session; debounces a burst of task creations and, on
//! quiescence, runs a collective ("holistic") review across the session's
//! tasks. See [4.10].

use std::collections::HashMap;

use clap::Parser;
use tracing::{info, warn};

use govcore::cli::HookCli;
use govcore::config::Config;
use govcore::governance::GovernanceStore;
use govcore::hooks::flag::{self, FlagStatus};
use govcore::reviewer::{ReviewMode, ReviewerDriver, Verdict};
use govcore::tasks::TaskRegistry;

fn main() {
    govcore::init_logging();

    let session_id = match std::env::args().nth(1) {
        Some(s) => s,
        None => {
            eprintln!("error: settle_worker requires a session id argument");
            std::process::exit(2);
        }
    };

    let cli = HookCli::parse_from(["settle_worker"]);
    let config = match Config::load(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    if let Err(e) = rt.block_on(run(&config, &session_id)) {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
}

async fn run(config: &Config, session_id: &str) -> govcore::error::Result<()> {
    let store = GovernanceStore::open(&config.governance_db_path)?;

    let anchor_count = store.task_reviews_for_session(session_id)?.len();
    tokio::time::sleep(std::time::Duration::from_millis(config.settle_interval_ms)).await;

    let reviews = store.task_reviews_for_session(session_id)?;
    if reviews.len() != anchor_count {
        info!(session_id, "a newer settle-check worker supersedes this one, exiting");
        return Ok(());
    }

    if reviews.len() < config.min_tasks_for_review as usize {
        info!(session_id, count = reviews.len(), "below threshold, clearing flag without holistic review");
        flag::clear_flag(&flag::flag_path(&config.task_dir, session_id))?;
        return Ok(());
    }

    let tasks = TaskRegistry::new(&config.task_dir)?;
    let mut subjects = Vec::new();
    let mut contexts = Vec::new();
    for review in &reviews {
        if let Some(task) = tasks.read_task(&review.implementation_task_id)? {
            subjects.push(task.subject);
        }
        contexts.push(review.context.clone());
    }

    let mut vars = HashMap::new();
    vars.insert("task_id".to_string(), format!("session:{session_id}"));
    vars.insert("plan".to_string(), subjects.join("\n"));
    vars.insert("prior_decisions".to_string(), contexts.join("\n"));
    vars.insert("prior_verdicts".to_string(), String::new());

    let reviewer = ReviewerDriver::new(&config.reviewer_binary, &config.memory_path, config.mock_review);
    let output = reviewer.review(ReviewMode::Plan, vars).await?;

    match output.verdict {
        Verdict::Approved => {
            flag::clear_flag(&flag::flag_path(&config.task_dir, session_id))?;
            info!(session_id, "holistic review approved, flag cleared");
        }
        Verdict::Blocked => {
            flag::write_flag(
                &config.task_dir,
                session_id,
                FlagStatus::Revise,
                output.guidance.as_deref().unwrap_or("holistic review requested changes"),
            )?;
            warn!(session_id, "holistic review blocked");
        }
        Verdict::NeedsHumanReview => {
            flag::write_flag(
                &config.task_dir,
                session_id,
                FlagStatus::Error,
                output.guidance.as_deref().unwrap_or("holistic review needs human attention"),
            )?;
            warn!(session_id, "holistic review escalated to human");
        }
    }
    Ok(())
}

