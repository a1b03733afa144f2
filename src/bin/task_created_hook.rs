//! Interception hook (C8). A short-lived process the host runtime invokes
//! synchronously on a `task-created` event, stdin -> stdout, exit code only.
//! See [4.8]: pair the new task with a governance review blocker before it
//! can run, then kick off the settle-check worker for a possible holistic
//! (cross-task) review.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info, warn};

use govcore::cli::HookCli;
use govcore::config::Config;
use govcore::governance::GovernanceService;
use govcore::hooks::{has_reserved_prefix, HookEnvelope};
use govcore::memory::MemoryService;
use govcore::reviewer::ReviewerDriver;
use govcore::tasks::TaskRegistry;

fn now_rfc3339_ish() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("unix:{secs}")
}

fn main() {
    govcore::init_logging();

    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        eprintln!("error: failed to read stdin envelope");
        std::process::exit(2);
    }

    let envelope = match HookEnvelope::parse(&raw) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let Some(subject) = envelope.subject().map(str::to_string) else {
        println!("{{\"context\":\"no subject on tool_input, skipping interception\"}}");
        return;
    };

    if has_reserved_prefix(&subject) {
        println!("{{\"context\":\"reserved-prefix subject, skipping self-pairing\"}}");
        return;
    }

    let cli = HookCli::parse_from(["task_created_hook"]);
    let config = match Config::load(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config, &envelope.session_id, &subject) {
        error!("interception hook failed: {e}");
        eprintln!("error: {e}");
        std::process::exit(2);
    }
}

fn run(config: &Config, session_id: &str, subject: &str) -> govcore::error::Result<()> {
    let now = now_rfc3339_ish();

    let tasks = TaskRegistry::new(&config.task_dir)?;
    let Some(task) = tasks.find_latest_unblocked_by_subject(subject)? else {
        warn!(subject, "could not discover newly created task id");
        return Err(govcore::error::Error::NotFound(format!(
            "no unblocked task found matching subject '{subject}'"
        )));
    };
    let impl_task_id = task.id.clone();

    let store = govcore::governance::GovernanceStore::open(&config.governance_db_path)?;
    let gov_tasks = TaskRegistry::new(&config.task_dir)?;
    let memory = MemoryService::open(&config.memory_path)?;
    let reviewer = ReviewerDriver::new(&config.reviewer_binary, &config.memory_path, config.mock_review);
    let governance = GovernanceService::new(store, gov_tasks, memory, reviewer);

    let review_task_id = format!("gov-review-{impl_task_id}");
    let context = format!("session_id={session_id}");

    governance.add_review_blocker(&impl_task_id, &review_task_id, "governance", &context, &now)?;

    govcore::hooks::flag::write_flag(
        &config.task_dir,
        session_id,
        govcore::hooks::FlagStatus::Pending,
        "Holistic review in progress, please wait",
    )?;

    spawn_settle_worker(config, session_id);

    info!(impl_task_id, review_task_id, "created governance review pair");
    println!(
        "{{\"context\":\"paired task {impl_task_id} with review {review_task_id}\"}}"
    );
    Ok(())
}

/// Fork the settle-check worker (C10) detached from this process's
/// lifetime: own process group on Unix, stdio not inherited, not waited on.
fn spawn_settle_worker(config: &Config, session_id: &str) {
    let exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("settle_worker")))
        .unwrap_or_else(|| "settle_worker".into());

    let mut cmd = std::process::Command::new(exe);
    cmd.arg(session_id)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .env("TASK_LIST_ID", &config.task_list_id)
        .env("SETTLE_INTERVAL_MS", config.settle_interval_ms.to_string())
        .env("MIN_TASKS_FOR_REVIEW", config.min_tasks_for_review.to_string())
        .current_dir(&config.root_dir);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    match cmd.spawn() {
        Ok(_child) => {}
        Err(e) => warn!("failed to detach settle-check worker: {e}"),
    }
}
