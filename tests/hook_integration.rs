//! Black-box tests against the compiled hook binaries (C8, C9, C10), driving
//! them the way the host runtime does: stdin in, exit code and stdout out.

use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;

fn write_task_file(dir: &std::path::Path, id: &str, subject: &str, blocked_by: &[&str]) {
    let tasks_dir = dir.join(".governance/tasks");
    std::fs::create_dir_all(&tasks_dir).unwrap();
    let blocked_by_json: Vec<String> = blocked_by.iter().map(|s| s.to_string()).collect();
    let status = if blocked_by_json.is_empty() { "pending" } else { "blocked" };
    let body = serde_json::json!({
        "id": id,
        "subject": subject,
        "description": "",
        "status": status,
        "owner": null,
        "blockedBy": blocked_by_json,
        "blocks": [],
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
    });
    std::fs::write(tasks_dir.join(format!("{id}.json")), serde_json::to_vec_pretty(&body).unwrap())
        .unwrap();
}

fn read_task_file(dir: &std::path::Path, id: &str) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.join(".governance/tasks").join(format!("{id}.json"))).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn interception_hook_pairs_new_task_with_review_blocker() {
    let dir = tempfile::tempdir().unwrap();
    write_task_file(dir.path(), "impl-1", "Add login button", &[]);

    let stdin = serde_json::json!({
        "tool_name": "create_task",
        "tool_input": {"subject": "Add login button"},
        "session_id": "sess-1",
    })
    .to_string();

    let mut cmd = Command::cargo_bin("task_created_hook").unwrap();
    cmd.current_dir(dir.path())
        .env("MOCK_REVIEW", "1")
        .env("SETTLE_INTERVAL_MS", "30")
        .env("MIN_TASKS_FOR_REVIEW", "1")
        .write_stdin(stdin);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("paired task impl-1 with review gov-review-impl-1"));

    let impl_task = read_task_file(dir.path(), "impl-1");
    assert_eq!(
        impl_task["blockedBy"].as_array().unwrap(),
        &vec![serde_json::json!("gov-review-impl-1")]
    );
    assert_eq!(impl_task["status"], "blocked");

    let review_task = read_task_file(dir.path(), "gov-review-impl-1");
    assert!(review_task["subject"].as_str().unwrap().starts_with("[GOVERNANCE] Review:"));

    let flag_path = dir
        .path()
        .join(".governance/tasks/.holistic-review-pending-sess-1");
    // Flag is written synchronously by the hook before it returns.
    assert!(flag_path.exists());
}

#[test]
fn interception_hook_skips_reserved_prefix_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let stdin = serde_json::json!({
        "tool_name": "create_task",
        "tool_input": {"subject": "[GOVERNANCE] Review: something"},
        "session_id": "sess-1",
    })
    .to_string();

    let mut cmd = Command::cargo_bin("task_created_hook").unwrap();
    cmd.current_dir(dir.path()).write_stdin(stdin);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("reserved-prefix subject"));

    // No tasks directory should have been touched at all.
    assert!(!dir.path().join(".governance/tasks").exists());
}

#[test]
fn interception_hook_errors_when_task_cannot_be_discovered() {
    let dir = tempfile::tempdir().unwrap();
    let stdin = serde_json::json!({
        "tool_name": "create_task",
        "tool_input": {"subject": "Never actually created"},
        "session_id": "sess-1",
    })
    .to_string();

    let mut cmd = Command::cargo_bin("task_created_hook").unwrap();
    cmd.current_dir(dir.path()).write_stdin(stdin);

    cmd.assert().code(2).stderr(predicate::str::contains("no unblocked task found"));
}

#[test]
fn interception_hook_rejects_malformed_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("task_created_hook").unwrap();
    cmd.current_dir(dir.path()).write_stdin("not json at all");
    cmd.assert().code(2);
}

#[test]
fn work_gate_hook_passes_with_no_flags() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("work_gate_hook")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .success();
}

#[test]
fn work_gate_hook_blocks_on_pending_flag() {
    let dir = tempfile::tempdir().unwrap();
    let task_dir = dir.path().join(".governance/tasks");
    govcore::hooks::flag::write_flag(
        &task_dir,
        "sess-1",
        govcore::hooks::FlagStatus::Pending,
        "Holistic review in progress, please wait",
    )
    .unwrap();

    Command::cargo_bin("work_gate_hook")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\":\"pending\""));
}

#[test]
fn work_gate_hook_surfaces_revise_guidance() {
    let dir = tempfile::tempdir().unwrap();
    let task_dir = dir.path().join(".governance/tasks");
    govcore::hooks::flag::write_flag(
        &task_dir,
        "sess-1",
        govcore::hooks::FlagStatus::Revise,
        "please split this into two tasks",
    )
    .unwrap();

    Command::cargo_bin("work_gate_hook")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\":\"revise\""))
        .stdout(predicate::str::contains("please split this into two tasks"));
}

#[test]
fn work_gate_hook_clears_stale_flags_and_passes() {
    let dir = tempfile::tempdir().unwrap();
    let task_dir = dir.path().join(".governance/tasks");
    govcore::hooks::flag::write_flag(&task_dir, "sess-1", govcore::hooks::FlagStatus::Pending, "stale")
        .unwrap();

    // A staleness bound of 0ms means any positive age is stale.
    Command::cargo_bin("work_gate_hook")
        .unwrap()
        .current_dir(dir.path())
        .env("REVIEW_FLAG_STALENESS_MS", "0")
        .assert()
        .success();

    let flag_path = govcore::hooks::flag::flag_path(&task_dir, "sess-1");
    assert!(!flag_path.exists());
}

#[test]
fn settle_worker_clears_flag_on_mock_approval() {
    let dir = tempfile::tempdir().unwrap();
    let task_dir = dir.path().join(".governance/tasks");
    std::fs::create_dir_all(&task_dir).unwrap();

    write_task_file(dir.path(), "impl-2", "Do the thing", &[]);

    let db_path = dir.path().join(".governance/governance.sqlite");
    std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
    {
        let store = govcore::governance::GovernanceStore::open(&db_path).unwrap();
        store
            .insert_task_review("gov-review-impl-2", "impl-2", "governance", "session_id=sess-2", "reviewer", "2026-01-01")
            .unwrap();
    }
    govcore::hooks::flag::write_flag(
        &task_dir,
        "sess-2",
        govcore::hooks::FlagStatus::Pending,
        "Holistic review in progress, please wait",
    )
    .unwrap();

    Command::cargo_bin("settle_worker")
        .unwrap()
        .current_dir(dir.path())
        .arg("sess-2")
        .env("SETTLE_INTERVAL_MS", "10")
        .env("MIN_TASKS_FOR_REVIEW", "1")
        .env("MOCK_REVIEW", "1")
        .assert()
        .success();

    let flag_path = govcore::hooks::flag::flag_path(&task_dir, "sess-2");
    assert!(!flag_path.exists());
}

#[test]
fn settle_worker_below_threshold_clears_flag() {
    let dir = tempfile::tempdir().unwrap();
    let task_dir = dir.path().join(".governance/tasks");
    std::fs::create_dir_all(&task_dir).unwrap();

    let db_path = dir.path().join(".governance/governance.sqlite");
    std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
    {
        let store = govcore::governance::GovernanceStore::open(&db_path).unwrap();
        store
            .insert_task_review("gov-review-impl-3", "impl-3", "governance", "session_id=sess-3", "reviewer", "2026-01-01")
            .unwrap();
    }
    govcore::hooks::flag::write_flag(
        &task_dir,
        "sess-3",
        govcore::hooks::FlagStatus::Pending,
        "Holistic review in progress, please wait",
    )
    .unwrap();

    Command::cargo_bin("settle_worker")
        .unwrap()
        .current_dir(dir.path())
        .arg("sess-3")
        .env("SETTLE_INTERVAL_MS", "10")
        .env("MIN_TASKS_FOR_REVIEW", "5")
        .env("MOCK_REVIEW", "1")
        .assert()
        .success();

    let flag_path = govcore::hooks::flag::flag_path(&task_dir, "sess-3");
    assert!(!flag_path.exists());
}

#[test]
fn settle_worker_requires_session_id_argument() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("settle_worker")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("requires a session id"));
}

/// End-to-end: the interception hook detaches a settle worker that runs to
/// completion on its own; poll for the flag to clear rather than assuming a
/// fixed sleep covers the child's startup latency.
#[test]
fn interception_hook_detached_worker_eventually_clears_flag() {
    let dir = tempfile::tempdir().unwrap();
    write_task_file(dir.path(), "impl-4", "Wire up settings page", &[]);

    let stdin = serde_json::json!({
        "tool_name": "create_task",
        "tool_input": {"subject": "Wire up settings page"},
        "session_id": "sess-4",
    })
    .to_string();

    let mut cmd = Command::cargo_bin("task_created_hook").unwrap();
    cmd.current_dir(dir.path())
        .env("MOCK_REVIEW", "1")
        .env("SETTLE_INTERVAL_MS", "20")
        .env("MIN_TASKS_FOR_REVIEW", "1")
        .write_stdin(stdin);
    cmd.assert().success();

    let flag_path = dir
        .path()
        .join(".governance/tasks/.holistic-review-pending-sess-4");
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if !flag_path.exists() {
            break;
        }
        if Instant::now() > deadline {
            panic!("settle worker never cleared the holistic review flag");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
