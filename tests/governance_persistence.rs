//! Governance state must survive a process restart: the store is sqlite on
//! disk and the task registry is JSON files on disk, so a fresh set of
//! service instances opened against the same paths should see everything the
//! previous instance wrote — unlike the unit tests in `governance/service.rs`,
//! which reuse one long-lived in-memory store for the whole test.

use govcore::governance::{GovernanceService, GovernanceStore};
use govcore::memory::MemoryService;
use govcore::reviewer::{ReviewerDriver, Verdict};
use govcore::tasks::TaskRegistry;

const NOW: &str = "2026-01-01T00:00:00Z";
const LATER: &str = "2026-01-01T01:00:00Z";

fn open_service(root: &std::path::Path) -> GovernanceService {
    let store = GovernanceStore::open(root.join("governance.sqlite")).unwrap();
    let tasks = TaskRegistry::new(root.join("tasks")).unwrap();
    let memory = MemoryService::open(root.join("memory.jsonl")).unwrap();
    let reviewer = ReviewerDriver::new("reviewer", root.join("memory.jsonl"), true);
    GovernanceService::new(store, tasks, memory, reviewer)
}

#[test]
fn governed_pair_status_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let svc = open_service(dir.path());
        svc.create_governed_task(
            "review-1",
            "impl-1",
            "Add OAuth support",
            "wire up the OAuth flow",
            "ctx",
            "decision",
            NOW,
        )
        .unwrap();
    }

    // Fresh instances, same paths: simulates the next hook invocation.
    let svc = open_service(dir.path());
    let status = svc.get_task_review_status("impl-1").unwrap();
    assert!(status.is_blocked);
    assert!(!status.can_execute);
    assert_eq!(status.reviews.len(), 1);

    let governed = svc.get_governance_status("impl-1").unwrap().unwrap();
    assert_eq!(governed.current_status, "pending_review");
}

#[test]
fn review_completion_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let svc = open_service(dir.path());
        svc.create_governed_task("review-1", "impl-1", "Add OAuth support", "desc", "ctx", "decision", NOW)
            .unwrap();
        svc.complete_task_review("review-1", "impl-1", Verdict::Approved, None, &[], &[], LATER)
            .unwrap();
    }

    let svc = open_service(dir.path());
    let status = svc.get_task_review_status("impl-1").unwrap();
    assert!(status.can_execute);
    assert_eq!(status.reviews[0].status, "complete");
    assert_eq!(status.reviews[0].verdict.as_deref(), Some("approved"));

    let governed = svc.get_governance_status("impl-1").unwrap().unwrap();
    assert_eq!(governed.current_status, "approved");
}

#[test]
fn add_review_blocker_on_preexisting_task_persists() {
    let dir = tempfile::tempdir().unwrap();

    {
        // Simulate the host runtime minting the implementation task first.
        let tasks = TaskRegistry::new(dir.path().join("tasks")).unwrap();
        tasks.create_task("impl-2", "Refactor the parser", "desc", vec![], NOW).unwrap();
    }

    {
        let svc = open_service(dir.path());
        svc.add_review_blocker("impl-2", "gov-review-impl-2", "governance", "session_id=s1", NOW)
            .unwrap();
    }

    let svc = open_service(dir.path());
    let status = svc.get_task_review_status("impl-2").unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.blockers_from_files, vec!["gov-review-impl-2".to_string()]);
    assert_eq!(status.reviews.len(), 1);
}

#[test]
fn orphan_pair_is_tombstoned_not_silently_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let svc = open_service(dir.path());

    // No implementation task exists at all, so add_blocker inside
    // add_review_blocker must fail and the review task must be tombstoned
    // rather than left in a live, unexplained state.
    let err = svc
        .add_review_blocker("missing-impl", "gov-review-missing", "governance", "ctx", NOW)
        .unwrap_err();
    assert!(matches!(err, govcore::error::Error::OrphanPair(_)));

    let tasks = TaskRegistry::new(dir.path().join("tasks")).unwrap();
    let review_task = tasks.read_task("gov-review-missing").unwrap().unwrap();
    assert_eq!(review_task.status, govcore::tasks::TaskStatus::Error);
}
