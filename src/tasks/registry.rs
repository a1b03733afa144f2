use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::lockfile;

use super::deps::parse_inline_dependencies;
use super::file::{Task, TaskStatus};

/// On-disk authoritative task store: one JSON file per task under
/// `task_dir`, with a sidecar `.lock` file per task id serializing mutating
/// operations across OS processes (hooks run as separate processes).
pub struct TaskRegistry {
    task_dir: PathBuf,
}

impl TaskRegistry {
    pub fn new(task_dir: impl Into<PathBuf>) -> Result<Self> {
        let task_dir = task_dir.into();
        std::fs::create_dir_all(&task_dir)?;
        Ok(Self { task_dir })
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.task_dir.join(format!("{id}.json"))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.task_dir.join(format!("{id}.lock"))
    }

    fn load(&self, id: &str) -> Result<Option<Task>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        // Reads are lock-free and tolerate an in-progress write via a short
        // best-effort retry, rather than failing on a transient partial read.
        for attempt in 0..3 {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<Task>(&content) {
                    Ok(task) => return Ok(Some(task)),
                    Err(e) if attempt < 2 => {
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        continue;
                    }
                    Err(e) => return Err(Error::ParseFailure(format!("task {id}: {e}"))),
                },
                Err(e) => return Err(Error::Io(e)),
            }
        }
        unreachable!()
    }

    fn save(&self, task: &Task) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(task)?;
        lockfile::atomic_write(&self.task_path(&task.id), &bytes)
    }

    pub fn read_task(&self, id: &str) -> Result<Option<Task>> {
        self.load(id)
    }

    /// Create a task. When the caller passes no explicit `blocked_by`, the
    /// description is scanned for inline dependency conventions (`blocked by
    /// #id`, `depends on #id`, `blockedBy: [...]`) via
    /// `super::deps::parse_inline_dependencies` so free-text authoring still
    /// produces a real blocker edge.
    pub fn create_task(
        &self,
        id: &str,
        subject: &str,
        description: &str,
        blocked_by: Vec<String>,
        now: &str,
    ) -> Result<Task> {
        let blocked_by = if blocked_by.is_empty() {
            parse_inline_dependencies(description)
        } else {
            blocked_by
        };
        lockfile::with_exclusive_lock(&self.lock_path(id), || {
            if self.task_path(id).exists() {
                return Err(Error::ConfigValidation(format!("task {id} already exists")));
            }
            let mut task = Task::new(id, subject, now);
            task.description = description.to_string();
            task.blocked_by = blocked_by.clone();
            if !task.blocked_by.is_empty() {
                task.status = TaskStatus::Blocked;
            }
            self.save(&task)?;
            Ok(task)
        })
    }

    /// Load-modify-save a task under its exclusive lock, mirroring the
    /// flock-guarded critical section the graph store and the reference
    /// state manager both use for mutation.
    pub fn update_task(
        &self,
        id: &str,
        f: impl FnOnce(&mut Task),
        now: &str,
    ) -> Result<Task> {
        lockfile::with_exclusive_lock(&self.lock_path(id), || {
            let mut task = self
                .load(id)?
                .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
            f(&mut task);
            task.updated_at = now.to_string();
            self.save(&task)?;
            Ok(task)
        })
    }

    pub fn add_blocker(&self, id: &str, blocker_id: &str, now: &str) -> Result<Task> {
        self.update_task(
            id,
            |task| {
                if !task.blocked_by.contains(&blocker_id.to_string()) {
                    task.blocked_by.push(blocker_id.to_string());
                }
                task.status = TaskStatus::Blocked;
            },
            now,
        )
    }

    /// Remove a blocker. If `blockedBy` becomes empty the task transitions
    /// from Blocked back to Pending — but never overrides a status the
    /// caller has already advanced past Blocked (e.g. InProgress).
    pub fn remove_blocker(&self, id: &str, blocker_id: &str, now: &str) -> Result<Task> {
        self.update_task(
            id,
            |task| {
                task.blocked_by.retain(|b| b != blocker_id);
                if task.blocked_by.is_empty() && task.status == TaskStatus::Blocked {
                    task.status = TaskStatus::Pending;
                }
            },
            now,
        )
    }

    pub fn complete_task(&self, id: &str, now: &str) -> Result<Task> {
        self.update_task(
            id,
            |task| {
                task.status = TaskStatus::Completed;
            },
            now,
        )
    }

    pub fn claim_task(&self, id: &str, owner: &str, now: &str) -> Result<Task> {
        self.update_task(
            id,
            |task| {
                task.owner = Some(owner.to_string());
                if task.blocked_by.is_empty() {
                    task.status = TaskStatus::InProgress;
                }
            },
            now,
        )
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        if !self.task_dir.exists() {
            return Ok(tasks);
        }
        for entry in std::fs::read_dir(&self.task_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(stem) {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(e) => warn!("skipping unreadable task file {}: {e}", path.display()),
            }
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// [4.5]'s eligibility filter: pending, no open blockers, unclaimed.
    pub fn get_pending_unblocked_tasks(&self) -> Result<Vec<Task>> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|t| {
                t.status == TaskStatus::Pending && t.is_unblocked() && t.owner.is_none()
            })
            .collect())
    }

    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    /// Discover a just-created task by subject when the caller (the host
    /// runtime) does not hand back the new task's id. Candidates are tasks
    /// matching `subject` exactly with an empty `blockedBy`; ties are broken
    /// by `(createdAt, id)` descending so a monotonic id suffix minted at
    /// creation time disambiguates identical-subject, identical-timestamp
    /// races deterministically rather than guessing from subject text alone.
    pub fn find_latest_unblocked_by_subject(&self, subject: &str) -> Result<Option<Task>> {
        let mut candidates: Vec<Task> = self
            .list_tasks()?
            .into_iter()
            .filter(|t| t.subject == subject && t.blocked_by.is_empty())
            .collect();
        candidates.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));
        Ok(candidates.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, TaskRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let reg = TaskRegistry::new(dir.path().join("tasks")).unwrap();
        (dir, reg)
    }

    const NOW: &str = "2026-01-01T00:00:00Z";

    #[test]
    fn test_create_and_read_task() {
        let (_d, reg) = registry();
        reg.create_task("t1", "Implement X", "desc", vec![], NOW).unwrap();
        let task = reg.read_task("t1").unwrap().unwrap();
        assert_eq!(task.subject, "Implement X");
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_create_task_auto_populates_blocked_by_from_description() {
        let (_d, reg) = registry();
        reg.create_task("t5", "Existing task", "", vec![], NOW).unwrap();
        let task = reg
            .create_task("t6", "New task", "blocked by #t5", vec![], NOW)
            .unwrap();
        assert_eq!(task.blocked_by, vec!["t5".to_string()]);
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[test]
    fn test_create_task_explicit_blocked_by_skips_inline_parsing() {
        let (_d, reg) = registry();
        let task = reg
            .create_task("t7", "New task", "blocked by #ignored", vec!["t1".to_string()], NOW)
            .unwrap();
        assert_eq!(task.blocked_by, vec!["t1".to_string()]);
    }

    #[test]
    fn test_create_with_blockers_is_blocked_from_birth() {
        let (_d, reg) = registry();
        reg.create_task("review-1", "Review", "", vec![], NOW).unwrap();
        reg.create_task("impl-1", "Implement", "", vec!["review-1".to_string()], NOW)
            .unwrap();
        let task = reg.read_task("impl-1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[test]
    fn test_remove_last_blocker_unblocks() {
        let (_d, reg) = registry();
        reg.create_task("review-1", "Review", "", vec![], NOW).unwrap();
        reg.create_task("impl-1", "Implement", "", vec!["review-1".to_string()], NOW)
            .unwrap();
        let task = reg.remove_blocker("impl-1", "review-1", NOW).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.blocked_by.is_empty());
    }

    #[test]
    fn test_partial_blocker_removal_stays_blocked() {
        let (_d, reg) = registry();
        reg.create_task(
            "impl-1",
            "Implement",
            "",
            vec!["a".to_string(), "b".to_string()],
            NOW,
        )
        .unwrap();
        let task = reg.remove_blocker("impl-1", "a", NOW).unwrap();
        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.blocked_by, vec!["b".to_string()]);
    }

    #[test]
    fn test_get_pending_unblocked_tasks() {
        let (_d, reg) = registry();
        reg.create_task("a", "A", "", vec![], NOW).unwrap();
        reg.create_task("b", "B", "", vec!["a".to_string()], NOW).unwrap();
        let pending = reg.get_pending_unblocked_tasks().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a");
    }

    #[test]
    fn test_claimed_task_excluded_from_pending() {
        let (_d, reg) = registry();
        reg.create_task("a", "A", "", vec![], NOW).unwrap();
        reg.claim_task("a", "agent-1", NOW).unwrap();
        let pending = reg.get_pending_unblocked_tasks().unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_concurrent_blocker_additions_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let reg = std::sync::Arc::new(TaskRegistry::new(dir.path().join("tasks")).unwrap());
        reg.create_task("impl-1", "Implement", "", vec![], NOW).unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let reg = std::sync::Arc::clone(&reg);
            handles.push(std::thread::spawn(move || {
                reg.add_blocker("impl-1", &format!("review-{i}"), NOW).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let task = reg.read_task("impl-1").unwrap().unwrap();
        assert_eq!(task.blocked_by.len(), 10);
    }

    #[test]
    fn test_create_duplicate_task_errors() {
        let (_d, reg) = registry();
        reg.create_task("a", "A", "", vec![], NOW).unwrap();
        let err = reg.create_task("a", "A again", "", vec![], NOW).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_update_missing_task_errors() {
        let (_d, reg) = registry();
        let err = reg.update_task("ghost", |_| {}, NOW).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
