use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::memory::{CallerRole, Entity, EntityType, MemoryService};
use crate::reviewer::{ReviewMode, ReviewOutput, ReviewerDriver, Verdict};
use crate::tasks::{Task, TaskRegistry};

use super::store::GovernanceStore;

const AUTO_ESCALATE_CATEGORIES: &[&str] = &["deviation", "scope_change"];

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReviewStatus {
    pub status: String,
    pub is_blocked: bool,
    pub can_execute: bool,
    pub reviews: Vec<super::store::TaskReviewRow>,
    pub blockers_from_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GovernedPairResult {
    pub review_task_id: String,
    pub implementation_task_id: String,
    pub status: String,
}

fn verdict_str(v: Verdict) -> &'static str {
    match v {
        Verdict::Approved => "approved",
        Verdict::Blocked => "blocked",
        Verdict::NeedsHumanReview => "needs_human_review",
    }
}

fn to_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Orchestrates decisions, plan/completion reviews, and the governed task
/// pair lifecycle described in [4.7], wiring the task registry, the
/// relational governance store, the memory graph, and the reviewer driver
/// together.
pub struct GovernanceService {
    store: GovernanceStore,
    tasks: TaskRegistry,
    memory: MemoryService,
    reviewer: ReviewerDriver,
}

impl GovernanceService {
    pub fn new(
        store: GovernanceStore,
        tasks: TaskRegistry,
        memory: MemoryService,
        reviewer: ReviewerDriver,
    ) -> Self {
        Self {
            store,
            tasks,
            memory,
            reviewer,
        }
    }

    pub async fn submit_decision(
        &self,
        task_id: &str,
        agent: &str,
        category: &str,
        summary: &str,
        detail: &str,
        components_affected: &[String],
        alternatives_considered: &[String],
        confidence: &str,
        now: &str,
    ) -> Result<ReviewOutput> {
        let decision = self.store.insert_decision(
            task_id,
            agent,
            category,
            summary,
            detail,
            &to_json(components_affected),
            &to_json(alternatives_considered),
            confidence,
            now,
        )?;

        if AUTO_ESCALATE_CATEGORIES.contains(&category) {
            let output = ReviewOutput::needs_human_review(format!(
                "category '{category}' always requires human review"
            ));
            self.store.insert_review(
                Some(decision.id),
                None,
                verdict_str(output.verdict),
                "[]",
                output.guidance.as_deref(),
                "[]",
                "none",
                now,
            )?;
            return Ok(output);
        }

        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), task_id.to_string());
        vars.insert("category".to_string(), category.to_string());
        vars.insert("summary".to_string(), summary.to_string());
        vars.insert("detail".to_string(), detail.to_string());
        vars.insert("components_affected".to_string(), to_json(components_affected));
        vars.insert("alternatives_considered".to_string(), to_json(alternatives_considered));
        vars.insert("confidence".to_string(), confidence.to_string());

        let output = self.reviewer.review(ReviewMode::Decision, vars).await?;
        self.store.insert_review(
            Some(decision.id),
            None,
            verdict_str(output.verdict),
            &to_json(&output.findings),
            output.guidance.as_deref(),
            &to_json(&output.standards_verified),
            "reviewer",
            now,
        )?;

        let mut entity = Entity::new(
            format!("decision:{task_id}:{}", decision.sequence),
            EntityType::SolutionPattern,
        );
        entity.observations.push("protection_tier: quality".to_string());
        entity.observations.push(format!("summary: {summary}"));
        entity
            .observations
            .push(format!("verdict: {}", verdict_str(output.verdict)));
        self.memory.create_entities(vec![entity])?;

        Ok(output)
    }

    pub async fn submit_plan_for_review(
        &self,
        task_id: &str,
        agent: &str,
        plan: &str,
        now: &str,
    ) -> Result<ReviewOutput> {
        let plan_record = self.store.insert_decision(
            task_id, agent, "plan", "plan submitted for review", plan, "[]", "[]", "n/a", now,
        )?;

        let prior_decisions = self.store.decisions_for_task(task_id)?;
        let mut prior_verdicts = Vec::new();
        for d in &prior_decisions {
            for review in self.store.reviews_for_decision(d.id)? {
                prior_verdicts.push(format!("{}: {}", d.summary, review.verdict));
            }
        }

        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), task_id.to_string());
        vars.insert("plan".to_string(), plan.to_string());
        vars.insert(
            "prior_decisions".to_string(),
            prior_decisions.iter().map(|d| d.summary.clone()).collect::<Vec<_>>().join("\n"),
        );
        vars.insert("prior_verdicts".to_string(), prior_verdicts.join("\n"));

        let output = self.reviewer.review(ReviewMode::Plan, vars).await?;
        self.store.insert_review(
            None,
            Some(plan_record.id),
            verdict_str(output.verdict),
            &to_json(&output.findings),
            output.guidance.as_deref(),
            &to_json(&output.standards_verified),
            "reviewer",
            now,
        )?;
        Ok(output)
    }

    /// Completion review automatically blocks per [P11] if any decision for
    /// the task has no verdict, or any verdict is `blocked` with no later
    /// `approved` review for the same decision.
    pub async fn submit_completion_review(
        &self,
        task_id: &str,
        work_summary: &str,
        files_changed: &[String],
        now: &str,
    ) -> Result<ReviewOutput> {
        let decisions = self.store.decisions_for_task(task_id)?;
        for decision in &decisions {
            let reviews = self.store.reviews_for_decision(decision.id)?;
            if reviews.is_empty() {
                return Ok(ReviewOutput {
                    verdict: Verdict::Blocked,
                    guidance: Some(format!(
                        "decision '{}' (sequence {}) has no verdict yet",
                        decision.summary, decision.sequence
                    )),
                    findings: vec![],
                    standards_verified: vec![],
                });
            }
            if let Some(last) = reviews.last() {
                if last.verdict == "blocked" {
                    return Ok(ReviewOutput {
                        verdict: Verdict::Blocked,
                        guidance: Some(format!(
                            "decision '{}' has an unresolved blocked verdict",
                            decision.summary
                        )),
                        findings: vec![],
                        standards_verified: vec![],
                    });
                }
            }
        }

        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), task_id.to_string());
        vars.insert("work_summary".to_string(), work_summary.to_string());
        vars.insert("files_changed".to_string(), files_changed.join("\n"));
        vars.insert(
            "all_decisions".to_string(),
            decisions.iter().map(|d| d.summary.clone()).collect::<Vec<_>>().join("\n"),
        );
        let mut all_verdicts = Vec::new();
        for d in &decisions {
            for r in self.store.reviews_for_decision(d.id)? {
                all_verdicts.push(format!("{}: {}", d.summary, r.verdict));
            }
        }
        vars.insert("all_verdicts".to_string(), all_verdicts.join("\n"));

        let output = self.reviewer.review(ReviewMode::Completion, vars).await?;
        self.store
            .insert_review(None, None, verdict_str(output.verdict), &to_json(&output.findings), output.guidance.as_deref(), &to_json(&output.standards_verified), "reviewer", now)?;
        Ok(output)
    }

    /// Atomically create the governed task pair [4.5]: the review task
    /// first, then the implementation task referencing it. If the second
    /// write fails the orphan review is tombstoned but not deleted.
    pub fn create_governed_task(
        &self,
        review_task_id: &str,
        impl_task_id: &str,
        subject: &str,
        description: &str,
        context: &str,
        review_type: &str,
        now: &str,
    ) -> Result<GovernedPairResult> {
        self.tasks.create_task(
            review_task_id,
            &format!("[GOVERNANCE] Review: {subject}"),
            context,
            vec![],
            now,
        )?;

        match self.tasks.create_task(
            impl_task_id,
            subject,
            description,
            vec![review_task_id.to_string()],
            now,
        ) {
            Ok(_) => {}
            Err(e) => {
                let _ = self.tasks.update_task(
                    review_task_id,
                    |t| t.status = crate::tasks::TaskStatus::Error,
                    now,
                );
                return Err(Error::OrphanPair(format!(
                    "implementation task {impl_task_id} failed to create after review task {review_task_id}: {e}"
                )));
            }
        }

        self.store.insert_governed_task(
            impl_task_id, subject, description, context, "pending_review", now,
        )?;
        self.store
            .insert_task_review(review_task_id, impl_task_id, review_type, context, "pending", now)?;

        Ok(GovernedPairResult {
            review_task_id: review_task_id.to_string(),
            implementation_task_id: impl_task_id.to_string(),
            status: "pending_review".to_string(),
        })
    }

    /// Stack a new review blocker onto an implementation task that already
    /// exists (e.g. minted by the host runtime rather than by this crate),
    /// mirroring [4.8] step 4. If adding the blocker fails after the review
    /// task was created, the review task is tombstoned rather than left as
    /// an unexplained orphan [7].
    pub fn add_review_blocker(
        &self,
        impl_task_id: &str,
        review_task_id: &str,
        review_type: &str,
        context: &str,
        now: &str,
    ) -> Result<()> {
        self.tasks.create_task(
            review_task_id,
            &format!("[GOVERNANCE] Review: {review_type} for {impl_task_id}"),
            context,
            vec![],
            now,
        )?;
        if let Err(e) = self.tasks.add_blocker(impl_task_id, review_task_id, now) {
            let _ = self.tasks.update_task(
                review_task_id,
                |t| t.status = crate::tasks::TaskStatus::Error,
                now,
            );
            return Err(Error::OrphanPair(format!(
                "blocker add on {impl_task_id} failed after review task {review_task_id} was created: {e}"
            )));
        }
        self.store
            .insert_task_review(review_task_id, impl_task_id, review_type, context, "pending", now)?;
        if self.store.governed_task(impl_task_id)?.is_none() {
            self.store
                .insert_governed_task(impl_task_id, "", "", context, "pending_review", now)?;
        }
        Ok(())
    }

    pub fn complete_task_review(
        &self,
        review_task_id: &str,
        impl_task_id: &str,
        verdict: Verdict,
        guidance: Option<&str>,
        findings: &[String],
        standards_verified: &[String],
        now: &str,
    ) -> Result<()> {
        self.store.complete_task_review(
            review_task_id,
            verdict_str(verdict),
            guidance,
            &to_json(findings),
            &to_json(standards_verified),
            now,
        )?;
        self.tasks.complete_task(review_task_id, now)?;

        match verdict {
            Verdict::Approved => {
                let impl_task = self.tasks.remove_blocker(impl_task_id, review_task_id, now)?;
                if impl_task.is_unblocked() {
                    self.store
                        .update_governed_task_status(impl_task_id, "approved", Some(now))?;
                }
            }
            Verdict::Blocked => {
                if let Some(g) = guidance {
                    self.tasks.update_task(
                        impl_task_id,
                        |t| t.description.push_str(&format!("\n\n[REVIEW GUIDANCE] {g}")),
                        now,
                    )?;
                }
                self.store.update_governed_task_status(impl_task_id, "blocked", None)?;
            }
            Verdict::NeedsHumanReview => {
                self.store
                    .update_governed_task_status(impl_task_id, "needs_human_review", None)?;
            }
        }
        Ok(())
    }

    pub fn get_task_review_status(&self, impl_task_id: &str) -> Result<TaskReviewStatus> {
        let task: Task = self
            .tasks
            .read_task(impl_task_id)?
            .ok_or_else(|| Error::NotFound(format!("task {impl_task_id}")))?;
        let reviews = self.store.task_reviews_for_impl(impl_task_id)?;
        Ok(TaskReviewStatus {
            status: format!("{:?}", task.status).to_lowercase(),
            is_blocked: !task.blocked_by.is_empty(),
            can_execute: task.is_unblocked(),
            reviews,
            blockers_from_files: task.blocked_by,
        })
    }

    pub fn get_pending_reviews(&self) -> Result<Vec<super::store::TaskReviewRow>> {
        self.store.pending_task_reviews()
    }

    pub fn get_decision_history(&self, task_id: &str) -> Result<Vec<super::store::DecisionRow>> {
        self.store.decisions_for_task(task_id)
    }

    pub fn get_governance_status(&self, impl_task_id: &str) -> Result<Option<super::store::GovernedTaskRow>> {
        self.store.governed_task(impl_task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, GovernanceService) {
        let dir = tempfile::tempdir().unwrap();
        let store = GovernanceStore::open_in_memory().unwrap();
        let tasks = TaskRegistry::new(dir.path().join("tasks")).unwrap();
        let memory = MemoryService::open(dir.path().join("memory.jsonl")).unwrap();
        let reviewer = ReviewerDriver::new("reviewer", dir.path().join("memory.jsonl"), true);
        (dir, GovernanceService::new(store, tasks, memory, reviewer))
    }

    const NOW: &str = "2026-01-01T00:00:00Z";

    #[tokio::test]
    async fn test_deviation_category_skips_reviewer() {
        let (_d, svc) = service();
        let output = svc
            .submit_decision("t1", "agent", "deviation", "changed approach", "detail", &[], &[], "high", NOW)
            .await
            .unwrap();
        assert_eq!(output.verdict, Verdict::NeedsHumanReview);
    }

    #[tokio::test]
    async fn test_normal_category_mock_approves() {
        let (_d, svc) = service();
        let output = svc
            .submit_decision("t1", "agent", "implementation", "did a thing", "detail", &[], &[], "high", NOW)
            .await
            .unwrap();
        assert_eq!(output.verdict, Verdict::Approved);
    }

    #[tokio::test]
    async fn test_create_governed_task_pair() {
        let (_d, svc) = service();
        let result = svc
            .create_governed_task("review-1", "impl-1", "Add X", "desc", "ctx", "decision", NOW)
            .unwrap();
        assert_eq!(result.status, "pending_review");
        let impl_task = svc.tasks.read_task("impl-1").unwrap().unwrap();
        assert_eq!(impl_task.blocked_by, vec!["review-1".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_task_review_approved_unblocks() {
        let (_d, svc) = service();
        svc.create_governed_task("review-1", "impl-1", "Add X", "desc", "ctx", "decision", NOW)
            .unwrap();
        svc.complete_task_review("review-1", "impl-1", Verdict::Approved, None, &[], &[], NOW)
            .unwrap();
        let impl_task = svc.tasks.read_task("impl-1").unwrap().unwrap();
        assert!(impl_task.is_unblocked());
        let governed = svc.get_governance_status("impl-1").unwrap().unwrap();
        assert_eq!(governed.current_status, "approved");
    }

    #[tokio::test]
    async fn test_complete_task_review_blocked_keeps_blocker() {
        let (_d, svc) = service();
        svc.create_governed_task("review-1", "impl-1", "Add X", "desc", "ctx", "decision", NOW)
            .unwrap();
        svc.complete_task_review(
            "review-1",
            "impl-1",
            Verdict::Blocked,
            Some("fix the thing"),
            &[],
            &[],
            NOW,
        )
        .unwrap();
        let impl_task = svc.tasks.read_task("impl-1").unwrap().unwrap();
        assert!(!impl_task.is_unblocked());
        assert!(impl_task.description.contains("fix the thing"));
    }

    #[tokio::test]
    async fn test_completion_review_blocks_when_decision_has_no_verdict() {
        let store = GovernanceStore::open_in_memory().unwrap();
        store
            .insert_decision("t1", "agent", "implementation", "s", "d", "[]", "[]", "high", NOW)
            .unwrap();
        let task_dir = tempfile::tempdir().unwrap();
        let tasks = TaskRegistry::new(task_dir.path().join("tasks")).unwrap();
        let memory_dir = tempfile::tempdir().unwrap();
        let memory = MemoryService::open(memory_dir.path().join("memory.jsonl")).unwrap();
        let reviewer = ReviewerDriver::new("reviewer", memory_dir.path().join("memory.jsonl"), true);
        let svc = GovernanceService::new(store, tasks, memory, reviewer);
        let output = svc
            .submit_completion_review("t1", "summary", &[], NOW)
            .await
            .unwrap();
        assert_eq!(output.verdict, Verdict::Blocked);
    }
}
