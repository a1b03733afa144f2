pub mod prompts;
pub mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::process::{self, ProcessConfig};

pub use schema::{ReviewOutput, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    Decision,
    Plan,
    Completion,
}

impl ReviewMode {
    fn template_name(self) -> &'static str {
        match self {
            ReviewMode::Decision => "decision-review",
            ReviewMode::Plan => "plan-review",
            ReviewMode::Completion => "completion-review",
        }
    }

    fn timeout(self) -> Duration {
        match self {
            ReviewMode::Decision => Duration::from_secs(60),
            ReviewMode::Plan => Duration::from_secs(120),
            ReviewMode::Completion => Duration::from_secs(90),
        }
    }
}

/// Drives the external reviewer subprocess: renders a mode-specific prompt,
/// invokes the reviewer binary with temp-file I/O, and parses its verdict.
/// `MOCK_REVIEW` short-circuits the whole thing to a deterministic approval,
/// for integration tests against the hook binaries without a real reviewer
/// on PATH.
pub struct ReviewerDriver {
    reviewer_binary: String,
    memory_path: PathBuf,
    mock_review: bool,
    prompts: prompts::PromptEngine,
}

impl ReviewerDriver {
    pub fn new(reviewer_binary: impl Into<String>, memory_path: impl Into<PathBuf>, mock_review: bool) -> Self {
        Self {
            reviewer_binary: reviewer_binary.into(),
            memory_path: memory_path.into(),
            mock_review,
            prompts: prompts::PromptEngine::new(None),
        }
    }

    pub async fn review(&self, mode: ReviewMode, mut vars: HashMap<String, String>) -> Result<ReviewOutput> {
        if self.mock_review {
            return Ok(ReviewOutput::approved());
        }

        let (vision, architecture) = prompts::load_standards(&self.memory_path)?;
        vars.entry("vision_standards".to_string()).or_insert(vision);
        vars.entry("architecture_entities".to_string())
            .or_insert(architecture);

        let prompt = self.prompts.render(mode.template_name(), &vars)?;

        let guard = TempPromptFile::write(&prompt)?;

        let config = ProcessConfig {
            command: self.reviewer_binary.clone(),
            args: vec!["--print".to_string(), "--input-file".to_string(), guard.path_string()],
            working_dir: std::env::temp_dir(),
            timeout: Some(mode.timeout()),
            log_prefix: format!("reviewer:{}", mode.template_name()),
            env: vec![],
        };

        match process::spawn_and_stream(config).await {
            Ok(out) if out.success() => Ok(schema::parse_review_output(&out.stdout())),
            Ok(out) => Ok(ReviewOutput::needs_human_review(format!(
                "reviewer exited {}: {}",
                out.exit_code,
                out.stderr()
            ))),
            Err(crate::error::Error::ToolMissing(detail)) => {
                warn!("reviewer binary missing: {detail}");
                Ok(ReviewOutput::needs_human_review(format!(
                    "reviewer binary not found: {detail}"
                )))
            }
            Err(crate::error::Error::Timeout(detail)) => Ok(ReviewOutput::needs_human_review(
                format!("reviewer timed out: {detail}"),
            )),
            Err(e) => Ok(ReviewOutput::needs_human_review(format!(
                "reviewer invocation failed: {e}"
            ))),
        }
    }
}

/// RAII guard for the reviewer's temp-file input, removed on every exit
/// route (success, error, or timeout) via `Drop` rather than a manual
/// cleanup call at each return site.
struct TempPromptFile {
    path: PathBuf,
}

impl TempPromptFile {
    fn write(content: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("govcore-review-{}.md", unique_suffix()));
        std::fs::write(&path, content)?;
        Ok(Self { path })
    }

    fn path_string(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

impl Drop for TempPromptFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    format!("{pid}-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_review_is_always_approved() {
        let driver = ReviewerDriver::new("nonexistent-reviewer-binary", "/nonexistent/memory.jsonl", true);
        let result = driver.review(ReviewMode::Decision, HashMap::new()).await.unwrap();
        assert_eq!(result.verdict, Verdict::Approved);
    }

    #[tokio::test]
    async fn test_missing_binary_yields_needs_human_review() {
        let driver = ReviewerDriver::new("definitely-not-a-real-reviewer-xyz", "/nonexistent/memory.jsonl", false);
        let mut vars = HashMap::new();
        vars.insert("task_id".to_string(), "t1".to_string());
        vars.insert("category".to_string(), "implementation".to_string());
        vars.insert("summary".to_string(), "s".to_string());
        vars.insert("detail".to_string(), "d".to_string());
        vars.insert("components_affected".to_string(), "[]".to_string());
        vars.insert("alternatives_considered".to_string(), "none".to_string());
        vars.insert("confidence".to_string(), "high".to_string());
        let result = driver.review(ReviewMode::Decision, vars).await.unwrap();
        assert_eq!(result.verdict, Verdict::NeedsHumanReview);
        assert!(result.guidance.unwrap().contains("not found"));
    }

    #[test]
    fn test_temp_prompt_file_removed_on_drop() {
        let guard = TempPromptFile::write("hello").unwrap();
        let path = guard.path.clone();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_mode_timeouts() {
        assert_eq!(ReviewMode::Decision.timeout(), Duration::from_secs(60));
        assert_eq!(ReviewMode::Plan.timeout(), Duration::from_secs(120));
        assert_eq!(ReviewMode::Completion.timeout(), Duration::from_secs(90));
    }
}
