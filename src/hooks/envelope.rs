use serde::Deserialize;

use crate::error::{Error, Result};

/// Prefixes that mark a task subject as a governance artifact already, so
/// the interception hook never pairs a review task with another review
/// task. This is the single canonical definition referenced by both hook
/// binaries, resolving the duplication flagged in the open questions.
pub const RESERVED_PREFIXES: &[&str] = &["[GOVERNANCE]", "[REVIEW]", "[SECURITY]", "[ARCHITECTURE]"];

pub fn has_reserved_prefix(subject: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| subject.starts_with(p))
}

/// Stdin envelope the host runtime delivers to the interception hook.
#[derive(Debug, Clone, Deserialize)]
pub struct HookEnvelope {
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    #[serde(default)]
    pub tool_result: serde_json::Value,
    pub session_id: String,
}

impl HookEnvelope {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::ParseFailure(format!("hook envelope: {e}")))
    }

    pub fn subject(&self) -> Option<&str> {
        self.tool_input.get("subject").and_then(|v| v.as_str())
    }
}
