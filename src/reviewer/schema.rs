use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Blocked,
    NeedsHumanReview,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewOutput {
    pub verdict: Verdict,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub standards_verified: Vec<String>,
}

impl ReviewOutput {
    pub fn needs_human_review(guidance: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NeedsHumanReview,
            guidance: Some(guidance.into()),
            findings: Vec::new(),
            standards_verified: Vec::new(),
        }
    }

    pub fn approved() -> Self {
        Self {
            verdict: Verdict::Approved,
            guidance: None,
            findings: Vec::new(),
            standards_verified: Vec::new(),
        }
    }
}

const TRUNCATE_AT: usize = 2000;

/// Parse a reviewer's stdout into a `ReviewOutput`, trying three strategies
/// in order: raw JSON, a fenced code block, and the outermost `{...}`
/// substring. Unparseable output is never fatal — it degrades to
/// `needs_human_review` carrying the truncated raw text as guidance.
pub fn parse_review_output(raw: &str) -> ReviewOutput {
    if let Ok(parsed) = serde_json::from_str::<ReviewOutput>(raw.trim()) {
        return parsed;
    }
    if let Some(fenced) = extract_fenced(raw) {
        if let Ok(parsed) = serde_json::from_str::<ReviewOutput>(&fenced) {
            return parsed;
        }
    }
    if let Some(braces) = extract_outermost_braces(raw) {
        if let Ok(parsed) = serde_json::from_str::<ReviewOutput>(&braces) {
            return parsed;
        }
    }
    let mut truncated = raw.trim().to_string();
    truncated.truncate(TRUNCATE_AT);
    ReviewOutput::needs_human_review(format!("unparseable reviewer output: {truncated}"))
}

fn extract_fenced(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix("```")?;
    let after_tag = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => return None,
    };
    match after_tag.rfind("```") {
        Some(pos) => Some(after_tag[..pos].trim().to_string()),
        None => Some(after_tag.trim().to_string()),
    }
}

fn extract_outermost_braces(input: &str) -> Option<String> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end < start {
        return None;
    }
    Some(input[start..=end].to_string())
}

pub fn parse_failure_error(detail: impl Into<String>) -> Error {
    Error::ParseFailure(detail.into())
}
