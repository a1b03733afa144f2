use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::memory::entity::Record;

const DEFAULT_DECISION_REVIEW: &str = include_str!("default_prompts/decision-review.md");
const DEFAULT_PLAN_REVIEW: &str = include_str!("default_prompts/plan-review.md");
const DEFAULT_COMPLETION_REVIEW: &str = include_str!("default_prompts/completion-review.md");
const REVIEW_SCHEMA: &str = include_str!("default_prompts/_review-schema.md");

fn default_template(mode: &str) -> Option<&'static str> {
    match mode {
        "decision-review" => Some(DEFAULT_DECISION_REVIEW),
        "plan-review" => Some(DEFAULT_PLAN_REVIEW),
        "completion-review" => Some(DEFAULT_COMPLETION_REVIEW),
        _ => None,
    }
}

/// Prompt template engine for the reviewer driver, mirroring the phase
/// engine used for agent prompts: embedded defaults with an optional
/// override directory, `upon` for substitution.
pub struct PromptEngine {
    override_dir: Option<std::path::PathBuf>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<std::path::PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn load_template(&self, mode: &str) -> Result<String> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{mode}.md"));
            if path.exists() {
                return std::fs::read_to_string(&path)
                    .map_err(|e| Error::Prompt(format!("failed to read override {mode}: {e}")));
            }
        }
        default_template(mode)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown review mode: {mode}")))
    }

    pub fn render(&self, mode: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(mode)?;
        let mut all_vars = vars.clone();
        all_vars
            .entry("review_schema".to_string())
            .or_insert_with(|| REVIEW_SCHEMA.to_string());
        render_template(&template, &all_vars)
    }
}

pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let engine = upon::Engine::new();
    let compiled = engine
        .compile(template)
        .map_err(|e| Error::Prompt(format!("template compile error: {e}")))?;
    compiled
        .render(
            &engine,
            upon::to_value(vars).map_err(|e| Error::Prompt(e.to_string()))?,
        )
        .to_string()
        .map_err(|e| Error::Prompt(format!("template render error: {e}")))
}

/// Load vision and architecture standards directly from the memory graph's
/// backing JSONL file (a synchronous local read, not a service call) so
/// prompt rendering never pays for a round trip through `MemoryService`.
pub fn load_standards(memory_path: &Path) -> Result<(String, String)> {
    if !memory_path.exists() {
        return Ok((String::new(), String::new()));
    }
    let content = std::fs::read_to_string(memory_path)?;
    let mut vision = Vec::new();
    let mut architecture = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(Record::Entity(entity)) = serde_json::from_str::<Record>(line) else {
            continue;
        };
        match entity.tier() {
            crate::memory::tier::Tier::Vision => {
                vision.push(format_entity(&entity));
            }
            crate::memory::tier::Tier::Architecture => {
                architecture.push(format_entity(&entity));
            }
            _ => {}
        }
    }
    Ok((vision.join("\n\n"), architecture.join("\n\n")))
}

fn format_entity(entity: &crate::memory::entity::Entity) -> String {
    format!("### {}\n{}", entity.name, entity.observations.join("\n"))
}
