use std::path::Path;

use tracing::warn;

use super::entity::{Entity, EntityType};
use super::tier::Tier;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: usize,
    pub entities: Vec<String>,
    pub errors: Vec<String>,
    pub skipped: Vec<String>,
}

const LABELED_SECTIONS: &[&str] = &[
    "Statement",
    "Description",
    "Rationale",
    "Usage",
    "Examples",
    "Type",
    "Intent",
    "Desired Outcome",
    "Metrics",
    "Vision Alignment",
];

/// Derive a snake_case entity name from a document's H1 title, stripping
/// editorial prefixes like "Vision Standard:" or "Pattern:".
pub fn derive_name(title: &str) -> String {
    let stripped = title
        .split_once(':')
        .map(|(prefix, rest)| {
            let known = [
                "vision standard",
                "architectural standard",
                "pattern",
                "component",
                "problem",
                "solution pattern",
            ];
            if known.contains(&prefix.trim().to_lowercase().as_str()) {
                rest.trim()
            } else {
                title.trim()
            }
        })
        .unwrap_or(title.trim());

    stripped
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn extract_h1(content: &str) -> Option<String> {
    content
        .lines()
        .find(|l| l.trim_start().starts_with("# ") && !l.trim_start().starts_with("## "))
        .map(|l| l.trim_start_matches('#').trim().to_string())
}

fn extract_sections(content: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            if let Some((name, body)) = current.take() {
                sections.push((name, body.join("\n").trim().to_string()));
            }
            let heading = heading.trim().to_string();
            if LABELED_SECTIONS.iter().any(|s| s.eq_ignore_ascii_case(&heading)) {
                current = Some((heading, Vec::new()));
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }
    if let Some((name, body)) = current {
        sections.push((name, body.join("\n").trim().to_string()));
    }
    sections
}

fn infer_entity_type(tier: Tier, sections: &[(String, String)]) -> EntityType {
    if let Some((_, ty)) = sections.iter().find(|(name, _)| name.eq_ignore_ascii_case("type")) {
        let lower = ty.to_lowercase();
        if lower.contains("component") {
            return EntityType::Component;
        }
        if lower.contains("pattern") {
            return EntityType::Pattern;
        }
        if lower.contains("problem") {
            return EntityType::Problem;
        }
        if lower.contains("solution") {
            return EntityType::SolutionPattern;
        }
        if lower.contains("architectural") {
            return EntityType::ArchitecturalStandard;
        }
    }
    match tier {
        Tier::Vision => EntityType::VisionStandard,
        Tier::Architecture => EntityType::ArchitecturalStandard,
        Tier::Quality => EntityType::Pattern,
        Tier::Untiered => EntityType::Component,
    }
}

fn document_to_entity(content: &str, tier: Tier, source_file: &str) -> Option<Entity> {
    let title = extract_h1(content)?;
    let name = derive_name(&title);
    if name.is_empty() {
        return None;
    }
    let sections = extract_sections(content);
    let entity_type = infer_entity_type(tier, &sections);

    let mut observations = vec![
        format!("protection_tier: {tier}"),
        format!("title: {title}"),
        format!("source_file: {source_file}"),
    ];
    for (heading, body) in sections {
        if !body.is_empty() {
            observations.push(format!("{heading}: {body}"));
        }
    }

    let mut entity = Entity::new(name, entity_type);
    entity.observations = observations;
    Some(entity)
}

/// Ingest every markdown file directly under `folder` (non-recursive,
/// skipping index files) into entities stamped with `tier`.
pub fn ingest_folder(folder: &Path, tier: Tier) -> Result<Vec<Entity>> {
    let mut entities = Vec::new();
    if !folder.is_dir() {
        return Ok(entities);
    }
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if stem.eq_ignore_ascii_case("index") || stem.eq_ignore_ascii_case("readme") {
            continue;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping unreadable document {}: {e}", path.display());
                continue;
            }
        };
        let source_file = path.to_string_lossy().to_string();
        if let Some(entity) = document_to_entity(&content, tier, &source_file) {
            entities.push(entity);
        }
    }
    Ok(entities)
}
