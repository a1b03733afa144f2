use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::error::{Error, Result};

/// Quality gate toggles, loaded from `project-config.json`'s `settings.qualityGates` block.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityGates {
    pub build: bool,
    pub lint: bool,
    pub tests: bool,
    pub coverage: bool,
    pub findings: bool,
}

impl Default for QualityGates {
    fn default() -> Self {
        Self {
            build: true,
            lint: true,
            tests: true,
            coverage: true,
            findings: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectSettings {
    pub quality_gates: QualityGates,
    pub coverage_threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct QualityCommands {
    pub test_commands: std::collections::HashMap<String, String>,
    pub lint_commands: std::collections::HashMap<String, String>,
    pub build_commands: std::collections::HashMap<String, String>,
    pub format_commands: std::collections::HashMap<String, String>,
}

/// Parsed `project-config.json`. Absent file is equivalent to all-default.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub settings: ProjectSettings,
    pub quality: QualityCommands,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(Error::Json)
    }
}

/// Raw, fully-optional mirror of the persisted TOML config file
/// (`.governance/config.toml`). Every field is overlaid onto defaults, and
/// in turn overlaid by environment variables and CLI flags in `merge`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub task_list_id: Option<String>,
    pub settle_interval_ms: Option<u64>,
    pub min_tasks_for_review: Option<u32>,
    pub review_flag_staleness_ms: Option<u64>,
    pub reviewer_binary: Option<String>,
    pub memory_path: Option<String>,
    pub governance_db_path: Option<String>,
    pub trust_db_path: Option<String>,
    pub task_dir: Option<String>,
    pub project_config_path: Option<String>,
}

/// Fully-resolved runtime configuration shared by the services, the
/// administrative CLI, and the three hook binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root_dir: PathBuf,
    pub task_list_id: String,
    pub settle_interval_ms: u64,
    pub min_tasks_for_review: u32,
    pub review_flag_staleness_ms: u64,
    pub mock_review: bool,
    pub reviewer_binary: String,
    pub memory_path: PathBuf,
    pub governance_db_path: PathBuf,
    pub trust_db_path: PathBuf,
    pub task_dir: PathBuf,
    pub project_config: ProjectConfig,
}

const DEFAULT_CONFIG_FILE: &str = ".governance/config.toml";

impl Config {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        Self::load_from(global, Path::new("."))
    }

    pub fn load_from(global: &GlobalArgs, project_dir: &Path) -> Result<Self> {
        let file_config = match &global.config {
            Some(explicit_path) => {
                let path = Path::new(explicit_path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                let content = std::fs::read_to_string(path)?;
                parse_config(&content)?
            }
            None => {
                let path = project_dir.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    let content = std::fs::read_to_string(&path)?;
                    parse_config(&content)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        merge(file_config, global, project_dir)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
}

fn env_truthy(name: &str) -> bool {
    std::env::var(name)
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

pub fn merge(file: ConfigFile, global: &GlobalArgs, project_dir: &Path) -> Result<Config> {
    let task_list_id = global
        .task_list_id
        .clone()
        .or_else(|| std::env::var("TASK_LIST_ID").ok())
        .or(file.task_list_id)
        .unwrap_or_else(|| "default".to_string());

    let settle_interval_ms = global
        .settle_interval_ms
        .or_else(|| env_u64("SETTLE_INTERVAL_MS"))
        .or(file.settle_interval_ms)
        .unwrap_or(3000);

    let min_tasks_for_review = global
        .min_tasks_for_review
        .or_else(|| env_u32("MIN_TASKS_FOR_REVIEW"))
        .or(file.min_tasks_for_review)
        .unwrap_or(2);

    let review_flag_staleness_ms = global
        .review_flag_staleness_ms
        .or_else(|| env_u64("REVIEW_FLAG_STALENESS_MS"))
        .or(file.review_flag_staleness_ms)
        .unwrap_or(300_000);

    let mock_review = env_truthy("MOCK_REVIEW");

    let reviewer_binary = global
        .reviewer_binary
        .clone()
        .or_else(|| std::env::var("GOVCORE_REVIEWER_BINARY").ok())
        .or(file.reviewer_binary)
        .unwrap_or_else(|| "reviewer".to_string());

    let resolve = |cli_val: Option<&String>, file_val: Option<String>, default: &str| -> PathBuf {
        let raw = cli_val
            .cloned()
            .or(file_val)
            .unwrap_or_else(|| default.to_string());
        project_dir.join(raw)
    };

    let memory_path = resolve(
        global.memory_path.as_ref(),
        file.memory_path,
        ".governance/memory.jsonl",
    );
    let governance_db_path = resolve(
        global.governance_db_path.as_ref(),
        file.governance_db_path,
        ".governance/governance.sqlite",
    );
    let trust_db_path = resolve(
        global.trust_db_path.as_ref(),
        file.trust_db_path,
        ".governance/trust.sqlite",
    );
    let task_dir = resolve(global.task_dir.as_ref(), file.task_dir, ".governance/tasks");

    let project_config_path = resolve(
        None,
        file.project_config_path,
        "project-config.json",
    );
    let project_config = ProjectConfig::load(&project_config_path)?;

    let config = Config {
        root_dir: project_dir.to_path_buf(),
        task_list_id,
        settle_interval_ms,
        min_tasks_for_review,
        review_flag_staleness_ms,
        mock_review,
        reviewer_binary,
        memory_path,
        governance_db_path,
        trust_db_path,
        task_dir,
        project_config,
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.settle_interval_ms == 0 {
        return Err(Error::ConfigValidation(
            "settle_interval_ms must be > 0".to_string(),
        ));
    }
    if config.min_tasks_for_review == 0 {
        return Err(Error::ConfigValidation(
            "min_tasks_for_review must be > 0".to_string(),
        ));
    }
    Ok(())
}
