use std::path::PathBuf;

/// Crate-wide error type. Every service function returns `Result<T>`; none of
/// these variants are meant to cross an async task boundary as a panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tier_violation: {0}")]
    TierViolation(String),

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("parse_failure: {0}")]
    ParseFailure(String),

    #[error("tool_missing: {0}")]
    ToolMissing(String),

    #[error("tool_failed: {0}")]
    ToolFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("lock_contention: {0}")]
    LockContention(String),

    #[error("orphan_pair: {0}")]
    OrphanPair(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("process error: {0}")]
    Process(String),
}

pub type Result<T> = std::result::Result<T, Error>;
