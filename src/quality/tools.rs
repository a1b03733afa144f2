use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::process::{self, ProcessConfig, ProcessOutput};

/// Run a configured shell command (e.g. `cargo test`, `npm run lint`) in
/// `working_dir`. `command` is split on whitespace naively — commands in
/// `project-config.json` are expected to be simple invocations, not shell
/// pipelines, matching how the reference CLI's own process config is built.
pub async fn run_configured_command(
    gate_name: &str,
    command: &str,
    working_dir: &Path,
) -> Result<ProcessOutput> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Error::ToolMissing(format!("{gate_name}: empty command")))?;
    let args = parts.map(str::to_string).collect::<Vec<_>>();

    let config = ProcessConfig {
        command: program.to_string(),
        args,
        working_dir: working_dir.to_path_buf(),
        timeout: Some(Duration::from_secs(600)),
        log_prefix: gate_name.to_string(),
        env: vec![],
    };
    process::spawn_and_stream(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_configured_command_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_configured_command("tests", "true", dir.path()).await.unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_run_configured_command_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_configured_command("tests", "not-a-real-tool-xyz", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolMissing(_)));
    }
}
