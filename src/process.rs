use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Grace period between a SIGTERM escalation and the follow-up SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Everything needed to spawn and supervise one external subprocess.
///
/// Shared by the AI reviewer driver (the external reasoner binary) and the
/// quality service (per-language formatter/linter/test-runner invocations):
/// both just need "run this command, stream its output, give it back to me".
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub log_prefix: String,
    pub env: Vec<(String, String)>,
}

/// What came back from a finished (or killed) subprocess.
#[derive(Debug)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }

    pub fn stdout(&self) -> String {
        self.stdout_lines.join("\n")
    }

    pub fn stderr(&self) -> String {
        self.stderr_lines.join("\n")
    }
}

/// Run `config` to completion, streaming its stdout/stderr into `tracing` as
/// it arrives and collecting each into a line buffer.
///
/// The child runs in its own Unix process group so a timeout or parent
/// signal can reach any grandchildren it spawns, not just the direct child.
/// A caught SIGINT/SIGTERM on this process is relayed into that group for as
/// long as the child is alive; on timeout the group is escalated
/// SIGTERM, a grace period, then SIGKILL.
pub async fn spawn_and_stream(config: ProcessConfig) -> Result<ProcessOutput> {
    let mut child = launch(&config)?;
    let pid = child.id().ok_or_else(|| Error::Process("child has no pid".into()))?;

    let stdout_task = spawn_line_sink(child.stdout.take().expect("stdout is piped"), config.log_prefix.clone(), Level::Info);
    let stderr_task = spawn_line_sink(child.stderr.take().expect("stderr is piped"), config.log_prefix.clone(), Level::Warn);

    #[cfg(unix)]
    let forwarder = forward_signals_to_group(pid as i32);

    let outcome = match config.timeout {
        Some(budget) => await_with_timeout(&mut child, budget).await,
        None => match child.wait().await {
            Ok(status) => WaitOutcome::Exited(status),
            Err(e) => WaitOutcome::WaitFailed(Error::Process(format!("wait error: {e}"))),
        },
    };

    #[cfg(unix)]
    forwarder.abort();

    let status = match outcome {
        WaitOutcome::Exited(status) => status,
        WaitOutcome::WaitFailed(e) => return Err(e),
        WaitOutcome::TimedOut => {
            #[cfg(unix)]
            kill_group_escalating(pid as i32).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(Error::Timeout(format!("{:?} exceeded {:?}", config.timeout.unwrap(), config.timeout.unwrap())));
        }
    };

    let stdout_lines = stdout_task
        .await
        .map_err(|e| Error::Process(format!("stdout reader failed: {e}")))?;
    let stderr_lines = stderr_task
        .await
        .map_err(|e| Error::Process(format!("stderr reader failed: {e}")))?;
    let (exit_code, signal) = decode_exit_status(&status);

    Ok(ProcessOutput {
        exit_code,
        signal,
        stdout_lines,
        stderr_lines,
    })
}

fn launch(config: &ProcessConfig) -> Result<Child> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .current_dir(&config.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolMissing(format!("{}: {e}", config.command))
        } else {
            Error::Process(format!("failed to spawn '{}': {e}", config.command))
        }
    })
}

enum Level {
    Info,
    Warn,
}

/// Drain a child's stdout/stderr pipe into `tracing` line-by-line, returning
/// the accumulated lines once the pipe closes. Run as its own task so stdout
/// and stderr are consumed concurrently rather than risking a full pipe
/// buffer stalling the child.
fn spawn_line_sink(
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    prefix: String,
    level: Level,
) -> tokio::task::JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut lines = Vec::new();
        let mut reader = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            match level {
                Level::Info => info!("[{prefix}] {line}"),
                Level::Warn => warn!("[{prefix}] {line}"),
            }
            lines.push(line);
        }
        lines
    })
}

#[cfg(unix)]
fn forward_signals_to_group(pgid: i32) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
        loop {
            tokio::select! {
                _ = sigint.recv() => unsafe { libc::killpg(pgid, libc::SIGINT); },
                _ = sigterm.recv() => unsafe { libc::killpg(pgid, libc::SIGTERM); },
            }
        }
    })
}

enum WaitOutcome {
    Exited(std::process::ExitStatus),
    WaitFailed(Error),
    TimedOut,
}

async fn await_with_timeout(child: &mut Child, budget: Duration) -> WaitOutcome {
    match tokio::time::timeout(budget, child.wait()).await {
        Ok(Ok(status)) => WaitOutcome::Exited(status),
        Ok(Err(e)) => WaitOutcome::WaitFailed(Error::Process(format!("wait error: {e}"))),
        Err(_) => WaitOutcome::TimedOut,
    }
}

#[cfg(unix)]
async fn kill_group_escalating(pgid: i32) {
    unsafe {
        libc::killpg(pgid, libc::SIGTERM);
    }
    tokio::time::sleep(KILL_GRACE).await;
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

fn decode_exit_status(status: &std::process::ExitStatus) -> (i32, Option<i32>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (128 + sig, Some(sig));
        }
    }
    (-1, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str], timeout: Option<Duration>) -> ProcessConfig {
        ProcessConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            timeout,
            log_prefix: "test".into(),
            env: vec![],
        }
    }

    #[tokio::test]
    async fn test_spawn_success() {
        let out = spawn_and_stream(config("echo", &["hello"], Some(Duration::from_secs(5))))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout(), "hello");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let err = spawn_and_stream(config("definitely-not-a-real-binary-xyz", &[], None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolMissing(_)));
    }

    #[tokio::test]
    async fn test_spawn_timeout() {
        let err = spawn_and_stream(config("sleep", &["5"], Some(Duration::from_millis(100))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_spawn_nonzero_exit() {
        let out = spawn_and_stream(config("false", &[], Some(Duration::from_secs(5))))
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 1);
    }
}
