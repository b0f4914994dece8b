//! Guarded subprocess execution for build, test, and shell actions
//!
//! Commands run under the project directory through `sh -c`, are killed on
//! timeout or cancellation, and report captured output either way. The wait
//! is a cancellation suspension point: a stopped pipeline must not leave
//! orphaned build processes behind.

use crate::{OrchestratorError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Captured result of a subprocess run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code; -1 when killed
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Whether the wall clock expired
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the command exited cleanly
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run a shell command under `dir` with a timeout and cooperative cancellation
pub async fn run_command(
    dir: &Path,
    command_line: &str,
    timeout_ms: u64,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    debug!(dir = %dir.display(), command = command_line, timeout_ms, "running command");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let capture = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut stdout).await;
        }
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        let status = child.wait().await;
        (status, stdout, stderr)
    };

    tokio::select! {
        (status, stdout, stderr) = capture => {
            let status = status?;
            Ok(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
                timed_out: false,
            })
        }
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            warn!(command = command_line, timeout_ms, "command timed out");
            Ok(CommandOutput {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("command timed out after {}ms", timeout_ms),
                timed_out: true,
            })
        }
        _ = cancel.cancelled() => {
            debug!(command = command_line, "command cancelled");
            Err(OrchestratorError::Cancelled)
        }
    }
}
