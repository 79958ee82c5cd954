//! External tool execution with timeout and output capture.

use crate::error::ToolError;
use crate::tool::ToolCommand;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result of a tool execution that ran to completion.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Tool name.
    pub name: String,

    /// Exit code (0 = success, -1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl ToolOutput {
    /// Whether this tool passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last `lines` lines of stderr, falling back to stdout when stderr is
    /// empty. Used to attach a short diagnostic to stage errors.
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = source.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Drain `reader` into a shared buffer that stays readable while the child
/// is still running.
fn capture<R>(reader: Option<R>) -> (Captured, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();
    let task = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    });
    (buffer, task)
}

async fn snapshot(buffer: &Captured) -> String {
    String::from_utf8_lossy(&buffer.lock().await).into_owned()
}

/// Runner that executes a [`ToolCommand`] and collects its output.
pub struct ToolRunner;

impl ToolRunner {
    /// Execute a tool and return its output.
    ///
    /// Output is captured while the child runs. When the timeout elapses the
    /// child is killed, whatever it printed so far goes to the log file, and
    /// `Timeout` is returned. A tool that exits with a non-zero code yields
    /// `Ok` with `success == false`.
    pub async fn execute(command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        if command.program.as_os_str().is_empty() {
            return Err(ToolError::InvalidCommand {
                name: command.name.clone(),
                reason: "empty program path".to_string(),
            });
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        debug!(tool = %command.name, command = %command.display_line(), "Spawning external tool");

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            name: command.name.clone(),
            program: command.program.clone(),
            source,
        })?;
        let (stdout_buf, stdout_task) = capture(child.stdout.take());
        let (stderr_buf, stderr_task) = capture(child.stderr.take());

        let waited = if command.timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(command.timeout_secs), child.wait())
                .await
            {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(e) = child.start_kill() {
                        debug!(tool = %command.name, error = %e, "Kill after timeout failed");
                    }
                    stdout_task.abort();
                    stderr_task.abort();
                    let stdout = snapshot(&stdout_buf).await;
                    let stderr = snapshot(&stderr_buf).await;
                    let footer = format!("timed out after {} s", command.timeout_secs);
                    if let Err(e) = write_log(command, &stdout, &stderr, &footer).await {
                        warn!(tool = %command.name, error = %e, "Failed to write partial tool log");
                    }
                    return Err(ToolError::Timeout {
                        name: command.name.clone(),
                        timeout_secs: command.timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await
        };
        let status = waited.map_err(|source| ToolError::Io {
            name: command.name.clone(),
            source,
        })?;
        // Readers finish once the child's pipes close.
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);
        let stdout = snapshot(&stdout_buf).await;
        let stderr = snapshot(&stderr_buf).await;
        let success = status.success();

        let footer = format!("exit code {} after {} ms", exit_code, duration_ms);
        write_log(command, &stdout, &stderr, &footer).await?;

        debug!(
            tool = %command.name,
            exit_code = exit_code,
            duration_ms = duration_ms,
            "External tool exited"
        );

        Ok(ToolOutput {
            name: command.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}

async fn write_log(
    command: &ToolCommand,
    stdout: &str,
    stderr: &str,
    footer: &str,
) -> Result<(), ToolError> {
    let Some(log_file) = &command.log_file else {
        return Ok(());
    };
    let content = format!(
        "$ {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n--- {} ---\n",
        command.display_line(),
        stdout,
        stderr,
        footer
    );
    tokio::fs::write(log_file, content)
        .await
        .map_err(|source| ToolError::Io {
            name: command.name.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_output_passed() {
        let result = ToolOutput {
            name: "gmsh".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: true,
        };
        assert!(result.passed());
    }

    #[test]
    fn test_tool_output_failed() {
        let result = ToolOutput {
            name: "gmsh".to_string(),
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
            success: false,
        };
        assert!(!result.passed());
    }

    #[test]
    fn test_tail_prefers_stderr() {
        let result = ToolOutput {
            name: "su2_cfd".to_string(),
            exit_code: 1,
            stdout: "iter 1\niter 2\n".to_string(),
            stderr: "a\nb\nc\nError: mesh not found\n".to_string(),
            duration_ms: 10,
            success: false,
        };
        assert_eq!(result.tail(2), "c\nError: mesh not found");

        let quiet = ToolOutput {
            stderr: String::new(),
            ..result
        };
        assert_eq!(quiet.tail(1), "iter 2");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let command = ToolCommand::new("echo_test", "echo").arg("hello").timeout_secs(60);

        let result = ToolRunner::execute(&command).await.expect("execute failed");
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let command = ToolCommand::new("false_test", "false").timeout_secs(60);

        let result = ToolRunner::execute(&command).await.expect("execute failed");
        assert!(!result.success);
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_execute_empty_program_rejected() {
        let command = ToolCommand::new("empty", "");
        let err = ToolRunner::execute(&command).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidCommand { .. }));
    }
}
