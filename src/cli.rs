//! Platform CLI invocation.
//!
//! A command is spawned once; its exit is then awaited through the shared
//! polling primitive so that a hung CLI is bounded by the same deadline
//! logic as every other wait.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::poll::{eventually, PollConfig, PollOutcome};

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates an output record; mostly useful for scripted runners.
    pub fn new(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs platform CLI subcommands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Issues `args` once and waits up to `timeout` for the process to exit.
    ///
    /// Returns [`Error::Timeout`] if it is still running at the deadline.
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// Runner for the `cf` executable.
pub struct CfCli {
    /// Path to the cf binary.
    binary: String,
    /// How often to check whether the process exited.
    interval: Duration,
    /// Extra environment for every invocation.
    env: Vec<(String, String)>,
}

impl Default for CfCli {
    fn default() -> Self {
        Self::new()
    }
}

impl CfCli {
    /// Creates a runner using the default `cf` command.
    pub fn new() -> Self {
        Self::with_binary("cf")
    }

    /// Creates a runner with a custom binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            interval: Duration::from_millis(100),
            // Colour codes would end up inside captured log lines.
            env: vec![("CF_COLOR".to_string(), "false".to_string())],
        }
    }

    /// Sets the exit-check interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Adds an environment variable for every invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }
}

#[async_trait]
impl CommandRunner for CfCli {
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let description = self.describe(args);
        tracing::info!(command = %description, "running platform command");

        let started = Instant::now();
        let deadline = started + timeout;
        let mut child = Command::new(&self.binary)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = drain(child.stdout.take().ok_or_else(|| not_captured("stdout"))?);
        let mut stderr = drain(child.stderr.take().ok_or_else(|| not_captured("stderr"))?);

        let outcome = eventually(PollConfig::new(self.interval, timeout), || {
            let status = child.try_wait().map(|status| status.map(|s| s.code()));
            std::future::ready(status.map_err(Error::Io))
        })
        .await?;

        let exit_code = match outcome {
            PollOutcome::Ready(code) => code,
            PollOutcome::TimedOut { elapsed, .. } => {
                tracing::warn!(command = %description, ?elapsed, "command timed out, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(command = %description, error = %e, "failed to kill command");
                }
                stdout.abort();
                stderr.abort();
                return Err(Error::Timeout {
                    operation: description,
                    elapsed,
                });
            }
        };

        // A descendant that inherited the pipes can hold them open after the
        // child exits; the deadline covers draining too.
        let drained = tokio::time::timeout_at(deadline, async {
            Ok::<_, Error>((join(&mut stdout).await?, join(&mut stderr).await?))
        })
        .await;
        let (stdout_text, stderr_text) = match drained {
            Ok(output) => output?,
            Err(_) => {
                stdout.abort();
                stderr.abort();
                let elapsed = started.elapsed();
                tracing::warn!(command = %description, ?elapsed, "command output still open at deadline");
                return Err(Error::Timeout {
                    operation: description,
                    elapsed,
                });
            }
        };

        let output = CommandOutput {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
        };

        tracing::debug!(
            command = %description,
            exit_code = ?output.exit_code,
            stdout_bytes = output.stdout.len(),
            "platform command finished"
        );
        Ok(output)
    }
}

/// Reads a pipe to completion in the background so the child never blocks
/// on a full pipe buffer.
fn drain<R>(mut reader: R) -> JoinHandle<io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

async fn join(handle: &mut JoinHandle<io::Result<String>>) -> Result<String> {
    let text = handle.await.map_err(io::Error::other)??;
    Ok(text)
}

fn not_captured(stream: &str) -> Error {
    Error::Io(io::Error::other(format!("{} was not captured", stream)))
}
