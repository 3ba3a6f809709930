//! Runtime CLI driver.
//!
//! Spawns the external `container` binary and captures its output. This is
//! the engine's only source of external non-determinism; everything above it
//! goes through the [`CommandRunner`] trait so tests can inject prerecorded
//! `(stdout, stderr, exit code)` triples.

use crate::error::{DockgeacError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Buffered log chunks per stream before backpressure kicks in.
const LOG_CHANNEL_CAPACITY: usize = 64;

/// Captured output of one CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A lazy, potentially infinite sequence of raw stdout chunks from a child
/// process. Chunks arrive in the order the child emits them; the sequence
/// ends when the child exits and can be cancelled by terminating the child.
pub struct LogStream {
    rx: mpsc::Receiver<Vec<u8>>,
    stop: Option<oneshot::Sender<()>>,
}

impl LogStream {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>, stop: Option<oneshot::Sender<()>>) -> Self {
        Self { rx, stop }
    }

    /// Receive the next chunk, or `None` once the child has exited.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Terminate the child process backing this stream.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Abstraction over the runtime CLI.
///
/// Arguments pass through unchanged: no shell interpolation, no quoting.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the CLI to completion, collecting full stdout, stderr and exit code.
    ///
    /// Spawn failure surfaces as exit code 1 with empty stdout.
    async fn run(&self, args: &[String]) -> CliOutput;

    /// Spawn the CLI and stream its raw stdout chunks.
    async fn stream(&self, args: &[String]) -> Result<LogStream>;

    /// Runner name (for logging).
    fn name(&self) -> &str;
}

/// The real driver for Apple's `container` CLI.
pub struct ContainerCli {
    binary: String,
}

impl ContainerCli {
    pub fn new() -> Self {
        Self { binary: "container".to_string() }
    }

    /// Use a non-default binary path (e.g. a wrapper script).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for ContainerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ContainerCli {
    async fn run(&self, args: &[String]) -> CliOutput {
        debug!(binary = %self.binary, ?args, "Invoking runtime CLI");

        let output = match Command::new(&self.binary).args(args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "Failed to spawn runtime CLI");
                return CliOutput {
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exit_code: 1,
                };
            }
        };

        CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(1),
        }
    }

    async fn stream(&self, args: &[String]) -> Result<LogStream> {
        debug!(binary = %self.binary, ?args, "Streaming from runtime CLI");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DockgeacError::runtime(format!("Failed to spawn {}", self.binary), e.to_string())
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DockgeacError::Internal("Child stdout not captured".to_string()))?;

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        let _ = child.kill().await;
                        break;
                    }
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).await.is_err() {
                                let _ = child.kill().await;
                                break;
                            }
                        }
                    }
                }
            }
            let _ = child.wait().await;
        });

        Ok(LogStream::new(rx, Some(stop_tx)))
    }

    fn name(&self) -> &str {
        &self.binary
    }
}
