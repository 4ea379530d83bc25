//! llama.cpp process adapter.
//!
//! [`LlamaLauncher`] validates paths, spawns the executable with piped stdio
//! and splits the child into a [`LlamaProcess`] control handle and a stdout
//! event stream. A reaper task owns the `Child`: it waits for exit, or on
//! cancellation interrupts the process and escalates to a kill.

mod shutdown;
mod stream;

pub use shutdown::interrupt_child;
pub use stream::{spawn_stderr_logger, stdout_events};

use async_trait::async_trait;
use herd_core::{
    LaunchSpec, ProcessControl, ProcessError, ProcessLauncher, SpawnError, SpawnedProcess,
};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time a cancelled process gets to exit after SIGINT before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Spawns llama.cpp generation processes.
#[derive(Debug, Clone)]
pub struct LlamaLauncher {
    shutdown_grace: Duration,
}

impl Default for LlamaLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_GRACE)
    }
}

impl LlamaLauncher {
    pub const fn new(shutdown_grace: Duration) -> Self {
        Self { shutdown_grace }
    }
}

/// Fail with `err` unless `path` is an existing file.
async fn require_file(
    path: &Path,
    err: fn(std::path::PathBuf) -> SpawnError,
) -> Result<(), SpawnError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(err(path.to_path_buf())),
    }
}

#[async_trait]
impl ProcessLauncher for LlamaLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, SpawnError> {
        require_file(&spec.executable, SpawnError::ExecutableNotFound).await?;
        require_file(&spec.model_path, SpawnError::ModelNotFound).await?;

        let spawn_failed = |source: std::io::Error| SpawnError::Spawn {
            executable: spec.executable.clone(),
            source,
        };

        let mut child = Command::new(&spec.executable)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_failed)?;

        let pid = child.id();
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(spawn_failed(std::io::Error::other("child stdio was not captured")));
        };

        info!(
            pid = ?pid,
            executable = %spec.executable.display(),
            model = %spec.model_path.display(),
            "Generation process spawned"
        );
        debug!(args = ?spec.args, "Generation process arguments");

        spawn_stderr_logger(stderr, pid);

        let cancel = CancellationToken::new();
        tokio::spawn(reap(child, cancel.clone(), self.shutdown_grace));

        Ok(SpawnedProcess {
            control: Arc::new(LlamaProcess {
                pid,
                stdin: Mutex::new(Some(stdin)),
                cancel,
            }),
            events: stdout_events(stdout),
        })
    }
}

/// Wait for the child to exit, or interrupt it once cancellation is requested.
async fn reap(mut child: Child, cancel: CancellationToken, grace: Duration) {
    let pid = child.id();
    let exited = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => debug!(pid = ?pid, %status, "Generation process exited"),
                Err(e) => warn!(pid = ?pid, error = %e, "Failed waiting for generation process"),
            }
            true
        }
        () = cancel.cancelled() => false,
    };
    if exited {
        return;
    }

    match interrupt_child(&mut child, grace).await {
        Ok(status) => debug!(pid = ?pid, %status, "Generation process stopped"),
        Err(e) => warn!(pid = ?pid, error = %e, "Failed to stop generation process"),
    }
}

/// Control handle for a running llama.cpp process.
#[derive(Debug)]
pub struct LlamaProcess {
    pid: Option<u32>,
    stdin: Mutex<Option<ChildStdin>>,
    cancel: CancellationToken,
}

#[async_trait]
impl ProcessControl for LlamaProcess {
    fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(pid = ?self.pid, "Cancelling generation process");
        }
        self.cancel.cancel();
    }

    async fn nudge(&self) -> Result<(), ProcessError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ProcessError::NotRunning)?;

        let written = async {
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            // stdin is gone for good once a write fails
            guard.take();
            return Err(e.into());
        }
        debug!(pid = ?self.pid, "Nudged generation process");
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
