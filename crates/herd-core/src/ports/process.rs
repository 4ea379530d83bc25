//! Process adapter port.
//!
//! A launched executable is split into two halves: a control handle that
//! the supervisor keeps (cancel, nudge) and a tagged event stream that the
//! generation driver consumes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// One event from a running executable.
///
/// `Closed` and `Errored` are terminal; nothing follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout, exactly as read.
    Data(Bytes),
    /// stdout reached end of file.
    Closed,
    /// Reading stdout failed.
    Errored(String),
}

/// Event stream of one launched process.
pub type ProcessEventStream = Pin<Box<dyn Stream<Item = ProcessEvent> + Send>>;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to spawn.
    pub executable: PathBuf,
    /// Model file, checked before spawning.
    pub model_path: PathBuf,
    /// Full argument list (already includes `-m <model_path>`).
    pub args: Vec<String>,
}

/// Control half of a launched process.
#[async_trait]
pub trait ProcessControl: Send + Sync + fmt::Debug {
    /// Ask the process to terminate.
    ///
    /// Fire-and-forget: returns immediately and may be called any number
    /// of times.
    fn cancel(&self);

    /// Write a single newline to the process's stdin.
    async fn nudge(&self) -> Result<(), ProcessError>;

    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32>;
}

/// A freshly launched process.
pub struct SpawnedProcess {
    pub control: Arc<dyn ProcessControl>,
    pub events: ProcessEventStream,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

/// Launches generation executables.
#[async_trait]
pub trait ProcessLauncher: Send + Sync + fmt::Debug {
    async fn launch(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, SpawnError>;
}

/// The executable could not be started. Never retried.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Executable not found or not readable: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Model file not found or not readable: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Failed to spawn {}: {source}", .executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors talking to a running process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process already exited or its stdin is gone.
    #[error("Process not running")]
    NotRunning,

    #[error("Process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
