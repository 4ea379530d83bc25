//! Scripted process launcher for tests.
//!
//! Each launch pops the next script off a queue and plays it back as a
//! process event stream. A cancelled process closes at its next step, the
//! way llama.cpp exits on SIGINT.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use herd_core::{
    LaunchSpec, ProcessControl, ProcessError, ProcessEvent, ProcessLauncher, SpawnError,
    SpawnedProcess,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One step of a scripted process.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Write a chunk to stdout.
    Chunk(Bytes),
    /// Fail reading stdout.
    Error(String),
    /// Produce nothing until nudged.
    Stall,
    /// Produce nothing until cancelled.
    Hang,
}

impl ScriptStep {
    pub fn chunk(text: &str) -> Self {
        Self::Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Echo of `prompt` the way llama.cpp prints it, followed by `tokens`.
pub fn echo_script(prompt: &str, tokens: &[&str]) -> Vec<ScriptStep> {
    std::iter::once(ScriptStep::chunk(&format!(" {prompt}")))
        .chain(tokens.iter().map(|t| ScriptStep::chunk(t)))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Control handle of a scripted process, with call counters.
#[derive(Debug, Default)]
pub struct ScriptedProcess {
    cancel: CancellationToken,
    nudged: Notify,
    cancels: AtomicU32,
    nudges: AtomicU32,
}

impl ScriptedProcess {
    pub fn cancel_count(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn nudge_count(&self) -> u32 {
        self.nudges.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
impl ProcessControl for ScriptedProcess {
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
    }

    async fn nudge(&self) -> Result<(), ProcessError> {
        if self.cancel.is_cancelled() {
            return Err(ProcessError::NotRunning);
        }
        self.nudges.fetch_add(1, Ordering::SeqCst);
        self.nudged.notify_one();
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

struct Playback {
    steps: VecDeque<ScriptStep>,
    process: Arc<ScriptedProcess>,
}

impl Playback {
    async fn next_event(&mut self) -> Option<ProcessEvent> {
        loop {
            if self.process.cancel.is_cancelled() {
                return None;
            }
            match self.steps.pop_front()? {
                ScriptStep::Chunk(bytes) => return Some(ProcessEvent::Data(bytes)),
                ScriptStep::Error(message) => return Some(ProcessEvent::Errored(message)),
                ScriptStep::Stall => {
                    tokio::select! {
                        () = self.process.nudged.notified() => {}
                        () = self.process.cancel.cancelled() => return None,
                    }
                }
                ScriptStep::Hang => {
                    self.process.cancel.cancelled().await;
                    return None;
                }
            }
        }
    }
}

/// Launcher that plays back queued scripts.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    launches: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<ScriptedProcess>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next launch.
    #[must_use]
    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        self.push_script(steps);
        self
    }

    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        lock(&self.scripts).push_back(steps);
    }

    /// Every launch spec seen, in order.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        lock(&self.launches).clone()
    }

    /// Control handles of every launched process, in order.
    pub fn processes(&self) -> Vec<Arc<ScriptedProcess>> {
        lock(&self.processes).clone()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<SpawnedProcess, SpawnError> {
        lock(&self.launches).push(spec.clone());
        // an empty queue behaves like a missing executable
        let steps = lock(&self.scripts)
            .pop_front()
            .ok_or_else(|| SpawnError::ExecutableNotFound(spec.executable.clone()))?;

        let process = Arc::new(ScriptedProcess::default());
        lock(&self.processes).push(Arc::clone(&process));

        let playback = Playback {
            steps: steps.into(),
            process: Arc::clone(&process),
        };
        // Closed is emitted once after the script ends or the process is cancelled
        let events = stream::unfold(Some(playback), |state| async move {
            let mut playback = state?;
            match playback.next_event().await {
                Some(event @ ProcessEvent::Errored(_)) => Some((event, None)),
                Some(event) => Some((event, Some(playback))),
                None => Some((ProcessEvent::Closed, None)),
            }
        });

        Ok(SpawnedProcess {
            control: process,
            events: Box::pin(events),
        })
    }
}
