//! Single-flight generation supervisor.
//!
//! The supervisor owns the one process slot. Starting a generation cancels
//! whatever holds the slot (without waiting), launches a new process and
//! spawns a driver task for it. Each generation carries a monotonic
//! [`GenerationId`]; a driver that finishes after it was superseded finds a
//! different id in the slot and leaves it alone.
//!
//! Busy status lives in a `watch` channel owned here and handed to status
//! reporters through [`GenerationSupervisor::status`] and
//! [`GenerationSupervisor::subscribe`].

use async_trait::async_trait;
use herd_core::{
    EchoMode, GenerationError, GenerationId, GenerationPort, GenerationRequest, GenerationStatus,
    GenerationStream, ProcessControl, ProcessLauncher, Settings,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::generation::{Drive, DriveOutcome};
use crate::invocation::LlamaInvocation;
use crate::watchdog::StallPolicy;

/// Buffered verdicts between a driver and its HTTP response.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Generation executable.
    pub executable: PathBuf,
    pub threads: u32,
    pub ctx_size: Option<u32>,
    pub echo_mode: EchoMode,
    pub stall: StallPolicy,
    pub channel_capacity: usize,
}

impl SupervisorConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            threads: herd_core::DEFAULT_THREADS,
            ctx_size: None,
            echo_mode: EchoMode::default(),
            stall: StallPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            executable: settings.executable_path(),
            threads: settings.threads,
            ctx_size: settings.ctx_size,
            echo_mode: settings.echo_mode,
            stall: StallPolicy::from_settings(settings),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// The generation currently holding the slot.
struct ActiveGeneration {
    id: GenerationId,
    control: Arc<dyn ProcessControl>,
    preempt: CancellationToken,
}

struct Inner {
    config: SupervisorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    slot: Mutex<Option<ActiveGeneration>>,
    next_id: AtomicU64,
    status: watch::Sender<GenerationStatus>,
}

impl Inner {
    /// Free the slot if `id` still owns it.
    async fn release(&self, id: GenerationId, outcome: DriveOutcome) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|active| active.id == id) {
            slot.take();
            self.status.send_replace(GenerationStatus::idle());
            debug!(generation = %id, ?outcome, "Generation released slot");
        } else {
            debug!(generation = %id, ?outcome, "Ignoring release from superseded generation");
        }
    }
}

/// Process-wide single-flight coordinator.
#[derive(Clone)]
pub struct GenerationSupervisor {
    inner: Arc<Inner>,
}

impl fmt::Debug for GenerationSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationSupervisor")
            .field("config", &self.inner.config)
            .field("launcher", &self.inner.launcher)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl GenerationSupervisor {
    pub fn new(config: SupervisorConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let (status, _) = watch::channel(GenerationStatus::idle());
        Self {
            inner: Arc::new(Inner {
                config,
                launcher,
                slot: Mutex::new(None),
                next_id: AtomicU64::new(0),
                status,
            }),
        }
    }

    /// Start a generation, preempting the one in flight.
    ///
    /// The slot lock is held across the launch, so concurrent starts are
    /// serialized in arrival order and the last one wins.
    pub async fn start(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, GenerationError> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!(generation = %previous.id, "Preempting in-flight generation");
            previous.preempt.cancel();
            previous.control.cancel();
        }

        let id = GenerationId(inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        inner.status.send_replace(GenerationStatus::running(id));
        info!(
            generation = %id,
            streaming = request.streaming,
            max_tokens = ?request.max_tokens,
            stops = request.stop_sequences.len(),
            "Generation request received"
        );

        let spec = LlamaInvocation::new(
            &inner.config.executable,
            &request.model_path,
            request.prompt.as_str(),
        )
        .threads(inner.config.threads)
        .ctx_size(inner.config.ctx_size)
        .model_args(request.model_args.iter().cloned())
        .reverse_prompts(request.effective_stop_sequences())
        .build();

        let spawned = match inner.launcher.launch(&spec).await {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(generation = %id, error = %e, "Failed to launch generation process");
                inner.status.send_replace(GenerationStatus::idle());
                return Err(e.into());
            }
        };

        let preempt = CancellationToken::new();
        *slot = Some(ActiveGeneration {
            id,
            control: Arc::clone(&spawned.control),
            preempt: preempt.clone(),
        });
        drop(slot);

        let (tx, rx) = mpsc::channel(inner.config.channel_capacity.max(1));
        let drive = Drive {
            id,
            request,
            echo_mode: inner.config.echo_mode,
            stall: inner.config.stall,
            control: spawned.control,
            events: spawned.events,
            preempt,
            tx,
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = drive.run().await;
            inner.release(id, outcome).await;
        });

        Ok(GenerationStream::new(id, rx))
    }

    /// Current busy status.
    pub fn status(&self) -> GenerationStatus {
        *self.inner.status.borrow()
    }

    /// Watch busy status changes.
    pub fn subscribe(&self) -> watch::Receiver<GenerationStatus> {
        self.inner.status.subscribe()
    }

    /// Cancel whatever is in flight and leave the slot empty.
    pub async fn shutdown(&self) {
        let mut slot = self.inner.slot.lock().await;
        if let Some(active) = slot.take() {
            info!(generation = %active.id, "Stopping generation for shutdown");
            active.preempt.cancel();
            active.control.cancel();
        }
        self.inner.status.send_replace(GenerationStatus::idle());
    }
}

#[async_trait]
impl GenerationPort for GenerationSupervisor {
    async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, GenerationError> {
        Self::start(self, request).await
    }

    fn status(&self) -> GenerationStatus {
        Self::status(self)
    }
}
