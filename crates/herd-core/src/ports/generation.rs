//! Generation port: what the HTTP layer asks of the supervisor.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use super::process::SpawnError;
use crate::domain::{GenerationId, GenerationRequest, GenerationStatus};
use crate::pipeline::Verdict;

/// Errors ending a generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The executable could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The running process failed.
    #[error("Generation process failed: {0}")]
    Process(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Verdict stream of one started generation.
///
/// Ends after a [`Verdict::Finish`] or an error. Dropping it tells the
/// supervisor the client went away.
#[derive(Debug)]
pub struct GenerationStream {
    id: GenerationId,
    receiver: mpsc::Receiver<Result<Verdict, GenerationError>>,
}

impl GenerationStream {
    pub const fn new(
        id: GenerationId,
        receiver: mpsc::Receiver<Result<Verdict, GenerationError>>,
    ) -> Self {
        Self { id, receiver }
    }

    pub const fn id(&self) -> GenerationId {
        self.id
    }

    /// Next verdict, or `None` once the generation is over.
    pub async fn recv(&mut self) -> Option<Result<Verdict, GenerationError>> {
        self.receiver.recv().await
    }
}

/// Single-flight generation service.
#[async_trait]
pub trait GenerationPort: Send + Sync + fmt::Debug {
    /// Start a generation, preempting whatever is in flight.
    async fn start(&self, request: GenerationRequest) -> Result<GenerationStream, GenerationError>;

    /// Current busy status.
    fn status(&self) -> GenerationStatus;
}
