//! Port definitions (trait abstractions) for the adapters.
//!
//! # Design Rules
//!
//! - No `tokio::process`, `nix` or axum types in any signature
//! - Process control expresses intent (cancel, nudge), not mechanism
//! - Every port is `Send + Sync + Debug` so it can sit behind `Arc<dyn _>`

pub mod generation;
pub mod model_registry;
pub mod process;

pub use generation::{GenerationError, GenerationPort, GenerationStream};
pub use model_registry::{ModelEntry, ModelRegistryPort, RegistryError};
pub use process::{
    LaunchSpec, ProcessControl, ProcessError, ProcessEvent, ProcessEventStream, ProcessLauncher,
    SpawnError, SpawnedProcess,
};
