//! Core domain types and port definitions for herd.
//!
//! This crate holds everything about a completion request that can be
//! expressed without a process, a socket or a clock:
//!
//! - `domain` - requests, deltas, usage and supervisor status
//! - `pipeline` - the echo filter, the stop & length policy and the two
//!   response transformers, all as plain state machines
//! - `ports` - traits the runtime and proxy adapters implement
//! - `settings` - configuration with defaults and validation

#![deny(unsafe_code)]

pub mod domain;
pub mod pipeline;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    FinishReason, GenerationId, GenerationRequest, GenerationState, GenerationStatus, TextDelta,
    Usage, estimate_prompt_tokens,
};
pub use pipeline::{
    Aggregate, AggregateTransformer, EchoFilter, EchoMode, PolicyState, StopPolicy, StreamItem,
    StreamingTransformer, Verdict, strip_ansi_codes,
};
pub use ports::{
    GenerationError, GenerationPort, GenerationStream, LaunchSpec, ModelEntry, ModelRegistryPort,
    ProcessControl, ProcessError, ProcessEvent, ProcessEventStream, ProcessLauncher,
    RegistryError, SpawnError, SpawnedProcess,
};
pub use settings::{
    DEFAULT_EXECUTABLE, DEFAULT_HOST, DEFAULT_MAX_STALL_NUDGES, DEFAULT_PORT,
    DEFAULT_STALL_TIMEOUT_SECS, DEFAULT_THREADS, Settings, SettingsError, parse_model_alias,
    validate_settings,
};
