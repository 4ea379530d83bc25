//! Generation request and identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Monotonic identity of one generation.
///
/// Assigned by the supervisor when a request starts. Events that arrive
/// for an id that is no longer current belong to a superseded process and
/// are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// A completion request as the pipeline sees it.
///
/// Built once by the HTTP layer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Prompt passed to the executable with `-p`.
    pub prompt: String,
    /// Client-supplied stop sequences, in request order.
    pub stop_sequences: Vec<String>,
    /// Completion budget in deltas (see [`crate::domain::estimate_prompt_tokens`]).
    pub max_tokens: Option<u32>,
    /// Resolved model file handed to the executable with `-m`.
    pub model_path: PathBuf,
    /// Sampling/generation flags, already in command-line form.
    pub model_args: Vec<String>,
    /// Whether the client asked for a streamed response.
    pub streaming: bool,
}

impl GenerationRequest {
    /// Create a request with no stops, no budget and no extra arguments.
    pub fn new(prompt: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            stop_sequences: Vec::new(),
            max_tokens: None,
            model_path: model_path.into(),
            model_args: Vec::new(),
            streaming: false,
        }
    }

    /// Set the stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.stop_sequences = stops;
        self
    }

    /// Set the completion budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling arguments.
    #[must_use]
    pub fn with_model_args(mut self, args: Vec<String>) -> Self {
        self.model_args = args;
        self
    }

    /// Mark the request as streaming or aggregate.
    #[must_use]
    pub const fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Stop sequences that can actually match.
    ///
    /// An empty string is contained in every delta, so it is ignored.
    pub fn effective_stop_sequences(&self) -> impl Iterator<Item = &str> {
        self.stop_sequences
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}
