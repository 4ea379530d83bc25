//! Per-request state and process-wide supervisor status.

use serde::Serialize;

use super::GenerationId;

/// Snapshot of a request's mutable state.
///
/// Owned by the stop policy for the lifetime of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationState {
    /// `ceil(chars(prompt) / 4)`, computed once.
    pub prompt_token_estimate: u32,
    /// Accepted deltas so far; frozen once `stopped` is set.
    pub completion_token_count: u32,
    /// Text that is allowed to reach the client.
    pub accumulated_text: String,
    pub stopped: bool,
}

/// What the supervisor is doing right now.
///
/// Handed to status reporters (the `/health` route) instead of living in a
/// global flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStatus {
    /// True from the start of a request until it is done, failed or preempted.
    pub busy: bool,
    /// Generation currently owning the process slot.
    pub current: Option<GenerationId>,
}

impl GenerationStatus {
    /// Status with no generation in flight.
    pub const fn idle() -> Self {
        Self {
            busy: false,
            current: None,
        }
    }

    /// Status while `id` owns the slot.
    pub const fn running(id: GenerationId) -> Self {
        Self {
            busy: true,
            current: Some(id),
        }
    }
}
