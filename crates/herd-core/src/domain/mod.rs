//! Domain types for a single completion request.

mod delta;
mod request;
mod status;
mod tokens;

pub use delta::{FinishReason, TextDelta, Usage};
pub use request::{GenerationId, GenerationRequest};
pub use status::{GenerationState, GenerationStatus};
pub use tokens::estimate_prompt_tokens;
