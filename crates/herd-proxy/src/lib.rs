//! OpenAI-compatible HTTP front end for herd.
//!
//! Routes:
//!
//! - `POST /v1/completions` - `text_completion` objects
//! - `POST /v1/chat/completions` - `chat.completion(.chunk)` objects
//! - `GET /v1/models` - model files and aliases
//! - `GET /health` - liveness plus the supervisor's busy status
//!
//! Generation itself sits behind [`herd_core::GenerationPort`]; this crate
//! only parses requests and renders verdict streams as SSE or JSON.

#![deny(unsafe_code)]

pub mod models;
mod server;
mod stream;

pub use models::{CompletionRequest, ErrorResponse, ModelsResponse, StopSequences};
pub use server::{AppState, create_router, serve};
pub use stream::{ApiFlavor, ResponseContext};
