//! Axum HTTP server for the OpenAI-compatible API.
//!
//! `serve()` runs the router on a pre-bound `TcpListener` until the
//! cancellation token fires.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use herd_core::{GenerationPort, GenerationRequest, ModelRegistryPort};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{CompletionRequest, ErrorResponse, ModelsResponse};
use crate::stream::{ApiFlavor, ResponseContext, aggregate_response, sse_response};

/// Plain-text answer when a request's model cannot be resolved.
const MODEL_NOT_CONFIGURED: &str =
    "No model configured. Re-run herd with DEFAULT_MODEL set, or pass a model path as `model`.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Single-flight generation service.
    pub generation: Arc<dyn GenerationPort>,
    /// Model id resolution and listing.
    pub registry: Arc<dyn ModelRegistryPort>,
}

impl AppState {
    pub fn new(generation: Arc<dyn GenerationPort>, registry: Arc<dyn ModelRegistryPort>) -> Self {
        Self {
            generation,
            registry,
        }
    }
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/models", get(list_models))
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

/// Run the server with a pre-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("herd listening on {addr}");
    info!("Point OpenAI clients at: http://{addr}/v1");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("herd server shut down");
    Ok(())
}

/// Liveness plus the supervisor's busy status.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.generation.status();
    Json(serde_json::json!({
        "status": "ok",
        "busy": status.busy,
        "generation": status.current,
    }))
}

async fn list_models(State(state): State<AppState>) -> Response {
    debug!("GET /v1/models");

    match state.registry.list_models().await {
        Ok(entries) => Json(ModelsResponse::from_entries(entries)).into_response(),
        Err(e) => {
            error!("Failed to list models: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    format!("Failed to list models: {e}"),
                    "server_error",
                )),
            )
                .into_response()
        }
    }
}

async fn completions(State(state): State<AppState>, body: Bytes) -> Response {
    debug!("POST /v1/completions");
    handle_completion(&state, &body, ApiFlavor::Text).await
}

async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    debug!("POST /v1/chat/completions");
    handle_completion(&state, &body, ApiFlavor::Chat).await
}

async fn handle_completion(state: &AppState, body: &[u8], flavor: ApiFlavor) -> Response {
    let request: CompletionRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse request: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_request(format!(
                    "Invalid request body: {e}"
                ))),
            )
                .into_response();
        }
    };

    let Some(model_path) = state.registry.resolve_model_path(&request.model) else {
        warn!(model = %request.model, "No model path for request");
        return (StatusCode::INTERNAL_SERVER_ERROR, MODEL_NOT_CONFIGURED).into_response();
    };

    let Some(prompt) = request.prompt_text() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::invalid_request(
                "Request needs a `prompt` or `messages`",
            )),
        )
            .into_response();
    };

    info!(
        model = %request.model,
        model_path = %model_path.display(),
        streaming = request.stream,
        max_tokens = ?request.max_tokens,
        "Processing completion request"
    );

    let generation_request = GenerationRequest::new(prompt, model_path)
        .with_stop_sequences(request.stop_sequences())
        .with_max_tokens(request.max_tokens)
        .with_model_args(request.sampling_args())
        .streaming(request.stream);

    let generation = match state.generation.start(generation_request).await {
        Ok(generation) => generation,
        Err(e) => {
            error!("Failed to start generation: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::from(&e)),
            )
                .into_response();
        }
    };

    let ctx = ResponseContext::new(request.model, flavor);
    debug!(id = %ctx.id(), generation = %generation.id(), "Generation started");

    if request.stream {
        sse_response(ctx, generation)
    } else {
        aggregate_response(ctx, generation).await
    }
}
