//! Rendering verdict streams as SSE or a single JSON body.

use std::collections::VecDeque;
use std::convert::Infallible;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream;
use herd_core::{
    Aggregate, AggregateTransformer, FinishReason, GenerationStream, StreamItem,
    StreamingTransformer, Usage,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{
    ChatChoice, ChatCompletionResponse, ChatContent, ErrorResponse, Logprobs, TextChoice,
    TextCompletionResponse,
};

/// Which `OpenAI` object family a route speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `/v1/completions`
    Text,
    /// `/v1/chat/completions`
    Chat,
}

/// Fields shared by every object of one response.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    id: String,
    created: i64,
    model: String,
    flavor: ApiFlavor,
}

impl ResponseContext {
    pub fn new(model: impl Into<String>, flavor: ApiFlavor) -> Self {
        Self {
            id: format!("cmpl-{}", Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            flavor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// One completion object as JSON.
    ///
    /// `streaming` picks `delta` over `message` for chat and the `.chunk`
    /// object name.
    pub fn render(
        &self,
        content: &str,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
        streaming: bool,
    ) -> serde_json::Result<String> {
        match self.flavor {
            ApiFlavor::Text => serde_json::to_string(&TextCompletionResponse {
                id: self.id.clone(),
                object: "text_completion",
                created: self.created,
                model: self.model.clone(),
                choices: vec![TextChoice {
                    text: content.to_string(),
                    index: 0,
                    logprobs: Logprobs::default(),
                    finish_reason,
                }],
                usage,
            }),
            ApiFlavor::Chat => {
                let body = ChatContent::assistant(content);
                let (delta, message, object) = if streaming {
                    (Some(body), None, "chat.completion.chunk")
                } else {
                    (None, Some(body), "chat.completion")
                };
                serde_json::to_string(&ChatCompletionResponse {
                    id: self.id.clone(),
                    object,
                    created: self.created,
                    model: self.model.clone(),
                    choices: vec![ChatChoice {
                        index: 0,
                        delta,
                        message,
                        finish_reason,
                    }],
                    usage,
                })
            }
        }
    }

    fn event(&self, item: &StreamItem) -> Event {
        let rendered = match item {
            StreamItem::Delta(delta) => self.render(&delta.content, None, None, true),
            StreamItem::Final { delta, usage } => {
                self.render(&delta.content, delta.finish_reason, Some(*usage), true)
            }
            StreamItem::Done => return data_event("[DONE]"),
        };
        match rendered {
            Ok(json) => data_event(&json),
            Err(e) => {
                error!(error = %e, "Failed to serialize completion chunk");
                error_event(&ErrorResponse::new(e.to_string(), "server_error"))
            }
        }
    }
}

fn data_event(data: &str) -> Event {
    Event::default().event("data").data(data)
}

fn error_event(error: &ErrorResponse) -> Event {
    let json = serde_json::to_string(error).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("error").data(json)
}

struct SseState {
    ctx: ResponseContext,
    generation: GenerationStream,
    transformer: StreamingTransformer,
    pending: VecDeque<Event>,
    done: bool,
}

/// Stream a generation as server-sent events.
///
/// Every event is `event: data`; the last one carries `[DONE]`. Dropping the
/// response body drops the generation stream, which cancels the process.
pub fn sse_response(ctx: ResponseContext, generation: GenerationStream) -> Response {
    let state = SseState {
        ctx,
        generation,
        transformer: StreamingTransformer::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let events = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok::<_, Infallible>(event), st));
            }
            if st.done {
                return None;
            }
            match st.generation.recv().await {
                Some(Ok(verdict)) => {
                    for item in st.transformer.push(verdict) {
                        st.pending.push_back(st.ctx.event(&item));
                    }
                    st.done = st.transformer.is_finished();
                }
                Some(Err(e)) => {
                    error!(id = %st.ctx.id, error = %e, "Generation failed mid-stream");
                    st.pending.push_back(error_event(&ErrorResponse::from(&e)));
                    st.pending.push_back(data_event("[DONE]"));
                    st.done = true;
                }
                None => {
                    debug!(id = %st.ctx.id, "Generation stream ended without a terminal verdict");
                    st.pending.push_back(data_event("[DONE]"));
                    st.done = true;
                }
            }
        }
    });

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Wait for the generation to finish and answer with one JSON object.
pub async fn aggregate_response(ctx: ResponseContext, mut generation: GenerationStream) -> Response {
    let mut transformer = AggregateTransformer::new();

    while let Some(item) = generation.recv().await {
        match item {
            Ok(verdict) => {
                if let Some(aggregate) = transformer.push(verdict) {
                    return render_aggregate(&ctx, &aggregate);
                }
            }
            Err(e) => {
                error!(id = %ctx.id, error = %e, "Generation failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::from(&e)),
                )
                    .into_response();
            }
        }
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            "Generation ended without a result",
            "server_error",
        )),
    )
        .into_response()
}

fn render_aggregate(ctx: &ResponseContext, aggregate: &Aggregate) -> Response {
    match ctx.render(
        &aggregate.text,
        aggregate.finish_reason,
        Some(aggregate.usage),
        false,
    ) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string(), "server_error")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunk_shape() {
        let ctx = ResponseContext::new("gpt-3.5-turbo", ApiFlavor::Text);
        let json: serde_json::Value =
            serde_json::from_str(&ctx.render(" world", None, None, true).unwrap()).unwrap();

        assert_eq!(json["object"], "text_completion");
        assert_eq!(json["choices"][0]["text"], " world");
        assert!(json["choices"][0]["finish_reason"].is_null());
        assert!(json.get("usage").is_none());
        assert!(json["id"].as_str().unwrap().starts_with("cmpl-"));
    }

    #[test]
    fn chat_terminal_chunk_has_empty_delta_and_usage() {
        let ctx = ResponseContext::new("m", ApiFlavor::Chat);
        let json: serde_json::Value = serde_json::from_str(
            &ctx.render("", Some(FinishReason::Stop), Some(Usage::new(2, 3)), true)
                .unwrap(),
        )
        .unwrap();

        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["usage"]["total_tokens"], 5);
    }

    #[test]
    fn chat_aggregate_uses_message() {
        let ctx = ResponseContext::new("m", ApiFlavor::Chat);
        let json: serde_json::Value = serde_json::from_str(
            &ctx.render("Hi there", Some(FinishReason::Length), Some(Usage::new(1, 2)), false)
                .unwrap(),
        )
        .unwrap();

        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["choices"][0]["message"]["content"], "Hi there");
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert!(json["choices"][0].get("delta").is_none());
        assert_eq!(json["choices"][0]["finish_reason"], "length");
    }
}
