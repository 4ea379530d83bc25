//! OpenAI API request/response models.
//!
//! Only the fields herd acts on are parsed; anything else in a request body
//! is ignored.

use herd_core::{FinishReason, GenerationError, SpawnError, Usage};
use serde::{Deserialize, Serialize};

/// Body of `/v1/completions` and `/v1/chat/completions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionRequest {
    /// Model id, alias or literal path.
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub prompt: Option<String>,

    /// Chat history, flattened into a prompt when `prompt` is absent.
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub stop: Option<StopSequences>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    #[serde(default)]
    pub top_k: Option<u32>,

    #[serde(default)]
    pub repeat_penalty: Option<f32>,

    #[serde(default)]
    pub seed: Option<i64>,
}

/// `stop` may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop],
            Self::Many(stops) => stops,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl CompletionRequest {
    /// Text handed to the executable.
    ///
    /// `prompt` wins; otherwise messages become `role: content` lines.
    pub fn prompt_text(&self) -> Option<String> {
        if let Some(prompt) = &self.prompt {
            return Some(prompt.clone());
        }
        let messages = self.messages.as_ref().filter(|m| !m.is_empty())?;
        Some(
            messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_deref().unwrap_or("assistant"), m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn stop_sequences(&self) -> Vec<String> {
        self.stop.clone().map(StopSequences::into_vec).unwrap_or_default()
    }

    /// Sampling parameters as llama.cpp flags.
    pub fn sampling_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value);
            }
        };
        push("--temp", self.temperature.map(|v| v.to_string()));
        push("--top-p", self.top_p.map(|v| v.to_string()));
        push("--top-k", self.top_k.map(|v| v.to_string()));
        push("--repeat-penalty", self.repeat_penalty.map(|v| v.to_string()));
        push("--seed", self.seed.map(|v| v.to_string()));
        args
    }
}

/// Empty logprobs block clients expect on text completions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Logprobs {
    pub text_offset: Vec<u32>,
    pub token_logprobs: Vec<f32>,
    pub tokens: Vec<String>,
    pub top_logprobs: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChoice {
    pub text: String,
    pub index: u32,
    pub logprobs: Logprobs,
    pub finish_reason: Option<FinishReason>,
}

/// `text_completion` object, streamed or whole.
#[derive(Debug, Clone, Serialize)]
pub struct TextCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Assistant content; empty on the terminal chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatContent {
    pub fn assistant(content: &str) -> Self {
        if content.is_empty() {
            return Self::default();
        }
        Self {
            role: Some("assistant"),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChatContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatContent>,
    pub finish_reason: Option<FinishReason>,
}

/// `chat.completion` (whole) or `chat.completion.chunk` (streamed).
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// `OpenAI` models list response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub owned_by: &'static str,
    pub permission: Vec<serde_json::Value>,
}

impl ModelsResponse {
    pub fn from_entries(entries: Vec<herd_core::ModelEntry>) -> Self {
        Self {
            object: "list",
            data: entries
                .into_iter()
                .map(|entry| ModelInfo {
                    id: entry.id,
                    object: "model",
                    owned_by: "user",
                    permission: Vec::new(),
                })
                .collect(),
        }
    }
}

/// `OpenAI` error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: None,
            },
        }
    }

    pub fn with_code(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: Some(code.into()),
            },
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }
}

impl From<&GenerationError> for ErrorResponse {
    fn from(err: &GenerationError) -> Self {
        match err {
            GenerationError::Spawn(SpawnError::ModelNotFound(_)) => {
                Self::with_code(err.to_string(), "invalid_request_error", "model_file_not_found")
            }
            GenerationError::Spawn(_) => Self::with_code(err.to_string(), "server_error", "spawn_failed"),
            GenerationError::Process(_) => {
                Self::with_code(err.to_string(), "server_error", "generation_failed")
            }
            GenerationError::Internal(_) => Self::new(err.to_string(), "server_error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stop_accepts_string_or_list() {
        let one: CompletionRequest =
            serde_json::from_str(r#"{"prompt":"hi","stop":"User:"}"#).unwrap();
        assert_eq!(one.stop_sequences(), vec!["User:"]);

        let many: CompletionRequest =
            serde_json::from_str(r#"{"prompt":"hi","stop":["a","b"]}"#).unwrap();
        assert_eq!(many.stop_sequences(), vec!["a", "b"]);

        let none: CompletionRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert!(none.stop_sequences().is_empty());
        assert!(!none.stream);
    }

    #[test]
    fn test_messages_flatten_to_prompt() {
        let request: CompletionRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"Hi"},{"content":"Hello!"}]}"#,
        )
        .unwrap();
        assert_eq!(
            request.prompt_text().as_deref(),
            Some("user: Hi\nassistant: Hello!")
        );
    }

    #[test]
    fn test_missing_prompt() {
        let request: CompletionRequest = serde_json::from_str(r#"{"model":"x"}"#).unwrap();
        assert_eq!(request.prompt_text(), None);
    }

    #[test]
    fn test_sampling_args() {
        let request = CompletionRequest {
            temperature: Some(0.5),
            top_k: Some(40),
            seed: Some(-1),
            ..Default::default()
        };
        assert_eq!(
            request.sampling_args(),
            vec!["--temp", "0.5", "--top-k", "40", "--seed", "-1"]
        );
    }

    #[test]
    fn test_finish_reason_serializes_null() {
        let choice = TextChoice {
            text: String::new(),
            index: 0,
            logprobs: Logprobs::default(),
            finish_reason: None,
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert!(json["finish_reason"].is_null());
        assert_eq!(json["logprobs"]["tokens"], serde_json::json!([]));
    }

    #[test]
    fn test_chat_content_empty_on_terminal() {
        let json = serde_json::to_value(ChatContent::assistant("")).unwrap();
        assert_eq!(json, serde_json::json!({}));
        let json = serde_json::to_value(ChatContent::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_error_response_from_spawn_error() {
        let err = GenerationError::Spawn(SpawnError::ModelNotFound(PathBuf::from("/m.bin")));
        let response = ErrorResponse::from(&err);
        assert_eq!(response.error.code.as_deref(), Some("model_file_not_found"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["type"], "invalid_request_error");
    }
}
