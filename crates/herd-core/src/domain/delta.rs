//! Text deltas, finish reasons and token usage.

use serde::{Deserialize, Serialize};

/// Why a generation ended.
///
/// `None` in an `Option<FinishReason>` is the wire value `null`: the process
/// closed on its own, was preempted, or was cancelled after a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// A client stop sequence appeared in the output.
    Stop,
    /// The completion budget was used up.
    Length,
}

impl FinishReason {
    /// Wire name of the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
        }
    }
}

/// One incremental unit of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    pub content: String,
    pub is_final: bool,
    pub finish_reason: Option<FinishReason>,
}

impl TextDelta {
    /// A non-final delta carrying generated text.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    /// The terminal delta: always empty.
    pub const fn terminal(finish_reason: Option<FinishReason>) -> Self {
        Self {
            content: String::new(),
            is_final: true,
            finish_reason,
        }
    }
}

/// Token usage statistics (OpenAI shape).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_delta_is_empty() {
        let delta = TextDelta::terminal(Some(FinishReason::Stop));
        assert!(delta.is_final);
        assert!(delta.content.is_empty());
        assert_eq!(delta.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage::new(3, 4);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn test_finish_reason_names() {
        assert_eq!(FinishReason::Stop.as_str(), "stop");
        assert_eq!(FinishReason::Length.as_str(), "length");
    }
}
