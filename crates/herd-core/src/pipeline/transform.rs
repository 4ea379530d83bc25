//! Streaming and aggregate response transformers.
//!
//! Both consume the same [`Verdict`] sequence, so a given generation renders
//! the same text and finish reason either way.

use crate::domain::{FinishReason, TextDelta, Usage};

use super::policy::Verdict;

/// Output of the streaming transformer, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A content delta that is safe to send.
    Delta(TextDelta),
    /// The terminal delta.
    Final { delta: TextDelta, usage: Usage },
    /// End of stream marker (`[DONE]`).
    Done,
}

/// One-delta lookahead emitter.
///
/// A delta is held back until the next verdict shows it was not part of a
/// stop sequence.
#[derive(Debug, Default)]
pub struct StreamingTransformer {
    buffered: Option<TextDelta>,
    finished: bool,
}

impl StreamingTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one verdict; returns the items now ready to send.
    pub fn push(&mut self, verdict: Verdict) -> Vec<StreamItem> {
        if self.finished {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(3);
        match verdict {
            Verdict::Emit(delta) => {
                if let Some(previous) = self.buffered.replace(delta) {
                    out.push(StreamItem::Delta(previous));
                }
            }
            Verdict::Suppress { retract_previous } => {
                let previous = self.buffered.take();
                if let Some(previous) = previous.filter(|_| !retract_previous) {
                    out.push(StreamItem::Delta(previous));
                }
            }
            Verdict::Finish { delta, usage } => {
                if let Some(previous) = self.buffered.take() {
                    out.push(StreamItem::Delta(previous));
                }
                out.push(StreamItem::Final { delta, usage });
                out.push(StreamItem::Done);
                self.finished = true;
            }
        }
        out
    }
}

/// Result of an aggregate (non-streaming) generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub text: String,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

/// Collects accepted content into a single response.
#[derive(Debug, Default)]
pub struct AggregateTransformer {
    text: String,
    last_len: usize,
}

impl AggregateTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one verdict; returns the aggregate once the terminal verdict
    /// arrives.
    pub fn push(&mut self, verdict: Verdict) -> Option<Aggregate> {
        match verdict {
            Verdict::Emit(delta) => {
                self.last_len = delta.content.len();
                self.text.push_str(&delta.content);
                None
            }
            Verdict::Suppress { retract_previous } => {
                if retract_previous {
                    let keep = self.text.len().saturating_sub(self.last_len);
                    self.text.truncate(keep);
                }
                self.last_len = 0;
                None
            }
            Verdict::Finish { delta, usage } => Some(Aggregate {
                text: std::mem::take(&mut self.text),
                finish_reason: delta.finish_reason,
                usage,
            }),
        }
    }
}
