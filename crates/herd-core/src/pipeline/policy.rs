//! Stop-sequence and token-budget policy.

use crate::domain::{
    FinishReason, GenerationRequest, GenerationState, TextDelta, Usage, estimate_prompt_tokens,
};

/// Lifecycle of one request's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Deltas are being accepted.
    Accumulating,
    /// A stop or length condition latched; waiting for the process to close.
    Stopping,
    /// The terminal delta has been produced.
    Done,
}

/// Decision for one visible delta, consumed by the response transformers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Accept the delta.
    Emit(TextDelta),
    /// Drop the delta. With `retract_previous`, the previously emitted delta
    /// was part of a stop match and must be dropped as well.
    Suppress { retract_previous: bool },
    /// Terminal delta with the final usage numbers.
    Finish { delta: TextDelta, usage: Usage },
}

/// Decides per delta whether generation continues.
///
/// Stop sequences are tested against a two-delta window: the current delta,
/// the previous accepted delta and their concatenation. A stop sequence
/// spread over three or more deltas is not detected.
#[derive(Debug)]
pub struct StopPolicy {
    stops: Vec<String>,
    max_tokens: Option<u32>,
    previous: Option<String>,
    state: PolicyState,
    latched: Option<FinishReason>,
    generation: GenerationState,
}

impl StopPolicy {
    pub fn new(request: &GenerationRequest) -> Self {
        Self {
            stops: request
                .effective_stop_sequences()
                .map(str::to_string)
                .collect(),
            max_tokens: request.max_tokens,
            previous: None,
            state: PolicyState::Accumulating,
            latched: None,
            generation: GenerationState {
                prompt_token_estimate: estimate_prompt_tokens(&request.prompt),
                ..GenerationState::default()
            },
        }
    }

    pub const fn state(&self) -> PolicyState {
        self.state
    }

    /// True once a stop or length condition has latched.
    pub const fn is_stopped(&self) -> bool {
        self.generation.stopped
    }

    /// Reason latched so far, if any.
    pub const fn latched(&self) -> Option<FinishReason> {
        self.latched
    }

    pub const fn completion_tokens(&self) -> u32 {
        self.generation.completion_token_count
    }

    /// Evaluate one visible delta.
    ///
    /// Returns `None` once the policy has left `Accumulating`; such deltas
    /// are dropped.
    pub fn evaluate(&mut self, text: &str) -> Option<Verdict> {
        if self.state != PolicyState::Accumulating {
            return None;
        }

        // a match starting inside the previous delta wins over one wholly in `text`
        if let Some(previous) = self.previous.take() {
            let joined = format!("{previous}{text}");
            if self
                .earliest_stop(&joined)
                .is_some_and(|start| start < previous.len())
            {
                self.retract(&previous);
                self.latch(FinishReason::Stop);
                return Some(Verdict::Suppress {
                    retract_previous: true,
                });
            }
        }

        if self.earliest_stop(text).is_some() {
            self.latch(FinishReason::Stop);
            return Some(Verdict::Suppress {
                retract_previous: false,
            });
        }

        if self.budget_exhausted() {
            self.latch(FinishReason::Length);
            return Some(Verdict::Suppress {
                retract_previous: false,
            });
        }

        self.generation.completion_token_count += 1;
        self.generation.accumulated_text.push_str(text);
        self.previous = Some(text.to_string());

        if self.budget_exhausted() {
            self.latch(FinishReason::Length);
        }
        Some(Verdict::Emit(TextDelta::content(text)))
    }

    /// Produce the terminal verdict. Returns `None` if already done.
    pub fn finish(&mut self) -> Option<Verdict> {
        if self.state == PolicyState::Done {
            return None;
        }
        self.state = PolicyState::Done;
        self.previous = None;
        Some(Verdict::Finish {
            delta: TextDelta::terminal(self.latched),
            usage: Usage::new(
                self.generation.prompt_token_estimate,
                self.generation.completion_token_count,
            ),
        })
    }

    /// Byte offset of the first stop match in `text`.
    fn earliest_stop(&self, text: &str) -> Option<usize> {
        self.stops
            .iter()
            .filter_map(|stop| text.find(stop.as_str()))
            .min()
    }

    fn budget_exhausted(&self) -> bool {
        self.max_tokens
            .is_some_and(|max| self.generation.completion_token_count >= max)
    }

    fn retract(&mut self, previous: &str) {
        let text = &mut self.generation.accumulated_text;
        let keep = text.len().saturating_sub(previous.len());
        text.truncate(keep);
        self.generation.completion_token_count =
            self.generation.completion_token_count.saturating_sub(1);
    }

    fn latch(&mut self, reason: FinishReason) {
        self.latched = Some(reason);
        self.generation.stopped = true;
        self.state = PolicyState::Stopping;
        tracing::debug!(
            reason = reason.as_str(),
            completion_tokens = self.generation.completion_token_count,
            "Generation stop latched"
        );
    }
}
