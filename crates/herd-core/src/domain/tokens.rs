//! Approximate token accounting.
//!
//! herd never runs a tokenizer. Prompt tokens are estimated at four
//! characters per token, and every accepted delta counts as one completion
//! token. The numbers drive `max_tokens` cutoff and the `usage` block; they
//! are not a faithful token count.

/// Characters per token used by the prompt estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate prompt tokens as `ceil(chars / 4)`.
pub fn estimate_prompt_tokens(prompt: &str) -> u32 {
    let chars = prompt.chars().count();
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}
