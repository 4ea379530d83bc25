//! Prompt echo suppression.
//!
//! llama.cpp prints the prompt (with a leading space) before the first
//! generated token. Everything up to the end of that echo is swallowed;
//! everything after it is generated text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ansi::{split_unterminated_escape, strip_ansi_codes};

/// How the end of the prompt echo is recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoMode {
    /// Accumulated output must equal `" " + prompt` exactly.
    Strict,
    /// Whitespace-insensitive prefix match; text following the echo in the
    /// same chunk is kept.
    #[default]
    Tolerant,
    /// The executable does not echo; forward everything.
    Bypass,
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Tolerant => "tolerant",
            Self::Bypass => "bypass",
        })
    }
}

/// Error parsing an [`EchoMode`].
#[derive(Debug, Error)]
#[error("unknown echo mode '{0}' (expected strict, tolerant or bypass)")]
pub struct ParseEchoModeError(String);

impl FromStr for EchoMode {
    type Err = ParseEchoModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "tolerant" => Ok(Self::Tolerant),
            "bypass" | "off" | "none" => Ok(Self::Bypass),
            _ => Err(ParseEchoModeError(s.to_string())),
        }
    }
}

/// Outcome of matching accumulated output against the prompt.
#[derive(Debug, PartialEq, Eq)]
enum EchoMatch {
    /// The echo ends at this byte offset.
    Complete(usize),
    /// Consistent so far, needs more output.
    Partial,
    /// Output cannot be the echo.
    Diverged,
}

/// Incremental UTF-8 decoder that holds back split multi-byte sequences.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // incomplete trailing sequence: keep it for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }
}

/// Swallows the prompt echo and passes generated text through.
#[derive(Debug)]
pub struct EchoFilter {
    prompt: String,
    mode: EchoMode,
    decoder: Utf8Decoder,
    /// Escape sequence cut off at the end of the last chunk.
    held_escape: String,
    seen: String,
    passed: bool,
    diverged: bool,
}

impl EchoFilter {
    pub fn new(prompt: &str, mode: EchoMode) -> Self {
        Self {
            prompt: prompt.to_string(),
            mode,
            decoder: Utf8Decoder::default(),
            held_escape: String::new(),
            seen: String::new(),
            passed: mode == EchoMode::Bypass,
            diverged: false,
        }
    }

    /// True once the echo has been consumed.
    pub const fn echo_complete(&self) -> bool {
        self.passed
    }

    /// True when the output can no longer turn into the echo.
    ///
    /// Nothing is ever forwarded in this state.
    pub const fn diverged(&self) -> bool {
        self.diverged
    }

    /// Feed one raw chunk; returns the visible text it contributes, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        let mut decoded = std::mem::take(&mut self.held_escape);
        decoded.push_str(&self.decoder.decode(chunk));
        let (ready, held) = split_unterminated_escape(&decoded);
        self.held_escape = held.to_string();
        let text = strip_ansi_codes(ready);

        if self.passed {
            return (!text.is_empty()).then(|| text.into_owned());
        }
        if self.diverged {
            return None;
        }

        match self.mode {
            EchoMode::Strict => {
                // the chunk completing the echo is swallowed whole
                self.seen.push_str(&text);
                let expected_len = self.prompt.len() + 1;
                if self.seen.len() == expected_len
                    && self.seen.starts_with(' ')
                    && self.seen[1..] == self.prompt
                {
                    self.passed = true;
                    self.seen.clear();
                } else if self.seen.len() >= expected_len {
                    self.diverged = true;
                }
                None
            }
            EchoMode::Tolerant => {
                self.seen.push_str(&text);
                match match_echo(&self.seen, &self.prompt) {
                    EchoMatch::Complete(end) => {
                        self.passed = true;
                        let rest = self.seen.split_off(end);
                        self.seen.clear();
                        (!rest.is_empty()).then_some(rest)
                    }
                    EchoMatch::Partial => None,
                    EchoMatch::Diverged => {
                        self.diverged = true;
                        self.seen.clear();
                        None
                    }
                }
            }
            EchoMode::Bypass => (!text.is_empty()).then(|| text.into_owned()),
        }
    }
}

/// Match `raw` against the prompt, ignoring whitespace differences.
///
/// Every non-whitespace character of the prompt must appear in order, with
/// only whitespace in between. Trailing whitespace of the prompt is consumed
/// from `raw` when present.
fn match_echo(raw: &str, prompt: &str) -> EchoMatch {
    let mut chars = raw.char_indices().peekable();

    for expected in prompt.chars().filter(|c| !c.is_whitespace()) {
        let found = loop {
            match chars.next() {
                None => return EchoMatch::Partial,
                Some((_, c)) if c.is_whitespace() => {}
                Some((_, c)) => break c,
            }
        };
        if found != expected {
            return EchoMatch::Diverged;
        }
    }

    let trailing = prompt.chars().rev().take_while(|c| c.is_whitespace()).count();
    for _ in 0..trailing {
        match chars.peek() {
            None => return EchoMatch::Partial,
            Some((_, c)) if c.is_whitespace() => {
                chars.next();
            }
            Some(_) => break,
        }
    }

    EchoMatch::Complete(chars.peek().map_or(raw.len(), |(i, _)| *i))
}
