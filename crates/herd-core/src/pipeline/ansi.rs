//! Terminal control sequence stripping.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// CSI sequences such as `ESC[0m`, `ESC[1;32m` or `ESC[K`.
static ANSI_CSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap_or_else(|e| panic!("invalid ANSI regex: {e}"))
});

/// Remove ANSI colour and cursor codes from executable output.
pub fn strip_ansi_codes(text: &str) -> Cow<'_, str> {
    ANSI_CSI.replace_all(text, "")
}

/// Split `text` before a trailing escape sequence that is not terminated yet.
///
/// The second half is empty unless the text ends inside `ESC` or `ESC[...`.
pub(crate) fn split_unterminated_escape(text: &str) -> (&str, &str) {
    let Some(start) = text.rfind('\x1b') else {
        return (text, "");
    };
    let tail = &text[start + 1..];
    let unterminated = tail.is_empty()
        || tail.strip_prefix('[').is_some_and(|params| {
            params
                .chars()
                .all(|c| c.is_ascii_digit() || c == ';' || c == '?')
        });
    if unterminated {
        text.split_at(start)
    } else {
        (text, "")
    }
}
