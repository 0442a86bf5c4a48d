//! A small tokenizer utility: lowercase, map punctuation to whitespace,
//! split on whitespace, and strip leading zeros from purely-numeric
//! tokens. This lives outside the correlation core proper (the engine only
//! ever sees keys, not strings) but is shipped alongside it because
//! datasets built from free text are the engine's most common input shape.

/// The default punctuation set mapped to whitespace before splitting.
pub const DEFAULT_PUNCTUATION: &str = "?!@#$%^&*:,<>{}[]\\|_-";

/// Tokenize `input` into a list of keys: lowercase, replace every
/// character in `punctuation` with a space, split on whitespace, and strip
/// leading zeros from tokens made up entirely of ASCII digits (`"007"` →
/// `"7"`; `"000"` → `""`, matching the all-zero edge case of stripping
/// every digit).
///
/// Idempotent: tokenizing the output of `str_to_keys` again (joined by a
/// single space) yields the same tokens, since lowercasing, punctuation
/// removal, and leading-zero stripping are all already-fixed-point
/// transforms.
#[must_use]
pub fn str_to_keys(input: &str, punctuation: &str) -> Vec<String> {
    let lowered = input.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if punctuation.contains(c) { ' ' } else { c })
        .collect();
    cleaned
        .split_whitespace()
        .map(strip_leading_zeros)
        .collect()
}

/// `str_to_keys` with [`DEFAULT_PUNCTUATION`].
#[must_use]
pub fn str_to_keys_default(input: &str) -> Vec<String> {
    str_to_keys(input, DEFAULT_PUNCTUATION)
}

fn strip_leading_zeros(token: &str) -> String {
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        let stripped = token.trim_start_matches('0');
        stripped.to_string()
    } else {
        token.to_string()
    }
}
