/// Ellipsis appended to any truncated preview, title or excerpt.
pub const ELLIPSIS: char = '…';

/// Keep the first `max_chars` characters of `text`, appending `…` only if
/// something was cut. Counts `char`s, so multi-byte text is never split.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = String::with_capacity(byte_idx + ELLIPSIS.len_utf8());
            out.push_str(&text[..byte_idx]);
            out.push(ELLIPSIS);
            out
        }
        None => text.to_string(),
    }
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lower-cased alphanumeric tokens of `text`.
pub fn tokenize_lowercase(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}
