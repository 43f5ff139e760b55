/// Longest error detail returned to HTTP clients.
pub const MAX_DETAIL_CHARS: usize = 2000;

/// Returns at most the last `max_bytes` bytes of `text`, moving the cut
/// forward to the next char boundary when it would split a UTF-8 sequence.
pub fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Returns at most the first `max_chars` characters of `text`.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Returns at most the last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

/// Lossy-decodes process output and returns its trimmed tail.
pub fn output_tail(raw: &[u8], max_bytes: usize) -> String {
    let decoded = String::from_utf8_lossy(raw);
    tail(decoded.trim(), max_bytes).to_string()
}
