//! Locating JSON objects inside free-form LLM output.
//!
//! Models wrap their answer in chatter, markdown fences or reasoning traces.
//! The primary span runs from the first `{` to the last `}`; when that span
//! does not decode, callers can fall back to every balanced-brace object in
//! the text.

/// Span from the first `{` to the last `}` inclusive.
///
/// Returns `None` when either brace is missing or the last `}` does not come
/// after the first `{`.
pub fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Every balanced `{ ... }` substring, in order of its opening brace.
///
/// Braces inside JSON string literals (including escaped quotes) are not
/// counted.
pub fn balanced_objects(text: &str) -> Vec<&str> {
    text.match_indices('{')
        .filter_map(|(start, _)| balanced_prefix(&text[start..]))
        .collect()
}

/// The balanced-brace prefix of `text`, which must start with `{`.
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

/// A short, char-safe excerpt of model output for error messages.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}
