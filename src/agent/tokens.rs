//! Token counting and truncation helpers.
//!
//! Uses a simple heuristic: ~4 characters of serialized JSON per token.
//! The estimate only has to be cheap and monotonic, not exact.

use super::message::Message;

/// Characters per token estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Marker appended to truncated content.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Estimate token count for a string.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

/// Estimate token count for a message list from its serialized size.
pub fn estimate_messages(messages: &[Message]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|m| serde_json::to_string(m).map(|s| s.len()).unwrap_or(0))
        .sum();
    chars / CHARS_PER_TOKEN
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut end = index.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Truncate `text` to `max_chars` bytes plus [`TRUNCATION_MARKER`].
///
/// Returns `None` when the text is within the limit or when truncating would
/// not make it shorter, so callers never grow a message.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> Option<String> {
    if text.len() <= max_chars {
        return None;
    }
    let end = floor_char_boundary(text, max_chars);
    let truncated = format!("{}{}", &text[..end], TRUNCATION_MARKER);
    (truncated.len() < text.len()).then_some(truncated)
}

/// True when the text embeds an image as a data URL.
pub fn looks_like_image(text: &str) -> bool {
    text.contains("data:image/") && text.contains(";base64,")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("Hi"), 1);
        assert_eq!(estimate_tokens("Hello"), 2);
        assert_eq!(estimate_tokens("Hello, world!"), 4);
    }

    #[test]
    fn test_estimate_messages_grows_with_content() {
        let small = vec![Message::user("hi")];
        let large = vec![Message::user("x".repeat(4000))];
        assert!(estimate_messages(&large) > estimate_messages(&small));
        assert!(estimate_messages(&large) >= 1000);
    }

    #[test]
    fn test_truncate_with_marker() {
        assert_eq!(truncate_with_marker("short", 100), None);

        let long = "a".repeat(200);
        let truncated = truncate_with_marker(&long, 50).unwrap();
        assert!(truncated.starts_with(&"a".repeat(50)));
        assert!(truncated.ends_with(TRUNCATION_MARKER));

        // Already-truncated text is left alone.
        assert_eq!(truncate_with_marker(&truncated, 50), None);
    }

    #[test]
    fn test_truncate_never_grows() {
        let text = "b".repeat(55);
        assert_eq!(truncate_with_marker(&text, 50), None);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(100);
        let truncated = truncate_with_marker(&text, 51).unwrap();
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_looks_like_image() {
        assert!(looks_like_image("data:image/png;base64,iVBORw0KGgo"));
        assert!(!looks_like_image("plain output"));
    }
}
