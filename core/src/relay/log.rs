//! Helpers for relay log fields. Message text is truncated so one long post doesn't flood the log.

use std::borrow::Cow;

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Truncate message content for logging. Cuts on a char boundary at or below `max_len` bytes.
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> Cow<'_, str> {
    if content.len() <= max_len {
        return Cow::Borrowed(content);
    }
    let mut cut = max_len;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
}

#[inline]
pub fn truncate_content_default(content: &str) -> Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_borrowed() {
        assert!(matches!(truncate_content("hello", 10), Cow::Borrowed("hello")));
    }

    #[test]
    fn cuts_on_char_boundary() {
        // each CJK char is 3 bytes; 4 bytes lands inside the second char
        let out = truncate_content("订阅链接", 4);
        assert_eq!(out, "订... (12 bytes)");
    }
}
