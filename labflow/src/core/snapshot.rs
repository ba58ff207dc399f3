//! Bounding resource listings before they are shown to collaborators.

/// Listing used when the request names no directory.
pub const NO_RESOURCES: &str = "No directory specified or found.";

/// Marker appended to a listing that was cut at the character budget.
pub const TRUNCATION_MARKER: &str = "\n...(truncated)...";

/// Keep at most `limit` characters of `text`, appending [`TRUNCATION_MARKER`]
/// when anything was dropped. Returns the bounded text and whether it was cut.
pub fn truncate_listing(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => (format!("{}{}", &text[..cut], TRUNCATION_MARKER), true),
        None => (text.to_string(), false),
    }
}

/// Keep at most `limit` characters of `text` without a marker.
pub fn clip(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_listing_is_untouched() {
        assert_eq!(truncate_listing("a\nb", 10), ("a\nb".to_string(), false));
        assert_eq!(truncate_listing("abc", 3), ("abc".to_string(), false));
    }

    #[test]
    fn long_listing_gets_marker() {
        let (text, truncated) = truncate_listing("abcdef", 4);
        assert!(truncated);
        assert_eq!(text, "abcd\n...(truncated)...");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (text, truncated) = truncate_listing("样本样本样本", 2);
        assert!(truncated);
        assert!(text.starts_with("样本\n"));
        assert_eq!(clip("样本样本", 3), "样本样");
    }
}
