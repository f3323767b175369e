pub mod activity;
pub mod conversations;
pub mod index;
pub mod search;
pub mod stats;

use unicode_width::UnicodeWidthChar;

/// Collapse whitespace and cut to a terminal column width
pub fn preview(text: &str, max_width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::new();
    let mut width = 0;
    for c in flat.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            out.push_str("...");
            return out;
        }
        width += w;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short\ntext", 20), "short text");
        assert_eq!(preview("abcdef", 3), "abc...");
        // Wide characters count double
        assert_eq!(preview("日本語テキスト", 6), "日本語...");
    }
}
