//! Splitting rendered HTML into platform-sized messages.
//!
//! Telegram rejects messages over 4096 characters, so long replies are cut
//! into chunks at the most natural boundary available. Every chunk must be
//! independently valid HTML: tags left open at a cut are closed at the end
//! of the chunk and reopened at the start of the next one.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum message length accepted by the platform.
pub const MESSAGE_LIMIT: usize = 4096;

/// Fraction of the window a natural break must fall into to be used.
const SPLIT_THRESHOLD: f64 = 0.7;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)(?:\s[^>]*)?>").expect("tag regex")
});

/// Splits `text` into chunks no longer than `max_len` bytes.
///
/// A paragraph break, then a line break, then a space is preferred as the
/// split point, but only when it falls in the last 30% of the window;
/// otherwise the cut lands at the window edge. Cuts never land inside a
/// tag, and open formatting tags are rebalanced across the cut. The
/// window is shrunk to leave room for the closing tags, so the limit
/// holds even for chunks that end inside a formatting run.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let threshold = (max_len as f64 * SPLIT_THRESHOLD) as usize;
    let mut chunks = Vec::new();
    let mut remaining = text.to_string();

    while remaining.len() > max_len {
        let (split_pos, unclosed) = pick_cut(&remaining, max_len, threshold);

        let mut chunk = remaining[..split_pos].trim_end().to_string();
        for tag in unclosed.iter().rev() {
            chunk.push_str(&format!("</{tag}>"));
        }
        chunks.push(chunk);

        let mut rest = remaining[split_pos..].trim_start().to_string();
        if !rest.is_empty() {
            for tag in unclosed.iter().rev() {
                rest.insert_str(0, &format!("<{tag}>"));
            }
        }
        remaining = rest;
    }

    if !remaining.is_empty() {
        chunks.push(remaining);
    }
    chunks
}

/// Chooses the cut position and the tags left open before it.
///
/// Starts from a full `max_len` window and shrinks it until the chunk
/// plus its closing tags fits within the limit. The budget strictly
/// decreases on every retry, so the loop terminates.
fn pick_cut(remaining: &str, max_len: usize, threshold: usize) -> (usize, Vec<String>) {
    let mut budget = max_len;
    loop {
        let mut window_end = budget;
        while !remaining.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &remaining[..window_end];
        let mut split_pos = find_split(window, window_end, threshold);

        // Never cut through a tag: if the last '<' before the cut has no
        // matching '>', pull the cut back to it, floored at one character
        // so a stray bracket at the start cannot stall the loop.
        let head = &remaining[..split_pos];
        if let Some(open) = head.rfind('<') {
            if head[open..].rfind('>').is_none() {
                split_pos = open.max(1);
            }
        }

        let unclosed = unclosed_tags(&remaining[..split_pos]);
        let closers: usize = unclosed.iter().map(|tag| tag.len() + 3).sum();
        let used = remaining[..split_pos].trim_end().len() + closers;
        if used <= max_len || closers >= budget {
            return (split_pos, unclosed);
        }
        budget = max_len - closers;
    }
}

/// Picks the split position inside the window.
fn find_split(window: &str, window_end: usize, threshold: usize) -> usize {
    if let Some(pos) = window.rfind("\n\n") {
        if pos > threshold {
            return pos + 2;
        }
    }
    if let Some(pos) = window.rfind('\n') {
        if pos > threshold {
            return pos + 1;
        }
    }
    if let Some(pos) = window.rfind(' ') {
        if pos > threshold {
            return pos + 1;
        }
    }
    window_end
}

/// Returns the tags opened but not closed in `text`, in opening order.
fn unclosed_tags(text: &str) -> Vec<String> {
    let mut stack: Vec<String> = Vec::new();
    for caps in TAG.captures_iter(text) {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        if matches!(name.as_str(), "br" | "hr") {
            continue;
        }
        if closing {
            if let Some(last) = stack.iter().rposition(|t| *t == name) {
                stack.remove(last);
            }
        } else {
            stack.push(name);
        }
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_message("hello", MESSAGE_LIMIT);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn nine_thousand_chars_make_three_chunks() {
        let text = "a".repeat(9000);
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= MESSAGE_LIMIT);
        }
        let total: usize = chunks.iter().map(String::len).sum();
        assert_eq!(total, 9000);
    }

    #[test]
    fn prefers_paragraph_break_in_last_third_of_window() {
        let mut text = "x".repeat(3500);
        text.push_str("\n\n");
        text.push_str(&"y".repeat(3000));
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'x'));
        assert!(chunks[1].chars().all(|c| c == 'y'));
    }

    #[test]
    fn early_break_is_ignored() {
        // The only newline sits in the first 70% of the window, so the cut
        // falls back to the window edge.
        let mut text = "x".repeat(100);
        text.push('\n');
        text.push_str(&"y".repeat(8000));
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks[0].len(), MESSAGE_LIMIT);
    }

    #[test]
    fn space_break_is_used_when_no_newline_exists() {
        let mut text = "x".repeat(4000);
        text.push(' ');
        text.push_str(&"y".repeat(2000));
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4000);
    }

    #[test]
    fn open_tag_is_closed_and_reopened_across_chunks() {
        let mut text = String::from("<b>");
        text.push_str(&"a".repeat(5000));
        text.push_str("</b>");
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with("</b>"));
        assert!(chunks[1].starts_with("<b>"));
        for chunk in &chunks {
            assert!(chunk.len() <= MESSAGE_LIMIT, "chunk has {} chars", chunk.len());
            assert!(unclosed_tags(chunk).is_empty());
        }
    }

    #[test]
    fn rebalanced_chunks_stay_within_the_limit() {
        // Closing tags appended at a cut must not push the chunk over the
        // platform limit.
        let mut text = String::from("<b><i>");
        text.push_str(&"a".repeat(9000));
        text.push_str("</i></b>");
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.len() <= MESSAGE_LIMIT, "chunk has {} chars", chunk.len());
            assert!(unclosed_tags(chunk).is_empty());
        }
    }

    #[test]
    fn stray_open_bracket_at_position_zero_still_makes_progress() {
        let mut text = String::from("<");
        text.push_str(&"a".repeat(5000));
        let chunks = split_message(&text, MESSAGE_LIMIT);
        let total: usize = chunks.iter().map(String::len).sum();
        assert_eq!(total, 5001);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.len() <= MESSAGE_LIMIT);
        }
    }

    #[test]
    fn cut_never_lands_inside_a_tag() {
        let mut text = "a".repeat(MESSAGE_LIMIT - 2);
        text.push_str("<code>xyz</code>");
        text.push_str(&"b".repeat(200));
        let chunks = split_message(&text, MESSAGE_LIMIT);
        for chunk in &chunks {
            let opens = chunk.matches('<').count();
            let closes = chunk.matches('>').count();
            assert_eq!(opens, closes, "partial tag in chunk: {chunk}");
        }
    }

    #[test]
    fn nested_tags_are_reopened_in_order() {
        let mut text = String::from("<b><i>");
        text.push_str(&"a".repeat(5000));
        text.push_str("</i></b>");
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert!(chunks[0].ends_with("</i></b>"));
        assert!(chunks[1].starts_with("<i><b>") || chunks[1].starts_with("<b><i>"));
    }

    #[test]
    fn unclosed_tags_tracks_nesting() {
        assert_eq!(unclosed_tags("<b>bold</b>"), Vec::<String>::new());
        assert_eq!(unclosed_tags("<b><i>text</i>"), vec!["b".to_string()]);
        assert_eq!(
            unclosed_tags("<a href=\"x\">link"),
            vec!["a".to_string()]
        );
    }
}
