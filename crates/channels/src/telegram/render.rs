//! Source markup to Telegram HTML conversion.
//!
//! Telegram accepts only a small HTML subset, so the renderer maps the
//! common markdown constructs onto `<b> <i> <s> <a> <code> <pre>` and
//! strips everything else down to plain text. Code spans are lifted out
//! before any other rewriting so their contents are never reinterpreted
//! as markup, then restored escaped at the end.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_+-]*\n?([\s\S]*?)```").expect("fenced code regex")
});
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("inline code regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.*)$").expect("heading regex"));
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>\s?(.*)$").expect("blockquote regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link regex"));
static BOLD_STARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"));
static BOLD_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_]+)__").expect("bold underscore regex"));
// The regex crate has no lookarounds, so the word boundary on each side is
// a consumed group restored in the replacement.
static ITALIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9])_([^_\n]+)_($|[^A-Za-z0-9])").expect("italic regex")
});
static STRIKETHROUGH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~]+)~~").expect("strikethrough regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[-*]\s+").expect("bullet regex"));

/// Escapes the three characters Telegram HTML treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders source markup into the Telegram HTML subset.
pub fn render_markup(text: &str) -> String {
    // Lift code spans out behind NUL-delimited placeholders. NUL cannot
    // appear in message text and survives the escaping pass untouched.
    let mut code_blocks: Vec<String> = Vec::new();
    let out = FENCED_CODE.replace_all(text, |caps: &regex::Captures<'_>| {
        let idx = code_blocks.len();
        code_blocks.push(escape_html(&caps[1]));
        format!("\u{0}CB{idx}\u{0}")
    });

    let mut inline_code: Vec<String> = Vec::new();
    let out = INLINE_CODE.replace_all(&out, |caps: &regex::Captures<'_>| {
        let idx = inline_code.len();
        inline_code.push(escape_html(&caps[1]));
        format!("\u{0}IC{idx}\u{0}")
    });

    // Structural markdown that has no Telegram equivalent is flattened to
    // its text content before escaping, so the leading '>' of a quote is
    // not escaped into a literal.
    let out = HEADING.replace_all(&out, "$1");
    let out = BLOCKQUOTE.replace_all(&out, "$1");

    let out = escape_html(&out);

    let out = LINK.replace_all(&out, "<a href=\"$2\">$1</a>");
    let out = BOLD_STARS.replace_all(&out, "<b>$1</b>");
    let out = BOLD_UNDERSCORES.replace_all(&out, "<b>$1</b>");
    let out = replace_italic(&out);
    let out = STRIKETHROUGH.replace_all(&out, "<s>$1</s>");
    let mut out = BULLET.replace_all(&out, "\u{2022} ").into_owned();

    for (idx, code) in inline_code.iter().enumerate() {
        out = out.replace(
            &format!("\u{0}IC{idx}\u{0}"),
            &format!("<code>{code}</code>"),
        );
    }
    for (idx, block) in code_blocks.iter().enumerate() {
        out = out.replace(&format!("\u{0}CB{idx}\u{0}"), &format!("<pre>{block}</pre>"));
    }

    out
}

/// Applies the italic rewrite until no match remains.
///
/// Because the boundary characters are consumed by the pattern, adjacent
/// spans like `_a_ _b_` need a second pass to convert the one whose
/// boundary was eaten by the previous match.
fn replace_italic(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ITALIC
            .replace_all(&current, "${1}<i>${2}</i>${3}")
            .into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bold_and_inline_code() {
        assert_eq!(
            render_markup("**bold** and `code`"),
            "<b>bold</b> and <code>code</code>"
        );
    }

    #[test]
    fn renders_underscore_bold_and_italic() {
        assert_eq!(render_markup("__strong__"), "<b>strong</b>");
        assert_eq!(render_markup("an _emphasis_ here"), "an <i>emphasis</i> here");
    }

    #[test]
    fn italic_ignores_snake_case_identifiers() {
        assert_eq!(render_markup("use file_name_here ok"), "use file_name_here ok");
    }

    #[test]
    fn renders_adjacent_italic_spans() {
        assert_eq!(render_markup("_a_ _b_"), "<i>a</i> <i>b</i>");
    }

    #[test]
    fn renders_strikethrough_and_links() {
        assert_eq!(render_markup("~~gone~~"), "<s>gone</s>");
        assert_eq!(
            render_markup("[docs](https://example.com/a?b=1&c=2)"),
            "<a href=\"https://example.com/a?b=1&amp;c=2\">docs</a>"
        );
    }

    #[test]
    fn escapes_html_outside_code() {
        assert_eq!(render_markup("1 < 2 && 3 > 2"), "1 &lt; 2 &amp;&amp; 3 &gt; 2");
    }

    #[test]
    fn code_block_contents_are_escaped_not_rendered() {
        let out = render_markup("```rust\nlet x = a < b && **not bold**;\n```");
        assert_eq!(out, "<pre>let x = a &lt; b &amp;&amp; **not bold**;\n</pre>");
    }

    #[test]
    fn inline_code_preserves_markup_characters() {
        assert_eq!(
            render_markup("run `cargo build --release` now"),
            "run <code>cargo build --release</code> now"
        );
        assert_eq!(render_markup("`a < b`"), "<code>a &lt; b</code>");
    }

    #[test]
    fn headings_and_blockquotes_are_flattened() {
        assert_eq!(render_markup("## Title"), "Title");
        assert_eq!(render_markup("> quoted line"), "quoted line");
    }

    #[test]
    fn bullets_become_dots() {
        assert_eq!(render_markup("- one\n- two"), "\u{2022} one\n\u{2022} two");
        assert_eq!(render_markup("* item"), "\u{2022} item");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render_markup("just words"), "just words");
    }
}
