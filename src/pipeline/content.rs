//! HTML detection and HTML-to-text reduction for rendered bodies.
//!
//! Templates are free text, so an operator may paste HTML into them. Graph can
//! carry it as-is; a `mailto:` draft cannot, so it gets reduced to plain text.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(p|div|br|h[1-6]|table|tr|td|th|strong|b|em|i|u|span|ul|ol|li|a|img|html|head|body)(?:\s[^>]*)?/?>",
    )
    .unwrap()
});

static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!DOCTYPE[^>]*>|<!--.*?-->|<!\[CDATA\[.*?\]\]>").unwrap()
});
static HIDDEN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<head(?:\s[^>]*)?>.*?</head\s*>|<style(?:\s[^>]*)?>.*?</style\s*>|<script(?:\s[^>]*)?>.*?</script\s*>",
    )
    .unwrap()
});
static SHELL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(html|body|head)(?:\s[^>]*)?/?>").unwrap());
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h[1-6](?:\s[^>]*)?>(.*?)</h[1-6]\s*>").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").unwrap());
static BLOCK_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(p|div|li)\s*>").unwrap());
static CELL_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(tr|td|th)\s*>").unwrap());
// A tag name ends at whitespace, `/` or `>`, so `<a.admin@example.com>` is text.
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^>]*)?/?>").unwrap());
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C]+").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Whether the body contains at least one recognisable formatting tag.
pub fn is_html(text: &str) -> bool {
    HTML_TAG.is_match(text)
}

/// Reduce an HTML body to readable plain text.
pub fn strip_html(html: &str) -> String {
    let text = html.replace("\r\n", "\n").replace('\r', "\n");
    let text = PREAMBLE.replace_all(&text, "");
    let text = HIDDEN_BLOCK.replace_all(&text, "");
    let text = SHELL_TAG.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "$1\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK_CLOSE.replace_all(&text, "\n\n");
    let text = CELL_CLOSE.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");

    let text = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim_matches('\n').to_string()
}

// `&amp;` goes last so an escaped entity like `&amp;lt;` decodes to `&lt;`.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
