//! Markup rendering for the Markdown formatter.
//!
//! Full Markdown is left to callers: they implement [`MarkupRenderer`] over
//! whatever engine they use. [`InlineMarkdown`] covers the inline subset that
//! shows up in table cells.

/// Turns a cell's text into markup.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

/// Escapes the HTML metacharacters in `s`.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Inline Markdown to HTML: `**strong**`, `*em*` / `_em_`, `` `code` `` and
/// `[text](url)`. Everything else is escaped verbatim.
///
/// # Examples
///
/// ```
/// use cellfmt::domain::markup::{InlineMarkdown, MarkupRenderer};
///
/// let html = InlineMarkdown.render("**bold** and `a<b`");
/// assert_eq!(html, "<strong>bold</strong> and <code>a&lt;b</code>");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineMarkdown;

impl MarkupRenderer for InlineMarkdown {
    fn render(&self, text: &str) -> String {
        render_inline(text)
    }
}

fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if ch == '`' {
            if let Some(end) = rest[1..].find('`') {
                out.push_str("<code>");
                out.push_str(&escape_html(&rest[1..1 + end]));
                out.push_str("</code>");
                rest = &rest[end + 2..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**").filter(|&end| end > 0) {
                out.push_str("<strong>");
                out.push_str(&render_inline(&after[..end]));
                out.push_str("</strong>");
                rest = &after[end + 2..];
                continue;
            }
        } else if ch == '*' || ch == '_' {
            if let Some(end) = rest[1..].find(ch).filter(|&end| end > 0) {
                out.push_str("<em>");
                out.push_str(&render_inline(&rest[1..1 + end]));
                out.push_str("</em>");
                rest = &rest[end + 2..];
                continue;
            }
        } else if ch == '[' {
            if let Some((label, url, consumed)) = split_link(rest) {
                if is_safe_url(url) {
                    out.push_str("<a href=\"");
                    out.push_str(&escape_html(url));
                    out.push_str("\">");
                    out.push_str(&render_inline(label));
                    out.push_str("</a>");
                } else {
                    out.push_str(&render_inline(label));
                }
                rest = &rest[consumed..];
                continue;
            }
        }

        out.push_str(&escape_html(&rest[..ch.len_utf8()]));
        rest = &rest[ch.len_utf8()..];
    }

    out
}

/// Splits `[label](url)` at the start of `s`; returns the bytes consumed.
fn split_link(s: &str) -> Option<(&str, &str, usize)> {
    let close = s.find("](")?;
    let label = &s[1..close];
    let url_start = close + 2;
    let url_len = s[url_start..].find(')')?;
    let url = &s[url_start..url_start + url_len];
    Some((label, url.trim(), url_start + url_len + 1))
}

/// Relative URLs and `http`, `https` and `mailto` links.
fn is_safe_url(url: &str) -> bool {
    let scheme_end = url.find(|c| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(idx) if url[idx..].starts_with(':') => {
            let scheme = &url[..idx];
            ["http", "https", "mailto"]
                .iter()
                .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
        }
        _ => true,
    }
}
